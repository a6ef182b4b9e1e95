//! Matching engine - consumes commands, drives book mutations, emits trades.
//!
//! Owns the book, the order pool and the direct id map; single-threaded by
//! construction, so none of the owned structures need locks. Each command is
//! processed to completion before the next is read, which makes the trade
//! stream totally ordered and the whole pipeline deterministic given the
//! queue order.

use crate::book::Book;
use crate::clock::Clock;
use crate::command::{NewOrder, OrderStatus, OrderType, Side, Symbol};
use crate::config::{ConfigError, EngineConfig};
use crate::market_data::{Level2Snapshot, LevelEntry, LevelUpdate, MarketDataBus, Trade};
use crate::pool::{OrderPool, SlotIndex, NULL_INDEX};
use crate::stats::EngineStats;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Instant;
use tracing::warn;

/// Single-writer matching core
pub struct MatchingEngine {
    price_min: i64,
    price_max: i64,
    instrument_id: u32,
    symbol: Symbol,

    book: Book,
    pool: OrderPool,
    /// Direct map order_id -> slot, NULL_INDEX when the id is not live
    id_map: Vec<SlotIndex>,

    stats: EngineStats,
    market_data: MarketDataBus,
    clock: Clock,
}

impl MatchingEngine {
    pub fn new(config: &EngineConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            price_min: config.price_min,
            price_max: config.price_max,
            instrument_id: config.instrument_id,
            symbol: config.symbol,
            book: Book::new(config.price_min, config.price_max),
            pool: OrderPool::with_capacity(config.max_orders as u32),
            id_map: vec![NULL_INDEX; config.max_orders as usize],
            stats: EngineStats::new(),
            market_data: MarketDataBus::new(),
            clock: Clock::new(),
        })
    }

    // ========================================================================
    // Command handling
    // ========================================================================

    /// Process a NEW command. `t0` is the dequeue timestamp; every trade the
    /// command produces is latency-stamped against it.
    pub fn handle_new(&mut self, cmd: NewOrder, t0: Instant) {
        if !self.admit(&cmd) {
            self.stats.orders_rejected += 1;
            return;
        }

        let Some(idx) = self.pool.allocate() else {
            self.stats.orders_rejected += 1;
            warn!(order_id = cmd.order_id, "order pool exhausted, dropping NEW");
            return;
        };

        let enqueue_ts = self.clock.now_nanos();
        {
            let order = self.pool.order_mut(idx);
            order.order_id = cmd.order_id;
            order.side = cmd.side;
            order.order_type = cmd.order_type;
            order.price = cmd.price;
            order.remaining_qty = cmd.qty;
            order.original_qty = cmd.qty;
            order.status = OrderStatus::Pending;
            order.enqueue_ts = enqueue_ts;
        }
        self.id_map[cmd.order_id as usize] = idx;
        self.stats.by_type_mut(cmd.order_type).submitted += 1;

        match cmd.order_type {
            OrderType::Limit => self.place_limit(idx, t0),
            OrderType::Ioc => self.place_ioc(idx, t0),
            OrderType::Fok => self.place_fok(idx, t0),
        }
    }

    /// Process a CANCEL command. Unknown, already-matched and
    /// already-cancelled ids are silent no-ops, so cancellation is
    /// idempotent.
    pub fn handle_cancel(&mut self, order_id: u64) {
        let Some(&slot) = self.id_map.get(order_id as usize) else {
            return;
        };
        if slot == NULL_INDEX {
            return;
        }

        self.book.remove(&mut self.pool, slot);
        let order_type = {
            let order = self.pool.order_mut(slot);
            order.status = OrderStatus::Cancelled;
            order.order_type
        };
        self.stats.by_type_mut(order_type).cancelled += 1;
        self.id_map[order_id as usize] = NULL_INDEX;
        self.pool.release(slot);
    }

    /// Admission checks: price band, non-zero quantity, id within the map,
    /// id not currently live
    fn admit(&self, cmd: &NewOrder) -> bool {
        if cmd.price < self.price_min || cmd.price > self.price_max {
            return false;
        }
        if cmd.qty == 0 {
            return false;
        }
        match self.id_map.get(cmd.order_id as usize) {
            Some(&slot) => slot == NULL_INDEX,
            None => false,
        }
    }

    // ========================================================================
    // Order-type dispatch
    // ========================================================================

    fn place_limit(&mut self, idx: SlotIndex, t0: Instant) {
        let traded = self.match_aggressor(idx, t0);
        let remaining = self.pool.order(idx).remaining_qty;

        if remaining == 0 {
            self.retire_filled(idx);
            return;
        }

        if traded > 0 {
            self.pool.order_mut(idx).status = OrderStatus::Partial;
            self.stats.by_type_mut(OrderType::Limit).partial_fills += 1;
        }
        self.book.insert(&mut self.pool, idx);
    }

    fn place_ioc(&mut self, idx: SlotIndex, t0: Instant) {
        let traded = self.match_aggressor(idx, t0);
        let remaining = self.pool.order(idx).remaining_qty;

        if remaining == 0 {
            self.retire_filled(idx);
            return;
        }

        // Residual never rests
        let stats = self.stats.by_type_mut(OrderType::Ioc);
        if traded > 0 {
            stats.partial_fills += 1;
        }
        stats.cancelled += 1;
        self.pool.order_mut(idx).status = OrderStatus::Cancelled;
        self.discard(idx);
    }

    fn place_fok(&mut self, idx: SlotIndex, t0: Instant) {
        let (side, limit, want) = {
            let order = self.pool.order(idx);
            (order.side, order.price, order.remaining_qty)
        };

        if self.fillable_qty(side, limit, want) < want {
            // Capture the id before the slot is released; the slot contents
            // are not valid afterwards.
            let order_id = {
                let order = self.pool.order_mut(idx);
                order.status = OrderStatus::Rejected;
                order.order_id
            };
            self.stats.by_type_mut(OrderType::Fok).rejected += 1;
            self.id_map[order_id as usize] = NULL_INDEX;
            self.pool.release(idx);
            return;
        }

        self.match_aggressor(idx, t0);
        debug_assert_eq!(
            self.pool.order(idx).remaining_qty,
            0,
            "feasible FOK must fill completely"
        );
        self.retire_filled(idx);
    }

    /// Sum opposite-side liquidity under the limit, stopping as soon as the
    /// target is reached
    fn fillable_qty(&self, side: Side, limit: i64, want: u64) -> u64 {
        let mut fillable = 0u64;
        match side {
            Side::Buy => {
                let Some(best) = self.book.best_ask() else {
                    return 0;
                };
                let mut price = best;
                while price <= limit {
                    if let Some(level) = self.book.level(Side::Sell, price) {
                        fillable += level.volume;
                        if fillable >= want {
                            return fillable;
                        }
                    }
                    price += 1;
                }
            }
            Side::Sell => {
                let Some(best) = self.book.best_bid() else {
                    return 0;
                };
                let mut price = best;
                while price >= limit {
                    if let Some(level) = self.book.level(Side::Buy, price) {
                        fillable += level.volume;
                        if fillable >= want {
                            return fillable;
                        }
                    }
                    price -= 1;
                }
            }
        }
        fillable
    }

    // ========================================================================
    // Matching walk
    // ========================================================================

    /// Match the aggressor against the opposite side, best price first,
    /// FIFO within each level. Returns the total quantity traded.
    fn match_aggressor(&mut self, aggressor_idx: SlotIndex, t0: Instant) -> u64 {
        let (aggressor_id, side, limit) = {
            let order = self.pool.order(aggressor_idx);
            (order.order_id, order.side, order.price)
        };
        let book_side = side.opposite();
        let mut traded_total = 0u64;

        loop {
            if self.pool.order(aggressor_idx).remaining_qty == 0 {
                break;
            }
            let Some(best) = self.book.best_opposite(side) else {
                break;
            };
            let crosses = match side {
                Side::Buy => limit >= best,
                Side::Sell => limit <= best,
            };
            if !crosses {
                break;
            }

            traded_total +=
                self.consume_level(aggressor_idx, aggressor_id, side, book_side, best, t0);
        }

        traded_total
    }

    /// Trade against resting orders at one price, oldest first, until the
    /// level drains or the aggressor is done. Publishes the level update and
    /// settles the best pointer if the level emptied.
    fn consume_level(
        &mut self,
        aggressor_idx: SlotIndex,
        aggressor_id: u64,
        aggressor_side: Side,
        book_side: Side,
        price: i64,
        t0: Instant,
    ) -> u64 {
        let mut traded_here = 0u64;

        loop {
            let aggressor_remaining = self.pool.order(aggressor_idx).remaining_qty;
            if aggressor_remaining == 0 {
                break;
            }

            let Some(resting_idx) = self
                .book
                .level(book_side, price)
                .and_then(|level| level.front())
            else {
                break;
            };

            let (resting_id, resting_remaining) = {
                let resting = self.pool.order(resting_idx);
                (resting.order_id, resting.remaining_qty)
            };
            let trade_qty = aggressor_remaining.min(resting_remaining);

            self.execute_trade(aggressor_id, resting_id, aggressor_side, price, trade_qty, t0);
            traded_here += trade_qty;

            self.pool.order_mut(aggressor_idx).remaining_qty -= trade_qty;
            let resting_left = {
                let resting = self.pool.order_mut(resting_idx);
                resting.remaining_qty -= trade_qty;
                resting.remaining_qty
            };
            self.book
                .level_mut(book_side, price)
                .deduct(trade_qty);

            if resting_left == 0 {
                self.book.unlink(&mut self.pool, resting_idx);
                self.pool.order_mut(resting_idx).status = OrderStatus::Filled;
                self.id_map[resting_id as usize] = NULL_INDEX;
                self.pool.release(resting_idx);
            } else {
                self.pool.order_mut(resting_idx).status = OrderStatus::Partial;
            }
        }

        let (volume, count, drained) = {
            let level = self.book.level_mut(book_side, price);
            (level.volume, level.count, level.is_empty())
        };
        if traded_here > 0 && self.market_data.is_active() {
            self.market_data.publish_level_update(&LevelUpdate {
                side: book_side,
                price,
                volume,
                order_count: count,
            });
        }
        if drained {
            self.book.on_level_drained(book_side, price);
        }

        traded_here
    }

    /// Record one matched slice: latency sample, conservation totals, event
    fn execute_trade(
        &mut self,
        aggressor_id: u64,
        resting_id: u64,
        aggressor_side: Side,
        price: i64,
        qty: u64,
        t0: Instant,
    ) {
        let latency_ns = t0.elapsed().as_nanos() as u64;
        self.stats.record_trade(latency_ns, qty);

        if self.market_data.is_active() {
            let trade = Trade {
                instrument_id: self.instrument_id,
                symbol: self.symbol,
                aggressor_order_id: aggressor_id,
                resting_order_id: resting_id,
                aggressor_side,
                price,
                qty,
                ts: self.clock.now_nanos(),
            };
            self.market_data.publish_trade(&trade);
        }
    }

    /// Terminal FILLED transition: count it and release the slot
    fn retire_filled(&mut self, idx: SlotIndex) {
        let order_type = {
            let order = self.pool.order_mut(idx);
            order.status = OrderStatus::Filled;
            order.order_type
        };
        self.stats.by_type_mut(order_type).filled += 1;
        self.discard(idx);
    }

    /// Clear the id-map entry and return the slot to the pool
    fn discard(&mut self, idx: SlotIndex) {
        let order_id = self.pool.order(idx).order_id;
        self.id_map[order_id as usize] = NULL_INDEX;
        self.pool.release(idx);
    }

    // ========================================================================
    // Observation
    // ========================================================================

    #[inline]
    pub fn best_bid(&self) -> Option<i64> {
        self.book.best_bid()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<i64> {
        self.book.best_ask()
    }

    /// `(volume, order_count)` at one price
    #[inline]
    pub fn depth_at(&self, side: Side, price: i64) -> (u64, u32) {
        self.book.depth_at(side, price)
    }

    /// Number of orders currently resting in the book
    #[inline]
    pub fn live_orders(&self) -> u64 {
        u64::from(self.pool.allocated())
    }

    /// Status of a live order, `None` once it reached a terminal state
    pub fn order_status(&self, order_id: u64) -> Option<OrderStatus> {
        let slot = *self.id_map.get(order_id as usize)?;
        if slot == NULL_INDEX {
            return None;
        }
        Some(self.pool.order(slot).status)
    }

    #[inline]
    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    #[inline]
    pub(crate) fn stats_mut(&mut self) -> &mut EngineStats {
        &mut self.stats
    }

    #[inline]
    pub fn market_data_mut(&mut self) -> &mut MarketDataBus {
        &mut self.market_data
    }

    #[inline]
    pub fn pool_allocated(&self) -> u32 {
        self.pool.allocated()
    }

    #[inline]
    pub fn pool_available(&self) -> u32 {
        self.pool.available()
    }

    #[inline]
    pub fn pool_capacity(&self) -> u32 {
        self.pool.capacity()
    }

    /// Pre-fault the pool pages before the run starts
    pub fn warm_up(&mut self) {
        self.pool.warm_up();
    }

    /// Top `depth` levels per side: bids descending, asks ascending
    pub fn snapshot(&self, depth: usize) -> Level2Snapshot {
        let mut snapshot = Level2Snapshot {
            instrument_id: self.instrument_id,
            symbol: self.symbol,
            ts: self.clock.now_nanos(),
            bids: Vec::with_capacity(depth),
            asks: Vec::with_capacity(depth),
        };

        if let Some(best) = self.book.best_bid() {
            let mut price = best;
            while price >= self.price_min && snapshot.bids.len() < depth {
                let (volume, count) = self.book.depth_at(Side::Buy, price);
                if volume > 0 {
                    snapshot.bids.push(LevelEntry {
                        price,
                        volume,
                        order_count: count,
                    });
                }
                price -= 1;
            }
        }
        if let Some(best) = self.book.best_ask() {
            let mut price = best;
            while price <= self.price_max && snapshot.asks.len() < depth {
                let (volume, count) = self.book.depth_at(Side::Sell, price);
                if volume > 0 {
                    snapshot.asks.push(LevelEntry {
                        price,
                        volume,
                        order_count: count,
                    });
                }
                price += 1;
            }
        }

        snapshot
    }

    /// Build and publish a snapshot to the configured publishers
    pub fn publish_snapshot(&mut self, depth: usize) {
        if !self.market_data.is_active() {
            return;
        }
        let snapshot = self.snapshot(depth);
        self.market_data.publish_snapshot(&snapshot);
    }

    /// Hash of the observable book state, for determinism testing
    pub fn state_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.book.best_bid().hash(&mut hasher);
        self.book.best_ask().hash(&mut hasher);
        self.pool.allocated().hash(&mut hasher);

        let mut price = self.price_min;
        while price <= self.price_max {
            for side in [Side::Buy, Side::Sell] {
                let (volume, count) = self.book.depth_at(side, price);
                if count > 0 {
                    price.hash(&mut hasher);
                    volume.hash(&mut hasher);
                    count.hash(&mut hasher);
                }
            }
            price += 1;
        }

        hasher.finish()
    }

    /// Diagnostic walk over every owned structure; panics on any violated
    /// invariant. Intended for tests and debug builds, not the hot path.
    pub fn verify_integrity(&self) {
        let mut linked_orders = 0u64;

        for side in [Side::Buy, Side::Sell] {
            let mut price = self.price_min;
            while price <= self.price_max {
                let level = self.book.level(side, price).expect("price in range");
                let mut volume = 0u64;
                let mut count = 0u32;
                let mut idx = level.head;
                let mut prev = NULL_INDEX;
                while idx != NULL_INDEX {
                    let order = self.pool.order(idx);
                    assert_eq!(order.side, side, "order linked on wrong side");
                    assert_eq!(order.price, price, "order linked at wrong level");
                    assert_eq!(order.prev, prev, "broken back-link");
                    assert!(
                        matches!(order.status, OrderStatus::Pending | OrderStatus::Partial),
                        "resting order has terminal status {:?}",
                        order.status
                    );
                    assert_eq!(
                        self.id_map[order.order_id as usize], idx,
                        "id map does not point at the linked slot"
                    );
                    volume += order.remaining_qty;
                    count += 1;
                    prev = idx;
                    idx = order.next;
                }
                assert_eq!(level.volume, volume, "level aggregate out of sync");
                assert_eq!(level.count, count, "level count out of sync");
                assert_eq!(level.tail, prev, "tail does not match last link");
                linked_orders += u64::from(count);
                price += 1;
            }
        }

        assert_eq!(
            linked_orders,
            u64::from(self.pool.allocated()),
            "allocated slots not all reachable from the book"
        );

        // Converse direction: every map entry points at a slot that carries
        // the same id, so no entry outlives its order
        let mut mapped = 0u64;
        for (id, &slot) in self.id_map.iter().enumerate() {
            if slot != NULL_INDEX {
                assert_eq!(
                    self.pool.order(slot).order_id,
                    id as u64,
                    "id map entry points at a slot with a different id"
                );
                mapped += 1;
            }
        }
        assert_eq!(mapped, linked_orders, "stale id map entries present");
        assert_eq!(
            self.pool.allocated() + self.pool.available(),
            self.pool.capacity(),
            "pool accounting broken"
        );
        assert!(
            self.stats.quantity_conserved(),
            "matched quantity not conserved"
        );

        if let (Some(bid), Some(ask)) = (self.book.best_bid(), self.book.best_ask()) {
            assert!(bid < ask, "book is locked or crossed: {bid} >= {ask}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::RecordingPublisher;

    fn engine_with_recorder(max_orders: u64) -> (MatchingEngine, RecordingPublisher) {
        let config = EngineConfig {
            max_orders,
            ..EngineConfig::default()
        };
        let mut engine = MatchingEngine::new(&config).unwrap();
        let recorder = RecordingPublisher::new();
        engine
            .market_data_mut()
            .add_publisher(Box::new(recorder.handle()));
        (engine, recorder)
    }

    fn new_order(order_id: u64, side: Side, order_type: OrderType, price: i64, qty: u64) -> NewOrder {
        NewOrder {
            order_id,
            side,
            order_type,
            price,
            qty,
            producer_ts: 0,
        }
    }

    fn place(engine: &mut MatchingEngine, cmd: NewOrder) {
        engine.handle_new(cmd, Instant::now());
    }

    #[test]
    fn test_limit_rests_without_match() {
        let (mut engine, recorder) = engine_with_recorder(1000);

        place(&mut engine, new_order(1, Side::Buy, OrderType::Limit, 5000, 100));

        assert_eq!(engine.best_bid(), Some(5000));
        assert_eq!(engine.best_ask(), None);
        assert_eq!(engine.live_orders(), 1);
        assert_eq!(engine.order_status(1), Some(OrderStatus::Pending));
        assert_eq!(recorder.trade_count(), 0);
        engine.verify_integrity();
    }

    #[test]
    fn test_full_match_clears_both_sides() {
        let (mut engine, recorder) = engine_with_recorder(1000);

        place(&mut engine, new_order(1, Side::Sell, OrderType::Limit, 5000, 100));
        place(&mut engine, new_order(2, Side::Buy, OrderType::Limit, 5000, 100));

        let trades = recorder.trades();
        assert_eq!(trades.len(), 1);
        assert_eq!(trades[0].aggressor_order_id, 2);
        assert_eq!(trades[0].resting_order_id, 1);
        assert_eq!(trades[0].price, 5000);
        assert_eq!(trades[0].qty, 100);
        assert_eq!(trades[0].aggressor_side, Side::Buy);

        assert_eq!(engine.live_orders(), 0);
        assert_eq!(engine.best_bid(), None);
        assert_eq!(engine.best_ask(), None);
        assert_eq!(engine.stats().by_type(OrderType::Limit).filled, 2);
        engine.verify_integrity();
    }

    #[test]
    fn test_partial_match_aggressor_rests() {
        let (mut engine, recorder) = engine_with_recorder(1000);

        place(&mut engine, new_order(1, Side::Sell, OrderType::Limit, 5000, 40));
        place(&mut engine, new_order(2, Side::Buy, OrderType::Limit, 5000, 100));

        assert_eq!(recorder.trades().len(), 1);
        assert_eq!(recorder.trades()[0].qty, 40);

        assert_eq!(engine.best_bid(), Some(5000));
        assert_eq!(engine.best_ask(), None);
        assert_eq!(engine.depth_at(Side::Buy, 5000), (60, 1));
        assert_eq!(engine.order_status(2), Some(OrderStatus::Partial));
        assert_eq!(engine.stats().by_type(OrderType::Limit).partial_fills, 1);
        engine.verify_integrity();
    }

    #[test]
    fn test_partial_match_resting_remains() {
        let (mut engine, _recorder) = engine_with_recorder(1000);

        place(&mut engine, new_order(1, Side::Sell, OrderType::Limit, 5000, 100));
        place(&mut engine, new_order(2, Side::Buy, OrderType::Limit, 5000, 30));

        assert_eq!(engine.depth_at(Side::Sell, 5000), (70, 1));
        assert_eq!(engine.order_status(1), Some(OrderStatus::Partial));
        assert_eq!(engine.live_orders(), 1);
        engine.verify_integrity();
    }

    #[test]
    fn test_price_priority_across_levels() {
        let (mut engine, recorder) = engine_with_recorder(1000);

        place(&mut engine, new_order(1, Side::Sell, OrderType::Limit, 5020, 100));
        place(&mut engine, new_order(2, Side::Sell, OrderType::Limit, 5000, 100));
        place(&mut engine, new_order(3, Side::Sell, OrderType::Limit, 5010, 100));

        place(&mut engine, new_order(4, Side::Buy, OrderType::Limit, 5020, 250));

        let trades = recorder.trades();
        assert_eq!(trades.len(), 3);
        assert_eq!(trades[0].price, 5000);
        assert_eq!(trades[1].price, 5010);
        assert_eq!(trades[2].price, 5020);
        assert_eq!(trades[2].qty, 50);

        assert_eq!(engine.best_ask(), Some(5020));
        assert_eq!(engine.depth_at(Side::Sell, 5020), (50, 1));
        engine.verify_integrity();
    }

    #[test]
    fn test_time_priority_within_level() {
        let (mut engine, recorder) = engine_with_recorder(1000);

        place(&mut engine, new_order(10, Side::Buy, OrderType::Limit, 5000, 100));
        place(&mut engine, new_order(11, Side::Buy, OrderType::Limit, 5000, 200));
        place(&mut engine, new_order(12, Side::Sell, OrderType::Limit, 5000, 150));

        let trades = recorder.trades();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].resting_order_id, 10);
        assert_eq!(trades[0].qty, 100);
        assert_eq!(trades[1].resting_order_id, 11);
        assert_eq!(trades[1].qty, 50);

        assert_eq!(engine.depth_at(Side::Buy, 5000), (150, 1));
        engine.verify_integrity();
    }

    #[test]
    fn test_ioc_partial_cancels_residual() {
        let (mut engine, recorder) = engine_with_recorder(1000);

        place(&mut engine, new_order(20, Side::Sell, OrderType::Limit, 5000, 40));
        place(&mut engine, new_order(21, Side::Buy, OrderType::Ioc, 5000, 100));

        assert_eq!(recorder.trades().len(), 1);
        assert_eq!(recorder.trades()[0].qty, 40);

        // Residual never rests, book is empty again
        assert_eq!(engine.live_orders(), 0);
        assert_eq!(engine.best_bid(), None);
        assert_eq!(engine.best_ask(), None);
        let ioc = engine.stats().by_type(OrderType::Ioc);
        assert_eq!(ioc.cancelled, 1);
        assert_eq!(ioc.partial_fills, 1);
        engine.verify_integrity();
    }

    #[test]
    fn test_ioc_no_cross_is_pure_cancel() {
        let (mut engine, recorder) = engine_with_recorder(1000);

        place(&mut engine, new_order(1, Side::Sell, OrderType::Limit, 5100, 50));
        let hash_before = engine.state_hash();

        place(&mut engine, new_order(2, Side::Buy, OrderType::Ioc, 5000, 100));

        assert_eq!(recorder.trade_count(), 0);
        assert_eq!(engine.state_hash(), hash_before);
        assert_eq!(engine.stats().by_type(OrderType::Ioc).cancelled, 1);
        assert_eq!(engine.stats().by_type(OrderType::Ioc).partial_fills, 0);
    }

    #[test]
    fn test_fok_infeasible_rejected_book_unchanged() {
        let (mut engine, recorder) = engine_with_recorder(1000);

        place(&mut engine, new_order(30, Side::Sell, OrderType::Limit, 5000, 40));
        let hash_before = engine.state_hash();

        place(&mut engine, new_order(31, Side::Buy, OrderType::Fok, 5000, 100));

        assert_eq!(recorder.trade_count(), 0);
        assert_eq!(engine.state_hash(), hash_before);
        assert_eq!(engine.depth_at(Side::Sell, 5000), (40, 1));
        assert_eq!(engine.stats().by_type(OrderType::Fok).rejected, 1);
        // The rejected id is immediately reusable
        place(&mut engine, new_order(31, Side::Buy, OrderType::Limit, 4000, 10));
        assert_eq!(engine.live_orders(), 2);
        engine.verify_integrity();
    }

    #[test]
    fn test_fok_feasible_across_levels() {
        let (mut engine, recorder) = engine_with_recorder(1000);

        place(&mut engine, new_order(40, Side::Sell, OrderType::Limit, 4999, 30));
        place(&mut engine, new_order(41, Side::Sell, OrderType::Limit, 5000, 80));
        place(&mut engine, new_order(42, Side::Buy, OrderType::Fok, 5000, 100));

        let trades = recorder.trades();
        assert_eq!(trades.len(), 2);
        assert_eq!((trades[0].resting_order_id, trades[0].price, trades[0].qty), (40, 4999, 30));
        assert_eq!((trades[1].resting_order_id, trades[1].price, trades[1].qty), (41, 5000, 70));

        assert_eq!(engine.stats().by_type(OrderType::Fok).filled, 1);
        assert_eq!(engine.depth_at(Side::Sell, 5000), (10, 1));
        engine.verify_integrity();
    }

    #[test]
    fn test_fok_sell_side_symmetric() {
        let (mut engine, recorder) = engine_with_recorder(1000);

        place(&mut engine, new_order(1, Side::Buy, OrderType::Limit, 5001, 60));
        place(&mut engine, new_order(2, Side::Buy, OrderType::Limit, 5000, 60));
        place(&mut engine, new_order(3, Side::Sell, OrderType::Fok, 5000, 100));

        let trades = recorder.trades();
        assert_eq!(trades.len(), 2);
        // Better (higher) bid trades first
        assert_eq!(trades[0].price, 5001);
        assert_eq!(trades[0].qty, 60);
        assert_eq!(trades[1].price, 5000);
        assert_eq!(trades[1].qty, 40);
        engine.verify_integrity();
    }

    #[test]
    fn test_cancel_resting_order() {
        let (mut engine, recorder) = engine_with_recorder(1000);

        place(&mut engine, new_order(50, Side::Buy, OrderType::Limit, 4990, 100));
        engine.handle_cancel(50);

        assert_eq!(engine.live_orders(), 0);
        assert_eq!(engine.best_bid(), None);
        assert_eq!(engine.stats().by_type(OrderType::Limit).cancelled, 1);

        // A sell at the same price now rests instead of trading
        place(&mut engine, new_order(51, Side::Sell, OrderType::Limit, 4990, 100));
        assert_eq!(recorder.trade_count(), 0);
        assert_eq!(engine.depth_at(Side::Sell, 4990), (100, 1));
        engine.verify_integrity();
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let (mut engine, _recorder) = engine_with_recorder(1000);

        place(&mut engine, new_order(1, Side::Buy, OrderType::Limit, 5000, 100));
        engine.handle_cancel(1);
        let hash = engine.state_hash();
        let cancelled = engine.stats().by_type(OrderType::Limit).cancelled;

        // Unknown id, already-cancelled id, out-of-range id: all no-ops
        engine.handle_cancel(1);
        engine.handle_cancel(999);
        engine.handle_cancel(u64::MAX);

        assert_eq!(engine.state_hash(), hash);
        assert_eq!(engine.stats().by_type(OrderType::Limit).cancelled, cancelled);
    }

    #[test]
    fn test_validation_rejects() {
        let (mut engine, _recorder) = engine_with_recorder(1000);

        // Zero quantity
        place(&mut engine, new_order(1, Side::Buy, OrderType::Limit, 5000, 0));
        // Price outside the band
        place(&mut engine, new_order(2, Side::Buy, OrderType::Limit, 10_001, 10));
        place(&mut engine, new_order(3, Side::Sell, OrderType::Limit, -1, 10));
        // Id beyond the map
        place(&mut engine, new_order(5000, Side::Buy, OrderType::Limit, 5000, 10));

        assert_eq!(engine.stats().orders_rejected, 4);
        assert_eq!(engine.live_orders(), 0);

        // Duplicate live id
        place(&mut engine, new_order(7, Side::Buy, OrderType::Limit, 4000, 10));
        place(&mut engine, new_order(7, Side::Sell, OrderType::Limit, 6000, 10));
        assert_eq!(engine.stats().orders_rejected, 5);
        assert_eq!(engine.live_orders(), 1);
    }

    #[test]
    fn test_boundary_prices_accepted() {
        let (mut engine, _recorder) = engine_with_recorder(1000);

        place(&mut engine, new_order(1, Side::Buy, OrderType::Limit, 0, 10));
        place(&mut engine, new_order(2, Side::Sell, OrderType::Limit, 10_000, 10));

        assert_eq!(engine.best_bid(), Some(0));
        assert_eq!(engine.best_ask(), Some(10_000));
        assert_eq!(engine.stats().orders_rejected, 0);
    }

    #[test]
    fn test_capacity_edge_rejects_extra_live_order() {
        let (mut engine, _recorder) = engine_with_recorder(4);

        for i in 0..4 {
            place(&mut engine, new_order(i, Side::Buy, OrderType::Limit, 4000 + i as i64, 10));
        }
        assert_eq!(engine.live_orders(), 4);
        assert_eq!(engine.pool_available(), 0);

        // A fifth live NEW is dropped, everything already resting stays valid
        place(&mut engine, new_order(4_u64, Side::Buy, OrderType::Limit, 4999, 10));
        assert_eq!(engine.live_orders(), 4);
        assert_eq!(engine.stats().orders_rejected, 1);

        // Cancelling frees the slot and the id for reuse
        engine.handle_cancel(0);
        place(&mut engine, new_order(0, Side::Buy, OrderType::Limit, 4999, 10));
        assert_eq!(engine.live_orders(), 4);
        engine.verify_integrity();
    }

    #[test]
    fn test_level_updates_published() {
        let (mut engine, recorder) = engine_with_recorder(1000);

        place(&mut engine, new_order(1, Side::Sell, OrderType::Limit, 5000, 100));
        place(&mut engine, new_order(2, Side::Buy, OrderType::Limit, 5000, 100));

        let updates = recorder.level_updates();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].side, Side::Sell);
        assert_eq!(updates[0].price, 5000);
        // Zero volume signals the level emptied
        assert_eq!(updates[0].volume, 0);
        assert_eq!(updates[0].order_count, 0);
    }

    #[test]
    fn test_snapshot_sorted_and_bounded() {
        let (mut engine, _recorder) = engine_with_recorder(1000);

        for i in 0..5 {
            place(&mut engine, new_order(i, Side::Buy, OrderType::Limit, 4990 - i as i64, 10));
            place(&mut engine, new_order(100 + i, Side::Sell, OrderType::Limit, 5010 + i as i64, 20));
        }

        let snapshot = engine.snapshot(3);
        assert_eq!(snapshot.bids.len(), 3);
        assert_eq!(snapshot.asks.len(), 3);
        // Bids descending from the best
        assert_eq!(snapshot.bids[0].price, 4990);
        assert_eq!(snapshot.bids[2].price, 4988);
        // Asks ascending from the best
        assert_eq!(snapshot.asks[0].price, 5010);
        assert_eq!(snapshot.asks[2].price, 5012);
        assert_eq!(snapshot.asks[0].volume, 20);
    }

    #[test]
    fn test_no_crossed_book_after_any_new() {
        let (mut engine, _recorder) = engine_with_recorder(1000);

        place(&mut engine, new_order(1, Side::Buy, OrderType::Limit, 5000, 50));
        place(&mut engine, new_order(2, Side::Sell, OrderType::Limit, 5005, 50));
        // A buy crossing through the ask resolves before the residual rests
        place(&mut engine, new_order(3, Side::Buy, OrderType::Limit, 5008, 80));

        let (bid, ask) = (engine.best_bid(), engine.best_ask());
        if let (Some(b), Some(a)) = (bid, ask) {
            assert!(b < a);
        }
        assert_eq!(engine.best_bid(), Some(5008));
        assert_eq!(engine.depth_at(Side::Buy, 5008), (30, 1));
        engine.verify_integrity();
    }
}
