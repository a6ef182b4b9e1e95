//! Order book - per-side direct-indexed price grid.
//!
//! Both sides are flat arrays of [`PriceLevel`] indexed by
//! `price - price_min`, so level lookup is a single array access instead of
//! an ordered-map walk. The cost is `O(price_levels)` memory per side,
//! acceptable for bounded-tick instruments, and a bounded rescan when the
//! best level clears.
//!
//! The book is owned exclusively by the matcher thread and is not
//! thread-safe. Observers receive events; they never read the book.

use crate::command::Side;
use crate::pool::{OrderPool, SlotIndex};
use crate::price_level::PriceLevel;

/// Two-sided book over a bounded tick range
pub struct Book {
    price_min: i64,
    price_max: i64,
    /// Bid levels, index = price - price_min
    bid_levels: Vec<PriceLevel>,
    /// Ask levels, index = price - price_min
    ask_levels: Vec<PriceLevel>,
    /// Highest non-empty bid price; `None` when the side is empty
    best_bid: Option<i64>,
    /// Lowest non-empty ask price; `None` when the side is empty
    best_ask: Option<i64>,
}

impl Book {
    pub fn new(price_min: i64, price_max: i64) -> Self {
        assert!(price_min <= price_max);
        let levels = (price_max - price_min + 1) as usize;
        Self {
            price_min,
            price_max,
            bid_levels: vec![PriceLevel::new(); levels],
            ask_levels: vec![PriceLevel::new(); levels],
            best_bid: None,
            best_ask: None,
        }
    }

    /// Highest non-empty bid price
    #[inline]
    pub fn best_bid(&self) -> Option<i64> {
        self.best_bid
    }

    /// Lowest non-empty ask price
    #[inline]
    pub fn best_ask(&self) -> Option<i64> {
        self.best_ask
    }

    /// Best price an aggressor on `side` would match against
    #[inline]
    pub fn best_opposite(&self, side: Side) -> Option<i64> {
        match side {
            Side::Buy => self.best_ask,
            Side::Sell => self.best_bid,
        }
    }

    /// Level at `price` on `side`, or `None` if the price is out of range
    #[inline]
    pub fn level(&self, side: Side, price: i64) -> Option<&PriceLevel> {
        if price < self.price_min || price > self.price_max {
            return None;
        }
        let idx = (price - self.price_min) as usize;
        Some(match side {
            Side::Buy => &self.bid_levels[idx],
            Side::Sell => &self.ask_levels[idx],
        })
    }

    /// Mutable level access for the matching walk; `price` must be in range
    #[inline]
    pub(crate) fn level_mut(&mut self, side: Side, price: i64) -> &mut PriceLevel {
        debug_assert!(price >= self.price_min && price <= self.price_max);
        let idx = (price - self.price_min) as usize;
        match side {
            Side::Buy => &mut self.bid_levels[idx],
            Side::Sell => &mut self.ask_levels[idx],
        }
    }

    /// Append a resting order at the tail of its price level.
    ///
    /// The cached best improves only when the new price strictly betters it
    /// or the side was empty; an explicit empty check on both sides, never a
    /// sentinel comparison.
    pub fn insert(&mut self, pool: &mut OrderPool, index: SlotIndex) {
        let (side, price) = {
            let order = pool.order(index);
            (order.side, order.price)
        };
        debug_assert!(price >= self.price_min && price <= self.price_max);

        self.level_mut(side, price).append(pool, index);

        match side {
            Side::Buy => {
                if self.best_bid.map_or(true, |best| price > best) {
                    self.best_bid = Some(price);
                }
            }
            Side::Sell => {
                if self.best_ask.map_or(true, |best| price < best) {
                    self.best_ask = Some(price);
                }
            }
        }
    }

    /// Remove a resting order (cancel path).
    ///
    /// When the level drains and its price was the best on that side, the
    /// new best is found by rescanning outward. The rescan is bounded by the
    /// price range and only runs when the top level clears.
    pub fn remove(&mut self, pool: &mut OrderPool, index: SlotIndex) {
        let (side, price) = {
            let order = pool.order(index);
            (order.side, order.price)
        };

        let level = self.level_mut(side, price);
        level.unlink(pool, index);
        if level.is_empty() {
            self.on_level_drained(side, price);
        }
    }

    /// Unlink an order without touching the best caches.
    ///
    /// Used inside the matching walk, which settles the best pointer once
    /// per drained level rather than once per unlinked order.
    #[inline]
    pub(crate) fn unlink(&mut self, pool: &mut OrderPool, index: SlotIndex) {
        let (side, price) = {
            let order = pool.order(index);
            (order.side, order.price)
        };
        self.level_mut(side, price).unlink(pool, index);
    }

    /// Re-resolve the cached best after the level at `price` emptied
    pub(crate) fn on_level_drained(&mut self, side: Side, price: i64) {
        debug_assert!(self.level(side, price).is_some_and(PriceLevel::is_empty));
        match side {
            Side::Buy => {
                if self.best_bid == Some(price) {
                    self.rescan_best_bid();
                }
            }
            Side::Sell => {
                if self.best_ask == Some(price) {
                    self.rescan_best_ask();
                }
            }
        }
    }

    /// Scan downward from price_max for the new best bid
    fn rescan_best_bid(&mut self) {
        self.best_bid = None;
        for idx in (0..self.bid_levels.len()).rev() {
            if !self.bid_levels[idx].is_empty() {
                self.best_bid = Some(self.price_min + idx as i64);
                break;
            }
        }
    }

    /// Scan upward from price_min for the new best ask
    fn rescan_best_ask(&mut self) {
        self.best_ask = None;
        for idx in 0..self.ask_levels.len() {
            if !self.ask_levels[idx].is_empty() {
                self.best_ask = Some(self.price_min + idx as i64);
                break;
            }
        }
    }

    /// `(volume, order_count)` at a price, `(0, 0)` for empty or
    /// out-of-range levels
    #[inline]
    pub fn depth_at(&self, side: Side, price: i64) -> (u64, u32) {
        self.level(side, price)
            .map(|l| (l.volume, l.count))
            .unwrap_or((0, 0))
    }

    /// Spread between best ask and best bid, when both sides are non-empty
    pub fn spread(&self) -> Option<i64> {
        match (self.best_bid, self.best_ask) {
            (Some(bid), Some(ask)) => Some(ask - bid),
            _ => None,
        }
    }

    #[inline]
    pub fn price_min(&self) -> i64 {
        self.price_min
    }

    #[inline]
    pub fn price_max(&self) -> i64 {
        self.price_max
    }
}

impl std::fmt::Debug for Book {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Book")
            .field("price_min", &self.price_min)
            .field("price_max", &self.price_max)
            .field("best_bid", &self.best_bid)
            .field("best_ask", &self.best_ask)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{OrderStatus, OrderType};

    fn seed_order(
        pool: &mut OrderPool,
        order_id: u64,
        side: Side,
        price: i64,
        qty: u64,
    ) -> SlotIndex {
        let idx = pool.allocate().unwrap();
        let order = pool.order_mut(idx);
        order.order_id = order_id;
        order.side = side;
        order.order_type = OrderType::Limit;
        order.price = price;
        order.remaining_qty = qty;
        order.original_qty = qty;
        order.status = OrderStatus::Pending;
        idx
    }

    #[test]
    fn test_empty_book() {
        let book = Book::new(0, 10_000);
        assert_eq!(book.best_bid(), None);
        assert_eq!(book.best_ask(), None);
        assert_eq!(book.spread(), None);
        assert_eq!(book.depth_at(Side::Buy, 5000), (0, 0));
    }

    #[test]
    fn test_insert_tracks_best_bid() {
        let mut pool = OrderPool::with_capacity(100);
        let mut book = Book::new(0, 10_000);

        let a = seed_order(&mut pool, 1, Side::Buy, 5000, 100);
        book.insert(&mut pool, a);
        assert_eq!(book.best_bid(), Some(5000));

        // Strictly better price improves the best
        let b = seed_order(&mut pool, 2, Side::Buy, 5010, 100);
        book.insert(&mut pool, b);
        assert_eq!(book.best_bid(), Some(5010));

        // Worse price leaves the best untouched
        let c = seed_order(&mut pool, 3, Side::Buy, 4990, 100);
        book.insert(&mut pool, c);
        assert_eq!(book.best_bid(), Some(5010));
    }

    #[test]
    fn test_insert_tracks_best_ask() {
        let mut pool = OrderPool::with_capacity(100);
        let mut book = Book::new(0, 10_000);

        let a = seed_order(&mut pool, 1, Side::Sell, 5100, 100);
        book.insert(&mut pool, a);
        assert_eq!(book.best_ask(), Some(5100));

        let b = seed_order(&mut pool, 2, Side::Sell, 5080, 100);
        book.insert(&mut pool, b);
        assert_eq!(book.best_ask(), Some(5080));

        let c = seed_order(&mut pool, 3, Side::Sell, 5200, 100);
        book.insert(&mut pool, c);
        assert_eq!(book.best_ask(), Some(5080));
    }

    #[test]
    fn test_boundary_prices_accepted() {
        let mut pool = OrderPool::with_capacity(100);
        let mut book = Book::new(0, 10_000);

        let lo = seed_order(&mut pool, 1, Side::Buy, 0, 10);
        let hi = seed_order(&mut pool, 2, Side::Sell, 10_000, 10);
        book.insert(&mut pool, lo);
        book.insert(&mut pool, hi);

        assert_eq!(book.best_bid(), Some(0));
        assert_eq!(book.best_ask(), Some(10_000));
    }

    #[test]
    fn test_remove_rescans_best() {
        let mut pool = OrderPool::with_capacity(100);
        let mut book = Book::new(0, 10_000);

        let a = seed_order(&mut pool, 1, Side::Buy, 5020, 100);
        let b = seed_order(&mut pool, 2, Side::Buy, 5000, 100);
        let c = seed_order(&mut pool, 3, Side::Buy, 4950, 100);
        book.insert(&mut pool, a);
        book.insert(&mut pool, b);
        book.insert(&mut pool, c);
        assert_eq!(book.best_bid(), Some(5020));

        book.remove(&mut pool, a);
        assert_eq!(book.best_bid(), Some(5000));

        book.remove(&mut pool, b);
        assert_eq!(book.best_bid(), Some(4950));

        book.remove(&mut pool, c);
        assert_eq!(book.best_bid(), None);
    }

    #[test]
    fn test_remove_below_best_keeps_best() {
        let mut pool = OrderPool::with_capacity(100);
        let mut book = Book::new(0, 10_000);

        let a = seed_order(&mut pool, 1, Side::Sell, 5100, 100);
        let b = seed_order(&mut pool, 2, Side::Sell, 5200, 100);
        book.insert(&mut pool, a);
        book.insert(&mut pool, b);

        book.remove(&mut pool, b);
        assert_eq!(book.best_ask(), Some(5100));
    }

    #[test]
    fn test_depth_aggregates_same_level() {
        let mut pool = OrderPool::with_capacity(100);
        let mut book = Book::new(0, 10_000);

        for i in 0..3 {
            let idx = seed_order(&mut pool, i, Side::Buy, 5000, 100 + i);
            book.insert(&mut pool, idx);
        }

        let (volume, count) = book.depth_at(Side::Buy, 5000);
        assert_eq!(volume, 100 + 101 + 102);
        assert_eq!(count, 3);
    }

    #[test]
    fn test_spread() {
        let mut pool = OrderPool::with_capacity(100);
        let mut book = Book::new(0, 10_000);

        let bid = seed_order(&mut pool, 1, Side::Buy, 5000, 100);
        let ask = seed_order(&mut pool, 2, Side::Sell, 5005, 100);
        book.insert(&mut pool, bid);
        book.insert(&mut pool, ask);

        assert_eq!(book.spread(), Some(5));
    }

    #[test]
    fn test_out_of_range_level_lookup() {
        let book = Book::new(100, 200);
        assert!(book.level(Side::Buy, 99).is_none());
        assert!(book.level(Side::Sell, 201).is_none());
        assert!(book.level(Side::Buy, 100).is_some());
        assert!(book.level(Side::Sell, 200).is_some());
    }
}
