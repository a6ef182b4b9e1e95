//! Market-data events and publishers.
//!
//! The matcher emits trades and level updates as it walks the book;
//! observers never read the book directly. Snapshots are serialised by the
//! matcher between events (single-writer invariant).

use crate::command::{Side, Symbol};
use serde::Serialize;
use std::io::Write;
use std::sync::{Arc, Mutex};
use tracing::warn;

/// One matched quantity slice, emitted exactly once, in matching order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct Trade {
    pub instrument_id: u32,
    pub symbol: Symbol,
    pub aggressor_order_id: u64,
    pub resting_order_id: u64,
    pub aggressor_side: Side,
    pub price: i64,
    pub qty: u64,
    /// Matcher clock, nanoseconds
    pub ts: u64,
}

/// A price level whose aggregate changed during a matching walk.
/// Zero volume signals the level emptied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LevelUpdate {
    pub side: Side,
    pub price: i64,
    pub volume: u64,
    pub order_count: u32,
}

/// One side of a level-2 snapshot entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct LevelEntry {
    pub price: i64,
    pub volume: u64,
    pub order_count: u32,
}

/// On-demand top-of-book snapshot: bids descending, asks ascending
#[derive(Clone, Debug, Serialize)]
pub struct Level2Snapshot {
    pub instrument_id: u32,
    pub symbol: Symbol,
    pub ts: u64,
    pub bids: Vec<LevelEntry>,
    pub asks: Vec<LevelEntry>,
}

/// Consumer of the matcher's event streams.
///
/// Level updates and snapshots are optional streams; the default impls
/// ignore them.
pub trait MarketDataPublisher: Send {
    fn on_trade(&mut self, trade: &Trade);

    fn on_level_update(&mut self, update: &LevelUpdate) {
        let _ = update;
    }

    fn on_snapshot(&mut self, snapshot: &Level2Snapshot) {
        let _ = snapshot;
    }
}

/// Fans events out to the registered publishers
pub struct MarketDataBus {
    publishers: Vec<Box<dyn MarketDataPublisher>>,
    enabled: bool,
}

impl MarketDataBus {
    pub fn new() -> Self {
        Self {
            publishers: Vec::new(),
            enabled: true,
        }
    }

    pub fn add_publisher(&mut self, publisher: Box<dyn MarketDataPublisher>) {
        self.publishers.push(publisher);
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    /// True when publishing would reach at least one sink; lets the matcher
    /// skip event construction entirely otherwise
    #[inline]
    pub fn is_active(&self) -> bool {
        self.enabled && !self.publishers.is_empty()
    }

    pub fn publish_trade(&mut self, trade: &Trade) {
        if !self.enabled {
            return;
        }
        for publisher in &mut self.publishers {
            publisher.on_trade(trade);
        }
    }

    pub fn publish_level_update(&mut self, update: &LevelUpdate) {
        if !self.enabled {
            return;
        }
        for publisher in &mut self.publishers {
            publisher.on_level_update(update);
        }
    }

    pub fn publish_snapshot(&mut self, snapshot: &Level2Snapshot) {
        if !self.enabled {
            return;
        }
        for publisher in &mut self.publishers {
            publisher.on_snapshot(snapshot);
        }
    }
}

impl Default for MarketDataBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Prints trades (and optionally level updates) to stdout
pub struct ConsolePublisher {
    verbose: bool,
}

impl ConsolePublisher {
    /// Trades only
    pub fn new() -> Self {
        Self { verbose: false }
    }

    /// Trades plus level updates
    pub fn verbose() -> Self {
        Self { verbose: true }
    }
}

impl Default for ConsolePublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketDataPublisher for ConsolePublisher {
    fn on_trade(&mut self, trade: &Trade) {
        println!(
            "TRADE: {} aggressor={} resting={} price={} qty={}",
            trade.symbol, trade.aggressor_order_id, trade.resting_order_id, trade.price, trade.qty
        );
    }

    fn on_level_update(&mut self, update: &LevelUpdate) {
        if self.verbose {
            println!(
                "L2: {:?} price={} volume={} orders={}",
                update.side, update.price, update.volume, update.order_count
            );
        }
    }

    fn on_snapshot(&mut self, snapshot: &Level2Snapshot) {
        println!(
            "SNAPSHOT {} bids={} asks={}",
            snapshot.symbol,
            snapshot.bids.len(),
            snapshot.asks.len()
        );
        for entry in &snapshot.bids {
            println!("  BID {} x {}", entry.price, entry.volume);
        }
        for entry in &snapshot.asks {
            println!("  ASK {} x {}", entry.price, entry.volume);
        }
    }
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireEvent<'a> {
    Trade(&'a Trade),
    LevelUpdate(&'a LevelUpdate),
    Snapshot(&'a Level2Snapshot),
}

/// Writes each event as one JSON line, for recording and replay tooling
pub struct JsonLinesPublisher<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> JsonLinesPublisher<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    fn write_event(&mut self, event: &WireEvent<'_>) {
        let result = serde_json::to_writer(&mut self.out, event)
            .map_err(std::io::Error::from)
            .and_then(|()| self.out.write_all(b"\n"));
        if let Err(err) = result {
            warn!(error = %err, "market data write failed");
        }
    }
}

impl<W: Write + Send> MarketDataPublisher for JsonLinesPublisher<W> {
    fn on_trade(&mut self, trade: &Trade) {
        self.write_event(&WireEvent::Trade(trade));
    }

    fn on_level_update(&mut self, update: &LevelUpdate) {
        self.write_event(&WireEvent::LevelUpdate(update));
    }

    fn on_snapshot(&mut self, snapshot: &Level2Snapshot) {
        self.write_event(&WireEvent::Snapshot(snapshot));
    }
}

/// Collects events in memory; the handle can be cloned and read from tests
#[derive(Clone, Default)]
pub struct RecordingPublisher {
    trades: Arc<Mutex<Vec<Trade>>>,
    level_updates: Arc<Mutex<Vec<LevelUpdate>>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A second handle onto the same buffers
    pub fn handle(&self) -> Self {
        self.clone()
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.trades.lock().unwrap().clone()
    }

    pub fn level_updates(&self) -> Vec<LevelUpdate> {
        self.level_updates.lock().unwrap().clone()
    }

    pub fn trade_count(&self) -> usize {
        self.trades.lock().unwrap().len()
    }

    pub fn clear(&self) {
        self.trades.lock().unwrap().clear();
        self.level_updates.lock().unwrap().clear();
    }
}

impl MarketDataPublisher for RecordingPublisher {
    fn on_trade(&mut self, trade: &Trade) {
        self.trades.lock().unwrap().push(*trade);
    }

    fn on_level_update(&mut self, update: &LevelUpdate) {
        self.level_updates.lock().unwrap().push(*update);
    }
}
