//! # grid-lob
//!
//! A single-instrument limit order book matching engine built around a
//! direct-indexed price grid and a lock-free SPSC command pipeline.
//!
//! ## Design Principles
//!
//! - **Single-Writer**: one thread owns the book, pool and id map (no locks)
//! - **Direct indexing**: price levels and order ids resolve with one array
//!   access over a bounded tick range
//! - **Allocation-free hot path**: every order record is pre-allocated in a
//!   pooled arena addressed by 32-bit handles
//! - **Minimal fences**: the producer and matcher synchronise only through
//!   the acquire/release pair on the ring indices
//!
//! ## Architecture
//!
//! ```text
//! [Feed Producer] --> [SPSC Ring Buffer] --> [Matcher Thread (Pinned)]
//!       |                                            |
//!  [Risk Gate]                            [Trades / L2 Events / Stats]
//! ```

pub mod book;
pub mod clock;
pub mod command;
pub mod config;
pub mod engine;
pub mod feed;
pub mod market_data;
pub mod matching;
pub mod pool;
pub mod price_level;
pub mod queue;
pub mod risk;
pub mod stats;

// Re-exports for convenience
pub use book::Book;
pub use clock::Clock;
pub use command::{CancelOrder, Command, NewOrder, OrderStatus, OrderType, Side, Symbol};
pub use config::{ConfigError, EngineConfig};
pub use engine::Engine;
pub use feed::{FeedConfig, FeedGenerator};
pub use market_data::{
    ConsolePublisher, JsonLinesPublisher, Level2Snapshot, LevelEntry, LevelUpdate, MarketDataBus,
    MarketDataPublisher, RecordingPublisher, Trade,
};
pub use matching::MatchingEngine;
pub use pool::{Order, OrderPool, SlotIndex, NULL_INDEX};
pub use price_level::PriceLevel;
pub use queue::{CommandQueue, Consumer, Producer};
pub use risk::{RiskGate, RiskLimits, RiskReject};
pub use stats::{EngineStats, OrderTypeStats};
