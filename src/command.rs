//! Command and core value types shared by the feed producer and the matcher.
//!
//! Commands are plain `Copy` values: they are written into ring-buffer slots
//! by the producer and consumed exactly once by the matcher thread.

use serde::Serialize;
use std::fmt;

/// Order side (buy = bid, sell = ask)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[repr(u8)]
pub enum Side {
    /// Buy side (bids)
    Buy = 0,
    /// Sell side (asks)
    Sell = 1,
}

impl Side {
    /// Returns the opposite side
    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order type determines matching behavior
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize)]
#[repr(u8)]
pub enum OrderType {
    /// Limit order - rests in book if not fully matched (default)
    #[default]
    Limit = 0,
    /// Immediate-Or-Cancel - cancel any unfilled portion immediately
    Ioc = 1,
    /// Fill-Or-Kill - all-or-nothing execution, reject if can't fully fill
    Fok = 2,
}

impl OrderType {
    /// Number of order types, for per-type statistics arrays
    pub const COUNT: usize = 3;

    #[inline]
    pub(crate) const fn index(self) -> usize {
        self as usize
    }

    /// Human-readable name
    pub const fn name(self) -> &'static str {
        match self {
            OrderType::Limit => "LIMIT",
            OrderType::Ioc => "IOC",
            OrderType::Fok => "FOK",
        }
    }
}

/// Lifecycle state of an order.
///
/// `Filled`, `Cancelled` and `Rejected` are terminal: the slot is released
/// and the id becomes reusable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum OrderStatus {
    /// Resting, nothing traded yet
    Pending = 0,
    /// Resting, some of the original quantity already traded
    Partial = 1,
    /// Fully traded (terminal)
    Filled = 2,
    /// Cancelled by request or as an IOC residual (terminal)
    Cancelled = 3,
    /// Refused at admission, e.g. an infeasible FOK (terminal)
    Rejected = 4,
}

/// Instrument symbol, 8 bytes fixed so events stay `Copy` and the hot path
/// never allocates.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[repr(align(8))]
pub struct Symbol([u8; 8]);

impl Symbol {
    /// Create a symbol from a string, truncated to 8 bytes
    #[inline]
    pub fn new(s: &str) -> Self {
        let mut bytes = [0u8; 8];
        let len = s.len().min(8);
        bytes[..len].copy_from_slice(&s.as_bytes()[..len]);
        Self(bytes)
    }

    /// The symbol as a string slice, without trailing padding
    #[inline]
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0)
            .unwrap_or("INVALID")
            .trim_end_matches('\0')
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.as_str())
    }
}

impl Serialize for Symbol {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Submit a new order
#[derive(Clone, Copy, Debug)]
pub struct NewOrder {
    /// External order ID, unique across live orders, `< max_orders`
    pub order_id: u64,
    /// Order side
    pub side: Side,
    /// Order type (Limit, IOC, FOK)
    pub order_type: OrderType,
    /// Price in ticks
    pub price: i64,
    /// Order quantity
    pub qty: u64,
    /// Producer clock at enqueue time, nanoseconds
    pub producer_ts: u64,
}

/// Cancel a resting order
#[derive(Clone, Copy, Debug)]
pub struct CancelOrder {
    /// Order ID to cancel
    pub order_id: u64,
    /// Producer clock at enqueue time, nanoseconds
    pub producer_ts: u64,
}

/// Input commands carried producer -> matcher over the SPSC ring
#[derive(Clone, Copy, Debug)]
pub enum Command {
    /// Submit a new order
    New(NewOrder),
    /// Cancel a resting order
    Cancel(CancelOrder),
}

impl Command {
    /// The order id this command refers to
    #[inline]
    pub fn order_id(&self) -> u64 {
        match self {
            Command::New(n) => n.order_id,
            Command::Cancel(c) => c.order_id,
        }
    }
}
