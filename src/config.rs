//! Engine configuration, supplied once at construction.
//!
//! There is no module-scope mutable state anywhere in the crate: everything
//! that was a compile-time constant in older designs (price band, pool size,
//! ring capacity) lives here and is validated before any memory is reserved.

use crate::command::Symbol;
use thiserror::Error;

/// Configuration rejected at engine construction
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("price_min {min} must not exceed price_max {max}")]
    InvalidPriceRange { min: i64, max: i64 },

    #[error("max_orders {0} must be nonzero and below u32::MAX")]
    InvalidMaxOrders(u64),

    #[error("ring capacity {0} must be a power of two, at least 2")]
    InvalidRingCapacity(usize),
}

/// Init-time configuration for the whole pipeline.
///
/// `max_orders` sizes both the order pool and the direct id map, so order
/// ids are expected to be `< max_orders`. `ring_capacity` must be a power
/// of two; one slot is reserved to distinguish full from empty.
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Lowest representable price, in ticks
    pub price_min: i64,
    /// Highest representable price, in ticks
    pub price_max: i64,
    /// Order pool capacity and id-map length
    pub max_orders: u64,
    /// SPSC command ring capacity (power of two)
    pub ring_capacity: usize,
    /// Instrument id attached to market-data events
    pub instrument_id: u32,
    /// Instrument symbol attached to market-data events
    pub symbol: Symbol,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            price_min: 0,
            price_max: 10_000,
            max_orders: 1_000_000,
            ring_capacity: 1 << 20,
            instrument_id: 1,
            symbol: Symbol::new("GRID"),
        }
    }
}

impl EngineConfig {
    /// Check the configuration before any storage is reserved
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.price_min > self.price_max {
            return Err(ConfigError::InvalidPriceRange {
                min: self.price_min,
                max: self.price_max,
            });
        }
        // u32 slot handles, with u32::MAX reserved as the null sentinel
        if self.max_orders == 0 || self.max_orders >= u64::from(u32::MAX) {
            return Err(ConfigError::InvalidMaxOrders(self.max_orders));
        }
        if self.ring_capacity < 2 || !self.ring_capacity.is_power_of_two() {
            return Err(ConfigError::InvalidRingCapacity(self.ring_capacity));
        }
        Ok(())
    }

    /// Number of price levels per side in the direct-indexed grid
    #[inline]
    pub fn price_levels(&self) -> usize {
        (self.price_max - self.price_min + 1) as usize
    }
}
