//! Engine counters and latency statistics.
//!
//! Errors never cross the thread boundary and the matcher never aborts;
//! everything observable about failures lives in these counters. Per-trade
//! latency is sampled into an HDR histogram so tail percentiles survive
//! multi-million-event runs without keeping every sample.

use crate::command::OrderType;
use hdrhistogram::Histogram;
use std::io::{self, Write};

/// Per-order-type lifecycle counters
#[derive(Clone, Copy, Debug, Default)]
pub struct OrderTypeStats {
    pub submitted: u64,
    pub filled: u64,
    pub partial_fills: u64,
    pub cancelled: u64,
    pub rejected: u64,
}

/// Counters owned by the matcher thread
pub struct EngineStats {
    /// Commands consumed from the ring (NEW and CANCEL)
    pub orders_processed: u64,
    /// Trades executed (one per matched quantity slice)
    pub trades_executed: u64,
    /// Commands dropped: invalid, duplicate id, or pool exhausted
    pub orders_rejected: u64,
    /// Total quantity matched on the buy side
    pub total_buy_qty_matched: u64,
    /// Total quantity matched on the sell side; always equals the buy total
    pub total_sell_qty_matched: u64,

    by_type: [OrderTypeStats; OrderType::COUNT],
    latency_ns: Histogram<u64>,
}

impl EngineStats {
    pub fn new() -> Self {
        Self {
            orders_processed: 0,
            trades_executed: 0,
            orders_rejected: 0,
            total_buy_qty_matched: 0,
            total_sell_qty_matched: 0,
            by_type: [OrderTypeStats::default(); OrderType::COUNT],
            // 3 significant figures, auto-resizing upper bound
            latency_ns: Histogram::new(3).expect("3 is a valid sigfig count"),
        }
    }

    /// Record one executed trade and its dequeue-to-execution latency
    #[inline]
    pub fn record_trade(&mut self, latency_ns: u64, qty: u64) {
        self.trades_executed += 1;
        self.total_buy_qty_matched += qty;
        self.total_sell_qty_matched += qty;
        // Histogram values start at 1; clamp a same-tick sample up
        let _ = self.latency_ns.record(latency_ns.max(1));
    }

    /// Counters for one order type
    #[inline]
    pub fn by_type(&self, order_type: OrderType) -> &OrderTypeStats {
        &self.by_type[order_type.index()]
    }

    #[inline]
    pub(crate) fn by_type_mut(&mut self, order_type: OrderType) -> &mut OrderTypeStats {
        &mut self.by_type[order_type.index()]
    }

    /// Trade latency at a quantile in [0.0, 1.0], nanoseconds
    #[inline]
    pub fn latency_at_quantile(&self, quantile: f64) -> u64 {
        self.latency_ns.value_at_quantile(quantile)
    }

    /// Worst observed trade latency, nanoseconds
    #[inline]
    pub fn max_latency(&self) -> u64 {
        self.latency_ns.max()
    }

    /// Number of latency samples recorded
    #[inline]
    pub fn latency_samples(&self) -> u64 {
        self.latency_ns.len()
    }

    /// Buy-matched quantity always equals sell-matched quantity
    #[inline]
    pub fn quantity_conserved(&self) -> bool {
        self.total_buy_qty_matched == self.total_sell_qty_matched
    }

    /// Write a human-readable run summary
    pub fn write_summary<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "=== ENGINE STATISTICS ===")?;
        writeln!(out, "Orders processed: {}", self.orders_processed)?;
        writeln!(out, "Orders rejected:  {}", self.orders_rejected)?;
        writeln!(out, "Trades executed:  {}", self.trades_executed)?;
        writeln!(
            out,
            "Matched quantity: buy={} sell={} ({})",
            self.total_buy_qty_matched,
            self.total_sell_qty_matched,
            if self.quantity_conserved() {
                "balanced"
            } else {
                "IMBALANCED"
            }
        )?;

        writeln!(out, "\n=== ORDER TYPE STATISTICS ===")?;
        for order_type in [OrderType::Limit, OrderType::Ioc, OrderType::Fok] {
            let s = self.by_type(order_type);
            writeln!(out, "{} orders:", order_type.name())?;
            writeln!(out, "  Submitted:     {}", s.submitted)?;
            writeln!(out, "  Filled:        {}", s.filled)?;
            writeln!(out, "  Partial fills: {}", s.partial_fills)?;
            writeln!(out, "  Cancelled:     {}", s.cancelled)?;
            writeln!(out, "  Rejected:      {}", s.rejected)?;
            if s.submitted > 0 {
                let fill_rate = (s.filled + s.partial_fills) as f64 / s.submitted as f64 * 100.0;
                writeln!(out, "  Fill rate:     {fill_rate:.2}%")?;
            }
        }

        if self.latency_samples() > 0 {
            writeln!(out, "\n=== TRADE LATENCY (ns) ===")?;
            writeln!(out, "Samples: {}", self.latency_samples())?;
            writeln!(out, "P50:     {}", self.latency_at_quantile(0.50))?;
            writeln!(out, "P90:     {}", self.latency_at_quantile(0.90))?;
            writeln!(out, "P99:     {}", self.latency_at_quantile(0.99))?;
            writeln!(out, "P99.9:   {}", self.latency_at_quantile(0.999))?;
            writeln!(out, "Max:     {}", self.max_latency())?;
        }
        Ok(())
    }
}

impl Default for EngineStats {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EngineStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineStats")
            .field("orders_processed", &self.orders_processed)
            .field("trades_executed", &self.trades_executed)
            .field("orders_rejected", &self.orders_rejected)
            .field("total_buy_qty_matched", &self.total_buy_qty_matched)
            .field("total_sell_qty_matched", &self.total_sell_qty_matched)
            .finish()
    }
}
