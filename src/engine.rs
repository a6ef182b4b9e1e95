//! Engine - the matcher thread's event loop.
//!
//! Dequeues one command at a time from the SPSC ring, stamps the processing
//! start, and dispatches to the matching core. The loop spins on an empty
//! queue (trading CPU for minimum wake latency) and only exits once a
//! shutdown flag is set AND the queue has drained, so no command is lost.

use crate::command::Command;
use crate::config::{ConfigError, EngineConfig};
use crate::matching::MatchingEngine;
use crate::queue::Consumer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::info;

/// Matching core plus its run loop
pub struct Engine {
    /// The underlying matching engine
    pub matcher: MatchingEngine,
}

impl Engine {
    pub fn new(config: &EngineConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            matcher: MatchingEngine::new(config)?,
        })
    }

    /// Run until `shutdown` is observed with an empty queue.
    ///
    /// The flag is the only external control; there are no per-command
    /// timeouts and the matcher never blocks on a lock.
    pub fn run(&mut self, input: &mut Consumer, shutdown: &AtomicBool) {
        info!("matcher loop started");
        loop {
            match input.pop() {
                Some(cmd) => self.process_command(cmd),
                None => {
                    if shutdown.load(Ordering::Acquire) {
                        break;
                    }
                    std::hint::spin_loop();
                }
            }
        }
        info!(
            orders_processed = self.matcher.stats().orders_processed,
            trades_executed = self.matcher.stats().trades_executed,
            "matcher loop stopped"
        );
    }

    /// Process a single command; the entry point for synchronous use
    /// (tests, benchmarks).
    #[inline]
    pub fn process_command(&mut self, cmd: Command) {
        let t0 = Instant::now();
        match cmd {
            Command::New(new) => self.matcher.handle_new(new, t0),
            Command::Cancel(cancel) => self.matcher.handle_cancel(cancel.order_id),
        }
        self.matcher.stats_mut().orders_processed += 1;
    }

    /// Pin the current thread to the last available CPU core; the last core
    /// is typically the one isolated from OS interrupts.
    pub fn pin_to_core(&self) {
        if let Some(core_ids) = core_affinity::get_core_ids() {
            if let Some(last_core) = core_ids.last() {
                core_affinity::set_for_current(*last_core);
                info!(core = last_core.id, "matcher pinned");
            }
        }
    }

    /// Pre-fault pool pages before the run starts
    pub fn warm_up(&mut self) {
        self.matcher.warm_up();
    }

    #[inline]
    pub fn best_bid(&self) -> Option<i64> {
        self.matcher.best_bid()
    }

    #[inline]
    pub fn best_ask(&self) -> Option<i64> {
        self.matcher.best_ask()
    }

    #[inline]
    pub fn live_orders(&self) -> u64 {
        self.matcher.live_orders()
    }

    #[inline]
    pub fn state_hash(&self) -> u64 {
        self.matcher.state_hash()
    }
}
