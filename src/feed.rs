//! Synthetic feed - the producer side of the pipeline.
//!
//! Generates a seeded, reproducible stream of NEW and CANCEL commands around
//! a random-walking mid price and pushes them into the SPSC ring, yielding
//! while the ring is full. The LIMIT/IOC/FOK/cancel mix is fully
//! configurable rather than baked in.

use crate::clock::Clock;
use crate::command::{CancelOrder, Command, NewOrder, OrderType, Side};
use crate::config::EngineConfig;
use crate::queue::Producer;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// Shape of the generated command stream
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Total commands to generate (NEW plus CANCEL)
    pub total_commands: u64,
    /// Fraction of commands that are NEW orders; the rest are cancels
    pub new_order_ratio: f64,
    /// Fraction of NEW orders priced to cross the mid
    pub aggressive_ratio: f64,
    /// Fraction of NEW orders submitted as IOC
    pub ioc_ratio: f64,
    /// Fraction of NEW orders submitted as FOK
    pub fok_ratio: f64,
    /// Quantity range, inclusive
    pub min_qty: u64,
    pub max_qty: u64,
    /// Max distance from the mid for passive orders
    pub passive_band: i64,
    /// Max distance past the mid for aggressive orders
    pub aggressive_band: i64,
    /// Commands between mid-price random-walk steps
    pub mid_walk_interval: u64,
    /// RNG seed; identical seeds give identical streams
    pub seed: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            total_commands: 1_000_000,
            new_order_ratio: 0.7,
            aggressive_ratio: 0.3,
            ioc_ratio: 0.10,
            fok_ratio: 0.05,
            min_qty: 1,
            max_qty: 1_000,
            passive_band: 50,
            aggressive_band: 20,
            mid_walk_interval: 10_000,
            seed: 0x5EED_F00D,
        }
    }
}

/// Seeded command generator bound to one engine configuration
pub struct FeedGenerator {
    cfg: FeedConfig,
    price_min: i64,
    price_max: i64,
    max_orders: u64,
    rng: ChaCha8Rng,
}

impl FeedGenerator {
    pub fn new(engine: &EngineConfig, cfg: FeedConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(cfg.seed);
        Self {
            price_min: engine.price_min,
            price_max: engine.price_max,
            max_orders: engine.max_orders,
            cfg,
            rng,
        }
    }

    /// Generate and enqueue the whole stream, yielding while the ring is
    /// full. Returns the number of commands enqueued.
    pub fn run(mut self, producer: &mut Producer) -> u64 {
        let clock = Clock::new();
        // Keep the walking mid away from the band edges
        let guard = self.cfg.passive_band + self.cfg.aggressive_band;
        let mut mid = (self.price_min + self.price_max) / 2;
        let mut issued = 0u64;

        while issued < self.cfg.total_commands {
            let mut cmd = self.next_command(mid, &clock);
            while let Err(back) = producer.push(cmd) {
                cmd = back;
                std::thread::yield_now();
            }
            issued += 1;

            if issued % self.cfg.mid_walk_interval == 0 {
                mid += self.rng.gen_range(-10..=10);
                mid = mid.clamp(self.price_min + guard, self.price_max - guard);
            }
        }

        issued
    }

    fn next_command(&mut self, mid: i64, clock: &Clock) -> Command {
        let producer_ts = clock.now_nanos();
        let order_id = self.rng.gen_range(1..self.max_orders);

        if !self.rng.gen_bool(self.cfg.new_order_ratio) {
            return Command::Cancel(CancelOrder {
                order_id,
                producer_ts,
            });
        }

        let side = if self.rng.gen_bool(0.5) {
            Side::Buy
        } else {
            Side::Sell
        };

        let roll: f64 = self.rng.gen();
        let order_type = if roll < self.cfg.ioc_ratio {
            OrderType::Ioc
        } else if roll < self.cfg.ioc_ratio + self.cfg.fok_ratio {
            OrderType::Fok
        } else {
            OrderType::Limit
        };

        let price = if self.rng.gen_bool(self.cfg.aggressive_ratio) {
            // Cross the spread
            let offset = self.rng.gen_range(0..=self.cfg.aggressive_band);
            match side {
                Side::Buy => mid + offset,
                Side::Sell => mid - offset,
            }
        } else {
            // Rest away from the mid
            let offset = self.rng.gen_range(1..=self.cfg.passive_band);
            match side {
                Side::Buy => mid - offset,
                Side::Sell => mid + offset,
            }
        };

        Command::New(NewOrder {
            order_id,
            side,
            order_type,
            price: price.clamp(self.price_min, self.price_max),
            qty: self.rng.gen_range(self.cfg.min_qty..=self.cfg.max_qty),
            producer_ts,
        })
    }
}
