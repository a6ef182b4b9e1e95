//! End-to-end throughput and latency report.
//!
//! Spawns the feed producer and the pinned matcher thread joined by the SPSC
//! ring, runs a configurable number of commands, then prints throughput,
//! conservation checks and trade-latency percentiles.
//!
//! Environment overrides: TOTAL_COMMANDS, MAX_ORDERS, RING_CAPACITY, SEED.

use grid_lob::{CommandQueue, Engine, EngineConfig, FeedConfig, FeedGenerator};
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let engine_cfg = EngineConfig {
        max_orders: env_u64("MAX_ORDERS", 1_000_000),
        ring_capacity: env_u64("RING_CAPACITY", 1 << 20) as usize,
        ..EngineConfig::default()
    };
    let feed_cfg = FeedConfig {
        total_commands: env_u64("TOTAL_COMMANDS", 5_000_000),
        seed: env_u64("SEED", 0x5EED_F00D),
        ..FeedConfig::default()
    };

    let mut engine = match Engine::new(&engine_cfg) {
        Ok(engine) => engine,
        Err(err) => {
            eprintln!("invalid configuration: {err}");
            std::process::exit(1);
        }
    };

    println!("grid-lob throughput report");
    println!("==========================");
    println!("commands:      {}", feed_cfg.total_commands);
    println!("max orders:    {}", engine_cfg.max_orders);
    println!("ring capacity: {}", engine_cfg.ring_capacity);
    println!();

    let (mut producer, mut consumer) = CommandQueue::with_capacity(engine_cfg.ring_capacity);
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_matcher = Arc::clone(&shutdown);

    let start = Instant::now();

    let matcher_thread = std::thread::spawn(move || {
        engine.pin_to_core();
        engine.warm_up();
        engine.run(&mut consumer, &shutdown_matcher);
        engine
    });

    let feed = FeedGenerator::new(&engine_cfg, feed_cfg);
    let producer_thread = std::thread::spawn(move || feed.run(&mut producer));

    let issued = producer_thread.join().expect("producer thread panicked");
    shutdown.store(true, Ordering::Release);
    let engine = matcher_thread.join().expect("matcher thread panicked");

    let elapsed = start.elapsed();
    let stats = engine.matcher.stats();

    println!("\n=== RUN ===");
    println!("Wall time:       {} ms", elapsed.as_millis());
    println!("Commands issued: {issued}");
    println!(
        "Throughput:      {:.0} commands/sec",
        stats.orders_processed as f64 / elapsed.as_secs_f64()
    );

    let mut stdout = std::io::stdout().lock();
    writeln!(stdout).unwrap();
    stats.write_summary(&mut stdout).unwrap();

    println!("\n=== CORRECTNESS ===");
    println!(
        "Match balance: {}",
        if stats.quantity_conserved() {
            "PASS"
        } else {
            "FAIL"
        }
    );
    println!("Resting orders at exit: {}", engine.live_orders());
}
