//! Lock-free single-producer single-consumer command ring.
//!
//! The feed thread and the matcher thread synchronise solely through the two
//! atomic indices of this ring; nothing else is shared. The ordering rules
//! are the minimal ones that make the slot writes visible:
//!
//! - each side loads its own index relaxed (it is the only writer of it),
//! - loads the other side's index with acquire,
//! - publishes its own advance with release.
//!
//! Capacity is a power of two so indexing is a bitwise mask, and one slot is
//! reserved to distinguish full from empty: effective capacity is `n - 1`.
//! Head and tail live on separate cache lines so the producer and consumer
//! never contend on the same line.

use crate::command::Command;
use crossbeam_utils::CachePadded;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Shared {
    /// Next slot the producer writes; only the producer stores it
    head: CachePadded<AtomicUsize>,
    /// Next slot the consumer reads; only the consumer stores it
    tail: CachePadded<AtomicUsize>,
    mask: usize,
    slots: Box<[UnsafeCell<MaybeUninit<Command>>]>,
}

// The producer and consumer each touch disjoint slots, guarded by the
// acquire/release pair on the published index.
unsafe impl Send for Shared {}
unsafe impl Sync for Shared {}

/// SPSC command ring; split into a producer and a consumer handle
pub struct CommandQueue;

impl CommandQueue {
    /// Create a ring of the given capacity (power of two, >= 2).
    ///
    /// # Panics
    /// Panics if `capacity` is not a power of two or is below 2; validate
    /// through [`EngineConfig`](crate::EngineConfig) to get an error instead.
    pub fn with_capacity(capacity: usize) -> (Producer, Consumer) {
        assert!(
            capacity >= 2 && capacity.is_power_of_two(),
            "ring capacity must be a power of two, at least 2"
        );

        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();

        let shared = Arc::new(Shared {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            mask: capacity - 1,
            slots,
        });

        (
            Producer {
                shared: Arc::clone(&shared),
            },
            Consumer { shared },
        )
    }
}

/// Producer half of the ring; exactly one exists per queue
pub struct Producer {
    shared: Arc<Shared>,
}

impl Producer {
    /// Enqueue a command. Returns the command back iff the ring is full;
    /// the caller retries (enqueue failure is non-fatal backpressure).
    #[inline]
    pub fn push(&mut self, cmd: Command) -> Result<(), Command> {
        let shared = &*self.shared;
        let head = shared.head.load(Ordering::Relaxed);
        let next = (head + 1) & shared.mask;

        if next == shared.tail.load(Ordering::Acquire) {
            return Err(cmd);
        }

        // The slot at `head` is not visible to the consumer until the
        // release store below publishes the new head.
        unsafe {
            (*shared.slots[head].get()).write(cmd);
        }
        shared.head.store(next, Ordering::Release);
        Ok(())
    }

    /// Effective capacity (one slot is reserved)
    #[inline]
    pub fn capacity(&self) -> usize {
        self.shared.mask
    }
}

/// Consumer half of the ring; exactly one exists per queue
pub struct Consumer {
    shared: Arc<Shared>,
}

impl Consumer {
    /// Dequeue the next command, or `None` if the ring is empty.
    /// An empty ring is the steady state when the matcher out-paces the feed.
    #[inline]
    pub fn pop(&mut self) -> Option<Command> {
        let shared = &*self.shared;
        let tail = shared.tail.load(Ordering::Relaxed);

        if tail == shared.head.load(Ordering::Acquire) {
            return None;
        }

        // The acquire load of head above makes the producer's slot write
        // visible before this read.
        let cmd = unsafe { (*shared.slots[tail].get()).assume_init() };
        shared.tail.store((tail + 1) & shared.mask, Ordering::Release);
        Some(cmd)
    }

    /// True when no command is waiting
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.shared.tail.load(Ordering::Relaxed) == self.shared.head.load(Ordering::Acquire)
    }
}
