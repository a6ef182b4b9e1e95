//! Order slot pool.
//!
//! Every order record the engine will ever need is reserved in one
//! contiguous allocation before the run starts; the matcher thread never
//! touches the heap afterwards. Vacant slots chain into a free list through
//! the record's own `next` handle, so taking and returning a slot are both
//! single pointer swaps. Handles are `u32`, half a pointer wide, with the
//! all-ones value reserved to mean "no slot".

use crate::command::{OrderStatus, OrderType, Side};
use std::fmt;

/// Reserved handle meaning "no slot"
pub const NULL_INDEX: u32 = u32::MAX;

/// Handle into the pool - a compressed pointer
pub type SlotIndex = u32;

/// A single order record - exactly 64 bytes (one cache line).
///
/// A slot is in exactly one of three states: vacant (chained into the free
/// list), transient (held by the matcher while it works one NEW command),
/// or resting (chained into a price level and referenced from the id map).
/// Never two owners.
#[repr(C)]
#[repr(align(64))]
#[derive(Clone, Copy, Debug)]
pub struct Order {
    /// External order ID (client-assigned)
    pub order_id: u64,

    /// Limit price in ticks
    pub price: i64,

    /// Quantity still open
    pub remaining_qty: u64,

    /// Quantity originally submitted
    pub original_qty: u64,

    /// Matcher clock at book entry, nanoseconds; drives time priority
    pub enqueue_ts: u64,

    /// Next order at the same price level, or next vacant slot
    pub next: SlotIndex,

    /// Previous order at the same price level (enables O(1) cancel)
    pub prev: SlotIndex,

    /// Order side
    pub side: Side,

    /// Order type
    pub order_type: OrderType,

    /// Lifecycle state
    pub status: OrderStatus,
}

const _: () = assert!(
    std::mem::size_of::<Order>() == 64,
    "Order must be exactly 64 bytes (one cache line)"
);

const _: () = assert!(
    std::mem::align_of::<Order>() == 64,
    "Order must be 64-byte aligned"
);

impl Default for Order {
    fn default() -> Self {
        Self {
            order_id: 0,
            price: 0,
            remaining_qty: 0,
            original_qty: 0,
            enqueue_ts: 0,
            next: NULL_INDEX,
            prev: NULL_INDEX,
            side: Side::Buy,
            order_type: OrderType::Limit,
            status: OrderStatus::Pending,
        }
    }
}

/// Fixed-capacity order storage with O(1) allocate and release
pub struct OrderPool {
    slots: Vec<Order>,
    /// Front of the vacant-slot chain; NULL_INDEX when every slot is taken
    next_free: SlotIndex,
    /// Slots currently handed out
    in_use: u32,
}

impl OrderPool {
    /// Reserve storage for `capacity` orders up front.
    ///
    /// # Panics
    /// Panics if `capacity` equals the reserved all-ones handle
    pub fn with_capacity(capacity: u32) -> Self {
        assert!(capacity < NULL_INDEX, "the all-ones handle is reserved");

        // Each vacant slot chains to its successor
        let slots: Vec<Order> = (0..capacity)
            .map(|i| Order {
                next: if i + 1 == capacity { NULL_INDEX } else { i + 1 },
                ..Order::default()
            })
            .collect();

        Self {
            next_free: if slots.is_empty() { NULL_INDEX } else { 0 },
            in_use: 0,
            slots,
        }
    }

    /// Take a slot, or `None` when the pool is exhausted. O(1).
    ///
    /// The record comes back cleared; nothing from a previous tenant leaks
    /// through.
    #[inline]
    pub fn allocate(&mut self) -> Option<SlotIndex> {
        let slot = self.next_free;
        if slot == NULL_INDEX {
            return None;
        }
        self.next_free = self.slots[slot as usize].next;
        self.in_use += 1;
        self.slots[slot as usize] = Order::default();
        Some(slot)
    }

    /// Hand a slot back to the pool. O(1).
    ///
    /// The caller must already have unlinked the order from every price
    /// level and cleared its id-map entry; the record's contents become
    /// meaningless the moment this returns.
    #[inline]
    pub fn release(&mut self, slot: SlotIndex) {
        debug_assert!((slot as usize) < self.slots.len(), "slot handle out of range");
        debug_assert!(self.in_use > 0, "release without a matching allocate");

        self.slots[slot as usize].next = self.next_free;
        self.next_free = slot;
        self.in_use -= 1;
    }

    /// Read a record. O(1).
    #[inline]
    pub fn order(&self, slot: SlotIndex) -> &Order {
        debug_assert!((slot as usize) < self.slots.len(), "slot handle out of range");
        &self.slots[slot as usize]
    }

    /// Write a record. O(1).
    #[inline]
    pub fn order_mut(&mut self, slot: SlotIndex) -> &mut Order {
        debug_assert!((slot as usize) < self.slots.len(), "slot handle out of range");
        &mut self.slots[slot as usize]
    }

    /// Slots currently handed out
    #[inline]
    pub fn allocated(&self) -> u32 {
        self.in_use
    }

    /// Slots still vacant
    #[inline]
    pub fn available(&self) -> u32 {
        self.capacity() - self.in_use
    }

    /// Total slots reserved
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Touch every record once so the backing pages are resident before the
    /// run starts; one volatile self-write per cache line, so the free list
    /// and any live records are left exactly as they were.
    pub fn warm_up(&mut self) {
        for slot in self.slots.iter_mut() {
            let link = slot.next;
            unsafe {
                std::ptr::write_volatile(&mut slot.next, link);
            }
        }
    }
}

impl fmt::Debug for OrderPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderPool")
            .field("capacity", &self.capacity())
            .field("in_use", &self.in_use)
            .field("next_free", &self.next_free)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_one_cache_line() {
        assert_eq!(std::mem::size_of::<Order>(), 64);
        assert_eq!(std::mem::align_of::<Order>(), 64);
    }

    #[test]
    fn empty_pool_yields_nothing() {
        let mut pool = OrderPool::with_capacity(0);
        assert_eq!(pool.capacity(), 0);
        assert_eq!(pool.available(), 0);
        assert!(pool.allocate().is_none());
    }

    #[test]
    fn exhaustion_then_recycle() {
        let mut pool = OrderPool::with_capacity(2);

        let first = pool.allocate().unwrap();
        let second = pool.allocate().unwrap();
        assert_ne!(first, second);
        assert!(pool.allocate().is_none(), "third take must fail");

        // The most recently released slot is the next one handed out
        pool.release(first);
        assert_eq!(pool.allocate(), Some(first));
        assert!(pool.allocate().is_none());
    }

    #[test]
    fn accounting_holds_through_churn() {
        let mut pool = OrderPool::with_capacity(8);
        let mut held: Vec<SlotIndex> = Vec::new();

        // Deterministic mixed pattern: two takes, then one release
        for round in 0..60usize {
            if round % 3 != 2 {
                if let Some(slot) = pool.allocate() {
                    held.push(slot);
                }
            } else if !held.is_empty() {
                let victim = held.remove(round % held.len());
                pool.release(victim);
            }

            assert_eq!(pool.allocated() + pool.available(), pool.capacity());
            assert_eq!(pool.allocated() as usize, held.len());
        }
    }

    #[test]
    fn allocate_clears_previous_tenant() {
        let mut pool = OrderPool::with_capacity(1);

        let slot = pool.allocate().unwrap();
        {
            let order = pool.order_mut(slot);
            order.order_id = 41;
            order.side = Side::Sell;
            order.remaining_qty = 7;
            order.status = OrderStatus::Partial;
        }
        pool.release(slot);

        let again = pool.allocate().unwrap();
        assert_eq!(again, slot);
        let order = pool.order(again);
        assert_eq!(order.order_id, 0);
        assert_eq!(order.remaining_qty, 0);
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.next, NULL_INDEX);
        assert_eq!(order.prev, NULL_INDEX);
    }

    #[test]
    fn warm_up_preserves_the_free_chain() {
        const CAPACITY: u32 = 64;
        let mut pool = OrderPool::with_capacity(CAPACITY);

        let taken = pool.allocate().unwrap();
        pool.warm_up();

        // Every remaining slot is still reachable through the free chain,
        // and no handle comes out twice
        let mut handles: Vec<SlotIndex> =
            (1..CAPACITY).map(|_| pool.allocate().unwrap()).collect();
        handles.push(taken);
        handles.sort_unstable();
        handles.dedup();
        assert_eq!(handles.len(), CAPACITY as usize);
        assert!(pool.allocate().is_none());
    }
}
