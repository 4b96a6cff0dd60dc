//! Bounded lock-free queue between the feed thread and the book workers.
//!
//! Single producer (the feed session's receive loop), multiple consumers
//! (the worker pool). The queue never blocks the producer: `push` fails when
//! the buffer is full and the caller decides what to do with the item (the
//! ingestion facade drops it and counts the drop).
//!
//! Each slot carries its own sequence stamp, so a consumer only reads a slot
//! it has exclusively claimed and the producer only rewrites a slot after its
//! consumer has finished with it. Readers always complete in a bounded number
//! of CAS retries.

use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

struct Slot<T> {
    /// Stamp protocol: `seq == pos` means the slot is free for the producer
    /// at position `pos`; `seq == pos + 1` means it holds the value pushed at
    /// `pos` and is ready for a consumer; after a pop the stamp jumps ahead
    /// by the capacity so the producer can reuse it on the next lap.
    seq: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Bounded FIFO with non-blocking push and lock-free pop.
pub struct RingBuffer<T> {
    slots: Box<[Slot<T>]>,
    mask: usize,
    /// Next position a producer will write.
    head: CachePadded<AtomicUsize>,
    /// Next position a consumer will read.
    tail: CachePadded<AtomicUsize>,
}

// SAFETY: slots are handed between threads through the stamp protocol; a
// value is written exactly once per stamp lap and read exactly once.
unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

impl<T> RingBuffer<T> {
    /// Create a buffer holding at least `capacity` items. Capacity is rounded
    /// up to the next power of two for mask-based indexing.
    pub fn new(capacity: usize) -> Self {
        let cap = capacity.max(2).next_power_of_two();
        let slots: Box<[Slot<T>]> = (0..cap)
            .map(|i| Slot {
                seq: AtomicUsize::new(i),
                value: UnsafeCell::new(MaybeUninit::uninit()),
            })
            .collect();

        Self {
            slots,
            mask: cap - 1,
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.mask + 1
    }

    /// Approximate number of queued items. Exact when producer and consumers
    /// are quiescent.
    #[inline]
    pub fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.wrapping_sub(tail)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Attempt to enqueue. Returns the item back when the buffer is full so
    /// the caller can drop or retry; never blocks, never overwrites.
    pub fn push(&self, item: T) -> Result<(), T> {
        let mut head = self.head.load(Ordering::Relaxed);

        loop {
            let slot = &self.slots[head & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let dif = seq as isize - head as isize;

            if dif == 0 {
                match self.head.compare_exchange_weak(
                    head,
                    head.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS above gives this thread exclusive
                        // ownership of the slot until the stamp is released.
                        unsafe { (*slot.value.get()).write(item) };
                        slot.seq.store(head.wrapping_add(1), Ordering::Release);
                        return Ok(());
                    }
                    Err(current) => head = current,
                }
            } else if dif < 0 {
                // Slot still holds an unconsumed value from the previous lap.
                return Err(item);
            } else {
                head = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Attempt to dequeue. Returns `None` when empty. Safe to call from any
    /// number of consumer threads; a consumer that loses the CAS retries on
    /// the next position.
    pub fn pop(&self) -> Option<T> {
        let mut tail = self.tail.load(Ordering::Relaxed);

        loop {
            let slot = &self.slots[tail & self.mask];
            let seq = slot.seq.load(Ordering::Acquire);
            let dif = seq as isize - tail.wrapping_add(1) as isize;

            if dif == 0 {
                match self.tail.compare_exchange_weak(
                    tail,
                    tail.wrapping_add(1),
                    Ordering::Relaxed,
                    Ordering::Relaxed,
                ) {
                    Ok(_) => {
                        // SAFETY: the CAS gives exclusive read ownership; the
                        // value was fully written before the stamp released it.
                        let value = unsafe { (*slot.value.get()).assume_init_read() };
                        slot.seq
                            .store(tail.wrapping_add(self.mask + 1), Ordering::Release);
                        return Some(value);
                    }
                    Err(current) => tail = current,
                }
            } else if dif < 0 {
                return None;
            } else {
                tail = self.tail.load(Ordering::Relaxed);
            }
        }
    }
}

impl<T> Drop for RingBuffer<T> {
    fn drop(&mut self) {
        while self.pop().is_some() {}
    }
}
