// Copyright 2025 Schelling Point Labs Inc
// SPDX-License-Identifier: AGPL-3.0-only

//! Thread-local pool of reusable transfer buffers.
//!
//! Bulk copies borrow an 8 KiB-class buffer here instead of allocating one
//! per transfer. The pool is scoped per thread, so no locking is needed; the
//! fixed slot count bounds how much memory an idle thread retains.

use std::cell::RefCell;

/// Chunk size for bulk channel transfers.
pub(crate) const TRANSFER_SIZE: usize = 8192;

const POOL_SLOTS: usize = 3;

thread_local! {
    static POOL: RefCell<[Option<Vec<u8>>; POOL_SLOTS]> = const { RefCell::new([None, None, None]) };
}

/// Take a zeroed buffer of exactly `size` bytes, reusing a cached allocation
/// whose capacity is at least `size` when one is available.
pub(crate) fn acquire(size: usize) -> Vec<u8> {
    POOL.with(|pool| {
        let mut slots = pool.borrow_mut();
        for slot in slots.iter_mut() {
            if slot.as_ref().is_some_and(|buf| buf.capacity() >= size) {
                let mut buf = slot.take().expect("slot checked non-empty");
                buf.clear();
                buf.resize(size, 0);
                return buf;
            }
        }
        vec![0; size]
    })
}

/// Return a buffer to the pool: the first empty slot wins, otherwise the
/// smallest cached buffer is replaced if this one is larger.
pub(crate) fn release(buf: Vec<u8>) {
    POOL.with(|pool| {
        let mut slots = pool.borrow_mut();
        for slot in slots.iter_mut() {
            if slot.is_none() {
                *slot = Some(buf);
                return;
            }
        }
        if let Some(smallest) = slots
            .iter_mut()
            .min_by_key(|slot| slot.as_ref().map_or(0, Vec::capacity))
        {
            if smallest.as_ref().map_or(0, |cached| cached.capacity()) < buf.capacity() {
                *smallest = Some(buf);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_returns_zeroed_buffer_of_requested_size() {
        let mut buf = acquire(16);
        assert_eq!(buf.len(), 16);
        assert!(buf.iter().all(|&b| b == 0));
        buf[0] = 0xff;
        release(buf);

        // A reused buffer must come back erased.
        let again = acquire(8);
        assert_eq!(again.len(), 8);
        assert!(again.iter().all(|&b| b == 0));
    }

    #[test]
    fn larger_cached_buffers_are_reused_for_smaller_requests() {
        release(Vec::with_capacity(4096));
        let buf = acquire(128);
        assert!(buf.capacity() >= 4096, "expected the cached allocation back");
    }

    #[test]
    fn full_pool_keeps_the_largest_buffers() {
        for _ in 0..POOL_SLOTS {
            release(Vec::with_capacity(64));
        }
        release(Vec::with_capacity(1 << 20));

        let big = acquire(1 << 20);
        assert!(big.capacity() >= 1 << 20);
    }
}
