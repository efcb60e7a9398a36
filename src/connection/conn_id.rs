// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Connection-id allocator (§4.12).
//!
//! A 16-bit wrapping counter, local to this process, naming "which
//! incarnation of the sender is speaking". Allocation is a trivial
//! serialized critical section; there is no cross-restart uniqueness
//! guarantee, by design -- incarnation changes are detected by the
//! receiver noticing a mismatched `conn_id` on a `first=true` DATA, not by
//! the id space being collision-free (§4.12, §8 "ConnId wrap" boundary
//! test).
//!
//! Open question resolved per §9: `0` is a perfectly valid allocated
//! `ConnId`. The only place `0` is special is diagnostic tracing upstream
//! of this crate ("include in trace if conn_id != 0"), which is not a
//! protocol rule this crate enforces.

use std::sync::atomic::{AtomicU16, Ordering};

/// Locally-allocated sender incarnation tag (§3 Data Model).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ConnId(pub u16);

impl std::fmt::Display for ConnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-layer monotonic `ConnId` generator. Wrapping `fetch_add` on `u16`
/// rolls over from `65535` back to `0` without panicking (atomics wrap
/// silently, unlike plain arithmetic in debug builds).
#[derive(Debug, Default)]
pub struct ConnIdAllocator {
    next: AtomicU16,
}

impl ConnIdAllocator {
    pub fn new() -> Self {
        Self {
            next: AtomicU16::new(0),
        }
    }

    /// Allocate the next `ConnId` in sequence.
    pub fn allocate(&self) -> ConnId {
        ConnId(self.next.fetch_add(1, Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_in_sequence() {
        let alloc = ConnIdAllocator::new();
        assert_eq!(alloc.allocate(), ConnId(0));
        assert_eq!(alloc.allocate(), ConnId(1));
        assert_eq!(alloc.allocate(), ConnId(2));
    }

    #[test]
    fn wraps_at_u16_max() {
        let alloc = ConnIdAllocator {
            next: AtomicU16::new(u16::MAX),
        };
        assert_eq!(alloc.allocate(), ConnId(u16::MAX));
        assert_eq!(alloc.allocate(), ConnId(0));
    }

    #[test]
    fn zero_is_a_valid_conn_id() {
        // Per the resolved open question: 0 is not a sentinel here.
        let alloc = ConnIdAllocator::new();
        let first = alloc.allocate();
        assert_eq!(first, ConnId(0));
    }
}
