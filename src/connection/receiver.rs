// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-sender receiver state (§4.3).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{ConnId, WindowShape};
use crate::window::Window;

/// Inbox for one sender incarnation: the `conn_id` the sender was using
/// when this entry was created, the receive window, a delayed-ACK
/// pending flag, and a liveness timestamp for the idle reaper (§4.11).
pub struct ReceiverEntry<T> {
    pub recv_conn_id: ConnId,
    pub received_msgs: Window<T>,
    ack_pending: AtomicBool,
    highest_acked_sent: AtomicU64,
    last_touched: Mutex<Instant>,
}

impl<T> ReceiverEntry<T> {
    pub fn new(recv_conn_id: ConnId, shape: WindowShape, start_offset: u64) -> Self {
        Self {
            recv_conn_id,
            received_msgs: Window::new(
                shape.initial_rows,
                shape.cols,
                shape.resize_factor,
                shape.max_compaction_time,
                start_offset,
            ),
            ack_pending: AtomicBool::new(false),
            highest_acked_sent: AtomicU64::new(start_offset),
            last_touched: Mutex::new(Instant::now()),
        }
    }

    /// Mark that a DATA arrived and an ACK is owed, unless one is already
    /// pending (§4.8 delayed ACK coalescing).
    ///
    /// Returns `true` if this call is the one that set the flag, i.e. the
    /// caller should (re)arm the delayed-ACK timer.
    pub fn mark_ack_pending(&self) -> bool {
        self.ack_pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Send the coalesced ACK for `through_seqno`, clearing the pending
    /// flag. Returns `false` (no-op) if `through_seqno` would move the
    /// watermark backwards, guarding against a stale delayed-ACK timer
    /// firing after a newer ACK was already sent inline.
    pub fn take_ack(&self, through_seqno: u64) -> bool {
        self.ack_pending.store(false, Ordering::Release);
        let prev = self.highest_acked_sent.fetch_max(through_seqno, Ordering::AcqRel);
        through_seqno > prev
    }

    /// `true` if a DATA arrived since the last ACK was sent (§4.10 step 1
    /// peek, used by the retransmit sweep before deciding to clear and
    /// send -- the flag itself is only cleared by [`ReceiverEntry::take_ack`]).
    pub fn ack_pending(&self) -> bool {
        self.ack_pending.load(Ordering::Acquire)
    }

    pub fn touch(&self) {
        *self.last_touched.lock() = Instant::now();
    }

    pub fn age(&self) -> Duration {
        self.last_touched.lock().elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> WindowShape {
        WindowShape {
            initial_rows: 2,
            cols: 8,
            resize_factor: 1.2,
            max_compaction_time: Duration::from_secs(60),
        }
    }

    #[test]
    fn mark_ack_pending_only_arms_once() {
        let entry: ReceiverEntry<u32> = ReceiverEntry::new(ConnId(0), shape(), 0);
        assert!(entry.mark_ack_pending(), "first call arms the timer");
        assert!(!entry.mark_ack_pending(), "already pending");
        entry.take_ack(1);
        assert!(entry.mark_ack_pending(), "re-arms after the previous ACK fired");
    }

    #[test]
    fn take_ack_rejects_stale_watermark() {
        let entry: ReceiverEntry<u32> = ReceiverEntry::new(ConnId(0), shape(), 0);
        assert!(entry.take_ack(5));
        assert!(!entry.take_ack(3), "watermark must not move backwards");
    }
}
