// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-destination sender state (§4.2).

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use super::{ConnId, WindowShape, FIRST_SEQNO};
use crate::window::Window;

/// Owns the outbox window for one destination: the connection id this
/// incarnation is sending under, a monotonic seqno counter, the
/// `(highest_acked, highest_sent)` watermark from the last retransmit
/// sweep (§4.10 stall detector), and a liveness timestamp for the idle
/// reaper (§4.11).
pub struct SenderEntry<T> {
    pub send_conn_id: ConnId,
    next_seqno: AtomicU64,
    pub sent_msgs: Window<T>,
    watermark: Mutex<(u64, u64)>,
    last_touched: Mutex<Instant>,
}

impl<T> SenderEntry<T> {
    pub fn new(send_conn_id: ConnId, shape: WindowShape) -> Self {
        Self {
            send_conn_id,
            next_seqno: AtomicU64::new(FIRST_SEQNO),
            sent_msgs: Window::new(
                shape.initial_rows,
                shape.cols,
                shape.resize_factor,
                shape.max_compaction_time,
                FIRST_SEQNO - 1,
            ),
            watermark: Mutex::new((0, 0)),
            last_touched: Mutex::new(Instant::now()),
        }
    }

    /// Atomically allocate the next outbound seqno (§4.4 step 3). The very
    /// first call on a fresh entry returns [`FIRST_SEQNO`].
    pub fn allocate_seqno(&self) -> u64 {
        self.next_seqno.fetch_add(1, Ordering::Relaxed)
    }

    pub fn touch(&self) {
        *self.last_touched.lock() = Instant::now();
    }

    pub fn age(&self) -> Duration {
        self.last_touched.lock().elapsed()
    }

    pub fn watermark(&self) -> (u64, u64) {
        *self.watermark.lock()
    }

    pub fn set_watermark(&self, watermark: (u64, u64)) {
        *self.watermark.lock() = watermark;
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
    fn seqno_starts_at_first_seqno_and_increments() {
        let entry: SenderEntry<u32> = SenderEntry::new(ConnId(1), shape());
        assert_eq!(entry.allocate_seqno(), FIRST_SEQNO);
        assert_eq!(entry.allocate_seqno(), FIRST_SEQNO + 1);
        assert_eq!(entry.allocate_seqno(), FIRST_SEQNO + 2);
    }

    #[test]
    fn watermark_round_trips() {
        let entry: SenderEntry<u32> = SenderEntry::new(ConnId(1), shape());
        assert_eq!(entry.watermark(), (0, 0));
        entry.set_watermark((3, 5));
        assert_eq!(entry.watermark(), (3, 5));
    }
}
