// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The retransmission table (§4.1): a segmented, seqno-indexed buffer used
//! as both the sender's outbox (pending-ACK messages) and the receiver's
//! inbox (pending-delivery messages).
//!
//! Conceptually a 2D matrix of `R` rows x `C` columns giving capacity
//! `R*C`, with a logical origin `offset` one below the first slot. In
//! practice the matrix is flattened into a single `VecDeque<Option<T>>` --
//! growth appends whole `C`-sized rows to the back, compaction drops whole
//! `C`-sized rows from the front and raises `offset` by `dropped_rows * C`.
//! This gives the amortized O(1) insert/purge/lookup the protocol needs
//! without materializing a real 2D grid.

pub mod metrics;

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub use metrics::{WindowMetrics, WindowMetricsSnapshot};

use crate::seqno_list::SeqnoList;

/// Default row growth factor applied on resize (§4.1 "Algorithmic notes").
pub const DEFAULT_RESIZE_FACTOR: f64 = 1.2;

/// Outcome of [`Window::add`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    /// `true` if the message was newly stored (not stale, not a duplicate).
    pub inserted: bool,
    /// `true` if this call won the race to become this window's sole
    /// deliverer -- the processing latch transitioned `false -> true`
    /// because the inserted seqno is immediately deliverable. The caller
    /// must then drive [`Window::remove_many`] until it returns `None`.
    pub became_deliverer: bool,
}

struct WindowInner<T> {
    slots: VecDeque<Option<T>>,
    cols: usize,
    resize_factor: f64,
    offset: u64,
    low: u64,
    highest_delivered: u64,
    highest_received: u64,
    num_missing: usize,
    /// Delivery-right latch: at most one thread drains this window at a
    /// time (§3 invariant 4, §4.1 "processing" latch, §9 design notes).
    processing: bool,
    max_compaction_time: Duration,
    last_compaction: Instant,
}

/// A per-connection sliding window over messages of type `T`.
///
/// `add`/`purge`/`remove_many` share a single internal lock (§5
/// "Per-Window internal lock protects add/purge/remove_many against each
/// other"); that same lock is what makes the processing-latch handoff in
/// `remove_many` atomic with respect to `add` re-arming it (§9 design
/// notes: "take the Window's internal lock, check availability, and if
/// none, CAS the latch to false inside that lock").
pub struct Window<T> {
    inner: Mutex<WindowInner<T>>,
    metrics: WindowMetrics,
}

impl<T> Window<T> {
    /// Create a window whose first deliverable/sendable seqno is
    /// `start_offset + 1` (pass `0` for a fresh connection using
    /// `FIRST_SEQNO = 1`).
    pub fn new(
        initial_rows: usize,
        cols: usize,
        resize_factor: f64,
        max_compaction_time: Duration,
        start_offset: u64,
    ) -> Self {
        assert!(cols > 0, "Window column count must be positive");
        let initial_rows = initial_rows.max(1);
        Self {
            inner: Mutex::new(WindowInner {
                slots: VecDeque::from(vec![None; initial_rows * cols]),
                cols,
                resize_factor: if resize_factor > 1.0 {
                    resize_factor
                } else {
                    DEFAULT_RESIZE_FACTOR
                },
                offset: start_offset,
                low: start_offset + 1,
                highest_delivered: start_offset,
                highest_received: start_offset,
                num_missing: 0,
                processing: false,
                max_compaction_time,
                last_compaction: Instant::now(),
            }),
            metrics: WindowMetrics::new(),
        }
    }

    /// Insert `msg` at `seqno`. Returns whether it was stored and whether
    /// the caller must now drain the window as its sole deliverer.
    ///
    /// Fails silently (returns `inserted: false`) for stale seqnos
    /// (`seqno <= highest_delivered`) and for duplicates (slot already
    /// occupied) -- both are normal, expected conditions (§7).
    pub fn add(&self, seqno: u64, msg: T) -> AddOutcome {
        let mut inner = self.inner.lock();

        if seqno <= inner.highest_delivered {
            return AddOutcome {
                inserted: false,
                became_deliverer: false,
            };
        }

        self.ensure_capacity(&mut inner, seqno);

        let idx = (seqno - inner.offset - 1) as usize;
        if inner.slots[idx].is_some() {
            return AddOutcome {
                inserted: false,
                became_deliverer: false,
            };
        }

        let old_highest_received = inner.highest_received;
        inner.slots[idx] = Some(msg);

        if seqno > old_highest_received {
            inner.num_missing += (seqno - old_highest_received - 1) as usize;
            inner.highest_received = seqno;
        } else {
            // Filling a hole that was already inside (low, highest_received].
            inner.num_missing = inner.num_missing.saturating_sub(1);
        }

        let became_deliverer = if !inner.processing && seqno == inner.highest_delivered + 1 {
            inner.processing = true;
            true
        } else {
            false
        };

        AddOutcome {
            inserted: true,
            became_deliverer,
        }
    }

    /// Drain up to `max` contiguous ready messages starting at
    /// `highest_delivered + 1`. Returns `None` (releasing the delivery
    /// latch) once the next slot is empty or `max == 0`; on a non-empty
    /// return the latch stays held for the next call.
    ///
    /// # Panics
    ///
    /// Only the thread that won [`AddOutcome::became_deliverer`] (or a
    /// previous non-`None` `remove_many` call) may call this; calling it
    /// while the latch is not held is a caller bug, but is otherwise
    /// harmless here since it simply returns `None` immediately.
    pub fn remove_many(&self, nullify: bool, max: usize) -> Option<Vec<(u64, T)>>
    where
        T: Clone,
    {
        let mut inner = self.inner.lock();

        if max == 0 {
            inner.processing = false;
            return None;
        }

        let mut out = Vec::new();
        while out.len() < max {
            let next = inner.highest_delivered + 1;
            let Some(idx) = Self::slot_index(&inner, next) else {
                break;
            };
            let msg = if nullify {
                match inner.slots[idx].take() {
                    Some(msg) => msg,
                    None => break,
                }
            } else {
                match inner.slots[idx].clone() {
                    Some(msg) => msg,
                    None => break,
                }
            };
            inner.highest_delivered = next;
            out.push((next, msg));
        }

        if out.is_empty() {
            inner.processing = false;
            None
        } else {
            Some(out)
        }
    }

    /// Remove all slots `<= seqno`. With `force`, also advances
    /// `highest_delivered` up to `seqno` if it lagged behind (used by ACK
    /// processing on the sender side, where "delivered" means "acked").
    pub fn purge(&self, seqno: u64, force: bool) {
        let mut inner = self.inner.lock();

        if force && seqno > inner.highest_delivered {
            inner.highest_delivered = seqno;
        }

        if seqno >= inner.low {
            let missing_bound = seqno.min(inner.highest_received);
            for s in inner.low..=seqno {
                if let Some(idx) = Self::slot_index(&inner, s) {
                    let was_missing = s <= missing_bound && inner.slots[idx].is_none();
                    inner.slots[idx] = None;
                    if was_missing {
                        inner.num_missing = inner.num_missing.saturating_sub(1);
                    }
                }
            }
            inner.low = seqno + 1;
        }

        self.metrics.record_purge();
        self.maybe_compact(&mut inner);
    }

    /// Direct indexed lookup.
    pub fn get(&self, seqno: u64) -> Option<T>
    where
        T: Clone,
    {
        let inner = self.inner.lock();
        Self::slot_index(&inner, seqno).and_then(|idx| inner.slots[idx].clone())
    }

    /// Ordered list of gaps in `(low, highest_received]`.
    ///
    /// Starts at `max(low, highest_delivered + 1)` rather than bare `low`:
    /// on the receive side `low` is never advanced except by `purge`
    /// (which only the sender-side ACK handler calls), while `remove_many`
    /// nulls out delivered slots without moving `low`. Scanning from `low`
    /// alone would re-report every already-delivered, nulled seqno below
    /// the next real gap as missing forever.
    pub fn get_missing(&self) -> SeqnoList {
        let inner = self.inner.lock();
        let mut missing = Vec::new();
        let mut s = inner.low.max(inner.highest_delivered + 1);
        while s <= inner.highest_received {
            if Self::slot_index(&inner, s).map_or(true, |idx| inner.slots[idx].is_none()) {
                missing.push(s);
            }
            s += 1;
        }
        SeqnoList::from_sorted(&missing)
    }

    pub fn highest_delivered(&self) -> u64 {
        self.inner.lock().highest_delivered
    }

    pub fn highest_received(&self) -> u64 {
        self.inner.lock().highest_received
    }

    pub fn low(&self) -> u64 {
        self.inner.lock().low
    }

    pub fn num_missing(&self) -> usize {
        self.inner.lock().num_missing
    }

    pub fn metrics(&self) -> &WindowMetrics {
        &self.metrics
    }

    /// Force a compaction pass regardless of the elapsed-time threshold,
    /// matching the reaping sweep's ability to tidy up idle windows.
    pub fn compact_now(&self) {
        let mut inner = self.inner.lock();
        self.maybe_compact(&mut inner);
    }

    fn slot_index(inner: &WindowInner<T>, seqno: u64) -> Option<usize> {
        if seqno <= inner.offset {
            return None;
        }
        let idx = (seqno - inner.offset - 1) as usize;
        if idx < inner.slots.len() {
            Some(idx)
        } else {
            None
        }
    }

    fn ensure_capacity(&self, inner: &mut WindowInner<T>, seqno: u64) {
        let needed = (seqno - inner.offset) as usize;
        while inner.slots.len() < needed {
            let current_rows = (inner.slots.len() / inner.cols).max(1);
            let mut new_rows = ((current_rows as f64) * inner.resize_factor).ceil() as usize;
            if new_rows <= current_rows {
                new_rows = current_rows + 1;
            }
            let rows_to_add = new_rows - current_rows;
            for _ in 0..(rows_to_add * inner.cols) {
                inner.slots.push_back(None);
            }
            self.metrics.record_resize();
        }
    }

    /// Compaction runs whenever full empty rows sit at the head (§4.1
    /// condition a, always true right after a purge that emptied a row)
    /// or `max_compaction_time` has elapsed (condition b, checked by the
    /// idle-reap / retransmit sweep calling [`Window::compact_now`] on a
    /// window with no fresh purges).
    fn maybe_compact(&self, inner: &mut WindowInner<T>) {
        let mut rows_dropped = 0u64;
        while inner.slots.len() >= inner.cols
            && inner.slots.iter().take(inner.cols).all(Option::is_none)
        {
            for _ in 0..inner.cols {
                inner.slots.pop_front();
            }
            inner.offset += inner.cols as u64;
            rows_dropped += 1;
        }

        if rows_dropped > 0 {
            self.metrics.record_compaction(rows_dropped);
            inner.last_compaction = Instant::now();
        } else if inner.last_compaction.elapsed() >= inner.max_compaction_time {
            inner.last_compaction = Instant::now();
        }
    }
}
