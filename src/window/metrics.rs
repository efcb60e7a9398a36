// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Per-window observability counters.
//!
//! Mirrors the atomic-counter style of `hdds::reliability::metrics`: one
//! `AtomicU64` per observable, `Relaxed` ordering (these are monitoring
//! counters, not synchronization), cheap to read via [`WindowMetrics::snapshot`].

use std::sync::atomic::{AtomicU64, Ordering};

/// A single window's lifetime counters (§3 "metrics counters", §6.4).
#[derive(Debug, Default)]
pub struct WindowMetrics {
    compactions: AtomicU64,
    moves: AtomicU64,
    resizes: AtomicU64,
    purges: AtomicU64,
}

/// Point-in-time readout of [`WindowMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WindowMetricsSnapshot {
    pub compactions: u64,
    pub moves: u64,
    pub resizes: u64,
    pub purges: u64,
}

impl WindowMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn record_compaction(&self, rows_moved: u64) {
        self.compactions.fetch_add(1, Ordering::Relaxed);
        self.moves.fetch_add(rows_moved, Ordering::Relaxed);
    }

    pub(super) fn record_resize(&self) {
        self.resizes.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn record_purge(&self) {
        self.purges.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WindowMetricsSnapshot {
        WindowMetricsSnapshot {
            compactions: self.compactions.load(Ordering::Relaxed),
            moves: self.moves.load(Ordering::Relaxed),
            resizes: self.resizes.load(Ordering::Relaxed),
            purges: self.purges.load(Ordering::Relaxed),
        }
    }
}
