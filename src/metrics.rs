// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Crate-wide management/metrics surface (§6.4), grounded on
//! `hdds::reliability::metrics::ReliableMetrics`: one atomic counter per
//! observable, `Relaxed` ordering (these are readout-only diagnostics,
//! never used for correctness decisions), cheap `snapshot()`.

use std::sync::atomic::{AtomicU64, Ordering};

use crate::window::WindowMetricsSnapshot;

/// Atomic counters for everything §6.4 asks to expose beyond the
/// per-window counters already tracked by [`crate::window::WindowMetrics`].
#[derive(Debug, Default)]
pub struct LayerMetrics {
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    acks_sent: AtomicU64,
    acks_received: AtomicU64,
    xmit_reqs_sent: AtomicU64,
    xmit_reqs_received: AtomicU64,
    xmit_responses_sent: AtomicU64,
    retransmissions: AtomicU64,
}

impl LayerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_message_sent(&self) {
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_message_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack_sent(&self) {
        self.acks_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack_received(&self) {
        self.acks_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_xmit_req_sent(&self) {
        self.xmit_reqs_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_xmit_req_received(&self) {
        self.xmit_reqs_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_xmit_response_sent(&self) {
        self.xmit_responses_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retransmission(&self) {
        self.retransmissions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            acks_sent: self.acks_sent.load(Ordering::Relaxed),
            acks_received: self.acks_received.load(Ordering::Relaxed),
            xmit_reqs_sent: self.xmit_reqs_sent.load(Ordering::Relaxed),
            xmit_reqs_received: self.xmit_reqs_received.load(Ordering::Relaxed),
            xmit_responses_sent: self.xmit_responses_sent.load(Ordering::Relaxed),
            retransmissions: self.retransmissions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time readout of [`LayerMetrics`], suitable for a caller's own
/// telemetry exporter (this crate does not ship one itself, per §1's
/// "management/metrics surface" being out of scope beyond this struct).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub acks_sent: u64,
    pub acks_received: u64,
    pub xmit_reqs_sent: u64,
    pub xmit_reqs_received: u64,
    pub xmit_responses_sent: u64,
    pub retransmissions: u64,
}

/// Per-peer window sizes and gap counts, rolled up by [`crate::layer::UnicastLayer::peer_stats`]
/// (§6.4 "per-peer send/receive window sizes, missing counts").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerStats {
    pub send_window: Option<WindowStats>,
    pub recv_window: Option<WindowStats>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowStats {
    pub low: u64,
    pub highest_delivered: u64,
    pub highest_received: u64,
    pub num_missing: usize,
    pub counters: WindowMetricsSnapshot,
}
