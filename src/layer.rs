// SPDX-License-Identifier: Apache-2.0 OR MIT

//! [`UnicastLayer`]: the crate's single public entry point, owning the
//! connection tables, the config, the age-out cache, the conn-id
//! allocator, and the three periodic task handles (§5 "Global mutable
//! state... must be explicitly owned by the layer value and torn down in
//! `stop()`; no hidden statics").

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::collaborators::{Membership, NoMembership, Transport, UpLayer};
use crate::config::LayerConfig;
use crate::connection::{AgeOutCache, ConnIdAllocator, ConnectionTable, PeerAddress};
use crate::error::{Error, Result};
use crate::message::{ReceivedMessage, SentMessage};
use crate::metrics::{LayerMetrics, MetricsSnapshot, PeerStats, WindowStats};
use crate::pipeline::{down, up};
use crate::tasks::{age_out as age_out_task, reaper, retransmit, TaskHandle};

/// A reliable point-to-point delivery layer over addresses of type `A`,
/// driven by a caller-supplied [`Transport`], [`UpLayer`], and
/// [`Membership`] (§6.2 collaborator interfaces).
pub struct UnicastLayer<A, Tr, Up, M = NoMembership>
where
    A: PeerAddress,
    Tr: Transport<A>,
    Up: UpLayer<A>,
    M: Membership<A>,
{
    config: LayerConfig,
    table: Arc<ConnectionTable<A, SentMessage, ReceivedMessage>>,
    conn_ids: ConnIdAllocator,
    age_out: Arc<AgeOutCache<A>>,
    membership: M,
    transport: Arc<Tr>,
    up: Arc<Up>,
    metrics: Arc<LayerMetrics>,
    running: Arc<AtomicBool>,
    retransmit_task: Option<TaskHandle>,
    reaper_task: Option<TaskHandle>,
    age_out_task: Option<TaskHandle>,
}

impl<A, Tr, Up, M> UnicastLayer<A, Tr, Up, M>
where
    A: PeerAddress,
    Tr: Transport<A> + 'static,
    Up: UpLayer<A> + 'static,
    M: Membership<A>,
{
    /// Build and start a layer: spawns the retransmit sweep unconditionally,
    /// the idle reaper only when `config.reaper_enabled()`, and the age-out
    /// sweep only when the age-out cache is enabled (`max_retransmit_time
    /// > 0`) -- all three are self-driving background threads, the same way
    /// `config.xmit_interval()` and `config.conn_expiry_timeout()` already
    /// drive their own timers (§5).
    pub fn start(config: LayerConfig, transport: Tr, up: Up, membership: M) -> Self {
        let table = Arc::new(ConnectionTable::new());
        let transport = Arc::new(transport);
        let up = Arc::new(up);
        let metrics = Arc::new(LayerMetrics::new());
        let running = Arc::new(AtomicBool::new(true));
        let age_out = Arc::new(AgeOutCache::new(config.max_retransmit_time()));

        let retransmit_task = Some(retransmit::spawn(
            Arc::clone(&table),
            Arc::clone(&transport),
            Arc::clone(&metrics),
            config.xmit_interval(),
        ));
        let reaper_task = if config.reaper_enabled() {
            Some(reaper::spawn(Arc::clone(&table), config.conn_expiry_timeout()))
        } else {
            None
        };
        let age_out_task = if age_out.is_enabled() {
            Some(age_out_task::spawn(
                Arc::clone(&table),
                Arc::clone(&age_out),
                config.xmit_interval(),
            ))
        } else {
            None
        };

        Self {
            config,
            table,
            conn_ids: ConnIdAllocator::new(),
            age_out,
            membership,
            transport,
            up,
            metrics,
            running,
            retransmit_task,
            reaper_task,
            age_out_task,
        }
    }

    /// Outbound entry point (§4.4). `no_reliability` messages are the
    /// caller's concern entirely -- they should never reach this layer.
    pub fn down(&self, dest: A, payload: Vec<u8>) -> Result<()> {
        self.down_with_flags(dest, payload, false)
    }

    /// Outbound entry point for an OOB-flagged message (§3 Data Model):
    /// may be delivered ahead of its predecessors at the receiver, but is
    /// still added to the window like any other DATA.
    pub fn down_oob(&self, dest: A, payload: Vec<u8>) -> Result<()> {
        self.down_with_flags(dest, payload, true)
    }

    fn down_with_flags(&self, dest: A, payload: Vec<u8>, oob: bool) -> Result<()> {
        if !self.running.load(Ordering::Acquire) {
            return Err(Error::Stopped);
        }
        down::send(
            &self.table,
            &self.conn_ids,
            &self.age_out,
            &self.membership,
            &*self.transport,
            &self.config,
            &self.running,
            &self.metrics,
            dest,
            payload,
            oob,
        )
    }

    /// Inbound entry point for one message (§4.5).
    pub fn up(&self, src: A, bytes: &[u8]) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        up::on_message(
            &self.table,
            &*self.transport,
            &*self.up,
            &self.config,
            &self.metrics,
            src,
            bytes,
        );
    }

    /// Inbound entry point for a batch of wire frames from the same `src`,
    /// delivered together by the transport (§4.5 "batched DATA delivery").
    /// DATA frames are grouped by `conn_id` so a single receiver entry is
    /// resolved once per group instead of once per message.
    pub fn up_batch(&self, src: A, frames: Vec<Vec<u8>>) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        up::on_message_batch(
            &self.table,
            &*self.transport,
            &*self.up,
            &self.config,
            &self.metrics,
            src,
            frames,
        );
    }

    /// Run the age-out sweep on demand: tears down both windows for any
    /// non-member destination whose deadline has passed (§3 "Age-out
    /// cache"). This already runs automatically on a background thread
    /// whenever `max_retransmit_time > 0`; this method lets a caller also
    /// trigger it eagerly (e.g. alongside its own VIEW_CHANGE tick) instead
    /// of waiting for the next background interval.
    pub fn sweep_age_out(&self) {
        age_out_task::sweep(&self.table, &self.age_out);
    }

    /// Notify the layer that `addr`'s membership was confirmed, removing
    /// it from the age-out cache if registered (§3).
    pub fn confirm_member(&self, addr: &A) {
        self.age_out.confirm(addr);
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Per-peer window sizes and gap counts (§6.4).
    pub fn peer_stats(&self, addr: &A) -> PeerStats {
        PeerStats {
            send_window: self.table.get_sender(addr).map(|e| WindowStats {
                low: e.sent_msgs.low(),
                highest_delivered: e.sent_msgs.highest_delivered(),
                highest_received: e.sent_msgs.highest_received(),
                num_missing: e.sent_msgs.num_missing(),
                counters: e.sent_msgs.metrics().snapshot(),
            }),
            recv_window: self.table.get_receiver(addr).map(|e| WindowStats {
                low: e.received_msgs.low(),
                highest_delivered: e.received_msgs.highest_delivered(),
                highest_received: e.received_msgs.highest_received(),
                num_missing: e.received_msgs.num_missing(),
                counters: e.received_msgs.metrics().snapshot(),
            }),
        }
    }

    pub fn connection_count(&self) -> (usize, usize) {
        (self.table.sender_count(), self.table.receiver_count())
    }

    /// Stop the layer (§5 "Cancellation and timeouts"): sets
    /// `running=false`, cancels all periodic tasks, and tears down all
    /// connections. In-flight `down` retries exit on the next check;
    /// in-flight delivery drains naturally (the latch releases on empty
    /// pull).
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(mut task) = self.retransmit_task.take() {
            task.stop();
        }
        if let Some(mut task) = self.reaper_task.take() {
            task.stop();
        }
        if let Some(mut task) = self.age_out_task.take() {
            task.stop();
        }
        for (dest, _) in self.table.senders() {
            self.table.remove_sender(&dest);
        }
        for (src, _) in self.table.receivers() {
            self.table.remove_receiver(&src);
        }
    }
}

impl<A, Tr, Up, M> Drop for UnicastLayer<A, Tr, Up, M>
where
    A: PeerAddress,
    Tr: Transport<A>,
    Up: UpLayer<A>,
    M: Membership<A>,
{
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}
