// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The retransmit sweep (§4.10): one periodic tick that drives delayed
//! ACKs, NAK-driven retransmission (with one-tick hysteresis), and the
//! sender-side stall probe.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::collaborators::Transport;
use crate::connection::{ConnectionTable, PeerAddress};
use crate::header::{AckHeader, Header};
use crate::message::{encode, ReceivedMessage, SentMessage};
use crate::metrics::LayerMetrics;

use super::TaskHandle;

type Table<A> = ConnectionTable<A, SentMessage, ReceivedMessage>;

/// Spawn the background thread running the sweep every `interval`.
///
/// `xmit_task_map` (§5: "owned exclusively by the retransmit task
/// thread") lives as a plain local `HashMap` inside the spawned closure
/// -- nothing else ever touches it, so it needs no synchronization.
pub fn spawn<A, Tr>(
    table: Arc<Table<A>>,
    transport: Arc<Tr>,
    metrics: Arc<LayerMetrics>,
    interval: Duration,
) -> TaskHandle
where
    A: PeerAddress,
    Tr: Transport<A> + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = Arc::clone(&stop);

    TaskHandle::spawn_with(stop, "unicast-retransmit", move || {
        let mut xmit_task_map: HashMap<A, u64> = HashMap::new();
        while !stop_clone.load(Ordering::Acquire) {
            std::thread::sleep(interval);
            if stop_clone.load(Ordering::Acquire) {
                break;
            }
            sweep_receivers(&table, &*transport, &metrics, &mut xmit_task_map);
            sweep_senders(&table, &*transport, &metrics);
        }
    })
}

fn sweep_receivers<A, Tr>(
    table: &Table<A>,
    transport: &Tr,
    metrics: &LayerMetrics,
    xmit_task_map: &mut HashMap<A, u64>,
) where
    A: PeerAddress,
    Tr: Transport<A> + ?Sized,
{
    for (src, entry) in table.receivers() {
        if entry.ack_pending() {
            let hd = entry.received_msgs.highest_delivered();
            if entry.take_ack(hd) {
                let bytes = encode(
                    &Header::Ack(AckHeader {
                        seqno: hd,
                        conn_id: entry.recv_conn_id,
                    }),
                    &[],
                );
                let _ = transport.send(&src, bytes);
                metrics.record_ack_sent();
            }
        }

        if entry.received_msgs.num_missing() > 0 {
            let gaps = entry.received_msgs.get_missing();
            let Some(h) = gaps.last() else { continue };

            match xmit_task_map.get(&src).copied() {
                None => {
                    // First sweep to observe this gap: give it one more
                    // interval for natural arrival before nagging (§4.10
                    // step 2, §9 "retransmit hysteresis").
                    xmit_task_map.insert(src, h);
                }
                Some(prev) => {
                    let to_request = gaps.retain_le(prev);
                    xmit_task_map.insert(src.clone(), prev.max(h));
                    if !to_request.is_empty() {
                        let mut body = Vec::new();
                        to_request.encode(&mut body);
                        let bytes = encode(&Header::XmitReq, &body);
                        let _ = transport.send(&src, bytes);
                        metrics.record_xmit_req_sent();
                    }
                }
            }
        } else {
            xmit_task_map.remove(&src);
        }
    }
}

fn sweep_senders<A, Tr>(table: &Table<A>, transport: &Tr, metrics: &LayerMetrics)
where
    A: PeerAddress,
    Tr: Transport<A> + ?Sized,
{
    for (dest, entry) in table.senders() {
        let ha = entry.sent_msgs.highest_delivered();
        let hs = entry.sent_msgs.highest_received();
        let watermark = entry.watermark();

        if ha < hs && watermark == (ha, hs) {
            if let Some(stored) = entry.sent_msgs.get(hs) {
                let _ = transport.send(&dest, stored.encode());
                metrics.record_retransmission();
            }
        } else {
            entry.set_watermark((ha, hs));
        }
    }
}
