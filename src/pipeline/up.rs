// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Inbound pipeline (§4.5-§4.9): classify incoming wire bytes, route to
//! the right connection entry, drive delivery.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

use crate::collaborators::{Transport, UpLayer};
use crate::config::LayerConfig;
use crate::connection::{ConnectionTable, PeerAddress};
use crate::header::{AckHeader, DataHeader, Header, SendFirstSeqnoHeader};
use crate::message::{encode, ReceivedMessage, SentMessage};
use crate::metrics::LayerMetrics;
use crate::seqno_list::SeqnoList;

type Table<A> = ConnectionTable<A, SentMessage, ReceivedMessage>;

/// Decode and dispatch one inbound wire message from `src`.
pub fn on_message<A, Tr, Up>(
    table: &Table<A>,
    transport: &Tr,
    up: &Up,
    config: &LayerConfig,
    metrics: &LayerMetrics,
    src: A,
    bytes: &[u8],
) where
    A: PeerAddress,
    Tr: Transport<A> + ?Sized,
    Up: UpLayer<A> + ?Sized,
{
    let Some((header, consumed)) = Header::decode(bytes) else {
        log::error!("unicast: failed to decode header from {src:?}, dropping message");
        return;
    };
    let body = &bytes[consumed..];

    match header {
        Header::Data(h) => {
            on_data(table, transport, up, config, metrics, src, h, body, false);
        }
        Header::Ack(h) => on_ack(table, metrics, &src, h),
        Header::SendFirstSeqno(h) => {
            on_send_first_seqno(table, transport, metrics, config, &src, h);
        }
        Header::XmitReq => on_xmit_req(table, transport, config, metrics, &src, body),
    }
}

/// Decode and dispatch a batch of inbound wire frames from `src` (§4.5).
/// Non-DATA frames are routed one at a time as they would be through
/// [`on_message`]; DATA frames are collected and handed to
/// [`on_data_batch`] so the receiver entry is resolved once per `conn_id`
/// group instead of once per message.
pub fn on_message_batch<A, Tr, Up>(
    table: &Table<A>,
    transport: &Tr,
    up: &Up,
    config: &LayerConfig,
    metrics: &LayerMetrics,
    src: A,
    frames: Vec<Vec<u8>>,
) where
    A: PeerAddress,
    Tr: Transport<A> + ?Sized,
    Up: UpLayer<A> + ?Sized,
{
    let mut data_msgs = Vec::with_capacity(frames.len());
    for bytes in frames {
        let Some((header, consumed)) = Header::decode(&bytes) else {
            log::error!("unicast: failed to decode header from {src:?}, dropping message");
            continue;
        };
        match header {
            Header::Data(h) => data_msgs.push((h, bytes[consumed..].to_vec())),
            Header::Ack(h) => on_ack(table, metrics, &src, h),
            Header::SendFirstSeqno(h) => {
                on_send_first_seqno(table, transport, metrics, config, &src, h);
            }
            Header::XmitReq => {
                on_xmit_req(table, transport, config, metrics, &src, &bytes[consumed..]);
            }
        }
    }
    if !data_msgs.is_empty() {
        on_data_batch(table, transport, up, config, metrics, src, data_msgs);
    }
}

/// Dispatch a batch of DATA messages already grouped by `conn_id`,
/// preserving arrival order within each group (§4.5). Each group resolves
/// its receiver entry once.
pub fn on_data_batch<A, Tr, Up>(
    table: &Table<A>,
    transport: &Tr,
    up: &Up,
    config: &LayerConfig,
    metrics: &LayerMetrics,
    src: A,
    messages: Vec<(DataHeader, Vec<u8>)>,
) where
    A: PeerAddress,
    Tr: Transport<A> + ?Sized,
    Up: UpLayer<A> + ?Sized,
{
    let mut groups: HashMap<_, Vec<_>> = HashMap::new();
    for (header, payload) in messages {
        groups.entry(header.conn_id).or_default().push((header, payload));
    }
    for (_, group) in groups {
        for (header, payload) in group {
            on_data(
                table,
                transport,
                up,
                config,
                metrics,
                src.clone(),
                header,
                &payload,
                true,
            );
        }
    }
    if let Some(entry) = table.get_receiver(&src) {
        if config.ack_batches_immediately() {
            let hd = entry.received_msgs.highest_delivered();
            if entry.take_ack(hd) {
                send_ack(transport, metrics, &src, hd, entry.recv_conn_id);
            }
        }
    }
}

/// DATA reception and delivery pump (§4.6). `batch` distinguishes the
/// single-message entry point from [`on_data_batch`], which additionally
/// emits an immediate ACK on a successful handshake (`first=true`).
#[allow(clippy::too_many_arguments)]
fn on_data<A, Tr, Up>(
    table: &Table<A>,
    transport: &Tr,
    up: &Up,
    config: &LayerConfig,
    metrics: &LayerMetrics,
    src: A,
    header: DataHeader,
    payload: &[u8],
    batch: bool,
) where
    A: PeerAddress,
    Tr: Transport<A> + ?Sized,
    Up: UpLayer<A> + ?Sized,
{
    metrics.record_message_received();

    // Fast path: matching entry already resolved, no lock needed.
    let entry = if let Some(existing) = table.get_receiver(&src) {
        if existing.recv_conn_id == header.conn_id {
            Some(existing)
        } else if header.first {
            let shape = config.window_shape();
            let (fresh, replaced) =
                table.receiver_for_incarnation(src.clone(), header.conn_id, shape, header.seqno - 1);
            if replaced {
                log::debug!(
                    "unicast: sender {src:?} restarted (conn_id {:?} -> {:?}), receive window reset",
                    existing.recv_conn_id,
                    header.conn_id
                );
            }
            Some(fresh)
        } else {
            // §4.13: Established(c) -(DATA !first, c'!=c)-> None then
            // SEND_FIRST_SEQNO. The mismatched incarnation's entry is gone;
            // it is not this message's to establish.
            table.remove_receiver(&src);
            log::warn!(
                "unicast: DATA from {src:?} with unknown conn_id {:?} and first=false, requesting SEND_FIRST_SEQNO",
                header.conn_id
            );
            request_first_seqno(transport, metrics, &src, header.seqno);
            None
        }
    } else if header.first {
        let shape = config.window_shape();
        let (fresh, _) =
            table.receiver_for_incarnation(src.clone(), header.conn_id, shape, header.seqno - 1);
        Some(fresh)
    } else {
        log::warn!(
            "unicast: DATA from unknown sender {src:?}, requesting SEND_FIRST_SEQNO({})",
            header.seqno
        );
        request_first_seqno(transport, metrics, &src, header.seqno);
        None
    };

    let Some(entry) = entry else { return };
    entry.touch();

    let outcome = entry.received_msgs.add(
        header.seqno,
        ReceivedMessage {
            payload: payload.to_vec(),
            oob: header.oob,
        },
    );

    if batch && header.first && outcome.inserted {
        let hd = entry.received_msgs.highest_delivered();
        if entry.take_ack(hd) {
            send_ack(transport, metrics, &src, hd, entry.recv_conn_id);
        }
    }

    if header.oob && outcome.inserted {
        deliver_guarded(up, &src, payload.to_vec());
    }

    if outcome.became_deliverer {
        loop {
            let Some(batch) = entry
                .received_msgs
                .remove_many(true, config.max_msg_batch_size())
            else {
                break;
            };
            for (_, msg) in batch {
                if !msg.oob {
                    deliver_guarded(up, &src, msg.payload);
                }
            }
        }
    }

    entry.mark_ack_pending();
}

/// ACK handling (§4.7).
fn on_ack<A: PeerAddress>(table: &Table<A>, metrics: &LayerMetrics, src: &A, header: AckHeader) {
    metrics.record_ack_received();
    let Some(entry) = table.get_sender(src) else {
        return;
    };
    if entry.send_conn_id != header.conn_id {
        return;
    }
    entry.sent_msgs.purge(header.seqno, true);
}

/// SEND_FIRST_SEQNO handling (§4.8).
fn on_send_first_seqno<A, Tr>(
    table: &Table<A>,
    transport: &Tr,
    metrics: &LayerMetrics,
    config: &LayerConfig,
    src: &A,
    header: SendFirstSeqnoHeader,
) where
    A: PeerAddress,
    Tr: Transport<A> + ?Sized,
{
    let Some(entry) = table.get_sender(src) else {
        log::warn!("unicast: SEND_FIRST_SEQNO from {src:?} but no SenderEntry, dropping");
        return;
    };

    let low = entry.sent_msgs.low();
    let mut restamped_first = false;
    let mut s = low;
    while s <= header.seqno {
        if let Some(stored) = entry.sent_msgs.get(s) {
            let to_send = if !restamped_first {
                restamped_first = true;
                stored.as_first()
            } else {
                stored
            };
            let _ = transport.send(src, to_send.encode());
            metrics.record_message_sent();
        }
        s += 1;
    }
    let _ = config;
}

/// XMIT_REQ handling (§4.9).
fn on_xmit_req<A, Tr>(
    table: &Table<A>,
    transport: &Tr,
    config: &LayerConfig,
    metrics: &LayerMetrics,
    src: &A,
    body: &[u8],
) where
    A: PeerAddress,
    Tr: Transport<A> + ?Sized,
{
    metrics.record_xmit_req_received();
    let Some(missing) = SeqnoList::decode(body) else {
        log::error!("unicast: malformed XMIT_REQ payload from {src:?}");
        return;
    };
    let Some(entry) = table.get_sender(src) else {
        return;
    };
    let low = entry.sent_msgs.low();
    for s in missing.to_seqnos() {
        match entry.sent_msgs.get(s) {
            Some(stored) => {
                let _ = transport.send(src, stored.encode());
                metrics.record_xmit_response_sent();
                metrics.record_retransmission();
            }
            None => {
                if config.log_not_found_msgs() && s > low {
                    log::warn!(
                        "unicast: XMIT_REQ from {src:?} asked for seqno {s} no longer in the table"
                    );
                }
            }
        }
    }
}

fn request_first_seqno<A, Tr>(transport: &Tr, metrics: &LayerMetrics, src: &A, seqno: u64)
where
    A: PeerAddress,
    Tr: Transport<A> + ?Sized,
{
    let bytes = encode(&Header::SendFirstSeqno(SendFirstSeqnoHeader { seqno }), &[]);
    let _ = transport.send(src, bytes);
    metrics.record_message_sent();
}

fn send_ack<A, Tr>(
    transport: &Tr,
    metrics: &LayerMetrics,
    src: &A,
    seqno: u64,
    conn_id: crate::connection::ConnId,
) where
    A: PeerAddress,
    Tr: Transport<A> + ?Sized,
{
    let bytes = encode(&Header::Ack(AckHeader { seqno, conn_id }), &[]);
    let _ = transport.send(src, bytes);
    metrics.record_ack_sent();
}

/// Deliver one payload upward, catching a panic from [`UpLayer::deliver`]
/// instead of letting it unwind through the delivery pump (§7: "Delivery
/// failure upstream ... caught, logged; delivery loop continues"). Without
/// this, a panic mid-`remove_many` batch would unwind past the point where
/// the processing latch gets re-armed, permanently stranding it `true` and
/// starving every later delivery for that receiver.
fn deliver_guarded<A, Up>(up: &Up, src: &A, payload: Vec<u8>)
where
    A: PeerAddress,
    Up: UpLayer<A> + ?Sized,
{
    if catch_unwind(AssertUnwindSafe(|| up.deliver(src, payload))).is_err() {
        log::error!("unicast: UpLayer::deliver panicked for {src:?}, dropping message and continuing");
    }
}
