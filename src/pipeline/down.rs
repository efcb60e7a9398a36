// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Outbound pipeline (§4.4).

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::collaborators::{Membership, Transport};
use crate::config::LayerConfig;
use crate::connection::{ConnIdAllocator, ConnectionTable, PeerAddress, FIRST_SEQNO};
use crate::error::{Error, Result};
use crate::header::{DataHeader, Header};
use crate::message::{ReceivedMessage, SentMessage};
use crate::metrics::LayerMetrics;

const ADD_RETRY_INITIAL_BACKOFF: Duration = Duration::from_millis(10);
const ADD_RETRY_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Send `payload` to `dest` through the reliability layer (§4.4). Bypass
/// (`NO_RELIABILITY`) is the caller's concern -- this function is only
/// invoked once that flag has already been checked.
#[allow(clippy::too_many_arguments)]
pub fn send<A, Tr>(
    table: &ConnectionTable<A, SentMessage, ReceivedMessage>,
    conn_ids: &ConnIdAllocator,
    age_out: &crate::connection::AgeOutCache<A>,
    membership: &dyn Membership<A>,
    transport: &Tr,
    config: &LayerConfig,
    running: &AtomicBool,
    metrics: &LayerMetrics,
    dest: A,
    payload: Vec<u8>,
    oob: bool,
) -> Result<()>
where
    A: PeerAddress,
    Tr: Transport<A> + ?Sized,
{
    if !running.load(Ordering::Acquire) {
        return Err(Error::Stopped);
    }

    let shape = config.window_shape();
    let dest_for_entry = dest.clone();
    let mut created = false;
    let entry = table.sender_or_insert_with(dest_for_entry, shape, || {
        created = true;
        conn_ids.allocate()
    });

    if created && age_out.is_enabled() && !membership.is_member(&dest) {
        age_out.register(dest.clone());
    }

    let seqno = entry.allocate_seqno();
    let header = DataHeader {
        seqno,
        conn_id: entry.send_conn_id,
        first: seqno == FIRST_SEQNO,
        oob,
    };
    let stored = SentMessage { header, payload };

    let mut backoff = ADD_RETRY_INITIAL_BACKOFF;
    loop {
        let outcome = entry.sent_msgs.add(seqno, stored.clone());
        if outcome.inserted {
            break;
        }
        // Spec §4.4 step 5 / §5: only transient grow contention should
        // ever retry here; a brand-new, strictly-increasing seqno can
        // never collide with a stale or already-occupied slot, so in
        // practice this loop body never repeats. Kept for the documented
        // failure mode rather than unwrapping blindly.
        if !running.load(Ordering::Acquire) {
            return Err(Error::Stopped);
        }
        std::thread::sleep(backoff);
        backoff = (backoff * 2).min(ADD_RETRY_MAX_BACKOFF);
    }

    entry.touch();
    metrics.record_message_sent();
    transport.send(&dest, stored.encode())?;
    Ok(())
}
