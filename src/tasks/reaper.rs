// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The idle connection reaper (§4.11): removes sender/receiver entries
//! that have sat untouched for `conn_expiry_timeout`. A later message
//! to/from the peer transparently recreates the entry, with a fresh
//! `conn_id` on the sender side (forcing the receiver through the
//! SEND_FIRST_SEQNO reset path if needed).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::connection::{ConnectionTable, PeerAddress};
use crate::message::{ReceivedMessage, SentMessage};

use super::TaskHandle;

type Table<A> = ConnectionTable<A, SentMessage, ReceivedMessage>;

/// Spawn the reaper thread: sweeps every `conn_expiry_timeout` and
/// removes any entry whose age has reached that same threshold (§4.11:
/// "every `conn_expiry_timeout` when enabled"). The caller is expected to
/// only call this when [`crate::config::LayerConfig::reaper_enabled`] is
/// `true`.
pub fn spawn<A: PeerAddress>(table: Arc<Table<A>>, conn_expiry_timeout: Duration) -> TaskHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = Arc::clone(&stop);

    TaskHandle::spawn_with(stop, "unicast-reaper", move || {
        while !stop_clone.load(Ordering::Acquire) {
            std::thread::sleep(conn_expiry_timeout);
            if stop_clone.load(Ordering::Acquire) {
                break;
            }
            sweep(&table, conn_expiry_timeout);
        }
    })
}

fn sweep<A: PeerAddress>(table: &Table<A>, max_age: Duration) {
    for dest in table.idle_senders(max_age) {
        if table.remove_sender(&dest).is_some() {
            log::debug!("unicast: reaped idle SenderEntry for {dest:?}");
        }
    }
    for src in table.idle_receivers(max_age) {
        if table.remove_receiver(&src).is_some() {
            log::debug!("unicast: reaped idle ReceiverEntry for {src:?}");
        }
    }
}
