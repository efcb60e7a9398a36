// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The age-out sweep (§3 "Age-out cache", §5 "`max_retransmit_time` ...
//! drives age-out for non-member destinations"): periodically checks the
//! [`AgeOutCache`] for expired non-member destinations and tears down both
//! windows for each one, exactly like `expired(addr)` in §3.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::connection::{AgeOutCache, ConnectionTable, PeerAddress};
use crate::message::{ReceivedMessage, SentMessage};

use super::TaskHandle;

type Table<A> = ConnectionTable<A, SentMessage, ReceivedMessage>;

/// Spawn the age-out sweep thread at `interval`. The caller is expected to
/// only call this when `age_out.is_enabled()` (i.e. `max_retransmit_time`
/// is non-zero); a disabled cache never registers anything, so the sweep
/// would be a harmless no-op either way.
pub fn spawn<A: PeerAddress>(
    table: Arc<Table<A>>,
    age_out: Arc<AgeOutCache<A>>,
    interval: Duration,
) -> TaskHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = Arc::clone(&stop);

    TaskHandle::spawn_with(stop, "unicast-age-out", move || {
        while !stop_clone.load(Ordering::Acquire) {
            std::thread::sleep(interval);
            if stop_clone.load(Ordering::Acquire) {
                break;
            }
            sweep(&table, &age_out);
        }
    })
}

/// Tear down both windows for every destination whose age-out deadline has
/// passed. Shared by the background task and [`crate::layer::UnicastLayer::sweep_age_out`]
/// so a caller can also trigger it on its own schedule (e.g. alongside a
/// VIEW_CHANGE tick) without waiting for the next background interval.
pub fn sweep<A: PeerAddress>(table: &Table<A>, age_out: &AgeOutCache<A>) {
    for dest in age_out.sweep_expired() {
        table.remove_sender(&dest);
        table.remove_receiver(&dest);
        log::debug!("unicast: aged out connection state for {dest:?}");
    }
}
