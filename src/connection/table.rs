// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The two concurrent per-peer tables (§4.2-4.3): `send_table` keyed by
//! destination, `recv_table` keyed by source. Both use put-if-absent
//! entry creation so a burst of concurrent first-contact traffic to/from
//! the same peer creates exactly one entry.
//!
//! The two tables store different message shapes (the sender keeps the
//! original header around for §4.8 replay, the receiver only needs the
//! payload plus an OOB flag), hence the two independent type parameters.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;

use super::{ConnId, PeerAddress, ReceiverEntry, SenderEntry, WindowShape};

/// Owns both connection tables for a [`crate::layer::UnicastLayer`].
///
/// `recv_table` creation is additionally serialized by `recv_table_lock`
/// (§4.6 step 2: "creating a fresh `ReceiverEntry` on a `first=true` DATA
/// must not race with a concurrent XMIT_REQ handler reading the old
/// entry") even though `DashMap` itself is internally sharded and safe to
/// call concurrently -- the lock protects the *decision* of whether to
/// replace an existing entry, not the map's bookkeeping.
pub struct ConnectionTable<A: PeerAddress, TSend, TRecv> {
    send_table: DashMap<A, Arc<SenderEntry<TSend>>>,
    recv_table: DashMap<A, Arc<ReceiverEntry<TRecv>>>,
    recv_table_lock: Mutex<()>,
}

impl<A: PeerAddress, TSend, TRecv> ConnectionTable<A, TSend, TRecv> {
    pub fn new() -> Self {
        Self {
            send_table: DashMap::new(),
            recv_table: DashMap::new(),
            recv_table_lock: Mutex::new(()),
        }
    }

    /// Fetch the sender entry for `dest`, creating one with a freshly
    /// allocated `conn_id` if this is the first send to that destination
    /// (§4.4 step 1).
    pub fn sender_or_insert_with(
        &self,
        dest: A,
        shape: WindowShape,
        alloc_conn_id: impl FnOnce() -> ConnId,
    ) -> Arc<SenderEntry<TSend>> {
        Arc::clone(
            &*self
                .send_table
                .entry(dest)
                .or_insert_with(|| Arc::new(SenderEntry::new(alloc_conn_id(), shape))),
        )
    }

    pub fn get_sender(&self, dest: &A) -> Option<Arc<SenderEntry<TSend>>> {
        self.send_table.get(dest).map(|e| Arc::clone(&e))
    }

    pub fn remove_sender(&self, dest: &A) -> Option<Arc<SenderEntry<TSend>>> {
        self.send_table.remove(dest).map(|(_, v)| v)
    }

    pub fn get_receiver(&self, src: &A) -> Option<Arc<ReceiverEntry<TRecv>>> {
        self.recv_table.get(src).map(|e| Arc::clone(&e))
    }

    /// Fetch the receiver entry for `src`, creating one if absent. If an
    /// entry already exists but was opened under a different `conn_id`
    /// than `incoming_conn_id`, the old one is replaced (§4.6 "sender
    /// restart": a new incarnation discards all state from the old one).
    ///
    /// Returns `(entry, replaced)`: `replaced` is `true` when an old
    /// incarnation's entry was torn down to make room for this one, so
    /// the caller can log the restart.
    pub fn receiver_for_incarnation(
        &self,
        src: A,
        incoming_conn_id: ConnId,
        shape: WindowShape,
        start_offset: u64,
    ) -> (Arc<ReceiverEntry<TRecv>>, bool) {
        let _guard = self.recv_table_lock.lock();

        if let Some(existing) = self.recv_table.get(&src) {
            if existing.recv_conn_id == incoming_conn_id {
                return (Arc::clone(&existing), false);
            }
        }

        let fresh = Arc::new(ReceiverEntry::new(incoming_conn_id, shape, start_offset));
        let replaced = self.recv_table.insert(src, Arc::clone(&fresh)).is_some();
        (fresh, replaced)
    }

    pub fn remove_receiver(&self, src: &A) -> Option<Arc<ReceiverEntry<TRecv>>> {
        self.recv_table.remove(src).map(|(_, v)| v)
    }

    /// Peers with a sender entry idle longer than `max_age`.
    pub fn idle_senders(&self, max_age: Duration) -> Vec<A> {
        self.send_table
            .iter()
            .filter(|e| e.value().age() >= max_age)
            .map(|e| e.key().clone())
            .collect()
    }

    /// Peers with a receiver entry idle longer than `max_age`.
    pub fn idle_receivers(&self, max_age: Duration) -> Vec<A> {
        self.recv_table
            .iter()
            .filter(|e| e.value().age() >= max_age)
            .map(|e| e.key().clone())
            .collect()
    }

    pub fn sender_count(&self) -> usize {
        self.send_table.len()
    }

    pub fn receiver_count(&self) -> usize {
        self.recv_table.len()
    }

    /// All current destinations with an open sender entry, for the
    /// periodic retransmit sweep (§4.10) to iterate over.
    pub fn senders(&self) -> Vec<(A, Arc<SenderEntry<TSend>>)> {
        self.send_table
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect()
    }

    /// All current sources with an open receiver entry, for the idle
    /// reaper (§4.11) and stall detector to iterate over.
    pub fn receivers(&self) -> Vec<(A, Arc<ReceiverEntry<TRecv>>)> {
        self.recv_table
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect()
    }
}

impl<A: PeerAddress, TSend, TRecv> Default for ConnectionTable<A, TSend, TRecv> {
    fn default() -> Self {
        Self::new()
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
    fn sender_or_insert_with_creates_exactly_once() {
        let table: ConnectionTable<u32, u8, u8> = ConnectionTable::new();
        let mut calls = 0;
        table.sender_or_insert_with(1, shape(), || {
            calls += 1;
            ConnId(7)
        });
        table.sender_or_insert_with(1, shape(), || {
            calls += 1;
            ConnId(9)
        });
        assert_eq!(calls, 1);
        assert_eq!(table.get_sender(&1).unwrap().send_conn_id, ConnId(7));
    }

    #[test]
    fn receiver_for_incarnation_reuses_same_conn_id() {
        let table: ConnectionTable<u32, u8, u8> = ConnectionTable::new();
        let (first, replaced) = table.receiver_for_incarnation(1, ConnId(3), shape(), 0);
        assert!(!replaced);
        let (second, replaced) = table.receiver_for_incarnation(1, ConnId(3), shape(), 0);
        assert!(!replaced);
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn receiver_for_incarnation_replaces_on_new_conn_id() {
        let table: ConnectionTable<u32, u8, u8> = ConnectionTable::new();
        let (first, _) = table.receiver_for_incarnation(1, ConnId(3), shape(), 0);
        let (second, replaced) = table.receiver_for_incarnation(1, ConnId(4), shape(), 0);
        assert!(replaced, "sender restart must replace the old entry");
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(second.recv_conn_id, ConnId(4));
    }
}
