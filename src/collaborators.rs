// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Narrow interfaces to the collaborators named out-of-scope in §6.2/§1 of
//! the core spec: the transport below, the next layer up, and group
//! membership. Keeping these as small traits (rather than one monolithic
//! "stack" handle) lets the layer be driven and tested with a loopback
//! double, the same way `hdds::reliability`'s writer/reader handlers take
//! `&HistoryCache`/`&ReliableMetrics` by reference instead of the whole
//! `DataWriter`. The timer service named in §6.2 has no trait of its own
//! here: the periodic tasks (`crate::tasks`) are plain background threads,
//! matching `hdds::dds::writer`'s own cleanup timer rather than taking an
//! injected scheduler.

use crate::connection::PeerAddress;
use crate::error::Result;

/// The unreliable service this layer sits on top of (§1: "transport
/// below"). A single send; batching, if any, is the caller's concern.
pub trait Transport<A: PeerAddress>: Send + Sync {
    /// Send the already-header-stamped wire bytes to `dest`. Errors
    /// surface to the caller of `down()`/the retransmit task (§7
    /// "Transport failure on a send"); the message remains in the Window
    /// and is retried by the next retransmit sweep regardless of outcome.
    fn send(&self, dest: &A, bytes: Vec<u8>) -> Result<()>;
}

/// The next layer up (§1: "the enclosing protocol stack"). Receives
/// fully reassembled, in-order application payloads.
pub trait UpLayer<A: PeerAddress>: Send + Sync {
    /// Deliver one payload from `src`. §7: a panic/error from this call
    /// must not poison the delivery loop or leak the processing latch --
    /// callers invoke this from inside a caught/logged context and always
    /// continue draining.
    fn deliver(&self, src: &A, payload: Vec<u8>);
}

/// Current group membership (§3 "Age-out cache": registration is gated on
/// "not a known group member"), pushed in by the caller on VIEW_CHANGE
/// rather than polled (§6.2).
pub trait Membership<A: PeerAddress>: Send + Sync {
    fn is_member(&self, addr: &A) -> bool;
}

/// A `Membership` that treats every address as a non-member, i.e.
/// age-out applies unconditionally. Useful when the enclosing stack has
/// no view concept (point-to-point usage with no group layer above).
pub struct NoMembership;

impl<A: PeerAddress> Membership<A> for NoMembership {
    fn is_member(&self, _addr: &A) -> bool {
        false
    }
}
