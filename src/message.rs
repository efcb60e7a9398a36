// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Payload types stored in the send/receive windows (§3 "Message").

use crate::header::{DataHeader, Header};

/// A message sitting in a [`crate::window::Window`] on the sender side:
/// the header it was originally stamped with plus the raw payload bytes.
/// Kept separately (rather than pre-encoded) so SEND_FIRST_SEQNO replay
/// (§4.8) can clone this, flip `header.first`, and re-encode without
/// touching the copy still sitting in the window.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub header: DataHeader,
    pub payload: Vec<u8>,
}

impl SentMessage {
    pub fn encode(&self) -> Vec<u8> {
        encode(&Header::Data(self.header), &self.payload)
    }

    /// A copy with `first` forced to `true`, for §4.8 replay.
    pub fn as_first(&self) -> Self {
        Self {
            header: DataHeader {
                first: true,
                ..self.header
            },
            payload: self.payload.clone(),
        }
    }
}

/// A message sitting in a [`crate::window::Window`] on the receiver
/// side. `oob` records whether it was already pushed upward via the §4.6
/// fast path, so the delivery pump can skip re-delivering it once it
/// comes out of a later `remove_many` batch.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub payload: Vec<u8>,
    pub oob: bool,
}

/// Encode `header` followed by `payload` into a single wire buffer.
pub fn encode(header: &Header, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(payload.len() + 12);
    header.encode(&mut buf);
    buf.extend_from_slice(payload);
    buf
}
