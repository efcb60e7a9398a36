// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Error type for the reliable unicast layer.
//!
//! Per the protocol's error-handling design, almost nothing the core does
//! surfaces as a user-visible error: stale messages, duplicates, and
//! transient retransmission-table contention are all handled internally
//! (see `crate::window`, `crate::pipeline`). `Error` exists for the small
//! set of calls that have a legitimate failing return: configuration
//! validation and transport failures bubbled back out of `down()`.

use std::fmt;

/// Errors returned by the reliable unicast layer's public API.
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Configuration errors
    // ========================================================================
    /// A `LayerConfig` field failed validation (e.g. zero batch size).
    InvalidConfig(String),

    // ========================================================================
    // Resource errors
    // ========================================================================
    /// The retransmission table could not grow to fit the requested seqno
    /// (only possible if the caller configured an absurd row/column product
    /// that overflows `usize`).
    WindowCapacityExceeded,
    /// Operation would block; retry with backoff. Never surfaced to an
    /// application — only used internally by the `down` pipeline's retry
    /// loop and exposed here for tests that exercise `Window::add` directly.
    WouldBlock,

    // ========================================================================
    // Transport errors
    // ========================================================================
    /// The transport below rejected or failed to send a message. The
    /// message remains in the sender's window and will be retried by the
    /// periodic retransmit sweep.
    SendFailed(String),

    // ========================================================================
    // Lifecycle errors
    // ========================================================================
    /// The layer has been stopped; no further sends are accepted.
    Stopped,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidConfig(msg) => write!(f, "invalid configuration: {msg}"),
            Error::WindowCapacityExceeded => write!(f, "retransmission table capacity exceeded"),
            Error::WouldBlock => write!(f, "operation would block"),
            Error::SendFailed(msg) => write!(f, "transport send failed: {msg}"),
            Error::Stopped => write!(f, "layer is stopped"),
        }
    }
}

impl std::error::Error for Error {}

/// Convenient alias for API results using the public `Error` type.
pub type Result<T> = std::result::Result<T, Error>;
