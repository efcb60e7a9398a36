// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # reliable-unicast
//!
//! A reliable point-to-point (unicast) delivery layer: the piece of a
//! group-communication stack that turns an unreliable, possibly-reordering,
//! possibly-duplicating unicast transport into an in-order, exactly-once,
//! gap-free stream of application messages between every pair of
//! endpoints.
//!
//! ## Quick Start
//!
//! ```no_run
//! use reliable_unicast::{LayerConfig, NoMembership, Result, Transport, UnicastLayer, UpLayer};
//!
//! struct LoopbackTransport;
//! impl Transport<u32> for LoopbackTransport {
//!     fn send(&self, _dest: &u32, _bytes: Vec<u8>) -> Result<()> {
//!         Ok(())
//!     }
//! }
//!
//! struct PrintingApp;
//! impl UpLayer<u32> for PrintingApp {
//!     fn deliver(&self, src: &u32, payload: Vec<u8>) {
//!         println!("delivered {} bytes from {src}", payload.len());
//!     }
//! }
//!
//! let config = LayerConfig::builder().build().expect("defaults are valid");
//! let layer = UnicastLayer::start(config, LoopbackTransport, PrintingApp, NoMembership);
//! layer.down(42, b"hello".to_vec()).expect("layer is running");
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-----------------------------------------------------------------+
//! |                  Enclosing group-communication stack             |
//! |        (event bus, view changes, local address resolution)       |
//! +-----------------------------------------------------------------+
//! |                         UnicastLayer (this crate)                |
//! |  down()/up() pipelines -> SenderEntry/ReceiverEntry -> Window    |
//! |  retransmit sweep (delayed ACK + NAK) | idle reaper | age-out    |
//! +-----------------------------------------------------------------+
//! |                    Transport (caller-supplied)                   |
//! +-----------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`UnicastLayer`] | The layer itself: owns both connection tables, the periodic tasks, and the age-out cache |
//! | [`LayerConfig`] | Fluent, validated configuration (window shape, timers, batching) |
//! | [`Window`] | The segmented retransmission table underlying every sender/receiver entry |
//! | [`Transport`], [`UpLayer`], [`Membership`] | Narrow collaborator traits the caller implements |
//!
//! ## Modules Overview
//!
//! - [`layer`] - [`UnicastLayer`], the crate's entry point
//! - [`config`] - [`LayerConfig`] and its builder
//! - [`window`] - the retransmission table (send/receive window)
//! - [`connection`] - per-peer sender/receiver state, connection tables, conn-id allocator, age-out cache
//! - [`pipeline`] - the down/up entry points that drive the window and delivery pump
//! - [`tasks`] - the retransmit sweep and idle reaper background threads
//! - [`header`] - the on-wire header codec
//! - [`seqno_list`] - the compact missing-seqno set carried by XMIT_REQ
//! - [`metrics`] - the management/metrics surface
//! - [`collaborators`] - the `Transport`/`UpLayer`/`Membership` traits the caller implements
//! - [`error`] - the crate's `Error`/`Result` types

/// Narrow collaborator traits (`Transport`, `UpLayer`, `Membership`) the caller implements.
pub mod collaborators;
/// Fluent, validated layer configuration.
pub mod config;
/// Per-peer connection state: sender/receiver entries, the two connection tables, conn-id allocator, age-out cache.
pub mod connection;
/// The crate's `Error`/`Result` types.
pub mod error;
/// The on-wire header codec (§6.1).
pub mod header;
/// [`UnicastLayer`](layer::UnicastLayer), the crate's single public entry point.
pub mod layer;
/// Payload types stored in the send/receive windows.
pub mod message;
/// The management/metrics surface.
pub mod metrics;
/// The down/up entry points that drive the window and delivery pump.
pub mod pipeline;
/// The compact missing-seqno set carried by XMIT_REQ.
pub mod seqno_list;
/// The retransmit sweep and idle reaper background tasks.
pub mod tasks;
/// The segmented retransmission table (send/receive window).
pub mod window;

pub use collaborators::{Membership, NoMembership, Transport, UpLayer};
pub use config::{LayerConfig, LayerConfigBuilder};
pub use connection::{ConnId, PeerAddress};
pub use error::{Error, Result};
pub use header::{DataHeader, Header};
pub use layer::UnicastLayer;
pub use metrics::MetricsSnapshot;
pub use seqno_list::SeqnoList;
pub use window::Window;
