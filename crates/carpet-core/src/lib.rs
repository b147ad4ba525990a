//! # Carpet Core
//!
//! Transfer orchestration for Flying Carpet.
//!
//! This crate provides:
//! - **`TransferEngine`**: the state machine that sequences ad-hoc
//!   bring-up, TCP rendezvous, key derivation, the framed wire protocol,
//!   and guaranteed wireless teardown
//! - **`TcpRendezvous`**: dial-with-retry on the sender, accept-with-poll
//!   on the receiver, both cancellation-aware
//! - **Role matrix**: the pure host-or-join policy both peers derive from
//!   the operating-system pair alone
//! - **`ProgressSink`**: the narrow capability the engine reports through
//! - **Error taxonomy**: typed failures for every stage
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                TransferEngine (driver task)             │
//! │  prepare → capture network → join/host → rendezvous →   │
//! │  file frames → teardown (always)                        │
//! ├────────────────────────────┬────────────────────────────┤
//! │     keepalive task         │      signal/UI task        │
//! │  (re-joins dropped link)   │   (sets the cancel token)  │
//! └────────────────────────────┴────────────────────────────┘
//! ```
//!
//! All protocol I/O is totally ordered on the driver task. The cancel
//! token is the only synchronisation point between tasks.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod engine;
pub mod error;
pub mod progress;
pub mod rendezvous;

pub use config::{Direction, LinkRole, Mode, Os, Timeouts, TransferConfig, link_role};
pub use engine::TransferEngine;
pub use error::TransferError;
pub use progress::ProgressSink;

/// Default TCP port; must match on both ends
pub const DEFAULT_PORT: u16 = 3290;
