//! # Sokoni Sync
//!
//! Offline-first synchronization: checkpoint-based delta pull, chunked
//! transfer over a frozen snapshot window, push with per-mutation conflict
//! capture, and a background queue with exponential-backoff retry.
//!
//! ## Shape
//!
//! ```text
//! Pull  ──► decode checkpoint ──► per-collection deltas ──► new checkpoint
//! Push  ──► version match? apply : conflict queue item
//! Queue ──► claimer (every 30 s) ──► bounded channel ──► N workers
//! ```
//!
//! [`service::SyncCore`] is the operation surface;
//! [`queue::SyncQueueSupervisor`] runs the background half on top of it.

#![deny(missing_docs)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod checkpoint;
pub mod compress;
pub mod config;
pub mod error;
pub mod queue;
pub mod service;
pub mod types;

pub use config::{RetryPolicy, SyncConfig};
pub use error::{Result, SyncError};
pub use queue::{SupervisorHandle, SyncQueueSupervisor};
pub use service::{ItemOutcome, SyncCore};
pub use types::{
    ChangeSet, ChunkedPullRequest, ChunkedPullResponse, PullRequest, PullResponse, PushOutcome,
    RecordMutation,
};
