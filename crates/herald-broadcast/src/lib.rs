//! # Herald Broadcast
//!
//! The broadcast orchestration engine: an admin stages a mass message, a
//! reminder loop nags until they confirm or the proposal expires, a bounded
//! queue fans the confirmed broadcast out to every matching recipient, and
//! a progress projector live-edits a single status message.
//!
//! ## Architecture
//! ```text
//! workflow completion ──► StagingStore (TTL 10min)
//!                            │ id
//!                            ├──► ReminderScheduler (30s, 60s, 120s… + pre-warning)
//!                            ▼
//!            confirm ──► ConfirmService ──► BroadcastQueue (bounded, cap 100)
//!                                              │ single consumer
//!                                              ▼
//!                                        BroadcastRunner ──► fan-out per recipient
//!                                              │
//!                                              ▼
//!                                        ProgressProjector ──► edits one status message
//! ```

pub mod confirm;
pub mod progress;
pub mod queue;
pub mod reminder;
pub mod staging;
pub mod template;

#[cfg(test)]
pub(crate) mod testutil;

pub use confirm::ConfirmService;
pub use progress::{ProgressProjector, ProgressState};
pub use queue::{broadcast_queue, BroadcastQueue, BroadcastRunner, BroadcastTask};
pub use reminder::{ReminderScheduler, ReminderState};
pub use staging::{BroadcastProposal, StagingStore};
