//! Orchestration core for Plastron container lifecycle.
//!
//! This crate ties the shared data model, the control API boundary, and the
//! persistence layer together: a pure transition table (`machine`), a
//! per-container runtime handle that serializes events and side effects
//! (`service`), and the `Orchestrator`: the single owner of the tracked
//! container registry, the reconciliation tick, cascading teardown, and
//! snapshot persistence.

pub mod machine;
pub mod notify;
pub mod orchestrator;
pub mod service;

pub use machine::{entry_effect, transition, Effect, Event};
pub use notify::{ChangeNotifier, LogNotifier, NullNotifier};
pub use orchestrator::{Orchestrator, DEFAULT_POLL_INTERVAL_SECS};
pub use service::ContainerService;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("schema error: {0}")]
    Schema(#[from] plastron_schema::SchemaError),
    #[error("store error: {0}")]
    Store(#[from] plastron_store::StoreError),
    #[error("container not found: {0}")]
    NotFound(String),
    #[error("session not ready: {0}")]
    SessionNotReady(String),
}
