//! Outbound webhook pipeline: events are persisted as hook tasks, queued by
//! id, converted per provider, signed, and delivered by a worker pool.

pub mod convert;
pub mod deliver;
pub mod error;
pub mod event;
pub mod hook;
pub mod memory;
pub mod model;
pub mod notifier;
pub mod payload;
pub mod pg;
pub mod queue;
pub mod service;
pub mod sign;
pub mod store;

pub use error::{HookError, QueueError};
pub use service::{EventSource, RepoRef, WebhookService};
