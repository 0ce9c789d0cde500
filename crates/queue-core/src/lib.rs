//! Durable, at-least-once FIFO job queue core: store-adapter contracts
//! (`FastListStore`/`DurableRecordStore`), the job value type, the handler
//! registry, the queue engine, the worker pool, and cross-queue
//! recovery/admin operations.
//!
//! Everything here is store-agnostic; concrete store adapters live in
//! `queue-redis` and `queue-postgres`, and a binary wires them together in
//! `queue-cli`.

pub mod engine;
pub mod error;
pub mod job;
pub mod recovery;
pub mod registry;
pub mod store;
pub mod worker;

#[cfg(test)]
mod scenario_tests;

pub use engine::{QueueEngine, QueueKeys};
pub use error::QueueError;
pub use job::{DurableJobRow, FailedJobRecord, Job, JobStatus, NewFailedJobRecord};
pub use recovery::{QueueInfo, RecoveryOps};
pub use registry::{HandlerRegistry, JobHandler, RegistryError};
pub use store::{DurableRecordStore, FastListStore, ListEnd, ScanPage};
pub use worker::run_workers;
