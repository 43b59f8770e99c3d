//! Job lifecycle: request validation, the in-process store, the worker
//! queue and the per-attempt runner that ties sandbox, pipeline and remote
//! together.

pub mod models;
pub mod queue;
pub mod runner;
pub mod store;

pub use models::{JobEvent, JobId, JobRecord, JobRequest, JobResult, JobStatus};
pub use queue::{JobQueue, backoff_delay};
pub use runner::{JobRunner, SandboxJobRunner};
pub use store::JobStore;
