//! Thread-based inference workers and the pool that owns them.

pub mod pool;
pub mod state;
pub mod worker;

pub use pool::WorkerPool;
pub use state::{WorkerLifecycle, WorkerState};
pub use worker::{transcribe_unit, Worker, WorkerFailure, WorkerPoll};
