//! Work-unit dispatch, retry, and time-ordered reassembly.

pub mod scheduler;
pub mod unit_result;

pub use scheduler::Scheduler;
pub use unit_result::{UnitResult, UnitStatus};
