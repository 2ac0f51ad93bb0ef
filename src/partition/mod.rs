//! Splits speech regions into bounded-duration work units for dispatch.

pub mod partitioner;

pub use partitioner::{AudioSlice, WorkPartitioner, WorkUnit};
