//! The external inference engine's contract and model-identity cache key.

pub mod facade;
pub mod model_key;

pub use facade::{InferenceEngine, Language, StubEngine, Task, TextSegment};
#[cfg(test)]
pub use facade::{ExhaustingEngine, FlakyEngine};
pub use model_key::ModelKey;
