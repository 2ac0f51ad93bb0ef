//! RAII handle to an admitted slot plus its cached inference engine.

use crate::admission::pool::{CachedEngine, TranscriberPool};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineKind {
    Single,
    Parallel,
}

pub struct EngineHandle {
    pool: Arc<TranscriberPool>,
    pub kind: EngineKind,
    pub engine: CachedEngine,
    released: AtomicBool,
}

impl EngineHandle {
    pub(crate) fn new(pool: Arc<TranscriberPool>, kind: EngineKind, engine: CachedEngine) -> Self {
        Self { pool, kind, engine, released: AtomicBool::new(false) }
    }

    /// Gives the slot back early. Safe to call more than once, and safe to
    /// skip entirely — `Drop` calls it if the caller never does.
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::AcqRel) {
            self.pool.release_slot();
        }
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Precision;
    use crate::engine::{InferenceEngine, ModelKey, StubEngine};
    use std::time::{Duration, Instant};

    #[test]
    fn explicit_release_then_drop_does_not_double_free_the_slot() {
        let pool = Arc::new(TranscriberPool::new(1));
        let key = ModelKey::new("base", Precision::Float32);
        let deadline = Instant::now() + Duration::from_millis(50);

        let handle = pool
            .acquire(EngineKind::Single, key.clone(), deadline, || Ok(Box::new(StubEngine::new()) as Box<dyn InferenceEngine>))
            .unwrap();
        handle.release();
        handle.release();
        drop(handle);

        // the slot must be free exactly once, not thrice
        let deadline = Instant::now() + Duration::from_millis(50);
        assert!(pool.acquire(EngineKind::Single, key, deadline, || Ok(Box::new(StubEngine::new()) as Box<dyn InferenceEngine>)).is_ok());
    }
}
