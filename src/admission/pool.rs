//! Bounds concurrent sessions with a hand-rolled, FIFO-fair counting
//! semaphore and reuses warmed-up engines across requests.

use crate::admission::handle::{EngineHandle, EngineKind};
use crate::engine::{InferenceEngine, ModelKey};
use crate::error::{Result, SubforgeError};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

/// A warmed-up engine shared by every request that asks for the same
/// `(EngineKind, ModelKey)`. Calls into it are serialised by its own mutex,
/// not by the admission pool.
#[derive(Clone)]
pub struct CachedEngine(pub Arc<parking_lot::Mutex<Box<dyn InferenceEngine>>>);

struct SemaphoreState {
    in_use: usize,
    next_ticket: u64,
    serving: u64,
}

pub struct TranscriberPool {
    max_sessions: usize,
    state: Mutex<SemaphoreState>,
    cv: Condvar,
    cache: parking_lot::Mutex<HashMap<(EngineKind, ModelKey), CachedEngine>>,
}

impl TranscriberPool {
    pub fn new(max_sessions: usize) -> Self {
        Self {
            max_sessions,
            state: Mutex::new(SemaphoreState { in_use: 0, next_ticket: 0, serving: 0 }),
            cv: Condvar::new(),
            cache: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Blocks until a session slot is free (tickets are served strictly in
    /// arrival order) or `deadline` passes, then hands back an `EngineHandle`
    /// wrapping a cached (or freshly built and warmed) engine.
    pub fn acquire(
        self: &Arc<Self>,
        kind: EngineKind,
        model_key: ModelKey,
        deadline: Instant,
        factory: impl FnOnce() -> Result<Box<dyn InferenceEngine>>,
    ) -> Result<EngineHandle> {
        self.acquire_slot(deadline)?;

        match self.get_or_insert_engine(kind, model_key, factory) {
            Ok(engine) => Ok(EngineHandle::new(Arc::clone(self), kind, engine)),
            Err(e) => {
                self.release_slot();
                Err(e)
            }
        }
    }

    fn acquire_slot(&self, deadline: Instant) -> Result<()> {
        let started = Instant::now();
        let mut state = self.state.lock().unwrap();
        let ticket = state.next_ticket;
        state.next_ticket += 1;

        loop {
            if ticket == state.serving && state.in_use < self.max_sessions {
                state.in_use += 1;
                state.serving += 1;
                self.cv.notify_all();
                return Ok(());
            }

            let now = Instant::now();
            if now >= deadline {
                if ticket == state.serving {
                    // this ticket was at the front but never got a slot;
                    // advance serving so the next waiter isn't stuck behind
                    // a ticket that gave up.
                    state.serving += 1;
                    self.cv.notify_all();
                }
                let waited_ms = started.elapsed().as_millis() as u64;
                return Err(SubforgeError::AdmissionTimeout { waited_ms });
            }

            let (guard, _timeout) = self.cv.wait_timeout(state, deadline - now).unwrap();
            state = guard;
        }
    }

    pub(crate) fn release_slot(&self) {
        let mut state = self.state.lock().unwrap();
        state.in_use = state.in_use.saturating_sub(1);
        self.cv.notify_all();
    }

    fn get_or_insert_engine(
        &self,
        kind: EngineKind,
        model_key: ModelKey,
        factory: impl FnOnce() -> Result<Box<dyn InferenceEngine>>,
    ) -> Result<CachedEngine> {
        let cache_key = (kind, model_key);
        {
            let cache = self.cache.lock();
            if let Some(existing) = cache.get(&cache_key) {
                return Ok(existing.clone());
            }
        }

        let mut engine = factory()?;
        engine.warm_up()?;
        let cached = CachedEngine(Arc::new(parking_lot::Mutex::new(engine)));

        let mut cache = self.cache.lock();
        let cached = cache.entry(cache_key).or_insert(cached).clone();
        Ok(cached)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Precision;
    use crate::engine::StubEngine;
    use std::sync::mpsc;
    use std::thread;
    use std::time::Duration;

    fn key() -> ModelKey {
        ModelKey::new("base", Precision::Float32)
    }

    #[test]
    fn acquire_blocks_past_max_sessions_until_release() {
        let pool = Arc::new(TranscriberPool::new(1));
        let deadline = Instant::now() + Duration::from_secs(2);

        let h1 = pool
            .acquire(EngineKind::Single, key(), deadline, || Ok(Box::new(StubEngine::new()) as Box<dyn InferenceEngine>))
            .unwrap();

        let pool2 = Arc::clone(&pool);
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let deadline = Instant::now() + Duration::from_secs(2);
            let h2 = pool2
                .acquire(EngineKind::Single, key(), deadline, || Ok(Box::new(StubEngine::new()) as Box<dyn InferenceEngine>))
                .unwrap();
            tx.send(()).unwrap();
            drop(h2);
        });

        thread::sleep(Duration::from_millis(50));
        assert!(rx.try_recv().is_err(), "second acquire should still be blocked");

        drop(h1);
        rx.recv_timeout(Duration::from_secs(1)).unwrap();
    }

    #[test]
    fn acquire_times_out_past_deadline() {
        let pool = Arc::new(TranscriberPool::new(1));
        let _h1 = pool
            .acquire(EngineKind::Single, key(), Instant::now() + Duration::from_secs(2), || {
                Ok(Box::new(StubEngine::new()) as Box<dyn InferenceEngine>)
            })
            .unwrap();

        let deadline = Instant::now() + Duration::from_millis(50);
        let result = pool.acquire(EngineKind::Single, key(), deadline, || Ok(Box::new(StubEngine::new()) as Box<dyn InferenceEngine>));
        assert!(matches!(result, Err(SubforgeError::AdmissionTimeout { .. })));
    }

    #[test]
    fn three_waiters_are_served_in_arrival_order() {
        let pool = Arc::new(TranscriberPool::new(1));
        let deadline = Instant::now() + Duration::from_secs(5);
        let held = pool
            .acquire(EngineKind::Single, key(), deadline, || Ok(Box::new(StubEngine::new()) as Box<dyn InferenceEngine>))
            .unwrap();

        let order = Arc::new(Mutex::new(Vec::new()));
        let mut handles = Vec::new();
        for i in 0..3 {
            let pool = Arc::clone(&pool);
            let order = Arc::clone(&order);
            thread::sleep(Duration::from_millis(10));
            handles.push(thread::spawn(move || {
                let deadline = Instant::now() + Duration::from_secs(5);
                let h = pool
                    .acquire(EngineKind::Single, key(), deadline, || Ok(Box::new(StubEngine::new()) as Box<dyn InferenceEngine>))
                    .unwrap();
                order.lock().unwrap().push(i);
                thread::sleep(Duration::from_millis(20));
                drop(h);
            }));
        }

        thread::sleep(Duration::from_millis(60));
        drop(held);
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
    }

    #[test]
    fn same_model_key_reuses_cached_engine() {
        let pool = Arc::new(TranscriberPool::new(2));
        let deadline = Instant::now() + Duration::from_secs(1);
        let h1 = pool
            .acquire(EngineKind::Single, key(), deadline, || Ok(Box::new(StubEngine::new()) as Box<dyn InferenceEngine>))
            .unwrap();
        let h2 = pool
            .acquire(EngineKind::Single, key(), deadline, || panic!("factory should not run on cache hit"))
            .unwrap();
        assert!(Arc::ptr_eq(&h1.engine.0, &h2.engine.0));
    }
}
