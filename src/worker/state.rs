//! Per-worker lifecycle tracking, surfaced to the pool's readiness
//! rendezvous and crash-detection path.

use crate::engine::ModelKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerLifecycle {
    Spawning,
    Ready,
    Busy,
    Draining,
    Dead,
}

#[derive(Debug, Clone)]
pub struct WorkerState {
    pub worker_id: usize,
    pub device_id: u32,
    pub model_key: ModelKey,
    pub state: WorkerLifecycle,
    pub last_error: Option<String>,
}

impl WorkerState {
    pub fn new(worker_id: usize, device_id: u32, model_key: ModelKey) -> Self {
        Self { worker_id, device_id, model_key, state: WorkerLifecycle::Spawning, last_error: None }
    }

    pub fn is_ready(&self) -> bool {
        self.state == WorkerLifecycle::Ready
    }
}
