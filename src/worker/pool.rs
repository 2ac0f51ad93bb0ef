//! Owns one `Worker` thread per configured device, tracks lifecycle state,
//! and respawns a crashed worker exactly once per session.

use crate::engine::InferenceEngine;
use crate::error::{Result, SubforgeError};
use crate::worker::state::{WorkerLifecycle, WorkerState};
use crate::worker::worker::Worker;
use std::collections::HashSet;
use std::path::PathBuf;

pub type EngineFactory = dyn Fn(u32) -> Result<Box<dyn InferenceEngine>> + Send + Sync;

pub struct WorkerPool {
    workers: Vec<Option<Worker>>,
    states: Vec<WorkerState>,
    respawned: HashSet<usize>,
    workdir: PathBuf,
    factory: Box<EngineFactory>,
}

impl WorkerPool {
    /// Spawns one worker per `device_list` entry. Each `Worker::spawn` call
    /// warms its engine up before returning, so by the time this function
    /// returns every worker has already crossed the readiness rendezvous.
    pub fn new(
        device_list: &[u32],
        model_key: crate::engine::ModelKey,
        workdir: PathBuf,
        factory: Box<EngineFactory>,
    ) -> Result<Self> {
        let mut workers = Vec::with_capacity(device_list.len());
        let mut states = Vec::with_capacity(device_list.len());

        for (worker_id, &device_id) in device_list.iter().enumerate() {
            let engine = factory(device_id)?;
            let worker = Worker::spawn(worker_id, device_id, workdir.clone(), engine)?;
            let mut state = WorkerState::new(worker_id, device_id, model_key.clone());
            state.state = WorkerLifecycle::Ready;
            workers.push(Some(worker));
            states.push(state);
        }

        Ok(Self { workers, states, respawned: HashSet::new(), workdir, factory })
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn worker(&self, worker_id: usize) -> Option<&Worker> {
        self.workers.get(worker_id).and_then(|w| w.as_ref())
    }

    pub fn state(&self, worker_id: usize) -> Option<&WorkerState> {
        self.states.get(worker_id)
    }

    pub fn mark_busy(&mut self, worker_id: usize) {
        if let Some(state) = self.states.get_mut(worker_id) {
            state.state = WorkerLifecycle::Busy;
        }
    }

    pub fn mark_ready(&mut self, worker_id: usize) {
        if let Some(state) = self.states.get_mut(worker_id) {
            state.state = WorkerLifecycle::Ready;
        }
    }

    pub fn mark_dead(&mut self, worker_id: usize, error: String) {
        if let Some(state) = self.states.get_mut(worker_id) {
            state.state = WorkerLifecycle::Dead;
            state.last_error = Some(error);
        }
    }

    /// Replaces a dead worker with a freshly spawned one. Allowed once per
    /// `worker_id` per session; a second failure on the same worker
    /// propagates as `WorkerSpawn`.
    pub fn respawn(&mut self, worker_id: usize) -> Result<()> {
        if !self.respawned.insert(worker_id) {
            return Err(SubforgeError::WorkerSpawn {
                worker_id,
                message: "already respawned once this session".into(),
            });
        }

        let device_id = self.states[worker_id].device_id;
        let model_key = self.states[worker_id].model_key.clone();

        let engine = (self.factory)(device_id)?;
        let worker = Worker::spawn(worker_id, device_id, self.workdir.clone(), engine)?;

        self.workers[worker_id] = Some(worker);
        self.states[worker_id] = WorkerState::new(worker_id, device_id, model_key);
        self.states[worker_id].state = WorkerLifecycle::Ready;
        Ok(())
    }

    /// Sends a stop message to every worker and joins their handles.
    pub fn drain(&mut self) {
        for state in &mut self.states {
            if state.state != WorkerLifecycle::Dead {
                state.state = WorkerLifecycle::Draining;
            }
        }
        for slot in self.workers.drain(..) {
            if let Some(worker) = slot {
                worker.stop_and_join();
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StubEngine;
    use tempfile::TempDir;

    #[test]
    fn spawns_one_worker_per_device() {
        let dir = TempDir::new().unwrap();
        let model_key = crate::engine::ModelKey::new("base", crate::config::Precision::Float32);
        let pool = WorkerPool::new(
            &[0, 1, 2],
            model_key,
            dir.path().to_path_buf(),
            Box::new(|_device_id| Ok(Box::new(StubEngine::new()) as Box<dyn InferenceEngine>)),
        )
        .unwrap();
        assert_eq!(pool.len(), 3);
        assert!(pool.state(0).unwrap().is_ready());
    }

    #[test]
    fn respawn_is_allowed_once_then_fails() {
        let dir = TempDir::new().unwrap();
        let model_key = crate::engine::ModelKey::new("base", crate::config::Precision::Float32);
        let mut pool = WorkerPool::new(
            &[0],
            model_key,
            dir.path().to_path_buf(),
            Box::new(|_device_id| Ok(Box::new(StubEngine::new()) as Box<dyn InferenceEngine>)),
        )
        .unwrap();

        assert!(pool.respawn(0).is_ok());
        assert!(pool.respawn(0).is_err());
    }

    #[test]
    fn lifecycle_transitions_are_tracked() {
        let dir = TempDir::new().unwrap();
        let model_key = crate::engine::ModelKey::new("base", crate::config::Precision::Float32);
        let mut pool = WorkerPool::new(
            &[0],
            model_key,
            dir.path().to_path_buf(),
            Box::new(|_device_id| Ok(Box::new(StubEngine::new()) as Box<dyn InferenceEngine>)),
        )
        .unwrap();

        assert!(pool.state(0).unwrap().is_ready());
        pool.mark_busy(0);
        assert_eq!(pool.state(0).unwrap().state, WorkerLifecycle::Busy);
        pool.mark_dead(0, "oom".into());
        assert_eq!(pool.state(0).unwrap().state, WorkerLifecycle::Dead);
        assert_eq!(pool.state(0).unwrap().last_error.as_deref(), Some("oom"));
        pool.mark_ready(0);
        assert!(pool.state(0).unwrap().is_ready());
    }
}
