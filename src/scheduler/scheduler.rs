//! Dispatches work units across a `WorkerPool` (or one in-process engine for
//! the `N = 1` path), retries a failed unit once, and reassembles results in
//! unit-id order.

use crate::engine::{InferenceEngine, Task, TextSegment};
use crate::error::{Result, SubforgeError};
use crate::partition::WorkUnit;
use crate::scheduler::unit_result::{UnitResult, UnitStatus};
use crate::worker::{transcribe_unit, WorkerFailure, WorkerPoll, WorkerPool};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;

/// A unit a worker currently holds, and how many times it has been handed
/// out (0 = first try, 1 = the one allowed retry).
struct InFlight {
    unit: WorkUnit,
    attempt: u8,
}

pub struct Scheduler;

impl Scheduler {
    /// Any ready worker takes the lowest-numbered pending unit next; a
    /// worker that finishes early immediately picks up another instead of
    /// sitting idle while a different worker's queue drains. All workers
    /// are polled without blocking in a round, so the `N` OS threads
    /// `WorkerPool` spawned actually run concurrently instead of one at a
    /// time.
    pub fn run(units: Vec<WorkUnit>, pool: &mut WorkerPool, task: Task) -> Result<Vec<TextSegment>> {
        if units.is_empty() || pool.is_empty() {
            return Ok(Vec::new());
        }

        let worker_count = pool.len();
        let mut results: Vec<UnitResult> = Vec::new();
        let mut pending: VecDeque<WorkUnit> = VecDeque::new();

        for unit in units {
            if unit.region.duration_s() < 0.1 {
                results.push(UnitResult {
                    unit_id: unit.unit_id,
                    status: UnitStatus::Skipped,
                    segments: Vec::new(),
                    error: None,
                    worker_id: 0,
                    elapsed_s: 0.0,
                });
            } else {
                pending.push_back(unit);
            }
        }

        let mut in_flight: HashMap<usize, InFlight> = HashMap::new();
        let mut consecutive_exhaustions: u32 = 0;

        for worker_id in 0..worker_count {
            Self::try_advance(pool, worker_id, &mut pending, &mut in_flight, task)?;
        }

        while !in_flight.is_empty() || !pending.is_empty() {
            let mut progressed = false;

            for worker_id in 0..worker_count {
                if !in_flight.contains_key(&worker_id) {
                    continue;
                }

                let poll = match pool.worker(worker_id) {
                    Some(worker) => worker.poll(),
                    None => continue,
                };

                match poll {
                    WorkerPoll::Pending => continue,
                    WorkerPoll::Output(output) => {
                        progressed = true;
                        let held = in_flight.remove(&worker_id).expect("worker reported output with no dispatched unit");
                        pool.mark_ready(worker_id);

                        match output.segments {
                            Ok(segments) => {
                                consecutive_exhaustions = 0;
                                results.push(UnitResult {
                                    unit_id: held.unit.unit_id,
                                    status: UnitStatus::Ok,
                                    segments,
                                    error: None,
                                    worker_id,
                                    elapsed_s: output.elapsed_s,
                                });
                                Self::try_advance(pool, worker_id, &mut pending, &mut in_flight, task)?;
                            }
                            Err(WorkerFailure::DeviceExhaustion(message)) => {
                                consecutive_exhaustions += 1;
                                pool.mark_dead(worker_id, message.clone());
                                log::warn!("worker {worker_id} device exhausted on unit {}: {message}", held.unit.unit_id);

                                if consecutive_exhaustions >= 2 {
                                    return Err(SubforgeError::DeviceExhaustion { worker_id, message });
                                }

                                if held.attempt >= 1 {
                                    results.push(Self::failed(held.unit.unit_id, worker_id, message));
                                    Self::try_advance(pool, worker_id, &mut pending, &mut in_flight, task)?;
                                } else {
                                    pool.respawn(worker_id)?;
                                    Self::dispatch_to(pool, worker_id, held.unit, 1, task, &mut in_flight)?;
                                }
                            }
                            Err(WorkerFailure::Transcription(message)) => {
                                consecutive_exhaustions = 0;
                                Self::retry_or_fail(pool, worker_id, held, message, &mut pending, &mut in_flight, &mut results, task)?;
                            }
                        }
                    }
                    WorkerPoll::Disconnected => {
                        progressed = true;
                        consecutive_exhaustions = 0;
                        let held = in_flight.remove(&worker_id).expect("worker reported disconnect with no dispatched unit");
                        Self::retry_or_fail(
                            pool,
                            worker_id,
                            held,
                            "worker thread gone".to_string(),
                            &mut pending,
                            &mut in_flight,
                            &mut results,
                            task,
                        )?;
                    }
                }
            }

            if !progressed {
                std::thread::sleep(Duration::from_millis(1));
            }
        }

        results.sort_by_key(|r| r.unit_id);

        for pair in results.windows(2) {
            if let (Some(prev), Some(next)) = (pair[0].segments.last(), pair[1].segments.first()) {
                if next.start_s < prev.end_s {
                    log::warn!(
                        "unit {} segment starts before unit {} segment ends ({} < {})",
                        pair[1].unit_id,
                        pair[0].unit_id,
                        next.start_s,
                        prev.end_s
                    );
                }
            }
        }

        Ok(results.into_iter().flat_map(|r| r.segments).collect())
    }

    /// Hands the next pending unit (lowest unit_id first) to a worker that
    /// just freed up, if any remain.
    fn try_advance(
        pool: &mut WorkerPool,
        worker_id: usize,
        pending: &mut VecDeque<WorkUnit>,
        in_flight: &mut HashMap<usize, InFlight>,
        task: Task,
    ) -> Result<()> {
        if let Some(unit) = pending.pop_front() {
            Self::dispatch_to(pool, worker_id, unit, 0, task, in_flight)?;
        }
        Ok(())
    }

    fn dispatch_to(
        pool: &mut WorkerPool,
        worker_id: usize,
        unit: WorkUnit,
        attempt: u8,
        task: Task,
        in_flight: &mut HashMap<usize, InFlight>,
    ) -> Result<()> {
        pool.mark_busy(worker_id);
        let worker = pool
            .worker(worker_id)
            .ok_or_else(|| SubforgeError::WorkerSpawn { worker_id, message: "worker missing".into() })?;
        worker.dispatch(unit.clone(), task)?;
        in_flight.insert(worker_id, InFlight { unit, attempt });
        Ok(())
    }

    /// A unit's first failure (crash or ordinary transcription error) is
    /// retried once, on a respawned worker if the original died; a second
    /// failure is recorded as `Failed` with no segments.
    #[allow(clippy::too_many_arguments)]
    fn retry_or_fail(
        pool: &mut WorkerPool,
        worker_id: usize,
        held: InFlight,
        message: String,
        pending: &mut VecDeque<WorkUnit>,
        in_flight: &mut HashMap<usize, InFlight>,
        results: &mut Vec<UnitResult>,
        task: Task,
    ) -> Result<()> {
        let unit_id = held.unit.unit_id;
        if held.attempt >= 1 {
            log::warn!("unit {unit_id} failed again after retry: {message}, recording empty");
            results.push(Self::failed(unit_id, worker_id, message));
            Self::try_advance(pool, worker_id, pending, in_flight, task)
        } else {
            log::warn!("worker {worker_id} failed on unit {unit_id}: {message}, retrying once");
            if !pool.worker(worker_id).map(|w| w.is_alive()).unwrap_or(false) {
                let _ = pool.respawn(worker_id);
            }
            Self::dispatch_to(pool, worker_id, held.unit, 1, task, in_flight)
        }
    }

    fn failed(unit_id: usize, worker_id: usize, message: String) -> UnitResult {
        UnitResult { unit_id, status: UnitStatus::Failed, segments: Vec::new(), error: Some(message), worker_id, elapsed_s: 0.0 }
    }

    /// Bypasses `WorkerPool` entirely, driving one in-process engine. Shares
    /// `transcribe_unit` with the parallel path so both produce identical
    /// per-unit behaviour. There is no pool to respawn from here, so any
    /// error, including a device exhaustion, aborts the session outright.
    pub fn run_single(
        units: Vec<WorkUnit>,
        engine: &mut dyn InferenceEngine,
        task: Task,
        workdir: &std::path::Path,
    ) -> Result<Vec<TextSegment>> {
        let mut all = Vec::new();
        for unit in units {
            let segments = transcribe_unit(engine, &unit, task, workdir, 0)?;
            all.extend(segments);
        }
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{ExhaustingEngine, ModelKey, StubEngine};
    use crate::partition::AudioSlice;
    use crate::vad::SpeechRegion;
    use crate::worker::WorkerPool;
    use tempfile::TempDir;

    fn unit(id: usize, start_s: f64, end_s: f64) -> WorkUnit {
        let n = ((end_s - start_s) * 16_000.0) as usize;
        WorkUnit { unit_id: id, region: SpeechRegion::new(start_s, end_s), audio: AudioSlice::Owned(vec![0.3; n]) }
    }

    #[test]
    fn time_rebase_is_the_correctness_pivot() {
        let dir = TempDir::new().unwrap();
        let mut engine = StubEngine::new();
        let units = vec![unit(0, 30.0, 31.0)];
        let segments = Scheduler::run_single(units, &mut engine, Task::Transcribe, dir.path()).unwrap();
        assert_eq!(segments.len(), 1);
        assert!((segments[0].start_s - 30.0).abs() < 1e-9);
    }

    #[test]
    fn parallel_dispatch_preserves_unit_order() {
        let dir = TempDir::new().unwrap();
        let model_key = ModelKey::new("base", crate::config::Precision::Float32);
        let mut pool = WorkerPool::new(
            &[0, 1],
            model_key,
            dir.path().to_path_buf(),
            Box::new(|_| Ok(Box::new(StubEngine::new()) as Box<dyn InferenceEngine>)),
        )
        .unwrap();

        let units = vec![unit(0, 0.0, 1.0), unit(1, 5.0, 6.0), unit(2, 10.0, 11.0), unit(3, 15.0, 16.0)];
        let segments = Scheduler::run(units, &mut pool, Task::Transcribe).unwrap();

        assert_eq!(segments.len(), 4);
        for pair in segments.windows(2) {
            assert!(pair[0].start_s < pair[1].start_s);
        }
    }

    #[test]
    fn more_units_than_workers_keep_every_worker_busy() {
        // with dynamic any-ready-worker dispatch, 8 units across 2 workers
        // should all complete without one worker draining the other's
        // entire backlog serially first.
        let dir = TempDir::new().unwrap();
        let model_key = ModelKey::new("base", crate::config::Precision::Float32);
        let mut pool = WorkerPool::new(
            &[0, 1],
            model_key,
            dir.path().to_path_buf(),
            Box::new(|_| Ok(Box::new(StubEngine::new()) as Box<dyn InferenceEngine>)),
        )
        .unwrap();

        let units: Vec<WorkUnit> = (0..8).map(|i| unit(i, i as f64 * 2.0, i as f64 * 2.0 + 1.0)).collect();
        let segments = Scheduler::run(units, &mut pool, Task::Transcribe).unwrap();

        assert_eq!(segments.len(), 8);
        for pair in segments.windows(2) {
            assert!(pair[0].start_s < pair[1].start_s);
        }
    }

    #[test]
    fn worker_crash_is_recovered_by_one_respawn() {
        use crate::engine::FlakyEngine;
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc;

        let dir = TempDir::new().unwrap();
        let model_key = ModelKey::new("base", crate::config::Precision::Float32);
        let built = Arc::new(AtomicUsize::new(0));
        let built_for_factory = Arc::clone(&built);

        // worker 0's very first engine panics once; every engine built after
        // that (the respawn, and worker 1's engine) behaves normally.
        let mut pool = WorkerPool::new(
            &[0, 1],
            model_key,
            dir.path().to_path_buf(),
            Box::new(move |_device_id| {
                let n = built_for_factory.fetch_add(1, Ordering::SeqCst);
                if n == 0 {
                    Ok(Box::new(FlakyEngine::new()) as Box<dyn InferenceEngine>)
                } else {
                    Ok(Box::new(StubEngine::new()) as Box<dyn InferenceEngine>)
                }
            }),
        )
        .unwrap();

        // worker 0 is the first ready worker and takes the first pending
        // unit; its crash and respawn both happen within this run while
        // worker 1 independently processes the other unit.
        let units = vec![unit(0, 0.0, 1.0), unit(2, 2.0, 3.0)];
        let segments = Scheduler::run(units, &mut pool, Task::Transcribe).unwrap();

        assert_eq!(segments.len(), 2);
        assert!(built.load(Ordering::SeqCst) >= 2, "the flaky worker should have been respawned at least once");
    }

    #[test]
    fn device_exhaustion_marks_worker_dead_and_retries_once() {
        let dir = TempDir::new().unwrap();
        let model_key = ModelKey::new("base", crate::config::Precision::Float32);
        // exhausts exactly once across the whole session (counter shared
        // through respawns), then succeeds — the single retry after
        // respawn should recover the unit.
        let template = ExhaustingEngine::new(1);
        let mut pool = WorkerPool::new(
            &[0],
            model_key,
            dir.path().to_path_buf(),
            Box::new(move |_| Ok(Box::new(template.sharing()) as Box<dyn InferenceEngine>)),
        )
        .unwrap();

        let units = vec![unit(0, 0.0, 1.0)];
        let segments = Scheduler::run(units, &mut pool, Task::Transcribe).unwrap();
        assert_eq!(segments.len(), 1);
        assert_eq!(pool.state(0).unwrap().state, crate::worker::WorkerLifecycle::Ready);
    }

    #[test]
    fn two_consecutive_device_exhaustions_abort_the_session() {
        let dir = TempDir::new().unwrap();
        let model_key = ModelKey::new("base", crate::config::Precision::Float32);
        // exhausts on every call: the first attempt and the retry after
        // respawn both exhaust, so the session aborts.
        let template = ExhaustingEngine::new(u32::MAX);
        let mut pool = WorkerPool::new(
            &[0],
            model_key,
            dir.path().to_path_buf(),
            Box::new(move |_| Ok(Box::new(template.sharing()) as Box<dyn InferenceEngine>)),
        )
        .unwrap();

        let units = vec![unit(0, 0.0, 1.0)];
        let result = Scheduler::run(units, &mut pool, Task::Transcribe);
        assert!(matches!(result, Err(SubforgeError::DeviceExhaustion { .. })));
    }

    #[test]
    fn empty_units_yield_empty_output() {
        let dir = TempDir::new().unwrap();
        let model_key = ModelKey::new("base", crate::config::Precision::Float32);
        let mut pool = WorkerPool::new(
            &[0],
            model_key,
            dir.path().to_path_buf(),
            Box::new(|_| Ok(Box::new(StubEngine::new()) as Box<dyn InferenceEngine>)),
        )
        .unwrap();

        let segments = Scheduler::run(Vec::new(), &mut pool, Task::Transcribe).unwrap();
        assert!(segments.is_empty());
    }
}
