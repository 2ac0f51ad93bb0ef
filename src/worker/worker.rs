//! One OS thread owning one inference engine instance, exclusively bound to
//! one device for its whole lifetime.

use crate::audio::wav;
use crate::engine::{InferenceEngine, Task as EngineTask, TextSegment};
use crate::error::{Result, SubforgeError};
use crate::partition::WorkUnit;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use uuid::Uuid;

const SKIP_DURATION_S: f64 = 0.1;

pub enum WorkerMessage {
    Transcribe(WorkUnit, EngineTask),
    Stop,
}

/// A failed unit distinguishes a device-exhaustion (worker marked dead,
/// respawned, unit retried) from an ordinary transcription failure (unit
/// retried on the same worker if it's still alive).
pub enum WorkerFailure {
    Transcription(String),
    DeviceExhaustion(String),
}

pub struct WorkerOutput {
    pub unit_id: usize,
    pub segments: std::result::Result<Vec<TextSegment>, WorkerFailure>,
    pub elapsed_s: f64,
}

/// What polling a worker's output channel without blocking can observe.
pub enum WorkerPoll {
    Pending,
    Output(WorkerOutput),
    /// The worker's thread ended (panic or otherwise) without sending a
    /// result for the unit it was given.
    Disconnected,
}

pub struct Worker {
    pub worker_id: usize,
    pub device_id: u32,
    tx: Sender<WorkerMessage>,
    rx: Receiver<WorkerOutput>,
    handle: Option<JoinHandle<()>>,
}

/// Deletes a unit's temp WAV file on drop, even on an error return.
struct TempUnitFile(PathBuf);

impl Drop for TempUnitFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

impl Worker {
    pub fn spawn(
        worker_id: usize,
        device_id: u32,
        workdir: PathBuf,
        mut engine: Box<dyn InferenceEngine>,
    ) -> Result<Self> {
        let (tx, task_rx) = channel::<WorkerMessage>();
        let (out_tx, rx) = channel::<WorkerOutput>();

        engine.warm_up().map_err(|e| SubforgeError::WorkerSpawn { worker_id, message: e.to_string() })?;

        let handle = thread::spawn(move || {
            while let Ok(msg) = task_rx.recv() {
                match msg {
                    WorkerMessage::Stop => break,
                    WorkerMessage::Transcribe(unit, task) => {
                        let start = Instant::now();
                        let unit_id = unit.unit_id;
                        let result = transcribe_unit(engine.as_mut(), &unit, task, &workdir, worker_id);
                        let segments = match result {
                            Ok(segments) => Ok(segments),
                            Err(SubforgeError::DeviceExhaustion { message, .. }) => Err(WorkerFailure::DeviceExhaustion(message)),
                            Err(other) => Err(WorkerFailure::Transcription(other.to_string())),
                        };
                        let _ = out_tx.send(WorkerOutput { unit_id, segments, elapsed_s: start.elapsed().as_secs_f64() });
                    }
                }
            }
        });

        Ok(Self { worker_id, device_id, tx, rx, handle: Some(handle) })
    }

    pub fn dispatch(&self, unit: WorkUnit, task: EngineTask) -> Result<()> {
        self.tx
            .send(WorkerMessage::Transcribe(unit, task))
            .map_err(|_| SubforgeError::WorkerSpawn { worker_id: self.worker_id, message: "worker thread gone".into() })
    }

    /// Non-blocking poll of this worker's result channel, so the scheduler
    /// can drive many workers concurrently instead of waiting on one at a
    /// time.
    pub fn poll(&self) -> WorkerPoll {
        match self.rx.try_recv() {
            Ok(output) => WorkerPoll::Output(output),
            Err(TryRecvError::Empty) => WorkerPoll::Pending,
            Err(TryRecvError::Disconnected) => WorkerPoll::Disconnected,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    pub fn stop_and_join(mut self) {
        let _ = self.tx.send(WorkerMessage::Stop);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// Shared by both the parallel worker thread and `Scheduler::run_single`'s
/// in-process path, so single-worker and multi-worker sessions produce
/// identical per-unit behaviour.
pub fn transcribe_unit(
    engine: &mut dyn InferenceEngine,
    unit: &WorkUnit,
    task: EngineTask,
    workdir: &std::path::Path,
    worker_id: usize,
) -> Result<Vec<TextSegment>> {
    if unit.region.duration_s() < SKIP_DURATION_S {
        return Ok(Vec::new());
    }

    let samples = unit.audio.samples();
    let temp_path = workdir.join(format!("unit-{}-{}.wav", unit.unit_id, Uuid::new_v4()));
    wav::write_wav(&temp_path, samples, 16_000)?;
    let _guard = TempUnitFile(temp_path);

    // the engine doesn't know its own worker_id; it signals exhaustion with
    // a placeholder that gets replaced with the real one here.
    let segments = engine.transcribe(samples, task).map_err(|e| match e {
        SubforgeError::DeviceExhaustion { message, .. } => SubforgeError::DeviceExhaustion { worker_id, message },
        other => SubforgeError::UnitTranscription { unit_id: unit.unit_id, message: other.to_string() },
    })?;

    Ok(segments
        .into_iter()
        .map(|s| TextSegment {
            start_s: s.start_s + unit.region.start_s,
            end_s: s.end_s + unit.region.start_s,
            text: s.text,
        })
        .collect())
}
