//! The raw inference engine is an out-of-scope external collaborator (a
//! speech-to-text model); this trait is the contract a worker drives it
//! through, with `StubEngine` as a real, testable default.

use crate::error::Result;

#[derive(Debug, Clone, PartialEq)]
pub struct TextSegment {
    pub start_s: f64,
    pub end_s: f64,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Language {
    Auto,
    Code(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    Transcribe,
    Translate,
}

/// One loaded model instance, bound to a single device for its whole
/// lifetime. Never shared across threads — each worker owns exactly one.
pub trait InferenceEngine: Send {
    /// One-time warm-up: load weights, run a dummy inference. Called once
    /// per worker before it accepts units.
    fn warm_up(&mut self) -> Result<()>;

    /// Transcribe mono 16 kHz `samples`, returning segments with timestamps
    /// relative to the start of `samples` (the caller rebases them).
    fn transcribe(&mut self, samples: &[f32], task: Task) -> Result<Vec<TextSegment>>;
}

/// Deterministic stand-in for a real model: splits its input into
/// fixed-length windows and emits one segment per window, labelled with the
/// sample count. Exercisable by tests without a real backend.
pub struct StubEngine {
    warmed_up: bool,
}

impl StubEngine {
    pub fn new() -> Self {
        Self { warmed_up: false }
    }
}

impl Default for StubEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceEngine for StubEngine {
    fn warm_up(&mut self) -> Result<()> {
        self.warmed_up = true;
        Ok(())
    }

    fn transcribe(&mut self, samples: &[f32], task: Task) -> Result<Vec<TextSegment>> {
        if samples.len() < 160 {
            return Ok(Vec::new());
        }

        let sample_rate = 16_000.0_f64;
        let duration_s = samples.len() as f64 / sample_rate;
        let label = match task {
            Task::Transcribe => "stub",
            Task::Translate => "stub-translated",
        };

        Ok(vec![TextSegment {
            start_s: 0.0,
            end_s: duration_s,
            text: format!("[{label}: {} samples]", samples.len()),
        }])
    }
}

/// An engine that panics on its first call, used to exercise
/// `WorkerPool`'s respawn-once path.
#[cfg(test)]
pub struct FlakyEngine {
    calls: u32,
}

#[cfg(test)]
impl FlakyEngine {
    pub fn new() -> Self {
        Self { calls: 0 }
    }
}

#[cfg(test)]
impl InferenceEngine for FlakyEngine {
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    fn transcribe(&mut self, samples: &[f32], task: Task) -> Result<Vec<TextSegment>> {
        self.calls += 1;
        if self.calls == 1 {
            panic!("simulated device failure");
        }
        StubEngine::new().transcribe(samples, task)
    }
}

/// An engine that reports `DeviceExhaustion` on its first `exhaust_calls`
/// calls, then behaves like `StubEngine`. Used to exercise the
/// mark-dead/respawn/retry and the two-consecutive-exhaustions-abort paths.
/// The exhaustion count is shared via `Arc` across every instance a
/// `WorkerPool` factory builds, so a respawned engine continues counting
/// from where the crashed one left off instead of starting over.
#[cfg(test)]
pub struct ExhaustingEngine {
    exhaust_calls: u32,
    calls: std::sync::Arc<std::sync::atomic::AtomicU32>,
}

#[cfg(test)]
impl ExhaustingEngine {
    pub fn new(exhaust_calls: u32) -> Self {
        Self { exhaust_calls, calls: std::sync::Arc::new(std::sync::atomic::AtomicU32::new(0)) }
    }

    /// Shares this engine's call counter with another instance, so a
    /// factory can hand out respawned engines that keep counting from the
    /// same place.
    pub fn sharing(&self) -> Self {
        Self { exhaust_calls: self.exhaust_calls, calls: std::sync::Arc::clone(&self.calls) }
    }
}

#[cfg(test)]
impl InferenceEngine for ExhaustingEngine {
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }

    fn transcribe(&mut self, samples: &[f32], task: Task) -> Result<Vec<TextSegment>> {
        let n = self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
        if n <= self.exhaust_calls {
            // worker_id is unknown to the engine; the worker layer fills in
            // the real one before this reaches the scheduler.
            return Err(crate::error::SubforgeError::DeviceExhaustion { worker_id: 0, message: "simulated OOM".into() });
        }
        StubEngine::new().transcribe(samples, task)
    }
}
