//! Allocates and reclaims per-request session workspaces.

use crate::config::Config;
use crate::error::Result;
use crate::session::session::Session;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

const DEFAULT_MAX_AGE: Duration = Duration::from_secs(24 * 3600);
/// Minimum gap between filesystem sweeps so a burst of requests doesn't walk
/// `sessions/`, `downloads/`, and `outputs/` on every single `open`.
const SWEEP_INTERVAL: Duration = Duration::from_secs(300);

pub struct SessionManager {
    sessions_root: PathBuf,
    downloads_root: PathBuf,
    outputs_root: PathBuf,
    max_age: Duration,
    last_sweep_epoch_s: AtomicU64,
}

impl SessionManager {
    pub fn new(sessions_root: PathBuf, downloads_root: PathBuf, outputs_root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&sessions_root)?;
        std::fs::create_dir_all(&downloads_root)?;
        std::fs::create_dir_all(&outputs_root)?;
        Ok(Self {
            sessions_root,
            downloads_root,
            outputs_root,
            max_age: DEFAULT_MAX_AGE,
            last_sweep_epoch_s: AtomicU64::new(0),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.sessions_root(), config.downloads_root(), config.outputs_root())
    }

    /// Creates `sessions_root/<uuid>/`, optionally copying `input` in under
    /// `<uuid>-<original-filename>` so two sessions can never collide on the
    /// same destination name.
    pub fn open(&self, input: Option<&Path>) -> Result<Session> {
        self.maybe_sweep();

        let session_id = Uuid::new_v4();
        let workdir = self.sessions_root.join(session_id.to_string());
        std::fs::create_dir_all(&workdir)?;

        let mut session = Session::new(session_id, workdir.clone());
        if let Some(src) = input {
            let file_name = src.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "input".to_string());
            let dest = workdir.join(format!("{session_id}-{file_name}"));
            std::fs::copy(src, &dest)?;
            session.inputs.push(dest);
        }

        Ok(session)
    }

    fn maybe_sweep(&self) {
        let now = epoch_secs();
        let last = self.last_sweep_epoch_s.load(Ordering::Relaxed);
        if now.saturating_sub(last) < SWEEP_INTERVAL.as_secs() {
            return;
        }
        if self.last_sweep_epoch_s.compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed).is_ok() {
            if let Err(e) = self.sweep(self.max_age) {
                log::warn!("session sweep failed: {e}");
            }
        }
    }

    /// Removes entries older than `max_age` from `sessions/`, `downloads/`,
    /// and `outputs/`. Callable directly (e.g. from a maintenance task) in
    /// addition to the throttled call made by `open`.
    pub fn sweep(&self, max_age: Duration) -> Result<()> {
        for root in [&self.sessions_root, &self.downloads_root, &self.outputs_root] {
            sweep_dir(root, max_age)?;
        }
        Ok(())
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

fn sweep_dir(root: &Path, max_age: Duration) -> Result<()> {
    let entries = match std::fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e.into()),
    };

    let now = SystemTime::now();
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let metadata = entry.metadata()?;
        let modified = metadata.modified().unwrap_or(now);
        let age = now.duration_since(modified).unwrap_or_default();
        if age <= max_age {
            continue;
        }

        let removed = if metadata.is_dir() { std::fs::remove_dir_all(&path) } else { std::fs::remove_file(&path) };
        if let Err(e) = removed {
            log::warn!("sweep: failed to remove {path:?}: {e}");
        }
    }
    Ok(())
}
