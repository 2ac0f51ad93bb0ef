//! A single request's on-disk workspace. Created by `SessionManager::open`,
//! removed recursively when dropped.

use std::path::{Path, PathBuf};
use std::time::Instant;
use uuid::Uuid;

/// Owns a `sessions_root/<uuid>/` directory for the lifetime of one request.
/// Recursively removed on drop; a removal failure is logged, never
/// propagated, since by the time `Drop` runs there is nowhere left to
/// report an error to.
pub struct Session {
    pub session_id: Uuid,
    pub workdir: PathBuf,
    pub started_at: Instant,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
}

impl Session {
    pub(crate) fn new(session_id: Uuid, workdir: PathBuf) -> Self {
        Self { session_id, workdir, started_at: Instant::now(), inputs: Vec::new(), outputs: Vec::new() }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn elapsed_s(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    pub fn register_output(&mut self, path: PathBuf) {
        self.outputs.push(path);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_dir_all(&self.workdir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!("failed to clean up session {} workdir {:?}: {e}", self.session_id, self.workdir);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_removes_workdir() {
        let root = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let workdir = root.path().join(id.to_string());
        std::fs::create_dir_all(&workdir).unwrap();
        std::fs::write(workdir.join("marker"), b"x").unwrap();

        {
            let _session = Session::new(id, workdir.clone());
            assert!(workdir.exists());
        }

        assert!(!workdir.exists());
    }

    #[test]
    fn drop_on_already_missing_workdir_does_not_panic() {
        let root = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let workdir = root.path().join(id.to_string());
        let session = Session::new(id, workdir);
        drop(session);
    }
}
