//! Media download facade. Network access is opt-in via the `download`
//! feature; the core pipeline never requires it.

use crate::error::{Result, SubforgeError};
use std::path::{Path, PathBuf};

/// Fetches a remote media file into `dest_dir`, returning its local path and
/// a best-effort title.
pub trait MediaDownloader: Send + Sync {
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<(PathBuf, String)>;
}

/// Always errors. Used when the `download` feature is disabled, so
/// `AudioSource::Url` fails loudly instead of silently doing nothing.
pub struct NullDownloader;

impl MediaDownloader for NullDownloader {
    fn fetch(&self, url: &str, _dest_dir: &Path) -> Result<(PathBuf, String)> {
        Err(SubforgeError::Fetch { url: url.to_string(), message: "downloads are disabled in this build".into() })
    }
}

#[cfg(feature = "download")]
pub struct HttpDownloader {
    client: reqwest::blocking::Client,
}

#[cfg(feature = "download")]
impl HttpDownloader {
    pub fn new() -> Self {
        Self { client: reqwest::blocking::Client::new() }
    }
}

#[cfg(feature = "download")]
impl Default for HttpDownloader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "download")]
impl MediaDownloader for HttpDownloader {
    fn fetch(&self, url: &str, dest_dir: &Path) -> Result<(PathBuf, String)> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| SubforgeError::Fetch { url: url.to_string(), message: e.to_string() })?;

        if !response.status().is_success() {
            return Err(SubforgeError::Fetch { url: url.to_string(), message: format!("HTTP {}", response.status()) });
        }

        let file_name = url.rsplit('/').next().filter(|s| !s.is_empty()).unwrap_or("download.bin");
        let dest = dest_dir.join(file_name);

        let bytes = response.bytes().map_err(|e| SubforgeError::Fetch { url: url.to_string(), message: e.to_string() })?;
        std::fs::write(&dest, &bytes)?;

        Ok((dest, file_name.to_string()))
    }
}
