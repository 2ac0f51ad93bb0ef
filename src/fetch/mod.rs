//! Optional media download facade (behind the `download` feature).

pub mod downloader;

pub use downloader::MediaDownloader;
#[cfg(feature = "download")]
pub use downloader::HttpDownloader;
pub use downloader::NullDownloader;
