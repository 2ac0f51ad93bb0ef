//! SRT subtitle rendering and parsing.

pub mod srt;
