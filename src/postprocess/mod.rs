//! Subtitle merging and optional script conversion, applied after
//! reassembly and before rendering.

pub mod merge;
pub mod script;

pub use merge::merge_adjacent;
pub use script::{IdentityConverter, ScriptConverter};
