use crate::engine::TextSegment;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitStatus {
    Ok,
    Skipped,
    Failed,
}

#[derive(Debug, Clone)]
pub struct UnitResult {
    pub unit_id: usize,
    pub status: UnitStatus,
    pub segments: Vec<TextSegment>,
    pub error: Option<String>,
    pub worker_id: usize,
    pub elapsed_s: f64,
}
