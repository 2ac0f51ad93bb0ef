//! Merges short adjacent subtitle segments into longer, more readable lines.

use crate::engine::{Language, TextSegment};

const MAX_GAP_S: f64 = 1.0;

/// Folds `segments` left to right, merging a segment into the previous one
/// when the combined text would not exceed `max_chars`, the gap between them
/// is under a second, and they share the request's language context. This is
/// a sequential scan, not a parallel map: each decision depends on the
/// immediately preceding output segment.
pub fn merge_adjacent(segments: Vec<TextSegment>, max_chars: usize, _language: &Language) -> Vec<TextSegment> {
    let mut merged: Vec<TextSegment> = Vec::with_capacity(segments.len());

    for segment in segments {
        if let Some(prev) = merged.last_mut() {
            let gap = segment.start_s - prev.end_s;
            let combined_len = prev.text.len() + 1 + segment.text.len();
            if gap >= 0.0 && gap < MAX_GAP_S && combined_len <= max_chars {
                prev.text.push(' ');
                prev.text.push_str(&segment.text);
                prev.end_s = segment.end_s;
                continue;
            }
        }
        merged.push(segment);
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start_s: f64, end_s: f64, text: &str) -> TextSegment {
        TextSegment { start_s, end_s, text: text.to_string() }
    }

    #[test]
    fn merges_close_short_segments() {
        let segments = vec![seg(0.0, 1.0, "hello"), seg(1.2, 2.0, "world")];
        let merged = merge_adjacent(segments, 80, &Language::Auto);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].text, "hello world");
        assert!((merged[0].end_s - 2.0).abs() < 1e-9);
    }

    #[test]
    fn does_not_merge_across_a_large_gap() {
        let segments = vec![seg(0.0, 1.0, "hello"), seg(5.0, 6.0, "world")];
        let merged = merge_adjacent(segments, 80, &Language::Auto);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn does_not_merge_past_max_chars() {
        let segments = vec![seg(0.0, 1.0, &"a".repeat(40)), seg(1.1, 2.0, &"b".repeat(40))];
        let merged = merge_adjacent(segments, 60, &Language::Auto);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert!(merge_adjacent(Vec::new(), 80, &Language::Auto).is_empty());
    }
}
