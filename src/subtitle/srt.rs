//! The exact SRT byte format: 1-based monotonic record index, `HH:MM:SS,mmm`
//! timestamps, a `-->` separator with one space on each side, one blank line
//! between records, and a final trailing newline.

use crate::engine::TextSegment;
use crate::error::{Result, SubforgeError};

pub fn render(segments: &[TextSegment]) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().enumerate() {
        out.push_str(&(i + 1).to_string());
        out.push('\n');
        out.push_str(&format_timestamp(segment.start_s));
        out.push_str(" --> ");
        out.push_str(&format_timestamp(segment.end_s));
        out.push('\n');
        out.push_str(&segment.text);
        out.push('\n');
        out.push('\n');
    }
    out
}

pub fn parse(text: &str) -> Result<Vec<TextSegment>> {
    let mut segments = Vec::new();
    let mut lines = text.lines().peekable();

    while lines.peek().is_some() {
        while matches!(lines.peek(), Some(l) if l.trim().is_empty()) {
            lines.next();
        }
        let Some(index_line) = lines.next() else { break };
        if index_line.trim().is_empty() {
            continue;
        }
        index_line
            .trim()
            .parse::<u64>()
            .map_err(|_| SubforgeError::processing(format!("malformed SRT record index: {index_line:?}")))?;

        let timing_line = lines
            .next()
            .ok_or_else(|| SubforgeError::processing("SRT record missing timing line"))?;
        let (start_s, end_s) = parse_timing_line(timing_line)?;

        let mut text_lines = Vec::new();
        while matches!(lines.peek(), Some(l) if !l.trim().is_empty()) {
            text_lines.push(lines.next().unwrap());
        }

        segments.push(TextSegment { start_s, end_s, text: text_lines.join("\n") });
    }

    Ok(segments)
}

fn parse_timing_line(line: &str) -> Result<(f64, f64)> {
    let (start, end) = line
        .split_once(" --> ")
        .ok_or_else(|| SubforgeError::processing(format!("malformed SRT timing line: {line:?}")))?;
    Ok((parse_timestamp(start)?, parse_timestamp(end)?))
}

fn format_timestamp(total_s: f64) -> String {
    let total_ms = (total_s * 1000.0).round().max(0.0) as u64;
    let ms = total_ms % 1000;
    let total_s = total_ms / 1000;
    let s = total_s % 60;
    let total_m = total_s / 60;
    let m = total_m % 60;
    let h = total_m / 60;
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

fn parse_timestamp(raw: &str) -> Result<f64> {
    let raw = raw.trim();
    let (hms, ms) = raw
        .split_once(',')
        .ok_or_else(|| SubforgeError::processing(format!("malformed SRT timestamp: {raw:?}")))?;
    let mut parts = hms.split(':');
    let (h, m, s) = (parts.next(), parts.next(), parts.next());
    let (h, m, s, ms) = match (h, m, s) {
        (Some(h), Some(m), Some(s)) => (
            h.parse::<u64>().map_err(|_| SubforgeError::processing(format!("bad hours in {raw:?}")))?,
            m.parse::<u64>().map_err(|_| SubforgeError::processing(format!("bad minutes in {raw:?}")))?,
            s.parse::<u64>().map_err(|_| SubforgeError::processing(format!("bad seconds in {raw:?}")))?,
            ms.parse::<u64>().map_err(|_| SubforgeError::processing(format!("bad milliseconds in {raw:?}")))?,
        ),
        _ => return Err(SubforgeError::processing(format!("malformed SRT timestamp: {raw:?}"))),
    };
    Ok((h * 3600 + m * 60 + s) as f64 + ms as f64 / 1000.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(start_s: f64, end_s: f64, text: &str) -> TextSegment {
        TextSegment { start_s, end_s, text: text.to_string() }
    }

    #[test]
    fn renders_the_exact_example_format() {
        let rendered = render(&[seg(0.0, 2.5, "Hello world.")]);
        assert_eq!(rendered, "1\n00:00:00,000 --> 00:00:02,500\nHello world.\n\n");
    }

    #[test]
    fn empty_segments_render_to_empty_string() {
        assert_eq!(render(&[]), "");
    }

    #[test]
    fn parse_of_render_round_trips() {
        let segments = vec![seg(0.0, 2.5, "Hello world."), seg(3.0, 4.25, "Second line.")];
        let rendered = render(&segments);
        let parsed = parse(&rendered).unwrap();
        assert_eq!(parsed, segments);
    }

    #[test]
    fn rejects_malformed_timing_line() {
        let bad = "1\nnot a timestamp\ntext\n\n";
        assert!(parse(bad).is_err());
    }
}
