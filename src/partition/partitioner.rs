//! Turns speech regions into worker-sized dispatch units.

use crate::audio::AudioBuffer;
use crate::error::Result;
use crate::vad::facade::{EnergyVad, VoiceActivityDetector};
use crate::vad::types::{validate_ordered, SpeechRegion};

const MIN_REGION_S: f64 = 0.5;
const INTERNAL_SPLIT_THRESHOLD: f32 = 0.04;
const INTERNAL_SPLIT_MIN_SILENCE_MS: u32 = 150;

#[derive(Debug, Clone)]
pub enum AudioSlice {
    Owned(Vec<f32>),
}

impl AudioSlice {
    pub fn samples(&self) -> &[f32] {
        match self {
            AudioSlice::Owned(v) => v,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub unit_id: usize,
    pub region: SpeechRegion,
    pub audio: AudioSlice,
}

pub struct WorkPartitioner;

impl WorkPartitioner {
    /// Three-step partitioning: drop sub-0.5s regions, greedily concatenate
    /// up to `max_unit_s`, and split an oversize single region at internal
    /// silences when present (else tolerate it whole). `min_unit_s` governs
    /// `debug_assert_invariants`'s non-trailing-unit check; units below it
    /// are otherwise accepted rather than forced to merge across a silent
    /// gap, which would break the union-of-input-regions invariant.
    pub fn partition(
        audio: &AudioBuffer,
        regions: &[SpeechRegion],
        _worker_count: usize,
        min_unit_s: f64,
        max_unit_s: f64,
    ) -> Result<Vec<WorkUnit>> {
        validate_ordered(regions)?;

        let kept: Vec<SpeechRegion> = regions.iter().copied().filter(|r| r.duration_s() >= MIN_REGION_S).collect();
        if kept.is_empty() {
            return Ok(Vec::new());
        }

        let mut merged_regions: Vec<SpeechRegion> = Vec::new();
        let mut current: Option<SpeechRegion> = None;

        for region in &kept {
            let region = if region.duration_s() > max_unit_s {
                flush(&mut current, &mut merged_regions);
                for split in split_oversize(audio, *region, max_unit_s) {
                    merged_regions.push(split);
                }
                continue;
            } else {
                *region
            };

            match current {
                None => current = Some(region),
                Some(acc) => {
                    if region.end_s - acc.start_s <= max_unit_s {
                        current = Some(SpeechRegion::new(acc.start_s, region.end_s));
                    } else {
                        merged_regions.push(acc);
                        current = Some(region);
                    }
                }
            }
        }
        flush(&mut current, &mut merged_regions);

        merged_regions.sort_by(|a, b| a.start_s.partial_cmp(&b.start_s).unwrap());

        let units: Vec<WorkUnit> = merged_regions
            .into_iter()
            .enumerate()
            .map(|(unit_id, region)| WorkUnit {
                unit_id,
                audio: AudioSlice::Owned(audio.slice_s(region.start_s, region.end_s)),
                region,
            })
            .collect();

        debug_assert_invariants(&units, min_unit_s);

        Ok(units)
    }
}

fn flush(current: &mut Option<SpeechRegion>, out: &mut Vec<SpeechRegion>) {
    if let Some(region) = current.take() {
        out.push(region);
    }
}

/// Split an oversize region at internal silences detected with a stricter
/// energy threshold; when no internal silence is found the region is
/// tolerated whole (a single unit larger than `max_unit_s`).
fn split_oversize(audio: &AudioBuffer, region: SpeechRegion, max_unit_s: f64) -> Vec<SpeechRegion> {
    let samples = audio.slice_s(region.start_s, region.end_s);
    let mut vad = EnergyVad;
    let internal = vad
        .detect(&samples, INTERNAL_SPLIT_THRESHOLD, INTERNAL_SPLIT_MIN_SILENCE_MS)
        .unwrap_or_default();

    if internal.len() <= 1 {
        return vec![region];
    }

    let mut splits = Vec::new();
    for sub in internal {
        let abs = SpeechRegion::new(region.start_s + sub.start_s, region.start_s + sub.end_s);
        if abs.duration_s() <= max_unit_s {
            splits.push(abs);
        } else {
            splits.extend(split_oversize(audio, abs, max_unit_s));
        }
    }

    if splits.is_empty() {
        vec![region]
    } else {
        splits
    }
}

fn debug_assert_invariants(units: &[WorkUnit], min_unit_s: f64) {
    for (i, unit) in units.iter().enumerate() {
        debug_assert_eq!(unit.unit_id, i, "unit ids must be dense and ordered");
    }
    for pair in units.windows(2) {
        debug_assert!(pair[1].region.start_s >= pair[0].region.end_s, "units must not overlap");
        debug_assert!(pair[1].region.start_s >= pair[0].region.start_s, "units must be sorted");
    }
    for unit in units.iter().take(units.len().saturating_sub(1)) {
        debug_assert!(unit.region.duration_s() >= min_unit_s || units.len() == 1, "non-trailing unit below min_unit_s");
    }
}
