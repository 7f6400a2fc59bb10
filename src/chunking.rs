//! Chunk planning from file size and media duration

use crate::{Result, TranscribeError};
use serde::{Deserialize, Serialize};

/// A contiguous span of the source media, in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeRange {
    /// Offset from the start of the media
    pub start: f64,
    /// Span length
    pub length: f64,
}

impl TimeRange {
    pub fn new(start: f64, length: f64) -> Self {
        Self { start, length }
    }

    pub fn end(&self) -> f64 {
        self.start + self.length
    }
}

/// Ordered, gap-free split of `[0, duration)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPlan {
    ranges: Vec<TimeRange>,
    total_duration: f64,
}

impl ChunkPlan {
    /// Ranges in ascending start order
    pub fn ranges(&self) -> &[TimeRange] {
        &self.ranges
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TimeRange> {
        self.ranges.iter()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    /// Nominal length shared by every chunk
    pub fn chunk_length(&self) -> f64 {
        self.ranges.first().map(|r| r.length).unwrap_or(0.0)
    }
}

impl<'a> IntoIterator for &'a ChunkPlan {
    type Item = &'a TimeRange;
    type IntoIter = std::slice::Iter<'a, TimeRange>;

    fn into_iter(self) -> Self::IntoIter {
        self.ranges.iter()
    }
}

/// Whether a file of `total_size` bytes must be split to fit under `threshold`
pub fn requires_split(total_size: u64, threshold: u64) -> Result<bool> {
    if threshold == 0 {
        return Err(TranscribeError::InvalidInput(
            "size threshold must be greater than 0 bytes".to_string(),
        ));
    }
    Ok(total_size > threshold)
}

/// Number of chunks needed, assuming a roughly constant bitrate
pub fn chunk_count(total_size: u64, threshold: u64) -> Result<usize> {
    requires_split(total_size, threshold)?;
    Ok(total_size.div_ceil(threshold).max(1) as usize)
}

/// Plan the time ranges for a file.
///
/// Returns `Ok(None)` when the file already fits under the threshold.
/// Otherwise yields `ceil(total_size / threshold)` contiguous ranges of equal
/// nominal length; the last range is clamped so it ends exactly at `duration`.
pub fn plan(total_size: u64, threshold: u64, duration: f64) -> Result<Option<ChunkPlan>> {
    if !requires_split(total_size, threshold)? {
        validate_duration(duration)?;
        return Ok(None);
    }
    validate_duration(duration)?;

    let count = chunk_count(total_size, threshold)?;
    let chunk_len = duration / count as f64;

    let ranges = (0..count)
        .map(|i| {
            let start = i as f64 * chunk_len;
            let length = if i + 1 == count {
                duration - start
            } else {
                chunk_len
            };
            TimeRange::new(start, length)
        })
        .collect();

    Ok(Some(ChunkPlan {
        ranges,
        total_duration: duration,
    }))
}

fn validate_duration(duration: f64) -> Result<()> {
    if !duration.is_finite() || duration <= 0.0 {
        return Err(TranscribeError::InvalidInput(format!(
            "media duration must be a positive number of seconds, got {}",
            duration
        )));
    }
    Ok(())
}
