//! # Short-gap linear interpolation
//!
//! First stage of the repair pipeline. Every `(body_part, axis)` channel is scanned for
//! **gaps** (maximal runs of consecutive `NaN`) and each gap that is
//!
//! * no longer than `max_gap_length` frames, and
//! * bounded by a valid sample on **both** sides,
//!
//! is replaced by the straight line joining those two samples. Longer gaps and gaps touching
//! either end of the track stay missing as a whole: a run is never partially filled and never
//! extrapolated from one side.
//!
//! The operation is deterministic, `O(frames × channels)`, and idempotent.
use itertools::Itertools;

use crate::{constants::Pixel, track::Track};

/// A maximal run of missing samples in one series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Gap {
    /// Index of the first missing sample
    pub start: usize,
    /// Number of consecutive missing samples
    pub len: usize,
}

impl Gap {
    /// Index one past the last missing sample.
    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// A gap is bounded when a valid sample exists on both sides.
    pub fn is_bounded(&self, series_len: usize) -> bool {
        self.start > 0 && self.end() < series_len
    }
}

/// List the gaps of a series in increasing order.
pub fn find_gaps(series: &[Pixel]) -> Vec<Gap> {
    series
        .iter()
        .enumerate()
        .chunk_by(|(_, v)| v.is_nan())
        .into_iter()
        .filter_map(|(missing, mut run)| {
            if !missing {
                return None;
            }
            let (start, _) = run.next()?;
            Some(Gap {
                start,
                len: 1 + run.count(),
            })
        })
        .collect()
}

/// Fill the short bounded gaps of one series in place.
///
/// Return
/// ----------
/// * The number of samples written.
pub fn interpolate_series(series: &mut [Pixel], max_gap_length: usize) -> usize {
    let mut filled = 0;
    for gap in find_gaps(series) {
        if gap.len > max_gap_length || !gap.is_bounded(series.len()) {
            continue;
        }
        let left = series[gap.start - 1];
        let right = series[gap.end()];
        let steps = (gap.len + 1) as f64;
        for k in 1..=gap.len {
            series[gap.start + k - 1] = left + (right - left) * (k as f64 / steps);
        }
        filled += gap.len;
    }
    filled
}

/// Close every gap of at most `max_gap_length` frames by linear interpolation.
///
/// Arguments
/// -----------------
/// * `track`: The track to repair (left untouched).
/// * `max_gap_length`: Longest gap closed, in frames. `0` fills nothing.
///
/// Return
/// ----------
/// * A new [`Track`] with the same labels, where short bounded gaps are filled.
///
/// See also
/// ------------
/// * [`find_gaps`] – Gap detection used per channel.
pub fn interpolate(track: &Track, max_gap_length: usize) -> Track {
    let mut out = track.clone();
    let n_frames = out.n_frames();
    if n_frames == 0 || max_gap_length == 0 {
        return out;
    }

    let filled: usize = out
        .values_mut()
        .as_mut_slice()
        .chunks_mut(n_frames)
        .map(|channel| interpolate_series(channel, max_gap_length))
        .sum();

    tracing::debug!(filled, max_gap_length, "linear gap filling done");
    out
}

#[cfg(test)]
mod interpolation_test {
    use super::*;
    use crate::track::{Axis, BodyPartIndex};

    const NAN: f64 = f64::NAN;

    #[test]
    fn test_find_gaps() {
        let series = [NAN, 1.0, NAN, NAN, 2.0, 3.0, NAN];
        assert_eq!(
            find_gaps(&series),
            vec![
                Gap { start: 0, len: 1 },
                Gap { start: 2, len: 2 },
                Gap { start: 6, len: 1 }
            ]
        );
        assert!(find_gaps(&[1.0, 2.0]).is_empty());
    }

    #[test]
    fn test_interpolate_short_gap() {
        let mut series = [0.0, NAN, NAN, NAN, 4.0];
        assert_eq!(interpolate_series(&mut series, 3), 3);
        assert_eq!(series, [0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_long_gap_untouched() {
        let mut series = [0.0, NAN, NAN, NAN, NAN, 5.0];
        assert_eq!(interpolate_series(&mut series, 3), 0);
        assert!(series[1..5].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn test_boundary_gaps_untouched() {
        let mut series = [NAN, 1.0, 2.0, NAN];
        assert_eq!(interpolate_series(&mut series, 3), 0);
        assert!(series[0].is_nan());
        assert!(series[3].is_nan());
    }

    #[test]
    fn test_zero_limit_fills_nothing() {
        let mut series = [0.0, NAN, 2.0];
        assert_eq!(interpolate_series(&mut series, 0), 0);
        assert!(series[1].is_nan());
    }

    #[test]
    fn test_interpolate_track_per_channel_and_idempotent() {
        let index = BodyPartIndex::from_labels(["a", "b"]);
        let mut track = Track::from_fn(index, 8, |f, bp, axis| {
            (f as f64) * (bp + 1) as f64 + axis.offset() as f64
        });
        track.set(3, 0, Axis::X, NAN);
        track.set(4, 0, Axis::X, NAN);
        for f in 1..6 {
            track.set(f, 1, Axis::Y, NAN);
        }

        let once = interpolate(&track, 3);
        assert_eq!(once.get(3, 0, Axis::X), 3.0);
        assert_eq!(once.get(4, 0, Axis::X), 4.0);
        assert!(once.get(3, 1, Axis::Y).is_nan());

        let twice = interpolate(&once, 3);
        assert_eq!(twice.values().as_slice().len(), once.values().as_slice().len());
        for (a, b) in once.values().iter().zip(twice.values().iter()) {
            assert!(a.to_bits() == b.to_bits());
        }
    }
}
