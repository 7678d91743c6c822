//! # Tracks: dense keypoint buffers
//!
//! A [`Track`] holds the 2D positions of every body part of **one individual** over a
//! uniformly sampled recording. Missing detections are stored as `NaN`.
//!
//! Data Model
//! -----------------
//! * **Buffer:** a `nalgebra::DMatrix<f64>` with one row per frame and one column per
//!   `(body_part, axis)` channel. Channel `2 * body_part + axis` holds the `x` (axis 0) or
//!   `y` (axis 1) coordinate, i.e. the `[frame, body_part, axis]` cube flattened on its last
//!   two dimensions. Column-major storage keeps every channel contiguous, which is what the
//!   per-channel stages (interpolation, smoothing) iterate over.
//! * **Labels:** a [`BodyPartIndex`] built once per track maps body-part names to stable
//!   integer indices (insertion order of first appearance).
//!
//! Modules
//! -----------------
//! * [`presence`](crate::track::presence) – [`PresenceMask`](crate::track::presence::PresenceMask),
//!   the immutable record of which entries are original observations.
//! * [`table`](crate::track::table) – [`PositionTable`](crate::track::table::PositionTable),
//!   the labelled table exchanged with loaders and downstream consumers.
//!
//! ## See also
//! ------------
//! * [`repair`](crate::repair::repair) – End-to-end pipeline operating on tracks.
use std::fmt;

use ahash::RandomState;
use nalgebra::{DMatrix, DVectorView, Vector2};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{
    constants::{BodyPartName, Pixel, RESERVED_COLUMNS},
    repair_errors::RepairError,
};

pub mod presence;
pub mod table;

/// Image axis of a coordinate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub const ALL: [Axis; 2] = [Axis::X, Axis::Y];

    #[inline]
    pub fn offset(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
        }
    }

    /// Parse `"x"` / `"y"` (case-insensitive).
    pub fn from_label(label: &str) -> Option<Axis> {
        match label.trim() {
            l if l.eq_ignore_ascii_case("x") => Some(Axis::X),
            l if l.eq_ignore_ascii_case("y") => Some(Axis::Y),
            _ => None,
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::X => write!(f, "x"),
            Axis::Y => write!(f, "y"),
        }
    }
}

/// Stable mapping between body-part names and buffer indices.
///
/// Built once from the labelled column set of a table. Order is the insertion order of the
/// first appearance of each name; reserved bookkeeping labels
/// ([`RESERVED_COLUMNS`](crate::constants::RESERVED_COLUMNS)) are skipped.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BodyPartIndex {
    names: Vec<BodyPartName>,
    lookup: HashMap<BodyPartName, usize, RandomState>,
}

impl BodyPartIndex {
    /// Build an index from a sequence of labels, possibly with repetitions
    /// (one label per `x`/`y` column is the usual input).
    pub fn from_labels<I, S>(labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = BodyPartIndex::default();
        for label in labels {
            let label = label.as_ref();
            if RESERVED_COLUMNS.contains(&label) || index.lookup.contains_key(label) {
                continue;
            }
            index.lookup.insert(label.to_string(), index.names.len());
            index.names.push(label.to_string());
        }
        index
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Index of a body part, if present.
    pub fn get(&self, name: &str) -> Option<usize> {
        self.lookup.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup.contains_key(name)
    }

    /// Name of the body part at `index`.
    ///
    /// Panics if `index` is out of bounds.
    pub fn name(&self, index: usize) -> &str {
        &self.names[index]
    }

    pub fn names(&self) -> &[BodyPartName] {
        &self.names
    }
}

/// Positions of every body part of one individual, frame by frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    body_parts: BodyPartIndex,
    values: DMatrix<Pixel>,
}

/// Buffer column holding `axis` of body part `body_part`.
#[inline]
pub fn channel_of(body_part: usize, axis: Axis) -> usize {
    2 * body_part + axis.offset()
}

impl Track {
    /// Wrap a `frames × (2 · body parts)` buffer.
    ///
    /// Return
    /// ----------
    /// * A new [`Track`], or [`RepairError::ShapeMismatch`] if the column count does not match
    ///   twice the number of body parts.
    pub fn new(body_parts: BodyPartIndex, values: DMatrix<Pixel>) -> Result<Self, RepairError> {
        if values.ncols() != 2 * body_parts.len() {
            return Err(RepairError::ShapeMismatch {
                expected: (values.nrows(), 2 * body_parts.len()),
                found: values.shape(),
            });
        }
        Ok(Track { body_parts, values })
    }

    /// Build a track by evaluating `f(frame, body_part, axis)` for every entry.
    pub fn from_fn<F>(body_parts: BodyPartIndex, n_frames: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize, Axis) -> Pixel,
    {
        let n_channels = 2 * body_parts.len();
        let values = DMatrix::from_fn(n_frames, n_channels, |frame, channel| {
            let axis = if channel % 2 == 0 { Axis::X } else { Axis::Y };
            f(frame, channel / 2, axis)
        });
        Track { body_parts, values }
    }

    pub fn body_parts(&self) -> &BodyPartIndex {
        &self.body_parts
    }

    pub fn n_frames(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_body_parts(&self) -> usize {
        self.body_parts.len()
    }

    pub fn n_channels(&self) -> usize {
        self.values.ncols()
    }

    #[inline]
    pub fn get(&self, frame: usize, body_part: usize, axis: Axis) -> Pixel {
        self.values[(frame, channel_of(body_part, axis))]
    }

    #[inline]
    pub fn set(&mut self, frame: usize, body_part: usize, axis: Axis, value: Pixel) {
        self.values[(frame, channel_of(body_part, axis))] = value;
    }

    /// Position of a body part at one frame (components may be `NaN`).
    #[inline]
    pub fn point(&self, frame: usize, body_part: usize) -> Vector2<Pixel> {
        Vector2::new(
            self.get(frame, body_part, Axis::X),
            self.get(frame, body_part, Axis::Y),
        )
    }

    #[inline]
    pub fn set_point(&mut self, frame: usize, body_part: usize, point: Vector2<Pixel>) {
        self.set(frame, body_part, Axis::X, point.x);
        self.set(frame, body_part, Axis::Y, point.y);
    }

    /// One `(body_part, axis)` series over all frames.
    pub fn channel(&self, channel: usize) -> DVectorView<'_, Pixel> {
        self.values.column(channel)
    }

    pub fn values(&self) -> &DMatrix<Pixel> {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut DMatrix<Pixel> {
        &mut self.values
    }

    pub fn into_values(self) -> DMatrix<Pixel> {
        self.values
    }

    /// Number of missing (`NaN`) entries.
    pub fn count_missing(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }

    pub fn has_missing(&self) -> bool {
        self.values.iter().any(|v| v.is_nan())
    }

    /// True when at least one coordinate of `frame` is missing.
    pub fn frame_has_missing(&self, frame: usize) -> bool {
        self.values.row(frame).iter().any(|v| v.is_nan())
    }
}

#[cfg(test)]
mod track_test {
    use super::*;

    #[test]
    fn test_index_skips_reserved_and_duplicates() {
        let index = BodyPartIndex::from_labels(["Row", "Row", "Nose", "Nose", "Tail", "Tail"]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.get("Nose"), Some(0));
        assert_eq!(index.get("Tail"), Some(1));
        assert_eq!(index.get("Row"), None);
        assert_eq!(index.name(1), "Tail");
    }

    #[test]
    fn test_channel_layout() {
        let index = BodyPartIndex::from_labels(["a", "b"]);
        let track = Track::from_fn(index, 3, |frame, bp, axis| {
            (frame * 100 + bp * 10 + axis.offset()) as f64
        });
        assert_eq!(track.n_channels(), 4);
        assert_eq!(track.values()[(2, 3)], 211.0);
        assert_eq!(track.point(1, 1), Vector2::new(110.0, 111.0));
        assert_eq!(channel_of(1, Axis::Y), 3);
    }

    #[test]
    fn test_new_rejects_bad_shape() {
        let index = BodyPartIndex::from_labels(["a", "b"]);
        let err = Track::new(index, DMatrix::zeros(4, 3)).unwrap_err();
        assert_eq!(
            err,
            RepairError::ShapeMismatch {
                expected: (4, 4),
                found: (4, 3)
            }
        );
    }

    #[test]
    fn test_missing_queries() {
        let index = BodyPartIndex::from_labels(["a"]);
        let mut track = Track::from_fn(index, 3, |_, _, _| 1.0);
        assert!(!track.has_missing());
        track.set(1, 0, Axis::Y, f64::NAN);
        assert_eq!(track.count_missing(), 1);
        assert!(track.frame_has_missing(1));
        assert!(!track.frame_has_missing(0));
    }

    #[test]
    fn test_axis_labels() {
        assert_eq!(Axis::from_label("X"), Some(Axis::X));
        assert_eq!(Axis::from_label(" y"), Some(Axis::Y));
        assert_eq!(Axis::from_label("likelihood"), None);
        assert_eq!(Axis::Y.to_string(), "y");
    }
}
