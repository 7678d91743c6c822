//! # Presence masks
//!
//! A [`PresenceMask`] records which entries of a [`Track`] are **original observations**
//! (as opposed to reconstructed values). It is computed once from raw input, typically by a
//! collaborator thresholding tracking confidence, and is never recomputed mid-pipeline.
//!
//! Every repair stage consults the mask: an entry flagged present is never overwritten, and
//! [`PresenceMask::restore`] re-asserts that invariant after stages that rewrite whole
//! channels (imputation, smoothing).
use nalgebra::DMatrix;

use crate::{
    repair_errors::RepairError,
    track::{channel_of, Axis, Track},
};

#[derive(Debug, Clone, PartialEq)]
pub struct PresenceMask {
    mask: DMatrix<bool>,
}

impl PresenceMask {
    /// Wrap a `frames × channels` boolean buffer.
    pub fn new(mask: DMatrix<bool>) -> Self {
        PresenceMask { mask }
    }

    /// Mark every finite entry of `track` as an original observation.
    pub fn from_track(track: &Track) -> Self {
        PresenceMask {
            mask: track.values().map(|v| v.is_finite()),
        }
    }

    /// Check that the mask matches `track` in shape and only flags finite values.
    ///
    /// Return
    /// ----------
    /// * `Ok(())`, [`RepairError::ShapeMismatch`], or [`RepairError::InvalidPresenceMask`]
    ///   pointing at the first offending entry.
    pub fn validate(&self, track: &Track) -> Result<(), RepairError> {
        if self.mask.shape() != track.values().shape() {
            return Err(RepairError::ShapeMismatch {
                expected: track.values().shape(),
                found: self.mask.shape(),
            });
        }
        for channel in 0..self.mask.ncols() {
            for frame in 0..self.mask.nrows() {
                if self.mask[(frame, channel)] && !track.values()[(frame, channel)].is_finite() {
                    return Err(RepairError::InvalidPresenceMask { frame, channel });
                }
            }
        }
        Ok(())
    }

    pub fn n_frames(&self) -> usize {
        self.mask.nrows()
    }

    pub fn n_channels(&self) -> usize {
        self.mask.ncols()
    }

    pub fn as_matrix(&self) -> &DMatrix<bool> {
        &self.mask
    }

    #[inline]
    pub fn is_present(&self, frame: usize, body_part: usize, axis: Axis) -> bool {
        self.mask[(frame, channel_of(body_part, axis))]
    }

    /// Both coordinates of the point were observed.
    #[inline]
    pub fn is_point_present(&self, frame: usize, body_part: usize) -> bool {
        self.is_present(frame, body_part, Axis::X) && self.is_present(frame, body_part, Axis::Y)
    }

    /// Every coordinate of the frame was observed.
    pub fn is_frame_complete(&self, frame: usize) -> bool {
        self.mask.row(frame).iter().all(|&p| p)
    }

    /// Every coordinate of the listed body parts was observed at `frame`.
    pub fn is_frame_complete_over(&self, frame: usize, body_parts: &[usize]) -> bool {
        body_parts
            .iter()
            .all(|&bp| self.is_point_present(frame, bp))
    }

    /// Number of original observations in one channel.
    pub fn channel_count(&self, channel: usize) -> usize {
        self.mask.column(channel).iter().filter(|&&p| p).count()
    }

    /// Body parts observed (both coordinates) on at least one frame.
    pub fn observed_body_parts(&self) -> Vec<usize> {
        (0..self.mask.ncols() / 2)
            .filter(|&bp| (0..self.mask.nrows()).any(|f| self.is_point_present(f, bp)))
            .collect()
    }

    /// Copy every original observation of `original` back into `target`.
    ///
    /// Both tracks must have the mask's shape.
    pub fn restore(&self, original: &Track, target: &mut Track) {
        let source = original.values();
        let values = target.values_mut();
        for (idx, &present) in self.mask.iter().enumerate() {
            if present {
                values[idx] = source[idx];
            }
        }
    }
}
