//! # Skeleton constraints
//!
//! A [`ConstraintGraph`] turns a [`Skeleton`] into numeric expectations for one individual:
//! for every anatomical edge whose endpoints are both tracked, the **expected distance** between
//! the two body parts, estimated as the mean distance over a sample of fully observed frames.
//!
//! Estimation
//! -----------------
//! 1. Keep the *active* body parts (observed, both coordinates, on at least one frame).
//! 2. Select the frames in which every active body part is present. None → [`RepairError::InsufficientData`].
//! 3. Subsample them evenly across the track with stride `max(1, n_complete / max_samples)`
//!    (integer division), starting at the first complete frame. The sample can hold up to
//!    twice `max_samples` frames.
//! 4. For every skeleton edge between two active body parts, average the Euclidean distance.
//!    No such edge → [`RepairError::Configuration`] (usually the connectivity labels do not carry
//!    the same individual prefix as the track columns).
//!
//! Caching
//! -----------------
//! Building the graph only needs to happen once per individual. [`ConstraintCache`] keeps one
//! graph per individual id together with a fingerprint of the skeleton edges and the track's
//! body-part set; a call with a different skeleton or body-part set rebuilds the entry.
//!
//! ```rust,no_run
//! use posefill::skeleton::{constraints::ConstraintCache, presets::SkeletonPreset};
//! # use posefill::track::{Track, presence::PresenceMask};
//! # fn demo(track: &Track, presence: &PresenceMask) -> Result<(), posefill::repair_errors::RepairError> {
//! let skeleton = SkeletonPreset::Deepof14.for_individual("B", &[]);
//! let mut cache = ConstraintCache::new();
//! let graph = cache.get_or_build("B", track, presence, &skeleton, 100)?;
//! println!("{graph}");
//! # Ok(()) }
//! ```
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use ahash::RandomState;
use itertools::Itertools;

use crate::{
    constants::{BodyPartName, IndividualId},
    repair_errors::RepairError,
    skeleton::Skeleton,
    track::{presence::PresenceMask, Track},
};

/// Expected rest distance between two adjacent body parts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Constraint {
    pub part_a: usize,
    pub part_b: usize,
    pub expected_distance: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintGraph {
    constraints: Vec<Constraint>,
    body_parts: Vec<BodyPartName>,
    n_sampled_frames: usize,
}

impl ConstraintGraph {
    /// Estimate expected edge lengths from the fully observed frames of `track`.
    ///
    /// Arguments
    /// -----------------
    /// * `track`: Positions of one individual (after short-gap interpolation, typically).
    /// * `presence`: Original-observation mask of `track`.
    /// * `skeleton`: Anatomical adjacency, labelled like the track's body parts.
    /// * `max_samples`: Target number of frames averaged, sets the sampling stride.
    ///
    /// Return
    /// ----------
    /// * A non-empty [`ConstraintGraph`], or
    ///   [`RepairError::InsufficientData`] (no fully observed frame),
    ///   [`RepairError::Configuration`] (no skeleton edge between tracked body parts),
    ///   [`RepairError::InvalidRepairParameter`] (`max_samples == 0`).
    pub fn build(
        track: &Track,
        presence: &PresenceMask,
        skeleton: &Skeleton,
        max_samples: usize,
    ) -> Result<Self, RepairError> {
        if max_samples == 0 {
            return Err(RepairError::InvalidRepairParameter(
                "mouse_body_estimation_samples must be >= 1".into(),
            ));
        }
        presence.validate(track)?;

        let active = presence.observed_body_parts();
        if active.is_empty() {
            return Err(RepairError::InsufficientData(
                "no body part has a single observation".into(),
            ));
        }

        let complete: Vec<usize> = (0..track.n_frames())
            .filter(|&f| presence.is_frame_complete_over(f, &active))
            .collect();
        if complete.is_empty() {
            return Err(RepairError::InsufficientData(format!(
                "none of the {} frames has all {} tracked body parts observed",
                track.n_frames(),
                active.len()
            )));
        }

        let stride = (complete.len() / max_samples).max(1);
        let sampled = complete.iter().copied().step_by(stride).collect_vec();

        let index = track.body_parts();
        let constraints = skeleton
            .edges()
            .filter_map(|(a, b)| {
                let (ia, ib) = (index.get(a)?, index.get(b)?);
                if !active.contains(&ia) || !active.contains(&ib) {
                    return None;
                }
                let total: f64 = sampled
                    .iter()
                    .map(|&f| (track.point(f, ia) - track.point(f, ib)).norm())
                    .sum();
                Some(Constraint {
                    part_a: ia,
                    part_b: ib,
                    expected_distance: total / sampled.len() as f64,
                })
            })
            .collect_vec();

        if constraints.is_empty() {
            return Err(RepairError::Configuration(format!(
                "none of the {} skeleton edges joins two tracked body parts",
                skeleton.n_edges()
            )));
        }

        tracing::debug!(
            n_constraints = constraints.len(),
            n_complete = complete.len(),
            n_sampled = sampled.len(),
            "skeleton constraints estimated"
        );

        Ok(ConstraintGraph {
            constraints,
            body_parts: index.names().to_vec(),
            n_sampled_frames: sampled.len(),
        })
    }

    pub fn constraints(&self) -> &[Constraint] {
        &self.constraints
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    /// Number of frames the expected distances were averaged over.
    pub fn n_sampled_frames(&self) -> usize {
        self.n_sampled_frames
    }

    /// Body-part labels the constraint indices refer to.
    pub fn body_parts(&self) -> &[BodyPartName] {
        &self.body_parts
    }

    /// The constraint indices are valid for `track` (same body parts, same order).
    pub fn is_compatible_with(&self, track: &Track) -> bool {
        self.body_parts.as_slice() == track.body_parts().names()
    }
}

impl fmt::Display for ConstraintGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "ConstraintGraph ({} edges, {} sampled frames)",
            self.constraints.len(),
            self.n_sampled_frames
        )?;
        for c in &self.constraints {
            writeln!(
                f,
                "  {:<16} -- {:<16} {:>10.3} px",
                self.body_parts[c.part_a], self.body_parts[c.part_b], c.expected_distance
            )?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Fingerprint {
    edges: Vec<(BodyPartName, BodyPartName)>,
    body_parts: Vec<BodyPartName>,
}

impl Fingerprint {
    fn new(skeleton: &Skeleton, track: &Track) -> Self {
        Fingerprint {
            edges: skeleton
                .edges()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            body_parts: track.body_parts().names().to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedConstraints {
    fingerprint: Fingerprint,
    graph: ConstraintGraph,
}

/// Per-individual store of [`ConstraintGraph`]s.
///
/// Written once per individual (or when its skeleton / body-part set changes) and read
/// afterwards. Building requires `&mut self`, so a build can never race a read.
#[derive(Debug, Clone, Default)]
pub struct ConstraintCache {
    entries: HashMap<IndividualId, CachedConstraints, RandomState>,
}

impl ConstraintCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached graph of `individual`, building it first if it is missing or stale.
    ///
    /// See also
    /// ------------
    /// * [`ConstraintGraph::build`] – Estimation rules and error conditions.
    pub fn get_or_build(
        &mut self,
        individual: &str,
        track: &Track,
        presence: &PresenceMask,
        skeleton: &Skeleton,
        max_samples: usize,
    ) -> Result<&ConstraintGraph, RepairError> {
        let fingerprint = Fingerprint::new(skeleton, track);
        let build = |fingerprint: Fingerprint| -> Result<CachedConstraints, RepairError> {
            tracing::debug!(individual, "building skeleton constraints");
            Ok(CachedConstraints {
                fingerprint,
                graph: ConstraintGraph::build(track, presence, skeleton, max_samples)?,
            })
        };

        match self.entries.entry(individual.to_string()) {
            Entry::Occupied(occupied) => {
                let cached = occupied.into_mut();
                if cached.fingerprint != fingerprint {
                    *cached = build(fingerprint)?;
                }
                Ok(&cached.graph)
            }
            Entry::Vacant(vacant) => Ok(&vacant.insert(build(fingerprint)?).graph),
        }
    }

    pub fn get(&self, individual: &str) -> Option<&ConstraintGraph> {
        self.entries.get(individual).map(|c| &c.graph)
    }

    /// Drop the graph of one individual.
    pub fn invalidate(&mut self, individual: &str) -> Option<ConstraintGraph> {
        self.entries.remove(individual).map(|c| c.graph)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
