//! # Batch repair over track sets
//!
//! Repair every `(experiment, individual)` track of a project through one
//! [`RepairSession`], collecting **per-track outcomes**.
//!
//! ## Overview
//! -----------------
//! A [`TrackSet`] maps each [`TrackKey`] to a [`RepairJob`] (the raw track, its presence mask
//! and the skeleton of that individual). The [`TrackSetRepair`] trait, implemented on
//! `TrackSet`, provides:
//!
//! * `repair_all` – run the pipeline on **every track**, in key order,
//! * `total_frames` / `number_of_tracks` / `total_missing` – quick set-level metrics.
//!
//! ## Result Model
//! -----------------
//! ```text
//! TrackKey → Result<Track, RepairError>
//! ```
//!
//! A failure is **isolated** to its track and logged with `tracing::warn!`; the other tracks
//! are still processed. [`BatchSummary::from_results`] condenses a result map into counts.
//!
//! Constraint graphs are cached in the session under `"{experiment}/{individual}"`, so two
//! recordings of an animal with the same id never share edge lengths.
use std::collections::HashMap;
use std::fmt;

use ahash::RandomState;
use itertools::Itertools;

use crate::{
    constants::{ExperimentId, IndividualId},
    repair::RepairSession,
    repair_errors::RepairError,
    skeleton::Skeleton,
    track::{presence::PresenceMask, Track},
};

/// Identifies one individual in one recording.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TrackKey {
    pub experiment: ExperimentId,
    pub individual: IndividualId,
}

impl TrackKey {
    pub fn new(experiment: impl Into<ExperimentId>, individual: impl Into<IndividualId>) -> Self {
        TrackKey {
            experiment: experiment.into(),
            individual: individual.into(),
        }
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.experiment, self.individual)
    }
}

/// Everything needed to repair one track.
#[derive(Debug, Clone)]
pub struct RepairJob {
    pub track: Track,
    pub presence: PresenceMask,
    pub skeleton: Skeleton,
}

impl RepairJob {
    /// Job whose presence mask marks every finite entry as observed.
    pub fn from_track(track: Track, skeleton: Skeleton) -> Self {
        let presence = PresenceMask::from_track(&track);
        RepairJob {
            track,
            presence,
            skeleton,
        }
    }
}

pub type TrackSet = HashMap<TrackKey, RepairJob, RandomState>;

/// Outcome of [`TrackSetRepair::repair_all`], one entry per track.
pub type BatchRepairResult = HashMap<TrackKey, Result<Track, RepairError>, RandomState>;

/// Borrow the repaired track of `key`.
///
/// Return
/// ----------
/// * `Ok(Some(&Track))` on success, `Ok(None)` if the key was not processed, or the error
///   raised for that track.
pub fn repaired_track_for<'a>(
    all: &'a BatchRepairResult,
    key: &TrackKey,
) -> Result<Option<&'a Track>, &'a RepairError> {
    match all.get(key) {
        None => Ok(None),
        Some(Err(e)) => Err(e),
        Some(Ok(track)) => Ok(Some(track)),
    }
}

/// Move the repaired track of `key` out of the map.
pub fn take_repaired_track(
    all: &mut BatchRepairResult,
    key: &TrackKey,
) -> Result<Option<Track>, RepairError> {
    match all.remove(key) {
        None => Ok(None),
        Some(Err(e)) => Err(e),
        Some(Ok(track)) => Ok(Some(track)),
    }
}

/// Counts over a [`BatchRepairResult`].
///
/// Display
/// -----------------
/// * `format!("{}", summary)` – `repaired=3, insufficient_data=1, failed=0, still_missing=12`
/// * `format!("{:#}", summary)` – aligned multi-line table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Tracks repaired without error
    pub repaired: usize,
    /// Tracks rejected for lack of fully observed frames
    pub insufficient_data: usize,
    /// Tracks that failed for any other reason
    pub failed: usize,
    /// Missing entries left in the repaired tracks (unrepairable gaps, dropped body parts)
    pub still_missing: usize,
}

impl BatchSummary {
    pub fn from_results(results: &BatchRepairResult) -> Self {
        results
            .values()
            .fold(BatchSummary::default(), |mut summary, res| {
                match res {
                    Ok(track) => {
                        summary.repaired += 1;
                        summary.still_missing += track.count_missing();
                    }
                    Err(e) if e.is_data_shortage() => summary.insufficient_data += 1,
                    Err(_) => summary.failed += 1,
                }
                summary
            })
    }

    pub fn total(&self) -> usize {
        self.repaired + self.insufficient_data + self.failed
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            writeln!(f, "Batch repair summary")?;
            writeln!(f, "--------------------")?;
            writeln!(f, "repaired          : {}", self.repaired)?;
            writeln!(f, "insufficient_data : {}", self.insufficient_data)?;
            writeln!(f, "failed            : {}", self.failed)?;
            write!(f, "still_missing     : {}", self.still_missing)
        } else {
            write!(
                f,
                "repaired={}, insufficient_data={}, failed={}, still_missing={}",
                self.repaired, self.insufficient_data, self.failed, self.still_missing
            )
        }
    }
}

pub trait TrackSetRepair {
    /// Repair **every track** of the set with the same session.
    ///
    /// Arguments
    /// -----------------
    /// * `session`: Configuration, models and constraint cache shared by all tracks.
    ///
    /// Return
    /// ----------
    /// * A [`BatchRepairResult`] with one entry per track.
    fn repair_all(&self, session: &mut RepairSession) -> BatchRepairResult;

    /// Number of tracks in the set.
    fn number_of_tracks(&self) -> usize;

    /// Sum of the frame counts of every track.
    fn total_frames(&self) -> usize;

    /// Missing entries across the set, before repair.
    fn total_missing(&self) -> usize;
}

impl TrackSetRepair for TrackSet {
    fn repair_all(&self, session: &mut RepairSession) -> BatchRepairResult {
        let mut results: BatchRepairResult = HashMap::default();

        for (key, job) in self.iter().sorted_by(|(a, _), (b, _)| a.cmp(b)) {
            let res = session.repair(&key.to_string(), &job.track, &job.presence, &job.skeleton);
            match &res {
                Err(e) if e.is_data_shortage() => tracing::warn!(
                    experiment = %key.experiment,
                    individual = %key.individual,
                    "not enough data to repair this track: {e}"
                ),
                Err(e) => tracing::warn!(
                    experiment = %key.experiment,
                    individual = %key.individual,
                    "track repair failed: {e}"
                ),
                Ok(_) => tracing::debug!(
                    experiment = %key.experiment,
                    individual = %key.individual,
                    "track repaired"
                ),
            }
            results.insert(key.clone(), res);
        }
        results
    }

    fn number_of_tracks(&self) -> usize {
        self.len()
    }

    fn total_frames(&self) -> usize {
        self.values().map(|job| job.track.n_frames()).sum()
    }

    fn total_missing(&self) -> usize {
        self.values().map(|job| job.track.count_missing()).sum()
    }
}
