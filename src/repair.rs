//! # Repair pipeline
//!
//! Sequences the stages that turn a raw, gappy track into a repaired one while never altering
//! an original observation.
//!
//! ## Stages
//!
//! 1. **Short gaps** – [`interpolate`](crate::interpolation::interpolate) with
//!    `lin_interp_limit`. Always runs.
//! 2. If `full_imputation` is off, or nothing is left missing, stop here.
//! 3. **Constraints** – caller-supplied, cached, or estimated with
//!    [`ConstraintGraph::build`]. Fails early with `InsufficientData` / `Configuration`.
//! 4. **Frame selection** – frames with a missing value, dilated by
//!    [`IMPUTATION_CONTEXT_HALF_WINDOW`] on each side. When more than
//!    [`MIN_IMPUTATION_FRAMES`] are selected (and every channel is observed in the selection) only
//!    those frames are imputed; otherwise the whole track is.
//! 5. **Imputation** – [`IterativeImputer`] over the channels of observed body parts. Body parts
//!    never observed are left missing with a warning.
//! 6. **Smoothing** – [`KalmanSmoother`] on the same channels.
//! 7. **Enforcement** – [`enforce`] against the constraints.
//!
//! Original observations are copied back after stages 5 and 6, so the output agrees with the
//! input bit for bit wherever the presence mask is set.
//!
//! Inputs are borrowed; a failing call leaves the caller's data untouched.
//!
//! ## Example
//!
//! ```rust,no_run
//! use posefill::repair::{RepairConfig, RepairSession};
//! use posefill::skeleton::presets::SkeletonPreset;
//! # use posefill::track::{Track, presence::PresenceMask};
//! # fn demo(track: &Track, presence: &PresenceMask) -> Result<(), posefill::repair_errors::RepairError> {
//! let config = RepairConfig::builder()
//!     .full_imputation(true)
//!     .lin_interp_limit(5)
//!     .build()?;
//! println!("{config:#}");
//!
//! let mut session = RepairSession::new(config);
//! let skeleton = SkeletonPreset::Deepof14.skeleton();
//! let repaired = session.repair("", track, presence, &skeleton)?;
//! assert_eq!(repaired.n_frames(), track.n_frames());
//! # Ok(()) }
//! ```
use std::borrow::Cow;
use std::fmt;

use itertools::Itertools;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        DEFAULT_BODY_ESTIMATION_SAMPLES, DEFAULT_CONSTRAINT_TOLERANCE, DEFAULT_CORRECTION_FACTOR,
        DEFAULT_LIN_INTERP_LIMIT, IMPUTATION_CONTEXT_HALF_WINDOW, MIN_IMPUTATION_FRAMES,
    },
    enforcement::enforce,
    imputation::{ImputerParams, IterativeImputer},
    interpolation::interpolate,
    repair_errors::RepairError,
    skeleton::{
        constraints::{ConstraintCache, ConstraintGraph},
        Skeleton,
    },
    smoothing::{KalmanParams, KalmanSmoother},
    track::{channel_of, presence::PresenceMask, table::PositionTable, Axis, Track},
};

/// User-facing options of the repair pipeline.
///
/// Defaults
/// -----------------
/// * `lin_interp_limit`: 3 frames
/// * `full_imputation`: `false`
/// * `mouse_body_estimation_samples`: 100 frames
/// * `tolerance`: 0.1
/// * `correction_factor`: 0.5
///
/// Use [`RepairConfig::builder`] to get validated values; deserialized configurations should
/// go through [`RepairConfig::validate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Longest gap (frames) closed by linear interpolation
    pub lin_interp_limit: usize,
    /// Run imputation, smoothing and constraint enforcement after interpolation
    pub full_imputation: bool,
    /// Fully observed frames averaged per skeleton edge
    pub mouse_body_estimation_samples: usize,
    /// Relative deviation from an expected distance tolerated by the enforcer
    pub tolerance: f64,
    /// Strength of one enforcer correction, in `(0, 1]`
    pub correction_factor: f64,
}

impl Default for RepairConfig {
    fn default() -> Self {
        RepairConfig {
            lin_interp_limit: DEFAULT_LIN_INTERP_LIMIT,
            full_imputation: false,
            mouse_body_estimation_samples: DEFAULT_BODY_ESTIMATION_SAMPLES,
            tolerance: DEFAULT_CONSTRAINT_TOLERANCE,
            correction_factor: DEFAULT_CORRECTION_FACTOR,
        }
    }
}

impl RepairConfig {
    pub fn builder() -> RepairConfigBuilder {
        RepairConfigBuilder::new()
    }

    /// Check the invariants enforced by [`RepairConfigBuilder::build`].
    pub fn validate(&self) -> Result<(), RepairError> {
        if self.mouse_body_estimation_samples == 0 {
            return Err(RepairError::InvalidRepairParameter(
                "mouse_body_estimation_samples must be >= 1".into(),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(RepairError::InvalidRepairParameter(
                "tolerance must be finite and >= 0".into(),
            ));
        }
        if !(self.correction_factor > 0.0 && self.correction_factor <= 1.0) {
            return Err(RepairError::InvalidRepairParameter(
                "correction_factor must be in (0, 1]".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct RepairConfigBuilder {
    config: RepairConfig,
}

impl RepairConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lin_interp_limit(mut self, v: usize) -> Self {
        self.config.lin_interp_limit = v;
        self
    }
    pub fn full_imputation(mut self, v: bool) -> Self {
        self.config.full_imputation = v;
        self
    }
    pub fn mouse_body_estimation_samples(mut self, v: usize) -> Self {
        self.config.mouse_body_estimation_samples = v;
        self
    }
    pub fn tolerance(mut self, v: f64) -> Self {
        self.config.tolerance = v;
        self
    }
    pub fn correction_factor(mut self, v: f64) -> Self {
        self.config.correction_factor = v;
        self
    }

    pub fn build(self) -> Result<RepairConfig, RepairError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl fmt::Display for RepairConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            const PARAM_COL: usize = 44;
            writeln!(f, "Trajectory Repair Parameters")?;
            writeln!(f, "----------------------------")?;

            macro_rules! line {
                ($fmt:expr, $val:expr, $comment:expr) => {{
                    let s = format!($fmt, $val);
                    let pad = if s.len() < PARAM_COL {
                        " ".repeat(PARAM_COL - s.len())
                    } else {
                        " ".to_string()
                    };
                    writeln!(f, "  {}{}# {}", s, pad, $comment)
                }};
            }

            writeln!(f, "[Gap filling]")?;
            line!(
                "lin_interp_limit              = {}",
                self.lin_interp_limit,
                "Longest gap closed linearly (frames)"
            )?;
            line!(
                "full_imputation               = {}",
                self.full_imputation,
                "Impute, smooth and enforce long gaps"
            )?;

            writeln!(f, "\n[Skeleton constraints]")?;
            line!(
                "mouse_body_estimation_samples = {}",
                self.mouse_body_estimation_samples,
                "Frames averaged per edge length"
            )?;
            line!(
                "tolerance                     = {:.3}",
                self.tolerance,
                "Relative deviation tolerated"
            )?;
            line!(
                "correction_factor             = {:.3}",
                self.correction_factor,
                "Strength of one correction"
            )?;
            Ok(())
        } else {
            write!(
                f,
                "RepairConfig(lin_interp_limit={}, full_imputation={}, samples={}, tolerance={:.2}, correction_factor={:.2})",
                self.lin_interp_limit,
                self.full_imputation,
                self.mouse_body_estimation_samples,
                self.tolerance,
                self.correction_factor
            )
        }
    }
}

/// Repair one track with the default imputation and smoothing models.
///
/// Arguments
/// -----------------
/// * `track`: Raw positions of one individual, `NaN` where undetected.
/// * `presence`: Original-observation mask of `track`.
/// * `skeleton`: Anatomical adjacency, labelled like `track`.
/// * `constraints`: Pre-built constraint graph, or `None` to estimate one from `track`.
/// * `config`: Pipeline options.
///
/// Return
/// ----------
/// * The repaired track (same shape and labels), or the first error raised by a stage.
///
/// See also
/// ------------
/// * [`RepairSession`] – Same pipeline with per-individual constraint caching and custom models.
pub fn repair(
    track: &Track,
    presence: &PresenceMask,
    skeleton: &Skeleton,
    constraints: Option<&ConstraintGraph>,
    config: &RepairConfig,
) -> Result<Track, RepairError> {
    config.validate()?;
    let filled = fill_short_gaps(track, presence, config)?;
    if !needs_reconstruction(&filled, config) {
        return Ok(filled);
    }

    let graph = match constraints {
        Some(graph) => {
            ensure_compatible(graph, track)?;
            Cow::Borrowed(graph)
        }
        None => Cow::Owned(ConstraintGraph::build(
            track,
            presence,
            skeleton,
            config.mouse_body_estimation_samples,
        )?),
    };

    reconstruct(
        track,
        presence,
        filled,
        &graph,
        config,
        &IterativeImputer::default(),
        &KalmanSmoother::default(),
    )
}

/// A configured pipeline that remembers the constraint graph of every individual it repaired.
///
/// The first full repair of an individual estimates its constraints; later calls for the same
/// individual (e.g. further chunks of the same recording) reuse them as long as the skeleton
/// and body-part set are unchanged.
#[derive(Debug, Clone, Default)]
pub struct RepairSession {
    config: RepairConfig,
    imputer: IterativeImputer,
    smoother: KalmanSmoother,
    cache: ConstraintCache,
}

impl RepairSession {
    pub fn new(config: RepairConfig) -> Self {
        RepairSession {
            config,
            ..Default::default()
        }
    }

    /// Session with non-default imputation and smoothing models.
    pub fn with_models(
        config: RepairConfig,
        imputer: ImputerParams,
        smoother: KalmanParams,
    ) -> Self {
        RepairSession {
            config,
            imputer: IterativeImputer::new(imputer),
            smoother: KalmanSmoother::new(smoother),
            cache: ConstraintCache::new(),
        }
    }

    pub fn config(&self) -> &RepairConfig {
        &self.config
    }

    pub fn cache(&self) -> &ConstraintCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut ConstraintCache {
        &mut self.cache
    }

    /// Repair the track of `individual`.
    ///
    /// Identical to [`repair`] except that the constraint graph is taken from (or stored in)
    /// the session cache under `individual`.
    pub fn repair(
        &mut self,
        individual: &str,
        track: &Track,
        presence: &PresenceMask,
        skeleton: &Skeleton,
    ) -> Result<Track, RepairError> {
        self.config.validate()?;
        let filled = fill_short_gaps(track, presence, &self.config)?;
        if !needs_reconstruction(&filled, &self.config) {
            return Ok(filled);
        }

        let graph = self.cache.get_or_build(
            individual,
            track,
            presence,
            skeleton,
            self.config.mouse_body_estimation_samples,
        )?;
        reconstruct(
            track,
            presence,
            filled,
            graph,
            &self.config,
            &self.imputer,
            &self.smoother,
        )
    }

    /// Repair a labelled table.
    ///
    /// `presence` defaults to the finite entries of the table. Reserved columns and column order
    /// are carried through unchanged.
    pub fn repair_table(
        &mut self,
        individual: &str,
        table: &PositionTable,
        presence: Option<&PresenceMask>,
        skeleton: &Skeleton,
    ) -> Result<PositionTable, RepairError> {
        let track = table.to_track()?;
        let derived;
        let presence = match presence {
            Some(p) => p,
            None => {
                derived = PresenceMask::from_track(&track);
                &derived
            }
        };
        let repaired = self.repair(individual, &track, presence, skeleton)?;
        table.with_track(&repaired)
    }
}

fn fill_short_gaps(
    track: &Track,
    presence: &PresenceMask,
    config: &RepairConfig,
) -> Result<Track, RepairError> {
    presence.validate(track)?;
    Ok(interpolate(track, config.lin_interp_limit))
}

fn needs_reconstruction(filled: &Track, config: &RepairConfig) -> bool {
    config.full_imputation && filled.has_missing()
}

fn ensure_compatible(graph: &ConstraintGraph, track: &Track) -> Result<(), RepairError> {
    if graph.is_compatible_with(track) {
        Ok(())
    } else {
        Err(RepairError::Configuration(format!(
            "constraint graph was built for body parts {:?}, track has {:?}",
            graph.body_parts(),
            track.body_parts().names()
        )))
    }
}

/// Stages 4 to 7 on an interpolated track.
fn reconstruct(
    original: &Track,
    presence: &PresenceMask,
    filled: Track,
    graph: &ConstraintGraph,
    config: &RepairConfig,
    imputer: &IterativeImputer,
    smoother: &KalmanSmoother,
) -> Result<Track, RepairError> {
    let kept = presence.observed_body_parts();
    for bp in (0..original.n_body_parts()).filter(|bp| !kept.contains(bp)) {
        tracing::warn!(
            body_part = original.body_parts().name(bp),
            "body part has no valid measurement, it is left missing"
        );
    }
    let channels = kept
        .iter()
        .flat_map(|&bp| Axis::ALL.map(|axis| channel_of(bp, axis)))
        .collect_vec();

    let frames = select_frames(&filled, &channels);
    let mut out = impute_frames(&filled, &frames, &channels, imputer)?;
    presence.restore(original, &mut out);

    let mut out = smoother.smooth_track(&out, &channels)?;
    presence.restore(original, &mut out);

    let (out, report) = enforce(
        &out,
        graph,
        presence,
        config.tolerance,
        config.correction_factor,
    );
    tracing::debug!(%report, "track reconstructed");
    Ok(out)
}

/// Frames to impute: every frame with a missing kept value, plus its context window.
///
/// Falls back to every frame when the selection is too small to fit the regressions, or when
/// some channel has no observation inside it.
fn select_frames(filled: &Track, channels: &[usize]) -> Vec<usize> {
    let n_frames = filled.n_frames();
    let values = filled.values();
    let mut selected = vec![false; n_frames];
    for frame in 0..n_frames {
        if channels.iter().any(|&c| values[(frame, c)].is_nan()) {
            let lo = frame.saturating_sub(IMPUTATION_CONTEXT_HALF_WINDOW);
            let hi = (frame + IMPUTATION_CONTEXT_HALF_WINDOW).min(n_frames - 1);
            selected[lo..=hi].iter_mut().for_each(|s| *s = true);
        }
    }
    let frames = selected.iter().positions(|&s| s).collect_vec();

    let every_channel_seen = channels
        .iter()
        .all(|&c| frames.iter().any(|&f| values[(f, c)].is_finite()));
    if frames.len() > MIN_IMPUTATION_FRAMES && every_channel_seen {
        tracing::debug!(n_selected = frames.len(), n_frames, "imputing frame subset");
        frames
    } else {
        (0..n_frames).collect()
    }
}

fn impute_frames(
    filled: &Track,
    frames: &[usize],
    channels: &[usize],
    imputer: &IterativeImputer,
) -> Result<Track, RepairError> {
    let values = filled.values();
    let subset = DMatrix::from_fn(frames.len(), channels.len(), |r, c| {
        values[(frames[r], channels[c])]
    });
    let imputed = imputer.impute(&subset)?;

    let mut out = filled.clone();
    let target = out.values_mut();
    for (r, &frame) in frames.iter().enumerate() {
        for (c, &channel) in channels.iter().enumerate() {
            target[(frame, channel)] = imputed[(r, c)];
        }
    }
    Ok(out)
}

#[cfg(test)]
mod repair_test {
    use super::*;
    use crate::track::BodyPartIndex;

    fn square_track(n_frames: usize) -> Track {
        let index = BodyPartIndex::from_labels(["a", "b", "c", "d"]);
        Track::from_fn(index, n_frames, |f, bp, axis| {
            let corner = [(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0)][bp];
            let drift = f as f64 * 0.5;
            match axis {
                Axis::X => corner.0 + drift,
                Axis::Y => corner.1 + 0.25 * drift,
            }
        })
    }

    fn square_skeleton() -> Skeleton {
        Skeleton::from_edges([("a", "b"), ("b", "c"), ("c", "d"), ("d", "a")])
    }

    #[test]
    fn test_config_builder() {
        let config = RepairConfig::builder()
            .lin_interp_limit(5)
            .full_imputation(true)
            .build()
            .unwrap();
        assert_eq!(config.lin_interp_limit, 5);
        assert!(config.full_imputation);
        assert_eq!(config.mouse_body_estimation_samples, 100);

        assert!(RepairConfig::builder().correction_factor(0.0).build().is_err());
        assert!(RepairConfig::builder().correction_factor(1.5).build().is_err());
        assert!(RepairConfig::builder().tolerance(f64::NAN).build().is_err());
        assert!(RepairConfig::builder()
            .mouse_body_estimation_samples(0)
            .build()
            .is_err());
    }

    #[test]
    fn test_config_deserializes_partial_input() {
        let config: RepairConfig =
            serde_json::from_str(r#"{"full_imputation": true, "tolerance": 0.2}"#).unwrap();
        assert!(config.full_imputation);
        assert_eq!(config.tolerance, 0.2);
        assert_eq!(config.lin_interp_limit, 3);
        assert!(config.validate().is_ok());

        let bad: RepairConfig = serde_json::from_str(r#"{"correction_factor": 2.0}"#).unwrap();
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_config_display() {
        let pretty = format!("{:#}", RepairConfig::default());
        assert!(pretty.contains("lin_interp_limit"));
        assert!(pretty.contains("# Strength of one correction"));
        assert!(RepairConfig::default()
            .to_string()
            .starts_with("RepairConfig("));
    }

    #[test]
    fn test_select_frames_small_selection_uses_everything() {
        let mut track = square_track(100);
        track.set(50, 0, Axis::X, f64::NAN);
        let frames = select_frames(&track, &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(frames.len(), 100);
    }

    #[test]
    fn test_select_frames_dilates() {
        let mut track = square_track(200);
        for f in [20, 60, 100, 140] {
            track.set(f, 1, Axis::Y, f64::NAN);
        }
        let frames = select_frames(&track, &[0, 1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(frames.len(), 4 * 15);
        assert!(frames.contains(&13) && frames.contains(&27) && !frames.contains(&28));
    }

    #[test]
    fn test_interpolation_only_mode() {
        let mut track = square_track(30);
        for f in 10..20 {
            track.set(f, 2, Axis::X, f64::NAN);
        }
        track.set(5, 1, Axis::Y, f64::NAN);
        let presence = PresenceMask::from_track(&track);
        let out = repair(
            &track,
            &presence,
            &square_skeleton(),
            None,
            &RepairConfig::default(),
        )
        .unwrap();
        assert!(out.get(5, 1, Axis::Y).is_finite());
        assert!(out.get(12, 2, Axis::X).is_nan());
    }

    #[test]
    fn test_incompatible_graph_is_rejected() {
        let mut track = square_track(30);
        track.set(5, 1, Axis::Y, f64::NAN);
        track.set(6, 1, Axis::Y, f64::NAN);
        track.set(7, 1, Axis::Y, f64::NAN);
        track.set(8, 1, Axis::Y, f64::NAN);
        let presence = PresenceMask::from_track(&track);

        let other = BodyPartIndex::from_labels(["x", "y"]);
        let other_track = Track::from_fn(other, 3, |f, bp, _| (f * bp) as f64);
        let other_presence = PresenceMask::from_track(&other_track);
        let graph = ConstraintGraph::build(
            &other_track,
            &other_presence,
            &Skeleton::from_edges([("x", "y")]),
            10,
        )
        .unwrap();

        let config = RepairConfig::builder().full_imputation(true).build().unwrap();
        assert!(matches!(
            repair(&track, &presence, &square_skeleton(), Some(&graph), &config),
            Err(RepairError::Configuration(_))
        ));
    }

    #[test]
    fn test_session_caches_constraints() {
        let mut track = square_track(80);
        for f in 30..40 {
            track.set_point(f, 3, nalgebra::Vector2::new(f64::NAN, f64::NAN));
        }
        let presence = PresenceMask::from_track(&track);
        let config = RepairConfig::builder().full_imputation(true).build().unwrap();
        let mut session = RepairSession::new(config);

        let out = session
            .repair("mouse", &track, &presence, &square_skeleton())
            .unwrap();
        assert!(!out.has_missing());
        assert_eq!(session.cache().len(), 1);
        assert_eq!(session.cache().get("mouse").map(|g| g.len()), Some(4));
    }
}
