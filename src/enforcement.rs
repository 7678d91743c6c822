//! # Geometric constraint enforcement
//!
//! Last stage of the full repair: reconstructed points are nudged toward the expected skeleton
//! edge lengths of their individual, original observations stay where they are.
//!
//! For every frame holding at least one reconstructed coordinate, and every constraint
//! `(A, B, d)` in graph order:
//!
//! * `c = |A − B|`; nothing happens unless `|c − d| > tolerance · d`,
//! * `k = (c − d) / (2c + ε) · correction_factor` and `m = (A + B) / 2`,
//! * only the reconstructed endpoint(s) move toward `m`:
//!   `B += 2k (m − B)` when only `A` is observed, `A += 2k (m − A)` when only `B` is observed,
//!   both by `k` when neither is.
//!
//! A point counts as observed when both of its coordinates are. A moved point only has its
//! reconstructed coordinates rewritten: with `x` observed and `y` reconstructed, `x` keeps its
//! original bits and only `y` takes the corrected value.
//!
//! Updates are applied in place, so later constraints of the same frame see the corrected
//! positions. Each constraint is visited once per frame; the pass is not iterated to a fixed
//! point.
use std::fmt;

use nalgebra::Vector2;

use crate::{
    constants::DISTANCE_EPS,
    skeleton::constraints::ConstraintGraph,
    track::{presence::PresenceMask, Axis, Track},
};

/// What a call to [`enforce`] did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnforcementReport {
    /// Frames with at least one reconstructed coordinate
    pub frames_visited: usize,
    /// Frames skipped because every coordinate was observed
    pub frames_skipped: usize,
    /// Constraint corrections applied
    pub corrections: usize,
    /// Constraint checks skipped because an endpoint was not finite
    pub non_finite_edges: usize,
}

impl fmt::Display for EnforcementReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} corrections over {} frames ({} complete frames skipped, {} non-finite edges)",
            self.corrections, self.frames_visited, self.frames_skipped, self.non_finite_edges
        )
    }
}

/// Pull reconstructed points toward the expected skeleton distances.
///
/// Arguments
/// -----------------
/// * `track`: Smoothed track of one individual.
/// * `constraints`: Expected edge lengths, indexed like `track`'s body parts.
/// * `presence`: Original-observation mask of `track`.
/// * `tolerance`: Relative deviation tolerated before correcting (`0.1` = 10 %).
/// * `correction_factor`: Fraction of the violation corrected, in `(0, 1]`.
///
/// Return
/// ----------
/// * The corrected track and an [`EnforcementReport`].
pub fn enforce(
    track: &Track,
    constraints: &ConstraintGraph,
    presence: &PresenceMask,
    tolerance: f64,
    correction_factor: f64,
) -> (Track, EnforcementReport) {
    let mut out = track.clone();
    let mut report = EnforcementReport::default();

    for frame in 0..out.n_frames() {
        if presence.is_frame_complete(frame) {
            report.frames_skipped += 1;
            continue;
        }
        report.frames_visited += 1;

        for c in constraints.constraints() {
            let a_present = presence.is_point_present(frame, c.part_a);
            let b_present = presence.is_point_present(frame, c.part_b);
            if a_present && b_present {
                continue;
            }

            let a = out.point(frame, c.part_a);
            let b = out.point(frame, c.part_b);
            if !(finite(&a) && finite(&b)) {
                report.non_finite_edges += 1;
                continue;
            }

            let current = (a - b).norm();
            let expected = c.expected_distance;
            if (current - expected).abs() <= tolerance * expected {
                continue;
            }

            let k = (current - expected) / (2.0 * current + DISTANCE_EPS) * correction_factor;
            let mid = (a + b) / 2.0;
            match (a_present, b_present) {
                (true, false) => {
                    move_reconstructed(&mut out, presence, frame, c.part_b, b + (mid - b) * (2.0 * k))
                }
                (false, true) => {
                    move_reconstructed(&mut out, presence, frame, c.part_a, a + (mid - a) * (2.0 * k))
                }
                _ => {
                    move_reconstructed(&mut out, presence, frame, c.part_a, a + (mid - a) * k);
                    move_reconstructed(&mut out, presence, frame, c.part_b, b + (mid - b) * k);
                }
            }
            report.corrections += 1;
        }
    }

    tracing::debug!(
        frames_visited = report.frames_visited,
        corrections = report.corrections,
        "skeleton constraints enforced"
    );
    (out, report)
}

/// Write `target` into the coordinates of `body_part` that were not observed at `frame`.
fn move_reconstructed(
    out: &mut Track,
    presence: &PresenceMask,
    frame: usize,
    body_part: usize,
    target: Vector2<f64>,
) {
    for axis in Axis::ALL {
        if !presence.is_present(frame, body_part, axis) {
            out.set(frame, body_part, axis, target[axis.offset()]);
        }
    }
}

fn finite(p: &Vector2<f64>) -> bool {
    p.x.is_finite() && p.y.is_finite()
}
