//! # posefill
//!
//! Reconstruction and smoothing of occluded 2D keypoint trajectories.
//!
//! Pose-tracking software loses body parts for a few frames at a time. `posefill` repairs
//! such tracks in stages: short gaps are interpolated, long gaps are imputed from the other
//! body parts of the same animal, the result is smoothed with a Kalman/RTS smoother, and
//! reconstructed points are pulled back toward the animal's skeletal geometry. Original
//! observations are never altered.
//!
//! Entry points
//! -----------------
//! * [`repair::repair`] – Repair one track.
//! * [`repair::RepairSession`] – Same, caching skeleton constraints per individual.
//! * [`batch::TrackSetRepair`] – Repair every track of a project.
//!
//! The library logs through [`tracing`] and never installs a subscriber.
pub mod batch;
pub mod constants;
pub mod enforcement;
pub mod imputation;
pub mod interpolation;
pub mod repair;
pub mod repair_errors;
pub mod skeleton;
pub mod smoothing;
pub mod track;

pub use batch::{TrackKey, TrackSet, TrackSetRepair};
pub use repair::{repair, RepairConfig, RepairSession};
pub use repair_errors::RepairError;
pub use skeleton::{presets::SkeletonPreset, Skeleton};
pub use track::{presence::PresenceMask, table::PositionTable, Axis, BodyPartIndex, Track};
