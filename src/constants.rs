//! # Constants and type definitions for posefill
//!
//! This module centralizes the **default tuning values**, **reserved labels**, and **common type
//! aliases** used throughout the `posefill` library.
//!
//! ## Overview
//!
//! - Pipeline defaults (interpolation limit, dilation window, imputation thresholds)
//! - Kalman model constants (process / measurement noise, initial covariance)
//! - Constraint enforcement defaults (tolerance, correction factor)
//! - Core type aliases shared by the track, skeleton, and batch modules
//!
//! Every tunable value listed here can be overridden through the corresponding parameter
//! struct ([`RepairConfig`](crate::repair::RepairConfig),
//! [`ImputerParams`](crate::imputation::ImputerParams),
//! [`KalmanParams`](crate::smoothing::KalmanParams)).

// -------------------------------------------------------------------------------------------------
// Pipeline defaults
// -------------------------------------------------------------------------------------------------

/// Longest run of missing frames closed by linear interpolation
pub const DEFAULT_LIN_INTERP_LIMIT: usize = 3;

/// Number of fully observed frames sampled to estimate skeleton edge lengths
pub const DEFAULT_BODY_ESTIMATION_SAMPLES: usize = 100;

/// Half-width (in frames) of the context window added around frames needing reconstruction
pub const IMPUTATION_CONTEXT_HALF_WINDOW: usize = 7;

/// The dilated frame selection must strictly exceed this count to be imputed on its own
pub const MIN_IMPUTATION_FRAMES: usize = 50;

// -------------------------------------------------------------------------------------------------
// Iterative imputation defaults
// -------------------------------------------------------------------------------------------------

/// Maximum number of round-robin imputation passes
pub const DEFAULT_IMPUTER_MAX_ITER: usize = 100;

/// Maximum number of predictor columns per regression
pub const DEFAULT_N_NEAREST_FEATURES: usize = 8;

/// Relative stopping tolerance of the round-robin loop
pub const DEFAULT_IMPUTER_TOL: f64 = 1e-1;

/// L2 penalty of the per-column ridge regressions (on standardized data)
pub const DEFAULT_RIDGE_ALPHA: f64 = 1e-3;

// -------------------------------------------------------------------------------------------------
// Kalman / RTS model constants
// -------------------------------------------------------------------------------------------------

/// Scale of the white-acceleration process noise
pub const KALMAN_PROCESS_NOISE: f64 = 0.01;

/// Variance of a position measurement
pub const KALMAN_MEASUREMENT_NOISE: f64 = 0.1;

/// Diagonal of the initial state covariance (no prior knowledge)
pub const KALMAN_INITIAL_COVARIANCE: f64 = 1000.0;

/// Diagonal jitter added before retrying a failed covariance inversion
pub const COVARIANCE_REGULARIZATION: f64 = 1e-9;

// -------------------------------------------------------------------------------------------------
// Constraint enforcement defaults
// -------------------------------------------------------------------------------------------------

/// Allowed relative deviation from an expected skeleton distance
pub const DEFAULT_CONSTRAINT_TOLERANCE: f64 = 0.1;

/// Strength of a single geometric correction
pub const DEFAULT_CORRECTION_FACTOR: f64 = 0.5;

/// Keeps the correction finite when two points coincide
pub const DISTANCE_EPS: f64 = 1e-5;

// -------------------------------------------------------------------------------------------------
// Labels and type aliases
// -------------------------------------------------------------------------------------------------

/// Bookkeeping columns that never describe a body part
pub const RESERVED_COLUMNS: [&str; 1] = ["Row"];

/// Name of a tracked body part (e.g. `"B_Nose"`)
pub type BodyPartName = String;

/// Identifier of one tracked animal within an experiment
pub type IndividualId = String;

/// Identifier of one recording / experiment
pub type ExperimentId = String;

/// Pixel coordinate
pub type Pixel = f64;
