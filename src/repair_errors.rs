use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepairError {
    #[error(
        "Skeleton produced no usable constraint: {0}. Check that the individual id prefixes of the connectivity match the track labels"
    )]
    Configuration(String),

    #[error("Not enough data to seed constraint estimation: {0}")]
    InsufficientData(String),

    #[error("Covariance matrix is singular after regularization (step {step})")]
    Numerical { step: usize },

    #[error("Iterative imputation failed on column {column}: {reason}")]
    ImputationFailed { column: usize, reason: String },

    #[error("Invalid repair parameter: {0}")]
    InvalidRepairParameter(String),

    #[error("Shape mismatch: expected {expected:?}, found {found:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Presence mask flags a missing value as observed (frame {frame}, channel {channel})")]
    InvalidPresenceMask { frame: usize, channel: usize },

    #[error("Malformed position table: {0}")]
    MalformedTable(String),
}

impl PartialEq for RepairError {
    fn eq(&self, other: &Self) -> bool {
        use RepairError::*;
        match (self, other) {
            (Configuration(a), Configuration(b)) => a == b,
            (InsufficientData(a), InsufficientData(b)) => a == b,
            (Numerical { step: a }, Numerical { step: b }) => a == b,
            (
                ImputationFailed {
                    column: c1,
                    reason: r1,
                },
                ImputationFailed {
                    column: c2,
                    reason: r2,
                },
            ) => c1 == c2 && r1 == r2,
            (InvalidRepairParameter(a), InvalidRepairParameter(b)) => a == b,
            (
                ShapeMismatch {
                    expected: e1,
                    found: f1,
                },
                ShapeMismatch {
                    expected: e2,
                    found: f2,
                },
            ) => e1 == e2 && f1 == f2,
            (
                InvalidPresenceMask {
                    frame: f1,
                    channel: c1,
                },
                InvalidPresenceMask {
                    frame: f2,
                    channel: c2,
                },
            ) => f1 == f2 && c1 == c2,
            (MalformedTable(a), MalformedTable(b)) => a == b,
            _ => false,
        }
    }
}

impl RepairError {
    /// True for the two "data cannot support full repair" conditions.
    ///
    /// Batch drivers use this to tell a misconfigured skeleton apart from a recording
    /// that simply lacks enough clean frames.
    pub fn is_data_shortage(&self) -> bool {
        matches!(self, RepairError::InsufficientData(_))
    }
}
