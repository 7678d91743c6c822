//! # Position tables
//!
//! [`PositionTable`] is the labelled, frame-by-frame table exchanged with the loaders that
//! read tracking files and with downstream consumers. Each column is identified by a
//! [`ColumnLabel`] `(name, axis)`; bookkeeping columns such as `("Row", x)` may be interleaved
//! and are carried through repair untouched.
//!
//! ```rust
//! use nalgebra::DMatrix;
//! use posefill::track::{Axis, table::{ColumnLabel, PositionTable}};
//!
//! let columns = vec![
//!     ColumnLabel::new("Nose", Axis::X),
//!     ColumnLabel::new("Nose", Axis::Y),
//! ];
//! let table = PositionTable::new(columns, DMatrix::from_element(10, 2, 1.0)).unwrap();
//! let track = table.to_track().unwrap();
//! assert_eq!(track.n_body_parts(), 1);
//! ```
use ahash::RandomState;
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{
    constants::{BodyPartName, Pixel, RESERVED_COLUMNS},
    repair_errors::RepairError,
    track::{channel_of, Axis, BodyPartIndex, Track},
};

/// `(name, axis)` header of a table column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnLabel {
    pub name: BodyPartName,
    pub axis: Axis,
}

impl ColumnLabel {
    pub fn new(name: impl Into<BodyPartName>, axis: Axis) -> Self {
        ColumnLabel {
            name: name.into(),
            axis,
        }
    }

    pub fn is_reserved(&self) -> bool {
        RESERVED_COLUMNS.contains(&self.name.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PositionTable {
    columns: Vec<ColumnLabel>,
    values: DMatrix<Pixel>,
}

impl PositionTable {
    /// Build a table, checking that there is one label per column and no duplicate label.
    pub fn new(columns: Vec<ColumnLabel>, values: DMatrix<Pixel>) -> Result<Self, RepairError> {
        if columns.len() != values.ncols() {
            return Err(RepairError::MalformedTable(format!(
                "{} labels for {} columns",
                columns.len(),
                values.ncols()
            )));
        }
        let mut seen: HashMap<&ColumnLabel, (), RandomState> = HashMap::default();
        for label in &columns {
            if seen.insert(label, ()).is_some() {
                return Err(RepairError::MalformedTable(format!(
                    "duplicate column ({}, {})",
                    label.name, label.axis
                )));
            }
        }
        Ok(PositionTable { columns, values })
    }

    pub fn columns(&self) -> &[ColumnLabel] {
        &self.columns
    }

    pub fn values(&self) -> &DMatrix<Pixel> {
        &self.values
    }

    pub fn n_frames(&self) -> usize {
        self.values.nrows()
    }

    /// Source column of every track channel, in track channel order.
    fn channel_sources(&self, index: &BodyPartIndex) -> Result<Vec<usize>, RepairError> {
        let mut sources = vec![None; 2 * index.len()];
        for (col, label) in self.columns.iter().enumerate() {
            if label.is_reserved() {
                continue;
            }
            if let Some(bp) = index.get(&label.name) {
                sources[channel_of(bp, label.axis)] = Some(col);
            }
        }
        sources
            .into_iter()
            .enumerate()
            .map(|(channel, src)| {
                src.ok_or_else(|| {
                    let axis = if channel % 2 == 0 { Axis::X } else { Axis::Y };
                    RepairError::MalformedTable(format!(
                        "body part {} has no {} column",
                        index.name(channel / 2),
                        axis
                    ))
                })
            })
            .collect()
    }

    /// Extract the body-part columns into a dense [`Track`].
    ///
    /// The [`BodyPartIndex`] follows the order in which body parts first appear among the
    /// columns; reserved columns are skipped. Every body part needs both an `x` and a `y`
    /// column.
    pub fn to_track(&self) -> Result<Track, RepairError> {
        let index = BodyPartIndex::from_labels(self.columns.iter().map(|c| c.name.as_str()));
        let sources = self.channel_sources(&index)?;
        let values = DMatrix::from_fn(self.values.nrows(), sources.len(), |frame, channel| {
            self.values[(frame, sources[channel])]
        });
        Track::new(index, values)
    }

    /// Copy of this table whose body-part columns are replaced by the values of `track`.
    ///
    /// Shape, column order, labels and reserved columns are preserved.
    pub fn with_track(&self, track: &Track) -> Result<PositionTable, RepairError> {
        if track.n_frames() != self.n_frames() {
            return Err(RepairError::ShapeMismatch {
                expected: (self.n_frames(), track.n_channels()),
                found: track.values().shape(),
            });
        }
        let sources = self.channel_sources(track.body_parts())?;
        let mut out = self.clone();
        for (channel, &col) in sources.iter().enumerate() {
            out.values.set_column(col, &track.channel(channel));
        }
        Ok(out)
    }
}
