//! # Connectivity presets
//!
//! Ready-made [`Skeleton`]s for the usual top-view rodent labelling schemes, plus the helpers
//! needed to use them with multi-animal recordings:
//!
//! * [`SkeletonPreset`] – `Deepof14`, `Deepof11`, `Deepof8` body-part layouts,
//! * per-individual label prefixes (`"B_Nose"` for individual `"B"`),
//! * exclusion of body parts that were not tracked,
//! * [`connect_animals`] – composition of several individuals into one graph, linked by
//!   nose/tail-base edges.
//!
//! ```rust
//! use posefill::skeleton::presets::{connect_animals, SkeletonPreset};
//!
//! let single = SkeletonPreset::Deepof14.skeleton();
//! assert_eq!(single.n_edges(), 14);
//!
//! let pair = connect_animals(&["B", "W"], SkeletonPreset::Deepof14, &[]);
//! assert!(pair.contains_node("B_Nose") && pair.contains_node("W_Tail_tip"));
//! ```
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{repair_errors::RepairError, skeleton::Skeleton};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SkeletonPreset {
    /// 14 body parts, including the three tail segments
    #[serde(rename = "deepof_14")]
    Deepof14,
    /// 11 body parts, tail reduced to its base
    #[serde(rename = "deepof_11")]
    Deepof11,
    /// 8 body parts, no spine markers
    #[serde(rename = "deepof_8")]
    Deepof8,
}

type Adjacency = &'static [(&'static str, &'static [&'static str])];

const DEEPOF_14: Adjacency = &[
    ("Nose", &["Left_ear", "Right_ear"]),
    ("Spine_1", &["Center", "Left_ear", "Right_ear"]),
    ("Center", &["Left_fhip", "Right_fhip", "Spine_2"]),
    ("Spine_2", &["Left_bhip", "Right_bhip", "Tail_base"]),
    ("Tail_base", &["Tail_1"]),
    ("Tail_1", &["Tail_2"]),
    ("Tail_2", &["Tail_tip"]),
];

const DEEPOF_11: Adjacency = &[
    ("Nose", &["Left_ear", "Right_ear"]),
    ("Spine_1", &["Center", "Left_ear", "Right_ear"]),
    ("Center", &["Left_fhip", "Right_fhip", "Spine_2"]),
    ("Spine_2", &["Left_bhip", "Right_bhip", "Tail_base"]),
];

const DEEPOF_8: Adjacency = &[
    ("Nose", &["Left_ear", "Right_ear"]),
    (
        "Center",
        &["Left_fhip", "Right_fhip", "Tail_base", "Left_ear", "Right_ear"],
    ),
    ("Tail_base", &["Tail_tip"]),
];

impl SkeletonPreset {
    fn adjacency(self) -> Adjacency {
        match self {
            SkeletonPreset::Deepof14 => DEEPOF_14,
            SkeletonPreset::Deepof11 => DEEPOF_11,
            SkeletonPreset::Deepof8 => DEEPOF_8,
        }
    }

    /// Unprefixed graph of the preset.
    pub fn skeleton(self) -> Skeleton {
        Skeleton::from_edges(
            self.adjacency()
                .iter()
                .flat_map(|(a, nbrs)| nbrs.iter().map(move |b| (*a, *b))),
        )
    }

    /// Graph of one individual: labels prefixed with `"{id}_"` (unless `id` is empty) and the
    /// `exclude`d body parts (given without prefix) removed.
    pub fn for_individual(self, id: &str, exclude: &[&str]) -> Skeleton {
        let mut skeleton = self.skeleton();
        for name in exclude {
            skeleton.remove_node(name);
        }
        if id.is_empty() {
            skeleton
        } else {
            skeleton.relabel(|n| prefixed(id, n))
        }
    }
}

impl FromStr for SkeletonPreset {
    type Err = RepairError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deepof_14" => Ok(SkeletonPreset::Deepof14),
            "deepof_11" => Ok(SkeletonPreset::Deepof11),
            "deepof_8" => Ok(SkeletonPreset::Deepof8),
            other => Err(RepairError::InvalidRepairParameter(format!(
                "unknown skeleton preset '{other}'"
            ))),
        }
    }
}

impl fmt::Display for SkeletonPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SkeletonPreset::Deepof14 => "deepof_14",
            SkeletonPreset::Deepof11 => "deepof_11",
            SkeletonPreset::Deepof8 => "deepof_8",
        };
        write!(f, "{name}")
    }
}

/// Label of `body_part` for individual `id`.
pub fn prefixed(id: &str, body_part: &str) -> String {
    format!("{id}_{body_part}")
}

/// One graph covering several individuals.
///
/// Each individual gets its own prefixed copy of `preset` (minus `exclude`). Consecutive
/// individuals are then linked by Nose–Nose, Tail_base–Tail_base and both Nose–Tail_base
/// edges. A single empty id yields the plain preset.
pub fn connect_animals(ids: &[&str], preset: SkeletonPreset, exclude: &[&str]) -> Skeleton {
    let ids: Vec<&str> = if ids.is_empty() { vec![""] } else { ids.to_vec() };

    let mut graph = Skeleton::new();
    for id in &ids {
        graph = graph.compose(&preset.for_individual(id, exclude));
    }

    for pair in ids.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        graph.add_edge(prefixed(prev, "Nose"), prefixed(next, "Nose"));
        graph.add_edge(prefixed(prev, "Tail_base"), prefixed(next, "Tail_base"));
        graph.add_edge(prefixed(next, "Nose"), prefixed(prev, "Tail_base"));
        graph.add_edge(prefixed(prev, "Nose"), prefixed(next, "Tail_base"));
    }
    graph
}

#[cfg(test)]
mod presets_test {
    use super::*;

    #[test]
    fn test_preset_sizes() {
        let sk14 = SkeletonPreset::Deepof14.skeleton();
        assert_eq!(sk14.nodes().count(), 14);
        assert_eq!(sk14.n_edges(), 14);

        let sk11 = SkeletonPreset::Deepof11.skeleton();
        assert_eq!(sk11.nodes().count(), 11);

        let sk8 = SkeletonPreset::Deepof8.skeleton();
        assert_eq!(sk8.nodes().count(), 8);
        assert_eq!(sk8.n_edges(), 8);
    }

    #[test]
    fn test_individual_prefix_and_exclusion() {
        let sk = SkeletonPreset::Deepof14.for_individual("B", &["Tail_tip"]);
        assert!(sk.contains_node("B_Nose"));
        assert!(!sk.contains_node("Nose"));
        assert!(!sk.contains_node("B_Tail_tip"));
        assert_eq!(sk.n_edges(), 13);
    }

    #[test]
    fn test_connect_two_animals() {
        let sk = connect_animals(&["B", "W"], SkeletonPreset::Deepof8, &[]);
        assert_eq!(sk.n_edges(), 2 * 8 + 4);
        assert!(sk.neighbours("B_Nose").any(|n| n == "W_Tail_base"));
        assert!(sk.neighbours("W_Nose").any(|n| n == "B_Tail_base"));
    }

    #[test]
    fn test_parse_preset() {
        assert_eq!("deepof_11".parse::<SkeletonPreset>(), Ok(SkeletonPreset::Deepof11));
        assert!("deepof_99".parse::<SkeletonPreset>().is_err());
        assert_eq!(SkeletonPreset::Deepof8.to_string(), "deepof_8");
    }
}
