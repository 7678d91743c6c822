//! # Skeleton connectivity
//!
//! A [`Skeleton`] is the undirected anatomical adjacency graph between body-part names
//! (e.g. `Nose ↔ Left_ear`, `Spine_2 ↔ Tail_base`). It is always supplied by the caller:
//! the library never infers anatomy from data.
//!
//! Modules
//! -----------------
//! * [`presets`](crate::skeleton::presets) – Named connectivity presets, per-individual label
//!   prefixes, and multi-animal composition.
//! * [`constraints`](crate::skeleton::constraints) – Expected edge lengths estimated from fully
//!   observed frames ([`ConstraintGraph`](crate::skeleton::constraints::ConstraintGraph)) and the
//!   per-individual [`ConstraintCache`](crate::skeleton::constraints::ConstraintCache).
//!
//! Storage uses ordered maps so that edge iteration, and therefore constraint order, is
//! deterministic.
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::constants::BodyPartName;

pub mod constraints;
pub mod presets;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Skeleton {
    adjacency: BTreeMap<BodyPartName, BTreeSet<BodyPartName>>,
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a skeleton from `(a, b)` pairs.
    pub fn from_edges<I, A, B>(edges: I) -> Self
    where
        I: IntoIterator<Item = (A, B)>,
        A: Into<BodyPartName>,
        B: Into<BodyPartName>,
    {
        let mut skeleton = Skeleton::new();
        for (a, b) in edges {
            skeleton.add_edge(a, b);
        }
        skeleton
    }

    /// Add the undirected edge `a ↔ b`. Self-loops are ignored.
    pub fn add_edge(&mut self, a: impl Into<BodyPartName>, b: impl Into<BodyPartName>) {
        let (a, b) = (a.into(), b.into());
        if a == b {
            return;
        }
        self.adjacency
            .entry(a.clone())
            .or_default()
            .insert(b.clone());
        self.adjacency.entry(b).or_default().insert(a);
    }

    /// Remove a node and every edge touching it.
    pub fn remove_node(&mut self, name: &str) {
        if let Some(neighbours) = self.adjacency.remove(name) {
            for n in neighbours {
                if let Some(set) = self.adjacency.get_mut(&n) {
                    set.remove(name);
                }
            }
        }
    }

    /// Rename every node with `f`.
    pub fn relabel<F>(&self, mut f: F) -> Skeleton
    where
        F: FnMut(&str) -> BodyPartName,
    {
        Skeleton::from_edges(self.edges().map(|(a, b)| (f(a), f(b))))
    }

    /// Union of two graphs.
    pub fn compose(&self, other: &Skeleton) -> Skeleton {
        let mut out = self.clone();
        for (a, b) in other.edges() {
            out.add_edge(a, b);
        }
        out
    }

    pub fn contains_node(&self, name: &str) -> bool {
        self.adjacency.contains_key(name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &str> {
        self.adjacency.keys().map(String::as_str)
    }

    pub fn neighbours(&self, name: &str) -> impl Iterator<Item = &str> {
        self.adjacency
            .get(name)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Every undirected edge exactly once, as `(a, b)` with `a < b`.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.adjacency.iter().flat_map(|(a, neighbours)| {
            neighbours
                .iter()
                .filter(move |b| a < *b)
                .map(move |b| (a.as_str(), b.as_str()))
        })
    }

    pub fn n_edges(&self) -> usize {
        self.edges().count()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }
}

impl fmt::Display for Skeleton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Skeleton ({} nodes, {} edges)",
            self.adjacency.len(),
            self.n_edges()
        )?;
        for (a, b) in self.edges() {
            writeln!(f, "  {a} -- {b}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod skeleton_test {
    use super::*;

    #[test]
    fn test_edges_are_undirected_and_unique() {
        let sk = Skeleton::from_edges([("b", "a"), ("a", "b"), ("a", "c"), ("c", "c")]);
        let edges: Vec<_> = sk.edges().collect();
        assert_eq!(edges, vec![("a", "b"), ("a", "c")]);
        assert_eq!(sk.neighbours("a").collect::<Vec<_>>(), vec!["b", "c"]);
        assert!(!sk.contains_node("d"));
    }

    #[test]
    fn test_remove_and_relabel() {
        let mut sk = Skeleton::from_edges([("a", "b"), ("b", "c")]);
        sk.remove_node("b");
        assert_eq!(sk.n_edges(), 0);
        assert!(!sk.contains_node("b"));

        let sk = Skeleton::from_edges([("a", "b")]).relabel(|n| format!("B_{n}"));
        assert_eq!(sk.edges().collect::<Vec<_>>(), vec![("B_a", "B_b")]);
    }

    #[test]
    fn test_compose() {
        let a = Skeleton::from_edges([("a", "b")]);
        let b = Skeleton::from_edges([("c", "d"), ("a", "b")]);
        assert_eq!(a.compose(&b).n_edges(), 2);
    }
}
