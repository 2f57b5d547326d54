//! Construction list and dependency graph.
//!
//! The construction list is the topological order of the construction: every
//! algorithm sits after all of its inputs. The dependency graph holds the
//! adjacency between elements and the algorithms consuming or producing them.
//!
//! ## Edges
//!
//! ```text
//! input geo --dependents--> algo --outputs--> output geo
//! ```
//!
//! Edges are stored in both directions with BTreeMap/BTreeSet so every
//! traversal is deterministic.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::debug;

use crate::types::{AlgoId, ConstructionElement, GeoId};

/// Ordered list of construction elements.
#[derive(Debug, Clone, Default)]
pub struct ConstructionList {
    elements: Vec<ConstructionElement>,
}

impl ConstructionList {
    /// Create an empty list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element, returning its index.
    pub fn append(&mut self, element: ConstructionElement) -> usize {
        self.elements.push(element);
        let index = self.elements.len() - 1;
        debug!(element = %element, index, "appended to construction list");
        index
    }

    /// Remove an element, shifting later entries down. Returns its old index.
    pub fn remove(&mut self, element: ConstructionElement) -> Option<usize> {
        let index = self.index_of(element)?;
        self.elements.remove(index);
        debug!(element = %element, index, "removed from construction list");
        Some(index)
    }

    /// Current index of an element.
    pub fn index_of(&self, element: ConstructionElement) -> Option<usize> {
        self.elements.iter().position(|e| *e == element)
    }

    /// Elements in construction order.
    pub fn iter(&self) -> impl Iterator<Item = ConstructionElement> + '_ {
        self.elements.iter().copied()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// Adjacency between elements and algorithms.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Geo -> algorithms that read it.
    dependents: BTreeMap<GeoId, BTreeSet<AlgoId>>,
    /// Algorithm -> ordered inputs.
    inputs: BTreeMap<AlgoId, Vec<GeoId>>,
    /// Algorithm -> ordered outputs.
    outputs: BTreeMap<AlgoId, Vec<GeoId>>,
    /// Geo -> generating algorithm.
    parent: BTreeMap<GeoId, AlgoId>,
}

impl DependencyGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an algorithm with its inputs and outputs.
    pub fn add_algo(&mut self, algo: AlgoId, inputs: &[GeoId], outputs: &[GeoId]) {
        for input in inputs {
            self.dependents.entry(*input).or_default().insert(algo);
        }
        for output in outputs {
            self.parent.insert(*output, algo);
        }
        self.inputs.insert(algo, inputs.to_vec());
        self.outputs.insert(algo, outputs.to_vec());
    }

    /// Remove an algorithm, detaching it from its inputs and outputs.
    pub fn remove_algo(&mut self, algo: AlgoId) {
        for input in self.inputs.remove(&algo).unwrap_or_default() {
            if let Some(set) = self.dependents.get_mut(&input) {
                set.remove(&algo);
                if set.is_empty() {
                    self.dependents.remove(&input);
                }
            }
        }
        for output in self.outputs.remove(&algo).unwrap_or_default() {
            self.parent.remove(&output);
        }
    }

    /// Forget a geo that no algorithm references any more.
    pub fn remove_geo(&mut self, geo: GeoId) {
        self.dependents.remove(&geo);
        self.parent.remove(&geo);
    }

    /// Generating algorithm of a geo.
    pub fn parent_of(&self, geo: GeoId) -> Option<AlgoId> {
        self.parent.get(&geo).copied()
    }

    /// Ordered inputs of an algorithm.
    pub fn inputs_of(&self, algo: AlgoId) -> &[GeoId] {
        self.inputs.get(&algo).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ordered outputs of an algorithm.
    pub fn outputs_of(&self, algo: AlgoId) -> &[GeoId] {
        self.outputs.get(&algo).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Algorithms reading a geo.
    pub fn dependents_of(&self, geo: GeoId) -> impl Iterator<Item = AlgoId> + '_ {
        self.dependents.get(&geo).into_iter().flatten().copied()
    }

    /// Whether any algorithm reads this geo.
    pub fn has_dependents(&self, geo: GeoId) -> bool {
        self.dependents.get(&geo).is_some_and(|set| !set.is_empty())
    }

    /// Every geo computed, directly or transitively, from `geo`.
    pub fn descendants(&self, geo: GeoId) -> BTreeSet<GeoId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([geo]);
        while let Some(current) = queue.pop_front() {
            for algo in self.dependents_of(current) {
                for output in self.outputs_of(algo) {
                    if seen.insert(*output) {
                        queue.push_back(*output);
                    }
                }
            }
        }
        seen
    }

    /// Every geo that `geo` is computed from, directly or transitively.
    pub fn ancestors(&self, geo: GeoId) -> BTreeSet<GeoId> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([geo]);
        while let Some(current) = queue.pop_front() {
            if let Some(algo) = self.parent_of(current) {
                for input in self.inputs_of(algo) {
                    if seen.insert(*input) {
                        queue.push_back(*input);
                    }
                }
            }
        }
        seen
    }

    /// Whether a definition reading `inputs` would depend on `target`.
    pub fn depends_on(&self, inputs: &[GeoId], target: GeoId) -> bool {
        inputs
            .iter()
            .any(|input| *input == target || self.ancestors(*input).contains(&target))
    }

    /// Algorithms to re-evaluate after `geo` changes.
    pub fn update_set(&self, geo: GeoId) -> BTreeSet<AlgoId> {
        let mut algos: BTreeSet<AlgoId> = self.dependents_of(geo).collect();
        for descendant in self.descendants(geo) {
            algos.extend(self.dependents_of(descendant));
        }
        algos
    }
}
