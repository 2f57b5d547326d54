//! The element graph of one construction, without history or configuration.
//!
//! A `ConstructionState` is what a rebuild produces from a document and what
//! the construction swaps in atomically when the rebuild succeeds.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::expr::{evaluate, EvalEnv, EvalError, Expr, Scope};
use crate::graph::{ConstructionList, DependencyGraph};
use crate::registry::{ElementRegistry, RegistryError};
use crate::snapshot::ElementRecord;
use crate::types::{
    AlgoElement, AlgoId, AlgoKind, ConstructionElement, GeoElement, GeoId, GeoKind, GeoValue,
    MacroLibrary, VisualStyle,
};

/// Failure to evaluate one element.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ElementEvalError {
    pub label: String,
    pub error: EvalError,
}

/// Elements, algorithms, their order and adjacency.
#[derive(Debug, Clone, Default)]
pub struct ConstructionState {
    pub(crate) geos: BTreeMap<GeoId, GeoElement>,
    pub(crate) algos: BTreeMap<AlgoId, AlgoElement>,
    pub(crate) list: ConstructionList,
    pub(crate) registry: ElementRegistry,
    pub(crate) graph: DependencyGraph,
    pub(crate) used_macros: Vec<String>,
    next_geo: u64,
    next_algo: u64,
}

impl Scope for ConstructionState {
    fn value_of(&self, label: &str) -> Option<&GeoValue> {
        self.lookup(label).map(GeoElement::value)
    }
}

impl ConstructionState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Element by id.
    pub fn geo(&self, id: GeoId) -> Option<&GeoElement> {
        self.geos.get(&id)
    }

    /// Algorithm by id.
    pub fn algo(&self, id: AlgoId) -> Option<&AlgoElement> {
        self.algos.get(&id)
    }

    /// Element by label.
    pub fn lookup(&self, label: &str) -> Option<&GeoElement> {
        self.registry.lookup(label).and_then(|id| self.geos.get(&id))
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.geos.len()
    }

    /// Whether the state has no elements.
    pub fn is_empty(&self) -> bool {
        self.geos.is_empty()
    }

    fn alloc_geo(&mut self) -> GeoId {
        self.next_geo += 1;
        GeoId::new(self.next_geo)
    }

    fn alloc_algo(&mut self) -> AlgoId {
        self.next_algo += 1;
        AlgoId::new(self.next_algo)
    }

    /// Add an element with no generating algorithm.
    pub(crate) fn add_independent(
        &mut self,
        label: &str,
        kind: GeoKind,
        value: GeoValue,
        style: VisualStyle,
        auxiliary: bool,
    ) -> Result<GeoId, RegistryError> {
        let id = self.alloc_geo();
        self.registry.register(id, label, kind)?;
        let construction_index = self.list.append(ConstructionElement::Geo(id));
        self.geos.insert(
            id,
            GeoElement {
                id,
                label: label.to_string(),
                kind,
                value,
                style,
                parent_algo: None,
                construction_index,
                auxiliary,
            },
        );
        Ok(id)
    }

    /// Add an element computed by a new algorithm reading `inputs`.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn add_dependent(
        &mut self,
        label: &str,
        kind: GeoKind,
        algo_kind: AlgoKind,
        expression: Arc<Expr>,
        inputs: Vec<GeoId>,
        value: GeoValue,
        style: VisualStyle,
    ) -> Result<GeoId, RegistryError> {
        let id = self.alloc_geo();
        self.registry.register(id, label, kind)?;
        let algo_id = self.alloc_algo();
        let construction_index = self.list.append(ConstructionElement::Algo(algo_id));
        self.graph.add_algo(algo_id, &inputs, &[id]);
        self.algos.insert(
            algo_id,
            AlgoElement {
                id: algo_id,
                kind: algo_kind,
                expression,
                inputs,
                outputs: vec![id],
                construction_index,
            },
        );
        self.geos.insert(
            id,
            GeoElement {
                id,
                label: label.to_string(),
                kind,
                value,
                style,
                parent_algo: Some(algo_id),
                construction_index,
                auxiliary: false,
            },
        );
        Ok(id)
    }

    /// Remove an element and everything computed from it, latest first.
    ///
    /// Returns the removed labels in removal order.
    pub(crate) fn remove_element(&mut self, id: GeoId) -> Vec<String> {
        let mut doomed: Vec<GeoId> = self.graph.descendants(id).into_iter().collect();
        doomed.push(id);
        doomed.sort_by_key(|g| std::cmp::Reverse(self.geos.get(g).map(|e| e.construction_index)));

        let mut removed = Vec::with_capacity(doomed.len());
        for geo_id in doomed {
            let Some(geo) = self.geos.remove(&geo_id) else {
                continue;
            };
            match geo.parent_algo {
                Some(algo_id) => {
                    self.graph.remove_algo(algo_id);
                    self.list.remove(ConstructionElement::Algo(algo_id));
                    self.algos.remove(&algo_id);
                }
                None => {
                    self.list.remove(ConstructionElement::Geo(geo_id));
                }
            }
            self.graph.remove_geo(geo_id);
            self.registry.unregister(&geo.label);
            removed.push(geo.label);
        }
        self.reindex();
        removed
    }

    /// Recompute construction indices from list positions.
    pub(crate) fn reindex(&mut self) {
        let entries: Vec<(usize, ConstructionElement)> = self.list.iter().enumerate().collect();
        for (index, element) in entries {
            match element {
                ConstructionElement::Geo(id) => {
                    if let Some(geo) = self.geos.get_mut(&id) {
                        geo.construction_index = index;
                    }
                }
                ConstructionElement::Algo(id) => {
                    if let Some(algo) = self.algos.get_mut(&id) {
                        algo.construction_index = index;
                        for output in algo.outputs.clone() {
                            if let Some(geo) = self.geos.get_mut(&output) {
                                geo.construction_index = index;
                            }
                        }
                    }
                }
            }
        }
    }

    /// Ids of the elements `expr` reads.
    ///
    /// Named constants without an element are not inputs. Any other unknown
    /// name is returned as the error.
    pub(crate) fn resolve_inputs(&self, expr: &Expr) -> Result<Vec<GeoId>, String> {
        let mut inputs = Vec::new();
        for name in expr.references() {
            match self.registry.lookup(&name) {
                Some(id) => inputs.push(id),
                None if matches!(name.as_str(), "pi" | "e" | "i") => {}
                None => return Err(name),
            }
        }
        Ok(inputs)
    }

    /// Record the macros `expr` invokes, once each.
    pub(crate) fn note_macros(&mut self, expr: &Expr, macros: &MacroLibrary) {
        for name in expr.calls() {
            if macros.contains(&name) && !self.used_macros.contains(&name) {
                self.used_macros.push(name);
            }
        }
    }

    /// Evaluate an algorithm and convert the result to its output kind.
    pub(crate) fn evaluate_algo(&self, algo_id: AlgoId, env: &EvalEnv<'_>) -> Result<GeoValue, ElementEvalError> {
        let Some(algo) = self.algos.get(&algo_id) else {
            return Err(ElementEvalError {
                label: algo_id.to_string(),
                error: EvalError::Unsupported("missing algorithm".to_string()),
            });
        };
        let Some(output) = algo.outputs.first().and_then(|id| self.geos.get(id)) else {
            return Err(ElementEvalError {
                label: algo_id.to_string(),
                error: EvalError::Unsupported("algorithm without output".to_string()),
            });
        };
        let fail = |error| ElementEvalError { label: output.label.clone(), error };
        let value = evaluate(&algo.expression, self, env).map_err(fail)?;
        let found = value.natural_kind();
        value
            .coerce_to(output.kind)
            .ok_or_else(|| fail(EvalError::KindMismatch { expected: output.kind, found }))
    }

    fn recompute(&mut self, algo_id: AlgoId, env: &EvalEnv<'_>) -> Result<Option<String>, ElementEvalError> {
        let value = self.evaluate_algo(algo_id, env)?;
        let output = self.algos.get(&algo_id).and_then(|a| a.outputs.first().copied());
        Ok(output.and_then(|id| self.geos.get_mut(&id)).map(|geo| {
            geo.value = value;
            geo.label.clone()
        }))
    }

    /// Re-evaluate every algorithm in construction order.
    pub(crate) fn update_all(&mut self, env: &EvalEnv<'_>) -> Result<(), ElementEvalError> {
        let algos: Vec<AlgoId> = self
            .list
            .iter()
            .filter_map(|e| match e {
                ConstructionElement::Algo(id) => Some(id),
                ConstructionElement::Geo(_) => None,
            })
            .collect();
        for algo_id in algos {
            self.recompute(algo_id, env)?;
        }
        Ok(())
    }

    /// Re-evaluate everything computed from `geo`, in construction order.
    ///
    /// Returns the labels of the updated elements.
    pub(crate) fn propagate_from(&mut self, geo: GeoId, env: &EvalEnv<'_>) -> Result<Vec<String>, ElementEvalError> {
        let mut algos: Vec<AlgoId> = self.graph.update_set(geo).into_iter().collect();
        algos.sort_by_key(|id| self.algos.get(id).map(|a| a.construction_index));
        let mut updated = Vec::with_capacity(algos.len());
        for algo_id in algos {
            if let Some(label) = self.recompute(algo_id, env)? {
                updated.push(label);
            }
        }
        Ok(updated)
    }

    /// Element records in construction order.
    pub(crate) fn records(&self) -> Vec<ElementRecord> {
        let mut records = Vec::with_capacity(self.geos.len());
        for element in self.list.iter() {
            match element {
                ConstructionElement::Geo(id) => {
                    if let Some(geo) = self.geos.get(&id) {
                        records.push(ElementRecord {
                            label: geo.label.clone(),
                            kind: geo.kind,
                            definition: geo.value.to_literal(),
                            style: geo.style.clone(),
                            auxiliary: geo.auxiliary,
                        });
                    }
                }
                ConstructionElement::Algo(id) => {
                    let Some(algo) = self.algos.get(&id) else {
                        continue;
                    };
                    for output in &algo.outputs {
                        if let Some(geo) = self.geos.get(output) {
                            records.push(ElementRecord {
                                label: geo.label.clone(),
                                kind: geo.kind,
                                definition: algo.expression.to_string(),
                                style: geo.style.clone(),
                                auxiliary: geo.auxiliary,
                            });
                        }
                    }
                }
            }
        }
        records
    }

    /// Definition text of an element: its expression, or its value literal.
    pub(crate) fn definition_of(&self, geo: &GeoElement) -> String {
        match geo.parent_algo.and_then(|id| self.algos.get(&id)) {
            Some(algo) => algo.expression.to_string(),
            None => geo.value.to_literal(),
        }
    }

    /// Every algorithm sits strictly after all of its inputs.
    pub fn is_topologically_ordered(&self) -> bool {
        self.algos.values().all(|algo| {
            algo.inputs.iter().all(|input| {
                self.geos
                    .get(input)
                    .is_some_and(|geo| geo.construction_index < algo.construction_index)
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::ConstructionDefaults;
    use crate::expr::parse;

    fn env_parts() -> (MacroLibrary, Arc<ConstructionDefaults>) {
        (MacroLibrary::new(), Arc::new(ConstructionDefaults::default()))
    }

    fn add_expr(state: &mut ConstructionState, label: &str, src: &str, env: &EvalEnv<'_>) -> GeoId {
        let expr = Arc::new(parse(src).unwrap());
        let inputs = state.resolve_inputs(&expr).unwrap();
        let value = evaluate(&expr, &*state, env).unwrap();
        let kind = value.natural_kind();
        state
            .add_dependent(label, kind, AlgoKind::Expression, expr, inputs, value, VisualStyle::default())
            .unwrap()
    }

    #[test]
    fn test_add_and_propagate() {
        let (macros, defaults) = env_parts();
        let env = EvalEnv::new(&macros, &defaults, 4);
        let mut state = ConstructionState::new();
        let a = state
            .add_independent("a", GeoKind::Numeric, GeoValue::Number(5.0), VisualStyle::default(), false)
            .unwrap();
        add_expr(&mut state, "b", "a + 1", &env);
        add_expr(&mut state, "c", "b * 2", &env);

        state.geos.get_mut(&a).unwrap().value = GeoValue::Number(10.0);
        let updated = state.propagate_from(a, &env).unwrap();
        assert_eq!(updated, vec!["b", "c"]);
        assert_eq!(state.lookup("c").unwrap().value(), &GeoValue::Number(22.0));
        assert!(state.is_topologically_ordered());
    }

    #[test]
    fn test_remove_cascades_and_reindexes() {
        let (macros, defaults) = env_parts();
        let env = EvalEnv::new(&macros, &defaults, 4);
        let mut state = ConstructionState::new();
        let a = state
            .add_independent("a", GeoKind::Numeric, GeoValue::Number(1.0), VisualStyle::default(), false)
            .unwrap();
        add_expr(&mut state, "b", "a + 1", &env);
        state
            .add_independent("z", GeoKind::Numeric, GeoValue::Number(3.0), VisualStyle::default(), false)
            .unwrap();

        let removed = state.remove_element(a);
        assert_eq!(removed, vec!["b", "a"]);
        assert_eq!(state.len(), 1);
        assert_eq!(state.lookup("z").unwrap().construction_index(), 0);
        assert!(state.registry.lookup("b").is_none());
    }

    #[test]
    fn test_records_follow_list_order() {
        let (macros, defaults) = env_parts();
        let env = EvalEnv::new(&macros, &defaults, 4);
        let mut state = ConstructionState::new();
        state
            .add_independent("A", GeoKind::Point, GeoValue::Point([1.0, 1.0]), VisualStyle::default(), false)
            .unwrap();
        add_expr(&mut state, "B", "A+(1,1)", &env);
        let records = state.records();
        assert_eq!(records[0].definition, "(1, 1)");
        assert_eq!(records[1].definition, "A + (1, 1)");
    }

    #[test]
    fn test_resolve_unknown_reference() {
        let state = ConstructionState::new();
        assert_eq!(state.resolve_inputs(&parse("pi * r").unwrap()), Err("r".to_string()));
        assert_eq!(state.resolve_inputs(&parse("pi * e").unwrap()), Ok(vec![]));
    }
}
