//! Redefinition of existing elements.
//!
//! `replace` picks the cheapest path that keeps the construction consistent:
//!
//! 1. A definition reading the element itself is only accepted as an
//!    in-place value update of an independent element, and only when it
//!    reads nothing computed from that element.
//! 2. An element nothing depends on is substituted directly.
//! 3. A constant assigned to an independent element with dependents updates
//!    the value and propagates.
//! 4. Anything else edits a snapshot and rebuilds from it.
//!
//! In batch mode, paths 2 to 4 are buffered and applied by one rebuild on
//! [`Construction::commit`].

use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::{add_element, infer_kind, Construction, ConstructionError, Definition};
use crate::expr::{evaluate, EvalEnv, EvalError};
use crate::rebuild::{coerce, Operation};
use crate::snapshot::SnapshotError;
use crate::types::{GeoId, GeoKind, GeoValue};

/// What a successful `replace` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplaceOutcome {
    /// Value changed in place; dependents were updated.
    UpdatedInPlace,
    /// The element was recreated at the end of the construction.
    Substituted,
    /// The construction was rebuilt from a snapshot.
    Rebuilt,
    /// Buffered until `commit`.
    Deferred,
}

/// Kinds of independent element whose value may be updated in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndependentValueKind {
    /// Numeric.
    Number,
    /// Plane point.
    Point,
    /// Space point.
    Point3D,
    /// Plane vector.
    Vector,
    /// Boolean.
    Boolean,
}

impl IndependentValueKind {
    /// Update policy of an element kind; `None` when in-place updates are
    /// not allowed.
    pub fn from_geo_kind(kind: GeoKind) -> Option<Self> {
        match kind {
            GeoKind::Numeric => Some(Self::Number),
            GeoKind::Point => Some(Self::Point),
            GeoKind::Point3D => Some(Self::Point3D),
            GeoKind::Vector => Some(Self::Vector),
            GeoKind::Boolean => Some(Self::Boolean),
            GeoKind::Text | GeoKind::CasCell => None,
        }
    }

    /// Whether `value` can replace the current value. Points and vectors
    /// are interchangeable.
    pub fn accepts(&self, value: &GeoValue) -> bool {
        matches!(
            (self, value),
            (Self::Number, GeoValue::Number(_))
                | (Self::Point | Self::Vector, GeoValue::Point(_) | GeoValue::Vector(_))
                | (Self::Point3D, GeoValue::Point3D(_))
                | (Self::Boolean, GeoValue::Boolean(_))
        )
    }
}

/// A redefinition waiting for `commit`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PendingRedefine {
    pub definition: String,
    pub kind: GeoKind,
}

impl Construction {
    /// Redefine an element from definition text.
    pub fn replace(&mut self, label: &str, definition: &str) -> Result<ReplaceOutcome, ConstructionError> {
        let expr = self
            .engine
            .parse(definition)
            .map_err(|source| ConstructionError::Parse { label: label.to_string(), source });
        match expr {
            Ok(expr) => self.replace_definition(label, Definition { expr }),
            Err(e) => {
                self.abort_batch(label);
                Err(e)
            }
        }
    }

    /// Redefine an element.
    ///
    /// On error the construction is unchanged, and batch mode (if active)
    /// is left with its buffer discarded.
    pub fn replace_definition(
        &mut self,
        label: &str,
        definition: Definition,
    ) -> Result<ReplaceOutcome, ConstructionError> {
        let result = self.try_replace(label, definition);
        if result.is_err() {
            self.abort_batch(label);
        }
        result
    }

    fn abort_batch(&mut self, label: &str) {
        if let Some(buffer) = self.redefines.take() {
            warn!(label = %label, discarded = buffer.len(), "redefinition failed, leaving batch mode");
        }
    }

    /// Create the spreadsheet cells `definition` reads but that do not exist
    /// yet, then redefine. The cells are dropped again when that fails.
    fn try_replace(&mut self, label: &str, definition: Definition) -> Result<ReplaceOutcome, ConstructionError> {
        let cells = self.missing_cells(&definition.expr);
        if cells.is_empty() {
            return self.replace_resolved(label, definition);
        }
        let backup = self.state.clone();
        let mut staged = self.state.clone();
        self.add_cells(&mut staged, &cells)?;
        self.state = staged;
        match self.replace_resolved(label, definition) {
            Ok(outcome) => {
                if outcome != ReplaceOutcome::Rebuilt {
                    self.report_cells(&cells);
                }
                Ok(outcome)
            }
            Err(e) => {
                self.state = backup;
                Err(e)
            }
        }
    }

    fn replace_resolved(&mut self, label: &str, definition: Definition) -> Result<ReplaceOutcome, ConstructionError> {
        let op = Operation::Replace;
        let eval_error = |source| ConstructionError::Eval { label: label.to_string(), operation: op, source };
        let geo = self
            .state
            .lookup(label)
            .ok_or_else(|| ConstructionError::UnknownElement(label.to_string()))?;
        let (id, old_kind, independent) = (geo.id(), geo.kind(), geo.is_independent());
        let style = geo.style().clone();
        let expr = definition.expr;

        let inputs = self
            .state
            .resolve_inputs(&expr)
            .map_err(|name| eval_error(EvalError::UnknownLabel(name)))?;
        let env = EvalEnv::new(&self.macros, &self.defaults, self.config.max_macro_depth);
        let value = evaluate(&expr, &self.state, &env).map_err(eval_error)?;
        let policy = IndependentValueKind::from_geo_kind(old_kind);

        let reads_self = inputs.contains(&id);
        let reads_dependents = inputs
            .iter()
            .any(|input| *input != id && self.state.graph.depends_on(&[*input], id));
        if reads_self || reads_dependents {
            return match policy {
                Some(policy) if independent && !reads_dependents && policy.accepts(&value) => {
                    let value = coerce(value, old_kind).map_err(eval_error)?;
                    self.update_in_place(label, id, value, op)?;
                    Ok(ReplaceOutcome::UpdatedInPlace)
                }
                _ => Err(ConstructionError::CircularDefinition {
                    label: label.to_string(),
                    definition: expr.to_string(),
                }),
            };
        }

        let kind = if value.clone().coerce_to(old_kind).is_some() { old_kind } else { infer_kind(label, &value) };
        if let Some(buffer) = self.redefines.as_mut() {
            buffer.insert(label.to_string(), PendingRedefine { definition: expr.to_string(), kind });
            debug!(label = %label, pending = buffer.len(), "buffered redefinition");
            return Ok(ReplaceOutcome::Deferred);
        }

        if !self.state.graph.has_dependents(id) {
            let mut staged = self.state.clone();
            staged.remove_element(id);
            add_element(&mut staged, label, expr, Some(kind), Some(style), &env, op)?;
            self.state = staged;
            self.kernel.element_removed(label);
            self.kernel.element_added(label);
            debug!(label = %label, "substituted element");
            self.after_mutation()?;
            return Ok(ReplaceOutcome::Substituted);
        }

        if let Some(policy) = policy {
            if independent && expr.is_constant() && policy.accepts(&value) {
                let value = coerce(value, old_kind).map_err(eval_error)?;
                self.update_in_place(label, id, value, op)?;
                return Ok(ReplaceOutcome::UpdatedInPlace);
            }
        }

        let pending = [(label.to_string(), PendingRedefine { definition: expr.to_string(), kind })];
        self.redefine_with_rebuild(&pending, op)?;
        Ok(ReplaceOutcome::Rebuilt)
    }

    /// Set the value of an element and re-evaluate its dependents, all or
    /// nothing.
    pub(crate) fn update_in_place(
        &mut self,
        label: &str,
        id: GeoId,
        value: GeoValue,
        operation: Operation,
    ) -> Result<(), ConstructionError> {
        let env = EvalEnv::new(&self.macros, &self.defaults, self.config.max_macro_depth);
        let mut staged = self.state.clone();
        if let Some(geo) = staged.geos.get_mut(&id) {
            geo.value = value;
        }
        let updated = staged.propagate_from(id, &env).map_err(|e| ConstructionError::Eval {
            label: e.label,
            operation,
            source: e.error,
        })?;
        self.state = staged;
        self.kernel.element_updated(label);
        for dependent in &updated {
            self.kernel.element_updated(dependent);
        }
        debug!(label = %label, updated = updated.len(), "updated in place");
        self.after_mutation()
    }

    /// Substitute definitions in a snapshot, lift their predecessors ahead
    /// of them, rebuild and swap the result in.
    pub(crate) fn redefine_with_rebuild(
        &mut self,
        pending: &[(String, PendingRedefine)],
        operation: Operation,
    ) -> Result<(), ConstructionError> {
        let mut doc = self.snapshot();
        for (label, redefine) in pending {
            let expr = self
                .engine
                .parse(&redefine.definition)
                .map_err(|source| ConstructionError::Parse { label: label.clone(), source })?;
            let snapshot_error = |e| match e {
                SnapshotError::UnknownElement(name) => ConstructionError::UnknownElement(name),
                SnapshotError::CircularReference(_) => ConstructionError::CircularDefinition {
                    label: label.clone(),
                    definition: redefine.definition.clone(),
                },
            };
            doc.substitute(label, &redefine.definition, redefine.kind).map_err(snapshot_error)?;
            let engine = &mut self.engine;
            doc.move_predecessors_before(label, &expr.references(), |record| engine.references(record))
                .map_err(snapshot_error)?;
        }
        self.rebuild_document(doc, operation)?;
        self.after_mutation()
    }

    /// Start buffering redefinitions.
    pub fn start_collecting_redefines(&mut self) {
        if self.redefines.is_none() {
            self.redefines = Some(IndexMap::new());
            debug!("collecting redefinitions");
        }
    }

    /// Whether redefinitions are being buffered.
    pub fn is_collecting_redefines(&self) -> bool {
        self.redefines.is_some()
    }

    /// Buffered redefinitions as `(label, definition)`, in first-buffered
    /// order.
    pub fn pending_redefines(&self) -> Vec<(&str, &str)> {
        self.redefines
            .iter()
            .flatten()
            .map(|(label, pending)| (label.as_str(), pending.definition.as_str()))
            .collect()
    }

    /// Apply every buffered redefinition with a single rebuild and leave
    /// batch mode, whether the rebuild succeeds or not.
    ///
    /// Returns whether a rebuild ran; an empty buffer performs none.
    pub fn commit(&mut self) -> Result<bool, ConstructionError> {
        let Some(buffer) = self.redefines.take() else {
            return Ok(false);
        };
        if buffer.is_empty() {
            debug!("nothing to commit, leaving batch mode");
            return Ok(false);
        }
        let pending: Vec<(String, PendingRedefine)> = buffer.into_iter().collect();
        match self.redefine_with_rebuild(&pending, Operation::Commit) {
            Ok(()) => {
                info!(redefined = pending.len(), "committed redefinitions");
                Ok(true)
            }
            Err(e) => {
                warn!(error = %e, "commit failed, leaving batch mode");
                Err(e)
            }
        }
    }

    /// Leave batch mode, discarding anything not committed.
    pub fn stop_collecting_redefines(&mut self) {
        if let Some(buffer) = self.redefines.take() {
            if !buffer.is_empty() {
                debug!(discarded = buffer.len(), "stopped collecting redefinitions");
            }
        }
    }

    /// Change the input of a CAS cell and rebuild.
    pub fn change_cas_cell(&mut self, label: &str, input: &str) -> Result<(), ConstructionError> {
        let op = Operation::ChangeCasCell;
        let geo = self
            .state
            .lookup(label)
            .ok_or_else(|| ConstructionError::UnknownElement(label.to_string()))?;
        if geo.kind() != GeoKind::CasCell {
            return Err(ConstructionError::NotCasCell(label.to_string()));
        }
        let id = geo.id();
        let expr: Arc<_> = self
            .engine
            .parse(input)
            .map_err(|source| ConstructionError::Parse { label: label.to_string(), source })?;
        let inputs = self.state.resolve_inputs(&expr).map_err(|name| ConstructionError::Eval {
            label: label.to_string(),
            operation: op,
            source: EvalError::UnknownLabel(name),
        })?;
        if self.state.graph.depends_on(&inputs, id) {
            return Err(ConstructionError::CircularDefinition {
                label: label.to_string(),
                definition: expr.to_string(),
            });
        }
        let pending = [(
            label.to_string(),
            PendingRedefine { definition: expr.to_string(), kind: GeoKind::CasCell },
        )];
        self.redefine_with_rebuild(&pending, op)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConstructionConfig;
    use crate::kernel::{KernelEvent, RecordingKernel};

    fn recorded() -> (Construction, RecordingKernel) {
        let recorder = RecordingKernel::new();
        let c = Construction::with_kernel(ConstructionConfig::default(), Box::new(recorder.clone()));
        (c, recorder)
    }

    #[test]
    fn test_policy_is_exhaustive() {
        for kind in GeoKind::ALL {
            let policy = IndependentValueKind::from_geo_kind(kind);
            assert_eq!(policy.is_none(), matches!(kind, GeoKind::Text | GeoKind::CasCell));
        }
        assert!(IndependentValueKind::Point.accepts(&GeoValue::Vector([1.0, 0.0])));
        assert!(!IndependentValueKind::Number.accepts(&GeoValue::Boolean(true)));
    }

    #[test]
    fn test_constant_update_in_place() {
        let (mut c, recorder) = recorded();
        c.define("a", "5").unwrap();
        c.define("b", "a + 1").unwrap();
        assert_eq!(c.replace("a", "10").unwrap(), ReplaceOutcome::UpdatedInPlace);
        assert_eq!(c.value("b"), Some(&GeoValue::Number(11.0)));
        assert_eq!(recorder.resets(), 0);
        assert_eq!(c.construction_list(), vec!["a", "b"]);
    }

    #[test]
    fn test_self_update() {
        let mut c = Construction::new();
        c.define("a", "2").unwrap();
        c.define("b", "a * 3").unwrap();
        assert_eq!(c.replace("a", "a + 1").unwrap(), ReplaceOutcome::UpdatedInPlace);
        assert_eq!(c.value("a"), Some(&GeoValue::Number(3.0)));
        assert_eq!(c.value("b"), Some(&GeoValue::Number(9.0)));
    }

    #[test]
    fn test_circular_definition_rejected() {
        let mut c = Construction::new();
        c.define("a", "2").unwrap();
        c.define("b", "a + 1").unwrap();
        c.define("c", "b * 2").unwrap();
        let before = c.current_undo_xml().unwrap();
        let err = c.replace("b", "c + 1").unwrap_err();
        assert!(matches!(err, ConstructionError::CircularDefinition { .. }));
        assert_eq!(c.current_undo_xml().unwrap(), before);
    }

    #[test]
    fn test_cycle_through_dependent_rejected() {
        let mut c = Construction::new();
        c.define("A", "(1, 1)").unwrap();
        c.define("B", "A + (1, 1)").unwrap();
        let before = c.current_undo_xml().unwrap();
        let err = c.replace("A", "B - (1, 1)").unwrap_err();
        assert!(matches!(err, ConstructionError::CircularDefinition { .. }));
        assert_eq!(c.current_undo_xml().unwrap(), before);
    }

    #[test]
    fn test_text_self_update_rejected() {
        let mut c = Construction::new();
        c.define("t", "\"ab\"").unwrap();
        let err = c.replace("t", "t + \"c\"").unwrap_err();
        assert!(matches!(err, ConstructionError::CircularDefinition { .. }));
        assert_eq!(c.value("t"), Some(&GeoValue::Text("ab".to_string())));
    }

    #[test]
    fn test_substitution_without_dependents() {
        let (mut c, recorder) = recorded();
        c.define("a", "1").unwrap();
        c.define("b", "2").unwrap();
        let mut style = c.lookup("a").unwrap().style().clone();
        style.layer = 3;
        c.set_style("a", style).unwrap();
        assert_eq!(c.replace("a", "b * 4").unwrap(), ReplaceOutcome::Substituted);
        assert_eq!(c.construction_list(), vec!["b", "a"]);
        assert_eq!(c.value("a"), Some(&GeoValue::Number(8.0)));
        assert_eq!(c.lookup("a").unwrap().style().layer, 3);
        assert_eq!(recorder.resets(), 0);
    }

    #[test]
    fn test_rebuild_moves_predecessors() {
        let (mut c, recorder) = recorded();
        c.define("a", "1").unwrap();
        c.define("b", "a + 1").unwrap();
        c.define("x", "10").unwrap();
        assert_eq!(c.replace("a", "x * 2").unwrap(), ReplaceOutcome::Rebuilt);
        assert_eq!(c.construction_list(), vec!["x", "a", "b"]);
        assert_eq!(c.value("b"), Some(&GeoValue::Number(21.0)));
        assert!(c.state().is_topologically_ordered());
        assert_eq!(recorder.resets(), 1);
        assert_eq!(recorder.updates(), 1);
    }

    #[test]
    fn test_failed_rebuild_leaves_state() {
        let mut c = Construction::new();
        c.define("a", "1").unwrap();
        c.define("b", "a + 1").unwrap();
        c.define("t", "\"x\"").unwrap();
        let before = c.current_undo_xml().unwrap();
        assert!(c.replace("a", "t").is_err());
        assert_eq!(c.current_undo_xml().unwrap(), before);
    }

    #[test]
    fn test_batch_commit() {
        let (mut c, recorder) = recorded();
        c.define("a", "1").unwrap();
        c.define("b", "a + 1").unwrap();
        c.define("x", "5").unwrap();
        c.start_collecting_redefines();
        assert_eq!(c.replace("a", "x").unwrap(), ReplaceOutcome::Deferred);
        assert_eq!(c.replace("b", "a * 3").unwrap(), ReplaceOutcome::Deferred);
        assert_eq!(c.replace("a", "x + 1").unwrap(), ReplaceOutcome::Deferred);
        assert_eq!(c.pending_redefines(), vec![("a", "x + 1"), ("b", "a * 3")]);
        assert_eq!(c.value("b"), Some(&GeoValue::Number(2.0)));
        assert_eq!(recorder.resets(), 0);

        assert!(c.commit().unwrap());
        assert_eq!(recorder.resets(), 1);
        assert_eq!(c.value("b"), Some(&GeoValue::Number(18.0)));
        assert!(!c.is_collecting_redefines());
        assert!(!c.commit().unwrap());

        assert_eq!(c.replace("a", "x + 2").unwrap(), ReplaceOutcome::Rebuilt);
        assert_eq!(c.value("b"), Some(&GeoValue::Number(21.0)));
        assert_eq!(recorder.resets(), 2);
    }

    #[test]
    fn test_empty_commit_leaves_batch_mode() {
        let mut c = Construction::new();
        c.start_collecting_redefines();
        assert!(!c.commit().unwrap());
        assert!(!c.is_collecting_redefines());
    }

    #[test]
    fn test_replace_creates_spreadsheet_cells() {
        let (mut c, recorder) = recorded();
        c.define("a", "1").unwrap();
        assert_eq!(c.replace("a", "A1 + 1").unwrap(), ReplaceOutcome::Substituted);
        assert_eq!(c.construction_list(), vec!["A1", "a"]);
        assert!(c.lookup("A1").unwrap().is_auxiliary());
        assert_eq!(c.value("a"), Some(&GeoValue::Number(1.0)));
        assert!(recorder.events().contains(&KernelEvent::Added("A1".to_string())));
    }

    #[test]
    fn test_failed_replace_drops_new_cells() {
        let mut c = Construction::new();
        c.define("a", "1").unwrap();
        let before = c.current_undo_xml().unwrap();
        assert!(c.replace("a", "A1 + missing").is_err());
        assert!(!c.contains("A1"));
        assert_eq!(c.current_undo_xml().unwrap(), before);
    }

    #[test]
    fn test_batch_failure_leaves_batch_mode() {
        let mut c = Construction::new();
        c.define("a", "1").unwrap();
        c.define("b", "a + 1").unwrap();
        c.start_collecting_redefines();
        c.replace("b", "a * 2").unwrap();
        assert!(c.replace("a", "missing + 1").is_err());
        assert!(!c.is_collecting_redefines());
        assert_eq!(c.value("b"), Some(&GeoValue::Number(2.0)));
    }

    #[test]
    fn test_change_cas_cell() {
        let mut c = Construction::new();
        c.define("a", "2").unwrap();
        c.define_cas_cell("c", "a + 1").unwrap();
        c.define("d", "c * 2").unwrap();
        c.define("z", "7").unwrap();
        c.change_cas_cell("c", "z - a").unwrap();
        assert_eq!(c.value("d"), Some(&GeoValue::Number(10.0)));
        assert_eq!(c.construction_list(), vec!["a", "z", "c", "d"]);
        assert!(matches!(c.change_cas_cell("a", "1"), Err(ConstructionError::NotCasCell(_))));
        assert!(matches!(c.change_cas_cell("c", "d"), Err(ConstructionError::CircularDefinition { .. })));
    }
}
