//! The construction: elements, their dependency graph and their history.
//!
//! [`Construction`] owns one [`ConstructionState`] plus everything needed to
//! change it safely: the rebuild engine, the undo manager, the macro library,
//! the shared per-kind defaults and the kernel listener.
//!
//! ## Mutation paths
//!
//! - Incremental: `define`, `remove`, `set_value`, `set_style` and the cheap
//!   `replace` cases edit the state directly (or a staged clone of it) and
//!   report single elements to the listener.
//! - Rebuild: general redefinition, batch commit, CAS cell changes, undo,
//!   redo and load build a new state from a document and swap it in. The
//!   listener sees `notify_reset` then `update_construction`.
//!
//! Every path is all-or-nothing: on error the live state is unchanged.

pub mod state;
mod history;
mod redefine;

use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::canonical::{fingerprint, SnapshotFingerprint};
use crate::codec::{CodecError, SnapshotCodec};
use crate::config::ConstructionConfig;
use crate::defaults::ConstructionDefaults;
use crate::expr::{evaluate, parse_command, EvalEnv, EvalError, Expr, ParseError};
use crate::kernel::{KernelListener, NoOpKernel};
use crate::rebuild::{coerce, Operation, RebuildEngine, RebuildFailure};
use crate::registry::RegistryError;
use crate::snapshot::{ConstructionDocument, ConstructionInfo};
use crate::types::{
    is_reserved_label, is_spreadsheet_cell, is_valid_label, AlgoKind, GeoElement, GeoId, GeoKind,
    GeoValue, Macro, MacroError, MacroLibrary, VisualStyle,
};
use crate::undo::UndoManager;
use crate::CONSTRUCTION_SCHEMA_VERSION;

pub use redefine::{IndependentValueKind, ReplaceOutcome};
pub use state::ConstructionState;

use redefine::PendingRedefine;

/// Construction error.
#[derive(Debug, thiserror::Error)]
pub enum ConstructionError {
    /// Another element already has this label.
    #[error("Duplicate label: {0}")]
    DuplicateLabel(String),
    /// Label cannot name an element.
    #[error("Invalid label: {0}")]
    InvalidLabel(String),
    /// The new definition depends on the element it redefines.
    #[error("Circular definition: {label} = {definition}")]
    CircularDefinition {
        /// Element being redefined.
        label: String,
        /// Rejected definition.
        definition: String,
    },
    /// Rebuild did not produce a state.
    #[error(transparent)]
    Rebuild(#[from] RebuildFailure),
    /// No element has this label.
    #[error("Element not found: {0}")]
    UnknownElement(String),
    /// Element is not a CAS cell.
    #[error("Not a CAS cell: {0}")]
    NotCasCell(String),
    /// Element has a generating algorithm.
    #[error("Not an independent element: {0}")]
    NotIndependent(String),
    /// Definition text does not parse.
    #[error("Cannot parse definition of {label}: {source}")]
    Parse {
        /// Element being defined.
        label: String,
        /// Syntax error.
        source: ParseError,
    },
    /// Definition does not evaluate.
    #[error("{operation} failed at {label}: {source}")]
    Eval {
        /// Element whose evaluation failed.
        label: String,
        /// Operation in progress.
        operation: Operation,
        /// Evaluation error.
        source: EvalError,
    },
    /// Snapshot text could not be produced or read.
    #[error(transparent)]
    Codec(#[from] CodecError),
    /// Macro definition rejected.
    #[error(transparent)]
    InvalidMacro(#[from] MacroError),
}

impl From<RegistryError> for ConstructionError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::DuplicateLabel(label) => Self::DuplicateLabel(label),
            RegistryError::InvalidLabel(label) => Self::InvalidLabel(label),
        }
    }
}

/// A parsed defining expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    expr: Arc<Expr>,
}

impl Definition {
    /// Wrap an expression.
    pub fn from_expr(expr: Expr) -> Self {
        Self { expr: Arc::new(expr) }
    }

    /// The expression.
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Canonical definition text.
    pub fn source(&self) -> String {
        self.expr.to_string()
    }
}

/// Kind of a new element holding `value`.
///
/// Plane tuples are vectors when the label starts with a lowercase letter
/// and points otherwise.
pub fn infer_kind(label: &str, value: &GeoValue) -> GeoKind {
    match value {
        GeoValue::Point(_) | GeoValue::Vector(_) => {
            if label.chars().next().is_some_and(char::is_lowercase) {
                GeoKind::Vector
            } else {
                GeoKind::Point
            }
        }
        other => other.natural_kind(),
    }
}

/// Add one element to `state`, computing its value first.
///
/// Nothing is added when resolution, evaluation or registration fails.
pub(crate) fn add_element(
    state: &mut ConstructionState,
    label: &str,
    expr: Arc<Expr>,
    kind: Option<GeoKind>,
    style: Option<VisualStyle>,
    env: &EvalEnv<'_>,
    operation: Operation,
) -> Result<GeoId, ConstructionError> {
    let eval_error = |source| ConstructionError::Eval { label: label.to_string(), operation, source };
    if state.registry.contains(label) {
        return Err(ConstructionError::DuplicateLabel(label.to_string()));
    }
    let inputs = state
        .resolve_inputs(&expr)
        .map_err(|name| eval_error(EvalError::UnknownLabel(name)))?;
    let value = evaluate(&expr, &*state, env).map_err(eval_error)?;
    let kind = kind.unwrap_or_else(|| infer_kind(label, &value));
    let value = coerce(value, kind).map_err(eval_error)?;
    let style = style.unwrap_or_else(|| env.defaults.style_for(kind));

    let id = if kind != GeoKind::CasCell && expr.is_constant() {
        state.add_independent(label, kind, value, style, false)?
    } else {
        let algo_kind = if kind == GeoKind::CasCell { AlgoKind::CasCell } else { AlgoKind::Expression };
        state.add_dependent(label, kind, algo_kind, Arc::clone(&expr), inputs, value, style)?
    };
    state.note_macros(&expr, env.macros);
    Ok(id)
}

/// A dynamic-geometry construction.
pub struct Construction {
    state: ConstructionState,
    undo: UndoManager,
    engine: RebuildEngine,
    defaults: Arc<ConstructionDefaults>,
    macros: MacroLibrary,
    kernel: Box<dyn KernelListener>,
    codec: Box<dyn SnapshotCodec>,
    config: ConstructionConfig,
    info: ConstructionInfo,
    step: Option<usize>,
    redefines: Option<IndexMap<String, PendingRedefine>>,
    saved: Option<SnapshotFingerprint>,
}

impl fmt::Debug for Construction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Construction")
            .field("elements", &self.state.len())
            .field("undo_entries", &self.undo.len())
            .field("codec", &self.codec.name())
            .field("collecting_redefines", &self.redefines.is_some())
            .finish()
    }
}

impl Default for Construction {
    fn default() -> Self {
        Self::new()
    }
}

impl Construction {
    /// Create an empty construction with the default configuration.
    pub fn new() -> Self {
        Self::with_config(ConstructionConfig::default())
    }

    /// Create an empty construction.
    pub fn with_config(config: ConstructionConfig) -> Self {
        Self::with_kernel(config, Box::new(NoOpKernel))
    }

    /// Create an empty construction reporting to `kernel`.
    pub fn with_kernel(config: ConstructionConfig, kernel: Box<dyn KernelListener>) -> Self {
        Self::build(config, kernel, Arc::new(ConstructionDefaults::default()), MacroLibrary::new())
    }

    fn build(
        config: ConstructionConfig,
        kernel: Box<dyn KernelListener>,
        defaults: Arc<ConstructionDefaults>,
        macros: MacroLibrary,
    ) -> Self {
        let mut construction = Self {
            state: ConstructionState::new(),
            undo: UndoManager::new(config.max_undo_depth, config.undo_enabled),
            engine: RebuildEngine::new(config.parse_cache_capacity),
            defaults,
            macros,
            kernel,
            codec: config.codec.build(),
            config,
            info: ConstructionInfo::default(),
            step: None,
            redefines: None,
            saved: None,
        };
        if let Err(e) = construction.init_undo_info() {
            warn!(error = %e, "could not record initial undo point");
        }
        construction
    }

    /// Create an empty construction sharing this one's defaults and macros.
    pub fn new_child(&self) -> Self {
        Self::build(
            self.config.clone(),
            Box::new(NoOpKernel),
            Arc::clone(&self.defaults),
            self.macros.clone(),
        )
    }

    /// Replace the kernel listener.
    pub fn set_kernel(&mut self, kernel: Box<dyn KernelListener>) {
        self.kernel = kernel;
    }

    /// Configuration in effect.
    pub fn config(&self) -> &ConstructionConfig {
        &self.config
    }

    /// Shared per-kind defaults.
    pub fn defaults(&self) -> &Arc<ConstructionDefaults> {
        &self.defaults
    }

    /// Change the default style of a kind. Constructions sharing the
    /// defaults keep the old ones.
    pub fn set_default_style(&mut self, kind: GeoKind, style: VisualStyle) {
        Arc::make_mut(&mut self.defaults).set_style(kind, style);
    }

    /// The element graph.
    pub fn state(&self) -> &ConstructionState {
        &self.state
    }

    // ── Defining elements ────────────────────────────────────────────────

    fn check_new_label(&self, label: &str) -> Result<(), ConstructionError> {
        if !is_valid_label(label) || is_reserved_label(label) {
            return Err(ConstructionError::InvalidLabel(label.to_string()));
        }
        if self.state.registry.contains(label) {
            return Err(ConstructionError::DuplicateLabel(label.to_string()));
        }
        Ok(())
    }

    fn parse_for(&mut self, label: &str, src: &str) -> Result<Arc<Expr>, ConstructionError> {
        self.engine.parse(src).map_err(|source| ConstructionError::Parse { label: label.to_string(), source })
    }

    /// Define a new element `label = definition`.
    ///
    /// Referenced spreadsheet cells that do not exist yet are created first
    /// as auxiliary numbers with value 0.
    pub fn define(&mut self, label: &str, definition: &str) -> Result<GeoId, ConstructionError> {
        self.check_new_label(label)?;
        let expr = self.parse_for(label, definition)?;
        self.define_expr(label, expr, None)
    }

    /// Define a new CAS cell with the given input.
    pub fn define_cas_cell(&mut self, label: &str, input: &str) -> Result<GeoId, ConstructionError> {
        self.check_new_label(label)?;
        let expr = self.parse_for(label, input)?;
        self.define_expr(label, expr, Some(GeoKind::CasCell))
    }

    /// Spreadsheet cells read by `expr` that do not exist yet.
    pub(crate) fn missing_cells(&self, expr: &Expr) -> Vec<String> {
        expr.references()
            .into_iter()
            .filter(|name| is_spreadsheet_cell(name) && !self.state.registry.contains(name))
            .collect()
    }

    /// Add `cells` to `state` as auxiliary numbers with value 0.
    pub(crate) fn add_cells(&self, state: &mut ConstructionState, cells: &[String]) -> Result<(), ConstructionError> {
        for cell in cells {
            let style = self.defaults.style_for(GeoKind::Numeric);
            state.add_independent(cell, GeoKind::Numeric, GeoValue::Number(0.0), style, true)?;
        }
        Ok(())
    }

    pub(crate) fn report_cells(&mut self, cells: &[String]) {
        for cell in cells {
            debug!(label = %cell, "auto-created spreadsheet cell");
            self.kernel.element_added(cell);
        }
    }

    fn define_expr(
        &mut self,
        label: &str,
        expr: Arc<Expr>,
        kind: Option<GeoKind>,
    ) -> Result<GeoId, ConstructionError> {
        let cells = self.missing_cells(&expr);
        let env = EvalEnv::new(&self.macros, &self.defaults, self.config.max_macro_depth);
        let id = if cells.is_empty() {
            add_element(&mut self.state, label, expr, kind, None, &env, Operation::Define)?
        } else {
            let mut staged = self.state.clone();
            self.add_cells(&mut staged, &cells)?;
            let id = add_element(&mut staged, label, expr, kind, None, &env, Operation::Define)?;
            self.state = staged;
            self.report_cells(&cells);
            id
        };
        self.kernel.element_added(label);
        debug!(label = %label, "defined element");
        self.after_mutation()?;
        Ok(id)
    }

    /// Run a command `label = expression`, or a bare expression.
    ///
    /// An existing label is redefined; a bare expression gets a free label.
    /// Returns the label of the affected element.
    pub fn eval_command(&mut self, command: &str) -> Result<String, ConstructionError> {
        let (label, expr) = parse_command(command).map_err(|source| ConstructionError::Parse {
            label: command.trim().to_string(),
            source,
        })?;
        match label {
            Some(label) if self.state.registry.contains(&label) => {
                self.replace_definition(&label, Definition::from_expr(expr))?;
                Ok(label)
            }
            Some(label) => {
                self.check_new_label(&label)?;
                self.define_expr(&label, Arc::new(expr), None)?;
                Ok(label)
            }
            None => {
                let env = EvalEnv::new(&self.macros, &self.defaults, self.config.max_macro_depth);
                let value = evaluate(&expr, &self.state, &env).map_err(|source| ConstructionError::Eval {
                    label: command.trim().to_string(),
                    operation: Operation::Define,
                    source,
                })?;
                let label = self.free_label(&value);
                self.define_expr(&label, Arc::new(expr), None)?;
                Ok(label)
            }
        }
    }

    fn free_label(&self, value: &GeoValue) -> String {
        let (letters, fallback): (Vec<char>, &str) = match value {
            GeoValue::Point(_) | GeoValue::Point3D(_) => (('A'..='Z').collect(), "A"),
            GeoValue::Text(_) => (Vec::new(), "text"),
            _ => (('a'..='z').filter(|c| !matches!(c, 'e' | 'i')).collect(), "a"),
        };
        let taken = |label: &str| self.state.registry.contains(label) || is_spreadsheet_cell(label);
        if let Some(c) = letters.iter().map(|c| c.to_string()).find(|l| !taken(l)) {
            return c;
        }
        (1..)
            .map(|n| if letters.is_empty() { format!("{}{}", fallback, n) } else { format!("{}_{{{}}}", fallback, n) })
            .find(|l| !taken(l))
            .unwrap_or_else(|| fallback.to_string())
    }

    // ── Queries ──────────────────────────────────────────────────────────

    /// Element with this label.
    pub fn lookup(&self, label: &str) -> Option<&GeoElement> {
        self.state.lookup(label)
    }

    /// Current value of an element.
    pub fn value(&self, label: &str) -> Option<&GeoValue> {
        self.lookup(label).map(GeoElement::value)
    }

    /// Element by id.
    pub fn element(&self, id: GeoId) -> Option<&GeoElement> {
        self.state.geo(id)
    }

    /// Definition text of an element.
    pub fn definition(&self, label: &str) -> Option<String> {
        self.lookup(label).map(|geo| self.state.definition_of(geo))
    }

    /// Construction index of an element.
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.lookup(label).map(GeoElement::construction_index)
    }

    /// Whether `label` names an element.
    pub fn contains(&self, label: &str) -> bool {
        self.state.registry.contains(label)
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    /// Whether the construction has no elements.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }

    /// Labels in construction list order.
    pub fn construction_list(&self) -> Vec<String> {
        self.state.records().into_iter().map(|r| r.label).collect()
    }

    /// Labels in creation order, CAS cells excluded.
    pub fn construction_order(&self) -> Vec<&str> {
        self.state
            .registry
            .construction_order()
            .filter_map(|id| self.state.registry.label_of(id))
            .collect()
    }

    /// Labels sorted by type name, then label.
    pub fn name_description_order(&self) -> Vec<&str> {
        self.state.registry.name_description_order()
    }

    /// Labels in natural order.
    pub fn label_order(&self) -> Vec<&str> {
        self.state.registry.label_order().collect()
    }

    /// Labels of one kind, in natural order.
    pub fn elements_of_kind(&self, kind: GeoKind) -> Vec<&str> {
        self.state.registry.labels_of_kind(kind).collect()
    }

    /// Labels of the CAS cells, in creation order.
    pub fn cas_cells(&self) -> Vec<&str> {
        self.state
            .registry
            .construction_order_with_cas()
            .filter_map(|id| self.state.geo(id))
            .filter(|geo| geo.kind() == GeoKind::CasCell)
            .map(GeoElement::label)
            .collect()
    }

    // ── Direct mutations ─────────────────────────────────────────────────

    /// Remove an element and everything computed from it.
    ///
    /// Removing an unknown label is a no-op. Returns the removed labels.
    pub fn remove(&mut self, label: &str) -> Result<Vec<String>, ConstructionError> {
        let Some(id) = self.state.registry.lookup(label) else {
            return Ok(Vec::new());
        };
        let removed = self.state.remove_element(id);
        if let Some(buffer) = self.redefines.as_mut() {
            buffer.retain(|pending, _| !removed.contains(pending));
        }
        for gone in &removed {
            self.kernel.element_removed(gone);
        }
        debug!(label = %label, removed = removed.len(), "removed element");
        self.after_mutation()?;
        Ok(removed)
    }

    /// Set the value of an independent element and update its dependents.
    pub fn set_value(&mut self, label: &str, value: GeoValue) -> Result<(), ConstructionError> {
        let geo = self.lookup(label).ok_or_else(|| ConstructionError::UnknownElement(label.to_string()))?;
        if !geo.is_independent() {
            return Err(ConstructionError::NotIndependent(label.to_string()));
        }
        let (id, kind) = (geo.id(), geo.kind());
        let value = coerce(value, kind).map_err(|source| ConstructionError::Eval {
            label: label.to_string(),
            operation: Operation::SetValue,
            source,
        })?;
        self.update_in_place(label, id, value, Operation::SetValue)
    }

    /// Change the visual style of an element.
    pub fn set_style(&mut self, label: &str, style: VisualStyle) -> Result<(), ConstructionError> {
        let id = self
            .state
            .registry
            .lookup(label)
            .ok_or_else(|| ConstructionError::UnknownElement(label.to_string()))?;
        if let Some(geo) = self.state.geos.get_mut(&id) {
            geo.style = style;
        }
        self.kernel.element_updated(label);
        self.after_mutation()
    }

    /// Empty the construction, keeping configuration, macros and history.
    pub fn clear_construction(&mut self) {
        self.state = ConstructionState::new();
        self.info = ConstructionInfo::default();
        self.step = None;
        self.redefines = None;
        self.kernel.notify_reset();
        debug!("cleared construction");
    }

    // ── Snapshots ────────────────────────────────────────────────────────

    /// The construction as a document.
    pub fn snapshot(&self) -> ConstructionDocument {
        ConstructionDocument {
            schema_version: CONSTRUCTION_SCHEMA_VERSION.to_string(),
            info: self.info.clone(),
            step: self.step,
            macros: self
                .state
                .used_macros
                .iter()
                .filter_map(|name| self.macros.get(name))
                .map(|mac| Macro::clone(mac))
                .collect(),
            elements: self.state.records(),
        }
    }

    /// The construction as snapshot text in the configured codec.
    pub fn current_undo_xml(&self) -> Result<String, ConstructionError> {
        Ok(self.codec.encode(&self.snapshot())?)
    }

    /// Fingerprint of the current snapshot text.
    pub fn fingerprint(&self) -> Result<SnapshotFingerprint, ConstructionError> {
        Ok(fingerprint(&self.current_undo_xml()?))
    }

    // ── Info, steps, saved state ─────────────────────────────────────────

    /// Title and descriptive text.
    pub fn info(&self) -> &ConstructionInfo {
        &self.info
    }

    /// Replace title and descriptive text.
    pub fn set_info(&mut self, info: ConstructionInfo) {
        self.info = info;
    }

    /// Construction step cursor; `None` shows everything.
    pub fn construction_step(&self) -> Option<usize> {
        self.step
    }

    /// Move the step cursor, clamped to the last list position. An empty
    /// construction has no step.
    pub fn set_construction_step(&mut self, step: Option<usize>) {
        self.step = self.clamp_step(step);
    }

    fn clamp_step(&self, step: Option<usize>) -> Option<usize> {
        let last = self.state.list.len().checked_sub(1)?;
        step.map(|s| s.min(last))
    }

    /// Whether an element is shown at the current construction step.
    pub fn is_visible_at_step(&self, label: &str) -> bool {
        match (self.step, self.lookup(label)) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(step), Some(geo)) => geo.construction_index() <= step,
        }
    }

    /// Remember the current state as saved.
    pub fn mark_saved(&mut self) -> Result<(), ConstructionError> {
        self.saved = Some(self.fingerprint()?);
        Ok(())
    }

    /// Whether the construction matches the state last marked saved.
    pub fn is_saved(&self) -> bool {
        match (self.saved, self.fingerprint()) {
            (Some(saved), Ok(current)) => saved == current,
            _ => false,
        }
    }

    // ── Macros ───────────────────────────────────────────────────────────

    /// Add a macro to the library.
    pub fn register_macro(&mut self, mac: Macro) -> Result<(), ConstructionError> {
        Ok(self.macros.register(mac)?)
    }

    /// Macro library.
    pub fn macros(&self) -> &MacroLibrary {
        &self.macros
    }

    /// Names of the macros used by element definitions, in first-use order.
    pub fn used_macros(&self) -> &[String] {
        &self.state.used_macros
    }

    fn after_mutation(&mut self) -> Result<(), ConstructionError> {
        if self.config.auto_store_undo {
            self.store_undo_info()?;
        }
        Ok(())
    }
}
