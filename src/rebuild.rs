//! Building a construction state from a document.
//!
//! ## Atomicity
//!
//! A rebuild never touches the live construction. It builds a brand new
//! [`ConstructionState`] from the document records; only when every record
//! parsed, resolved and evaluated does the caller swap it in. Any failure
//! leaves the caller with its previous state.
//!
//! ## Ordering
//!
//! Records are built strictly in document order, so a record may only read
//! elements listed before it. A definition that reads a later element (or
//! itself, through a cycle) fails as an unknown reference.

use lru::LruCache;
use std::fmt;
use std::num::NonZeroUsize;
use std::sync::Arc;
use tracing::debug;

use crate::construction::state::ConstructionState;
use crate::expr::{evaluate, parse, EvalEnv, EvalError, Expr, ParseError};
use crate::registry::RegistryError;
use crate::snapshot::{ConstructionDocument, ElementRecord};
use crate::types::{AlgoKind, GeoKind, GeoValue, Macro};

/// Public operation during which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Defining a new element.
    Define,
    /// Redefining an element.
    Replace,
    /// Committing buffered redefinitions.
    Commit,
    /// Undo.
    Undo,
    /// Redo.
    Redo,
    /// Changing a CAS cell input.
    ChangeCasCell,
    /// Loading a document.
    Load,
    /// Restoring the current undo point.
    Restore,
    /// Rebuilding from snapshot text.
    Rebuild,
    /// Removing an element.
    Remove,
    /// Setting an independent value.
    SetValue,
}

impl Operation {
    /// Operation name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Define => "define",
            Self::Replace => "replace",
            Self::Commit => "commit",
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::ChangeCasCell => "change_cas_cell",
            Self::Load => "load",
            Self::Restore => "restore",
            Self::Rebuild => "rebuild",
            Self::Remove => "remove",
            Self::SetValue => "set_value",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rebuild that did not produce a state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Rebuild failed during {operation} at {}: {reason}", .element.as_deref().unwrap_or("<document>"))]
pub struct RebuildFailure {
    /// Operation that triggered the rebuild.
    pub operation: Operation,
    /// Element whose record failed, if any.
    pub element: Option<String>,
    /// What went wrong.
    pub reason: String,
}

impl RebuildFailure {
    /// Failure attributed to one element.
    pub fn at(element: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { operation: Operation::Rebuild, element: Some(element.into()), reason: reason.into() }
    }

    /// Failure of the document as a whole.
    pub fn document(reason: impl Into<String>) -> Self {
        Self { operation: Operation::Rebuild, element: None, reason: reason.into() }
    }

    /// Attribute the failure to a public operation.
    pub fn during(mut self, operation: Operation) -> Self {
        self.operation = operation;
        self
    }
}

/// Builds construction states, caching parsed definitions.
#[derive(Debug)]
pub struct RebuildEngine {
    cache: LruCache<String, Arc<Expr>>,
}

impl RebuildEngine {
    /// Create an engine caching up to `capacity` parsed definitions.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self { cache: LruCache::new(capacity) }
    }

    /// Parse definition text, reusing a cached tree when possible.
    pub fn parse(&mut self, src: &str) -> Result<Arc<Expr>, ParseError> {
        if let Some(expr) = self.cache.get(src) {
            return Ok(Arc::clone(expr));
        }
        let expr = Arc::new(parse(src)?);
        self.cache.put(src.to_string(), Arc::clone(&expr));
        Ok(expr)
    }

    /// Labels read by a record's definition. Unparseable records read nothing.
    pub fn references(&mut self, record: &ElementRecord) -> Vec<String> {
        self.parse(&record.definition).map(|e| e.references()).unwrap_or_default()
    }

    /// Number of cached definitions.
    pub fn cached(&self) -> usize {
        self.cache.len()
    }

    /// Build a fresh state from a document.
    pub fn build(&mut self, doc: &ConstructionDocument, env: &EvalEnv<'_>) -> Result<ConstructionState, RebuildFailure> {
        let state = build_records(&doc.elements, env, &mut |src| self.parse(src))?;
        debug!(elements = state.len(), cached = self.cache.len(), "built construction state");
        Ok(state)
    }
}

/// Why a single record could not be built.
#[derive(Debug, thiserror::Error)]
pub(crate) enum RecordError {
    #[error("cannot parse definition: {0}")]
    Parse(#[from] ParseError),
    #[error("unknown reference '{0}'")]
    UnknownReference(String),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// A record that could not be built.
#[derive(Debug)]
pub(crate) struct RecordFailure {
    pub label: String,
    pub error: RecordError,
}

impl From<RecordFailure> for RebuildFailure {
    fn from(failure: RecordFailure) -> Self {
        RebuildFailure::at(failure.label, failure.error.to_string())
    }
}

/// Build a state from records in order, then re-evaluate every algorithm.
pub(crate) fn build_records(
    records: &[ElementRecord],
    env: &EvalEnv<'_>,
    parse: &mut dyn FnMut(&str) -> Result<Arc<Expr>, ParseError>,
) -> Result<ConstructionState, RecordFailure> {
    let mut state = ConstructionState::new();
    for record in records {
        build_record(&mut state, record, env, parse).map_err(|error| RecordFailure {
            label: record.label.clone(),
            error,
        })?;
    }
    state.update_all(env).map_err(|e| RecordFailure {
        label: e.label,
        error: RecordError::Eval(e.error),
    })?;
    Ok(state)
}

fn build_record(
    state: &mut ConstructionState,
    record: &ElementRecord,
    env: &EvalEnv<'_>,
    parse: &mut dyn FnMut(&str) -> Result<Arc<Expr>, ParseError>,
) -> Result<(), RecordError> {
    let expr = parse(&record.definition)?;
    let inputs = state.resolve_inputs(&expr).map_err(RecordError::UnknownReference)?;
    let value = coerce(evaluate(&expr, &*state, env)?, record.kind)?;
    if record.kind != GeoKind::CasCell && expr.is_constant() {
        state.add_independent(&record.label, record.kind, value, record.style.clone(), record.auxiliary)?;
    } else {
        let algo_kind = if record.kind == GeoKind::CasCell { AlgoKind::CasCell } else { AlgoKind::Expression };
        state.add_dependent(
            &record.label,
            record.kind,
            algo_kind,
            Arc::clone(&expr),
            inputs,
            value,
            record.style.clone(),
        )?;
    }
    state.note_macros(&expr, env.macros);
    Ok(())
}

/// Convert a computed value to the kind of the element storing it.
pub(crate) fn coerce(value: GeoValue, kind: GeoKind) -> Result<GeoValue, EvalError> {
    let found = value.natural_kind();
    value.coerce_to(kind).ok_or(EvalError::KindMismatch { expected: kind, found })
}

/// Invoke a macro: build its body in a sub-construction with the inputs
/// bound to `args`, and return the output value.
pub(crate) fn run_macro(mac: &Macro, args: Vec<GeoValue>, env: &EvalEnv<'_>) -> Result<GeoValue, EvalError> {
    let nested = env.nested(env.macros);
    let mut records: Vec<ElementRecord> = mac
        .inputs
        .iter()
        .zip(args)
        .map(|(input, value)| {
            let kind = value.natural_kind();
            ElementRecord {
                label: input.clone(),
                kind,
                definition: value.to_literal(),
                style: env.defaults.style_for(kind),
                auxiliary: false,
            }
        })
        .collect();
    records.extend(mac.body.iter().cloned());

    let state = build_records(&records, &nested, &mut |src| parse(src).map(Arc::new)).map_err(|failure| {
        match failure.error {
            RecordError::Eval(EvalError::MacroRecursion(name)) => EvalError::MacroRecursion(name),
            error => EvalError::Macro {
                name: mac.name.clone(),
                reason: format!("{}: {}", failure.label, error),
            },
        }
    })?;
    state
        .lookup(&mac.output)
        .map(|geo| geo.value().clone())
        .ok_or_else(|| EvalError::Macro {
            name: mac.name.clone(),
            reason: format!("output '{}' not defined", mac.output),
        })
}
