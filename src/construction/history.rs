//! Undo, redo and rebuilding from snapshot text.

use std::time::Instant;
use tracing::{info, warn};

use super::{Construction, ConstructionError};
use crate::canonical::fingerprint;
use crate::expr::EvalEnv;
use crate::rebuild::{Operation, RebuildFailure};
use crate::snapshot::ConstructionDocument;
use crate::undo::UndoManager;

impl Construction {
    /// Start the history over from the current state.
    pub fn init_undo_info(&mut self) -> Result<(), ConstructionError> {
        let text = self.current_undo_xml()?;
        self.undo.init(text);
        Ok(())
    }

    /// Record the current state as an undo point.
    ///
    /// Returns `false` when undo is disabled.
    pub fn store_undo_info(&mut self) -> Result<bool, ConstructionError> {
        if !self.undo.is_enabled() {
            return Ok(false);
        }
        let text = self.current_undo_xml()?;
        Ok(self.undo.store(text))
    }

    /// Go back one undo point. Returns whether anything changed.
    ///
    /// The history cursor only moves when the rebuild succeeds.
    pub fn undo(&mut self) -> Result<bool, ConstructionError> {
        let Some(entry) = self.undo.peek_undo() else {
            return Ok(false);
        };
        let (text, stored_at) = (entry.snapshot.clone(), entry.stored_at);
        self.redefines = None;
        self.rebuild_text(&text, Operation::Undo)?;
        self.undo.step_back();
        info!(stored_at = %stored_at.to_rfc3339(), cursor = self.undo.cursor(), "undo");
        Ok(true)
    }

    /// Go forward one undo point. Returns whether anything changed.
    pub fn redo(&mut self) -> Result<bool, ConstructionError> {
        let Some(entry) = self.undo.peek_redo() else {
            return Ok(false);
        };
        let (text, stored_at) = (entry.snapshot.clone(), entry.stored_at);
        self.redefines = None;
        self.rebuild_text(&text, Operation::Redo)?;
        self.undo.step_forward();
        info!(stored_at = %stored_at.to_rfc3339(), cursor = self.undo.cursor(), "redo");
        Ok(true)
    }

    /// Whether `undo` would change anything.
    pub fn undo_possible(&self) -> bool {
        self.undo.undo_possible()
    }

    /// Whether `redo` would change anything.
    pub fn redo_possible(&self) -> bool {
        self.undo.redo_possible()
    }

    /// Rebuild from the current undo point, dropping unsaved changes.
    pub fn restore_current_undo_info(&mut self) -> Result<bool, ConstructionError> {
        let Some(entry) = self.undo.current() else {
            return Ok(false);
        };
        let text = entry.snapshot.clone();
        self.redefines = None;
        self.rebuild_text(&text, Operation::Restore)?;
        Ok(true)
    }

    /// Undo history.
    pub fn undo_manager(&self) -> &UndoManager {
        &self.undo
    }

    /// Replace the construction with the one described by `text`.
    ///
    /// The history is left alone.
    pub fn rebuild(&mut self, text: &str) -> Result<(), ConstructionError> {
        self.rebuild_text(text, Operation::Rebuild)
    }

    /// Load a construction and start a fresh history from it.
    pub fn load(&mut self, text: &str) -> Result<(), ConstructionError> {
        self.rebuild_text(text, Operation::Load)?;
        self.redefines = None;
        self.saved = None;
        self.init_undo_info()
    }

    pub(crate) fn rebuild_text(&mut self, text: &str, operation: Operation) -> Result<(), ConstructionError> {
        let doc = self.codec.decode(text).map_err(|e| {
            warn!(operation = %operation, error = %e, "cannot decode snapshot");
            RebuildFailure::document(e.to_string()).during(operation)
        })?;
        self.rebuild_document(doc, operation)?;
        info!(operation = %operation, fingerprint = %fingerprint(text), "restored snapshot");
        Ok(())
    }

    /// Build a state from `doc` and swap it in. On failure nothing changes.
    pub(crate) fn rebuild_document(
        &mut self,
        doc: ConstructionDocument,
        operation: Operation,
    ) -> Result<(), ConstructionError> {
        let start = Instant::now();
        let mut macros = self.macros.clone();
        macros.extend_missing(doc.macros.iter().cloned())?;

        let env = EvalEnv::new(&macros, &self.defaults, self.config.max_macro_depth);
        let state = self.engine.build(&doc, &env).map_err(|failure| {
            warn!(operation = %operation, error = %failure, "rebuild failed");
            failure.during(operation)
        })?;

        self.macros = macros;
        self.state = state;
        self.info = doc.info;
        self.step = self.clamp_step(doc.step);
        self.kernel.notify_reset();
        self.kernel.update_construction();
        info!(
            operation = %operation,
            elements = self.state.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "rebuilt construction"
        );
        Ok(())
    }
}
