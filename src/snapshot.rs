//! Complete, self-contained descriptions of a construction.
//!
//! A [`ConstructionDocument`] lists every element as a textual record in
//! construction order. Redefinition edits a document (substituting one
//! definition, reordering predecessors) and rebuilds from it; undo entries
//! are encoded documents.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, VecDeque};

use crate::types::{GeoKind, Macro, VisualStyle};
use crate::CONSTRUCTION_SCHEMA_VERSION;

/// Error editing a document.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SnapshotError {
    /// No record has this label.
    #[error("Element not in snapshot: {0}")]
    UnknownElement(String),
    /// A definition would read the element it defines.
    #[error("Circular reference through {0}")]
    CircularReference(String),
}

/// One element of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    /// Element label.
    pub label: String,
    /// Element kind.
    pub kind: GeoKind,
    /// Defining expression; a literal for independent elements.
    pub definition: String,
    /// Visual style.
    #[serde(default)]
    pub style: VisualStyle,
    /// Whether the element was created implicitly.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub auxiliary: bool,
}

impl ElementRecord {
    /// Record with the default style.
    pub fn new(label: impl Into<String>, kind: GeoKind, definition: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            kind,
            definition: definition.into(),
            style: VisualStyle::default(),
            auxiliary: false,
        }
    }
}

/// Title and descriptive text of a construction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstructionInfo {
    /// Title.
    pub title: Option<String>,
    /// Author.
    pub author: Option<String>,
    /// Date, free-form.
    pub date: Option<String>,
    /// Text shown above and below the worksheet.
    pub worksheet_text: [Option<String>; 2],
}

impl ConstructionInfo {
    /// Whether every field is empty.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// A full construction as data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstructionDocument {
    /// Format version.
    pub schema_version: String,
    /// Title and descriptive text.
    #[serde(default)]
    pub info: ConstructionInfo,
    /// Construction step cursor, if set.
    #[serde(default)]
    pub step: Option<usize>,
    /// Definitions of the macros used by the elements.
    #[serde(default)]
    pub macros: Vec<Macro>,
    /// Element records in construction order.
    #[serde(default)]
    pub elements: Vec<ElementRecord>,
}

impl Default for ConstructionDocument {
    fn default() -> Self {
        Self {
            schema_version: CONSTRUCTION_SCHEMA_VERSION.to_string(),
            info: ConstructionInfo::default(),
            step: None,
            macros: Vec::new(),
            elements: Vec::new(),
        }
    }
}

impl ConstructionDocument {
    /// Create an empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Position of the record with this label.
    pub fn position(&self, label: &str) -> Option<usize> {
        self.elements.iter().position(|r| r.label == label)
    }

    /// Record with this label.
    pub fn record(&self, label: &str) -> Option<&ElementRecord> {
        self.elements.iter().find(|r| r.label == label)
    }

    /// Replace the definition (and kind) of an element, keeping its style.
    pub fn substitute(&mut self, label: &str, definition: &str, kind: GeoKind) -> Result<(), SnapshotError> {
        let record = self
            .elements
            .iter_mut()
            .find(|r| r.label == label)
            .ok_or_else(|| SnapshotError::UnknownElement(label.to_string()))?;
        record.definition = definition.to_string();
        record.kind = kind;
        record.auxiliary = false;
        Ok(())
    }

    /// Move every predecessor of `refs` that sits after `target` to just
    /// before it, keeping the relative order of the moved records.
    ///
    /// `refs_of` yields the labels a record's definition reads. Reaching
    /// `target` itself is a circular reference.
    pub fn move_predecessors_before<F>(
        &mut self,
        target: &str,
        refs: &[String],
        mut refs_of: F,
    ) -> Result<(), SnapshotError>
    where
        F: FnMut(&ElementRecord) -> Vec<String>,
    {
        let target_pos = self
            .position(target)
            .ok_or_else(|| SnapshotError::UnknownElement(target.to_string()))?;

        let mut moved: BTreeSet<usize> = BTreeSet::new();
        let mut queue: VecDeque<String> = refs.iter().cloned().collect();
        while let Some(label) = queue.pop_front() {
            if label == target {
                return Err(SnapshotError::CircularReference(target.to_string()));
            }
            let Some(pos) = self.position(&label) else {
                continue;
            };
            if pos > target_pos && moved.insert(pos) {
                queue.extend(refs_of(&self.elements[pos]));
            }
        }
        if moved.is_empty() {
            return Ok(());
        }

        let mut kept = Vec::with_capacity(self.elements.len());
        let mut lifted = Vec::with_capacity(moved.len());
        for (pos, record) in std::mem::take(&mut self.elements).into_iter().enumerate() {
            if moved.contains(&pos) {
                lifted.push(record);
            } else {
                kept.push(record);
            }
        }
        // Nothing before the target moved, so its position is unchanged.
        let tail = kept.split_off(target_pos);
        kept.extend(lifted);
        kept.extend(tail);
        self.elements = kept;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parse;

    fn doc(records: &[(&str, &str)]) -> ConstructionDocument {
        ConstructionDocument {
            elements: records
                .iter()
                .map(|(label, def)| ElementRecord::new(*label, GeoKind::Numeric, *def))
                .collect(),
            ..Default::default()
        }
    }

    fn refs(record: &ElementRecord) -> Vec<String> {
        parse(&record.definition).map(|e| e.references()).unwrap_or_default()
    }

    fn labels(doc: &ConstructionDocument) -> Vec<&str> {
        doc.elements.iter().map(|r| r.label.as_str()).collect()
    }

    #[test]
    fn test_substitute_keeps_style() {
        let mut d = doc(&[("a", "1")]);
        d.elements[0].style.layer = 4;
        d.substitute("a", "2", GeoKind::Numeric).unwrap();
        assert_eq!(d.elements[0].definition, "2");
        assert_eq!(d.elements[0].style.layer, 4);
        assert!(d.substitute("zz", "1", GeoKind::Numeric).is_err());
    }

    #[test]
    fn test_move_predecessors_keeps_relative_order() {
        // a depends on nothing; redefine a := d + c where c, d come after a
        let mut d = doc(&[("a", "1"), ("b", "a + 1"), ("x", "7"), ("c", "x * 2"), ("d", "5")]);
        d.move_predecessors_before("a", &["d".to_string(), "c".to_string()], refs).unwrap();
        assert_eq!(labels(&d), vec!["x", "c", "d", "a", "b"]);
    }

    #[test]
    fn test_move_detects_cycle() {
        let mut d = doc(&[("a", "1"), ("b", "a + 1")]);
        let err = d.move_predecessors_before("a", &["b".to_string()], refs).unwrap_err();
        assert_eq!(err, SnapshotError::CircularReference("a".to_string()));
    }

    #[test]
    fn test_move_ignores_earlier_predecessors() {
        let mut d = doc(&[("x", "1"), ("a", "2"), ("b", "a")]);
        d.move_predecessors_before("a", &["x".to_string()], refs).unwrap();
        assert_eq!(labels(&d), vec!["x", "a", "b"]);
    }
}
