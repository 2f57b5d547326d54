//! Label registry and derived ordering sets.
//!
//! The registry owns the label → element table together with every ordering
//! set the construction exposes. `register` and `unregister` keep all of them
//! in step, so a label is either in every structure or in none.

use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::types::{GeoId, GeoKind, LabelKey};

/// Registry error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// Another element already has this label.
    #[error("Duplicate label: {0}")]
    DuplicateLabel(String),
    /// Label is not a valid element name.
    #[error("Invalid label: {0}")]
    InvalidLabel(String),
}

#[derive(Debug, Clone)]
struct Entry {
    label: String,
    kind: GeoKind,
}

/// Label table plus ordering sets.
///
/// Uses BTreeMap/BTreeSet for deterministic iteration order.
#[derive(Debug, Clone, Default)]
pub struct ElementRegistry {
    /// Label -> element.
    table: BTreeMap<String, GeoId>,
    /// Element -> label and kind.
    entries: BTreeMap<GeoId, Entry>,
    /// Construction order, CAS cells excluded.
    cons_order: BTreeSet<GeoId>,
    /// Construction order, CAS cells included.
    cons_order_with_cas: BTreeSet<GeoId>,
    /// Natural label order.
    label_order: BTreeSet<LabelKey>,
    /// Per-kind label sets.
    by_kind: BTreeMap<GeoKind, BTreeSet<LabelKey>>,
}

impl ElementRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the element with this label.
    pub fn lookup(&self, label: &str) -> Option<GeoId> {
        self.table.get(label).copied()
    }

    /// Whether the label is taken.
    pub fn contains(&self, label: &str) -> bool {
        self.table.contains_key(label)
    }

    /// Register an element under `label`.
    pub fn register(&mut self, id: GeoId, label: &str, kind: GeoKind) -> Result<(), RegistryError> {
        if self.table.contains_key(label) {
            return Err(RegistryError::DuplicateLabel(label.to_string()));
        }
        self.table.insert(label.to_string(), id);
        self.entries.insert(id, Entry { label: label.to_string(), kind });
        self.cons_order_with_cas.insert(id);
        if kind != GeoKind::CasCell {
            self.cons_order.insert(id);
        }
        self.label_order.insert(LabelKey::new(label));
        self.by_kind.entry(kind).or_default().insert(LabelKey::new(label));
        debug!(label = %label, kind = %kind, "registered element");
        Ok(())
    }

    /// Remove `label` from the table and every ordering set. Unknown labels are ignored.
    pub fn unregister(&mut self, label: &str) {
        let Some(id) = self.table.remove(label) else {
            return;
        };
        let key = LabelKey::new(label);
        if let Some(entry) = self.entries.remove(&id) {
            if let Some(set) = self.by_kind.get_mut(&entry.kind) {
                set.remove(&key);
                if set.is_empty() {
                    self.by_kind.remove(&entry.kind);
                }
            }
        }
        self.cons_order.remove(&id);
        self.cons_order_with_cas.remove(&id);
        self.label_order.remove(&key);
        debug!(label = %label, "unregistered element");
    }

    /// Number of registered elements.
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Label of a registered element.
    pub fn label_of(&self, id: GeoId) -> Option<&str> {
        self.entries.get(&id).map(|e| e.label.as_str())
    }

    /// Elements in creation order, CAS cells excluded.
    pub fn construction_order(&self) -> impl Iterator<Item = GeoId> + '_ {
        self.cons_order.iter().copied()
    }

    /// Elements in creation order, CAS cells included.
    pub fn construction_order_with_cas(&self) -> impl Iterator<Item = GeoId> + '_ {
        self.cons_order_with_cas.iter().copied()
    }

    /// Labels in natural order.
    pub fn label_order(&self) -> impl Iterator<Item = &str> + '_ {
        self.label_order.iter().map(LabelKey::as_str)
    }

    /// Labels of one kind, in natural order.
    pub fn labels_of_kind(&self, kind: GeoKind) -> impl Iterator<Item = &str> + '_ {
        self.by_kind.get(&kind).into_iter().flatten().map(LabelKey::as_str)
    }

    /// Labels sorted by type name, then by natural label order.
    pub fn name_description_order(&self) -> Vec<&str> {
        let mut kinds: Vec<GeoKind> = self.by_kind.keys().copied().collect();
        kinds.sort_by_key(|k| k.type_name());
        kinds
            .into_iter()
            .flat_map(|kind| self.labels_of_kind(kind))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry(items: &[(&str, GeoKind)]) -> ElementRegistry {
        let mut reg = ElementRegistry::new();
        for (i, (label, kind)) in items.iter().enumerate() {
            reg.register(GeoId::new(i as u64), label, *kind).unwrap();
        }
        reg
    }

    #[test]
    fn test_duplicate_label_rejected() {
        let mut reg = registry(&[("a", GeoKind::Numeric)]);
        assert_eq!(
            reg.register(GeoId::new(9), "a", GeoKind::Point),
            Err(RegistryError::DuplicateLabel("a".to_string()))
        );
        assert_eq!(reg.lookup("a"), Some(GeoId::new(0)));
    }

    #[test]
    fn test_unregister_is_idempotent() {
        let mut reg = registry(&[("a", GeoKind::Numeric), ("B", GeoKind::Point)]);
        reg.unregister("a");
        reg.unregister("a");
        reg.unregister("nope");
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.label_order().collect::<Vec<_>>(), vec!["B"]);
        assert_eq!(reg.labels_of_kind(GeoKind::Numeric).count(), 0);
        assert_eq!(reg.construction_order().collect::<Vec<_>>(), vec![GeoId::new(1)]);
    }

    #[test]
    fn test_cas_cells_only_in_cas_order() {
        let reg = registry(&[("a", GeoKind::Numeric), ("$1", GeoKind::CasCell)]);
        assert_eq!(reg.construction_order().count(), 1);
        assert_eq!(reg.construction_order_with_cas().count(), 2);
    }

    #[test]
    fn test_name_description_order_independent_of_insertion() {
        let items = [
            ("b", GeoKind::Numeric),
            ("A_10", GeoKind::Point),
            ("a", GeoKind::Numeric),
            ("A_2", GeoKind::Point),
            ("t", GeoKind::Text),
            ("flag", GeoKind::Boolean),
        ];
        let forward = registry(&items);
        let mut reversed_items = items;
        reversed_items.reverse();
        let backward = registry(&reversed_items);

        let expected = vec!["flag", "a", "b", "A_2", "A_10", "t"];
        assert_eq!(forward.name_description_order(), expected);
        assert_eq!(backward.name_description_order(), expected);
    }
}
