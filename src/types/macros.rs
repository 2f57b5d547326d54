//! User-defined macros: reusable commands with their own body construction.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use super::label::is_valid_label;
use crate::snapshot::ElementRecord;

/// Reason a macro definition is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MacroError {
    /// Name is not a valid command name.
    #[error("Invalid macro name: {0}")]
    InvalidName(String),
    /// An input label appears twice.
    #[error("Duplicate macro input: {0}")]
    DuplicateInput(String),
    /// The body redefines an input.
    #[error("Macro body redefines input: {0}")]
    InputRedefined(String),
    /// The output is neither an input nor defined by the body.
    #[error("Macro output not defined: {0}")]
    MissingOutput(String),
}

/// A reusable command.
///
/// Invoking `name(args...)` binds `inputs` to the argument values, builds
/// `body` in a sub-construction and returns the value of `output`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Macro {
    /// Command name.
    pub name: String,
    /// Input labels, in argument order.
    pub inputs: Vec<String>,
    /// Label of the body element whose value is returned.
    pub output: String,
    /// Body records, in construction order.
    pub body: Vec<ElementRecord>,
}

impl Macro {
    /// Check the definition is self-consistent.
    pub fn validate(&self) -> Result<(), MacroError> {
        if !is_valid_label(&self.name) || self.name.starts_with('$') {
            return Err(MacroError::InvalidName(self.name.clone()));
        }
        let mut inputs = BTreeSet::new();
        for input in &self.inputs {
            if !inputs.insert(input.as_str()) {
                return Err(MacroError::DuplicateInput(input.clone()));
            }
        }
        if let Some(record) = self.body.iter().find(|r| inputs.contains(r.label.as_str())) {
            return Err(MacroError::InputRedefined(record.label.clone()));
        }
        let defined = inputs.contains(self.output.as_str())
            || self.body.iter().any(|r| r.label == self.output);
        if !defined {
            return Err(MacroError::MissingOutput(self.output.clone()));
        }
        Ok(())
    }
}

/// Macros known to a construction, by name.
#[derive(Debug, Clone, Default)]
pub struct MacroLibrary {
    macros: BTreeMap<String, Arc<Macro>>,
}

impl MacroLibrary {
    /// Create an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and add a macro, replacing any macro of the same name.
    pub fn register(&mut self, mac: Macro) -> Result<(), MacroError> {
        mac.validate()?;
        self.macros.insert(mac.name.clone(), Arc::new(mac));
        Ok(())
    }

    /// Look up a macro by name.
    pub fn get(&self, name: &str) -> Option<&Arc<Macro>> {
        self.macros.get(name)
    }

    /// Whether a macro with this name exists.
    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// Macro names, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.macros.keys().map(String::as_str)
    }

    /// Number of macros.
    pub fn len(&self) -> usize {
        self.macros.len()
    }

    /// Whether the library is empty.
    pub fn is_empty(&self) -> bool {
        self.macros.is_empty()
    }

    /// Add macros whose names are not yet known. Existing entries win.
    pub fn extend_missing<I>(&mut self, macros: I) -> Result<(), MacroError>
    where
        I: IntoIterator<Item = Macro>,
    {
        for mac in macros {
            if !self.contains(&mac.name) {
                self.register(mac)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GeoKind;

    fn midpoint() -> Macro {
        Macro {
            name: "Midpoint".to_string(),
            inputs: vec!["P".to_string(), "Q".to_string()],
            output: "M".to_string(),
            body: vec![ElementRecord::new("M", GeoKind::Point, "(P + Q) / 2")],
        }
    }

    #[test]
    fn test_register_and_get() {
        let mut lib = MacroLibrary::new();
        lib.register(midpoint()).unwrap();
        assert!(lib.contains("Midpoint"));
        assert_eq!(lib.get("Midpoint").unwrap().inputs.len(), 2);
    }

    #[test]
    fn test_rejects_missing_output() {
        let mut mac = midpoint();
        mac.output = "N".to_string();
        assert_eq!(mac.validate(), Err(MacroError::MissingOutput("N".to_string())));
    }

    #[test]
    fn test_rejects_redefined_input() {
        let mut mac = midpoint();
        mac.body.push(ElementRecord::new("P", GeoKind::Point, "(0, 0)"));
        assert_eq!(mac.validate(), Err(MacroError::InputRedefined("P".to_string())));
    }

    #[test]
    fn test_extend_missing_keeps_existing() {
        let mut lib = MacroLibrary::new();
        lib.register(midpoint()).unwrap();
        let mut other = midpoint();
        other.output = "P".to_string();
        lib.extend_missing(vec![other]).unwrap();
        assert_eq!(lib.get("Midpoint").unwrap().output, "M");
    }
}
