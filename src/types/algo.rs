//! Algorithms computing dependent elements.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::geo::GeoId;
use crate::expr::Expr;

/// Identifier of an AlgoElement inside one construction state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AlgoId(u64);

impl AlgoId {
    /// Create an AlgoId from its raw value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for AlgoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "algo#{}", self.0)
    }
}

/// What an algorithm computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlgoKind {
    /// Evaluates a defining expression.
    Expression,
    /// Evaluates the input of a CAS cell. Present even with no inputs.
    CasCell,
}

/// A node computing output elements from input elements.
#[derive(Debug, Clone)]
pub struct AlgoElement {
    pub(crate) id: AlgoId,
    pub(crate) kind: AlgoKind,
    pub(crate) expression: Arc<Expr>,
    pub(crate) inputs: Vec<GeoId>,
    pub(crate) outputs: Vec<GeoId>,
    pub(crate) construction_index: usize,
}

impl AlgoElement {
    /// Algorithm id.
    pub fn id(&self) -> AlgoId {
        self.id
    }

    /// Algorithm kind.
    pub fn kind(&self) -> AlgoKind {
        self.kind
    }

    /// Defining expression.
    pub fn expression(&self) -> &Expr {
        &self.expression
    }

    /// Ordered input elements.
    pub fn inputs(&self) -> &[GeoId] {
        &self.inputs
    }

    /// Ordered output elements.
    pub fn outputs(&self) -> &[GeoId] {
        &self.outputs
    }

    /// Position in the construction list.
    pub fn construction_index(&self) -> usize {
        self.construction_index
    }
}

/// Entry of the construction list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ConstructionElement {
    /// An independent element, listed by itself.
    Geo(GeoId),
    /// An algorithm; its outputs share its position.
    Algo(AlgoId),
}

impl fmt::Display for ConstructionElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Geo(id) => write!(f, "{}", id),
            Self::Algo(id) => write!(f, "{}", id),
        }
    }
}
