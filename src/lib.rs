//! # construction-kernel
//!
//! Dependency-graph core for dynamic geometry constructions.
//!
//! A construction is an ordered list of labelled elements. Independent
//! elements hold values; dependent elements are computed by an algorithm
//! from other elements. The kernel answers one question:
//!
//! > After an element changes, what must be recomputed, and in which order?
//!
//! ## Core Contract
//!
//! 1. Every algorithm appears in the construction list after all of its inputs
//! 2. Labels are unique; lookup is by label
//! 3. Redefinition, undo, redo and load either succeed completely or leave
//!    the construction exactly as it was
//!
//! ## Architecture
//!
//! ```text
//! replace(label, def) ─┬─ in place ──────────────→ propagate dependents
//!                      ├─ substitute ────────────→ remove + append
//!                      └─ snapshot → reorder → RebuildEngine → swap state
//!                                                      ↑
//! undo / redo / load ──── SnapshotCodec ───────────────┘
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same construction → identical snapshot text → identical fingerprint
//! - Rebuilding a snapshot reproduces the same snapshot
//! - Label orderings are total (natural order, ties broken by the full label)

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod expr;
pub mod registry;
pub mod graph;
pub mod defaults;
pub mod kernel;
pub mod config;
pub mod canonical;
pub mod snapshot;
pub mod codec;
pub mod rebuild;
pub mod undo;
pub mod construction;

// Re-exports
pub use types::{
    AlgoElement, AlgoId, AlgoKind, Color, ConstructionElement, GeoElement, GeoId, GeoKind,
    GeoValue, LabelKey, Macro, MacroError, MacroLibrary, VisualStyle,
};
pub use expr::{evaluate, parse, EvalError, Expr, ParseError};
pub use registry::{ElementRegistry, RegistryError};
pub use graph::{ConstructionList, DependencyGraph};
pub use defaults::ConstructionDefaults;
pub use kernel::{KernelEvent, KernelListener, NoOpKernel, RecordingKernel};
pub use config::{CodecKind, ConstructionConfig};
pub use canonical::{fingerprint, SnapshotFingerprint};
pub use snapshot::{ConstructionDocument, ConstructionInfo, ElementRecord, SnapshotError};
pub use codec::{CodecError, JsonCodec, SnapshotCodec, XmlCodec};
pub use rebuild::{Operation, RebuildEngine, RebuildFailure};
pub use undo::{UndoEntry, UndoManager};
pub use construction::{
    infer_kind, Construction, ConstructionError, ConstructionState, Definition,
    IndependentValueKind, ReplaceOutcome,
};

/// Schema version written into every snapshot.
///
/// Snapshots with a different major version are rejected on load.
pub const CONSTRUCTION_SCHEMA_VERSION: &str = "1.0.0";
