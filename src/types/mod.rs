//! Core types for the construction kernel.

pub mod geo;
pub mod algo;
pub mod style;
pub mod label;
pub mod macros;

pub use geo::{GeoId, GeoKind, GeoValue, GeoElement};
pub use algo::{AlgoId, AlgoKind, AlgoElement, ConstructionElement};
pub use style::{Color, ColorParseError, VisualStyle};
pub use label::{
    LabelKey, compare_labels, is_reserved_label, is_spreadsheet_cell, is_valid_label,
    will_auto_create_element,
};
pub use macros::{Macro, MacroError, MacroLibrary};
