//! Value-bearing construction elements.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::algo::AlgoId;
use super::style::VisualStyle;

/// Identifier of a GeoElement inside one construction state.
///
/// Ids are allocated monotonically, so the id order is the order in which
/// elements entered the construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GeoId(u64);

impl GeoId {
    /// Create a GeoId from its raw value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Get the raw value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for GeoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "geo#{}", self.0)
    }
}

/// Kind of a GeoElement.
///
/// Variants are declared alphabetically by type name, which is also the
/// primary key of the name/description ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum GeoKind {
    /// Boolean value.
    #[serde(rename = "boolean")]
    Boolean,
    /// CAS cell: an input expression with a computed output.
    #[serde(rename = "cas_cell")]
    CasCell,
    /// Number.
    #[serde(rename = "numeric")]
    Numeric,
    /// Point in the plane.
    #[serde(rename = "point")]
    Point,
    /// Point in space.
    #[serde(rename = "point3d")]
    Point3D,
    /// Text.
    #[serde(rename = "text")]
    Text,
    /// Vector in the plane.
    #[serde(rename = "vector")]
    Vector,
}

impl GeoKind {
    /// All kinds, in declaration order.
    pub const ALL: [GeoKind; 7] = [
        Self::Boolean,
        Self::CasCell,
        Self::Numeric,
        Self::Point,
        Self::Point3D,
        Self::Text,
        Self::Vector,
    ];

    /// Human-readable type name.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Boolean => "Boolean",
            Self::CasCell => "CAS Cell",
            Self::Numeric => "Number",
            Self::Point => "Point",
            Self::Point3D => "Point3D",
            Self::Text => "Text",
            Self::Vector => "Vector",
        }
    }

    /// Stable identifier used by snapshot codecs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::CasCell => "cas_cell",
            Self::Numeric => "numeric",
            Self::Point => "point",
            Self::Point3D => "point3d",
            Self::Text => "text",
            Self::Vector => "vector",
        }
    }

    /// Parse a kind from its codec identifier.
    pub fn from_str(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|kind| kind.as_str() == s)
    }
}

impl fmt::Display for GeoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// Current value of a GeoElement.
#[derive(Debug, Clone, PartialEq)]
pub enum GeoValue {
    /// Number; NaN means undefined.
    Number(f64),
    /// Boolean.
    Boolean(bool),
    /// Text.
    Text(String),
    /// 2D point.
    Point([f64; 2]),
    /// 3D point.
    Point3D([f64; 3]),
    /// 2D vector.
    Vector([f64; 2]),
}

impl GeoValue {
    /// The kind this value has when nothing else is known about its element.
    pub fn natural_kind(&self) -> GeoKind {
        match self {
            Self::Number(_) => GeoKind::Numeric,
            Self::Boolean(_) => GeoKind::Boolean,
            Self::Text(_) => GeoKind::Text,
            Self::Point(_) => GeoKind::Point,
            Self::Point3D(_) => GeoKind::Point3D,
            Self::Vector(_) => GeoKind::Vector,
        }
    }

    /// Convert this value so it can be stored in an element of `kind`.
    ///
    /// Points and vectors convert into each other, a 2D point lifts into
    /// space with `z = 0`, and a CAS cell stores any value.
    pub fn coerce_to(self, kind: GeoKind) -> Option<GeoValue> {
        match (kind, self) {
            (GeoKind::CasCell, value) => Some(value),
            (GeoKind::Numeric, v @ Self::Number(_)) => Some(v),
            (GeoKind::Boolean, v @ Self::Boolean(_)) => Some(v),
            (GeoKind::Text, v @ Self::Text(_)) => Some(v),
            (GeoKind::Point, v @ Self::Point(_)) => Some(v),
            (GeoKind::Point, Self::Vector(c)) => Some(Self::Point(c)),
            (GeoKind::Vector, v @ Self::Vector(_)) => Some(v),
            (GeoKind::Vector, Self::Point(c)) => Some(Self::Vector(c)),
            (GeoKind::Point3D, v @ Self::Point3D(_)) => Some(v),
            (GeoKind::Point3D, Self::Point([x, y])) => Some(Self::Point3D([x, y, 0.0])),
            _ => None,
        }
    }

    /// Get the number, if this is one.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get the boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Whether the value is defined (no NaN anywhere).
    pub fn is_defined(&self) -> bool {
        match self {
            Self::Number(n) => !n.is_nan(),
            Self::Point(c) | Self::Vector(c) => c.iter().all(|v| !v.is_nan()),
            Self::Point3D(c) => c.iter().all(|v| !v.is_nan()),
            Self::Boolean(_) | Self::Text(_) => true,
        }
    }

    /// Literal expression text that evaluates back to this value.
    pub fn to_literal(&self) -> String {
        match self {
            Self::Number(n) => number_literal(*n),
            Self::Boolean(b) => b.to_string(),
            Self::Text(t) => quote_text(t),
            Self::Point([x, y]) | Self::Vector([x, y]) => {
                format!("({}, {})", number_literal(*x), number_literal(*y))
            }
            Self::Point3D([x, y, z]) => format!(
                "({}, {}, {})",
                number_literal(*x),
                number_literal(*y),
                number_literal(*z)
            ),
        }
    }
}

impl fmt::Display for GeoValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => f.write_str(&display_number(*n)),
            Self::Boolean(b) => write!(f, "{}", b),
            Self::Text(t) => f.write_str(t),
            Self::Point([x, y]) | Self::Vector([x, y]) => {
                write!(f, "({}, {})", display_number(*x), display_number(*y))
            }
            Self::Point3D([x, y, z]) => write!(
                f,
                "({}, {}, {})",
                display_number(*x),
                display_number(*y),
                display_number(*z)
            ),
        }
    }
}

/// Format a number as expression text that parses back to the same value.
pub(crate) fn number_literal(n: f64) -> String {
    if n.is_nan() {
        "?".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "(1 / 0)".to_string() } else { "(-1 / 0)".to_string() }
    } else {
        format!("{}", n)
    }
}

fn display_number(n: f64) -> String {
    if n.is_nan() {
        "?".to_string()
    } else if n.is_infinite() {
        if n > 0.0 { "∞".to_string() } else { "-∞".to_string() }
    } else {
        format!("{}", n)
    }
}

/// Quote a text literal, escaping backslashes, quotes and newlines.
pub(crate) fn quote_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push('"');
    for c in text.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// A labelled, value-bearing node of the construction.
#[derive(Debug, Clone)]
pub struct GeoElement {
    pub(crate) id: GeoId,
    pub(crate) label: String,
    pub(crate) kind: GeoKind,
    pub(crate) value: GeoValue,
    pub(crate) style: VisualStyle,
    pub(crate) parent_algo: Option<AlgoId>,
    pub(crate) construction_index: usize,
    pub(crate) auxiliary: bool,
}

impl GeoElement {
    /// Element id.
    pub fn id(&self) -> GeoId {
        self.id
    }

    /// Unique label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Element kind.
    pub fn kind(&self) -> GeoKind {
        self.kind
    }

    /// Human-readable type name.
    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Current value.
    pub fn value(&self) -> &GeoValue {
        &self.value
    }

    /// Visual properties.
    pub fn style(&self) -> &VisualStyle {
        &self.style
    }

    /// Algorithm computing this element, if it is dependent.
    pub fn parent_algo(&self) -> Option<AlgoId> {
        self.parent_algo
    }

    /// Position in the construction list (shared with the parent algorithm).
    pub fn construction_index(&self) -> usize {
        self.construction_index
    }

    /// Whether the element has no generating algorithm.
    pub fn is_independent(&self) -> bool {
        self.parent_algo.is_none()
    }

    /// Whether the element was created implicitly (e.g. a referenced spreadsheet cell).
    pub fn is_auxiliary(&self) -> bool {
        self.auxiliary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_point_vector() {
        let p = GeoValue::Point([1.0, 2.0]);
        assert_eq!(p.clone().coerce_to(GeoKind::Vector), Some(GeoValue::Vector([1.0, 2.0])));
        assert_eq!(p.clone().coerce_to(GeoKind::Point3D), Some(GeoValue::Point3D([1.0, 2.0, 0.0])));
        assert_eq!(p.coerce_to(GeoKind::Numeric), None);
    }

    #[test]
    fn test_cas_cell_accepts_any_value() {
        let t = GeoValue::Text("x".to_string());
        assert_eq!(t.clone().coerce_to(GeoKind::CasCell), Some(t));
    }

    #[test]
    fn test_literals() {
        assert_eq!(GeoValue::Number(5.0).to_literal(), "5");
        assert_eq!(GeoValue::Number(0.25).to_literal(), "0.25");
        assert_eq!(GeoValue::Number(f64::NAN).to_literal(), "?");
        assert_eq!(GeoValue::Number(f64::INFINITY).to_literal(), "(1 / 0)");
        assert_eq!(GeoValue::Point([1.0, -2.5]).to_literal(), "(1, -2.5)");
        assert_eq!(GeoValue::Text("say \"hi\"".to_string()).to_literal(), "\"say \\\"hi\\\"\"");
    }

    #[test]
    fn test_kind_codec_names() {
        for kind in GeoKind::ALL {
            assert_eq!(GeoKind::from_str(kind.as_str()), Some(kind));
        }
        assert_eq!(GeoKind::from_str("polygon"), None);
    }
}
