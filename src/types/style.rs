//! Visual properties carried by elements.
//!
//! The core never renders anything; styles only need to survive
//! redefinition, snapshots and rebuilds unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error parsing a `#rrggbb` color.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid color: {0}")]
pub struct ColorParseError(pub String);

/// RGB color, serialized as `#rrggbb`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
}

impl Color {
    /// Black.
    pub const BLACK: Color = Color::rgb(0, 0, 0);

    /// Create a color from its channels.
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Parse `#rrggbb`.
    pub fn parse(s: &str) -> Result<Self, ColorParseError> {
        let hex = s
            .strip_prefix('#')
            .filter(|h| h.len() == 6 && h.is_ascii())
            .ok_or_else(|| ColorParseError(s.to_string()))?;
        let channel = |range: std::ops::Range<usize>| {
            u8::from_str_radix(&hex[range], 16).map_err(|_| ColorParseError(s.to_string()))
        };
        Ok(Self::rgb(channel(0..2)?, channel(2..4)?, channel(4..6)?))
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl TryFrom<String> for Color {
    type Error = ColorParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// Visual style of an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualStyle {
    /// Object color.
    pub color: Color,
    /// Whether the element is drawn.
    pub visible: bool,
    /// Whether the label is drawn.
    pub label_visible: bool,
    /// Line thickness.
    pub line_thickness: u8,
    /// Point size.
    pub point_size: u8,
    /// Drawing layer.
    pub layer: u8,
    /// Fixed elements cannot be moved by dragging.
    pub fixed: bool,
    /// Caption shown instead of the label.
    pub caption: Option<String>,
}

impl Default for VisualStyle {
    fn default() -> Self {
        Self {
            color: Color::BLACK,
            visible: true,
            label_visible: true,
            line_thickness: 5,
            point_size: 5,
            layer: 0,
            fixed: false,
            caption: None,
        }
    }
}
