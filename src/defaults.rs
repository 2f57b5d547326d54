//! Per-kind default styles for new elements.

use std::collections::BTreeMap;

use crate::types::{Color, GeoKind, VisualStyle};

/// Default visual style per element kind.
///
/// A construction holds its defaults behind an `Arc`; macro sub-constructions
/// and child constructions share the same instance until one of them writes.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstructionDefaults {
    styles: BTreeMap<GeoKind, VisualStyle>,
}

impl Default for ConstructionDefaults {
    fn default() -> Self {
        let mut styles = BTreeMap::new();
        for kind in GeoKind::ALL {
            let mut style = VisualStyle::default();
            match kind {
                GeoKind::Point | GeoKind::Point3D => {
                    style.color = Color::rgb(77, 77, 255);
                }
                GeoKind::Numeric | GeoKind::Boolean | GeoKind::CasCell => {
                    style.visible = false;
                }
                GeoKind::Text => {
                    style.label_visible = false;
                }
                GeoKind::Vector => {}
            }
            styles.insert(kind, style);
        }
        Self { styles }
    }
}

impl ConstructionDefaults {
    /// Style applied to a new element of `kind`.
    pub fn style_for(&self, kind: GeoKind) -> VisualStyle {
        self.styles.get(&kind).cloned().unwrap_or_default()
    }

    /// Change the default style of a kind.
    pub fn set_style(&mut self, kind: GeoKind, style: VisualStyle) {
        self.styles.insert(kind, style);
    }
}
