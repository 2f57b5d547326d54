//! XML snapshot codec.
//!
//! ```text
//! <construction schema="1.0.0" step="2">
//!   <info title="..." author="..." date="..." worksheetAbove="..." worksheetBelow="..."/>
//!   <macro name="Midpoint" output="M">
//!     <input label="P"/>
//!     <element label="M" kind="point" definition="(P + Q) / 2" .../>
//!   </macro>
//!   <element label="a" kind="numeric" definition="5" color="#000000" visible="false" .../>
//! </construction>
//! ```
//!
//! Everything lives in attributes, so element order is document order.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;

use super::{check_schema, CodecError, SnapshotCodec};
use crate::snapshot::{ConstructionDocument, ConstructionInfo, ElementRecord};
use crate::types::{Color, GeoKind, Macro, VisualStyle};

/// XML documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlCodec;

fn escape(value: &str) -> String {
    quick_xml::escape::escape(value).replace('\n', "&#10;")
}

fn push_attr(out: &mut String, key: &str, value: &str) {
    out.push(' ');
    out.push_str(key);
    out.push_str("=\"");
    out.push_str(&escape(value));
    out.push('"');
}

fn write_element(out: &mut String, indent: &str, record: &ElementRecord) {
    let style = &record.style;
    out.push_str(indent);
    out.push_str("<element");
    push_attr(out, "label", &record.label);
    push_attr(out, "kind", record.kind.as_str());
    push_attr(out, "definition", &record.definition);
    push_attr(out, "color", &style.color.to_string());
    push_attr(out, "visible", &style.visible.to_string());
    push_attr(out, "labelVisible", &style.label_visible.to_string());
    push_attr(out, "lineThickness", &style.line_thickness.to_string());
    push_attr(out, "pointSize", &style.point_size.to_string());
    push_attr(out, "layer", &style.layer.to_string());
    push_attr(out, "fixed", &style.fixed.to_string());
    if record.auxiliary {
        push_attr(out, "auxiliary", "true");
    }
    if let Some(caption) = &style.caption {
        push_attr(out, "caption", caption);
    }
    out.push_str("/>\n");
}

fn attributes(e: &BytesStart<'_>) -> Result<BTreeMap<String, String>, CodecError> {
    let mut map = BTreeMap::new();
    for attr in e.attributes() {
        let attr = attr.map_err(|e| CodecError::Xml(e.to_string()))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .unescape_value()
            .map_err(|e| CodecError::Xml(e.to_string()))?
            .into_owned();
        map.insert(key, value);
    }
    Ok(map)
}

fn required(attrs: &BTreeMap<String, String>, tag: &str, key: &str) -> Result<String, CodecError> {
    attrs
        .get(key)
        .cloned()
        .ok_or_else(|| CodecError::Schema(format!("<{}> is missing '{}'", tag, key)))
}

fn parsed<T: std::str::FromStr>(
    attrs: &BTreeMap<String, String>,
    key: &str,
    default: T,
) -> Result<T, CodecError> {
    match attrs.get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| CodecError::Schema(format!("invalid value for '{}': {}", key, raw))),
        None => Ok(default),
    }
}

fn read_element(attrs: &BTreeMap<String, String>) -> Result<ElementRecord, CodecError> {
    let kind_name = required(attrs, "element", "kind")?;
    let kind = GeoKind::from_str(&kind_name)
        .ok_or_else(|| CodecError::Schema(format!("unknown element kind: {}", kind_name)))?;
    let defaults = VisualStyle::default();
    let color = match attrs.get("color") {
        Some(raw) => Color::parse(raw).map_err(|e| CodecError::Schema(e.to_string()))?,
        None => defaults.color,
    };
    Ok(ElementRecord {
        label: required(attrs, "element", "label")?,
        kind,
        definition: required(attrs, "element", "definition")?,
        style: VisualStyle {
            color,
            visible: parsed(attrs, "visible", defaults.visible)?,
            label_visible: parsed(attrs, "labelVisible", defaults.label_visible)?,
            line_thickness: parsed(attrs, "lineThickness", defaults.line_thickness)?,
            point_size: parsed(attrs, "pointSize", defaults.point_size)?,
            layer: parsed(attrs, "layer", defaults.layer)?,
            fixed: parsed(attrs, "fixed", defaults.fixed)?,
            caption: attrs.get("caption").cloned(),
        },
        auxiliary: parsed(attrs, "auxiliary", false)?,
    })
}

fn read_info(attrs: &BTreeMap<String, String>) -> ConstructionInfo {
    ConstructionInfo {
        title: attrs.get("title").cloned(),
        author: attrs.get("author").cloned(),
        date: attrs.get("date").cloned(),
        worksheet_text: [attrs.get("worksheetAbove").cloned(), attrs.get("worksheetBelow").cloned()],
    }
}

impl SnapshotCodec for XmlCodec {
    fn name(&self) -> &'static str {
        "xml"
    }

    fn encode(&self, doc: &ConstructionDocument) -> Result<String, CodecError> {
        let mut out = String::new();
        out.push_str("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n");
        out.push_str("<construction");
        push_attr(&mut out, "schema", &doc.schema_version);
        if let Some(step) = doc.step {
            push_attr(&mut out, "step", &step.to_string());
        }
        out.push_str(">\n");

        if !doc.info.is_empty() {
            let info = &doc.info;
            out.push_str("  <info");
            let fields = [
                ("title", &info.title),
                ("author", &info.author),
                ("date", &info.date),
                ("worksheetAbove", &info.worksheet_text[0]),
                ("worksheetBelow", &info.worksheet_text[1]),
            ];
            for (key, value) in fields {
                if let Some(value) = value {
                    push_attr(&mut out, key, value);
                }
            }
            out.push_str("/>\n");
        }

        for mac in &doc.macros {
            out.push_str("  <macro");
            push_attr(&mut out, "name", &mac.name);
            push_attr(&mut out, "output", &mac.output);
            out.push_str(">\n");
            for input in &mac.inputs {
                out.push_str("    <input");
                push_attr(&mut out, "label", input);
                out.push_str("/>\n");
            }
            for record in &mac.body {
                write_element(&mut out, "    ", record);
            }
            out.push_str("  </macro>\n");
        }

        for record in &doc.elements {
            write_element(&mut out, "  ", record);
        }
        out.push_str("</construction>\n");
        Ok(out)
    }

    fn decode(&self, text: &str) -> Result<ConstructionDocument, CodecError> {
        let mut reader = Reader::from_str(text);
        reader.config_mut().trim_text(true);

        let mut doc: Option<ConstructionDocument> = None;
        let mut current_macro: Option<Macro> = None;

        loop {
            let event = reader.read_event().map_err(|e| CodecError::Xml(e.to_string()))?;
            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let attrs = attributes(e)?;
                    match e.name().as_ref() {
                        b"construction" => {
                            doc = Some(ConstructionDocument {
                                schema_version: required(&attrs, "construction", "schema")?,
                                step: match attrs.get("step") {
                                    Some(_) => Some(parsed(&attrs, "step", 0usize)?),
                                    None => None,
                                },
                                ..Default::default()
                            });
                        }
                        name => {
                            let doc = doc.as_mut().ok_or_else(|| {
                                CodecError::Schema("content outside <construction>".to_string())
                            })?;
                            match name {
                                b"info" => doc.info = read_info(&attrs),
                                b"macro" => {
                                    current_macro = Some(Macro {
                                        name: required(&attrs, "macro", "name")?,
                                        inputs: Vec::new(),
                                        output: required(&attrs, "macro", "output")?,
                                        body: Vec::new(),
                                    });
                                }
                                b"input" => {
                                    let mac = current_macro.as_mut().ok_or_else(|| {
                                        CodecError::Schema("<input> outside <macro>".to_string())
                                    })?;
                                    mac.inputs.push(required(&attrs, "input", "label")?);
                                }
                                b"element" => {
                                    let record = read_element(&attrs)?;
                                    match current_macro.as_mut() {
                                        Some(mac) => mac.body.push(record),
                                        None => doc.elements.push(record),
                                    }
                                }
                                other => {
                                    return Err(CodecError::Schema(format!(
                                        "unexpected element <{}>",
                                        String::from_utf8_lossy(other)
                                    )));
                                }
                            }
                        }
                    }
                }
                Event::End(ref e) => {
                    if e.name().as_ref() == b"macro" {
                        if let (Some(mac), Some(doc)) = (current_macro.take(), doc.as_mut()) {
                            doc.macros.push(mac);
                        }
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        let doc = doc.ok_or_else(|| CodecError::Schema("missing <construction>".to_string()))?;
        check_schema(&doc)?;
        Ok(doc)
    }
}
