//! Snapshot text formats.
//!
//! A codec turns a [`ConstructionDocument`] into text and back. The text is
//! what the undo manager stores and what `current_undo_xml` hands out; its
//! grammar belongs entirely to the codec.

pub mod json;
pub mod xml;

use std::fmt::Debug;

use crate::snapshot::ConstructionDocument;
use crate::CONSTRUCTION_SCHEMA_VERSION;

pub use json::JsonCodec;
pub use xml::XmlCodec;

/// Codec error.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encode or decode failure.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),
    /// XML encode or decode failure.
    #[error("XML codec error: {0}")]
    Xml(String),
    /// Well-formed text that is not a supported document.
    #[error("Schema error: {0}")]
    Schema(String),
}

/// Encoder/decoder for snapshot text.
pub trait SnapshotCodec: Send + Sync + Debug {
    /// Format name.
    fn name(&self) -> &'static str;

    /// Encode a document.
    fn encode(&self, doc: &ConstructionDocument) -> Result<String, CodecError>;

    /// Decode a document.
    fn decode(&self, text: &str) -> Result<ConstructionDocument, CodecError>;
}

/// Reject documents written by an incompatible major schema version.
pub(crate) fn check_schema(doc: &ConstructionDocument) -> Result<(), CodecError> {
    let major = |v: &str| v.split('.').next().map(str::to_string);
    if major(&doc.schema_version) != major(CONSTRUCTION_SCHEMA_VERSION) {
        return Err(CodecError::Schema(format!(
            "unsupported schema version {} (expected {})",
            doc.schema_version, CONSTRUCTION_SCHEMA_VERSION
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_major_must_match() {
        let mut doc = ConstructionDocument::new();
        assert!(check_schema(&doc).is_ok());
        doc.schema_version = "1.4.0".to_string();
        assert!(check_schema(&doc).is_ok());
        doc.schema_version = "2.0.0".to_string();
        assert!(matches!(check_schema(&doc), Err(CodecError::Schema(_))));
    }
}
