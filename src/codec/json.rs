//! JSON snapshot codec.

use super::{check_schema, CodecError, SnapshotCodec};
use crate::snapshot::ConstructionDocument;

/// Pretty-printed JSON documents. The default codec.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodec;

impl SnapshotCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn encode(&self, doc: &ConstructionDocument) -> Result<String, CodecError> {
        Ok(serde_json::to_string_pretty(doc)?)
    }

    fn decode(&self, text: &str) -> Result<ConstructionDocument, CodecError> {
        let doc: ConstructionDocument = serde_json::from_str(text)?;
        check_schema(&doc)?;
        Ok(doc)
    }
}
