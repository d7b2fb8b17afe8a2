use serde_yaml::{Mapping, Value};

use super::frontmatter;

pub const DEFAULT_SYNC_FIELD: &str = "kv_sync";
pub const DEFAULT_ID_FIELD: &str = "id";
pub const DEFAULT_COLLECTION_FIELD: &str = "collection";

/// Frontmatter field names the engine reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFields {
    pub sync: String,
    pub id: String,
    pub collection: String,
}

impl Default for MetadataFields {
    fn default() -> Self {
        Self {
            sync: DEFAULT_SYNC_FIELD.to_string(),
            id: DEFAULT_ID_FIELD.to_string(),
            collection: DEFAULT_COLLECTION_FIELD.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub sync_enabled: bool,
    pub id: Option<String>,
    pub collection: Option<String>,
}

impl Metadata {
    pub fn from_mapping(mapping: &Mapping, fields: &MetadataFields) -> Self {
        Self {
            sync_enabled: as_bool(mapping.get(fields.sync.as_str())),
            id: as_non_empty_string(mapping.get(fields.id.as_str())),
            collection: as_non_empty_string(mapping.get(fields.collection.as_str())),
        }
    }

    pub fn remote_key(&self) -> Option<String> {
        build_remote_key(self.id.as_deref(), self.collection.as_deref())
    }
}

/// Structured metadata of a raw document, or `None` when the document has no
/// recognizable frontmatter block.
pub fn extract_metadata(text: &str, fields: &MetadataFields) -> Option<Metadata> {
    let mapping = frontmatter::parse(text)?;
    Some(Metadata::from_mapping(&mapping, fields))
}

/// `collection/id` when a collection is set, `id` otherwise. Both parts are
/// trimmed; no key exists without an id.
pub fn build_remote_key(id: Option<&str>, collection: Option<&str>) -> Option<String> {
    let id = id.map(str::trim).filter(|id| !id.is_empty())?;
    match collection.map(str::trim).filter(|c| !c.is_empty()) {
        Some(collection) => Some(format!("{collection}/{id}")),
        None => Some(id.to_string()),
    }
}

/// True only for boolean `true` or the string "true" in any case.
pub fn as_bool(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(flag)) => *flag,
        Some(Value::String(text)) => text.trim().eq_ignore_ascii_case("true"),
        _ => false,
    }
}

pub fn as_non_empty_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(text)) => {
            let trimmed = text.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        _ => None,
    }
}
