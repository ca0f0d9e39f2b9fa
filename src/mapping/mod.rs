//! Field-type mapping and mapping document construction

pub mod builder;
pub mod cache;
pub mod field_type;

pub use builder::MappingBuilder;
pub use cache::{fingerprint, MappingCache, MappingCacheStats};
pub use field_type::{es_type, field_names, indexed_fields, IndexedField};

use serde_json::{Map, Value};

/// Mapping entry of a dotted path (`author.name`) within `properties`
pub fn property_at<'a>(properties: Option<&'a Map<String, Value>>, path: &str) -> Option<&'a Map<String, Value>> {
    let mut props = properties?;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let entry = props.get(segment)?.as_object()?;
        if segments.peek().is_none() {
            return Some(entry);
        }
        props = entry.get("properties")?.as_object()?;
    }
    None
}

/// Whether string values of a field mapped as `mapping` are analyzed
/// (tokenized and lowercased). Unmapped fields are; non-string types and
/// `not_analyzed` strings keep their values verbatim.
pub fn is_analyzed(mapping: Option<&Map<String, Value>>) -> bool {
    match mapping {
        None => true,
        Some(mapping) => {
            let not_analyzed = mapping.get("index").and_then(Value::as_str) == Some("not_analyzed");
            let string_type = matches!(
                mapping.get("type").and_then(Value::as_str),
                None | Some("string") | Some("text")
            );
            string_type && !not_analyzed
        }
    }
}
