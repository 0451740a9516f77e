//! Grammar A: `GROUP = name` / `END_GROUP` blocks of `KEY = VALUE` lines

use tracing::trace;

use super::value::coerce_value;
use super::MetadataDocument;

/// Flatten a grouped text document
///
/// Keys are prefixed with every enclosing group name joined by `.`. Lines
/// without `=` and an unmatched `END_GROUP` are ignored; parsing stops at a
/// bare `END`.
pub fn parse(content: &str) -> MetadataDocument {
    let mut document = MetadataDocument::new();
    let mut groups: Vec<String> = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line == "END" {
            break;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let value = value.trim();

        match key {
            "GROUP" => groups.push(value.to_string()),
            "END_GROUP" => {
                if groups.pop().is_none() {
                    trace!("Ignoring unmatched END_GROUP = {}", value);
                }
            }
            "" => {}
            _ => {
                let path = if groups.is_empty() {
                    key.to_string()
                } else {
                    format!("{}.{}", groups.join("."), key)
                };
                document.insert(path, coerce_value(value));
            }
        }
    }

    document
}
