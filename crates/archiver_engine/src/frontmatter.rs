use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{FailureKind, Metadata, StageError};

pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontmatterSettings {
    /// `metadata_key -> frontmatter_key`. When set, only mapped keys are kept.
    pub key_mapping: Option<Vec<(String, String)>>,
    pub timestamp_key: Option<String>,
    pub timestamp_format: String,
}

impl Default for FrontmatterSettings {
    fn default() -> Self {
        Self {
            key_mapping: None,
            timestamp_key: None,
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }
}

/// Parse `meta1:front1,meta2:front2`. Empty segments are skipped.
pub fn parse_key_mapping(raw: &str) -> Result<Vec<(String, String)>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| match segment.split_once(':') {
            Some((from, to)) if !from.trim().is_empty() && !to.trim().is_empty() => {
                Ok((from.trim().to_string(), to.trim().to_string()))
            }
            _ => Err(format!("invalid key mapping `{segment}`, expected `from:to`")),
        })
        .collect()
}

/// Prefix `body_markdown` with a YAML frontmatter block built from `metadata`.
pub fn build_markdown_document(
    metadata: &Metadata,
    settings: &FrontmatterSettings,
    now: DateTime<Local>,
    body_markdown: &str,
) -> Result<String, StageError> {
    let mut entries: Vec<(String, Value)> = match &settings.key_mapping {
        None => metadata
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
        Some(mapping) => mapping
            .iter()
            .filter_map(|(from, to)| metadata.get(from).map(|value| (to.clone(), value.clone())))
            .collect(),
    };

    if let Some(key) = &settings.timestamp_key {
        let items: Vec<Item<'_>> = StrftimeItems::new(&settings.timestamp_format).collect();
        if items.iter().any(|item| matches!(item, Item::Error)) {
            return Err(StageError::new(
                FailureKind::Convert,
                format!("invalid timestamp format `{}`", settings.timestamp_format),
            ));
        }
        let stamp = now.format_with_items(items.into_iter()).to_string();
        entries.retain(|(existing, _)| existing != key);
        entries.push((key.clone(), Value::String(stamp)));
    }

    let mut doc = String::from("---\n");
    for (key, value) in &entries {
        doc.push_str(&yaml_key(key));
        doc.push_str(": ");
        doc.push_str(&yaml_value(value));
        doc.push('\n');
    }
    doc.push_str("---\n\n");
    doc.push_str(body_markdown);
    Ok(doc)
}

fn yaml_key(key: &str) -> String {
    let plain = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if plain {
        key.to_string()
    } else {
        Value::String(key.to_string()).to_string()
    }
}

// JSON scalars and flow collections are valid YAML.
fn yaml_value(value: &Value) -> String {
    value.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn metadata() -> Metadata {
        match json!({"title": "A \"quoted\" title", "length": 42, "url": "https://example.com/a"}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn all_keys_without_mapping() {
        let now = Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let doc =
            build_markdown_document(&metadata(), &FrontmatterSettings::default(), now, "# Body")
                .unwrap();
        assert!(doc.starts_with("---\n"));
        assert!(doc.contains("title: \"A \\\"quoted\\\" title\"\n"));
        assert!(doc.contains("length: 42\n"));
        assert!(doc.ends_with("---\n\n# Body"));
    }

    #[test]
    fn mapping_keeps_only_mapped_keys_and_adds_timestamp() {
        let settings = FrontmatterSettings {
            key_mapping: Some(parse_key_mapping("title:name, url:source,missing:x").unwrap()),
            timestamp_key: Some("saved".into()),
            timestamp_format: "%Y-%m-%d".into(),
        };
        let now = Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        let doc = build_markdown_document(&metadata(), &settings, now, "body").unwrap();
        assert!(doc.contains("name: "));
        assert!(doc.contains("source: \"https://example.com/a\"\n"));
        assert!(doc.contains("saved: \"2024-05-01\"\n"));
        assert!(!doc.contains("length"));
        assert!(!doc.contains("x:"));
    }

    #[test]
    fn default_timestamp_is_date_space_time() {
        let settings = FrontmatterSettings {
            timestamp_key: Some("date_created".into()),
            ..FrontmatterSettings::default()
        };
        let now = Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 5).unwrap();
        let doc = build_markdown_document(&metadata(), &settings, now, "").unwrap();
        assert!(doc.contains("date_created: \"2024-05-01 12:30:05\"\n"));
    }

    #[test]
    fn bad_mapping_and_bad_format_are_rejected() {
        assert!(parse_key_mapping("title").is_err());
        let settings = FrontmatterSettings {
            timestamp_key: Some("saved".into()),
            timestamp_format: "%Q%".into(),
            ..FrontmatterSettings::default()
        };
        let now = Local.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert!(build_markdown_document(&metadata(), &settings, now, "").is_err());
    }
}
