use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

const MAX_ID_STRING_LEN: usize = 100;

const QUESTION_TYPES: &[&str] = &[
    "text",
    "integer",
    "decimal",
    "date",
    "time",
    "datetime",
    "select_one",
    "select_multiple",
    "note",
    "geopoint",
    "image",
    "audio",
    "video",
    "calculate",
    "group",
    "repeat",
];

const CONTAINER_TYPES: &[&str] = &["group", "repeat"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Question>,
}

/// A validated form definition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormDefinition {
    pub id_string: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sms_keyword: Option<String>,
    pub children: Vec<Question>,
}

#[derive(Debug, Deserialize)]
struct RawDefinition {
    id_string: Option<String>,
    name: Option<String>,
    title: Option<String>,
    description: Option<String>,
    sms_keyword: Option<String>,
    #[serde(default)]
    children: Vec<Question>,
}

enum Format {
    Json,
    Yaml,
}

fn detect_format(file_name: &str, data: &[u8]) -> Format {
    let lower = file_name.to_ascii_lowercase();
    if lower.ends_with(".json") {
        return Format::Json;
    }
    if lower.ends_with(".yaml") || lower.ends_with(".yml") {
        return Format::Yaml;
    }
    match data.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') => Format::Json,
        _ => Format::Yaml,
    }
}

impl FormDefinition {
    /// Parses an uploaded definition. `file_name` picks the format and
    /// provides a fallback id_string.
    pub fn parse(file_name: &str, data: &[u8]) -> Result<Self> {
        let raw: RawDefinition = match detect_format(file_name, data) {
            Format::Json => serde_json::from_slice(data)
                .map_err(|e| Error::InvalidDefinition(format!("invalid JSON: {e}")))?,
            Format::Yaml => serde_yaml::from_slice(data)
                .map_err(|e| Error::InvalidDefinition(format!("invalid YAML: {e}")))?,
        };

        let stem = file_name
            .rsplit(['/', '\\'])
            .next()
            .and_then(|n| n.split('.').next())
            .filter(|s| !s.is_empty());

        let id_string = raw
            .id_string
            .or(raw.name)
            .or_else(|| stem.map(str::to_string))
            .ok_or_else(|| Error::InvalidDefinition("missing id_string".into()))?;
        let id_string = normalize_id_string(&id_string)?;

        if raw.children.is_empty() {
            return Err(Error::InvalidDefinition(
                "definition must contain at least one question".into(),
            ));
        }
        validate_questions(&raw.children, "survey")?;

        let title = raw
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| id_string.clone());

        let sms_keyword = raw
            .sms_keyword
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        Ok(Self {
            id_string,
            title,
            description: raw.description.filter(|d| !d.trim().is_empty()),
            sms_keyword,
            children: raw.children,
        })
    }

    /// Serialized schema stored on the form record.
    pub fn to_schema_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Validates an id_string, prefixing `_` when it starts with a digit.
pub fn normalize_id_string(id_string: &str) -> Result<String> {
    let id_string = id_string.trim();
    if id_string.is_empty() {
        return Err(Error::InvalidDefinition("id_string cannot be empty".into()));
    }
    if !id_string
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
    {
        return Err(Error::InvalidDefinition(format!(
            "id_string '{id_string}' may only contain letters, digits, '_', '.' and '-'"
        )));
    }

    let normalized = if id_string.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{id_string}")
    } else {
        id_string.to_string()
    };

    if normalized.len() > MAX_ID_STRING_LEN {
        return Err(Error::InvalidDefinition(format!(
            "id_string cannot exceed {MAX_ID_STRING_LEN} characters"
        )));
    }
    Ok(normalized)
}

fn is_valid_question_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn validate_questions(questions: &[Question], parent: &str) -> Result<()> {
    let mut seen = HashSet::new();
    for q in questions {
        if !is_valid_question_name(&q.name) {
            return Err(Error::InvalidDefinition(format!(
                "invalid question name '{}' in '{parent}'",
                q.name
            )));
        }
        if !seen.insert(q.name.as_str()) {
            return Err(Error::InvalidDefinition(format!(
                "duplicate question name '{}' in '{parent}'",
                q.name
            )));
        }
        if !QUESTION_TYPES.contains(&q.kind.as_str()) {
            return Err(Error::InvalidDefinition(format!(
                "unknown question type '{}' for '{}'",
                q.kind, q.name
            )));
        }

        let is_container = CONTAINER_TYPES.contains(&q.kind.as_str());
        match (is_container, q.children.is_empty()) {
            (true, true) => {
                return Err(Error::InvalidDefinition(format!(
                    "{} '{}' has no questions",
                    q.kind, q.name
                )));
            }
            (false, false) => {
                return Err(Error::InvalidDefinition(format!(
                    "question '{}' of type {} cannot have children",
                    q.name, q.kind
                )));
            }
            (true, false) => validate_questions(&q.children, &q.name)?,
            (false, true) => {}
        }
    }
    Ok(())
}
