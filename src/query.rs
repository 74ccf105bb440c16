//! Filtering, projection, sorting and paging over JSON documents.
//!
//! Queries use a small document syntax: `{"field": value}` matches on
//! equality, and `$or` / `$and` combine lists of sub-queries. Any other
//! `$`-prefixed key is rejected.

use std::cmp::Ordering;

use serde_json::{Map, Value, json};

use crate::error::{Error, Result};

const ALLOWED_OPERATORS: &[&str] = &["$or", "$and"];

/// Raw string parameters as they arrive on the query string.
#[derive(Debug, Default, Clone)]
pub struct QueryParams {
    pub query: Option<String>,
    pub fields: Option<String>,
    pub sort: Option<String>,
    pub start: Option<String>,
    pub limit: Option<String>,
    pub count: Option<String>,
}

#[derive(Debug, Default)]
pub struct DocumentQuery {
    filter: Map<String, Value>,
    fields: Vec<String>,
    sort: Vec<(String, bool)>,
    start: usize,
    limit: Option<usize>,
    count: bool,
}

impl DocumentQuery {
    /// Parses raw parameters. Malformed values yield `Error::BadRequest`.
    pub fn parse(params: &QueryParams) -> Result<Self> {
        let mut query = Self::default();

        if let Some(raw) = non_empty(&params.query) {
            let value: Value = serde_json::from_str(raw)
                .map_err(|e| Error::BadRequest(format!("invalid query: {e}")))?;
            let Value::Object(filter) = value else {
                return Err(Error::BadRequest("query must be a JSON object".into()));
            };
            check_operators(&filter)?;
            query.filter = filter;
        }

        if let Some(raw) = non_empty(&params.fields) {
            query.fields = serde_json::from_str(raw)
                .map_err(|_| Error::BadRequest("fields must be a JSON list of names".into()))?;
        }

        if let Some(raw) = non_empty(&params.sort) {
            let value: Value = serde_json::from_str(raw)
                .map_err(|e| Error::BadRequest(format!("invalid sort: {e}")))?;
            let Value::Object(sort) = value else {
                return Err(Error::BadRequest("sort must be a JSON object".into()));
            };
            for (field, direction) in sort {
                let ascending = match direction.as_i64() {
                    Some(1) => true,
                    Some(-1) => false,
                    _ => {
                        return Err(Error::BadRequest(format!(
                            "sort direction for '{field}' must be 1 or -1"
                        )));
                    }
                };
                query.sort.push((field, ascending));
            }
        }

        if let Some(raw) = non_empty(&params.start) {
            query.start = parse_int(raw, "start")?;
        }
        if let Some(raw) = non_empty(&params.limit) {
            query.limit = Some(parse_int(raw, "limit")?);
        }
        if let Some(raw) = non_empty(&params.count) {
            let count: i64 = raw
                .parse()
                .map_err(|_| Error::BadRequest("count must be an integer".into()))?;
            query.count = count > 0;
        }

        Ok(query)
    }

    #[must_use]
    pub fn matches(&self, doc: &Value) -> bool {
        matches_filter(&self.filter, doc)
    }

    /// Runs the query over `docs`. With `count` set the result is a single
    /// `{"count": n}` record.
    #[must_use]
    pub fn apply(&self, docs: Vec<Value>) -> Vec<Value> {
        let mut matched: Vec<Value> = docs.into_iter().filter(|d| self.matches(d)).collect();

        if self.count {
            return vec![json!({ "count": matched.len() })];
        }

        if !self.sort.is_empty() {
            matched.sort_by(|a, b| {
                for (field, ascending) in &self.sort {
                    let ord = compare_values(a.get(field), b.get(field));
                    let ord = if *ascending { ord } else { ord.reverse() };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        let page = matched.into_iter().skip(self.start);
        let page: Vec<Value> = match self.limit {
            Some(limit) => page.take(limit).collect(),
            None => page.collect(),
        };

        if self.fields.is_empty() {
            return page;
        }

        page.into_iter().map(|doc| self.project(&doc)).collect()
    }

    fn project(&self, doc: &Value) -> Value {
        let mut out = Map::new();
        for field in &self.fields {
            if let Some(value) = doc.get(field) {
                out.insert(field.clone(), value.clone());
            }
        }
        Value::Object(out)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn parse_int(raw: &str, name: &str) -> Result<usize> {
    raw.parse()
        .map_err(|_| Error::BadRequest(format!("{name} must be a non-negative integer")))
}

fn check_operators(filter: &Map<String, Value>) -> Result<()> {
    for (key, value) in filter {
        if key.starts_with('$') {
            if !ALLOWED_OPERATORS.contains(&key.as_str()) {
                return Err(Error::BadRequest(format!("operator {key} is not allowed")));
            }
            let Value::Array(clauses) = value else {
                return Err(Error::BadRequest(format!("{key} expects a list")));
            };
            for clause in clauses {
                let Value::Object(inner) = clause else {
                    return Err(Error::BadRequest(format!("{key} clauses must be objects")));
                };
                check_operators(inner)?;
            }
        } else if let Value::Object(inner) = value {
            if inner.keys().any(|k| k.starts_with('$')) {
                check_operators(inner)?;
            }
        }
    }
    Ok(())
}

fn matches_filter(filter: &Map<String, Value>, doc: &Value) -> bool {
    filter.iter().all(|(key, expected)| match key.as_str() {
        "$or" => clauses(expected).any(|c| matches_filter(c, doc)),
        "$and" => clauses(expected).all(|c| matches_filter(c, doc)),
        field => doc.get(field).is_some_and(|actual| values_equal(actual, expected)),
    })
}

fn clauses(value: &Value) -> impl Iterator<Item = &Map<String, Value>> {
    value
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}

fn values_equal(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Number(a), Value::Number(b)) => a.as_f64() == b.as_f64(),
        (Value::Array(items), expected) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        }
        _ => actual == expected,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => type_rank(a).cmp(&type_rank(b)),
        },
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Object(_) => 3,
        Value::Array(_) => 4,
        Value::Bool(_) => 5,
    }
}
