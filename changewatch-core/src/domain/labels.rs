// changewatch-core/src/domain/labels.rs

// Extracts labeled values from a dataset's document. A dataset document is a
// list of schema-tagged objects, e.g.
//   [ { "$schema": "urn:latency:1", "p99": 12.5 }, { "$schema": "urn:cpu:1", ... } ]
// An accessor first selects the objects of its schema, then applies its path.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;
use thiserror::Error;

use crate::domain::variable::Accessor;

pub const SCHEMA_KEY: &str = "$schema";

static SEGMENT: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r#"^(?:\.([A-Za-z_$@][\w$@-]*)|\.\*|\[\*\]|\[(-?\d+)\]|\['([^']*)'\]|\["([^"]*)"\])"#,
    )
    .ok()
});

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ResolveError {
    #[error("No value for schema '{schema}' at '{jsonpath}'")]
    NotFound { schema: String, jsonpath: String },

    #[error("Invalid jsonpath '{path}': {reason}")]
    InvalidPath { path: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(i64),
    Wildcard,
}

pub struct LabelResolver;

impl LabelResolver {
    /// Resolves one accessor against a dataset document.
    ///
    /// A single match is returned as is; several matches (wildcards, or the
    /// schema appearing more than once) come back as a JSON array.
    pub fn resolve(document: &Value, accessor: &Accessor) -> Result<Value, ResolveError> {
        let segments = parse_path(&accessor.jsonpath)?;
        let not_found = || ResolveError::NotFound {
            schema: accessor.schema.clone(),
            jsonpath: accessor.jsonpath.clone(),
        };

        let scoped = schema_documents(document, &accessor.schema);
        if scoped.is_empty() {
            return Err(not_found());
        }

        let mut matches: Vec<Value> = scoped
            .into_iter()
            .flat_map(|doc| select(doc, &segments))
            .cloned()
            .collect();

        match matches.len() {
            0 => Err(not_found()),
            1 => Ok(matches.remove(0)),
            _ => Ok(Value::Array(matches)),
        }
    }
}

fn has_schema(value: &Value, schema: &str) -> bool {
    value.get(SCHEMA_KEY).and_then(Value::as_str) == Some(schema)
}

fn schema_documents<'a>(document: &'a Value, schema: &str) -> Vec<&'a Value> {
    match document {
        Value::Array(items) => items.iter().filter(|i| has_schema(i, schema)).collect(),
        Value::Object(map) => {
            if has_schema(document, schema) {
                vec![document]
            } else {
                map.values().filter(|v| has_schema(v, schema)).collect()
            }
        }
        _ => Vec::new(),
    }
}

fn parse_path(path: &str) -> Result<Vec<Segment>, ResolveError> {
    let invalid = |reason: &str| ResolveError::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };
    let re = SEGMENT
        .as_ref()
        .ok_or_else(|| invalid("path grammar unavailable"))?;

    let trimmed = path.trim();
    let mut rest = match trimmed.strip_prefix('$') {
        Some(r) => r.to_string(),
        // Bare `p99` or `a.b` is read relative to the root
        None if !trimmed.is_empty() && !trimmed.starts_with(['.', '[']) => {
            format!(".{}", trimmed)
        }
        None => trimmed.to_string(),
    };

    let mut segments = Vec::new();
    while !rest.is_empty() {
        // Quoted keys are consumed whole, so `..` here is always a descent
        if rest.starts_with("..") {
            return Err(invalid("recursive descent is not supported"));
        }
        let caps = re
            .captures(&rest)
            .ok_or_else(|| invalid(&format!("unexpected token at '{}'", rest)))?;
        let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();

        let segment = if let Some(key) = caps.get(1).or(caps.get(3)).or(caps.get(4)) {
            Segment::Key(key.as_str().to_string())
        } else if let Some(idx) = caps.get(2) {
            let idx = idx
                .as_str()
                .parse::<i64>()
                .map_err(|_| invalid("index out of range"))?;
            Segment::Index(idx)
        } else {
            Segment::Wildcard
        };

        segments.push(segment);
        rest = rest[whole.len()..].to_string();
    }
    Ok(segments)
}

fn select<'a>(root: &'a Value, segments: &[Segment]) -> Vec<&'a Value> {
    let mut current = vec![root];
    for segment in segments {
        let mut next = Vec::new();
        for value in current {
            match segment {
                Segment::Key(key) => {
                    if let Some(v) = value.get(key.as_str()) {
                        next.push(v);
                    }
                }
                Segment::Index(idx) => {
                    if let Some(items) = value.as_array() {
                        let len = items.len() as i64;
                        let pos = if *idx < 0 { len + idx } else { *idx };
                        if (0..len).contains(&pos)
                            && let Some(v) = items.get(pos as usize)
                        {
                            next.push(v);
                        }
                    }
                }
                Segment::Wildcard => match value {
                    Value::Array(items) => next.extend(items.iter()),
                    Value::Object(map) => next.extend(map.values()),
                    _ => {}
                },
            }
        }
        current = next;
    }
    current
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    fn document() -> Value {
        json!([
            { "$schema": "urn:latency:1", "p99": 12.5, "histogram": [1, 2, 3] },
            { "$schema": "urn:cpu:1", "cores": { "user": 40, "sys": 5 } }
        ])
    }

    #[test]
    fn test_resolve_simple_key() {
        let v = LabelResolver::resolve(&document(), &Accessor::new("urn:latency:1", "$.p99"));
        assert_eq!(v.unwrap(), json!(12.5));
    }

    #[test]
    fn test_resolve_nested_and_quoted() {
        let doc = document();
        let v = LabelResolver::resolve(&doc, &Accessor::new("urn:cpu:1", "$['cores'].user"));
        assert_eq!(v.unwrap(), json!(40));
        let v = LabelResolver::resolve(&doc, &Accessor::new("urn:cpu:1", "cores.sys"));
        assert_eq!(v.unwrap(), json!(5));
    }

    #[test]
    fn test_resolve_indexes() {
        let doc = document();
        let last = LabelResolver::resolve(&doc, &Accessor::new("urn:latency:1", "$.histogram[-1]"));
        assert_eq!(last.unwrap(), json!(3));
        let all = LabelResolver::resolve(&doc, &Accessor::new("urn:latency:1", "$.histogram[*]"));
        assert_eq!(all.unwrap(), json!([1, 2, 3]));
        let out = LabelResolver::resolve(&doc, &Accessor::new("urn:latency:1", "$.histogram[9]"));
        assert!(matches!(out, Err(ResolveError::NotFound { .. })));
    }

    #[test]
    fn test_missing_schema_is_not_found() {
        let res = LabelResolver::resolve(&document(), &Accessor::new("urn:memory:1", "$.rss"));
        assert!(matches!(res, Err(ResolveError::NotFound { schema, .. }) if schema == "urn:memory:1"));
    }

    #[test]
    fn test_missing_path_is_not_found() {
        let res = LabelResolver::resolve(&document(), &Accessor::new("urn:latency:1", "$.p50"));
        assert!(matches!(res, Err(ResolveError::NotFound { .. })));
    }

    #[test]
    fn test_recursive_descent_is_invalid() {
        let res = LabelResolver::resolve(&document(), &Accessor::new("urn:latency:1", "$..p99"));
        assert!(matches!(res, Err(ResolveError::InvalidPath { .. })));
    }

    #[test]
    fn test_quoted_key_may_contain_dots() {
        let doc = json!({ "$schema": "urn:x:1", "a..b": 3, "a": { "b": 4 } });
        let v = LabelResolver::resolve(&doc, &Accessor::new("urn:x:1", "$['a..b']"));
        assert_eq!(v.unwrap(), json!(3));

        let res = LabelResolver::resolve(&doc, &Accessor::new("urn:x:1", "$.a..b"));
        assert!(matches!(res, Err(ResolveError::InvalidPath { .. })));
    }

    #[test]
    fn test_single_tagged_object_document() {
        let doc = json!({ "$schema": "urn:latency:1", "p99": 7 });
        let v = LabelResolver::resolve(&doc, &Accessor::new("urn:latency:1", "$.p99"));
        assert_eq!(v.unwrap(), json!(7));
    }

    #[test]
    fn test_root_path_returns_whole_document() {
        let doc = json!({ "$schema": "urn:x:1", "a": 1 });
        let v = LabelResolver::resolve(&doc, &Accessor::new("urn:x:1", "$"));
        assert_eq!(v.unwrap(), doc);
    }
}
