//! Dotted key paths over a JSON document.
//!
//! A path such as `system.file.dataDirectory` is split once into its
//! segments and then walked iteratively; nothing re-joins the remainder.

use std::fmt;
use std::str::FromStr;

use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("empty segment at position {0}")]
    EmptySegment(usize),
    #[error("key {0} not found")]
    NotFound(String),
    #[error("`{at}` is not an object")]
    NotAnObject { at: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        if raw.is_empty() {
            return Err(PathError::Empty);
        }
        let mut segments = Vec::new();
        for (idx, segment) in raw.split('.').enumerate() {
            if segment.is_empty() {
                return Err(PathError::EmptySegment(idx));
            }
            segments.push(segment.to_string());
        }
        Ok(Self { segments })
    }

    /// Builds a path from already-split segments, e.g. a category name that
    /// must be treated as a single segment.
    pub fn from_segments<I, S>(segments: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(PathError::Empty);
        }
        if let Some(idx) = segments.iter().position(|s| s.is_empty()) {
            return Err(PathError::EmptySegment(idx));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    fn prefix(&self, len: usize) -> String {
        self.segments[..len].join(".")
    }

    fn split_last(&self) -> (&[String], &str) {
        let (last, parents) = self
            .segments
            .split_last()
            .expect("key path always has at least one segment");
        (parents, last.as_str())
    }
}

impl FromStr for KeyPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        KeyPath::parse(s)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

/// Resolves `path` from the root. Any absent segment, including one that
/// would have to be looked up inside a non-object, is `NotFound`.
pub fn lookup<'a>(root: &'a Value, path: &KeyPath) -> Result<&'a Value, PathError> {
    let mut current = root;
    for segment in &path.segments {
        current = current
            .as_object()
            .and_then(|map| map.get(segment))
            .ok_or_else(|| PathError::NotFound(path.to_string()))?;
    }
    Ok(current)
}

/// Assigns `value` at `path`, creating missing intermediate objects.
/// Returns the previous value, if any.
pub fn assign(root: &mut Value, path: &KeyPath, value: Value) -> Result<Option<Value>, PathError> {
    let (parents, last) = path.split_last();
    let mut current = root;
    for (depth, segment) in parents.iter().enumerate() {
        let map = current.as_object_mut().ok_or_else(|| PathError::NotAnObject {
            at: display_prefix(path, depth),
        })?;
        current = map
            .entry(segment.clone())
            .or_insert_with(|| Value::Object(Map::new()));
    }
    let map = current.as_object_mut().ok_or_else(|| PathError::NotAnObject {
        at: display_prefix(path, parents.len()),
    })?;
    Ok(map.insert(last.to_string(), value))
}

/// Removes and returns the value at `path`.
pub fn detach(root: &mut Value, path: &KeyPath) -> Result<Value, PathError> {
    let (parents, last) = path.split_last();
    let mut current = root;
    for (depth, segment) in parents.iter().enumerate() {
        let map = current.as_object_mut().ok_or_else(|| PathError::NotAnObject {
            at: display_prefix(path, depth),
        })?;
        current = map
            .get_mut(segment)
            .ok_or_else(|| PathError::NotFound(path.to_string()))?;
    }
    let map = current.as_object_mut().ok_or_else(|| PathError::NotAnObject {
        at: display_prefix(path, parents.len()),
    })?;
    map.remove(last)
        .ok_or_else(|| PathError::NotFound(path.to_string()))
}

/// Deep merge of `patch` into `base`. Objects on both sides merge key by
/// key; anything else in `patch` replaces what `base` held.
pub fn merge(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_value) in patch_map {
                let nested = patch_value.is_object()
                    && base_map.get(key).map_or(false, Value::is_object);
                match base_map.get_mut(key) {
                    Some(existing) if nested => merge(existing, patch_value),
                    _ => {
                        base_map.insert(key.clone(), patch_value.clone());
                    }
                }
            }
        }
        (base, patch) => *base = patch.clone(),
    }
}

fn display_prefix(path: &KeyPath, len: usize) -> String {
    if len == 0 {
        "<root>".to_string()
    } else {
        path.prefix(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn path(raw: &str) -> KeyPath {
        KeyPath::parse(raw).expect("path")
    }

    #[test]
    fn parse_rejects_empty_segments() {
        assert_eq!(KeyPath::parse(""), Err(PathError::Empty));
        assert_eq!(KeyPath::parse("a..b"), Err(PathError::EmptySegment(1)));
        assert_eq!(KeyPath::parse(".a"), Err(PathError::EmptySegment(0)));
        assert_eq!(KeyPath::parse("a."), Err(PathError::EmptySegment(1)));
    }

    #[test]
    fn lookup_walks_nested_objects() {
        let doc = json!({"system": {"file": {"dataDirectory": "/data"}}});
        let value = lookup(&doc, &path("system.file.dataDirectory")).expect("lookup");
        assert_eq!(value, &json!("/data"));
        let nested = lookup(&doc, &path("system.file")).expect("lookup");
        assert_eq!(nested, &json!({"dataDirectory": "/data"}));
    }

    #[test]
    fn lookup_through_scalar_is_not_found() {
        let doc = json!({"system": {"mode": "file"}});
        let err = lookup(&doc, &path("system.mode.extra")).unwrap_err();
        assert_eq!(err, PathError::NotFound("system.mode.extra".to_string()));
    }

    #[test]
    fn assign_creates_intermediate_objects() {
        let mut doc = json!({});
        assign(&mut doc, &path("a.b.c"), json!(3)).expect("assign");
        assert_eq!(doc, json!({"a": {"b": {"c": 3}}}));
    }

    #[test]
    fn assign_through_scalar_is_rejected() {
        let mut doc = json!({"a": 1});
        let err = assign(&mut doc, &path("a.b"), json!(2)).unwrap_err();
        assert_eq!(err, PathError::NotAnObject { at: "a".to_string() });
        assert_eq!(doc, json!({"a": 1}));
    }

    #[test]
    fn detach_returns_removed_value() {
        let mut doc = json!({"a": {"b": 1, "c": 2}});
        let removed = detach(&mut doc, &path("a.b")).expect("detach");
        assert_eq!(removed, json!(1));
        assert_eq!(doc, json!({"a": {"c": 2}}));
        assert!(matches!(
            detach(&mut doc, &path("a.b")),
            Err(PathError::NotFound(_))
        ));
    }

    #[test]
    fn merge_overwrites_scalars_and_deep_merges_objects() {
        let mut scalar = json!({"a": {"b": 2}});
        merge(&mut scalar, &json!({"a": 1}));
        assert_eq!(scalar, json!({"a": 1}));

        let mut deep = json!({"a": {"b": 2}});
        merge(&mut deep, &json!({"a": {"c": 3}}));
        assert_eq!(deep, json!({"a": {"b": 2, "c": 3}}));
    }

    #[test]
    fn merge_with_self_is_identity() {
        let original = json!({"work": {"theme": "dark", "nested": {"x": [1, 2]}}, "home": {}});
        let mut merged = original.clone();
        merge(&mut merged, &original);
        assert_eq!(merged, original);
    }
}
