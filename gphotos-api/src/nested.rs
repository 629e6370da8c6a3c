//! Typed, total descent over untyped JSON trees.
//!
//! The private endpoints answer with heterogeneous trees that mix objects and
//! positional arrays at arbitrary depth. [`Node`] wraps a borrowed
//! [`serde_json::Value`] together with the path taken to reach it, so every
//! narrowing step either succeeds or produces a [`MalformedResponse`] naming
//! the expected shape, the shape actually found and where.
//!
//! ```
//! use gphotos_api::nested::Node;
//! use serde_json::json;
//!
//! let body = json!({"a": [{"b": "x"}]});
//! let root = Node::root(&body, "example");
//! let b = root.field("a")?.index(0)?.field("b")?.as_str()?;
//! assert_eq!(b, "x");
//!
//! let err = root.field("a")?.index(3).unwrap_err();
//! assert_eq!(err.path, r#"$["a"][3]"#);
//! assert_eq!(err.depth, 2);
//! assert_eq!(err.found, "missing from array of length 1");
//! # Ok::<(), gphotos_api::error::MalformedResponse>(())
//! ```

use std::fmt::Write as _;

use serde_json::{Map, Value};

use crate::error::MalformedResponse;

type Result<T> = std::result::Result<T, MalformedResponse>;

#[derive(Debug, Clone)]
enum Segment {
    Key(String),
    Index(usize),
}

/// A read-only view of one node of a response tree.
#[derive(Debug, Clone)]
pub struct Node<'a> {
    value: &'a Value,
    context: &'a str,
    path: Vec<Segment>,
}

impl<'a> Node<'a> {
    /// Start a descent at the root of `value`. `context` names the response
    /// in error messages (e.g. `"upload session response"`).
    pub fn root(value: &'a Value, context: &'a str) -> Self {
        Self {
            value,
            context,
            path: Vec::new(),
        }
    }

    /// The underlying value.
    pub fn value(&self) -> &'a Value {
        self.value
    }

    /// Number of descent steps from the root.
    pub fn depth(&self) -> usize {
        self.path.len()
    }

    /// The path from the root, rendered as `$["key"][0]...`.
    pub fn path(&self) -> String {
        let mut out = String::from("$");
        for seg in &self.path {
            match seg {
                Segment::Key(k) => {
                    let _ = write!(out, "[{k:?}]");
                }
                Segment::Index(i) => {
                    let _ = write!(out, "[{i}]");
                }
            }
        }
        out
    }

    /// Narrow to an array.
    pub fn as_array(&self) -> Result<&'a [Value]> {
        self.value
            .as_array()
            .map(Vec::as_slice)
            .ok_or_else(|| self.mismatch("array"))
    }

    /// Narrow to an object.
    pub fn as_map(&self) -> Result<&'a Map<String, Value>> {
        self.value.as_object().ok_or_else(|| self.mismatch("object"))
    }

    /// Narrow to a string.
    pub fn as_str(&self) -> Result<&'a str> {
        self.value.as_str().ok_or_else(|| self.mismatch("string"))
    }

    /// Require an array with at least `len` elements.
    pub fn min_len(self, len: usize) -> Result<Self> {
        let items = self.as_array()?;
        if items.len() < len {
            return Err(self.mismatch(format!("array of at least {len} elements")));
        }
        Ok(self)
    }

    /// Descend into the member `key` of an object.
    ///
    /// A missing member is reported at the member's own path.
    pub fn field(&self, key: &str) -> Result<Node<'a>> {
        let map = self.as_map()?;
        let segment = Segment::Key(key.to_owned());
        match map.get(key) {
            Some(child) => Ok(self.child(child, segment)),
            None => Err(self.missing(segment)),
        }
    }

    /// Descend into element `index` of an array.
    ///
    /// An out-of-range index is reported at the element's own path.
    pub fn index(&self, index: usize) -> Result<Node<'a>> {
        let items = self.as_array()?;
        let segment = Segment::Index(index);
        match items.get(index) {
            Some(child) => Ok(self.child(child, segment)),
            None => Err(self.missing(segment)),
        }
    }

    /// Build the error for "this node is not `expected`".
    pub fn mismatch(&self, expected: impl Into<String>) -> MalformedResponse {
        MalformedResponse {
            context: self.context.to_owned(),
            path: self.path(),
            depth: self.depth(),
            expected: expected.into(),
            found: describe(self.value),
        }
    }

    fn missing(&self, segment: Segment) -> MalformedResponse {
        let attempted = self.child(self.value, segment);
        MalformedResponse {
            context: self.context.to_owned(),
            path: attempted.path(),
            depth: attempted.depth(),
            expected: "a value".to_owned(),
            found: format!("missing from {}", describe(self.value)),
        }
    }

    fn child(&self, value: &'a Value, segment: Segment) -> Node<'a> {
        let mut path = self.path.clone();
        path.push(segment);
        Node {
            value,
            context: self.context,
            path,
        }
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_owned(),
        Value::Bool(_) => "boolean".to_owned(),
        Value::Number(_) => "number".to_owned(),
        Value::String(_) => "string".to_owned(),
        Value::Array(items) => format!("array of length {}", items.len()),
        Value::Object(map) => format!("object with {} keys", map.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn descends_mixed_tree() {
        let v = json!([["x", {"7": [[["id", ["url"]]]]}]]);
        let root = Node::root(&v, "test");
        let leaf = root
            .index(0)
            .and_then(|n| n.index(1))
            .and_then(|n| n.field("7"))
            .and_then(|n| n.index(0))
            .and_then(|n| n.index(0))
            .and_then(|n| n.index(1))
            .and_then(|n| n.index(0))
            .and_then(|n| n.as_str());
        assert_eq!(leaf, Ok("url"));
    }

    #[test]
    fn wrong_shape_reports_path_and_found() {
        let v = json!({"a": {"b": 3}});
        let err = Node::root(&v, "test")
            .field("a")
            .and_then(|n| n.field("b"))
            .and_then(|n| n.as_str().map(str::to_owned))
            .unwrap_err();
        assert_eq!(err.path, r#"$["a"]["b"]"#);
        assert_eq!(err.depth, 2);
        assert_eq!(err.expected, "string");
        assert_eq!(err.found, "number");
    }

    #[test]
    fn index_out_of_range() {
        let v = json!([]);
        let err = Node::root(&v, "test").index(0).unwrap_err();
        assert_eq!(err.path, "$[0]");
        assert_eq!(err.depth, 1);
        assert_eq!(err.found, "missing from array of length 0");
        assert_eq!(err.expected, "a value");
    }

    #[test]
    fn missing_key() {
        let v = json!({"x": 1});
        let err = Node::root(&v, "test").field("y").unwrap_err();
        assert_eq!(err.path, r#"$["y"]"#);
        assert_eq!(err.depth, 1);
        assert_eq!(err.found, "missing from object with 1 keys");
    }

    #[test]
    fn min_len_rejects_short_arrays() {
        let v = json!([1]);
        assert!(Node::root(&v, "test").min_len(1).is_ok());
        let err = Node::root(&v, "test").min_len(2).unwrap_err();
        assert_eq!(err.expected, "array of at least 2 elements");
    }

    #[test]
    fn map_is_not_array() {
        let v = json!({"0": "a"});
        let err = Node::root(&v, "ctx").index(0).unwrap_err();
        assert_eq!(err.context, "ctx");
        assert_eq!(err.expected, "array");
    }
}
