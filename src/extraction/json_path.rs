//! JSON path resolution.
//!
//! Parses dotted and bracket-indexed paths such as `quote.bids[0].price`
//! into explicit steps, then resolves them against a JSON value.

use std::fmt;

use serde_json::Value;

use crate::error::{Error, Result};

/// One accessor step of a parsed path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathStep {
    Key(String),
    Index(usize),
}

impl fmt::Display for PathStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathStep::Key(key) => write!(f, "{}", key),
            PathStep::Index(index) => write!(f, "[{}]", index),
        }
    }
}

/// A parsed source field path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    steps: Vec<PathStep>,
}

impl FieldPath {
    /// Parse a path.
    ///
    /// Grammar: `segment ('.' segment)*` where a segment is a non-empty key
    /// followed by zero or more `[n]` indices, or a bare index group
    /// (`[0].name`, `rows[1][2]`).
    pub fn parse(path: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        if path.trim().is_empty() {
            return Err(invalid("path is empty"));
        }

        let mut steps = Vec::new();
        let mut key = String::new();
        let mut chars = path.chars().peekable();
        // Set after a `]` so that `a[0]b` is rejected.
        let mut after_index = false;

        while let Some(c) = chars.next() {
            match c {
                '.' => {
                    if key.is_empty() && !after_index {
                        return Err(invalid("empty segment"));
                    }
                    if !key.is_empty() {
                        steps.push(PathStep::Key(std::mem::take(&mut key)));
                    }
                    after_index = false;
                    if chars.peek().is_none() {
                        return Err(invalid("trailing '.'"));
                    }
                }
                '[' => {
                    if !key.is_empty() {
                        steps.push(PathStep::Key(std::mem::take(&mut key)));
                    }
                    let mut digits = String::new();
                    let mut closed = false;
                    for d in chars.by_ref() {
                        if d == ']' {
                            closed = true;
                            break;
                        }
                        digits.push(d);
                    }
                    if !closed {
                        return Err(invalid("unclosed '['"));
                    }
                    let index: usize = digits
                        .trim()
                        .parse()
                        .map_err(|_| invalid("index must be a non-negative integer"))?;
                    steps.push(PathStep::Index(index));
                    after_index = true;
                }
                ']' => return Err(invalid("unexpected ']'")),
                _ => {
                    if after_index {
                        return Err(invalid("expected '.' or '[' after index"));
                    }
                    key.push(c);
                }
            }
        }

        if !key.is_empty() {
            steps.push(PathStep::Key(key));
        }

        Ok(Self {
            raw: path.to_string(),
            steps,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn steps(&self) -> &[PathStep] {
        &self.steps
    }

    /// Resolve this path against `data`.
    pub fn resolve<'a>(&self, data: &'a Value) -> Option<&'a Value> {
        resolve_steps(data, &self.steps)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Evaluate parsed steps against a value.
///
/// A key step applied to an array is accepted when the key is numeric
/// (`items.0.name`).
pub fn resolve_steps<'a>(data: &'a Value, steps: &[PathStep]) -> Option<&'a Value> {
    let mut current = data;
    for step in steps {
        current = match (step, current) {
            (PathStep::Key(key), Value::Object(obj)) => obj.get(key)?,
            (PathStep::Key(key), Value::Array(arr)) => arr.get(key.parse::<usize>().ok()?)?,
            (PathStep::Index(index), Value::Array(arr)) => arr.get(*index)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Parse and resolve in one call. Malformed paths resolve to `None`.
pub fn resolve_json_path<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    FieldPath::parse(path).ok()?.resolve(data)
}

/// Append an object key to a path prefix.
pub fn join_key(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}.{}", prefix, key)
    }
}

/// Append an array index to a path prefix.
pub fn join_index(prefix: &str, index: usize) -> String {
    format!("{}[{}]", prefix, index)
}
