//! Sweep Diff - Structural record comparison
//!
//! Compares two nested records and produces a tree of the same shape as the
//! first one, marking every leaf as matching, conflicting or absent from the
//! second record. Keys that only the second record has never appear in the
//! result.
//!
//! Author: hephaex@gmail.com

use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

/// Default bound on record nesting
pub const DEFAULT_MAX_DEPTH: usize = 128;

// ============================================================================
// Errors
// ============================================================================

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiffError {
    #[error("Record nesting exceeds {limit} levels")]
    NestingTooDeep { limit: usize },
}

pub type Result<T> = std::result::Result<T, DiffError>;

// ============================================================================
// Diff Tree
// ============================================================================

/// Classification of one leaf
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Match,
    Conflict,
    Absent,
}

impl Status {
    /// Numeric code used by merge front ends
    pub fn code(self) -> u8 {
        match self {
            Self::Match => 0,
            Self::Conflict => 1,
            Self::Absent => 2,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Match => write!(f, "match"),
            Self::Conflict => write!(f, "conflict"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

/// Position within a record: list index or object field
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiffKey {
    Index(usize),
    Field(String),
}

impl std::fmt::Display for DiffKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Field(name) => f.write_str(name),
        }
    }
}

impl From<usize> for DiffKey {
    fn from(index: usize) -> Self {
        Self::Index(index)
    }
}

impl From<&str> for DiffKey {
    fn from(name: &str) -> Self {
        Self::Field(name.to_string())
    }
}

/// Comparison result mirroring the shape of the first record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiffNode {
    Leaf(Status),
    Branch(BTreeMap<DiffKey, DiffNode>),
}

impl DiffNode {
    /// Child under `key`, if this is a branch holding it
    pub fn get(&self, key: impl Into<DiffKey>) -> Option<&DiffNode> {
        match self {
            Self::Branch(children) => children.get(&key.into()),
            Self::Leaf(_) => None,
        }
    }

    pub fn status(&self) -> Option<Status> {
        match self {
            Self::Leaf(status) => Some(*status),
            Self::Branch(_) => None,
        }
    }

    /// Every leaf with its dotted path, in key order
    pub fn leaves(&self) -> Vec<(String, Status)> {
        let mut out = Vec::new();
        self.collect_leaves(String::new(), &mut out);
        out
    }

    fn collect_leaves(&self, path: String, out: &mut Vec<(String, Status)>) {
        match self {
            Self::Leaf(status) => out.push((path, *status)),
            Self::Branch(children) => {
                for (key, child) in children {
                    let child_path = if path.is_empty() {
                        key.to_string()
                    } else {
                        format!("{path}.{key}")
                    };
                    child.collect_leaves(child_path, out);
                }
            }
        }
    }

    pub fn summary(&self) -> DiffSummary {
        let mut summary = DiffSummary::default();
        for (_, status) in self.leaves() {
            match status {
                Status::Match => summary.matches += 1,
                Status::Conflict => summary.conflicts += 1,
                Status::Absent => summary.absent += 1,
            }
        }
        summary
    }

    /// Whether any leaf conflicts. Records without conflicts can be merged
    /// by taking the first record's values.
    pub fn has_conflicts(&self) -> bool {
        match self {
            Self::Leaf(status) => *status == Status::Conflict,
            Self::Branch(children) => children.values().any(DiffNode::has_conflicts),
        }
    }
}

impl Serialize for DiffNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            Self::Leaf(status) => serializer.serialize_u8(status.code()),
            Self::Branch(children) => {
                let mut map = serializer.serialize_map(Some(children.len()))?;
                for (key, child) in children {
                    map.serialize_entry(&key.to_string(), child)?;
                }
                map.end()
            }
        }
    }
}

/// Leaf counts per classification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub matches: usize,
    pub conflicts: usize,
    pub absent: usize,
}

impl DiffSummary {
    pub fn total(&self) -> usize {
        self.matches + self.conflicts + self.absent
    }
}

// ============================================================================
// Comparison
// ============================================================================

/// Compare `a` against `b` with the default nesting bound
pub fn compare(a: &Value, b: &Value) -> Result<DiffNode> {
    Differ::default().compare(a, b)
}

/// Record comparison with a configurable nesting bound
#[derive(Debug, Clone, Copy)]
pub struct Differ {
    max_depth: usize,
}

impl Default for Differ {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Differ {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth }
    }

    /// Compare `a` against `b`, driven entirely by `a`
    pub fn compare(&self, a: &Value, b: &Value) -> Result<DiffNode> {
        match children(a) {
            Some(_) => self.compare_nested(a, Some(b), 0),
            None => Ok(DiffNode::Leaf(compare_scalars(a, b))),
        }
    }

    fn compare_nested(&self, a: &Value, b: Option<&Value>, depth: usize) -> Result<DiffNode> {
        if depth >= self.max_depth {
            return Err(DiffError::NestingTooDeep {
                limit: self.max_depth,
            });
        }

        let mut result = BTreeMap::new();
        for (key, left) in children(a).unwrap_or_default() {
            let right = b.and_then(|b| child(b, &key));
            let node = match (is_nested(left), right) {
                // Missing on the right: nested values recurse against nothing
                (true, None) => self.compare_nested(left, None, depth + 1)?,
                (false, None) => DiffNode::Leaf(Status::Absent),
                (true, Some(right)) if is_nested(right) => {
                    self.compare_nested(left, Some(right), depth + 1)?
                }
                // Nested on the left only: every element against the scalar
                (true, Some(right)) => DiffNode::Branch(
                    children(left)
                        .unwrap_or_default()
                        .into_iter()
                        .map(|(k, v)| (k, DiffNode::Leaf(compare_scalars(v, right))))
                        .collect(),
                ),
                (false, Some(right)) if is_nested(right) => DiffNode::Leaf(Status::Conflict),
                (false, Some(right)) => DiffNode::Leaf(compare_scalars(left, right)),
            };
            result.insert(key, node);
        }

        Ok(DiffNode::Branch(result))
    }
}

fn is_nested(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}

fn children(value: &Value) -> Option<Vec<(DiffKey, &Value)>> {
    match value {
        Value::Object(map) => Some(
            map.iter()
                .map(|(k, v)| (DiffKey::Field(k.clone()), v))
                .collect(),
        ),
        Value::Array(items) => Some(
            items
                .iter()
                .enumerate()
                .map(|(i, v)| (DiffKey::Index(i), v))
                .collect(),
        ),
        _ => None,
    }
}

fn child<'a>(value: &'a Value, key: &DiffKey) -> Option<&'a Value> {
    match (value, key) {
        (Value::Object(map), DiffKey::Field(name)) => map.get(name),
        (Value::Array(items), DiffKey::Index(i)) => items.get(*i),
        (Value::Object(map), DiffKey::Index(i)) => map.get(&i.to_string()),
        (Value::Array(items), DiffKey::Field(name)) => {
            name.parse::<usize>().ok().and_then(|i| items.get(i))
        }
        _ => None,
    }
}

/// Scalar equality; numbers compare by value, a nested value never matches
fn compare_scalars(a: &Value, b: &Value) -> Status {
    let equal = match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (x, y) if is_nested(x) || is_nested(y) => false,
        (x, y) => x == y,
    };
    if equal {
        Status::Match
    } else {
        Status::Conflict
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn record() -> Value {
        json!({
            "title": "Faust",
            "year": 1808,
            "authors": ["Goethe", "Unknown"],
            "publisher": { "name": "Cotta", "city": "Tübingen" }
        })
    }

    #[test]
    fn test_compare_with_itself_matches_everywhere() {
        let diff = compare(&record(), &record()).unwrap();
        let summary = diff.summary();
        assert_eq!(summary.matches, 6);
        assert_eq!(summary.total(), 6);
        assert!(!diff.has_conflicts());
    }

    #[test]
    fn test_compare_with_empty_is_absent_everywhere() {
        let diff = compare(&record(), &json!({})).unwrap();
        assert!(diff.leaves().iter().all(|(_, s)| *s == Status::Absent));
        assert_eq!(diff.summary().absent, 6);
        assert_eq!(
            diff.get("publisher").and_then(|p| p.get("city")).and_then(DiffNode::status),
            Some(Status::Absent)
        );
    }

    #[test]
    fn test_keys_only_in_second_record_are_invisible() {
        let diff = compare(&json!({"x": 1}), &json!({"x": 1, "y": 2})).unwrap();
        assert_eq!(diff.leaves(), vec![("x".to_string(), Status::Match)]);
        assert!(diff.get("y").is_none());
    }

    #[test]
    fn test_conflicts_are_found_in_nested_values() {
        let mut other = record();
        other["publisher"]["city"] = json!("Stuttgart");
        other["authors"][1] = json!("Anonymous");

        let diff = compare(&record(), &other).unwrap();
        assert!(diff.has_conflicts());
        assert_eq!(diff.summary().conflicts, 2);
        assert_eq!(
            diff.get("authors").and_then(|a| a.get(1usize)).and_then(DiffNode::status),
            Some(Status::Conflict)
        );
        assert_eq!(
            diff.get("authors").and_then(|a| a.get(0usize)).and_then(DiffNode::status),
            Some(Status::Match)
        );
    }

    #[test]
    fn test_nested_against_scalar_compares_each_element() {
        let a = json!({"names": ["Goethe", "J. W. Goethe"]});
        let b = json!({"names": "Goethe"});

        let diff = compare(&a, &b).unwrap();
        assert_eq!(
            diff.leaves(),
            vec![
                ("names.0".to_string(), Status::Match),
                ("names.1".to_string(), Status::Conflict),
            ]
        );
    }

    #[test]
    fn test_scalar_against_nested_conflicts() {
        let diff = compare(&json!({"name": "Goethe"}), &json!({"name": ["Goethe"]})).unwrap();
        assert_eq!(diff.get("name").and_then(DiffNode::status), Some(Status::Conflict));
    }

    #[test]
    fn test_numbers_compare_by_value() {
        let diff = compare(&json!({"n": 1}), &json!({"n": 1.0})).unwrap();
        assert!(!diff.has_conflicts());
        let diff = compare(&json!({"n": 1}), &json!({"n": "1"})).unwrap();
        assert!(diff.has_conflicts());
    }

    #[test]
    fn test_empty_nested_value_yields_empty_branch() {
        let diff = compare(&json!({"tags": []}), &json!({})).unwrap();
        assert_eq!(diff.get("tags"), Some(&DiffNode::Branch(BTreeMap::new())));
        assert!(diff.leaves().is_empty());
    }

    #[test]
    fn test_serializes_as_codes() {
        let diff = compare(
            &json!({"a": 1, "b": {"c": 2}, "d": 3}),
            &json!({"a": 1, "b": {"c": 5}}),
        )
        .unwrap();
        let value = serde_json::to_value(&diff).unwrap();
        assert_eq!(value, json!({"a": 0, "b": {"c": 1}, "d": 2}));
    }

    #[test]
    fn test_nesting_bound() {
        let mut deep = json!("leaf");
        for _ in 0..10 {
            deep = json!({ "next": deep });
        }
        assert!(Differ::new(16).compare(&deep, &deep).is_ok());
        assert_eq!(
            Differ::new(4).compare(&deep, &deep),
            Err(DiffError::NestingTooDeep { limit: 4 })
        );
    }

    #[test]
    fn test_scalar_records() {
        assert_eq!(compare(&json!("a"), &json!("a")).unwrap(), DiffNode::Leaf(Status::Match));
        assert_eq!(compare(&json!("a"), &json!("b")).unwrap(), DiffNode::Leaf(Status::Conflict));
    }

    fn arb_record() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::from),
        ];
        leaf.prop_recursive(4, 32, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::from),
                prop::collection::btree_map("[a-z]{1,4}", inner, 0..4)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_self_comparison_has_no_conflicts(record in arb_record()) {
            let diff = compare(&record, &record).unwrap();
            prop_assert!(diff.leaves().iter().all(|(_, s)| *s == Status::Match));
        }

        #[test]
        fn prop_comparison_against_empty_is_all_absent(
            record in prop::collection::btree_map("[a-z]{1,4}", arb_record(), 0..4)
        ) {
            let record = Value::Object(record.into_iter().collect());
            let diff = compare(&record, &json!({})).unwrap();
            prop_assert!(diff.leaves().iter().all(|(_, s)| *s == Status::Absent));
        }
    }
}
