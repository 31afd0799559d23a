//! Hierarchical asset keys.
//!
//! An [`AssetKey`] names a node of the asset graph (and the ports that read
//! from or write to it) by an ordered path of segments, e.g. `["warehouse",
//! "orders"]`. Keys are immutable once constructed and always valid: every
//! constructor checks the path.
//!
//! # String form
//!
//! ```text
//! warehouse/orders
//! └───────┘ └────┘
//!  segment  segment
//! ```
//!
//! The `/`-joined form is used for display and sorting, and parses back into
//! an equal key. Segments may therefore not contain `/`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Separator between segments in the display form of a key.
pub const KEY_DELIMITER: char = '/';

/// A table of key renames, old key → new key.
///
/// Keys absent from the table are left unchanged by every substitution.
pub type KeySubstitutions = BTreeMap<AssetKey, AssetKey>;

/// Errors that can occur when constructing or parsing an [`AssetKey`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InvalidKeyError {
    #[error("asset key must have at least one path segment")]
    EmptyPath,

    #[error("asset key segment at index {index} is empty in {path:?}")]
    EmptySegment { index: usize, path: Vec<String> },

    #[error("asset key segment {segment:?} must not contain the '/' delimiter")]
    DelimiterInSegment { segment: String },
}

/// A structured, hierarchical identifier for an asset.
///
/// Serialises as a JSON array of segments (`["warehouse", "orders"]`);
/// deserialising runs the same checks as [`AssetKey::new`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct AssetKey {
    path: Vec<String>,
}

impl AssetKey {
    /// Build a key from an ordered sequence of segments.
    pub fn new<I, S>(path: I) -> Result<Self, InvalidKeyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path: Vec<String> = path.into_iter().map(Into::into).collect();
        if path.is_empty() {
            return Err(InvalidKeyError::EmptyPath);
        }
        for (index, segment) in path.iter().enumerate() {
            if segment.is_empty() {
                return Err(InvalidKeyError::EmptySegment {
                    index,
                    path: path.clone(),
                });
            }
            if segment.contains(KEY_DELIMITER) {
                return Err(InvalidKeyError::DelimiterInSegment {
                    segment: segment.clone(),
                });
            }
        }
        Ok(Self { path })
    }

    /// The path segments, outermost first.
    pub fn path(&self) -> &[String] {
        &self.path
    }

    /// The last segment of the path.
    pub fn name(&self) -> &str {
        // A key always has at least one segment.
        self.path.last().map(String::as_str).unwrap_or_default()
    }

    /// Segments joined with `_`, e.g. `warehouse_orders`.
    ///
    /// Used as the local port name of dependency-only inputs.
    pub fn to_local_name(&self) -> String {
        self.path.join("_")
    }

    /// Segments joined with `__`, e.g. `warehouse__orders`.
    ///
    /// Used as the default computation name of a single-asset node.
    pub fn to_op_name(&self) -> String {
        self.path.join("__")
    }

    /// A new key with `prefix` prepended to this key's path.
    pub fn with_prefix<I, S>(&self, prefix: I) -> Result<Self, InvalidKeyError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path: Vec<String> = prefix
            .into_iter()
            .map(Into::into)
            .chain(self.path.iter().cloned())
            .collect();
        Self::new(path)
    }
}

/// Formats the key as its `/`-joined string (e.g. `warehouse/orders`).
impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.path.iter().enumerate() {
            if i > 0 {
                write!(f, "{KEY_DELIMITER}")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

/// Parses a key from its `/`-joined string form.
impl FromStr for AssetKey {
    type Err = InvalidKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(InvalidKeyError::EmptyPath);
        }
        Self::new(s.split(KEY_DELIMITER))
    }
}

impl TryFrom<Vec<String>> for AssetKey {
    type Error = InvalidKeyError;

    fn try_from(path: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(path)
    }
}

impl From<AssetKey> for Vec<String> {
    fn from(key: AssetKey) -> Self {
        key.path
    }
}

// Ordering follows the string form. Segments cannot contain the delimiter, so
// two keys with the same string form are equal and `Ord` agrees with `Eq`.
impl Ord for AssetKey {
    fn cmp(&self, other: &Self) -> Ordering {
        let lhs = self.path.iter().map(String::as_str);
        let rhs = other.path.iter().map(String::as_str);
        joined_chars(lhs).cmp(joined_chars(rhs))
    }
}

impl PartialOrd for AssetKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn joined_chars<'a>(segments: impl Iterator<Item = &'a str> + 'a) -> impl Iterator<Item = char> + 'a {
    segments
        .enumerate()
        .flat_map(|(i, s)| (i > 0).then_some(KEY_DELIMITER).into_iter().chain(s.chars()))
}

// --- tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_joins_with_delimiter() {
        let key = AssetKey::new(["warehouse", "orders"]).unwrap();
        assert_eq!(key.to_string(), "warehouse/orders");
        assert_eq!(key.name(), "orders");
    }

    #[test]
    fn string_form_parses_back() {
        for path in [vec!["a"], vec!["ns", "A"], vec!["x", "y-z", "w.v"]] {
            let key = AssetKey::new(path).unwrap();
            let parsed: AssetKey = key.to_string().parse().unwrap();
            assert_eq!(parsed, key);
        }
    }

    #[test]
    fn empty_segment_rejected() {
        assert_eq!(
            AssetKey::new(["ns", ""]),
            Err(InvalidKeyError::EmptySegment {
                index: 1,
                path: vec!["ns".into(), String::new()],
            })
        );
        assert!(matches!(
            "ns//a".parse::<AssetKey>(),
            Err(InvalidKeyError::EmptySegment { index: 1, .. })
        ));
    }

    #[test]
    fn empty_path_rejected() {
        assert_eq!(AssetKey::new(Vec::<String>::new()), Err(InvalidKeyError::EmptyPath));
        assert_eq!("".parse::<AssetKey>(), Err(InvalidKeyError::EmptyPath));
    }

    #[test]
    fn delimiter_in_segment_rejected() {
        assert!(matches!(
            AssetKey::new(["a/b"]),
            Err(InvalidKeyError::DelimiterInSegment { .. })
        ));
    }

    #[test]
    fn local_and_op_names() {
        let key = AssetKey::new(["warehouse", "orders"]).unwrap();
        assert_eq!(key.to_local_name(), "warehouse_orders");
        assert_eq!(key.to_op_name(), "warehouse__orders");
    }

    #[test]
    fn prefix_prepends_segments() {
        let key = AssetKey::new(["orders"]).unwrap();
        let prefixed = key.with_prefix(["prod", "warehouse"]).unwrap();
        assert_eq!(prefixed.to_string(), "prod/warehouse/orders");
        assert!(key.with_prefix([""]).is_err());
    }

    #[test]
    fn ordering_follows_string_form() {
        let mut keys: Vec<AssetKey> = ["b", "a/z", "a", "a-b"]
            .iter()
            .map(|s| s.parse().unwrap())
            .collect();
        keys.sort();
        let rendered: Vec<String> = keys.iter().map(ToString::to_string).collect();
        let mut expected = rendered.clone();
        expected.sort();
        assert_eq!(rendered, expected);
        assert_eq!(rendered, vec!["a", "a-b", "a/z", "b"]);
    }

    #[test]
    fn serde_array_roundtrip() {
        let key = AssetKey::new(["ns", "A"]).unwrap();
        let json = serde_json::to_string(&key).unwrap();
        assert_eq!(json, r#"["ns","A"]"#);
        let back: AssetKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
        assert!(serde_json::from_str::<AssetKey>(r#"["ns",""]"#).is_err());
        assert!(serde_json::from_str::<AssetKey>("[]").is_err());
    }
}
