//! Optional capabilities and validated combinations of them.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// An optional capability a build may include.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    /// Cargo feature name, e.g. `"lua54"`.
    pub name: String,

    /// Features that must be enabled whenever this one is.
    #[serde(default)]
    pub requires: BTreeSet<String>,

    /// Features that must never be enabled together with this one.
    #[serde(default)]
    pub conflicts: BTreeSet<String>,
}

impl Feature {
    /// A feature with no relations.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires: BTreeSet::new(),
            conflicts: BTreeSet::new(),
        }
    }

    /// Add a required feature.
    pub fn requires(mut self, name: impl Into<String>) -> Self {
        self.requires.insert(name.into());
        self
    }

    /// Add a conflicting feature.
    pub fn conflicts_with(mut self, name: impl Into<String>) -> Self {
        self.conflicts.insert(name.into());
        self
    }
}

/// An immutable, sorted set of feature names selected for one job.
///
/// Renders as the comma-separated list accepted by `cargo --features`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct FeatureSet(BTreeSet<String>);

impl FeatureSet {
    /// The empty set (default features only).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a comma-separated list. Blank entries are dropped.
    pub fn parse(list: &str) -> Self {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// True when every member of `self` is also in `other` and `other` has more.
    pub fn is_strict_subset_of(&self, other: &FeatureSet) -> bool {
        self.0.len() < other.0.len() && self.0.is_subset(&other.0)
    }

    /// Comma-separated form, e.g. `"lua54,rhai"`.
    pub fn to_flag_value(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join(",")
    }
}

impl<S: Into<String>> FromIterator<S> for FeatureSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

impl fmt::Display for FeatureSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            write!(f, "<default>")
        } else {
            write!(f, "{}", self.to_flag_value())
        }
    }
}

impl From<FeatureSet> for String {
    fn from(set: FeatureSet) -> Self {
        set.to_flag_value()
    }
}

impl From<String> for FeatureSet {
    fn from(list: String) -> Self {
        FeatureSet::parse(&list)
    }
}
