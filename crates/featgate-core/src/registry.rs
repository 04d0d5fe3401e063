//! Feature and platform registries.
//!
//! The feature registry models `requires` edges as a directed graph and checks
//! it with Kahn's algorithm; the platform registry is a plain id-keyed map.
//! Both iterate in sorted order so planning is deterministic.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::domain::error::{PlanError, PlanResult, RegistryError, RegistryResult};
use crate::domain::feature::{Feature, FeatureSet};
use crate::domain::platform::Platform;

/// Registered optional capabilities.
#[derive(Debug, Clone, Default)]
pub struct FeatureRegistry {
    features: BTreeMap<String, Feature>,
    default_set: FeatureSet,
}

impl FeatureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a feature. Fails if the name is taken or is not a valid
    /// cargo feature name.
    pub fn register(&mut self, feature: Feature) -> RegistryResult<()> {
        check_feature_name(&feature.name)?;
        if self.features.contains_key(&feature.name) {
            return Err(RegistryError::DuplicateFeature { name: feature.name });
        }
        self.features.insert(feature.name.clone(), feature);
        Ok(())
    }

    /// All features, sorted by name.
    pub fn all_features(&self) -> Vec<&Feature> {
        self.features.values().collect()
    }

    pub fn get(&self, name: &str) -> Option<&Feature> {
        self.features.get(name)
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// The feature set a plain build uses. Empty unless overridden.
    pub fn default_feature_set(&self) -> FeatureSet {
        self.default_set.clone()
    }

    /// Override the default feature set (policy `default_features`).
    pub fn set_default_feature_set(&mut self, set: FeatureSet) {
        self.default_set = set;
    }

    /// Every registered feature.
    pub fn maximal_feature_set(&self) -> FeatureSet {
        self.features.keys().cloned().collect()
    }

    /// Check that every relation names a registered feature and that the
    /// `requires` graph is acyclic.
    pub fn check_graph(&self) -> RegistryResult<()> {
        for feature in self.features.values() {
            for referenced in feature.requires.iter().chain(feature.conflicts.iter()) {
                if !self.features.contains_key(referenced) {
                    return Err(RegistryError::UnknownFeature {
                        feature: feature.name.clone(),
                        referenced: referenced.clone(),
                    });
                }
            }
        }

        // Kahn's algorithm: a feature is ready once all of its requirements are.
        let mut in_degree: BTreeMap<&str, usize> = self
            .features
            .values()
            .map(|f| (f.name.as_str(), f.requires.len()))
            .collect();

        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
        for feature in self.features.values() {
            for req in &feature.requires {
                dependents
                    .entry(req.as_str())
                    .or_default()
                    .push(feature.name.as_str());
            }
        }

        let mut queue: VecDeque<&str> = in_degree
            .iter()
            .filter(|(_, &deg)| deg == 0)
            .map(|(&name, _)| name)
            .collect();
        let mut visited = 0usize;

        while let Some(name) = queue.pop_front() {
            visited += 1;
            for &dependent in dependents.get(name).into_iter().flatten() {
                if let Some(deg) = in_degree.get_mut(dependent) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }

        if visited != self.features.len() {
            let features = in_degree
                .into_iter()
                .filter(|(_, deg)| *deg > 0)
                .map(|(name, _)| name.to_string())
                .collect();
            return Err(RegistryError::DependencyCycle { features });
        }

        Ok(())
    }

    /// Check a feature set against the registry.
    ///
    /// Valid iff every member is registered, every member's requirements are
    /// members, and no member's conflicts are members.
    pub fn validate(&self, set: &FeatureSet) -> PlanResult<()> {
        let invalid = |reason: String| PlanError::InvalidFeatureSet {
            set: set.to_flag_value(),
            reason,
        };

        for name in set.iter() {
            let feature = self
                .features
                .get(name)
                .ok_or_else(|| invalid(format!("unknown feature '{name}'")))?;

            if let Some(missing) = feature.requires.iter().find(|r| !set.contains(r)) {
                return Err(invalid(format!("'{name}' requires '{missing}'")));
            }
            if let Some(conflict) = feature.conflicts.iter().find(|c| set.contains(c)) {
                return Err(invalid(format!("'{name}' conflicts with '{conflict}'")));
            }
        }
        Ok(())
    }

    /// Smallest feature set containing `names` and all of their transitive
    /// requirements. Unregistered names are kept as-is so validation can
    /// report them.
    pub fn closure<'a>(&self, names: impl IntoIterator<Item = &'a str>) -> FeatureSet {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut queue: VecDeque<String> = names.into_iter().map(str::to_string).collect();

        while let Some(name) = queue.pop_front() {
            if !seen.insert(name.clone()) {
                continue;
            }
            if let Some(feature) = self.features.get(&name) {
                queue.extend(feature.requires.iter().cloned());
            }
        }

        seen.into_iter().collect()
    }
}

/// Cargo feature names: alphanumerics plus `_`, `-`, `+` and `.`, not
/// starting with `-`, `+` or `.`.
fn check_feature_name(name: &str) -> RegistryResult<()> {
    let invalid = |reason: &str| RegistryError::InvalidFeatureName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    let Some(first) = name.chars().next() else {
        return Err(invalid("empty name"));
    };
    if !(first.is_alphanumeric() || first == '_') {
        return Err(invalid("must start with a letter, digit or '_'"));
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_alphanumeric() || matches!(*c, '_' | '-' | '+' | '.')))
    {
        return Err(invalid(&format!("character '{c}' is not allowed")));
    }
    Ok(())
}

/// Registered target platforms.
#[derive(Debug, Clone, Default)]
pub struct PlatformRegistry {
    platforms: BTreeMap<String, Platform>,
}

impl PlatformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a platform. Fails if the id is taken.
    pub fn register(&mut self, platform: Platform) -> RegistryResult<()> {
        if self.platforms.contains_key(&platform.id) {
            return Err(RegistryError::DuplicatePlatform { id: platform.id });
        }
        self.platforms.insert(platform.id.clone(), platform);
        Ok(())
    }

    /// All platforms, sorted by id.
    pub fn all_platforms(&self) -> Vec<&Platform> {
        self.platforms.values().collect()
    }

    pub fn get(&self, id: &str) -> Option<&Platform> {
        self.platforms.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.platforms.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.platforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.platforms.is_empty()
    }
}
