//! Sub-module hierarchy addressed by dotted paths.
//!
//! [`Submodule`] is a tree node: a [`Layer`] payload plus named children in
//! insertion order. Module-call nodes name their callee by a dotted path
//! from the root (`"encoder.layers.0.dropout"`); the empty path names the
//! root itself.
//!
//! Lookup walks path segments explicitly. [`Submodule::remove_child`]
//! detaches a leaf and is idempotent: removing an absent leaf under an
//! existing parent returns `Ok(None)`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::layer::Layer;

/// Splits a dotted target into `(parent path, leaf name)`.
///
/// A target without a dot has the root (`""`) as parent.
pub fn split_target(target: &str) -> (&str, &str) {
    target.rsplit_once('.').unwrap_or(("", target))
}

/// A node of the sub-module tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submodule {
    pub layer: Layer,
    #[serde(default)]
    children: IndexMap<String, Submodule>,
}

impl Submodule {
    pub fn new(layer: Layer) -> Self {
        Submodule {
            layer,
            children: IndexMap::new(),
        }
    }

    pub fn container() -> Self {
        Submodule::new(Layer::Container)
    }

    /// Builder form of [`add_child`](Self::add_child) that replaces an
    /// existing child of the same name.
    pub fn with_child(mut self, name: impl Into<String>, child: Submodule) -> Self {
        self.children.insert(name.into(), child);
        self
    }

    /// Adds a direct child.
    ///
    /// Errors on an empty or dotted name, or a name already taken.
    pub fn add_child(&mut self, name: impl Into<String>, child: Submodule) -> Result<(), CoreError> {
        let name = name.into();
        if name.is_empty() || name.contains('.') {
            return Err(CoreError::InvalidPath { path: name });
        }
        if self.children.contains_key(&name) {
            return Err(CoreError::DuplicateSubmodule { path: name });
        }
        self.children.insert(name, child);
        Ok(())
    }

    pub fn child(&self, name: &str) -> Option<&Submodule> {
        self.children.get(name)
    }

    /// Direct children in insertion order.
    pub fn children(&self) -> impl Iterator<Item = (&str, &Submodule)> {
        self.children.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolves a dotted path relative to this module.
    pub fn get(&self, path: &str) -> Option<&Submodule> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('.')
            .try_fold(self, |module, segment| module.children.get(segment))
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Submodule> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('.')
            .try_fold(self, |module, segment| module.children.get_mut(segment))
    }

    pub fn contains(&self, path: &str) -> bool {
        self.get(path).is_some()
    }

    /// Detaches the sub-module at `path` and returns it.
    ///
    /// Returns `Ok(None)` when the leaf is already absent. The parent must
    /// exist; the root itself cannot be removed.
    pub fn remove_child(&mut self, path: &str) -> Result<Option<Submodule>, CoreError> {
        if path.is_empty() {
            return Err(CoreError::InvalidPath { path: String::new() });
        }
        let (parent_path, leaf) = split_target(path);
        let parent = self
            .get_mut(parent_path)
            .ok_or_else(|| CoreError::SubmoduleNotFound {
                path: parent_path.to_string(),
            })?;
        Ok(parent.children.shift_remove(leaf))
    }

    /// All modules in pre-order with their dotted paths. The root comes first
    /// with path `""`.
    pub fn named_modules(&self) -> Vec<(String, &Submodule)> {
        let mut out = Vec::new();
        self.collect_named("", &mut out);
        out
    }

    fn collect_named<'a>(&'a self, prefix: &str, out: &mut Vec<(String, &'a Submodule)>) {
        out.push((prefix.to_string(), self));
        for (name, child) in &self.children {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefix, name)
            };
            child.collect_named(&path, out);
        }
    }

    /// Parameters held by this module and all descendants.
    pub fn parameter_count(&self) -> usize {
        self.layer.parameter_count()
            + self
                .children
                .values()
                .map(Submodule::parameter_count)
                .sum::<usize>()
    }
}
