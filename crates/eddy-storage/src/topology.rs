//! Resource topology: which resources exist, how leaves hang under composite
//! resources, and which leaves are bundle (archive) storage.

use std::collections::BTreeMap;

use eddy_types::{ResourceClass, ResourceHierarchy, ResourceSpec};

/// Resource topology collaborator.
pub trait ResourceTopology: Send + Sync {
    /// Whether a resource with this name exists.
    fn exists(&self, resource: &str) -> bool;

    /// Resolve a resource name to a full hierarchy ending at a leaf.
    ///
    /// A composite resource resolves to its first leaf descendant.
    fn resolve(&self, resource: &str) -> Option<ResourceHierarchy>;

    /// Whether the hierarchy ends at bundle storage.
    fn is_bundle(&self, hier: &ResourceHierarchy) -> bool;
}

/// Topology built from a fixed list of [`ResourceSpec`]s.
#[derive(Debug, Clone, Default)]
pub struct StaticTopology {
    resources: BTreeMap<String, ResourceSpec>,
}

impl StaticTopology {
    pub fn new(specs: impl IntoIterator<Item = ResourceSpec>) -> Self {
        Self {
            resources: specs.into_iter().map(|s| (s.name.clone(), s)).collect(),
        }
    }

    /// Topology of standalone storage leaves.
    pub fn flat(names: &[&str]) -> Self {
        Self::new(names.iter().map(|n| ResourceSpec::storage(n)))
    }

    fn children(&self, name: &str) -> impl Iterator<Item = &ResourceSpec> {
        self.resources
            .values()
            .filter(move |s| s.parent.as_deref() == Some(name))
    }

    fn first_leaf(&self, name: &str) -> Option<String> {
        let mut current = name.to_string();
        // Bounded by the number of resources to survive a parent cycle.
        for _ in 0..=self.resources.len() {
            let next = self.children(&current).next().map(|c| c.name.clone());
            match next {
                Some(child) => current = child,
                None => return Some(current),
            }
        }
        None
    }
}

impl ResourceTopology for StaticTopology {
    fn exists(&self, resource: &str) -> bool {
        self.resources.contains_key(resource)
    }

    fn resolve(&self, resource: &str) -> Option<ResourceHierarchy> {
        if !self.exists(resource) {
            return None;
        }
        let leaf = self.first_leaf(resource)?;
        let mut parts = vec![leaf.clone()];
        let mut current = self.resources.get(&leaf)?;
        while let Some(parent) = &current.parent {
            if parts.len() > self.resources.len() {
                return None;
            }
            parts.push(parent.clone());
            current = self.resources.get(parent)?;
        }
        parts.reverse();
        ResourceHierarchy::from_components(parts)
    }

    fn is_bundle(&self, hier: &ResourceHierarchy) -> bool {
        self.resources
            .get(hier.leaf())
            .is_some_and(|s| s.class == ResourceClass::Bundle)
    }
}
