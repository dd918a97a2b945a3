//! Namespace-bucketed capability lookup over an immutable resource list.

use std::collections::HashMap;
use std::sync::Arc;

use obr_core::{Capability, Filter, Requirement, Resource};

/// A capability found in the index, with the resource exposing it.
#[derive(Debug, Clone, Copy)]
pub struct ProviderMatch<'a> {
    /// Position of the resource in [`CapabilityIndex::resources`].
    pub resource_index: usize,
    pub resource: &'a Arc<Resource>,
    pub capability: &'a Capability,
}

/// Resources plus, per namespace, every `(resource, capability)` position in
/// insertion order. Lookups only scan the requested namespace.
#[derive(Debug, Clone, Default)]
pub struct CapabilityIndex {
    resources: Vec<Arc<Resource>>,
    by_namespace: HashMap<String, Vec<(usize, usize)>>,
}

impl CapabilityIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_resources(resources: impl IntoIterator<Item = Arc<Resource>>) -> Self {
        let mut index = Self::new();
        for resource in resources {
            index.insert(resource);
        }
        index
    }

    /// Append a resource and bucket its capabilities. Returns its position.
    pub fn insert(&mut self, resource: Arc<Resource>) -> usize {
        let idx = self.resources.len();
        for (cap_idx, capability) in resource.capabilities.iter().enumerate() {
            self.by_namespace
                .entry(capability.namespace.clone())
                .or_default()
                .push((idx, cap_idx));
        }
        self.resources.push(resource);
        idx
    }

    pub fn resources(&self) -> &[Arc<Resource>] {
        &self.resources
    }

    pub fn get(&self, index: usize) -> Option<&Arc<Resource>> {
        self.resources.get(index)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Every capability in `namespace`.
    pub fn capabilities<'a>(&'a self, namespace: &str) -> impl Iterator<Item = ProviderMatch<'a>> {
        self.by_namespace
            .get(namespace)
            .map(Vec::as_slice)
            .unwrap_or_default()
            .iter()
            .map(move |&(r, c)| {
                let resource = &self.resources[r];
                ProviderMatch {
                    resource_index: r,
                    resource,
                    capability: &resource.capabilities[c],
                }
            })
    }

    /// Capabilities in `namespace` whose attributes satisfy `filter`.
    pub fn find_capabilities<'a>(
        &'a self,
        namespace: &str,
        filter: &Filter,
    ) -> Vec<ProviderMatch<'a>> {
        self.capabilities(namespace)
            .filter(|m| filter.matches(&m.capability.attributes))
            .collect()
    }

    /// Capabilities satisfying a requirement.
    pub fn matching<'a>(&'a self, requirement: &Requirement) -> Vec<ProviderMatch<'a>> {
        self.find_capabilities(&requirement.namespace, &requirement.filter)
    }

    /// Resources exposing at least one matching capability, in insertion order.
    pub fn find_providers(&self, namespace: &str, filter: &Filter) -> Vec<Arc<Resource>> {
        let mut seen = Vec::new();
        for m in self.find_capabilities(namespace, filter) {
            if !seen.contains(&m.resource_index) {
                seen.push(m.resource_index);
            }
        }
        seen.sort_unstable();
        seen.into_iter()
            .map(|i| Arc::clone(&self.resources[i]))
            .collect()
    }

    /// Resources whose identity properties satisfy `filter`.
    pub fn discover(&self, filter: &Filter) -> Vec<Arc<Resource>> {
        self.resources
            .iter()
            .filter(|r| filter.matches(&r.properties_view()))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obr_core::{namespace, Version};

    fn bundle(name: &str, pkgs: &[&str]) -> Arc<Resource> {
        let mut builder = Resource::builder("")
            .symbolic_name(name)
            .version(Version::new(1, 0, 0));
        for pkg in pkgs {
            builder = builder.capability(
                Capability::new(namespace::PACKAGE).with_attribute(namespace::PACKAGE, *pkg),
            );
        }
        Arc::new(builder.build())
    }

    #[test]
    fn providers_keep_insertion_order() {
        let index = CapabilityIndex::from_resources([
            bundle("c", &["org.x"]),
            bundle("a", &["org.y", "org.x"]),
            bundle("b", &["org.x"]),
        ]);
        let filter = Filter::parse("(osgi.wiring.package=org.x)").unwrap();
        let names: Vec<_> = index
            .find_providers(namespace::PACKAGE, &filter)
            .iter()
            .map(|r| r.symbolic_name.clone().unwrap())
            .collect();
        assert_eq!(names, ["c", "a", "b"]);
    }

    #[test]
    fn lookups_are_bucketed_by_namespace() {
        let index = CapabilityIndex::from_resources([bundle("a", &["org.x"])]);
        assert_eq!(index.capabilities(namespace::PACKAGE).count(), 1);
        assert_eq!(index.capabilities(namespace::IDENTITY).count(), 1);
        assert_eq!(index.capabilities("unknown").count(), 0);
        let any = Filter::match_all();
        assert!(index.find_providers(namespace::BUNDLE, &any).is_empty());
    }

    #[test]
    fn discover_uses_identity_properties() {
        let index = CapabilityIndex::from_resources([bundle("org.a", &[]), bundle("org.b", &[])]);
        let found = index.discover(&Filter::parse("(symbolicname=org.b)").unwrap());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].symbolic_name.as_deref(), Some("org.b"));
    }
}
