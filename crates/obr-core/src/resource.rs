//! Resources: units carrying capabilities and requirements.

use std::collections::BTreeMap;
use std::fmt;

use crate::attribute::{AttributeValue, Attributes};
use crate::capability::{namespace, Capability, Requirement};
use crate::version::Version;

/// Property keys understood on resources.
pub mod property {
    pub const ID: &str = "id";
    pub const SYMBOLIC_NAME: &str = "symbolicname";
    pub const PRESENTATION_NAME: &str = "presentationname";
    pub const VERSION: &str = "version";
    pub const URI: &str = "uri";
    pub const DESCRIPTION: &str = "description";
    pub const SIZE: &str = "size";
    pub const DOCUMENTATION: &str = "documentation";
    pub const LICENSE: &str = "license";
    pub const SOURCE: &str = "source";
    pub const CATEGORY: &str = "category";
}

/// A resource parsed from a repository document. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: String,
    pub symbolic_name: Option<String>,
    pub version: Version,
    /// Free-form descriptive properties (`presentationname`, `uri`, `size`, ...).
    pub properties: BTreeMap<String, String>,
    pub categories: Vec<String>,
    pub capabilities: Vec<Capability>,
    pub requirements: Vec<Requirement>,
}

impl Resource {
    pub fn builder(id: &str) -> ResourceBuilder {
        ResourceBuilder::new(id)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn presentation_name(&self) -> Option<&str> {
        self.property(property::PRESENTATION_NAME)
    }

    pub fn uri(&self) -> Option<&str> {
        self.property(property::URI)
    }

    /// Capabilities in `namespace`, in declaration order.
    pub fn capabilities_in<'a>(&'a self, ns: &'a str) -> impl Iterator<Item = &'a Capability> {
        self.capabilities.iter().filter(move |c| c.namespace == ns)
    }

    /// Identity and descriptive properties as an attribute map, for
    /// discovery queries such as `(symbolicname=org.foo*)`.
    pub fn properties_view(&self) -> Attributes {
        let mut view = Attributes::new();
        for (key, value) in &self.properties {
            let typed = if key == property::SIZE {
                value
                    .parse()
                    .map(AttributeValue::Long)
                    .unwrap_or_else(|_| value.as_str().into())
            } else {
                value.as_str().into()
            };
            view.insert(key.clone(), typed);
        }
        view.insert(property::ID.to_string(), self.id.as_str().into());
        if let Some(ref name) = self.symbolic_name {
            view.insert(property::SYMBOLIC_NAME.to_string(), name.as_str().into());
        }
        view.insert(property::VERSION.to_string(), self.version.clone().into());
        if !self.categories.is_empty() {
            view.insert(
                property::CATEGORY.to_string(),
                AttributeValue::List(self.categories.iter().map(|c| c.as_str().into()).collect()),
            );
        }
        view
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.symbolic_name {
            Some(ref name) => write!(f, "{name} ({})", self.version),
            None => f.write_str(&self.id),
        }
    }
}

/// Incremental construction used by the repository parsers.
#[derive(Debug, Clone, Default)]
pub struct ResourceBuilder {
    id: String,
    symbolic_name: Option<String>,
    version: Option<Version>,
    properties: BTreeMap<String, String>,
    categories: Vec<String>,
    capabilities: Vec<Capability>,
    requirements: Vec<Requirement>,
}

impl ResourceBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    pub fn id(mut self, id: &str) -> Self {
        self.id = id.to_string();
        self
    }

    pub fn symbolic_name(mut self, name: &str) -> Self {
        self.symbolic_name = Some(name.to_string());
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn property(mut self, key: &str, value: &str) -> Self {
        self.properties.insert(key.to_string(), value.to_string());
        self
    }

    pub fn category(mut self, category: &str) -> Self {
        self.categories.push(category.to_string());
        self
    }

    pub fn capability(mut self, capability: Capability) -> Self {
        self.capabilities.push(capability);
        self
    }

    pub fn requirement(mut self, requirement: Requirement) -> Self {
        self.requirements.push(requirement);
        self
    }

    /// Finish the resource.
    ///
    /// Symbolic name and version fall back to a declared `osgi.identity`
    /// capability; when none is declared and a symbolic name is known, one is
    /// synthesized. An empty id becomes `symbolicname/version`.
    pub fn build(mut self) -> Resource {
        let declared = self
            .capabilities
            .iter()
            .find(|c| c.namespace == namespace::IDENTITY);

        if let Some(identity) = declared {
            if self.symbolic_name.is_none() {
                self.symbolic_name = identity
                    .attribute(namespace::IDENTITY)
                    .and_then(AttributeValue::as_str)
                    .map(str::to_string);
            }
            if self.version.is_none() {
                self.version = identity.version();
            }
        }

        let version = self.version.unwrap_or_default();

        if declared.is_none() {
            if let Some(ref name) = self.symbolic_name {
                let identity = Capability::new(namespace::IDENTITY)
                    .with_attribute(namespace::IDENTITY, name.as_str())
                    .with_attribute("version", version.clone())
                    .with_attribute("type", "osgi.bundle");
                self.capabilities.insert(0, identity);
            }
        }

        let id = if self.id.is_empty() {
            match self.symbolic_name {
                Some(ref name) => format!("{name}/{version}"),
                None => String::new(),
            }
        } else {
            self.id
        };

        Resource {
            id,
            symbolic_name: self.symbolic_name,
            version,
            properties: self.properties,
            categories: self.categories,
            capabilities: self.capabilities,
            requirements: self.requirements,
        }
    }
}
