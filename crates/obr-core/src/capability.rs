//! Capabilities offered by resources and the requirements that select them.

use std::fmt;

use obr_util::errors::ObrResult;

use crate::attribute::{self, AttributeValue, Attributes};
use crate::filter::{Filter, FilterType, SimpleItem};
use crate::version::{Version, VersionRange};

/// Well-known capability namespaces.
pub mod namespace {
    pub const IDENTITY: &str = "osgi.identity";
    pub const PACKAGE: &str = "osgi.wiring.package";
    pub const BUNDLE: &str = "osgi.wiring.bundle";
    pub const HOST: &str = "osgi.wiring.host";
    pub const EXECUTION_ENVIRONMENT: &str = "osgi.ee";
    pub const SERVICE: &str = "osgi.service";
}

/// Something a resource offers: a namespace plus typed attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Capability {
    pub namespace: String,
    pub attributes: Attributes,
}

impl Capability {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attribute(mut self, key: &str, value: impl Into<AttributeValue>) -> Self {
        self.attributes.insert(key.to_string(), value.into());
        self
    }

    /// Case-insensitive attribute lookup.
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        attribute::lookup(&self.attributes, key)
    }

    /// The `version` attribute, when present and version-typed (or parseable).
    pub fn version(&self) -> Option<Version> {
        match self.attribute("version")? {
            AttributeValue::Version(v) => Some(v.clone()),
            AttributeValue::String(s) => Version::parse(s).ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.namespace)?;
        for (key, value) in &self.attributes {
            write!(f, ";{key}={value}")?;
        }
        Ok(())
    }
}

/// Something a resource needs: a namespace plus a filter over capability
/// attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Requirement {
    pub namespace: String,
    pub filter: Filter,
    /// May be left unsatisfied without failing resolution.
    pub optional: bool,
    /// Accepts every matching provider instead of just one.
    pub multiple: bool,
    /// Extends the matched resource (fragment attachment) rather than importing from it.
    pub extend: bool,
    /// `false` for requirements that only apply at runtime; the resolver skips them.
    pub resolvable: bool,
    pub comment: Option<String>,
}

impl Requirement {
    pub fn new(namespace: &str, filter: Filter) -> Self {
        Self {
            namespace: namespace.to_string(),
            filter,
            optional: false,
            multiple: false,
            extend: false,
            resolvable: true,
            comment: None,
        }
    }

    /// Build a requirement from a namespace and a filter string.
    pub fn parse(namespace: &str, filter: &str) -> ObrResult<Self> {
        Ok(Self::new(namespace, Filter::parse(filter)?))
    }

    pub fn optional(mut self, optional: bool) -> Self {
        self.optional = optional;
        self
    }

    pub fn multiple(mut self, multiple: bool) -> Self {
        self.multiple = multiple;
        self
    }

    pub fn extend(mut self, extend: bool) -> Self {
        self.extend = extend;
        self
    }

    pub fn resolvable(mut self, resolvable: bool) -> Self {
        self.resolvable = resolvable;
        self
    }

    pub fn with_comment(mut self, comment: &str) -> Self {
        self.comment = Some(comment.to_string());
        self
    }

    /// Namespaces equal and the filter accepts the capability's attributes.
    pub fn is_satisfied_by(&self, capability: &Capability) -> bool {
        self.namespace == capability.namespace && self.filter.matches(&capability.attributes)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.namespace, self.filter)?;
        if self.optional {
            f.write_str(" (optional)")?;
        }
        Ok(())
    }
}

/// Requirement on a resource identity, optionally restricted to a version range.
///
/// `identity_requirement("org.foo", Some(&"[1.0,2.0)".parse()?))` selects
/// `(&(osgi.identity=org.foo)(version>=1.0.0)(!(version>=2.0.0)))`.
pub fn identity_requirement(symbolic_name: &str, range: Option<&VersionRange>) -> Requirement {
    let name = Filter::Item(SimpleItem::new(
        namespace::IDENTITY,
        FilterType::Equal,
        symbolic_name,
    ));
    let filter = match range {
        None => name,
        Some(range) => {
            let mut clauses = vec![name];
            clauses.extend(range_clauses("version", range));
            Filter::And(clauses)
        }
    };
    Requirement::new(namespace::IDENTITY, filter)
}

/// Filter clauses bounding `attr` to `range`.
pub fn range_clauses(attr: &str, range: &VersionRange) -> Vec<Filter> {
    let item = |ty, v: &Version| Filter::Item(SimpleItem::new(attr, ty, &v.to_string()));
    let mut clauses = Vec::new();
    if range.floor_inclusive {
        if range.floor != Version::empty() {
            clauses.push(item(FilterType::GreaterEq, &range.floor));
        }
    } else {
        clauses.push(Filter::Not(Box::new(item(FilterType::LessEq, &range.floor))));
    }
    if let Some(ref ceiling) = range.ceiling {
        if range.ceiling_inclusive {
            clauses.push(item(FilterType::LessEq, ceiling));
        } else {
            clauses.push(Filter::Not(Box::new(item(FilterType::GreaterEq, ceiling))));
        }
    }
    clauses
}
