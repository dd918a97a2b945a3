//! Resolution failure reporting.

use std::fmt;
use std::sync::Arc;

use miette::Diagnostic;
use thiserror::Error;

use obr_core::{Capability, Requirement, Resource};

/// A provider that matched the filter but was ruled out because one of its
/// own mandatory requirements could not be satisfied.
#[derive(Debug, Clone)]
pub struct Rejected {
    pub resource: Arc<Resource>,
    pub capability: Capability,
    /// The requirement of `resource` that had no usable provider.
    pub requirement: Requirement,
    /// Resources from the root query down to `resource` when it was rejected.
    pub chain: Vec<Arc<Resource>>,
    /// Providers of `requirement` that were themselves rejected.
    pub rejected: Vec<Rejected>,
}

impl Rejected {
    fn write(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        write!(
            f,
            "\n{indent}rejected: {}, unable to satisfy {}",
            self.resource, self.requirement
        )?;
        if self.chain.len() > 1 {
            write!(f, "\n{indent}  chain: {}", join_chain(&self.chain))?;
        }
        for nested in &self.rejected {
            nested.write(f, depth + 1)?;
        }
        Ok(())
    }
}

fn join_chain(chain: &[Arc<Resource>]) -> String {
    chain
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// A mandatory requirement nothing could satisfy.
#[derive(Debug, Clone)]
pub struct ResolutionFailure {
    pub requirement: Requirement,
    /// The resource declaring the requirement; `None` for a root requirement.
    pub requirer: Option<Arc<Resource>>,
    /// Resources from the root query down to the requirer.
    pub chain: Vec<Arc<Resource>>,
    pub rejected: Vec<Rejected>,
}

impl ResolutionFailure {
    /// The chain as `a (1.0.0) -> b (2.0.0)`, or `<root>` when empty.
    pub fn chain_string(&self) -> String {
        if self.chain.is_empty() {
            return "<root>".to_string();
        }
        join_chain(&self.chain)
    }

    /// The deepest rejections: requirements that failed for lack of any
    /// provider rather than because their providers were rejected in turn.
    pub fn root_causes(&self) -> Vec<&Rejected> {
        let mut causes = Vec::new();
        let mut stack: Vec<&Rejected> = self.rejected.iter().rev().collect();
        while let Some(r) = stack.pop() {
            if r.rejected.is_empty() {
                causes.push(r);
            } else {
                stack.extend(r.rejected.iter().rev());
            }
        }
        causes
    }
}

impl fmt::Display for ResolutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unable to satisfy {}", self.requirement)?;
        match self.requirer {
            Some(ref r) => write!(f, " required by {r}")?,
            None => f.write_str(" required by the root query")?,
        }
        if let Some(ref comment) = self.requirement.comment {
            write!(f, " ({comment})")?;
        }
        if self.chain.len() > 1 {
            write!(f, "\n  chain: {}", self.chain_string())?;
        }
        for r in &self.rejected {
            r.write(f, 1)?;
        }
        Ok(())
    }
}

/// Errors returned by [`crate::Resolver::resolve`].
#[derive(Debug, Error, Diagnostic)]
pub enum ResolveError {
    #[error("{0}")]
    #[diagnostic(
        code(obr::resolve::unsatisfied),
        help("Add a repository that provides the missing capability, or mark the requirement optional")
    )]
    Unsatisfied(Box<ResolutionFailure>),

    #[error("Resolution was cancelled")]
    Cancelled,
}

impl ResolveError {
    pub fn failure(&self) -> Option<&ResolutionFailure> {
        match self {
            Self::Unsatisfied(f) => Some(f),
            Self::Cancelled => None,
        }
    }
}

impl From<ResolutionFailure> for ResolveError {
    fn from(failure: ResolutionFailure) -> Self {
        Self::Unsatisfied(Box::new(failure))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obr_core::{namespace, Version};

    fn bundle(name: &str) -> Arc<Resource> {
        Arc::new(
            Resource::builder("")
                .symbolic_name(name)
                .version(Version::new(1, 0, 0))
                .build(),
        )
    }

    #[test]
    fn root_failure_message() {
        let failure = ResolutionFailure {
            requirement: Requirement::parse(namespace::PACKAGE, "(osgi.wiring.package=org.missing)")
                .unwrap(),
            requirer: None,
            chain: Vec::new(),
            rejected: Vec::new(),
        };
        assert_eq!(
            failure.to_string(),
            "Unable to satisfy osgi.wiring.package: (osgi.wiring.package=org.missing) required by the root query"
        );
        assert_eq!(failure.chain_string(), "<root>");
    }

    #[test]
    fn chain_and_rejected_are_listed() {
        let a = bundle("a");
        let b = bundle("b");
        let c = bundle("c");
        let d = bundle("d");
        let failure = ResolutionFailure {
            requirement: Requirement::parse(namespace::PACKAGE, "(osgi.wiring.package=x)")
                .unwrap()
                .with_comment("needs x"),
            requirer: Some(b.clone()),
            chain: vec![a, b],
            rejected: vec![Rejected {
                capability: Capability::new(namespace::PACKAGE).with_attribute(namespace::PACKAGE, "x"),
                resource: c.clone(),
                requirement: Requirement::parse(namespace::PACKAGE, "(osgi.wiring.package=y)")
                    .unwrap(),
                chain: vec![c.clone()],
                rejected: vec![Rejected {
                    capability: Capability::new(namespace::PACKAGE)
                        .with_attribute(namespace::PACKAGE, "y"),
                    resource: d.clone(),
                    requirement: Requirement::parse(namespace::PACKAGE, "(osgi.wiring.package=z)")
                        .unwrap(),
                    chain: vec![c, d],
                    rejected: Vec::new(),
                }],
            }],
        };
        let s = failure.to_string();
        assert!(s.contains("required by b (1.0.0) (needs x)"), "{s}");
        assert!(s.contains("chain: a (1.0.0) -> b (1.0.0)"), "{s}");
        assert!(
            s.contains("\n  rejected: c (1.0.0), unable to satisfy osgi.wiring.package: (osgi.wiring.package=y)"),
            "{s}"
        );
        assert!(
            s.contains("\n    rejected: d (1.0.0), unable to satisfy osgi.wiring.package: (osgi.wiring.package=z)"),
            "{s}"
        );
        assert!(s.contains("\n      chain: c (1.0.0) -> d (1.0.0)"), "{s}");

        let causes = failure.root_causes();
        assert_eq!(causes.len(), 1);
        assert_eq!(causes[0].resource.symbolic_name.as_deref(), Some("d"));

        let err = ResolveError::from(failure);
        assert!(err.failure().is_some());
        assert!(ResolveError::Cancelled.failure().is_none());
    }
}
