//! Core data types for OBR capability resolution.
//!
//! This crate defines versions and version ranges, typed attribute values,
//! LDAP-style filters, capabilities, requirements, resources, and the user
//! configuration.
//!
//! This crate is intentionally free of async code and network I/O.

pub mod attribute;
pub mod capability;
pub mod config;
pub mod filter;
pub mod resource;
pub mod version;

pub use attribute::{AttributeValue, Attributes};
pub use capability::{identity_requirement, namespace, Capability, Requirement};
pub use filter::{Filter, FilterType, SimpleItem, SubstringPattern};
pub use resource::{Resource, ResourceBuilder};
pub use version::{Version, VersionRange};
