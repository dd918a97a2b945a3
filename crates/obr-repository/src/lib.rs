//! Bundle repository documents: XML/JSON parsing, gzip/zip unwrapping,
//! bundle manifests, file and HTTP fetching, a namespace-bucketed
//! capability index, lazy refresh, and a composite admin with atomic
//! snapshot swaps.

pub mod admin;
pub mod document;
pub mod download;
pub mod index;
pub mod json;
pub mod manifest;
pub mod repository;
pub mod writer;
pub mod xml;

pub use admin::{Catalog, RefreshSummary, RepositoryAdmin};
pub use document::{parse_repository, Format, Referral, RepositoryDocument};
pub use download::Fetcher;
pub use index::{CapabilityIndex, ProviderMatch};
pub use manifest::{load_bundle, resource_from_jar, resource_from_manifest, Manifest};
pub use repository::{load, refresh, Refreshed, Repository};
pub use writer::write_repository;
