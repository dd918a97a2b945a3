//! Repository snapshots: loading and the lazy refresh policy.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use obr_core::{Filter, Requirement, Resource};
use obr_util::errors::ObrResult;

use crate::document::{parse_repository, Format, Referral, RepositoryDocument};
use crate::download::Fetcher;
use crate::index::{CapabilityIndex, ProviderMatch};

/// One loaded repository document. Immutable: refreshing builds a new one.
#[derive(Debug, Clone)]
pub struct Repository {
    pub uri: String,
    pub name: Option<String>,
    /// `lastmodified` declared by the document itself.
    pub last_modified: Option<DateTime<Utc>>,
    /// Modification time reported by the transport (HTTP header or file mtime).
    pub source_modified: Option<DateTime<Utc>>,
    pub fetched_at: DateTime<Utc>,
    pub referrals: Vec<Referral>,
    index: CapabilityIndex,
}

impl Repository {
    pub fn from_document(uri: &str, doc: RepositoryDocument) -> Self {
        Self {
            uri: uri.to_string(),
            name: doc.name,
            last_modified: doc.last_modified,
            source_modified: None,
            fetched_at: Utc::now(),
            referrals: doc.referrals,
            index: CapabilityIndex::from_resources(doc.resources.into_iter().map(Arc::new)),
        }
    }

    /// Parse in-memory bytes as if fetched from `uri`.
    pub fn from_bytes(uri: &str, data: Vec<u8>, hint: Option<Format>) -> ObrResult<Self> {
        Ok(Self::from_document(uri, parse_repository(uri, data, hint)?))
    }

    pub fn resources(&self) -> &[Arc<Resource>] {
        self.index.resources()
    }

    pub fn index(&self) -> &CapabilityIndex {
        &self.index
    }

    /// Resources exposing a capability in `namespace` that satisfies `filter`.
    pub fn find_providers(&self, namespace: &str, filter: &Filter) -> Vec<Arc<Resource>> {
        self.index.find_providers(namespace, filter)
    }

    pub fn matching(&self, requirement: &Requirement) -> Vec<ProviderMatch<'_>> {
        self.index.matching(requirement)
    }

    /// The timestamp refreshes compare against.
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.source_modified.or(self.last_modified)
    }
}

/// Fetch and parse the repository at `uri`.
pub async fn load(fetcher: &Fetcher, uri: &str) -> ObrResult<Repository> {
    let fetched = fetcher.fetch(uri).await?;
    let mut repository = Repository::from_bytes(uri, fetched.bytes, None)?;
    repository.source_modified = fetched.last_modified;
    tracing::info!(
        "Loaded repository {uri} ({} resources)",
        repository.resources().len()
    );
    Ok(repository)
}

/// Result of a lazy refresh.
#[derive(Debug, Clone)]
pub enum Refreshed {
    /// The cached snapshot is still current.
    Unchanged(Arc<Repository>),
    /// A new snapshot was loaded.
    Reloaded(Arc<Repository>),
}

impl Refreshed {
    pub fn repository(&self) -> &Arc<Repository> {
        match self {
            Self::Unchanged(r) | Self::Reloaded(r) => r,
        }
    }

    pub fn into_repository(self) -> Arc<Repository> {
        match self {
            Self::Unchanged(r) | Self::Reloaded(r) => r,
        }
    }
}

/// Whether a source modified at `remote` makes the cached snapshot stale.
///
/// With a known source timestamp, stale means newer by more than `staleness`;
/// otherwise the snapshot is stale once it is older than `staleness`.
pub fn is_stale(
    cached: &Repository,
    remote: Option<DateTime<Utc>>,
    staleness: Duration,
    now: DateTime<Utc>,
) -> bool {
    let window = i64::try_from(staleness.as_millis()).unwrap_or(i64::MAX);
    match (remote, cached.modified()) {
        (Some(remote), Some(known)) => (remote - known).num_milliseconds() > window,
        _ => (now - cached.fetched_at).num_milliseconds() > window,
    }
}

/// Re-fetch `cached` only if its source changed beyond the staleness window.
pub async fn refresh(
    fetcher: &Fetcher,
    cached: &Arc<Repository>,
    staleness: Duration,
) -> ObrResult<Refreshed> {
    let remote = fetcher.last_modified(&cached.uri).await?;
    if !is_stale(cached, remote, staleness, Utc::now()) {
        tracing::debug!("Repository {} is fresh", cached.uri);
        return Ok(Refreshed::Unchanged(Arc::clone(cached)));
    }
    tracing::info!("Repository {} is stale, reloading", cached.uri);
    let fresh = load(fetcher, &cached.uri).await?;
    Ok(Refreshed::Reloaded(Arc::new(fresh)))
}
