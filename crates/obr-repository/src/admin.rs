//! Composite view over registered repositories.
//!
//! Readers take an `Arc<Catalog>` snapshot and never block on fetches:
//! updates load documents first, then swap the snapshot in one step.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::RwLock;

use obr_core::config::{ObrConfig, RefreshConfig};
use obr_core::filter::{FilterType, SimpleItem};
use obr_core::{Filter, Requirement, Resource, Version};
use obr_util::errors::{ObrError, ObrResult};

use crate::document::base_url;
use crate::download::Fetcher;
use crate::index::{CapabilityIndex, ProviderMatch};
use crate::repository::{self, Refreshed, Repository};

/// A registered repository and the documents reached through its referrals.
#[derive(Debug, Clone)]
pub struct Source {
    pub uri: String,
    /// The root document first, then referred documents in discovery order.
    pub repositories: Vec<Arc<Repository>>,
}

/// Immutable union of every loaded repository.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    sources: Vec<Source>,
    repositories: Vec<Arc<Repository>>,
    index: CapabilityIndex,
}

impl Catalog {
    pub fn new(sources: Vec<Source>) -> Self {
        let mut repositories: Vec<Arc<Repository>> = Vec::new();
        for source in &sources {
            for repo in &source.repositories {
                if !repositories.iter().any(|r| r.uri == repo.uri) {
                    repositories.push(Arc::clone(repo));
                }
            }
        }

        // the first repository to declare an identity wins
        let mut seen = HashSet::new();
        let mut index = CapabilityIndex::new();
        for repo in &repositories {
            for resource in repo.resources() {
                let fresh = match identity_key(repo, resource) {
                    Some(key) => seen.insert(key),
                    None => true,
                };
                if fresh {
                    index.insert(Arc::clone(resource));
                } else {
                    tracing::debug!("Skipping duplicate resource {resource} from {}", repo.uri);
                }
            }
        }

        Self {
            sources,
            repositories,
            index,
        }
    }

    pub fn sources(&self) -> &[Source] {
        &self.sources
    }

    pub fn repositories(&self) -> &[Arc<Repository>] {
        &self.repositories
    }

    pub fn resources(&self) -> &[Arc<Resource>] {
        self.index.resources()
    }

    pub fn index(&self) -> &CapabilityIndex {
        &self.index
    }

    pub fn find_providers(&self, namespace: &str, filter: &Filter) -> Vec<Arc<Resource>> {
        self.index.find_providers(namespace, filter)
    }

    pub fn matching(&self, requirement: &Requirement) -> Vec<ProviderMatch<'_>> {
        self.index.matching(requirement)
    }

    /// Resources whose identity properties (`symbolicname`, `version`,
    /// `presentationname`, `category`, ...) satisfy `filter`.
    pub fn discover_resources(&self, filter: &Filter) -> Vec<Arc<Resource>> {
        self.index.discover(filter)
    }

    /// Resources whose symbolic or presentation name equals `name`,
    /// optionally pinned to one version.
    pub fn find_by_name(&self, name: &str, version: Option<&Version>) -> Vec<Arc<Resource>> {
        self.discover_resources(&name_filter(name, version))
    }
}

/// `(|(presentationname=NAME)(symbolicname=NAME))`, and-ed with `(version=V)`.
pub fn name_filter(name: &str, version: Option<&Version>) -> Filter {
    let names = Filter::Or(vec![
        Filter::Item(SimpleItem::new("presentationname", FilterType::Equal, name)),
        Filter::Item(SimpleItem::new("symbolicname", FilterType::Equal, name)),
    ]);
    match version {
        None => names,
        Some(v) => Filter::And(vec![
            names,
            Filter::Item(SimpleItem::new("version", FilterType::Equal, &v.to_string())),
        ]),
    }
}

/// Paths and the `file:` URLs referrals resolve to name the same document.
fn visit_key(uri: &str) -> String {
    base_url(uri).map_or_else(|| uri.to_string(), |url| url.to_string())
}

/// Key resources are deduplicated on. Named resources compare across
/// repositories; a nameless one only against its own repository's ids, and
/// not at all when it has no id.
fn identity_key(repo: &Repository, resource: &Resource) -> Option<String> {
    match resource.symbolic_name {
        Some(ref name) => Some(format!("{name}/{}", resource.version)),
        None if resource.id.is_empty() => None,
        None => Some(format!("{}#{}", repo.uri, resource.id)),
    }
}

/// Outcome of [`RepositoryAdmin::refresh_all`] and [`RepositoryAdmin::reload`].
#[derive(Debug, Default)]
pub struct RefreshSummary {
    pub reloaded: Vec<String>,
    pub unchanged: Vec<String>,
    /// Documents that could not be fetched; cached snapshots stay in use.
    pub failed: Vec<(String, ObrError)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Lazy,
    Force,
}

/// Registry of repositories with an atomically swapped [`Catalog`].
pub struct RepositoryAdmin {
    fetcher: Fetcher,
    refresh: RefreshConfig,
    catalog: RwLock<Arc<Catalog>>,
    update: tokio::sync::Mutex<()>,
}

impl RepositoryAdmin {
    pub fn new(config: &ObrConfig) -> ObrResult<Self> {
        Ok(Self {
            fetcher: Fetcher::new(&config.fetch)?,
            refresh: config.refresh.clone(),
            catalog: RwLock::new(Arc::new(Catalog::default())),
            update: tokio::sync::Mutex::new(()),
        })
    }

    /// Create an admin and register every repository listed in the config.
    pub async fn from_config(config: &ObrConfig) -> ObrResult<Self> {
        let admin = Self::new(config)?;
        for uri in &config.repositories {
            admin.add_repository(uri).await?;
        }
        Ok(admin)
    }

    /// The current snapshot. Cheap; never waits for fetches.
    pub fn snapshot(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read())
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    /// Load `uri` and its referrals and add them to the catalog.
    /// Re-adding a registered URI reloads it.
    pub async fn add_repository(&self, uri: &str) -> ObrResult<Arc<Repository>> {
        let _guard = self.update.lock().await;
        let mut summary = RefreshSummary::default();
        let source = self
            .load_source(uri, Mode::Force, &HashMap::new(), &mut summary)
            .await?;
        let root = Arc::clone(&source.repositories[0]);

        let current = self.snapshot();
        let mut sources: Vec<Source> = current.sources().to_vec();
        match sources.iter_mut().find(|s| s.uri == uri) {
            Some(existing) => *existing = source,
            None => sources.push(source),
        }
        self.swap(Catalog::new(sources));
        Ok(root)
    }

    /// Unregister `uri`. Returns whether it was registered.
    pub async fn remove_repository(&self, uri: &str) -> bool {
        let _guard = self.update.lock().await;
        let current = self.snapshot();
        let before = current.sources().len();
        let sources: Vec<Source> = current
            .sources()
            .iter()
            .filter(|s| s.uri != uri)
            .cloned()
            .collect();
        if sources.len() == before {
            return false;
        }
        self.swap(Catalog::new(sources));
        true
    }

    /// Re-fetch documents whose sources changed beyond the staleness window.
    pub async fn refresh_all(&self) -> RefreshSummary {
        self.update_all(Mode::Lazy).await
    }

    /// Re-fetch every document unconditionally.
    pub async fn reload(&self) -> RefreshSummary {
        self.update_all(Mode::Force).await
    }

    async fn update_all(&self, mode: Mode) -> RefreshSummary {
        let _guard = self.update.lock().await;
        let current = self.snapshot();
        let mut summary = RefreshSummary::default();
        let mut sources = Vec::with_capacity(current.sources().len());

        for source in current.sources() {
            let cached: HashMap<String, Arc<Repository>> = source
                .repositories
                .iter()
                .map(|r| (r.uri.clone(), Arc::clone(r)))
                .collect();
            match self.load_source(&source.uri, mode, &cached, &mut summary).await {
                Ok(updated) => sources.push(updated),
                // root unreachable: keep the whole cached source
                Err(_) => sources.push(source.clone()),
            }
        }

        if !summary.reloaded.is_empty() {
            self.swap(Catalog::new(sources));
        }
        tracing::info!(
            "Refresh finished: {} reloaded, {} unchanged, {} failed",
            summary.reloaded.len(),
            summary.unchanged.len(),
            summary.failed.len()
        );
        summary
    }

    fn swap(&self, catalog: Catalog) {
        tracing::debug!(
            "Swapping catalog snapshot: {} repositories, {} resources",
            catalog.repositories().len(),
            catalog.resources().len()
        );
        *self.catalog.write() = Arc::new(catalog);
    }

    /// Walk `root` and its referrals breadth-first.
    ///
    /// Each referral gets `min(depth, remaining - 1)` further hops; the root
    /// starts with the configured maximum. A failure on the root is returned;
    /// failures below it are recorded and skipped.
    async fn load_source(
        &self,
        root: &str,
        mode: Mode,
        cached: &HashMap<String, Arc<Repository>>,
        summary: &mut RefreshSummary,
    ) -> ObrResult<Source> {
        let mut repositories = Vec::new();
        let mut visited = HashSet::new();
        let mut queue = VecDeque::from([(root.to_string(), self.refresh.max_referral_depth)]);

        while let Some((uri, hops)) = queue.pop_front() {
            if !visited.insert(visit_key(&uri)) {
                continue;
            }
            let is_root = uri == root;

            let repo = match self.obtain(&uri, mode, cached.get(&uri), summary).await {
                Ok(repo) => repo,
                Err(e) if is_root => {
                    tracing::warn!("Failed to load repository {uri}: {e}");
                    return Err(e);
                }
                Err(e) => {
                    tracing::warn!("Skipping referral {uri}: {e}");
                    summary.failed.push((uri, e));
                    continue;
                }
            };

            if hops > 0 {
                for referral in &repo.referrals {
                    let next = referral.depth.map_or(hops - 1, |d| d.min(hops - 1));
                    tracing::debug!("Following referral {} from {uri} ({next} hops left)", referral.url);
                    queue.push_back((referral.url.clone(), next));
                }
            }
            repositories.push(repo);
        }

        Ok(Source {
            uri: root.to_string(),
            repositories,
        })
    }

    /// A current snapshot of one document. When `cached` exists and the
    /// fetch fails, the cached snapshot is returned and the failure recorded.
    async fn obtain(
        &self,
        uri: &str,
        mode: Mode,
        cached: Option<&Arc<Repository>>,
        summary: &mut RefreshSummary,
    ) -> ObrResult<Arc<Repository>> {
        let result = match (cached, mode) {
            (Some(repo), Mode::Lazy) => {
                repository::refresh(&self.fetcher, repo, self.refresh.staleness()).await
            }
            _ => repository::load(&self.fetcher, uri)
                .await
                .map(|r| Refreshed::Reloaded(Arc::new(r))),
        };

        match (result, cached) {
            (Ok(Refreshed::Unchanged(repo)), _) => {
                summary.unchanged.push(uri.to_string());
                Ok(repo)
            }
            (Ok(Refreshed::Reloaded(repo)), _) => {
                summary.reloaded.push(uri.to_string());
                Ok(repo)
            }
            (Err(e), Some(repo)) => {
                tracing::warn!("Keeping cached snapshot of {uri}: {e}");
                summary.failed.push((uri.to_string(), e));
                Ok(Arc::clone(repo))
            }
            (Err(e), None) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use obr_core::namespace;

    fn repo(uri: &str, xml: &str) -> Arc<Repository> {
        Arc::new(Repository::from_bytes(uri, xml.as_bytes().to_vec(), None).unwrap())
    }

    #[test]
    fn catalog_merges_and_deduplicates() {
        let a = repo(
            "mem:a",
            r#"<repository><resource symbolicname="x" version="1"/><resource symbolicname="y" version="1"/></repository>"#,
        );
        let b = repo(
            "mem:b",
            r#"<repository><resource symbolicname="x" version="1"/><resource symbolicname="x" version="2"/></repository>"#,
        );
        let catalog = Catalog::new(vec![
            Source {
                uri: "mem:a".into(),
                repositories: vec![a.clone()],
            },
            Source {
                uri: "mem:b".into(),
                repositories: vec![b, a],
            },
        ]);
        assert_eq!(catalog.repositories().len(), 2);
        let ids: Vec<_> = catalog.resources().iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, ["x/1.0.0", "y/1.0.0", "x/2.0.0"]);

        let by_name = catalog.find_by_name("x", None);
        assert_eq!(by_name.len(), 2);
        let pinned = catalog.find_by_name("x", Some(&Version::new(2, 0, 0)));
        assert_eq!(pinned.len(), 1);

        let any = Filter::match_all();
        assert_eq!(catalog.find_providers(namespace::IDENTITY, &any).len(), 3);
    }

    #[test]
    fn nameless_resources_are_kept() {
        let json = repo(
            "mem:json",
            r#"{"resources": [
                {"capabilities": [{"namespace": "osgi.wiring.package", "attributes": {"osgi.wiring.package": "a"}}]},
                {"capabilities": [{"namespace": "osgi.wiring.package", "attributes": {"osgi.wiring.package": "b"}}]}
            ]}"#,
        );
        let xml = repo(
            "mem:xml",
            r#"<repository><resource id="7"/><resource id="7"/><resource id="8"/></repository>"#,
        );
        let other = repo("mem:other", r#"<repository><resource id="7"/></repository>"#);
        assert_eq!(json.resources().len(), 2);

        let catalog = Catalog::new(vec![Source {
            uri: "mem:json".into(),
            repositories: vec![json, xml, other],
        }]);
        let ids: Vec<_> = catalog.resources().iter().map(|r| r.id.clone()).collect();
        assert_eq!(ids, ["", "", "7", "8", "7"]);
    }
}
