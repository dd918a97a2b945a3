//! Core resolution algorithm: breadth-first provider selection over a
//! capability index, with failed-set backtracking.
//!
//! Every run walks a queue of `(owner, requirement)` pairs seeded from the
//! root resources and root requirements. A mandatory requirement of a pulled
//! resource that nothing satisfies rejects that resource and restarts the
//! walk without it; a mandatory root requirement that nothing satisfies ends
//! resolution with a [`ResolutionFailure`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use petgraph::graph::NodeIndex;

use obr_core::config::ResolverConfig;
use obr_core::{Capability, Requirement, Resource};
use obr_repository::{Catalog, CapabilityIndex};

use crate::failure::{Rejected, ResolutionFailure, ResolveError};
use crate::graph::{Reason, WireEdge, WiringGraph};

/// Tunables for a resolution run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolverOptions {
    /// Ignore optional requirements entirely.
    pub skip_optional: bool,
    /// Providers taken for a multiple-cardinality requirement; `0` is unbounded.
    pub max_multiple_providers: usize,
}

impl From<&ResolverConfig> for ResolverOptions {
    fn from(config: &ResolverConfig) -> Self {
        Self {
            skip_optional: config.skip_optional,
            max_multiple_providers: config.max_multiple_providers,
        }
    }
}

/// Shared flag a caller sets to abort a running resolution.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// One requirement satisfied by one capability.
#[derive(Debug, Clone)]
pub struct Wire {
    /// `None` for a root requirement.
    pub requirer: Option<Arc<Resource>>,
    pub requirement: Requirement,
    /// `None` when a global capability of the environment satisfied it.
    pub provider: Option<Arc<Resource>>,
    pub capability: Capability,
}

#[derive(Debug, Clone)]
pub struct ResolvedResource {
    pub resource: Arc<Resource>,
    /// False when only optional requirements lead to this resource.
    pub required: bool,
}

/// An optional requirement no provider was found for.
#[derive(Debug, Clone)]
pub struct Unsatisfied {
    pub requirer: Option<Arc<Resource>>,
    pub requirement: Requirement,
}

/// Successful outcome of [`Resolver::resolve`].
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Resources in the order they were first added.
    pub resources: Vec<ResolvedResource>,
    pub wires: Vec<Wire>,
    pub unsatisfied_optional: Vec<Unsatisfied>,
    pub graph: WiringGraph,
}

impl Resolution {
    pub fn resources(&self) -> Vec<&Arc<Resource>> {
        self.resources.iter().map(|r| &r.resource).collect()
    }

    pub fn required(&self) -> Vec<&Arc<Resource>> {
        self.resources
            .iter()
            .filter(|r| r.required)
            .map(|r| &r.resource)
            .collect()
    }

    pub fn optional(&self) -> Vec<&Arc<Resource>> {
        self.resources
            .iter()
            .filter(|r| !r.required)
            .map(|r| &r.resource)
            .collect()
    }

    pub fn contains(&self, resource: &Resource) -> bool {
        self.resources.iter().any(|r| *r.resource == *resource)
    }

    /// Wires whose consumer is `resource`.
    pub fn wires_of(&self, resource: &Resource) -> Vec<&Wire> {
        self.wires
            .iter()
            .filter(|w| w.requirer.as_deref() == Some(resource))
            .collect()
    }

    /// Providers before consumers. See [`WiringGraph::install_order`].
    pub fn install_order(&self) -> Vec<&Arc<Resource>> {
        self.graph.install_order()
    }

    pub fn reasons(&self, resource: &Resource) -> Vec<Reason<'_>> {
        self.graph.reasons(resource)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Position of a resource: indexes below `index.len()` point into the
/// capability index, the rest into the resolver's own added resources.
type Slot = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Owner {
    Root,
    Resource(Slot),
}

#[derive(Debug, Clone, Copy)]
enum Provider<'s> {
    Global(&'s Capability),
    Resource(Slot, &'s Capability),
}

struct PendingWire<'s> {
    owner: Owner,
    requirement: &'s Requirement,
    provider: Provider<'s>,
}

#[derive(Default)]
struct Walk<'s> {
    added: Vec<Slot>,
    parent: HashMap<Slot, Owner>,
    wires: Vec<PendingWire<'s>>,
    unsatisfied: Vec<(Owner, &'s Requirement)>,
}

impl Walk<'_> {
    fn contains(&self, slot: Slot) -> bool {
        self.parent.contains_key(&slot)
    }
}

/// Why a resource was rejected: its requirement with no usable provider,
/// the chain that pulled it in, and the providers already rejected for it.
struct Exclusion {
    requirement: Requirement,
    chain: Vec<Slot>,
    rejected: Vec<(Slot, Capability)>,
}

enum Step {
    Restart(Slot, Exclusion),
    Fail(ResolutionFailure),
    Cancelled,
}

/// Resolves requirements against an immutable [`CapabilityIndex`].
pub struct Resolver<'a> {
    index: &'a CapabilityIndex,
    /// Root resources that are not part of the index.
    extra: Vec<Arc<Resource>>,
    roots: Vec<Slot>,
    requirements: Vec<Requirement>,
    globals: Vec<Capability>,
    options: ResolverOptions,
    cancel: Option<CancelFlag>,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a CapabilityIndex) -> Self {
        Self {
            index,
            extra: Vec::new(),
            roots: Vec::new(),
            requirements: Vec::new(),
            globals: Vec::new(),
            options: ResolverOptions::default(),
            cancel: None,
        }
    }

    /// Resolve against the resources of a catalog snapshot.
    pub fn for_catalog(catalog: &'a Catalog) -> Self {
        Self::new(catalog.index())
    }

    pub fn with_options(mut self, options: ResolverOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// A requirement the result must satisfy.
    pub fn add_requirement(&mut self, requirement: Requirement) {
        self.requirements.push(requirement);
    }

    /// A resource that must be part of the result, with all its requirements.
    pub fn add_resource(&mut self, resource: Arc<Resource>) {
        let slot = match self.index.resources().iter().position(|r| **r == *resource) {
            Some(slot) => slot,
            None => match self.extra.iter().position(|r| **r == *resource) {
                Some(i) => self.index.len() + i,
                None => {
                    self.extra.push(resource);
                    self.index.len() + self.extra.len() - 1
                }
            },
        };
        if !self.roots.contains(&slot) {
            self.roots.push(slot);
        }
    }

    /// A capability the environment already provides.
    pub fn add_global_capability(&mut self, capability: Capability) {
        self.globals.push(capability);
    }

    /// Run the resolution.
    ///
    /// Each restart rejects one more resource, so the number of runs is
    /// bounded by the number of candidate resources.
    pub fn resolve(&self) -> Result<Resolution, ResolveError> {
        tracing::info!(
            "Resolving {} requirements and {} resources against {} candidates",
            self.requirements.len(),
            self.roots.len(),
            self.index.len() + self.extra.len()
        );

        let mut excluded: HashMap<Slot, Exclusion> = HashMap::new();
        loop {
            match self.walk(&excluded) {
                Ok(walk) => {
                    let resolution = self.finish(walk);
                    tracing::info!(
                        "Resolved {} resources ({} rejected)",
                        resolution.len(),
                        excluded.len()
                    );
                    return Ok(resolution);
                }
                Err(Step::Restart(slot, exclusion)) => {
                    tracing::debug!(
                        "Rejecting {}: unable to satisfy {}, restarting resolution",
                        self.resource(slot),
                        exclusion.requirement
                    );
                    excluded.insert(slot, exclusion);
                }
                Err(Step::Fail(failure)) => {
                    tracing::warn!("{failure}");
                    return Err(failure.into());
                }
                Err(Step::Cancelled) => {
                    tracing::debug!("Resolution cancelled");
                    return Err(ResolveError::Cancelled);
                }
            }
        }
    }

    fn resource(&self, slot: Slot) -> &Arc<Resource> {
        match self.index.get(slot) {
            Some(r) => r,
            None => &self.extra[slot - self.index.len()],
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }

    fn walk(&self, excluded: &HashMap<Slot, Exclusion>) -> Result<Walk<'_>, Step> {
        let mut walk = Walk::default();
        let mut queue: VecDeque<(Owner, &Requirement)> = VecDeque::new();

        for &slot in &self.roots {
            self.include(&mut walk, &mut queue, slot, Owner::Root);
        }
        for requirement in &self.requirements {
            queue.push_back((Owner::Root, requirement));
        }

        while let Some((owner, requirement)) = queue.pop_front() {
            if self.is_cancelled() {
                return Err(Step::Cancelled);
            }
            if !requirement.resolvable || (requirement.optional && self.options.skip_optional) {
                continue;
            }

            let globals: Vec<&Capability> = self
                .globals
                .iter()
                .filter(|c| requirement.is_satisfied_by(c))
                .collect();
            if !globals.is_empty() {
                let take = self.take(requirement, globals.len());
                for capability in globals.into_iter().take(take) {
                    walk.wires.push(PendingWire {
                        owner,
                        requirement,
                        provider: Provider::Global(capability),
                    });
                }
                continue;
            }

            let (mut candidates, rejected): (Vec<_>, Vec<_>) = self
                .candidates(requirement)
                .into_iter()
                .partition(|(slot, _)| !excluded.contains_key(slot));

            if candidates.is_empty() {
                if requirement.optional {
                    tracing::debug!("No provider for optional {requirement}");
                    walk.unsatisfied.push((owner, requirement));
                    continue;
                }
                return Err(match owner {
                    Owner::Resource(slot) if !self.roots.contains(&slot) => Step::Restart(
                        slot,
                        Exclusion {
                            requirement: requirement.clone(),
                            chain: self.chain(&walk, owner),
                            rejected: rejected.into_iter().map(|(s, c)| (s, c.clone())).collect(),
                        },
                    ),
                    _ => Step::Fail(self.failure(&walk, excluded, owner, requirement, rejected)),
                });
            }

            self.rank(&walk, &mut candidates);
            let take = self.take(requirement, candidates.len());
            for (slot, capability) in candidates.into_iter().take(take) {
                walk.wires.push(PendingWire {
                    owner,
                    requirement,
                    provider: Provider::Resource(slot, capability),
                });
                self.include(&mut walk, &mut queue, slot, owner);
            }
        }

        Ok(walk)
    }

    /// Add `slot` to the result set and queue its requirements. No-op when
    /// already present, which also stops cycles.
    fn include<'s>(
        &'s self,
        walk: &mut Walk<'s>,
        queue: &mut VecDeque<(Owner, &'s Requirement)>,
        slot: Slot,
        owner: Owner,
    ) {
        if walk.contains(slot) {
            return;
        }
        let resource = self.resource(slot);
        tracing::debug!("Adding {resource}");
        walk.parent.insert(slot, owner);
        walk.added.push(slot);
        for requirement in &resource.requirements {
            queue.push_back((Owner::Resource(slot), requirement));
        }
    }

    fn take(&self, requirement: &Requirement, available: usize) -> usize {
        match (requirement.multiple, self.options.max_multiple_providers) {
            (false, _) => 1,
            (true, 0) => available,
            (true, max) => available.min(max),
        }
    }

    /// Matching capabilities, one per resource (the highest version), in
    /// index order.
    fn candidates(&self, requirement: &Requirement) -> Vec<(Slot, &Capability)> {
        let indexed = self
            .index
            .matching(requirement)
            .into_iter()
            .map(|m| (m.resource_index, m.capability));
        let added = self.extra.iter().enumerate().flat_map(move |(i, r)| {
            r.capabilities
                .iter()
                .filter(move |c| requirement.is_satisfied_by(c))
                .map(move |c| (self.index.len() + i, c))
        });

        let mut found: Vec<(Slot, &Capability)> = Vec::new();
        let mut position: HashMap<Slot, usize> = HashMap::new();
        for (slot, capability) in indexed.chain(added) {
            match position.get(&slot) {
                Some(&i) => {
                    if capability.version() > found[i].1.version() {
                        found[i].1 = capability;
                    }
                }
                None => {
                    position.insert(slot, found.len());
                    found.push((slot, capability));
                }
            }
        }
        found
    }

    /// Resources already in the result first, then highest version. The
    /// sort is stable, so ties keep index order.
    fn rank(&self, walk: &Walk<'_>, candidates: &mut [(Slot, &Capability)]) {
        let version = |(slot, capability): &(Slot, &Capability)| {
            capability
                .version()
                .unwrap_or_else(|| self.resource(*slot).version.clone())
        };
        candidates.sort_by(|a, b| {
            walk.contains(b.0)
                .cmp(&walk.contains(a.0))
                .then_with(|| version(b).cmp(&version(a)))
        });
    }

    fn owner_resource(&self, owner: Owner) -> Option<Arc<Resource>> {
        match owner {
            Owner::Root => None,
            Owner::Resource(slot) => Some(Arc::clone(self.resource(slot))),
        }
    }

    /// Slots from the root query down to `owner`.
    fn chain(&self, walk: &Walk<'_>, owner: Owner) -> Vec<Slot> {
        let mut chain = Vec::new();
        let mut current = owner;
        while let Owner::Resource(slot) = current {
            if chain.contains(&slot) {
                break;
            }
            chain.push(slot);
            current = walk.parent.get(&slot).copied().unwrap_or(Owner::Root);
        }
        chain.reverse();
        chain
    }

    fn failure(
        &self,
        walk: &Walk<'_>,
        excluded: &HashMap<Slot, Exclusion>,
        owner: Owner,
        requirement: &Requirement,
        rejected: Vec<(Slot, &Capability)>,
    ) -> ResolutionFailure {
        let mut seen = HashSet::new();
        ResolutionFailure {
            requirement: requirement.clone(),
            requirer: self.owner_resource(owner),
            chain: self.resources_of(&self.chain(walk, owner)),
            rejected: rejected
                .into_iter()
                .filter_map(|(slot, capability)| {
                    self.rejection(slot, capability, excluded, &mut seen)
                })
                .collect(),
        }
    }

    /// Rebuild the rejection of `slot` with the rejections beneath it. A
    /// resource already reported higher up is listed without its causes.
    fn rejection(
        &self,
        slot: Slot,
        capability: &Capability,
        excluded: &HashMap<Slot, Exclusion>,
        seen: &mut HashSet<Slot>,
    ) -> Option<Rejected> {
        let exclusion = excluded.get(&slot)?;
        let rejected = if seen.insert(slot) {
            exclusion
                .rejected
                .iter()
                .filter_map(|(s, c)| self.rejection(*s, c, excluded, seen))
                .collect()
        } else {
            Vec::new()
        };
        Some(Rejected {
            resource: Arc::clone(self.resource(slot)),
            capability: capability.clone(),
            requirement: exclusion.requirement.clone(),
            chain: self.resources_of(&exclusion.chain),
            rejected,
        })
    }

    fn resources_of(&self, slots: &[Slot]) -> Vec<Arc<Resource>> {
        slots.iter().map(|&s| Arc::clone(self.resource(s))).collect()
    }

    fn finish(&self, walk: Walk<'_>) -> Resolution {
        let mut graph = WiringGraph::new();
        let mut nodes: HashMap<Slot, NodeIndex> = HashMap::new();
        for &slot in &walk.added {
            nodes.insert(slot, graph.add_resource(Arc::clone(self.resource(slot))));
        }
        let root = graph.root();
        let node_of = |owner: Owner| match owner {
            Owner::Root => Some(root),
            Owner::Resource(slot) => nodes.get(&slot).copied(),
        };

        let mut edges = Vec::new();
        let mut wires = Vec::with_capacity(walk.wires.len());
        let mut mandatory: HashMap<Owner, Vec<Slot>> = HashMap::new();
        for pending in &walk.wires {
            let (provider, capability) = match pending.provider {
                Provider::Global(capability) => (None, capability),
                Provider::Resource(slot, capability) => {
                    if let (Some(from), Some(&to)) = (node_of(pending.owner), nodes.get(&slot)) {
                        edges.push((from, to, pending.requirement, capability));
                    }
                    if !pending.requirement.optional {
                        mandatory.entry(pending.owner).or_default().push(slot);
                    }
                    (Some(Arc::clone(self.resource(slot))), capability)
                }
            };
            wires.push(Wire {
                requirer: self.owner_resource(pending.owner),
                requirement: pending.requirement.clone(),
                provider,
                capability: capability.clone(),
            });
        }
        for (from, to, requirement, capability) in edges {
            graph.add_wire(
                from,
                to,
                WireEdge {
                    requirement: requirement.clone(),
                    capability: capability.clone(),
                },
            );
        }

        // required = reachable from the roots over mandatory wires
        let mut required: HashSet<Slot> = self.roots.iter().copied().collect();
        let mut queue: VecDeque<Owner> = VecDeque::from([Owner::Root]);
        queue.extend(self.roots.iter().map(|&s| Owner::Resource(s)));
        while let Some(owner) = queue.pop_front() {
            for &slot in mandatory.get(&owner).map(Vec::as_slice).unwrap_or_default() {
                if required.insert(slot) {
                    queue.push_back(Owner::Resource(slot));
                }
            }
        }

        Resolution {
            resources: walk
                .added
                .iter()
                .map(|&slot| ResolvedResource {
                    resource: Arc::clone(self.resource(slot)),
                    required: required.contains(&slot),
                })
                .collect(),
            wires,
            unsatisfied_optional: walk
                .unsatisfied
                .iter()
                .map(|&(owner, requirement)| Unsatisfied {
                    requirer: self.owner_resource(owner),
                    requirement: requirement.clone(),
                })
                .collect(),
            graph,
        }
    }
}
