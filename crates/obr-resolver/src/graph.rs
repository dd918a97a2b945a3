//! Wiring graph construction and traversal.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use obr_core::{Capability, Requirement, Resource};

/// Edge label: the requirement of the source satisfied by a capability of the target.
#[derive(Debug, Clone)]
pub struct WireEdge {
    pub requirement: Requirement,
    pub capability: Capability,
}

/// Why a resource is part of a resolution.
#[derive(Debug, Clone, Copy)]
pub struct Reason<'a> {
    /// `None` when the root query asked for it.
    pub requirer: Option<&'a Arc<Resource>>,
    pub requirement: &'a Requirement,
}

/// Resolved resources as nodes, wires as consumer -> provider edges.
///
/// Node 0 is the root query; resource nodes follow in first-added order.
/// Capabilities supplied by the environment have no node.
#[derive(Debug, Clone)]
pub struct WiringGraph {
    graph: DiGraph<Option<Arc<Resource>>, WireEdge>,
    root: NodeIndex,
}

impl WiringGraph {
    pub fn new() -> Self {
        let mut graph = DiGraph::new();
        let root = graph.add_node(None);
        Self { graph, root }
    }

    pub fn root(&self) -> NodeIndex {
        self.root
    }

    /// Add a resource node. Callers add each resource once.
    pub fn add_resource(&mut self, resource: Arc<Resource>) -> NodeIndex {
        self.graph.add_node(Some(resource))
    }

    /// Add a wire from `from` (consumer) to `to` (provider).
    pub fn add_wire(&mut self, from: NodeIndex, to: NodeIndex, edge: WireEdge) {
        self.graph.add_edge(from, to, edge);
    }

    /// Look up the node of a resource.
    pub fn find(&self, resource: &Resource) -> Option<NodeIndex> {
        self.graph
            .node_indices()
            .find(|&idx| self.graph[idx].as_deref() == Some(resource))
    }

    pub fn resource(&self, idx: NodeIndex) -> Option<&Arc<Resource>> {
        self.graph[idx].as_ref()
    }

    /// All resources in first-added order.
    pub fn resources(&self) -> Vec<&Arc<Resource>> {
        self.graph
            .node_indices()
            .filter_map(|idx| self.graph[idx].as_ref())
            .collect()
    }

    /// Providers wired to a node.
    pub fn providers_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &WireEdge)> {
        self.graph
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (e.target(), e.weight()))
            .collect()
    }

    /// Consumers wired to a node.
    pub fn consumers_of(&self, idx: NodeIndex) -> Vec<(NodeIndex, &WireEdge)> {
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (e.source(), e.weight()))
            .collect()
    }

    /// Every requirement that pulled `resource` in, in wiring order.
    pub fn reasons(&self, resource: &Resource) -> Vec<Reason<'_>> {
        let Some(idx) = self.find(resource) else {
            return Vec::new();
        };
        let mut reasons: Vec<(usize, Reason<'_>)> = self
            .graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| {
                (
                    e.id().index(),
                    Reason {
                        requirer: self.graph[e.source()].as_ref(),
                        requirement: &e.weight().requirement,
                    },
                )
            })
            .collect();
        reasons.sort_by_key(|(id, _)| *id);
        reasons.into_iter().map(|(_, r)| r).collect()
    }

    /// Path of resources from the root query to `resource`, following the
    /// earliest wires first.
    pub fn path_to(&self, resource: &Resource) -> Option<Vec<&Arc<Resource>>> {
        let target = self.find(resource)?;
        let mut path = Vec::new();
        let mut visited = HashSet::new();
        if self.dfs_path(self.root, target, &mut path, &mut visited) {
            Some(path.iter().filter_map(|&idx| self.graph[idx].as_ref()).collect())
        } else {
            None
        }
    }

    fn dfs_path(
        &self,
        current: NodeIndex,
        target: NodeIndex,
        path: &mut Vec<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
    ) -> bool {
        path.push(current);
        if current == target {
            return true;
        }
        if !visited.insert(current) {
            path.pop();
            return false;
        }
        let mut edges: Vec<_> = self.graph.edges(current).collect();
        edges.sort_by_key(|e| e.id().index());
        for edge in edges {
            if self.dfs_path(edge.target(), target, path, visited) {
                return true;
            }
        }
        path.pop();
        false
    }

    /// Resources ordered so providers come before their consumers.
    ///
    /// Members of a cycle are kept together in first-added order; among
    /// independent groups the one containing the earliest-added resource
    /// goes first.
    pub fn install_order(&self) -> Vec<&Arc<Resource>> {
        let sccs = tarjan_scc(&self.graph);
        let mut component = vec![0usize; self.graph.node_count()];
        for (c, members) in sccs.iter().enumerate() {
            for idx in members {
                component[idx.index()] = c;
            }
        }

        // pending providers per component, and who waits on each
        let mut pending = vec![HashSet::new(); sccs.len()];
        let mut waiting: Vec<Vec<usize>> = vec![Vec::new(); sccs.len()];
        for edge in self.graph.edge_references() {
            let (from, to) = (component[edge.source().index()], component[edge.target().index()]);
            if from != to && pending[from].insert(to) {
                waiting[to].push(from);
            }
        }

        let first = |c: usize| sccs[c].iter().map(|i| i.index()).min().unwrap_or(usize::MAX);
        let mut ready: BinaryHeap<Reverse<(usize, usize)>> = (0..sccs.len())
            .filter(|&c| pending[c].is_empty())
            .map(|c| Reverse((first(c), c)))
            .collect();

        let mut order = Vec::with_capacity(self.graph.node_count());
        while let Some(Reverse((_, c))) = ready.pop() {
            let mut members = sccs[c].clone();
            members.sort();
            order.extend(members.into_iter().filter_map(|idx| self.graph[idx].as_ref()));
            for &consumer in &waiting[c] {
                pending[consumer].remove(&c);
                if pending[consumer].is_empty() {
                    ready.push(Reverse((first(consumer), consumer)));
                }
            }
        }
        order
    }

    /// Number of resource nodes.
    pub fn len(&self) -> usize {
        self.graph.node_count().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for WiringGraph {
    fn default() -> Self {
        Self::new()
    }
}
