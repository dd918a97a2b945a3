//! Capability resolution engine: transitive provider selection with
//! failed-set backtracking, a wiring graph, and install ordering.

pub mod failure;
pub mod graph;
pub mod resolver;

pub use failure::{Rejected, ResolutionFailure, ResolveError};
pub use graph::{Reason, WireEdge, WiringGraph};
pub use obr_core::capability::identity_requirement;
pub use resolver::{
    CancelFlag, Resolution, ResolvedResource, Resolver, ResolverOptions, Unsatisfied, Wire,
};
