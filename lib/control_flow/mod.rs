//! Control-flow graphs of basic blocks nested in structured regions.
//!
//! A `ControlFlowGraph` is built from an ordered instruction stream and the
//! method's exception handler clauses. Besides the graph of blocks and typed
//! edges, it carries a `RegionTree` describing how the blocks nest inside
//! `try` blocks and their handlers.

mod block;
mod builder;
mod control_flow_graph;
mod edge;
mod region;

pub use self::block::BasicBlock;
pub use self::builder::ControlFlowGraphBuilder;
pub use self::control_flow_graph::{ControlFlowGraph, Node};
pub use self::edge::{Edge, EdgeType};
pub use self::region::{
    GuardedRegion, HandlerRegion, HandlerScopes, Region, RegionChild, RegionId, RegionTree, RegionVisitor,
    ScopeRegion,
};
