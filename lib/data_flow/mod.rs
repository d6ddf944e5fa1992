//! Data-flow graphs linking every instruction to the producers of the values
//! it consumes.
//!
//! Each `DataFlowNode` owns a `StackDependencyCollection`, one entry per
//! popped stack slot, and a `VariableDependencyCollection` for the locals and
//! arguments it reads. `DataFlowGraph::ordered_dependencies` walks these
//! links backwards and yields the slice of instructions needed to recompute
//! a value.

mod builder;
mod data_flow_graph;
mod dependency;

pub use self::builder::DataFlowGraphBuilder;
pub use self::data_flow_graph::{DataFlowGraph, DataFlowNode, DependencyFlags};
pub use self::dependency::{
    DataSource, GraphId, StackDependency, StackDependencyCollection, VariableDependencyCollection,
};
