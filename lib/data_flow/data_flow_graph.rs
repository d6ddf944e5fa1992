use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Debug;

use crate::cil::{CilArchitecture, MethodBody, Variable};
use crate::data_flow::{DataFlowGraphBuilder, GraphId, StackDependencyCollection, VariableDependencyCollection};
use crate::Error;

bitflags! {
    /// Which kinds of dependencies a traversal follows.
    #[derive(Deserialize, Serialize)]
    pub struct DependencyFlags: u32 {
        const STACK     = 0b01;
        const VARIABLES = 0b10;
        const ALL       = 0b11;
    }
}

/// One instruction of a `DataFlowGraph` and the producers of what it
/// consumes.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DataFlowNode<V: Ord> {
    offset: u32,
    stack: StackDependencyCollection,
    variables: VariableDependencyCollection<V>,
}

impl<V: Ord> DataFlowNode<V> {
    pub(crate) fn new(
        offset: u32,
        stack: StackDependencyCollection,
        variables: VariableDependencyCollection<V>,
    ) -> DataFlowNode<V> {
        DataFlowNode {
            offset,
            stack,
            variables,
        }
    }

    pub fn offset(&self) -> u32 {
        self.offset
    }

    pub fn stack_dependencies(&self) -> &StackDependencyCollection {
        &self.stack
    }

    pub fn stack_dependencies_mut(&mut self) -> &mut StackDependencyCollection {
        &mut self.stack
    }

    pub fn variable_dependencies(&self) -> &VariableDependencyCollection<V> {
        &self.variables
    }

    /// The offsets of every node this node depends on directly, in traversal
    /// order: stack slots first, then variables.
    fn dependencies(&self, flags: DependencyFlags) -> Vec<u32> {
        let mut dependencies = Vec::new();
        if flags.contains(DependencyFlags::STACK) {
            for dependency in self.stack.iter() {
                dependencies.extend(dependency.sources().iter().map(|source| source.node()));
            }
        }
        if flags.contains(DependencyFlags::VARIABLES) {
            for (_, sources) in self.variables.iter() {
                dependencies.extend(sources.iter().map(|source| source.node()));
            }
        }
        dependencies
    }
}

/// A graph recording, for every reachable instruction, which instructions
/// produced the stack values and variables it reads.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DataFlowGraph<V: Ord> {
    id: GraphId,
    nodes: BTreeMap<u32, DataFlowNode<V>>,
}

impl DataFlowGraph<Variable> {
    /// Build the data-flow graph of a CIL method body.
    pub fn from_method_body(body: &MethodBody) -> Result<DataFlowGraph<Variable>, Error> {
        let architecture = CilArchitecture::new(body.returns_value());
        DataFlowGraphBuilder::new(&architecture, body.instructions(), body.exception_handlers()).build()
    }
}

impl<V: Clone + Ord + Debug> DataFlowGraph<V> {
    pub(crate) fn from_parts(id: GraphId, nodes: BTreeMap<u32, DataFlowNode<V>>) -> DataFlowGraph<V> {
        DataFlowGraph { id, nodes }
    }

    pub fn id(&self) -> GraphId {
        self.id
    }

    pub fn node(&self, offset: u32) -> Result<&DataFlowNode<V>, Error> {
        self.nodes.get(&offset).ok_or(Error::InstructionNotFound(offset))
    }

    pub fn node_mut(&mut self, offset: u32) -> Result<&mut DataFlowNode<V>, Error> {
        self.nodes.get_mut(&offset).ok_or(Error::InstructionNotFound(offset))
    }

    /// Every node, ordered by offset.
    pub fn nodes(&self) -> Vec<&DataFlowNode<V>> {
        self.nodes.values().collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The transitive dependencies of the node at `offset`, deepest first,
    /// ending with the node itself.
    ///
    /// Dependencies are visited in stack slot order, then variable order, and
    /// the producers of one slot in ascending offset order, so the result is
    /// deterministic. Every node appears once.
    pub fn ordered_dependencies(&self, offset: u32, flags: DependencyFlags) -> Result<Vec<u32>, Error> {
        self.node(offset)?;

        let mut order = Vec::new();
        let mut visited = BTreeSet::new();
        let mut stack = vec![(offset, false)];

        while let Some((node, expanded)) = stack.pop() {
            if expanded {
                order.push(node);
                continue;
            }
            if !visited.insert(node) {
                continue;
            }
            stack.push((node, true));
            let dependencies = self.node(node)?.dependencies(flags);
            for dependency in dependencies.into_iter().rev() {
                if !visited.contains(&dependency) {
                    stack.push((dependency, false));
                }
            }
        }

        Ok(order)
    }
}
