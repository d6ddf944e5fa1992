//! A `ControlFlowGraph` is a directed `Graph` of `Node` and `Edge`, plus the
//! region tree its nodes are placed in.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::architecture::InstructionSetArchitecture;
use crate::cil::{CilArchitecture, Instruction, MethodBody};
use crate::control_flow::{BasicBlock, ControlFlowGraphBuilder, Edge, EdgeType, RegionId, RegionTree};
use crate::graph::{self, Graph};
use crate::Error;

/// A vertex of a `ControlFlowGraph`: one basic block and the scope region
/// which owns it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Node<I> {
    block: BasicBlock<I>,
    region: RegionId,
}

impl<I> Node<I> {
    pub fn new(block: BasicBlock<I>, region: RegionId) -> Node<I> {
        Node { block, region }
    }

    pub fn block(&self) -> &BasicBlock<I> {
        &self.block
    }

    pub fn region(&self) -> RegionId {
        self.region
    }

    pub fn offset(&self) -> u32 {
        self.block.offset()
    }
}

impl<I: Clone + fmt::Display> graph::Vertex for Node<I> {
    fn index(&self) -> usize {
        self.block.offset() as usize
    }

    fn dot_label(&self) -> String {
        format!("{}", self.block)
    }
}

/// A directed graph of basic blocks nested in structured regions.
///
/// Node indices are the offsets of the blocks' first instructions.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct ControlFlowGraph<I: Clone + fmt::Display> {
    graph: Graph<Node<I>, Edge>,
    regions: RegionTree,
    entry: usize,
}

impl ControlFlowGraph<Instruction> {
    /// Build the control-flow graph of a CIL method body.
    pub fn from_method_body(body: &MethodBody) -> Result<ControlFlowGraph<Instruction>, Error> {
        let architecture = CilArchitecture::new(body.returns_value());
        ControlFlowGraphBuilder::new(&architecture, body.instructions(), body.exception_handlers()).build()
    }
}

impl<I: Clone + fmt::Display> ControlFlowGraph<I> {
    pub(crate) fn from_parts(
        graph: Graph<Node<I>, Edge>,
        regions: RegionTree,
        entry: usize,
    ) -> ControlFlowGraph<I> {
        ControlFlowGraph {
            graph,
            regions,
            entry,
        }
    }

    /// Returns the underlying graph
    pub fn graph(&self) -> &Graph<Node<I>, Edge> {
        &self.graph
    }

    pub fn regions(&self) -> &RegionTree {
        &self.regions
    }

    /// Get the index of the entry node.
    pub fn entry(&self) -> usize {
        self.entry
    }

    pub fn node(&self, index: usize) -> Result<&Node<I>, Error> {
        self.graph.vertex(index)
    }

    /// Get every `Node`, ordered by offset.
    pub fn nodes(&self) -> Vec<&Node<I>> {
        self.graph.vertices()
    }

    pub fn block(&self, index: usize) -> Result<&BasicBlock<I>, Error> {
        Ok(self.node(index)?.block())
    }

    /// Get an `Edge` by its head and tail indices.
    pub fn edge(&self, head: usize, tail: usize) -> Result<&Edge, Error> {
        self.graph.edge(head, tail)
    }

    pub fn edges(&self) -> Vec<&Edge> {
        self.graph.edges()
    }

    pub fn edges_out(&self, index: usize) -> Result<Vec<&Edge>, Error> {
        self.graph.edges_out(index)
    }

    pub fn edges_in(&self, index: usize) -> Result<Vec<&Edge>, Error> {
        self.graph.edges_in(index)
    }

    pub fn successor_indices(&self, index: usize) -> Result<Vec<usize>, Error> {
        self.graph.successor_indices(index)
    }

    pub fn predecessor_indices(&self, index: usize) -> Result<Vec<usize>, Error> {
        self.graph.predecessor_indices(index)
    }

    /// The number of edges of each type, in `EdgeType` order.
    pub fn edge_type_counts(&self) -> [usize; 4] {
        let mut counts = [0; 4];
        for edge in self.graph.edges() {
            let slot = match edge.edge_type() {
                EdgeType::FallThrough => 0,
                EdgeType::Unconditional => 1,
                EdgeType::Conditional => 2,
                EdgeType::Abnormal => 3,
            };
            counts[slot] += 1;
        }
        counts
    }

    /// Find the node holding the instruction at `offset`.
    pub fn node_containing<A>(&self, architecture: &A, offset: u32) -> Option<&Node<I>>
    where
        A: InstructionSetArchitecture<I>,
    {
        self.nodes().into_iter().find(|node| {
            node.block()
                .instructions()
                .iter()
                .any(|instruction| architecture.offset(instruction) == offset)
        })
    }

    /// Map the contents of every block, keeping node indices, edges and the
    /// region tree.
    pub fn transform<B, F>(&self, mut f: F) -> Result<ControlFlowGraph<B>, Error>
    where
        B: Clone + fmt::Display,
        F: FnMut(&[I]) -> Result<Vec<B>, Error>,
    {
        let mut graph = Graph::new();
        for node in self.graph.vertices() {
            let block = BasicBlock::new(node.offset(), f(node.block().instructions())?);
            graph.insert_vertex(Node::new(block, node.region()))?;
        }
        for edge in self.graph.edges() {
            graph.insert_edge(edge.clone())?;
        }
        Ok(ControlFlowGraph {
            graph,
            regions: self.regions.clone(),
            entry: self.entry,
        })
    }

    /// Get the graph in graphviz dot format.
    pub fn dot_graph(&self) -> String {
        self.graph.dot_graph()
    }
}

impl<I: Clone + fmt::Display> fmt::Display for ControlFlowGraph<I> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for node in self.nodes() {
            writeln!(f, "{}", node.block())?;
        }
        for edge in self.edges() {
            writeln!(f, "edge {}", edge)?;
        }
        Ok(())
    }
}
