//! Construction of a `ControlFlowGraph` from an instruction stream.

use log::debug;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::architecture::{FlowControl, InstructionSetArchitecture};
use crate::cil::ExceptionHandler;
use crate::control_flow::{BasicBlock, ControlFlowGraph, Edge, EdgeType, Node, RegionId, RegionTree};
use crate::graph::Graph;
use crate::Error;

/// A half-open offset range which maps onto one scope region.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
struct ScopeRange {
    start: u32,
    end: u32,
    scope: RegionId,
}

impl ScopeRange {
    fn contains(&self, start: u32, end: u32) -> bool {
        self.start <= start && end <= self.end
    }

    fn partially_overlaps(&self, start: u32, end: u32) -> bool {
        let intersects = self.start < end && start < self.end;
        intersects && !self.contains(start, end) && !(start <= self.start && self.end <= end)
    }

    fn len(&self) -> u32 {
        self.end - self.start
    }
}

/// Builds a `ControlFlowGraph` and its region tree.
pub struct ControlFlowGraphBuilder<'a, I, A> {
    architecture: &'a A,
    instructions: &'a [I],
    handlers: &'a [ExceptionHandler],
}

impl<'a, I, A> ControlFlowGraphBuilder<'a, I, A>
where
    I: Clone + fmt::Display,
    A: InstructionSetArchitecture<I>,
{
    /// `instructions` must be in ascending offset order.
    pub fn new(
        architecture: &'a A,
        instructions: &'a [I],
        handlers: &'a [ExceptionHandler],
    ) -> ControlFlowGraphBuilder<'a, I, A> {
        ControlFlowGraphBuilder {
            architecture,
            instructions,
            handlers,
        }
    }

    fn offset(&self, index: usize) -> u32 {
        self.architecture.offset(&self.instructions[index])
    }

    /// The offset one past the last instruction.
    fn end_offset(&self) -> u32 {
        match self.instructions.last() {
            Some(last) => self.architecture.offset(last) + self.architecture.size(last),
            None => 0,
        }
    }

    pub fn build(&self) -> Result<ControlFlowGraph<I>, Error> {
        if self.instructions.is_empty() {
            return Err(Error::EmptyMethodBody);
        }

        let offsets = (0..self.instructions.len())
            .map(|index| (self.offset(index), index))
            .collect::<BTreeMap<u32, usize>>();

        self.validate(&offsets)?;
        let leaders = self.leaders();
        let blocks = self.blocks(&leaders);
        let (mut regions, ranges) = self.regions()?;

        for block in blocks.iter() {
            let scope = ranges
                .iter()
                .filter(|range| range.contains(block.offset(), block.offset() + 1))
                .min_by_key(|range| (range.len(), Reverse(range.scope)))
                .map(|range| range.scope)
                .unwrap_or_else(|| regions.root());
            regions.add_block(scope, block.offset())?;
        }
        regions.sort_children();

        let mut graph = Graph::new();
        let mut next_block = BTreeMap::new();
        let block_offsets = blocks.iter().map(|block| block.offset()).collect::<Vec<u32>>();
        for (index, offset) in block_offsets.iter().enumerate() {
            if let Some(next) = block_offsets.get(index + 1) {
                next_block.insert(*offset, *next);
            }
        }

        let mut terminators = Vec::new();
        for block in blocks {
            let region = regions
                .region_of_block(block.offset())
                .ok_or(Error::GraphVertexNotFound(block.offset() as usize))?;
            if let Some(last) = block.last() {
                terminators.push((block.offset(), last.clone()));
            }
            graph.insert_vertex(Node::new(block, region))?;
        }

        for (offset, last) in terminators {
            let head = offset as usize;
            let flow = self.architecture.flow_control(&last);
            let targets = self.architecture.branch_targets(&last);

            match flow {
                FlowControl::ConditionalBranch => {
                    for target in targets {
                        insert_edge(&mut graph, Edge::new(head, target as usize, EdgeType::Conditional))?;
                    }
                }
                FlowControl::Branch => {
                    for target in targets {
                        insert_edge(&mut graph, Edge::new(head, target as usize, EdgeType::Unconditional))?;
                    }
                }
                _ => {}
            }
            if flow.falls_through() {
                if let Some(next) = next_block.get(&offset) {
                    insert_edge(&mut graph, Edge::new(head, *next as usize, EdgeType::FallThrough))?;
                }
            }
        }

        for handler in self.handlers {
            let entry = handler.entry() as usize;
            for offset in block_offsets
                .iter()
                .filter(|offset| handler.try_start <= **offset && **offset < handler.try_end)
            {
                insert_edge(&mut graph, Edge::new(*offset as usize, entry, EdgeType::Abnormal))?;
            }
        }

        debug!(
            "built control flow graph with {} blocks, {} edges and {} regions",
            graph.num_vertices(),
            graph.num_edges(),
            regions.len()
        );

        Ok(ControlFlowGraph::from_parts(graph, regions, self.offset(0) as usize))
    }

    fn validate(&self, offsets: &BTreeMap<u32, usize>) -> Result<(), Error> {
        for instruction in self.instructions {
            for target in self.architecture.branch_targets(instruction) {
                if !offsets.contains_key(&target) {
                    return Err(Error::DanglingBranchTarget {
                        branch: self.architecture.offset(instruction),
                        target,
                    });
                }
            }
        }

        let end = self.end_offset();
        let is_boundary = |offset: u32| offsets.contains_key(&offset) || offset == end;
        for handler in self.handlers {
            let mut boundaries = vec![
                handler.try_start,
                handler.try_end,
                handler.handler_start,
                handler.handler_end,
            ];
            boundaries.extend(handler.filter_start());
            if let Some(offset) = boundaries.into_iter().find(|offset| !is_boundary(*offset)) {
                return Err(Error::InvalidExceptionHandler(format!(
                    "{} does not start on an instruction boundary at IL_{:04x}",
                    handler, offset
                )));
            }
            if handler.try_start >= handler.try_end || handler.handler_start >= handler.handler_end {
                return Err(Error::InvalidExceptionHandler(format!("{} has an empty range", handler)));
            }
            if let Some(filter_start) = handler.filter_start() {
                if filter_start >= handler.handler_start {
                    return Err(Error::InvalidExceptionHandler(format!(
                        "{} has a filter after its handler",
                        handler
                    )));
                }
            }
        }
        Ok(())
    }

    /// Offsets which start a basic block.
    fn leaders(&self) -> BTreeSet<u32> {
        let mut leaders = BTreeSet::new();
        leaders.insert(self.offset(0));

        for (index, instruction) in self.instructions.iter().enumerate() {
            leaders.extend(self.architecture.branch_targets(instruction));
            if self.architecture.flow_control(instruction).ends_block() && index + 1 < self.instructions.len() {
                leaders.insert(self.offset(index + 1));
            }
        }

        let end = self.end_offset();
        for handler in self.handlers {
            leaders.extend(
                [
                    handler.try_start,
                    handler.try_end,
                    handler.handler_start,
                    handler.handler_end,
                ]
                .iter()
                .chain(handler.filter_start().as_ref())
                .filter(|offset| **offset != end),
            );
        }
        leaders
    }

    fn blocks(&self, leaders: &BTreeSet<u32>) -> Vec<BasicBlock<I>> {
        let mut blocks = Vec::new();
        let mut current: Option<(u32, Vec<I>)> = None;

        for (index, instruction) in self.instructions.iter().enumerate() {
            let offset = self.offset(index);
            if leaders.contains(&offset) {
                if let Some((start, instructions)) = current.take() {
                    blocks.push(BasicBlock::new(start, instructions));
                }
            }
            current
                .get_or_insert_with(|| (offset, Vec::new()))
                .1
                .push(instruction.clone());
        }
        if let Some((start, instructions)) = current {
            blocks.push(BasicBlock::new(start, instructions));
        }
        blocks
    }

    /// Build the region skeleton: one guarded region per distinct try range,
    /// with one handler region per clause.
    fn regions(&self) -> Result<(RegionTree, Vec<ScopeRange>), Error> {
        let mut tree = RegionTree::new();
        let mut ranges = vec![ScopeRange {
            start: 0,
            end: u32::MAX,
            scope: tree.root(),
        }];

        let mut groups: BTreeMap<(u32, Reverse<u32>), Vec<&ExceptionHandler>> = BTreeMap::new();
        for handler in self.handlers {
            groups
                .entry((handler.try_start, Reverse(handler.try_end)))
                .or_default()
                .push(handler);
        }

        for ((try_start, Reverse(try_end)), handlers) in groups {
            check_overlap(&ranges, try_start, try_end)?;
            let parent = innermost(&ranges, try_start, try_end);
            let (guarded, protected) = tree.add_guarded(parent)?;

            let mut new_ranges = vec![ScopeRange {
                start: try_start,
                end: try_end,
                scope: protected,
            }];
            for handler in handlers {
                let scopes = tree.add_handler(guarded, handler.kind.clone())?;
                if let (Some(prologue), Some(filter_start)) = (scopes.prologue, handler.filter_start()) {
                    check_overlap(&ranges, filter_start, handler.handler_start)?;
                    new_ranges.push(ScopeRange {
                        start: filter_start,
                        end: handler.handler_start,
                        scope: prologue,
                    });
                }
                check_overlap(&ranges, handler.handler_start, handler.handler_end)?;
                new_ranges.push(ScopeRange {
                    start: handler.handler_start,
                    end: handler.handler_end,
                    scope: scopes.contents,
                });
            }
            ranges.extend(new_ranges);
        }

        Ok((tree, ranges))
    }
}

fn insert_edge<I: Clone + fmt::Display>(graph: &mut Graph<Node<I>, Edge>, edge: Edge) -> Result<(), Error> {
    if graph.has_edge(edge.head(), edge.tail()) {
        return Ok(());
    }
    graph.insert_edge(edge)
}

fn check_overlap(ranges: &[ScopeRange], start: u32, end: u32) -> Result<(), Error> {
    match ranges.iter().find(|range| range.partially_overlaps(start, end)) {
        Some(range) => Err(Error::OverlappingRegions(range.start, start)),
        None => Ok(()),
    }
}

/// The scope of the smallest range containing `[start, end)`. Later ranges
/// win ties, as they are nested deeper.
fn innermost(ranges: &[ScopeRange], start: u32, end: u32) -> RegionId {
    let mut best = ranges[0];
    for range in ranges.iter().skip(1) {
        if range.contains(start, end) && range.len() <= best.len() {
            best = *range;
        }
    }
    best.scope
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cil::{
        CilArchitecture, ExceptionHandlerKind, Instruction, MethodBody, OpCode, Operand, Token, TypeRef, TypeSig,
    };
    use crate::control_flow::RegionChild;

    fn nops(count: u32, last: Instruction) -> Vec<Instruction> {
        let mut instructions = (0..count)
            .map(|offset| Instruction::simple(offset, OpCode::Nop))
            .collect::<Vec<Instruction>>();
        instructions.push(last);
        instructions
    }

    fn body(instructions: Vec<Instruction>, handlers: Vec<ExceptionHandler>) -> MethodBody {
        MethodBody::new(instructions, handlers, Vec::new(), Vec::new(), TypeSig::Void)
    }

    fn exception() -> ExceptionHandlerKind {
        ExceptionHandlerKind::Catch(TypeRef::new(Token::new(0x0100_0003), "System", "Exception", false))
    }

    #[test]
    fn empty_body_is_an_error() {
        let result = ControlFlowGraph::from_method_body(&body(Vec::new(), Vec::new()));
        assert!(matches!(result, Err(Error::EmptyMethodBody)));
    }

    #[test]
    fn dangling_branch_target_is_an_error() {
        let instructions = vec![
            Instruction::new(0, OpCode::Br_S, Operand::BranchTarget(7)),
            Instruction::simple(2, OpCode::Ret),
        ];
        let result = ControlFlowGraph::from_method_body(&body(instructions, Vec::new()));
        match result {
            Err(error) => {
                assert!(matches!(error, Error::DanglingBranchTarget { branch: 0, target: 7 }));
                assert!(std::error::Error::source(&error).is_none());
                assert_eq!(
                    error.to_string(),
                    "Branch at 0x0000 targets 0x0007, which is not an instruction boundary"
                );
            }
            Ok(_) => panic!("dangling branch accepted"),
        }
    }

    #[test]
    fn handler_off_boundary_is_an_error() {
        let instructions = vec![
            Instruction::new(0, OpCode::Ldc_I4, Operand::Int32(1)),
            Instruction::simple(5, OpCode::Pop),
            Instruction::simple(6, OpCode::Ret),
        ];
        let handlers = vec![ExceptionHandler::new(ExceptionHandlerKind::Finally, 0, 2, 5, 6)];
        let result = ControlFlowGraph::from_method_body(&body(instructions, handlers));
        assert!(matches!(result, Err(Error::InvalidExceptionHandler(_))));
    }

    #[test]
    fn partially_overlapping_handlers_are_an_error() {
        let instructions = nops(10, Instruction::simple(10, OpCode::Ret));
        let handlers = vec![
            ExceptionHandler::new(ExceptionHandlerKind::Finally, 0, 4, 4, 6),
            ExceptionHandler::new(ExceptionHandlerKind::Fault, 2, 8, 8, 10),
        ];
        let result = ControlFlowGraph::from_method_body(&body(instructions, handlers));
        assert!(matches!(result, Err(Error::OverlappingRegions(0, 2))));
    }

    /*
     * try {                 0..8
     *   try { 0..2 }        0..2
     *   catch { 2..4 }      2..4
     *   4..8
     * } finally { 8..10 }   8..10
     * 10: ret
     */
    #[test]
    fn nested_guarded_regions() {
        let instructions = nops(10, Instruction::simple(10, OpCode::Ret));
        let handlers = vec![
            ExceptionHandler::new(exception(), 0, 2, 2, 4),
            ExceptionHandler::new(ExceptionHandlerKind::Finally, 0, 8, 8, 10),
        ];
        let cfg = ControlFlowGraph::from_method_body(&body(instructions, handlers)).unwrap();
        let regions = cfg.regions();

        let offsets = cfg.nodes().iter().map(|node| node.offset()).collect::<Vec<u32>>();
        assert_eq!(offsets, vec![0, 2, 4, 8, 10]);

        let root = regions.scope(regions.root()).unwrap();
        assert_eq!(root.children().len(), 2);
        assert_eq!(root.children()[1], RegionChild::Block(10));
        let outer = match root.entry() {
            Some(RegionChild::Region(id)) => id,
            other => panic!("unexpected entry {:?}", other),
        };
        assert_eq!(regions.blocks(outer).unwrap(), vec![0, 2, 4, 8]);
        assert_eq!(regions.last_block(outer).unwrap(), Some(8));

        let inner_protected = cfg.node(0).unwrap().region();
        assert_eq!(regions.depth(inner_protected).unwrap(), 4);
        assert_eq!(cfg.node(4).unwrap().region(), regions.region(outer).unwrap().as_guarded().unwrap().protected());

        assert_eq!(cfg.edge(0, 2).unwrap().edge_type(), EdgeType::FallThrough);
        assert_eq!(cfg.edge(0, 8).unwrap().edge_type(), EdgeType::Abnormal);
        assert_eq!(cfg.edge(2, 8).unwrap().edge_type(), EdgeType::Abnormal);
        assert_eq!(cfg.edge(2, 4).unwrap().edge_type(), EdgeType::FallThrough);
    }

    /*
     * try { 0: nop  1: leave.s 10 }
     * filter { 3: pop  4: ldc.i4.1  5: endfilter }
     * handler { 7: pop  8: leave.s 10 }
     * 10: ret
     */
    #[test]
    fn filter_edges_go_to_the_filter() {
        let instructions = vec![
            Instruction::simple(0, OpCode::Nop),
            Instruction::new(1, OpCode::Leave_S, Operand::BranchTarget(10)),
            Instruction::simple(3, OpCode::Pop),
            Instruction::simple(4, OpCode::Ldc_I4_1),
            Instruction::simple(5, OpCode::Endfilter),
            Instruction::simple(7, OpCode::Pop),
            Instruction::new(8, OpCode::Leave_S, Operand::BranchTarget(10)),
            Instruction::simple(10, OpCode::Ret),
        ];
        let handlers = vec![ExceptionHandler::new(
            ExceptionHandlerKind::Filter { filter_start: 3 },
            0,
            3,
            7,
            10,
        )];
        let cfg = ControlFlowGraph::from_method_body(&body(instructions, handlers)).unwrap();

        let offsets = cfg.nodes().iter().map(|node| node.offset()).collect::<Vec<u32>>();
        assert_eq!(offsets, vec![0, 3, 7, 10]);
        assert_eq!(cfg.edge(0, 3).unwrap().edge_type(), EdgeType::Abnormal);
        assert!(cfg.edge(0, 7).is_err());
        assert!(cfg.successor_indices(3).unwrap().is_empty());
        let handler = cfg.regions().parent(cfg.node(3).unwrap().region()).unwrap().unwrap();
        let handler = cfg.regions().region(handler).unwrap().as_handler().unwrap();
        assert_eq!(handler.prologue(), Some(cfg.node(3).unwrap().region()));
        assert_eq!(handler.contents(), cfg.node(7).unwrap().region());
    }

    #[test]
    fn switch_targeting_the_next_block_keeps_one_conditional_edge() {
        let instructions = vec![
            Instruction::simple(0, OpCode::Ldarg_0),
            Instruction::new(1, OpCode::Switch, Operand::Switch(vec![14, 15])),
            Instruction::simple(14, OpCode::Nop),
            Instruction::simple(15, OpCode::Ret),
        ];
        let architecture = CilArchitecture::new(false);
        let cfg = ControlFlowGraphBuilder::new(&architecture, &instructions, &[]).build().unwrap();

        assert_eq!(cfg.edge(0, 14).unwrap().edge_type(), EdgeType::Conditional);
        assert_eq!(cfg.edge(0, 15).unwrap().edge_type(), EdgeType::Conditional);
        assert_eq!(cfg.edges_out(0).unwrap().len(), 2);
    }
}
