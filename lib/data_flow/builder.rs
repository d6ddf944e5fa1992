//! Construction of a `DataFlowGraph` by abstract interpretation of the
//! evaluation stack.

use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::architecture::InstructionSetArchitecture;
use crate::cil::ExceptionHandler;
use crate::data_flow::{
    DataFlowGraph, DataFlowNode, DataSource, GraphId, StackDependency, StackDependencyCollection,
    VariableDependencyCollection,
};
use crate::Error;

/// The producers of every stack slot and variable before an instruction.
#[derive(Clone, Debug, Eq, PartialEq)]
struct State<V: Ord> {
    stack: Vec<BTreeSet<DataSource>>,
    variables: BTreeMap<V, BTreeSet<DataSource>>,
}

impl<V: Clone + Ord> State<V> {
    fn new(height: usize) -> State<V> {
        State {
            stack: vec![BTreeSet::new(); height],
            variables: BTreeMap::new(),
        }
    }

    /// Merge `other` into this state. Returns true if anything changed.
    fn merge(&mut self, other: &State<V>, offset: u32) -> Result<bool, Error> {
        if self.stack.len() != other.stack.len() {
            return Err(Error::StackImbalance {
                offset,
                expected: self.stack.len(),
                found: other.stack.len(),
            });
        }

        let mut changed = false;
        for (slot, sources) in self.stack.iter_mut().zip(other.stack.iter()) {
            let before = slot.len();
            slot.extend(sources.iter().copied());
            changed |= slot.len() != before;
        }
        changed |= self.merge_variables(other);
        Ok(changed)
    }

    fn merge_variables(&mut self, other: &State<V>) -> bool {
        let mut changed = false;
        for (variable, sources) in other.variables.iter() {
            let entry = self.variables.entry(variable.clone()).or_insert_with(BTreeSet::new);
            let before = entry.len();
            entry.extend(sources.iter().copied());
            changed |= entry.len() != before;
        }
        changed
    }
}

/// Builds a `DataFlowGraph` for every instruction reachable from the method
/// entry or from an exception handler.
pub struct DataFlowGraphBuilder<'a, I, A> {
    architecture: &'a A,
    instructions: &'a [I],
    handlers: &'a [ExceptionHandler],
}

impl<'a, I, A> DataFlowGraphBuilder<'a, I, A>
where
    I: fmt::Display,
    A: InstructionSetArchitecture<I>,
{
    /// `instructions` must be in ascending offset order.
    pub fn new(
        architecture: &'a A,
        instructions: &'a [I],
        handlers: &'a [ExceptionHandler],
    ) -> DataFlowGraphBuilder<'a, I, A> {
        DataFlowGraphBuilder {
            architecture,
            instructions,
            handlers,
        }
    }

    fn index_of(&self, offsets: &BTreeMap<u32, usize>, source: u32, target: u32) -> Result<usize, Error> {
        offsets
            .get(&target)
            .copied()
            .ok_or(Error::DanglingBranchTarget { branch: source, target })
    }

    /// Merge `state` into the entry state of the instruction at `index`,
    /// queueing it when the entry state grows.
    fn propagate(
        &self,
        states: &mut BTreeMap<usize, State<A::Variable>>,
        queue: &mut BTreeSet<usize>,
        index: usize,
        state: &State<A::Variable>,
    ) -> Result<(), Error> {
        let offset = self.architecture.offset(&self.instructions[index]);
        match states.get_mut(&index) {
            Some(existing) => {
                if existing.merge(state, offset)? {
                    queue.insert(index);
                }
            }
            None => {
                states.insert(index, state.clone());
                queue.insert(index);
            }
        }
        Ok(())
    }

    pub fn build(&self) -> Result<DataFlowGraph<A::Variable>, Error> {
        if self.instructions.is_empty() {
            return Err(Error::EmptyMethodBody);
        }

        let graph = GraphId::fresh();
        let offsets = self
            .instructions
            .iter()
            .enumerate()
            .map(|(index, instruction)| (self.architecture.offset(instruction), index))
            .collect::<BTreeMap<u32, usize>>();

        let mut states: BTreeMap<usize, State<A::Variable>> = BTreeMap::new();
        let mut queue = BTreeSet::new();
        states.insert(0, State::new(0));
        queue.insert(0);

        // Handler entries start with the exception object, which has no
        // producer in this method, or with an empty stack.
        for handler in self.handlers {
            let height = usize::from(handler.kind.receives_exception());
            let mut entries = vec![handler.entry()];
            if let Some(filter_start) = handler.filter_start() {
                if filter_start != handler.handler_start {
                    entries.push(handler.handler_start);
                }
            }
            for entry in entries {
                let index = self.index_of(&offsets, handler.try_start, entry)?;
                states.insert(index, State::new(height));
                queue.insert(index);
            }
        }

        let mut nodes = BTreeMap::new();

        while let Some(index) = queue.iter().next().copied() {
            queue.remove(&index);

            let instruction = &self.instructions[index];
            let offset = self.architecture.offset(instruction);
            let mut state = match states.get(&index) {
                Some(state) => state.clone(),
                None => continue,
            };
            let entry_variables = state.clone();

            trace!("data flow visiting {}", instruction);

            let pop_count = self.architecture.stack_pop_count(instruction);
            if pop_count > state.stack.len() {
                return Err(Error::StackUnderflow { offset });
            }
            let popped = state.stack.split_off(state.stack.len() - pop_count);

            let mut stack = StackDependencyCollection::new(graph, offset);
            for sources in popped {
                stack.push(StackDependency::new(sources))?;
            }

            let mut variables = VariableDependencyCollection::default();
            for variable in self.architecture.variables_read(instruction) {
                let sources = state.variables.get(&variable).cloned().unwrap_or_default();
                variables.insert(variable, sources);
            }

            nodes.insert(offset, DataFlowNode::new(offset, stack, variables));

            if self.architecture.clears_stack(instruction) {
                state.stack.clear();
            }
            for slot in 0..self.architecture.stack_push_count(instruction) {
                let mut sources = BTreeSet::new();
                sources.insert(DataSource::new(graph, offset, slot));
                state.stack.push(sources);
            }
            for variable in self.architecture.variables_written(instruction) {
                let mut sources = BTreeSet::new();
                sources.insert(DataSource::new(graph, offset, 0));
                state.variables.insert(variable, sources);
            }

            // Any protected instruction may transfer control to its handlers
            // with whatever variables it has seen.
            for handler in self.handlers {
                if offset < handler.try_start || offset >= handler.try_end {
                    continue;
                }
                let mut entries = vec![handler.entry()];
                if handler.filter_start().is_some() && handler.handler_start != handler.entry() {
                    entries.push(handler.handler_start);
                }
                for entry in entries {
                    let entry_index = self.index_of(&offsets, handler.try_start, entry)?;
                    if let Some(existing) = states.get_mut(&entry_index) {
                        let grew = existing.merge_variables(&entry_variables) | existing.merge_variables(&state);
                        if grew {
                            queue.insert(entry_index);
                        }
                    }
                }
            }

            let flow_control = self.architecture.flow_control(instruction);
            let mut successors = Vec::new();
            if flow_control.falls_through() && index + 1 < self.instructions.len() {
                successors.push(index + 1);
            }
            for target in self.architecture.branch_targets(instruction) {
                successors.push(self.index_of(&offsets, offset, target)?);
            }

            for successor in successors {
                self.propagate(&mut states, &mut queue, successor, &state)?;
            }
        }

        debug!("built data-flow graph with {} nodes", nodes.len());

        Ok(DataFlowGraph::from_parts(graph, nodes))
    }
}

#[cfg(test)]
mod tests {
    use crate::cil::{
        ExceptionHandler, ExceptionHandlerKind, Instruction, MethodBody, OpCode, Operand, Token, TypeRef, TypeSig,
        Variable,
    };
    use crate::data_flow::{DataFlowGraph, DependencyFlags};
    use crate::Error;

    fn returning(instructions: Vec<Instruction>) -> MethodBody {
        MethodBody::new(instructions, Vec::new(), vec![TypeSig::I4], vec![TypeSig::I4], TypeSig::I4)
    }

    /*
     *     0: ldarg.0
     *     1: brtrue.s 6 ---+
     *     3: ldc.i4.0      |
     *     4: br.s 7 ---+   |
     *     6: ldc.i4.1 <----+
     *     7: ret  <----+
     */
    fn diamond() -> MethodBody {
        returning(vec![
            Instruction::simple(0, OpCode::Ldarg_0),
            Instruction::new(1, OpCode::Brtrue_S, Operand::BranchTarget(6)),
            Instruction::simple(3, OpCode::Ldc_I4_0),
            Instruction::new(4, OpCode::Br_S, Operand::BranchTarget(7)),
            Instruction::simple(6, OpCode::Ldc_I4_1),
            Instruction::simple(7, OpCode::Ret),
        ])
    }

    #[test]
    fn merged_slot_has_both_producers() {
        let dfg = DataFlowGraph::from_method_body(&diamond()).unwrap();

        let ret = dfg.node(7).unwrap();
        assert_eq!(ret.stack_dependencies().len(), 1);
        let producers = ret
            .stack_dependencies()
            .get(0)
            .unwrap()
            .sources()
            .iter()
            .map(|source| source.node())
            .collect::<Vec<u32>>();
        assert_eq!(producers, vec![3, 6]);
        assert!(ret
            .stack_dependencies()
            .get(0)
            .unwrap()
            .sources()
            .iter()
            .all(|source| source.graph() == dfg.id()));

        assert_eq!(dfg.ordered_dependencies(7, DependencyFlags::STACK).unwrap(), vec![3, 6, 7]);
        assert_eq!(dfg.ordered_dependencies(1, DependencyFlags::ALL).unwrap(), vec![0, 1]);
    }

    /*
     *     0: ldc.i4.5
     *     1: stloc.0
     *     2: ldloc.0
     *     3: ldc.i4.1
     *     4: add
     *     5: ret
     */
    #[test]
    fn variables_link_stores_to_loads() {
        let dfg = DataFlowGraph::from_method_body(&returning(vec![
            Instruction::simple(0, OpCode::Ldc_I4_5),
            Instruction::simple(1, OpCode::Stloc_0),
            Instruction::simple(2, OpCode::Ldloc_0),
            Instruction::simple(3, OpCode::Ldc_I4_1),
            Instruction::simple(4, OpCode::Add),
            Instruction::simple(5, OpCode::Ret),
        ]))
        .unwrap();

        let load = dfg.node(2).unwrap();
        let writers = load.variable_dependencies().get(&Variable::Local(0)).unwrap();
        assert_eq!(writers.iter().map(|source| source.node()).collect::<Vec<u32>>(), vec![1]);

        assert_eq!(dfg.ordered_dependencies(5, DependencyFlags::ALL).unwrap(), vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(dfg.ordered_dependencies(5, DependencyFlags::STACK).unwrap(), vec![2, 3, 4, 5]);
        assert!(matches!(
            dfg.ordered_dependencies(6, DependencyFlags::ALL),
            Err(Error::InstructionNotFound(6))
        ));
    }

    #[test]
    fn underflow() {
        let result = DataFlowGraph::from_method_body(&MethodBody::from_instructions(vec![
            Instruction::simple(0, OpCode::Pop),
            Instruction::simple(1, OpCode::Ret),
        ]));
        assert!(matches!(result, Err(Error::StackUnderflow { offset: 0 })));
    }

    /*
     *     0: ldarg.0
     *     1: brtrue.s 4 ---+
     *     3: ldc.i4.0      |
     *     4: ret  <--------+   reached with one and with zero values
     */
    #[test]
    fn unbalanced_join() {
        let result = DataFlowGraph::from_method_body(&MethodBody::from_instructions(vec![
            Instruction::simple(0, OpCode::Ldarg_0),
            Instruction::new(1, OpCode::Brtrue_S, Operand::BranchTarget(4)),
            Instruction::simple(3, OpCode::Ldc_I4_0),
            Instruction::simple(4, OpCode::Ret),
        ]));
        assert!(matches!(result, Err(Error::StackImbalance { offset: 4, .. })));
    }

    /*
     *  try {
     *     0: ldc.i4.1
     *     1: stloc.0
     *     2: leave.s 9
     *  } catch {
     *     4: pop
     *     5: ldloc.0
     *     6: stloc.1
     *     7: leave.s 9
     *  }
     *     9: ret
     */
    #[test]
    fn catch_entry_has_no_producer() {
        let exception = TypeRef::new(Token::new(0x0100_0002), "System", "Exception", false);
        let body = MethodBody::new(
            vec![
                Instruction::simple(0, OpCode::Ldc_I4_1),
                Instruction::simple(1, OpCode::Stloc_0),
                Instruction::new(2, OpCode::Leave_S, Operand::BranchTarget(9)),
                Instruction::simple(4, OpCode::Pop),
                Instruction::simple(5, OpCode::Ldloc_0),
                Instruction::simple(6, OpCode::Stloc_1),
                Instruction::new(7, OpCode::Leave_S, Operand::BranchTarget(9)),
                Instruction::simple(9, OpCode::Ret),
            ],
            vec![ExceptionHandler::new(ExceptionHandlerKind::Catch(exception), 0, 4, 4, 9)],
            vec![TypeSig::I4, TypeSig::I4],
            Vec::new(),
            TypeSig::Void,
        );
        let dfg = DataFlowGraph::from_method_body(&body).unwrap();

        let pop = dfg.node(4).unwrap();
        assert_eq!(pop.stack_dependencies().len(), 1);
        assert!(pop.stack_dependencies().get(0).unwrap().sources().is_empty());
        assert_eq!(dfg.ordered_dependencies(4, DependencyFlags::ALL).unwrap(), vec![4]);

        // The handler may run before or after the store in the try block.
        let load = dfg.node(5).unwrap();
        let writers = load.variable_dependencies().get(&Variable::Local(0)).unwrap();
        assert_eq!(writers.iter().map(|source| source.node()).collect::<Vec<u32>>(), vec![1]);
        assert_eq!(dfg.len(), 8);
    }
}
