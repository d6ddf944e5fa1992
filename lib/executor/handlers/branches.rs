use log::debug;
use rustc_hash::FxHashSet;

use crate::cil::{Instruction, OpCode, Operand};
use crate::executor::handlers::comparison::{compare, Comparison};
use crate::executor::handlers::{invalid_operand, known_index};
use crate::executor::{DispatchFault, DispatchResult, ExecutionContext, OpCodeHandler, Successor};
use crate::types::Trilean;
use crate::value::Value;

fn branch_target(instruction: &Instruction) -> Result<u32, DispatchFault> {
    match instruction.operand() {
        Operand::BranchTarget(target) => Ok(*target),
        _ => Err(invalid_operand(instruction, "branch target")),
    }
}

/// Pick the successor of a conditional branch whose condition is `taken`.
fn conditional(instruction: &Instruction, taken: Trilean) -> DispatchResult {
    let target = branch_target(instruction)?;
    Ok(match taken {
        Trilean::True => Successor::Branch(target),
        Trilean::False => Successor::FallThrough,
        Trilean::Unknown => {
            debug!("{} forks", instruction);
            Successor::Fork(vec![target, instruction.next_offset()])
        }
    })
}

pub struct Branch;

impl OpCodeHandler for Branch {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Br, OpCode::Br_S]
    }

    fn execute(&self, _context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        Ok(Successor::Branch(branch_target(instruction)?))
    }
}

/// `leave` empties the evaluation stack before it branches.
pub struct Leave;

impl OpCodeHandler for Leave {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Leave, OpCode::Leave_S]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let target = branch_target(instruction)?;
        context.stack_mut().clear();
        Ok(Successor::Branch(target))
    }
}

pub struct BranchOnValue;

impl OpCodeHandler for BranchOnValue {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Brtrue, OpCode::Brtrue_S, OpCode::Brfalse, OpCode::Brfalse_S]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let is_zero = context.stack_mut().pop()?.is_zero();
        let taken = match instruction.opcode() {
            OpCode::Brfalse | OpCode::Brfalse_S => is_zero,
            _ => !is_zero,
        };
        conditional(instruction, taken)
    }
}

pub struct BranchOnComparison;

impl OpCodeHandler for BranchOnComparison {
    fn opcodes(&self) -> &'static [OpCode] {
        &[
            OpCode::Beq,
            OpCode::Beq_S,
            OpCode::Bne_Un,
            OpCode::Bne_Un_S,
            OpCode::Bge,
            OpCode::Bge_S,
            OpCode::Bge_Un,
            OpCode::Bge_Un_S,
            OpCode::Bgt,
            OpCode::Bgt_S,
            OpCode::Bgt_Un,
            OpCode::Bgt_Un_S,
            OpCode::Ble,
            OpCode::Ble_S,
            OpCode::Ble_Un,
            OpCode::Ble_Un_S,
            OpCode::Blt,
            OpCode::Blt_S,
            OpCode::Blt_Un,
            OpCode::Blt_Un_S,
        ]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let rhs = context.stack_mut().pop()?;
        let lhs = context.stack_mut().pop()?;
        let is_32bit = context.is_32bit();

        let (comparison, unsigned) = match instruction.opcode() {
            OpCode::Beq | OpCode::Beq_S | OpCode::Bne_Un | OpCode::Bne_Un_S => (Comparison::Equal, false),
            OpCode::Bge | OpCode::Bge_S => (Comparison::GreaterOrEqual, false),
            OpCode::Bge_Un | OpCode::Bge_Un_S => (Comparison::GreaterOrEqual, true),
            OpCode::Bgt | OpCode::Bgt_S => (Comparison::Greater, false),
            OpCode::Bgt_Un | OpCode::Bgt_Un_S => (Comparison::Greater, true),
            OpCode::Ble | OpCode::Ble_S => (Comparison::LessOrEqual, false),
            OpCode::Ble_Un | OpCode::Ble_Un_S => (Comparison::LessOrEqual, true),
            OpCode::Blt | OpCode::Blt_S => (Comparison::Less, false),
            _ => (Comparison::Less, true),
        };

        let mut taken = compare(comparison, unsigned, &lhs, &rhs, is_32bit)?;
        if matches!(instruction.opcode(), OpCode::Bne_Un | OpCode::Bne_Un_S) {
            taken = !taken;
        }
        conditional(instruction, taken)
    }
}

/// A `switch` on a known index branches to one target, or falls through when
/// the index is out of range. An unknown index forks to every target and the
/// next instruction.
pub struct Switch;

impl OpCodeHandler for Switch {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Switch]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        let targets = match instruction.operand() {
            Operand::Switch(targets) => targets,
            _ => return Err(invalid_operand(instruction, "switch table")),
        };
        let index = context.stack_mut().pop()?;

        // The index is unsigned.
        let index = match (&index, known_index(&index)?) {
            (Value::Int32(_), Some(index)) => Some(index as u32 as u64),
            (_, index) => index.map(|index| index as u64),
        };

        Ok(match index {
            Some(index) => match targets.get(index as usize) {
                Some(target) => Successor::Branch(*target),
                None => Successor::FallThrough,
            },
            None => {
                debug!("{} forks on an unknown index", instruction);
                let mut seen = FxHashSet::default();
                let successors = targets
                    .iter()
                    .copied()
                    .chain(std::iter::once(instruction.next_offset()))
                    .filter(|target| seen.insert(*target))
                    .collect();
                Successor::Fork(successors)
            }
        })
    }
}

pub struct Return;

impl OpCodeHandler for Return {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Ret]
    }

    fn execute(&self, context: &mut ExecutionContext, _instruction: &Instruction) -> DispatchResult {
        if context.returns_value() {
            let value = context.stack_mut().pop()?;
            context.set_return_value(Some(value));
        }
        Ok(Successor::Return)
    }
}

pub struct Throw;

impl OpCodeHandler for Throw {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Throw, OpCode::Rethrow]
    }

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        if instruction.opcode() == OpCode::Throw {
            let exception = context.stack_mut().pop()?;
            if exception.is_zero() == Trilean::True {
                return Err(DispatchFault::NullReference);
            }
            context.set_exception(Some(exception));
        }
        Ok(Successor::Throw)
    }
}

pub struct EndFinally;

impl OpCodeHandler for EndFinally {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Endfinally]
    }

    fn execute(&self, context: &mut ExecutionContext, _instruction: &Instruction) -> DispatchResult {
        context.stack_mut().clear();
        Ok(Successor::EndFinally)
    }
}

pub struct EndFilter;

impl OpCodeHandler for EndFilter {
    fn opcodes(&self) -> &'static [OpCode] {
        &[OpCode::Endfilter]
    }

    fn execute(&self, context: &mut ExecutionContext, _instruction: &Instruction) -> DispatchResult {
        let accept = !context.stack_mut().pop()?.is_zero();
        Ok(Successor::EndFilter(accept))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::handlers::tests::context;
    use crate::executor::Dispatcher;
    use crate::value::Integer32;

    fn dispatch(inputs: &[Value], instruction: Instruction) -> DispatchResult {
        let mut context = context();
        for input in inputs {
            context.stack_mut().push(input.clone()).unwrap();
        }
        Dispatcher::new().dispatch(&mut context, &instruction)
    }

    #[test]
    fn conditional_branches() {
        let brtrue = Instruction::new(10, OpCode::Brtrue_S, Operand::BranchTarget(20));

        assert_eq!(dispatch(&[Value::int32(1)], brtrue.clone()), Ok(Successor::Branch(20)));
        assert_eq!(dispatch(&[Value::int32(0)], brtrue.clone()), Ok(Successor::FallThrough));
        assert_eq!(
            dispatch(&[Value::Int32(Integer32::unknown())], brtrue.clone()),
            Ok(Successor::Fork(vec![20, 12]))
        );
        assert_eq!(
            dispatch(&[Value::Int32(Integer32::unknown())], brtrue.expand_macro()),
            Ok(Successor::Fork(vec![20, 12]))
        );

        let blt = Instruction::new(0, OpCode::Blt, Operand::BranchTarget(40));
        assert_eq!(dispatch(&[Value::int32(-1), Value::int32(3)], blt), Ok(Successor::Branch(40)));

        let bne = Instruction::new(0, OpCode::Bne_Un_S, Operand::BranchTarget(8));
        assert_eq!(dispatch(&[Value::int32(3), Value::int32(3)], bne), Ok(Successor::FallThrough));
    }

    #[test]
    fn switch_targets() {
        let switch = Instruction::new(0, OpCode::Switch, Operand::Switch(vec![30, 40]));

        assert_eq!(dispatch(&[Value::int32(1)], switch.clone()), Ok(Successor::Branch(40)));
        assert_eq!(dispatch(&[Value::int32(-1)], switch.clone()), Ok(Successor::FallThrough));
        assert_eq!(
            dispatch(&[Value::Int32(Integer32::unknown())], switch),
            Ok(Successor::Fork(vec![30, 40, 13]))
        );

        // Every live target is listed once, in table order.
        let switch = Instruction::new(0, OpCode::Switch, Operand::Switch(vec![21, 30, 21, 30]));
        assert_eq!(
            dispatch(&[Value::Int32(Integer32::unknown())], switch),
            Ok(Successor::Fork(vec![21, 30]))
        );
    }

    #[test]
    fn leave_clears_the_stack() {
        let mut context = context();
        context.stack_mut().push(Value::int32(1)).unwrap();
        let leave = Instruction::new(0, OpCode::Leave_S, Operand::BranchTarget(9));

        assert_eq!(Dispatcher::new().dispatch(&mut context, &leave), Ok(Successor::Branch(9)));
        assert!(context.stack().is_empty());
    }

    #[test]
    fn throwing_null() {
        let throw = Instruction::simple(0, OpCode::Throw);
        assert_eq!(dispatch(&[Value::null()], throw), Err(DispatchFault::NullReference));
    }
}
