//! Opcode dispatch.

use log::{debug, trace};
use rustc_hash::FxHashMap;

use crate::cil::{Instruction, OpCode};
use crate::executor::handlers;
use crate::executor::{DispatchFault, DispatchResult, ExecutionContext};
use crate::RC;

/// Implements the semantics of one family of opcodes.
///
/// Handlers carry no state. Everything they change lives in the
/// `ExecutionContext`.
pub trait OpCodeHandler: Send + Sync {
    /// The opcodes this handler implements.
    fn opcodes(&self) -> &'static [OpCode];

    fn execute(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult;
}

/// Observes, and optionally overrides, the dispatch of instructions.
pub trait DispatchHook: Send + Sync {
    /// Called before the handler runs. Returning an outcome skips the
    /// handler, and the remaining before hooks.
    fn before(&self, _context: &mut ExecutionContext, _instruction: &Instruction) -> Option<DispatchResult> {
        None
    }

    /// Called with the outcome of every dispatch.
    fn after(&self, _context: &ExecutionContext, _instruction: &Instruction, _result: &DispatchResult) {}
}

/// Maps opcodes to their handlers and runs hooks around them.
#[derive(Clone)]
pub struct Dispatcher {
    table: FxHashMap<OpCode, RC<dyn OpCodeHandler>>,
    hooks: Vec<RC<dyn DispatchHook>>,
}

impl Dispatcher {
    /// A dispatcher with a handler for every opcode.
    pub fn new() -> Dispatcher {
        let mut dispatcher = Dispatcher::empty();
        for handler in handlers::default_handlers() {
            dispatcher.register(handler);
        }
        dispatcher
    }

    /// A dispatcher without handlers or hooks.
    pub fn empty() -> Dispatcher {
        Dispatcher {
            table: FxHashMap::default(),
            hooks: Vec::new(),
        }
    }

    /// Register a handler for every opcode it names, replacing any handler
    /// registered for them before.
    pub fn register(&mut self, handler: RC<dyn OpCodeHandler>) {
        for opcode in handler.opcodes() {
            self.table.insert(*opcode, handler.clone());
        }
    }

    /// Add a hook. Hooks run in the order they were added.
    pub fn add_hook(&mut self, hook: RC<dyn DispatchHook>) {
        self.hooks.push(hook);
    }

    pub fn handler(&self, opcode: OpCode) -> Option<&RC<dyn OpCodeHandler>> {
        self.table.get(&opcode)
    }

    /// Every opcode without a handler, in opcode table order.
    pub fn unhandled_opcodes(&self) -> Vec<OpCode> {
        OpCode::ALL
            .iter()
            .filter(|opcode| !self.table.contains_key(*opcode))
            .copied()
            .collect()
    }

    /// Execute one instruction.
    pub fn dispatch(&self, context: &mut ExecutionContext, instruction: &Instruction) -> DispatchResult {
        trace!("dispatch {} with stack {}", instruction, context.stack());

        let mut result = None;
        for hook in self.hooks.iter() {
            if let Some(outcome) = hook.before(context, instruction) {
                result = Some(outcome);
                break;
            }
        }

        let result = match result {
            Some(result) => result,
            None => match self.table.get(&instruction.opcode()) {
                Some(handler) => handler.execute(context, instruction),
                None => Err(DispatchFault::UnresolvedInstruction(instruction.opcode())),
            },
        };

        if let Err(fault) = &result {
            debug!("{} faulted: {}", instruction, fault);
        }

        for hook in self.hooks.iter() {
            hook.after(context, instruction, &result);
        }

        result
    }
}

impl Default for Dispatcher {
    fn default() -> Dispatcher {
        Dispatcher::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cil::{MethodBody, Operand, TypeSig};
    use crate::executor::{DefaultEnvironment, Options, Successor};
    use crate::value::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    fn context() -> ExecutionContext {
        let body = MethodBody::new(
            vec![Instruction::simple(0, OpCode::Ret)],
            Vec::new(),
            vec![TypeSig::I4],
            Vec::new(),
            TypeSig::Void,
        );
        ExecutionContext::new(&body, RC::new(DefaultEnvironment::new()), Options::new())
    }

    #[test]
    fn every_opcode_has_a_handler() {
        let dispatcher = Dispatcher::new();
        assert_eq!(dispatcher.unhandled_opcodes(), Vec::<OpCode>::new());
    }

    #[test]
    fn missing_handler_is_a_fault() {
        let dispatcher = Dispatcher::empty();
        let mut context = context();

        let result = dispatcher.dispatch(&mut context, &Instruction::simple(0, OpCode::Nop));
        assert_eq!(result, Err(DispatchFault::UnresolvedInstruction(OpCode::Nop)));
        assert_eq!(dispatcher.unhandled_opcodes().len(), OpCode::ALL.len());
    }

    struct Abort;

    impl DispatchHook for Abort {
        fn before(&self, _context: &mut ExecutionContext, instruction: &Instruction) -> Option<DispatchResult> {
            if instruction.opcode() == OpCode::Ldc_I4 {
                Some(Err(DispatchFault::Aborted("no constants".to_string())))
            } else {
                None
            }
        }
    }

    #[derive(Default)]
    struct Record {
        before: AtomicUsize,
        outcomes: Mutex<Vec<DispatchResult>>,
    }

    impl DispatchHook for Record {
        fn before(&self, _context: &mut ExecutionContext, _instruction: &Instruction) -> Option<DispatchResult> {
            self.before.fetch_add(1, Ordering::SeqCst);
            None
        }

        fn after(&self, _context: &ExecutionContext, _instruction: &Instruction, result: &DispatchResult) {
            if let Ok(mut outcomes) = self.outcomes.lock() {
                outcomes.push(result.clone());
            }
        }
    }

    #[test]
    fn hooks_short_circuit_in_order() {
        let record = RC::new(Record::default());
        let mut dispatcher = Dispatcher::new();
        dispatcher.add_hook(RC::new(Abort));
        dispatcher.add_hook(record.clone());
        let mut context = context();

        let result = dispatcher.dispatch(&mut context, &Instruction::new(0, OpCode::Ldc_I4, Operand::Int32(7)));
        assert!(matches!(result, Err(DispatchFault::Aborted(_))));
        assert!(context.stack().is_empty());
        assert_eq!(record.before.load(Ordering::SeqCst), 0);

        let result = dispatcher.dispatch(&mut context, &Instruction::simple(5, OpCode::Ldc_I4_2));
        assert_eq!(result, Ok(Successor::FallThrough));
        assert_eq!(context.stack().values(), &[Value::int32(2)]);
        assert_eq!(record.before.load(Ordering::SeqCst), 1);

        let outcomes = record.outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].is_err());
    }
}
