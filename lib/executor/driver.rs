//! A driver replays CIL methods, or the slices of them which feed a single
//! instruction, through a `Dispatcher`.

use log::{debug, trace, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::cil::{Instruction, MethodBody, OpCode, Operand, TypeSig};
use crate::data_flow::{DataFlowGraph, DependencyFlags};
use crate::executor::{
    DefaultEnvironment, DispatchFault, DispatchHook, DispatchResult, Dispatcher, ExecutionContext, Options,
    RuntimeEnvironment, Successor,
};
use crate::memory::{Heap, HeapObject};
use crate::value::{ObjectReference, Value};
use crate::Error;
use crate::RC;

/// A call argument recovered by replaying the slice which computes it.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Argument {
    Int32(i32),
    Int64(i64),
    Float(f64),
    String(String),
    Null,
    /// Anything not fully known, or of a shape other than the above.
    Unknown,
}

impl Argument {
    fn from_value(value: &Value, parameter: &TypeSig, heap: &Heap, is_32bit: bool) -> Argument {
        match value.coerce(parameter, is_32bit) {
            Value::Int32(value) => value
                .known_value()
                .map(|value| Argument::Int32(value as i32))
                .unwrap_or(Argument::Unknown),
            Value::Int64(value) | Value::NativeInt(value) => value
                .known_value()
                .map(|value| Argument::Int64(value as i64))
                .unwrap_or(Argument::Unknown),
            Value::Float(value) => value.known_value().map(Argument::Float).unwrap_or(Argument::Unknown),
            Value::Object(ObjectReference::Null) => Argument::Null,
            Value::Object(ObjectReference::Known(reference)) => match heap.get(reference) {
                Ok(HeapObject::String(string)) => Argument::String(string.clone()),
                _ => Argument::Unknown,
            },
            _ => Argument::Unknown,
        }
    }
}

/// How `Driver::run` stopped.
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    /// The method returned, with its return value if it has one.
    Returned(Option<Value>),
    /// The method threw. Handlers are not run.
    Threw(Option<Value>),
    /// The instruction at `offset` has more than one live successor.
    Forked { offset: u32, targets: Vec<u32> },
    /// The instruction at `offset` faulted.
    Faulted { offset: u32, fault: DispatchFault },
    /// Execution reached the end of a handler at `offset`.
    HandlerExit { offset: u32, successor: Successor },
    /// `Options::max_steps` instructions ran without the method finishing.
    StepLimit { offset: u32 },
}

/// A before hook which makes `ldtoken` push `null`.
///
/// String decryptors often take a runtime handle they never inspect. A
/// `null` lets the argument be reported as `Argument::Null` instead of
/// `Argument::Unknown`.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullTokenHook;

impl DispatchHook for NullTokenHook {
    fn before(&self, context: &mut ExecutionContext, instruction: &Instruction) -> Option<DispatchResult> {
        if instruction.opcode() != OpCode::Ldtoken {
            return None;
        }
        Some(
            context
                .stack_mut()
                .push(Value::null())
                .map(|_| Successor::FallThrough),
        )
    }
}

#[derive(Clone)]
pub struct Driver {
    dispatcher: Dispatcher,
    environment: RC<dyn RuntimeEnvironment>,
    options: Options,
}

impl Driver {
    pub fn new(dispatcher: Dispatcher, environment: RC<dyn RuntimeEnvironment>, options: Options) -> Driver {
        Driver {
            dispatcher,
            environment,
            options,
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// A fresh context for `body`.
    pub fn context(&self, body: &MethodBody) -> ExecutionContext {
        ExecutionContext::new(body, self.environment.clone(), self.options.clone())
    }

    /// Replay the instructions which produce the stack at `offset`, in
    /// dependency order, and return the context they leave behind. The
    /// instruction at `offset` itself is not executed.
    ///
    /// The first dispatch fault ends the replay and is returned as
    /// `Error::Dispatch`.
    pub fn replay_to(&self, body: &MethodBody, offset: u32) -> Result<ExecutionContext, Error> {
        let mut body = body.clone();
        body.expand_macros();

        let graph = DataFlowGraph::from_method_body(&body)?;
        let mut slice = graph.ordered_dependencies(offset, DependencyFlags::STACK)?;
        slice.pop();
        debug!("replaying {} instructions for IL_{:04x}", slice.len(), offset);

        let mut context = self.context(&body);
        for producer in slice {
            let instruction = body.instruction(producer)?;
            if let Err(fault) = self.dispatcher.dispatch(&mut context, instruction) {
                warn!("replay for IL_{:04x} stopped at {}: {}", offset, instruction, fault);
                return Err(Error::Dispatch {
                    offset: producer,
                    fault,
                });
            }
        }
        Ok(context)
    }

    /// The operand stack as it is when the instruction at `offset` runs,
    /// bottom first.
    pub fn stack_at(&self, body: &MethodBody, offset: u32) -> Result<Vec<Value>, Error> {
        Ok(self.replay_to(body, offset)?.stack().values().to_vec())
    }

    /// The arguments of the call at `offset`, one for each declared
    /// parameter. The `this` argument of instance calls is not included.
    pub fn arguments_at(&self, body: &MethodBody, offset: u32) -> Result<Vec<Argument>, Error> {
        let instruction = body.instruction(offset)?;
        let signature = match instruction.opcode() {
            OpCode::Call | OpCode::Callvirt | OpCode::Newobj => instruction.signature(),
            _ => None,
        }
        .ok_or_else(|| Error::Custom(format!("{} is not a call", instruction)))?
        .clone();

        let context = self.replay_to(body, offset)?;
        let values = context.stack().values();
        let parameters = signature.parameters();
        if values.len() < parameters.len() {
            return Err(Error::StackUnderflow { offset });
        }

        let is_32bit = context.is_32bit();
        Ok(values[values.len() - parameters.len()..]
            .iter()
            .zip(parameters)
            .map(|(value, parameter)| Argument::from_value(value, parameter, context.heap(), is_32bit))
            .collect())
    }

    /// Replace the call at `offset` with `ldstr value`, and the instructions
    /// which computed its operands with `nop`s. Offsets do not move. Returns
    /// the offsets which became `nop`s, in replay order.
    ///
    /// The call must return a string. If a value pushed by the slice is also
    /// consumed outside it, the body is left untouched and
    /// `Error::SharedProducer` is returned.
    pub fn inline_string(body: &mut MethodBody, offset: u32, value: &str) -> Result<Vec<u32>, Error> {
        let instruction = body.instruction(offset)?;
        let returns_string = match instruction.opcode() {
            OpCode::Call | OpCode::Callvirt => instruction
                .signature()
                .map(|signature| *signature.return_type() == TypeSig::String)
                .unwrap_or(false),
            _ => false,
        };
        if !returns_string {
            return Err(Error::Custom(format!("{} is not a call returning a string", instruction)));
        }

        let graph = DataFlowGraph::from_method_body(body)?;
        let mut slice = graph.ordered_dependencies(offset, DependencyFlags::STACK)?;
        slice.pop();

        let members = slice.iter().copied().collect::<BTreeSet<u32>>();
        for node in graph.nodes() {
            if node.offset() == offset || members.contains(&node.offset()) {
                continue;
            }
            let shared = node
                .stack_dependencies()
                .iter()
                .flat_map(|dependency| dependency.sources().iter())
                .find(|source| members.contains(&source.node()));
            if let Some(source) = shared {
                return Err(Error::SharedProducer {
                    producer: source.node(),
                    consumer: node.offset(),
                });
            }
        }

        for producer in slice.iter() {
            body.nop(*producer)?;
        }
        body.rewrite(offset, OpCode::Ldstr, Operand::String(value.to_string()))?;
        debug!("inlined {:?} at IL_{:04x} over {} instructions", value, offset, slice.len());
        Ok(slice)
    }

    /// Run `body` from its first instruction in a fresh context.
    pub fn run(&self, body: &MethodBody) -> Result<RunOutcome, Error> {
        let mut context = self.context(body);
        self.run_with(body, &mut context)
    }

    /// Run `body` from its first instruction in `context`, following
    /// successors until the method returns or throws, a fork or fault is
    /// reached, or `Options::max_steps` runs out.
    ///
    /// Exception handlers are not entered.
    pub fn run_with(&self, body: &MethodBody, context: &mut ExecutionContext) -> Result<RunOutcome, Error> {
        let mut body = body.clone();
        body.expand_macros();

        let mut offset = body
            .instructions()
            .first()
            .map(|instruction| instruction.offset())
            .ok_or(Error::EmptyMethodBody)?;

        for _ in 0..self.options.max_steps() {
            let instruction = body.instruction(offset)?;
            let successor = match self.dispatcher.dispatch(context, instruction) {
                Ok(successor) => successor,
                Err(fault) => return Ok(RunOutcome::Faulted { offset, fault }),
            };
            trace!("{} -> {}", instruction, successor);

            // TODO: run the finally handlers a `leave` exits before taking
            // the branch.
            offset = match successor {
                Successor::FallThrough => instruction.next_offset(),
                Successor::Branch(target) => target,
                Successor::Fork(targets) => return Ok(RunOutcome::Forked { offset, targets }),
                Successor::Return => return Ok(RunOutcome::Returned(context.return_value().cloned())),
                Successor::Throw => return Ok(RunOutcome::Threw(context.exception().cloned())),
                successor => return Ok(RunOutcome::HandlerExit { offset, successor }),
            };
        }

        debug!("step limit reached at IL_{:04x}", offset);
        Ok(RunOutcome::StepLimit { offset })
    }
}

impl Default for Driver {
    fn default() -> Driver {
        Driver::new(Dispatcher::new(), RC::new(DefaultEnvironment::new()), Options::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cil::{Member, MethodRef, MethodSignature, Operand, Token, TypeRef};
    use crate::executor::OptionsBuilder;

    fn decrypt() -> MethodRef {
        let handle = TypeRef::new(Token::new(0x0100_0010), "System", "RuntimeTypeHandle", true);
        MethodRef::new(
            Token::new(0x0600_0042),
            TypeRef::new(Token::new(0x0200_0005), "", "Strings", false),
            "Decrypt",
            MethodSignature::static_method(
                vec![TypeSig::String, TypeSig::I4, TypeSig::ValueType(handle)],
                TypeSig::String,
            ),
            false,
        )
    }

    /// ```text
    /// IL_0000: ldstr "Zm9v"
    /// IL_0005: ldarg.0
    /// IL_0006: pop
    /// IL_0007: ldc.i4.s 42
    /// IL_0009: ldc.i4.3
    /// IL_000a: add
    /// IL_000b: ldtoken Strings
    /// IL_0010: call string Strings::Decrypt(string, int32, RuntimeTypeHandle)
    /// IL_0015: pop
    /// IL_0016: ret
    /// ```
    fn call_site() -> MethodBody {
        let strings = TypeRef::new(Token::new(0x0200_0005), "", "Strings", false);
        MethodBody::new(
            vec![
                Instruction::new(0x00, OpCode::Ldstr, Operand::String("Zm9v".to_string())),
                Instruction::simple(0x05, OpCode::Ldarg_0),
                Instruction::simple(0x06, OpCode::Pop),
                Instruction::new(0x07, OpCode::Ldc_I4_S, Operand::Int8(42)),
                Instruction::simple(0x09, OpCode::Ldc_I4_3),
                Instruction::simple(0x0a, OpCode::Add),
                Instruction::new(0x0b, OpCode::Ldtoken, Operand::Member(Member::Type(strings))),
                Instruction::new(0x10, OpCode::Call, Operand::Method(decrypt())),
                Instruction::simple(0x15, OpCode::Pop),
                Instruction::simple(0x16, OpCode::Ret),
            ],
            Vec::new(),
            Vec::new(),
            vec![TypeSig::I4],
            TypeSig::Void,
        )
    }

    #[test]
    fn stack_at_call_site() {
        let mut driver = Driver::default();
        driver.dispatcher_mut().add_hook(RC::new(NullTokenHook));

        let stack = driver.stack_at(&call_site(), 0x10).unwrap();
        assert_eq!(stack.len(), 3);
        assert_eq!(stack[1], Value::int32(45));
        assert_eq!(stack[2], Value::null());

        assert_eq!(
            driver.arguments_at(&call_site(), 0x10).unwrap(),
            vec![
                Argument::String("Zm9v".to_string()),
                Argument::Int32(45),
                Argument::Null
            ]
        );
    }

    #[test]
    fn tokens_are_unknown_without_the_hook() {
        let arguments = Driver::default().arguments_at(&call_site(), 0x10).unwrap();
        assert_eq!(arguments[2], Argument::Unknown);

        assert!(Driver::default().arguments_at(&call_site(), 0x0a).is_err());
    }

    #[test]
    fn inline_string_replaces_the_call_site() {
        let mut body = call_site();
        assert_eq!(
            Driver::inline_string(&mut body, 0x10, "foo").unwrap(),
            vec![0x00, 0x07, 0x09, 0x0a, 0x0b]
        );

        let opcodes = body
            .instructions()
            .iter()
            .map(|instruction| (instruction.offset(), instruction.opcode()))
            .collect::<Vec<(u32, OpCode)>>();
        assert_eq!(
            opcodes,
            vec![
                (0x00, OpCode::Nop),
                (0x05, OpCode::Ldarg_0),
                (0x06, OpCode::Pop),
                (0x07, OpCode::Nop),
                (0x09, OpCode::Nop),
                (0x0a, OpCode::Nop),
                (0x0b, OpCode::Nop),
                (0x10, OpCode::Ldstr),
                (0x15, OpCode::Pop),
                (0x16, OpCode::Ret),
            ]
        );
        assert_eq!(body.instruction(0x10).unwrap().next_offset(), 0x15);
        assert_eq!(Driver::default().run(&body).unwrap(), RunOutcome::Returned(None));

        // Not a call.
        assert!(Driver::inline_string(&mut body, 0x15, "foo").is_err());
    }

    /// ```text
    /// IL_0000: ldstr "a"
    /// IL_0005: dup
    /// IL_0006: call string Decode(string)
    /// IL_000b: pop
    /// IL_000c: pop
    /// IL_000d: ret
    /// ```
    #[test]
    fn inline_string_keeps_shared_values() {
        let decode = MethodRef::new(
            Token::new(0x0600_0043),
            TypeRef::new(Token::new(0x0200_0005), "", "Strings", false),
            "Decode",
            MethodSignature::static_method(vec![TypeSig::String], TypeSig::String),
            false,
        );
        let mut body = MethodBody::from_instructions(vec![
            Instruction::new(0x00, OpCode::Ldstr, Operand::String("a".to_string())),
            Instruction::simple(0x05, OpCode::Dup),
            Instruction::new(0x06, OpCode::Call, Operand::Method(decode)),
            Instruction::simple(0x0b, OpCode::Pop),
            Instruction::simple(0x0c, OpCode::Pop),
            Instruction::simple(0x0d, OpCode::Ret),
        ]);
        let original = body.clone();

        match Driver::inline_string(&mut body, 0x06, "b") {
            Err(Error::SharedProducer { producer, consumer }) => {
                assert_eq!((producer, consumer), (0x05, 0x0c));
            }
            result => panic!("unexpected {:?}", result),
        }
        assert_eq!(body, original);
    }

    #[test]
    fn faults_stop_the_replay() {
        let body = MethodBody::from_instructions(vec![
            Instruction::simple(0, OpCode::Ldc_I4_1),
            Instruction::simple(1, OpCode::Ldc_I4_0),
            Instruction::simple(2, OpCode::Div),
            Instruction::simple(3, OpCode::Pop),
            Instruction::simple(4, OpCode::Ret),
        ]);

        match Driver::default().stack_at(&body, 3) {
            Err(Error::Dispatch { offset, fault }) => {
                assert_eq!(offset, 2);
                assert_eq!(fault, DispatchFault::DivideByZero);
            }
            result => panic!("unexpected {:?}", result),
        }
    }

    /// ```text
    /// IL_0000: ldc.i4.0
    /// IL_0001: stloc.0
    /// IL_0002: ldloc.0     <--+
    /// IL_0003: ldc.i4.1       |
    /// IL_0004: add            |
    /// IL_0005: stloc.0        |
    /// IL_0006: ldloc.0        |
    /// IL_0007: ldc.i4.5       |
    /// IL_0008: blt.s IL_0002 -+
    /// IL_000a: ldloc.0
    /// IL_000b: ret
    /// ```
    fn counting_loop() -> MethodBody {
        MethodBody::new(
            vec![
                Instruction::simple(0x00, OpCode::Ldc_I4_0),
                Instruction::simple(0x01, OpCode::Stloc_0),
                Instruction::simple(0x02, OpCode::Ldloc_0),
                Instruction::simple(0x03, OpCode::Ldc_I4_1),
                Instruction::simple(0x04, OpCode::Add),
                Instruction::simple(0x05, OpCode::Stloc_0),
                Instruction::simple(0x06, OpCode::Ldloc_0),
                Instruction::simple(0x07, OpCode::Ldc_I4_5),
                Instruction::new(0x08, OpCode::Blt_S, Operand::BranchTarget(0x02)),
                Instruction::simple(0x0a, OpCode::Ldloc_0),
                Instruction::simple(0x0b, OpCode::Ret),
            ],
            Vec::new(),
            vec![TypeSig::I4],
            Vec::new(),
            TypeSig::I4,
        )
    }

    #[test]
    fn run_follows_known_branches() {
        assert_eq!(
            Driver::default().run(&counting_loop()).unwrap(),
            RunOutcome::Returned(Some(Value::int32(5)))
        );

        let options = OptionsBuilder::new().max_steps(10).build();
        let driver = Driver::new(Dispatcher::new(), RC::new(DefaultEnvironment::new()), options);
        assert_eq!(driver.run(&counting_loop()).unwrap(), RunOutcome::StepLimit { offset: 0x03 });
    }

    #[test]
    fn run_steps_over_short_forms() {
        let body = MethodBody::new(
            vec![
                Instruction::simple(0, OpCode::Ldc_I4_1),
                Instruction::simple(1, OpCode::Stloc_0),
                Instruction::simple(2, OpCode::Ldloc_0),
                Instruction::simple(3, OpCode::Ret),
            ],
            Vec::new(),
            vec![TypeSig::I4],
            Vec::new(),
            TypeSig::I4,
        );
        assert_eq!(
            Driver::default().run(&body).unwrap(),
            RunOutcome::Returned(Some(Value::int32(1)))
        );
    }

    #[test]
    fn run_stops_at_unknown_branches() {
        let body = MethodBody::new(
            vec![
                Instruction::simple(0, OpCode::Ldarg_0),
                Instruction::new(1, OpCode::Brtrue_S, Operand::BranchTarget(4)),
                Instruction::simple(3, OpCode::Ret),
                Instruction::simple(4, OpCode::Ret),
            ],
            Vec::new(),
            Vec::new(),
            vec![TypeSig::I4],
            TypeSig::Void,
        );

        let driver = Driver::default();
        assert_eq!(
            driver.run(&body).unwrap(),
            RunOutcome::Forked {
                offset: 1,
                targets: vec![4, 3]
            }
        );

        let mut context = driver.context(&body);
        context.set_argument(0, Value::int32(0)).unwrap();
        assert_eq!(driver.run_with(&body, &mut context).unwrap(), RunOutcome::Returned(None));
    }
}
