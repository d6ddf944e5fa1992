//! The mutable state of one interpreted method.

use std::collections::BTreeMap;
use std::fmt;

use crate::cil::{FieldRef, MethodBody, TypeSig, Variable};
use crate::executor::{DispatchFault, Options, RuntimeEnvironment};
use crate::memory::Heap;
use crate::value::Value;
use crate::RC;

/// The evaluation stack. The top of the stack is the last element.
#[derive(Clone, Debug, PartialEq)]
pub struct OperandStack {
    values: Vec<Value>,
    max_depth: usize,
}

impl OperandStack {
    pub fn new(max_depth: usize) -> OperandStack {
        OperandStack {
            values: Vec::new(),
            max_depth,
        }
    }

    pub fn push(&mut self, value: Value) -> Result<(), DispatchFault> {
        if self.values.len() >= self.max_depth {
            return Err(DispatchFault::InvalidProgram(format!(
                "stack grew past {} values",
                self.max_depth
            )));
        }
        self.values.push(value);
        Ok(())
    }

    pub fn pop(&mut self) -> Result<Value, DispatchFault> {
        self.values.pop().ok_or(DispatchFault::StackUnderflow)
    }

    /// Pop `count` values, returned in the order they were pushed.
    pub fn pop_many(&mut self, count: usize) -> Result<Vec<Value>, DispatchFault> {
        if count > self.values.len() {
            return Err(DispatchFault::StackUnderflow);
        }
        Ok(self.values.split_off(self.values.len() - count))
    }

    pub fn peek(&self) -> Result<&Value, DispatchFault> {
        self.values.last().ok_or(DispatchFault::StackUnderflow)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    /// The values on the stack, bottom first.
    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Display for OperandStack {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let values = self.values.iter().map(|value| value.to_string()).collect::<Vec<String>>();
        write!(f, "[{}]", values.join(", "))
    }
}

/// Local variable and argument slots, each with its declared type.
#[derive(Clone, Debug, PartialEq)]
pub struct VariableStore {
    locals: Vec<(TypeSig, Value)>,
    arguments: Vec<(TypeSig, Value)>,
    is_32bit: bool,
}

impl VariableStore {
    /// Locals are zeroed when `init_locals` is set and unknown otherwise.
    /// Arguments start out unknown.
    pub fn new(locals: &[TypeSig], arguments: &[TypeSig], init_locals: bool, is_32bit: bool) -> VariableStore {
        let locals = locals
            .iter()
            .map(|sig| {
                let value = if init_locals {
                    Value::default_of(sig, is_32bit)
                } else {
                    Value::unknown_of(sig, is_32bit)
                };
                (sig.clone(), value)
            })
            .collect();
        let arguments = arguments
            .iter()
            .map(|sig| (sig.clone(), Value::unknown_of(sig, is_32bit)))
            .collect();
        VariableStore {
            locals,
            arguments,
            is_32bit,
        }
    }

    fn slot(&self, variable: Variable) -> Result<&(TypeSig, Value), DispatchFault> {
        let slot = match variable {
            Variable::Local(index) => self.locals.get(index as usize),
            Variable::Argument(index) => self.arguments.get(index as usize),
        };
        slot.ok_or(DispatchFault::UnknownVariable(variable))
    }

    fn slot_mut(&mut self, variable: Variable) -> Result<&mut (TypeSig, Value), DispatchFault> {
        let slot = match variable {
            Variable::Local(index) => self.locals.get_mut(index as usize),
            Variable::Argument(index) => self.arguments.get_mut(index as usize),
        };
        slot.ok_or(DispatchFault::UnknownVariable(variable))
    }

    pub fn get(&self, variable: Variable) -> Result<&Value, DispatchFault> {
        Ok(&self.slot(variable)?.1)
    }

    pub fn variable_type(&self, variable: Variable) -> Result<&TypeSig, DispatchFault> {
        Ok(&self.slot(variable)?.0)
    }

    /// Store `value`, converted to the variable's declared type.
    pub fn set(&mut self, variable: Variable, value: Value) -> Result<(), DispatchFault> {
        let is_32bit = self.is_32bit;
        let slot = self.slot_mut(variable)?;
        slot.1 = value.coerce(&slot.0, is_32bit);
        Ok(())
    }

    /// Forget what is known about a variable, as when its address escapes.
    pub fn mark_unknown(&mut self, variable: Variable) -> Result<(), DispatchFault> {
        let is_32bit = self.is_32bit;
        let slot = self.slot_mut(variable)?;
        slot.1 = Value::unknown_of(&slot.0, is_32bit);
        Ok(())
    }

    pub fn local_count(&self) -> usize {
        self.locals.len()
    }

    pub fn argument_count(&self) -> usize {
        self.arguments.len()
    }

    /// The argument values, in declaration order.
    pub fn arguments(&self) -> Vec<Value> {
        self.arguments.iter().map(|(_, value)| value.clone()).collect()
    }
}

/// Everything an `OpCodeHandler` may read or change.
pub struct ExecutionContext {
    stack: OperandStack,
    variables: VariableStore,
    heap: Heap,
    statics: BTreeMap<FieldRef, Value>,
    environment: RC<dyn RuntimeEnvironment>,
    options: Options,
    init_locals: bool,
    returns_value: bool,
    return_value: Option<Value>,
    exception: Option<Value>,
}

impl ExecutionContext {
    /// Create a fresh context for interpreting `body`.
    pub fn new(body: &MethodBody, environment: RC<dyn RuntimeEnvironment>, options: Options) -> ExecutionContext {
        let init_locals = options.init_locals().unwrap_or_else(|| body.init_locals());
        ExecutionContext {
            stack: OperandStack::new(options.max_stack_depth()),
            variables: VariableStore::new(body.locals(), body.parameters(), init_locals, options.is_32bit()),
            heap: Heap::new(),
            statics: BTreeMap::new(),
            environment,
            options,
            init_locals,
            returns_value: body.returns_value(),
            return_value: None,
            exception: None,
        }
    }

    pub fn stack(&self) -> &OperandStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut OperandStack {
        &mut self.stack
    }

    pub fn variables(&self) -> &VariableStore {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut VariableStore {
        &mut self.variables
    }

    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    pub fn heap_mut(&mut self) -> &mut Heap {
        &mut self.heap
    }

    pub fn environment(&self) -> &RC<dyn RuntimeEnvironment> {
        &self.environment
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn is_32bit(&self) -> bool {
        self.options.is_32bit()
    }

    /// Whether `ret` pops a value in the interpreted method.
    /// Whether locals and `localloc` memory start zeroed.
    pub fn init_locals(&self) -> bool {
        self.init_locals
    }

    pub fn returns_value(&self) -> bool {
        self.returns_value
    }

    pub fn return_value(&self) -> Option<&Value> {
        self.return_value.as_ref()
    }

    pub fn set_return_value(&mut self, value: Option<Value>) {
        self.return_value = value;
    }

    /// The object of the last `throw`.
    pub fn exception(&self) -> Option<&Value> {
        self.exception.as_ref()
    }

    pub fn set_exception(&mut self, exception: Option<Value>) {
        self.exception = exception;
    }

    /// Set an argument before interpretation starts.
    pub fn set_argument(&mut self, index: u16, value: Value) -> Result<(), DispatchFault> {
        self.variables.set(Variable::Argument(index), value)
    }

    /// Read a static field, asking the environment for its value on first
    /// access.
    pub fn load_static(&mut self, field: &FieldRef) -> Value {
        if let Some(value) = self.statics.get(field) {
            return value.clone();
        }
        let value = self.environment.initial_static_value(field, self.is_32bit());
        self.statics.insert(field.clone(), value.clone());
        value
    }

    pub fn store_static(&mut self, field: &FieldRef, value: Value) {
        let value = value.coerce(field.field_type(), self.is_32bit());
        self.statics.insert(field.clone(), value);
    }

    /// Forget the value of a static field, as when its address escapes.
    pub fn mark_static_unknown(&mut self, field: &FieldRef) {
        let value = Value::unknown_of(field.field_type(), self.is_32bit());
        self.statics.insert(field.clone(), value);
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("stack", &self.stack)
            .field("variables", &self.variables)
            .field("heap", &self.heap)
            .field("statics", &self.statics)
            .field("options", &self.options)
            .field("return_value", &self.return_value)
            .finish()
    }
}
