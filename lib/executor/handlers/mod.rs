//! The semantics of every CIL opcode, one handler per opcode family.

use crate::cil::Instruction;
use crate::executor::{DispatchFault, OpCodeHandler};
use crate::value::Value;
use crate::RC;

mod arithmetic;
mod arrays;
mod branches;
mod comparison;
mod constants;
mod conversion;
mod indirect;
mod object_model;
mod stack;
mod variables;

fn handler<H: OpCodeHandler + 'static>(handler: H) -> RC<dyn OpCodeHandler> {
    RC::new(handler)
}

/// The handlers a default `Dispatcher` registers. Together they cover
/// `OpCode::ALL`.
pub(crate) fn default_handlers() -> Vec<RC<dyn OpCodeHandler>> {
    vec![
        handler(stack::Nop),
        handler(stack::Dup),
        handler(stack::Pop),
        handler(constants::LdNull),
        handler(constants::LdcI4),
        handler(constants::LdcI8),
        handler(constants::LdcR),
        handler(constants::LdStr),
        handler(variables::LoadVariable),
        handler(variables::StoreVariable),
        handler(variables::LoadVariableAddress),
        handler(variables::ArgList),
        handler(arithmetic::BinaryNumeric),
        handler(arithmetic::Shift),
        handler(arithmetic::Neg),
        handler(arithmetic::Not),
        handler(comparison::Compare),
        handler(conversion::ConvertInteger),
        handler(conversion::ConvertFloat),
        handler(conversion::CheckFinite),
        handler(branches::Branch),
        handler(branches::Leave),
        handler(branches::BranchOnValue),
        handler(branches::BranchOnComparison),
        handler(branches::Switch),
        handler(branches::Return),
        handler(branches::Throw),
        handler(branches::EndFinally),
        handler(branches::EndFilter),
        handler(indirect::LoadIndirect),
        handler(indirect::StoreIndirect),
        handler(indirect::LocalAlloc),
        handler(indirect::CopyBlock),
        handler(indirect::InitBlock),
        handler(arrays::NewArray),
        handler(arrays::ArrayLength),
        handler(arrays::LoadElement),
        handler(arrays::StoreElement),
        handler(arrays::LoadElementAddress),
        handler(object_model::Call),
        handler(object_model::CallIndirect),
        handler(object_model::Jump),
        handler(object_model::NewObject),
        handler(object_model::LoadField),
        handler(object_model::StoreField),
        handler(object_model::LoadFieldAddress),
        handler(object_model::CastClass),
        handler(object_model::BoxValue),
        handler(object_model::UnboxValue),
        handler(object_model::ObjectCopy),
        handler(object_model::SizeOf),
        handler(object_model::LoadToken),
        handler(object_model::LoadFunction),
        handler(object_model::TypedReference),
    ]
}

pub(super) fn invalid_operand(instruction: &Instruction, expected: &str) -> DispatchFault {
    DispatchFault::InvalidOperand(format!("{} expects a {} operand", instruction, expected))
}

/// The value of an integer index or size, if it is fully known.
///
/// `int32` values are sign-extended. Other shapes are an invalid program.
pub(super) fn known_index(value: &Value) -> Result<Option<i64>, DispatchFault> {
    match value {
        Value::Int32(value) => Ok(value.known_value().map(|value| i64::from(value as i32))),
        Value::NativeInt(value) => Ok(value.known_value().map(|value| value as i64)),
        value => Err(DispatchFault::InvalidProgram(format!(
            "{} is not an index",
            value.kind()
        ))),
    }
}
