//! The ECMA-335 opcode table.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::architecture::FlowControl;

/// The kind of inline operand an opcode carries.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum OperandType {
    None,
    ShortBrTarget,
    BrTarget,
    ShortI,
    I,
    I8,
    ShortR,
    R,
    ShortVariable,
    Variable,
    Method,
    Field,
    Type,
    Sig,
    String,
    Tok,
    Switch,
}

impl OperandType {
    /// The encoded size of the operand in bytes. A switch's size depends on
    /// its target count and is reported here without the targets.
    pub fn size(&self) -> u32 {
        match self {
            OperandType::None => 0,
            OperandType::ShortBrTarget | OperandType::ShortI | OperandType::ShortVariable => 1,
            OperandType::Variable => 2,
            OperandType::BrTarget
            | OperandType::I
            | OperandType::ShortR
            | OperandType::Method
            | OperandType::Field
            | OperandType::Type
            | OperandType::Sig
            | OperandType::String
            | OperandType::Tok
            | OperandType::Switch => 4,
            OperandType::I8 | OperandType::R => 8,
        }
    }
}

/// How many values an opcode pops.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum StackPop {
    Pop0,
    Pop1,
    Pop2,
    Pop3,
    /// Depends on the signature of the call, or on the method for `ret`.
    VarPop,
    /// Empties the stack.
    PopAll,
}

/// How many values an opcode pushes.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum StackPush {
    Push0,
    Push1,
    Push2,
    /// Depends on the return type of the call.
    VarPush,
}

impl StackPop {
    pub fn fixed_count(&self) -> Option<usize> {
        match self {
            StackPop::Pop0 => Some(0),
            StackPop::Pop1 => Some(1),
            StackPop::Pop2 => Some(2),
            StackPop::Pop3 => Some(3),
            StackPop::VarPop | StackPop::PopAll => None,
        }
    }
}

impl StackPush {
    pub fn fixed_count(&self) -> Option<usize> {
        match self {
            StackPush::Push0 => Some(0),
            StackPush::Push1 => Some(1),
            StackPush::Push2 => Some(2),
            StackPush::VarPush => None,
        }
    }
}

macro_rules! opcodes {
    ($($variant:ident = $code:expr, $mnemonic:expr, $operand:ident, $flow:ident, $pop:ident, $push:ident;)*) => {
        /// A CIL opcode.
        #[allow(non_camel_case_types)]
        #[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
        pub enum OpCode {
            $($variant),*
        }

        impl OpCode {
            /// Every opcode, in encoding order.
            pub const ALL: &'static [OpCode] = &[$(OpCode::$variant),*];

            /// The encoded value. Two-byte opcodes carry their `0xFE` prefix
            /// in the high byte.
            pub fn code(&self) -> u16 {
                match self {
                    $(OpCode::$variant => $code),*
                }
            }

            pub fn mnemonic(&self) -> &'static str {
                match self {
                    $(OpCode::$variant => $mnemonic),*
                }
            }

            pub fn operand_type(&self) -> OperandType {
                match self {
                    $(OpCode::$variant => OperandType::$operand),*
                }
            }

            pub fn flow_control(&self) -> FlowControl {
                match self {
                    $(OpCode::$variant => FlowControl::$flow),*
                }
            }

            pub fn stack_pop(&self) -> StackPop {
                match self {
                    $(OpCode::$variant => StackPop::$pop),*
                }
            }

            pub fn stack_push(&self) -> StackPush {
                match self {
                    $(OpCode::$variant => StackPush::$push),*
                }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", None, Next, Pop0, Push0;
    Break = 0x01, "break", None, Break, Pop0, Push0;
    Ldarg_0 = 0x02, "ldarg.0", None, Next, Pop0, Push1;
    Ldarg_1 = 0x03, "ldarg.1", None, Next, Pop0, Push1;
    Ldarg_2 = 0x04, "ldarg.2", None, Next, Pop0, Push1;
    Ldarg_3 = 0x05, "ldarg.3", None, Next, Pop0, Push1;
    Ldloc_0 = 0x06, "ldloc.0", None, Next, Pop0, Push1;
    Ldloc_1 = 0x07, "ldloc.1", None, Next, Pop0, Push1;
    Ldloc_2 = 0x08, "ldloc.2", None, Next, Pop0, Push1;
    Ldloc_3 = 0x09, "ldloc.3", None, Next, Pop0, Push1;
    Stloc_0 = 0x0A, "stloc.0", None, Next, Pop1, Push0;
    Stloc_1 = 0x0B, "stloc.1", None, Next, Pop1, Push0;
    Stloc_2 = 0x0C, "stloc.2", None, Next, Pop1, Push0;
    Stloc_3 = 0x0D, "stloc.3", None, Next, Pop1, Push0;
    Ldarg_S = 0x0E, "ldarg.s", ShortVariable, Next, Pop0, Push1;
    Ldarga_S = 0x0F, "ldarga.s", ShortVariable, Next, Pop0, Push1;
    Starg_S = 0x10, "starg.s", ShortVariable, Next, Pop1, Push0;
    Ldloc_S = 0x11, "ldloc.s", ShortVariable, Next, Pop0, Push1;
    Ldloca_S = 0x12, "ldloca.s", ShortVariable, Next, Pop0, Push1;
    Stloc_S = 0x13, "stloc.s", ShortVariable, Next, Pop1, Push0;
    Ldnull = 0x14, "ldnull", None, Next, Pop0, Push1;
    Ldc_I4_M1 = 0x15, "ldc.i4.m1", None, Next, Pop0, Push1;
    Ldc_I4_0 = 0x16, "ldc.i4.0", None, Next, Pop0, Push1;
    Ldc_I4_1 = 0x17, "ldc.i4.1", None, Next, Pop0, Push1;
    Ldc_I4_2 = 0x18, "ldc.i4.2", None, Next, Pop0, Push1;
    Ldc_I4_3 = 0x19, "ldc.i4.3", None, Next, Pop0, Push1;
    Ldc_I4_4 = 0x1A, "ldc.i4.4", None, Next, Pop0, Push1;
    Ldc_I4_5 = 0x1B, "ldc.i4.5", None, Next, Pop0, Push1;
    Ldc_I4_6 = 0x1C, "ldc.i4.6", None, Next, Pop0, Push1;
    Ldc_I4_7 = 0x1D, "ldc.i4.7", None, Next, Pop0, Push1;
    Ldc_I4_8 = 0x1E, "ldc.i4.8", None, Next, Pop0, Push1;
    Ldc_I4_S = 0x1F, "ldc.i4.s", ShortI, Next, Pop0, Push1;
    Ldc_I4 = 0x20, "ldc.i4", I, Next, Pop0, Push1;
    Ldc_I8 = 0x21, "ldc.i8", I8, Next, Pop0, Push1;
    Ldc_R4 = 0x22, "ldc.r4", ShortR, Next, Pop0, Push1;
    Ldc_R8 = 0x23, "ldc.r8", R, Next, Pop0, Push1;
    Dup = 0x25, "dup", None, Next, Pop1, Push2;
    Pop = 0x26, "pop", None, Next, Pop1, Push0;
    Jmp = 0x27, "jmp", Method, Call, Pop0, Push0;
    Call = 0x28, "call", Method, Call, VarPop, VarPush;
    Calli = 0x29, "calli", Sig, Call, VarPop, VarPush;
    Ret = 0x2A, "ret", None, Return, VarPop, Push0;
    Br_S = 0x2B, "br.s", ShortBrTarget, Branch, Pop0, Push0;
    Brfalse_S = 0x2C, "brfalse.s", ShortBrTarget, ConditionalBranch, Pop1, Push0;
    Brtrue_S = 0x2D, "brtrue.s", ShortBrTarget, ConditionalBranch, Pop1, Push0;
    Beq_S = 0x2E, "beq.s", ShortBrTarget, ConditionalBranch, Pop2, Push0;
    Bge_S = 0x2F, "bge.s", ShortBrTarget, ConditionalBranch, Pop2, Push0;
    Bgt_S = 0x30, "bgt.s", ShortBrTarget, ConditionalBranch, Pop2, Push0;
    Ble_S = 0x31, "ble.s", ShortBrTarget, ConditionalBranch, Pop2, Push0;
    Blt_S = 0x32, "blt.s", ShortBrTarget, ConditionalBranch, Pop2, Push0;
    Bne_Un_S = 0x33, "bne.un.s", ShortBrTarget, ConditionalBranch, Pop2, Push0;
    Bge_Un_S = 0x34, "bge.un.s", ShortBrTarget, ConditionalBranch, Pop2, Push0;
    Bgt_Un_S = 0x35, "bgt.un.s", ShortBrTarget, ConditionalBranch, Pop2, Push0;
    Ble_Un_S = 0x36, "ble.un.s", ShortBrTarget, ConditionalBranch, Pop2, Push0;
    Blt_Un_S = 0x37, "blt.un.s", ShortBrTarget, ConditionalBranch, Pop2, Push0;
    Br = 0x38, "br", BrTarget, Branch, Pop0, Push0;
    Brfalse = 0x39, "brfalse", BrTarget, ConditionalBranch, Pop1, Push0;
    Brtrue = 0x3A, "brtrue", BrTarget, ConditionalBranch, Pop1, Push0;
    Beq = 0x3B, "beq", BrTarget, ConditionalBranch, Pop2, Push0;
    Bge = 0x3C, "bge", BrTarget, ConditionalBranch, Pop2, Push0;
    Bgt = 0x3D, "bgt", BrTarget, ConditionalBranch, Pop2, Push0;
    Ble = 0x3E, "ble", BrTarget, ConditionalBranch, Pop2, Push0;
    Blt = 0x3F, "blt", BrTarget, ConditionalBranch, Pop2, Push0;
    Bne_Un = 0x40, "bne.un", BrTarget, ConditionalBranch, Pop2, Push0;
    Bge_Un = 0x41, "bge.un", BrTarget, ConditionalBranch, Pop2, Push0;
    Bgt_Un = 0x42, "bgt.un", BrTarget, ConditionalBranch, Pop2, Push0;
    Ble_Un = 0x43, "ble.un", BrTarget, ConditionalBranch, Pop2, Push0;
    Blt_Un = 0x44, "blt.un", BrTarget, ConditionalBranch, Pop2, Push0;
    Switch = 0x45, "switch", Switch, ConditionalBranch, Pop1, Push0;
    Ldind_I1 = 0x46, "ldind.i1", None, Next, Pop1, Push1;
    Ldind_U1 = 0x47, "ldind.u1", None, Next, Pop1, Push1;
    Ldind_I2 = 0x48, "ldind.i2", None, Next, Pop1, Push1;
    Ldind_U2 = 0x49, "ldind.u2", None, Next, Pop1, Push1;
    Ldind_I4 = 0x4A, "ldind.i4", None, Next, Pop1, Push1;
    Ldind_U4 = 0x4B, "ldind.u4", None, Next, Pop1, Push1;
    Ldind_I8 = 0x4C, "ldind.i8", None, Next, Pop1, Push1;
    Ldind_I = 0x4D, "ldind.i", None, Next, Pop1, Push1;
    Ldind_R4 = 0x4E, "ldind.r4", None, Next, Pop1, Push1;
    Ldind_R8 = 0x4F, "ldind.r8", None, Next, Pop1, Push1;
    Ldind_Ref = 0x50, "ldind.ref", None, Next, Pop1, Push1;
    Stind_Ref = 0x51, "stind.ref", None, Next, Pop2, Push0;
    Stind_I1 = 0x52, "stind.i1", None, Next, Pop2, Push0;
    Stind_I2 = 0x53, "stind.i2", None, Next, Pop2, Push0;
    Stind_I4 = 0x54, "stind.i4", None, Next, Pop2, Push0;
    Stind_I8 = 0x55, "stind.i8", None, Next, Pop2, Push0;
    Stind_R4 = 0x56, "stind.r4", None, Next, Pop2, Push0;
    Stind_R8 = 0x57, "stind.r8", None, Next, Pop2, Push0;
    Add = 0x58, "add", None, Next, Pop2, Push1;
    Sub = 0x59, "sub", None, Next, Pop2, Push1;
    Mul = 0x5A, "mul", None, Next, Pop2, Push1;
    Div = 0x5B, "div", None, Next, Pop2, Push1;
    Div_Un = 0x5C, "div.un", None, Next, Pop2, Push1;
    Rem = 0x5D, "rem", None, Next, Pop2, Push1;
    Rem_Un = 0x5E, "rem.un", None, Next, Pop2, Push1;
    And = 0x5F, "and", None, Next, Pop2, Push1;
    Or = 0x60, "or", None, Next, Pop2, Push1;
    Xor = 0x61, "xor", None, Next, Pop2, Push1;
    Shl = 0x62, "shl", None, Next, Pop2, Push1;
    Shr = 0x63, "shr", None, Next, Pop2, Push1;
    Shr_Un = 0x64, "shr.un", None, Next, Pop2, Push1;
    Neg = 0x65, "neg", None, Next, Pop1, Push1;
    Not = 0x66, "not", None, Next, Pop1, Push1;
    Conv_I1 = 0x67, "conv.i1", None, Next, Pop1, Push1;
    Conv_I2 = 0x68, "conv.i2", None, Next, Pop1, Push1;
    Conv_I4 = 0x69, "conv.i4", None, Next, Pop1, Push1;
    Conv_I8 = 0x6A, "conv.i8", None, Next, Pop1, Push1;
    Conv_R4 = 0x6B, "conv.r4", None, Next, Pop1, Push1;
    Conv_R8 = 0x6C, "conv.r8", None, Next, Pop1, Push1;
    Conv_U4 = 0x6D, "conv.u4", None, Next, Pop1, Push1;
    Conv_U8 = 0x6E, "conv.u8", None, Next, Pop1, Push1;
    Callvirt = 0x6F, "callvirt", Method, Call, VarPop, VarPush;
    Cpobj = 0x70, "cpobj", Type, Next, Pop2, Push0;
    Ldobj = 0x71, "ldobj", Type, Next, Pop1, Push1;
    Ldstr = 0x72, "ldstr", String, Next, Pop0, Push1;
    Newobj = 0x73, "newobj", Method, Call, VarPop, Push1;
    Castclass = 0x74, "castclass", Type, Next, Pop1, Push1;
    Isinst = 0x75, "isinst", Type, Next, Pop1, Push1;
    Conv_R_Un = 0x76, "conv.r.un", None, Next, Pop1, Push1;
    Unbox = 0x79, "unbox", Type, Next, Pop1, Push1;
    Throw = 0x7A, "throw", None, Throw, Pop1, Push0;
    Ldfld = 0x7B, "ldfld", Field, Next, Pop1, Push1;
    Ldflda = 0x7C, "ldflda", Field, Next, Pop1, Push1;
    Stfld = 0x7D, "stfld", Field, Next, Pop2, Push0;
    Ldsfld = 0x7E, "ldsfld", Field, Next, Pop0, Push1;
    Ldsflda = 0x7F, "ldsflda", Field, Next, Pop0, Push1;
    Stsfld = 0x80, "stsfld", Field, Next, Pop1, Push0;
    Stobj = 0x81, "stobj", Type, Next, Pop2, Push0;
    Conv_Ovf_I1_Un = 0x82, "conv.ovf.i1.un", None, Next, Pop1, Push1;
    Conv_Ovf_I2_Un = 0x83, "conv.ovf.i2.un", None, Next, Pop1, Push1;
    Conv_Ovf_I4_Un = 0x84, "conv.ovf.i4.un", None, Next, Pop1, Push1;
    Conv_Ovf_I8_Un = 0x85, "conv.ovf.i8.un", None, Next, Pop1, Push1;
    Conv_Ovf_U1_Un = 0x86, "conv.ovf.u1.un", None, Next, Pop1, Push1;
    Conv_Ovf_U2_Un = 0x87, "conv.ovf.u2.un", None, Next, Pop1, Push1;
    Conv_Ovf_U4_Un = 0x88, "conv.ovf.u4.un", None, Next, Pop1, Push1;
    Conv_Ovf_U8_Un = 0x89, "conv.ovf.u8.un", None, Next, Pop1, Push1;
    Conv_Ovf_I_Un = 0x8A, "conv.ovf.i.un", None, Next, Pop1, Push1;
    Conv_Ovf_U_Un = 0x8B, "conv.ovf.u.un", None, Next, Pop1, Push1;
    Box = 0x8C, "box", Type, Next, Pop1, Push1;
    Newarr = 0x8D, "newarr", Type, Next, Pop1, Push1;
    Ldlen = 0x8E, "ldlen", None, Next, Pop1, Push1;
    Ldelema = 0x8F, "ldelema", Type, Next, Pop2, Push1;
    Ldelem_I1 = 0x90, "ldelem.i1", None, Next, Pop2, Push1;
    Ldelem_U1 = 0x91, "ldelem.u1", None, Next, Pop2, Push1;
    Ldelem_I2 = 0x92, "ldelem.i2", None, Next, Pop2, Push1;
    Ldelem_U2 = 0x93, "ldelem.u2", None, Next, Pop2, Push1;
    Ldelem_I4 = 0x94, "ldelem.i4", None, Next, Pop2, Push1;
    Ldelem_U4 = 0x95, "ldelem.u4", None, Next, Pop2, Push1;
    Ldelem_I8 = 0x96, "ldelem.i8", None, Next, Pop2, Push1;
    Ldelem_I = 0x97, "ldelem.i", None, Next, Pop2, Push1;
    Ldelem_R4 = 0x98, "ldelem.r4", None, Next, Pop2, Push1;
    Ldelem_R8 = 0x99, "ldelem.r8", None, Next, Pop2, Push1;
    Ldelem_Ref = 0x9A, "ldelem.ref", None, Next, Pop2, Push1;
    Stelem_I = 0x9B, "stelem.i", None, Next, Pop3, Push0;
    Stelem_I1 = 0x9C, "stelem.i1", None, Next, Pop3, Push0;
    Stelem_I2 = 0x9D, "stelem.i2", None, Next, Pop3, Push0;
    Stelem_I4 = 0x9E, "stelem.i4", None, Next, Pop3, Push0;
    Stelem_I8 = 0x9F, "stelem.i8", None, Next, Pop3, Push0;
    Stelem_R4 = 0xA0, "stelem.r4", None, Next, Pop3, Push0;
    Stelem_R8 = 0xA1, "stelem.r8", None, Next, Pop3, Push0;
    Stelem_Ref = 0xA2, "stelem.ref", None, Next, Pop3, Push0;
    Ldelem = 0xA3, "ldelem", Type, Next, Pop2, Push1;
    Stelem = 0xA4, "stelem", Type, Next, Pop3, Push0;
    Unbox_Any = 0xA5, "unbox.any", Type, Next, Pop1, Push1;
    Conv_Ovf_I1 = 0xB3, "conv.ovf.i1", None, Next, Pop1, Push1;
    Conv_Ovf_U1 = 0xB4, "conv.ovf.u1", None, Next, Pop1, Push1;
    Conv_Ovf_I2 = 0xB5, "conv.ovf.i2", None, Next, Pop1, Push1;
    Conv_Ovf_U2 = 0xB6, "conv.ovf.u2", None, Next, Pop1, Push1;
    Conv_Ovf_I4 = 0xB7, "conv.ovf.i4", None, Next, Pop1, Push1;
    Conv_Ovf_U4 = 0xB8, "conv.ovf.u4", None, Next, Pop1, Push1;
    Conv_Ovf_I8 = 0xB9, "conv.ovf.i8", None, Next, Pop1, Push1;
    Conv_Ovf_U8 = 0xBA, "conv.ovf.u8", None, Next, Pop1, Push1;
    Refanyval = 0xC2, "refanyval", Type, Next, Pop1, Push1;
    Ckfinite = 0xC3, "ckfinite", None, Next, Pop1, Push1;
    Mkrefany = 0xC6, "mkrefany", Type, Next, Pop1, Push1;
    Ldtoken = 0xD0, "ldtoken", Tok, Next, Pop0, Push1;
    Conv_U2 = 0xD1, "conv.u2", None, Next, Pop1, Push1;
    Conv_U1 = 0xD2, "conv.u1", None, Next, Pop1, Push1;
    Conv_I = 0xD3, "conv.i", None, Next, Pop1, Push1;
    Conv_Ovf_I = 0xD4, "conv.ovf.i", None, Next, Pop1, Push1;
    Conv_Ovf_U = 0xD5, "conv.ovf.u", None, Next, Pop1, Push1;
    Add_Ovf = 0xD6, "add.ovf", None, Next, Pop2, Push1;
    Add_Ovf_Un = 0xD7, "add.ovf.un", None, Next, Pop2, Push1;
    Mul_Ovf = 0xD8, "mul.ovf", None, Next, Pop2, Push1;
    Mul_Ovf_Un = 0xD9, "mul.ovf.un", None, Next, Pop2, Push1;
    Sub_Ovf = 0xDA, "sub.ovf", None, Next, Pop2, Push1;
    Sub_Ovf_Un = 0xDB, "sub.ovf.un", None, Next, Pop2, Push1;
    Endfinally = 0xDC, "endfinally", None, Return, PopAll, Push0;
    Leave = 0xDD, "leave", BrTarget, Branch, PopAll, Push0;
    Leave_S = 0xDE, "leave.s", ShortBrTarget, Branch, PopAll, Push0;
    Stind_I = 0xDF, "stind.i", None, Next, Pop2, Push0;
    Conv_U = 0xE0, "conv.u", None, Next, Pop1, Push1;
    Arglist = 0xFE00, "arglist", None, Next, Pop0, Push1;
    Ceq = 0xFE01, "ceq", None, Next, Pop2, Push1;
    Cgt = 0xFE02, "cgt", None, Next, Pop2, Push1;
    Cgt_Un = 0xFE03, "cgt.un", None, Next, Pop2, Push1;
    Clt = 0xFE04, "clt", None, Next, Pop2, Push1;
    Clt_Un = 0xFE05, "clt.un", None, Next, Pop2, Push1;
    Ldftn = 0xFE06, "ldftn", Method, Next, Pop0, Push1;
    Ldvirtftn = 0xFE07, "ldvirtftn", Method, Next, Pop1, Push1;
    Ldarg = 0xFE09, "ldarg", Variable, Next, Pop0, Push1;
    Ldarga = 0xFE0A, "ldarga", Variable, Next, Pop0, Push1;
    Starg = 0xFE0B, "starg", Variable, Next, Pop1, Push0;
    Ldloc = 0xFE0C, "ldloc", Variable, Next, Pop0, Push1;
    Ldloca = 0xFE0D, "ldloca", Variable, Next, Pop0, Push1;
    Stloc = 0xFE0E, "stloc", Variable, Next, Pop1, Push0;
    Localloc = 0xFE0F, "localloc", None, Next, Pop1, Push1;
    Endfilter = 0xFE11, "endfilter", None, Return, Pop1, Push0;
    Unaligned = 0xFE12, "unaligned.", ShortI, Meta, Pop0, Push0;
    Volatile = 0xFE13, "volatile.", None, Meta, Pop0, Push0;
    Tailcall = 0xFE14, "tail.", None, Meta, Pop0, Push0;
    Initobj = 0xFE15, "initobj", Type, Next, Pop1, Push0;
    Constrained = 0xFE16, "constrained.", Type, Meta, Pop0, Push0;
    Cpblk = 0xFE17, "cpblk", None, Next, Pop3, Push0;
    Initblk = 0xFE18, "initblk", None, Next, Pop3, Push0;
    No = 0xFE19, "no.", ShortI, Meta, Pop0, Push0;
    Rethrow = 0xFE1A, "rethrow", None, Throw, Pop0, Push0;
    Sizeof = 0xFE1C, "sizeof", Type, Next, Pop0, Push1;
    Refanytype = 0xFE1D, "refanytype", None, Next, Pop1, Push1;
    Readonly = 0xFE1E, "readonly.", None, Meta, Pop0, Push0;
}

impl OpCode {
    /// Look up an opcode by its encoded value.
    pub fn from_code(code: u16) -> Option<OpCode> {
        OpCode::ALL.iter().copied().find(|opcode| opcode.code() == code)
    }

    /// The encoded size of the opcode itself, without its operand.
    pub fn size(&self) -> u32 {
        if self.code() > 0xFF {
            2
        } else {
            1
        }
    }

    /// The long form of a macro opcode, if this is one. Short variable,
    /// constant and branch forms all have a long form.
    pub fn long_form(&self) -> Option<OpCode> {
        Some(match self {
            OpCode::Ldarg_0 | OpCode::Ldarg_1 | OpCode::Ldarg_2 | OpCode::Ldarg_3 | OpCode::Ldarg_S => {
                OpCode::Ldarg
            }
            OpCode::Ldarga_S => OpCode::Ldarga,
            OpCode::Starg_S => OpCode::Starg,
            OpCode::Ldloc_0 | OpCode::Ldloc_1 | OpCode::Ldloc_2 | OpCode::Ldloc_3 | OpCode::Ldloc_S => {
                OpCode::Ldloc
            }
            OpCode::Ldloca_S => OpCode::Ldloca,
            OpCode::Stloc_0 | OpCode::Stloc_1 | OpCode::Stloc_2 | OpCode::Stloc_3 | OpCode::Stloc_S => {
                OpCode::Stloc
            }
            OpCode::Ldc_I4_M1
            | OpCode::Ldc_I4_0
            | OpCode::Ldc_I4_1
            | OpCode::Ldc_I4_2
            | OpCode::Ldc_I4_3
            | OpCode::Ldc_I4_4
            | OpCode::Ldc_I4_5
            | OpCode::Ldc_I4_6
            | OpCode::Ldc_I4_7
            | OpCode::Ldc_I4_8
            | OpCode::Ldc_I4_S => OpCode::Ldc_I4,
            OpCode::Br_S => OpCode::Br,
            OpCode::Brfalse_S => OpCode::Brfalse,
            OpCode::Brtrue_S => OpCode::Brtrue,
            OpCode::Beq_S => OpCode::Beq,
            OpCode::Bge_S => OpCode::Bge,
            OpCode::Bgt_S => OpCode::Bgt,
            OpCode::Ble_S => OpCode::Ble,
            OpCode::Blt_S => OpCode::Blt,
            OpCode::Bne_Un_S => OpCode::Bne_Un,
            OpCode::Bge_Un_S => OpCode::Bge_Un,
            OpCode::Bgt_Un_S => OpCode::Bgt_Un,
            OpCode::Ble_Un_S => OpCode::Ble_Un,
            OpCode::Blt_Un_S => OpCode::Blt_Un,
            OpCode::Leave_S => OpCode::Leave,
            _ => return None,
        })
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.mnemonic())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustc_hash::FxHashSet;

    #[test]
    fn codes_are_unique_and_ordered() {
        let codes = OpCode::ALL.iter().map(|opcode| opcode.code()).collect::<FxHashSet<u16>>();

        assert_eq!(codes.len(), OpCode::ALL.len());
        assert!(OpCode::ALL.windows(2).all(|pair| pair[0].code() < pair[1].code()));
        assert_eq!(OpCode::ALL.len(), 219);
    }

    #[test]
    fn lookup_by_code() {
        assert_eq!(OpCode::from_code(0x58), Some(OpCode::Add));
        assert_eq!(OpCode::from_code(0xFE01), Some(OpCode::Ceq));
        assert_eq!(OpCode::from_code(0x24), None);
        assert_eq!(OpCode::Ceq.size(), 2);
        assert_eq!(OpCode::Add.size(), 1);
    }

    #[test]
    fn long_forms_keep_their_shape() {
        for opcode in OpCode::ALL {
            if let Some(long) = opcode.long_form() {
                assert_eq!(opcode.flow_control(), long.flow_control(), "{}", opcode);
                assert_eq!(opcode.stack_pop(), long.stack_pop(), "{}", opcode);
                assert_eq!(opcode.stack_push(), long.stack_push(), "{}", opcode);
            }
        }
        assert_eq!(OpCode::Brtrue_S.long_form(), Some(OpCode::Brtrue));
        assert_eq!(OpCode::Add.long_form(), None);
    }
}
