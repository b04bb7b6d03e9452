//! The ECMA-335 CIL opcode table.
//!
//! [`OpCode`] enumerates every base and `0xFE`-prefixed instruction together with its
//! encoding, mnemonic, operand layout, control-flow behaviour and stack transition. The
//! table is generated from a single declaration list so the per-opcode properties can never
//! drift apart.
//!
//! Short-form branches (one-byte displacement) know their long-form counterparts through
//! [`OpCode::long_form`], which the branch legalization pass in
//! [`crate::hotfix::rewriter`] relies on.

use serde::{Deserialize, Serialize};
use strum::EnumIter;

/// Layout of the inline operand that follows an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandKind {
    /// No operand
    InlineNone,
    /// 8-bit signed integer
    ShortInlineI,
    /// 32-bit signed integer
    InlineI,
    /// 64-bit signed integer
    InlineI8,
    /// 32-bit float
    ShortInlineR,
    /// 64-bit float
    InlineR,
    /// 8-bit branch displacement
    ShortInlineBrTarget,
    /// 32-bit branch displacement
    InlineBrTarget,
    /// Jump table: count followed by 32-bit displacements
    InlineSwitch,
    /// 8-bit argument or local index
    ShortInlineVar,
    /// 16-bit argument or local index
    InlineVar,
    /// Type, field or method token (`ldtoken`)
    InlineTok,
    /// Type token
    InlineType,
    /// Field token
    InlineField,
    /// Method token
    InlineMethod,
    /// Stand-alone signature token (`calli`)
    InlineSig,
    /// User string token
    InlineString,
}

impl OperandKind {
    /// Encoded operand size in bytes; `None` for the variable-size switch table.
    #[must_use]
    pub const fn size(&self) -> Option<u32> {
        match self {
            OperandKind::InlineNone => Some(0),
            OperandKind::ShortInlineI
            | OperandKind::ShortInlineBrTarget
            | OperandKind::ShortInlineVar => Some(1),
            OperandKind::InlineVar => Some(2),
            OperandKind::InlineI
            | OperandKind::ShortInlineR
            | OperandKind::InlineBrTarget
            | OperandKind::InlineTok
            | OperandKind::InlineType
            | OperandKind::InlineField
            | OperandKind::InlineMethod
            | OperandKind::InlineSig
            | OperandKind::InlineString => Some(4),
            OperandKind::InlineI8 | OperandKind::InlineR => Some(8),
            OperandKind::InlineSwitch => None,
        }
    }
}

/// How an instruction transfers control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Falls through to the next instruction
    Sequential,
    /// Branches or falls through
    ConditionalBranch,
    /// Always branches
    UnconditionalBranch,
    /// Calls a method and continues
    Call,
    /// Leaves the method
    Return,
    /// Jump table
    Switch,
    /// Raises an exception
    Throw,
    /// Ends a finally/fault/filter block
    EndFinally,
    /// Leaves a protected region
    Leave,
}

/// Number of evaluation stack slots an instruction pops or pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackCount {
    /// A fixed number of slots
    Fixed(u8),
    /// Depends on the operand signature (calls, `ret`)
    Variable,
}

macro_rules! stack_count {
    (var) => {
        StackCount::Variable
    };
    ($n:literal) => {
        StackCount::Fixed($n)
    };
}

macro_rules! opcodes {
    ($(
        $variant:ident = $code:literal, $name:literal, $kind:ident, $flow:ident, $pop:tt, $push:tt;
    )*) => {
        /// A CIL opcode.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumIter)]
        pub enum OpCode {
            $(
                #[doc = $name]
                $variant,
            )*
        }

        impl OpCode {
            /// Encoded value; two-byte opcodes carry the `0xFE` prefix in the high byte.
            #[must_use]
            pub const fn value(self) -> u16 {
                match self { $( OpCode::$variant => $code, )* }
            }

            /// IL assembler mnemonic.
            #[must_use]
            pub const fn mnemonic(self) -> &'static str {
                match self { $( OpCode::$variant => $name, )* }
            }

            /// Layout of the inline operand.
            #[must_use]
            pub const fn operand_kind(self) -> OperandKind {
                match self { $( OpCode::$variant => OperandKind::$kind, )* }
            }

            /// Control-flow behaviour.
            #[must_use]
            pub const fn flow(self) -> FlowType {
                match self { $( OpCode::$variant => FlowType::$flow, )* }
            }

            /// Slots popped from the evaluation stack.
            #[must_use]
            pub const fn pops(self) -> StackCount {
                match self { $( OpCode::$variant => stack_count!($pop), )* }
            }

            /// Slots pushed onto the evaluation stack.
            #[must_use]
            pub const fn pushes(self) -> StackCount {
                match self { $( OpCode::$variant => stack_count!($push), )* }
            }
        }
    };
}

opcodes! {
    Nop = 0x00, "nop", InlineNone, Sequential, 0, 0;
    Break = 0x01, "break", InlineNone, Sequential, 0, 0;
    Ldarg0 = 0x02, "ldarg.0", InlineNone, Sequential, 0, 1;
    Ldarg1 = 0x03, "ldarg.1", InlineNone, Sequential, 0, 1;
    Ldarg2 = 0x04, "ldarg.2", InlineNone, Sequential, 0, 1;
    Ldarg3 = 0x05, "ldarg.3", InlineNone, Sequential, 0, 1;
    Ldloc0 = 0x06, "ldloc.0", InlineNone, Sequential, 0, 1;
    Ldloc1 = 0x07, "ldloc.1", InlineNone, Sequential, 0, 1;
    Ldloc2 = 0x08, "ldloc.2", InlineNone, Sequential, 0, 1;
    Ldloc3 = 0x09, "ldloc.3", InlineNone, Sequential, 0, 1;
    Stloc0 = 0x0A, "stloc.0", InlineNone, Sequential, 1, 0;
    Stloc1 = 0x0B, "stloc.1", InlineNone, Sequential, 1, 0;
    Stloc2 = 0x0C, "stloc.2", InlineNone, Sequential, 1, 0;
    Stloc3 = 0x0D, "stloc.3", InlineNone, Sequential, 1, 0;
    LdargS = 0x0E, "ldarg.s", ShortInlineVar, Sequential, 0, 1;
    LdargaS = 0x0F, "ldarga.s", ShortInlineVar, Sequential, 0, 1;
    StargS = 0x10, "starg.s", ShortInlineVar, Sequential, 1, 0;
    LdlocS = 0x11, "ldloc.s", ShortInlineVar, Sequential, 0, 1;
    LdlocaS = 0x12, "ldloca.s", ShortInlineVar, Sequential, 0, 1;
    StlocS = 0x13, "stloc.s", ShortInlineVar, Sequential, 1, 0;
    Ldnull = 0x14, "ldnull", InlineNone, Sequential, 0, 1;
    LdcI4M1 = 0x15, "ldc.i4.m1", InlineNone, Sequential, 0, 1;
    LdcI40 = 0x16, "ldc.i4.0", InlineNone, Sequential, 0, 1;
    LdcI41 = 0x17, "ldc.i4.1", InlineNone, Sequential, 0, 1;
    LdcI42 = 0x18, "ldc.i4.2", InlineNone, Sequential, 0, 1;
    LdcI43 = 0x19, "ldc.i4.3", InlineNone, Sequential, 0, 1;
    LdcI44 = 0x1A, "ldc.i4.4", InlineNone, Sequential, 0, 1;
    LdcI45 = 0x1B, "ldc.i4.5", InlineNone, Sequential, 0, 1;
    LdcI46 = 0x1C, "ldc.i4.6", InlineNone, Sequential, 0, 1;
    LdcI47 = 0x1D, "ldc.i4.7", InlineNone, Sequential, 0, 1;
    LdcI48 = 0x1E, "ldc.i4.8", InlineNone, Sequential, 0, 1;
    LdcI4S = 0x1F, "ldc.i4.s", ShortInlineI, Sequential, 0, 1;
    LdcI4 = 0x20, "ldc.i4", InlineI, Sequential, 0, 1;
    LdcI8 = 0x21, "ldc.i8", InlineI8, Sequential, 0, 1;
    LdcR4 = 0x22, "ldc.r4", ShortInlineR, Sequential, 0, 1;
    LdcR8 = 0x23, "ldc.r8", InlineR, Sequential, 0, 1;
    Dup = 0x25, "dup", InlineNone, Sequential, 1, 2;
    Pop = 0x26, "pop", InlineNone, Sequential, 1, 0;
    Jmp = 0x27, "jmp", InlineMethod, Call, 0, 0;
    Call = 0x28, "call", InlineMethod, Call, var, var;
    Calli = 0x29, "calli", InlineSig, Call, var, var;
    Ret = 0x2A, "ret", InlineNone, Return, var, 0;
    BrS = 0x2B, "br.s", ShortInlineBrTarget, UnconditionalBranch, 0, 0;
    BrfalseS = 0x2C, "brfalse.s", ShortInlineBrTarget, ConditionalBranch, 1, 0;
    BrtrueS = 0x2D, "brtrue.s", ShortInlineBrTarget, ConditionalBranch, 1, 0;
    BeqS = 0x2E, "beq.s", ShortInlineBrTarget, ConditionalBranch, 2, 0;
    BgeS = 0x2F, "bge.s", ShortInlineBrTarget, ConditionalBranch, 2, 0;
    BgtS = 0x30, "bgt.s", ShortInlineBrTarget, ConditionalBranch, 2, 0;
    BleS = 0x31, "ble.s", ShortInlineBrTarget, ConditionalBranch, 2, 0;
    BltS = 0x32, "blt.s", ShortInlineBrTarget, ConditionalBranch, 2, 0;
    BneUnS = 0x33, "bne.un.s", ShortInlineBrTarget, ConditionalBranch, 2, 0;
    BgeUnS = 0x34, "bge.un.s", ShortInlineBrTarget, ConditionalBranch, 2, 0;
    BgtUnS = 0x35, "bgt.un.s", ShortInlineBrTarget, ConditionalBranch, 2, 0;
    BleUnS = 0x36, "ble.un.s", ShortInlineBrTarget, ConditionalBranch, 2, 0;
    BltUnS = 0x37, "blt.un.s", ShortInlineBrTarget, ConditionalBranch, 2, 0;
    Br = 0x38, "br", InlineBrTarget, UnconditionalBranch, 0, 0;
    Brfalse = 0x39, "brfalse", InlineBrTarget, ConditionalBranch, 1, 0;
    Brtrue = 0x3A, "brtrue", InlineBrTarget, ConditionalBranch, 1, 0;
    Beq = 0x3B, "beq", InlineBrTarget, ConditionalBranch, 2, 0;
    Bge = 0x3C, "bge", InlineBrTarget, ConditionalBranch, 2, 0;
    Bgt = 0x3D, "bgt", InlineBrTarget, ConditionalBranch, 2, 0;
    Ble = 0x3E, "ble", InlineBrTarget, ConditionalBranch, 2, 0;
    Blt = 0x3F, "blt", InlineBrTarget, ConditionalBranch, 2, 0;
    BneUn = 0x40, "bne.un", InlineBrTarget, ConditionalBranch, 2, 0;
    BgeUn = 0x41, "bge.un", InlineBrTarget, ConditionalBranch, 2, 0;
    BgtUn = 0x42, "bgt.un", InlineBrTarget, ConditionalBranch, 2, 0;
    BleUn = 0x43, "ble.un", InlineBrTarget, ConditionalBranch, 2, 0;
    BltUn = 0x44, "blt.un", InlineBrTarget, ConditionalBranch, 2, 0;
    Switch = 0x45, "switch", InlineSwitch, Switch, 1, 0;
    LdindI1 = 0x46, "ldind.i1", InlineNone, Sequential, 1, 1;
    LdindU1 = 0x47, "ldind.u1", InlineNone, Sequential, 1, 1;
    LdindI2 = 0x48, "ldind.i2", InlineNone, Sequential, 1, 1;
    LdindU2 = 0x49, "ldind.u2", InlineNone, Sequential, 1, 1;
    LdindI4 = 0x4A, "ldind.i4", InlineNone, Sequential, 1, 1;
    LdindU4 = 0x4B, "ldind.u4", InlineNone, Sequential, 1, 1;
    LdindI8 = 0x4C, "ldind.i8", InlineNone, Sequential, 1, 1;
    LdindI = 0x4D, "ldind.i", InlineNone, Sequential, 1, 1;
    LdindR4 = 0x4E, "ldind.r4", InlineNone, Sequential, 1, 1;
    LdindR8 = 0x4F, "ldind.r8", InlineNone, Sequential, 1, 1;
    LdindRef = 0x50, "ldind.ref", InlineNone, Sequential, 1, 1;
    StindRef = 0x51, "stind.ref", InlineNone, Sequential, 2, 0;
    StindI1 = 0x52, "stind.i1", InlineNone, Sequential, 2, 0;
    StindI2 = 0x53, "stind.i2", InlineNone, Sequential, 2, 0;
    StindI4 = 0x54, "stind.i4", InlineNone, Sequential, 2, 0;
    StindI8 = 0x55, "stind.i8", InlineNone, Sequential, 2, 0;
    StindR4 = 0x56, "stind.r4", InlineNone, Sequential, 2, 0;
    StindR8 = 0x57, "stind.r8", InlineNone, Sequential, 2, 0;
    Add = 0x58, "add", InlineNone, Sequential, 2, 1;
    Sub = 0x59, "sub", InlineNone, Sequential, 2, 1;
    Mul = 0x5A, "mul", InlineNone, Sequential, 2, 1;
    Div = 0x5B, "div", InlineNone, Sequential, 2, 1;
    DivUn = 0x5C, "div.un", InlineNone, Sequential, 2, 1;
    Rem = 0x5D, "rem", InlineNone, Sequential, 2, 1;
    RemUn = 0x5E, "rem.un", InlineNone, Sequential, 2, 1;
    And = 0x5F, "and", InlineNone, Sequential, 2, 1;
    Or = 0x60, "or", InlineNone, Sequential, 2, 1;
    Xor = 0x61, "xor", InlineNone, Sequential, 2, 1;
    Shl = 0x62, "shl", InlineNone, Sequential, 2, 1;
    Shr = 0x63, "shr", InlineNone, Sequential, 2, 1;
    ShrUn = 0x64, "shr.un", InlineNone, Sequential, 2, 1;
    Neg = 0x65, "neg", InlineNone, Sequential, 1, 1;
    Not = 0x66, "not", InlineNone, Sequential, 1, 1;
    ConvI1 = 0x67, "conv.i1", InlineNone, Sequential, 1, 1;
    ConvI2 = 0x68, "conv.i2", InlineNone, Sequential, 1, 1;
    ConvI4 = 0x69, "conv.i4", InlineNone, Sequential, 1, 1;
    ConvI8 = 0x6A, "conv.i8", InlineNone, Sequential, 1, 1;
    ConvR4 = 0x6B, "conv.r4", InlineNone, Sequential, 1, 1;
    ConvR8 = 0x6C, "conv.r8", InlineNone, Sequential, 1, 1;
    ConvU4 = 0x6D, "conv.u4", InlineNone, Sequential, 1, 1;
    ConvU8 = 0x6E, "conv.u8", InlineNone, Sequential, 1, 1;
    Callvirt = 0x6F, "callvirt", InlineMethod, Call, var, var;
    Cpobj = 0x70, "cpobj", InlineType, Sequential, 2, 0;
    Ldobj = 0x71, "ldobj", InlineType, Sequential, 1, 1;
    Ldstr = 0x72, "ldstr", InlineString, Sequential, 0, 1;
    Newobj = 0x73, "newobj", InlineMethod, Call, var, 1;
    Castclass = 0x74, "castclass", InlineType, Sequential, 1, 1;
    Isinst = 0x75, "isinst", InlineType, Sequential, 1, 1;
    ConvRUn = 0x76, "conv.r.un", InlineNone, Sequential, 1, 1;
    Unbox = 0x79, "unbox", InlineType, Sequential, 1, 1;
    Throw = 0x7A, "throw", InlineNone, Throw, 1, 0;
    Ldfld = 0x7B, "ldfld", InlineField, Sequential, 1, 1;
    Ldflda = 0x7C, "ldflda", InlineField, Sequential, 1, 1;
    Stfld = 0x7D, "stfld", InlineField, Sequential, 2, 0;
    Ldsfld = 0x7E, "ldsfld", InlineField, Sequential, 0, 1;
    Ldsflda = 0x7F, "ldsflda", InlineField, Sequential, 0, 1;
    Stsfld = 0x80, "stsfld", InlineField, Sequential, 1, 0;
    Stobj = 0x81, "stobj", InlineType, Sequential, 2, 0;
    ConvOvfI1Un = 0x82, "conv.ovf.i1.un", InlineNone, Sequential, 1, 1;
    ConvOvfI2Un = 0x83, "conv.ovf.i2.un", InlineNone, Sequential, 1, 1;
    ConvOvfI4Un = 0x84, "conv.ovf.i4.un", InlineNone, Sequential, 1, 1;
    ConvOvfI8Un = 0x85, "conv.ovf.i8.un", InlineNone, Sequential, 1, 1;
    ConvOvfU1Un = 0x86, "conv.ovf.u1.un", InlineNone, Sequential, 1, 1;
    ConvOvfU2Un = 0x87, "conv.ovf.u2.un", InlineNone, Sequential, 1, 1;
    ConvOvfU4Un = 0x88, "conv.ovf.u4.un", InlineNone, Sequential, 1, 1;
    ConvOvfU8Un = 0x89, "conv.ovf.u8.un", InlineNone, Sequential, 1, 1;
    ConvOvfIUn = 0x8A, "conv.ovf.i.un", InlineNone, Sequential, 1, 1;
    ConvOvfUUn = 0x8B, "conv.ovf.u.un", InlineNone, Sequential, 1, 1;
    Box = 0x8C, "box", InlineType, Sequential, 1, 1;
    Newarr = 0x8D, "newarr", InlineType, Sequential, 1, 1;
    Ldlen = 0x8E, "ldlen", InlineNone, Sequential, 1, 1;
    Ldelema = 0x8F, "ldelema", InlineType, Sequential, 2, 1;
    LdelemI1 = 0x90, "ldelem.i1", InlineNone, Sequential, 2, 1;
    LdelemU1 = 0x91, "ldelem.u1", InlineNone, Sequential, 2, 1;
    LdelemI2 = 0x92, "ldelem.i2", InlineNone, Sequential, 2, 1;
    LdelemU2 = 0x93, "ldelem.u2", InlineNone, Sequential, 2, 1;
    LdelemI4 = 0x94, "ldelem.i4", InlineNone, Sequential, 2, 1;
    LdelemU4 = 0x95, "ldelem.u4", InlineNone, Sequential, 2, 1;
    LdelemI8 = 0x96, "ldelem.i8", InlineNone, Sequential, 2, 1;
    LdelemI = 0x97, "ldelem.i", InlineNone, Sequential, 2, 1;
    LdelemR4 = 0x98, "ldelem.r4", InlineNone, Sequential, 2, 1;
    LdelemR8 = 0x99, "ldelem.r8", InlineNone, Sequential, 2, 1;
    LdelemRef = 0x9A, "ldelem.ref", InlineNone, Sequential, 2, 1;
    StelemI = 0x9B, "stelem.i", InlineNone, Sequential, 3, 0;
    StelemI1 = 0x9C, "stelem.i1", InlineNone, Sequential, 3, 0;
    StelemI2 = 0x9D, "stelem.i2", InlineNone, Sequential, 3, 0;
    StelemI4 = 0x9E, "stelem.i4", InlineNone, Sequential, 3, 0;
    StelemI8 = 0x9F, "stelem.i8", InlineNone, Sequential, 3, 0;
    StelemR4 = 0xA0, "stelem.r4", InlineNone, Sequential, 3, 0;
    StelemR8 = 0xA1, "stelem.r8", InlineNone, Sequential, 3, 0;
    StelemRef = 0xA2, "stelem.ref", InlineNone, Sequential, 3, 0;
    Ldelem = 0xA3, "ldelem", InlineType, Sequential, 2, 1;
    Stelem = 0xA4, "stelem", InlineType, Sequential, 3, 0;
    UnboxAny = 0xA5, "unbox.any", InlineType, Sequential, 1, 1;
    ConvOvfI1 = 0xB3, "conv.ovf.i1", InlineNone, Sequential, 1, 1;
    ConvOvfU1 = 0xB4, "conv.ovf.u1", InlineNone, Sequential, 1, 1;
    ConvOvfI2 = 0xB5, "conv.ovf.i2", InlineNone, Sequential, 1, 1;
    ConvOvfU2 = 0xB6, "conv.ovf.u2", InlineNone, Sequential, 1, 1;
    ConvOvfI4 = 0xB7, "conv.ovf.i4", InlineNone, Sequential, 1, 1;
    ConvOvfU4 = 0xB8, "conv.ovf.u4", InlineNone, Sequential, 1, 1;
    ConvOvfI8 = 0xB9, "conv.ovf.i8", InlineNone, Sequential, 1, 1;
    ConvOvfU8 = 0xBA, "conv.ovf.u8", InlineNone, Sequential, 1, 1;
    Refanyval = 0xC2, "refanyval", InlineType, Sequential, 1, 1;
    Ckfinite = 0xC3, "ckfinite", InlineNone, Sequential, 1, 1;
    Mkrefany = 0xC6, "mkrefany", InlineType, Sequential, 1, 1;
    Ldtoken = 0xD0, "ldtoken", InlineTok, Sequential, 0, 1;
    ConvU2 = 0xD1, "conv.u2", InlineNone, Sequential, 1, 1;
    ConvU1 = 0xD2, "conv.u1", InlineNone, Sequential, 1, 1;
    ConvI = 0xD3, "conv.i", InlineNone, Sequential, 1, 1;
    ConvOvfI = 0xD4, "conv.ovf.i", InlineNone, Sequential, 1, 1;
    ConvOvfU = 0xD5, "conv.ovf.u", InlineNone, Sequential, 1, 1;
    AddOvf = 0xD6, "add.ovf", InlineNone, Sequential, 2, 1;
    AddOvfUn = 0xD7, "add.ovf.un", InlineNone, Sequential, 2, 1;
    MulOvf = 0xD8, "mul.ovf", InlineNone, Sequential, 2, 1;
    MulOvfUn = 0xD9, "mul.ovf.un", InlineNone, Sequential, 2, 1;
    SubOvf = 0xDA, "sub.ovf", InlineNone, Sequential, 2, 1;
    SubOvfUn = 0xDB, "sub.ovf.un", InlineNone, Sequential, 2, 1;
    Endfinally = 0xDC, "endfinally", InlineNone, EndFinally, 0, 0;
    Leave = 0xDD, "leave", InlineBrTarget, Leave, 0, 0;
    LeaveS = 0xDE, "leave.s", ShortInlineBrTarget, Leave, 0, 0;
    StindI = 0xDF, "stind.i", InlineNone, Sequential, 2, 0;
    ConvU = 0xE0, "conv.u", InlineNone, Sequential, 1, 1;
    Arglist = 0xFE00, "arglist", InlineNone, Sequential, 0, 1;
    Ceq = 0xFE01, "ceq", InlineNone, Sequential, 2, 1;
    Cgt = 0xFE02, "cgt", InlineNone, Sequential, 2, 1;
    CgtUn = 0xFE03, "cgt.un", InlineNone, Sequential, 2, 1;
    Clt = 0xFE04, "clt", InlineNone, Sequential, 2, 1;
    CltUn = 0xFE05, "clt.un", InlineNone, Sequential, 2, 1;
    Ldftn = 0xFE06, "ldftn", InlineMethod, Sequential, 0, 1;
    Ldvirtftn = 0xFE07, "ldvirtftn", InlineMethod, Sequential, 1, 1;
    Ldarg = 0xFE09, "ldarg", InlineVar, Sequential, 0, 1;
    Ldarga = 0xFE0A, "ldarga", InlineVar, Sequential, 0, 1;
    Starg = 0xFE0B, "starg", InlineVar, Sequential, 1, 0;
    Ldloc = 0xFE0C, "ldloc", InlineVar, Sequential, 0, 1;
    Ldloca = 0xFE0D, "ldloca", InlineVar, Sequential, 0, 1;
    Stloc = 0xFE0E, "stloc", InlineVar, Sequential, 1, 0;
    Localloc = 0xFE0F, "localloc", InlineNone, Sequential, 1, 1;
    Endfilter = 0xFE11, "endfilter", InlineNone, EndFinally, 1, 0;
    Unaligned = 0xFE12, "unaligned.", ShortInlineI, Sequential, 0, 0;
    Volatile = 0xFE13, "volatile.", InlineNone, Sequential, 0, 0;
    Tail = 0xFE14, "tail.", InlineNone, Sequential, 0, 0;
    Initobj = 0xFE15, "initobj", InlineType, Sequential, 1, 0;
    Constrained = 0xFE16, "constrained.", InlineType, Sequential, 0, 0;
    Cpblk = 0xFE17, "cpblk", InlineNone, Sequential, 3, 0;
    Initblk = 0xFE18, "initblk", InlineNone, Sequential, 3, 0;
    No = 0xFE19, "no.", ShortInlineI, Sequential, 0, 0;
    Rethrow = 0xFE1A, "rethrow", InlineNone, Throw, 0, 0;
    Sizeof = 0xFE1C, "sizeof", InlineType, Sequential, 0, 1;
    Refanytype = 0xFE1D, "refanytype", InlineNone, Sequential, 1, 1;
    Readonly = 0xFE1E, "readonly.", InlineNone, Sequential, 0, 0;
}

impl OpCode {
    /// Size of the opcode bytes (1, or 2 for `0xFE`-prefixed opcodes).
    #[must_use]
    pub const fn encoded_size(self) -> u32 {
        if self.value() > 0xFF {
            2
        } else {
            1
        }
    }

    /// Returns true if the operand is a one-byte branch displacement.
    #[must_use]
    pub const fn is_short_branch(self) -> bool {
        matches!(self.operand_kind(), OperandKind::ShortInlineBrTarget)
    }

    /// Returns true if the operand references one or more instructions.
    #[must_use]
    pub const fn is_branch(self) -> bool {
        matches!(
            self.operand_kind(),
            OperandKind::ShortInlineBrTarget
                | OperandKind::InlineBrTarget
                | OperandKind::InlineSwitch
        )
    }

    /// Returns true if control never falls through to the next instruction.
    #[must_use]
    pub const fn ends_block(self) -> bool {
        matches!(
            self.flow(),
            FlowType::UnconditionalBranch
                | FlowType::Return
                | FlowType::Throw
                | FlowType::EndFinally
                | FlowType::Leave
        )
    }

    /// The four-byte displacement counterpart of a short branch.
    #[must_use]
    pub const fn long_form(self) -> Option<OpCode> {
        Some(match self {
            OpCode::BrS => OpCode::Br,
            OpCode::BrfalseS => OpCode::Brfalse,
            OpCode::BrtrueS => OpCode::Brtrue,
            OpCode::BeqS => OpCode::Beq,
            OpCode::BgeS => OpCode::Bge,
            OpCode::BgtS => OpCode::Bgt,
            OpCode::BleS => OpCode::Ble,
            OpCode::BltS => OpCode::Blt,
            OpCode::BneUnS => OpCode::BneUn,
            OpCode::BgeUnS => OpCode::BgeUn,
            OpCode::BgtUnS => OpCode::BgtUn,
            OpCode::BleUnS => OpCode::BleUn,
            OpCode::BltUnS => OpCode::BltUn,
            OpCode::LeaveS => OpCode::Leave,
            _ => return None,
        })
    }

    /// The one-byte displacement counterpart of a long branch.
    #[must_use]
    pub const fn short_form(self) -> Option<OpCode> {
        Some(match self {
            OpCode::Br => OpCode::BrS,
            OpCode::Brfalse => OpCode::BrfalseS,
            OpCode::Brtrue => OpCode::BrtrueS,
            OpCode::Beq => OpCode::BeqS,
            OpCode::Bge => OpCode::BgeS,
            OpCode::Bgt => OpCode::BgtS,
            OpCode::Ble => OpCode::BleS,
            OpCode::Blt => OpCode::BltS,
            OpCode::BneUn => OpCode::BneUnS,
            OpCode::BgeUn => OpCode::BgeUnS,
            OpCode::BgtUn => OpCode::BgtUnS,
            OpCode::BleUn => OpCode::BleUnS,
            OpCode::BltUn => OpCode::BltUnS,
            OpCode::Leave => OpCode::LeaveS,
            _ => return None,
        })
    }

    /// Looks up an opcode by its encoded value.
    #[must_use]
    pub fn from_value(value: u16) -> Option<OpCode> {
        use strum::IntoEnumIterator;

        OpCode::iter().find(|opcode| opcode.value() == value)
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.mnemonic())
    }
}
