//! Per-opcode execution prices.

use crate::op_code::OpCode;

/// Price charged per byte for size-dependent operations (`NEWBUFFER`,
/// `MEMCPY`, `CAT`, `SUBSTR`, `LEFT`, `RIGHT`), on top of the base price.
pub const PRICE_PER_BYTE: i64 = 4;

/// Base execution price of an opcode, in datoshi.
///
/// Prices bucket by cost class: pushes and simple stack shuffles are
/// cheapest; arithmetic and comparisons sit in the middle; allocation,
/// calls and signature checks dominate.
pub fn opcode_price(opcode: OpCode) -> i64 {
    use OpCode::*;
    match opcode {
        // Constants and cheap stack motion.
        PushInt8 | PushInt16 | PushInt32 | PushInt64 | PushT | PushF | PushNull | PushM1
        | Push0 | Push1 | Push2 | Push3 | Push4 | Push5 | Push6 | Push7 | Push8 | Push9
        | Push10 | Push11 | Push12 | Push13 | Push14 | Push15 | Push16 | Nop => 30,

        PushInt128 | PushInt256 | PushA => 120,
        PushData1 => 240,
        PushData2 => 390,
        PushData4 => 13_980,

        // Flow control.
        Jmp | JmpL | JmpIf | JmpIfL | JmpIfNot | JmpIfNotL | JmpEq | JmpEqL | JmpNe | JmpNeL
        | JmpGt | JmpGtL | JmpGe | JmpGeL | JmpLt | JmpLtL | JmpLe | JmpLeL | EndTry
        | EndTryL | EndFinally | Ret | Try | TryL => 60,
        Call | CallL | CallA => 1_020,
        CallT => 32_760,
        Abort | Assert | Throw => 30,
        Syscall => 0,

        // Stack manipulation.
        Depth | Drop | Nip | Clear | Dup | Over | Pick | Tuck | Swap | Rot | Reverse3
        | Reverse4 => 60,
        XDrop | Roll | ReverseN => 480,

        // Slots.
        InitSSlot => 480,
        InitSlot => 1_920,
        LdSFld0 | LdSFld1 | LdSFld2 | LdSFld3 | LdSFld4 | LdSFld5 | LdSFld6 | LdSFld | StSFld0
        | StSFld1 | StSFld2 | StSFld3 | StSFld4 | StSFld5 | StSFld6 | StSFld | LdLoc0 | LdLoc1
        | LdLoc2 | LdLoc3 | LdLoc4 | LdLoc5 | LdLoc6 | LdLoc | StLoc0 | StLoc1 | StLoc2
        | StLoc3 | StLoc4 | StLoc5 | StLoc6 | StLoc | LdArg0 | LdArg1 | LdArg2 | LdArg3
        | LdArg4 | LdArg5 | LdArg6 | LdArg | StArg0 | StArg1 | StArg2 | StArg3 | StArg4
        | StArg5 | StArg6 | StArg => 60,

        // Splice; the byte-proportional part is charged by the handler.
        NewBuffer => 240,
        Memcpy | Cat | Substr | Left | Right => 2_040,

        // Bitwise and arithmetic.
        Invert | And | Or | Xor | Sign | Abs | Negate | Inc | Dec | Add | Sub | Not | BoolAnd
        | BoolOr | Nz | NumEqual | NumNotEqual | Lt | Le | Gt | Ge | Min | Max | Within
        | Shl | Shr => 240,
        Equal | NotEqual => 1_020,
        Mul | Div | Mod => 960,
        Pow | Sqrt | ModMul | ModPow => 2_040,

        // Signature checks.
        CheckSig => 983_040,
        CheckMultisig => 983_040,

        // Compound types.
        PackMap | PackStruct | Pack | Unpack => 7_680,
        NewArray0 | NewStruct0 | NewMap => 480,
        NewArray | NewArrayT | NewStruct => 15_360,
        Size | HasKey | Keys | PickItem | Append | SetItem | Remove | ClearItems | PopItem
        | ReverseItems => 480,
        Values => 7_680,

        // Types.
        IsNull | IsType => 60,
        Convert => 8_192,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushes_are_cheapest() {
        assert!(opcode_price(OpCode::Push1) < opcode_price(OpCode::Add));
        assert!(opcode_price(OpCode::Add) < opcode_price(OpCode::CheckSig));
    }

    #[test]
    fn every_opcode_has_a_price() {
        for byte in 0u8..=0xff {
            if let Ok(opcode) = OpCode::from_byte(byte) {
                assert!(opcode_price(opcode) >= 0, "{opcode:?}");
            }
        }
    }
}
