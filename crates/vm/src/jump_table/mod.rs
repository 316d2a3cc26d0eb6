//! Opcode handlers, one module per instruction family.

pub mod bitwise;
pub mod compound;
pub mod control;
pub mod crypto;
pub mod numeric;
pub mod push;
pub mod slot;
pub mod splice;
pub mod stack;
pub mod types;

use crate::error::VmResult;
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;

/// Dispatches a decoded instruction to its handler. `SYSCALL` is routed by
/// the engine before this is reached.
pub fn dispatch(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    use OpCode::*;
    match instruction.opcode {
        // Constants
        PushInt8 | PushInt16 | PushInt32 | PushInt64 | PushInt128 | PushInt256 => {
            push::push_int(engine, instruction)
        }
        PushT => push::push_bool(engine, true),
        PushF => push::push_bool(engine, false),
        PushA => push::push_address(engine, instruction),
        PushNull => push::push_null(engine),
        PushData1 | PushData2 | PushData4 => push::push_data(engine, instruction),
        PushM1 | Push0 | Push1 | Push2 | Push3 | Push4 | Push5 | Push6 | Push7 | Push8 | Push9
        | Push10 | Push11 | Push12 | Push13 | Push14 | Push15 | Push16 => {
            push::push_small_int(engine, instruction)
        }

        // Flow control
        Nop => Ok(()),
        Jmp | JmpL => control::jmp(engine, instruction),
        JmpIf | JmpIfL => control::jmp_if(engine, instruction, true),
        JmpIfNot | JmpIfNotL => control::jmp_if(engine, instruction, false),
        JmpEq | JmpEqL => control::jmp_cmp(engine, instruction, |o| o.is_eq()),
        JmpNe | JmpNeL => control::jmp_cmp(engine, instruction, |o| o.is_ne()),
        JmpGt | JmpGtL => control::jmp_cmp(engine, instruction, |o| o.is_gt()),
        JmpGe | JmpGeL => control::jmp_cmp(engine, instruction, |o| o.is_ge()),
        JmpLt | JmpLtL => control::jmp_cmp(engine, instruction, |o| o.is_lt()),
        JmpLe | JmpLeL => control::jmp_cmp(engine, instruction, |o| o.is_le()),
        Call | CallL => control::call(engine, instruction),
        CallA => control::call_a(engine),
        CallT => control::call_t(engine),
        Abort => control::abort(engine),
        Assert => control::assert(engine),
        Throw => control::throw(engine),
        Try | TryL => control::try_enter(engine, instruction),
        EndTry | EndTryL => control::end_try(engine, instruction),
        EndFinally => control::end_finally(engine),
        Ret => control::ret(engine),
        Syscall => unreachable!("SYSCALL is routed by the engine"),

        // Stack manipulation
        Depth => stack::depth(engine),
        Drop => stack::drop_top(engine),
        Nip => stack::nip(engine),
        XDrop => stack::xdrop(engine),
        Clear => stack::clear(engine),
        Dup => stack::dup(engine),
        Over => stack::over(engine),
        Pick => stack::pick(engine),
        Tuck => stack::tuck(engine),
        Swap => stack::swap(engine),
        Rot => stack::rot(engine),
        Roll => stack::roll(engine),
        Reverse3 => stack::reverse_n(engine, 3),
        Reverse4 => stack::reverse_n(engine, 4),
        ReverseN => stack::reverse_top(engine),

        // Slots
        InitSSlot => slot::init_static_slot(engine, instruction),
        InitSlot => slot::init_slot(engine, instruction),
        LdSFld0 | LdSFld1 | LdSFld2 | LdSFld3 | LdSFld4 | LdSFld5 | LdSFld6 => {
            slot::load_static(engine, (instruction.opcode as u8 - LdSFld0 as u8) as usize)
        }
        LdSFld => slot::load_static(engine, instruction.operand_u8()? as usize),
        StSFld0 | StSFld1 | StSFld2 | StSFld3 | StSFld4 | StSFld5 | StSFld6 => {
            slot::store_static(engine, (instruction.opcode as u8 - StSFld0 as u8) as usize)
        }
        StSFld => slot::store_static(engine, instruction.operand_u8()? as usize),
        LdLoc0 | LdLoc1 | LdLoc2 | LdLoc3 | LdLoc4 | LdLoc5 | LdLoc6 => {
            slot::load_local(engine, (instruction.opcode as u8 - LdLoc0 as u8) as usize)
        }
        LdLoc => slot::load_local(engine, instruction.operand_u8()? as usize),
        StLoc0 | StLoc1 | StLoc2 | StLoc3 | StLoc4 | StLoc5 | StLoc6 => {
            slot::store_local(engine, (instruction.opcode as u8 - StLoc0 as u8) as usize)
        }
        StLoc => slot::store_local(engine, instruction.operand_u8()? as usize),
        LdArg0 | LdArg1 | LdArg2 | LdArg3 | LdArg4 | LdArg5 | LdArg6 => {
            slot::load_argument(engine, (instruction.opcode as u8 - LdArg0 as u8) as usize)
        }
        LdArg => slot::load_argument(engine, instruction.operand_u8()? as usize),
        StArg0 | StArg1 | StArg2 | StArg3 | StArg4 | StArg5 | StArg6 => {
            slot::store_argument(engine, (instruction.opcode as u8 - StArg0 as u8) as usize)
        }
        StArg => slot::store_argument(engine, instruction.operand_u8()? as usize),

        // Splice
        NewBuffer => splice::new_buffer(engine),
        Memcpy => splice::memcpy(engine),
        Cat => splice::cat(engine),
        Substr => splice::substr(engine),
        Left => splice::left(engine),
        Right => splice::right(engine),

        // Bitwise
        Invert => bitwise::invert(engine),
        And => bitwise::and(engine),
        Or => bitwise::or(engine),
        Xor => bitwise::xor(engine),
        Equal => bitwise::equal(engine, true),
        NotEqual => bitwise::equal(engine, false),

        // Arithmetic
        Sign => numeric::sign(engine),
        Abs => numeric::abs(engine),
        Negate => numeric::negate(engine),
        Inc => numeric::inc(engine),
        Dec => numeric::dec(engine),
        Add => numeric::add(engine),
        Sub => numeric::sub(engine),
        Mul => numeric::mul(engine),
        Div => numeric::div(engine),
        Mod => numeric::rem(engine),
        Pow => numeric::pow(engine),
        Sqrt => numeric::sqrt(engine),
        ModMul => numeric::mod_mul(engine),
        ModPow => numeric::mod_pow(engine),
        Shl => numeric::shl(engine),
        Shr => numeric::shr(engine),
        Not => numeric::not(engine),
        BoolAnd => numeric::bool_and(engine),
        BoolOr => numeric::bool_or(engine),
        Nz => numeric::nz(engine),
        NumEqual => numeric::num_equal(engine, true),
        NumNotEqual => numeric::num_equal(engine, false),
        Lt => numeric::compare(engine, |o| o.is_lt()),
        Le => numeric::compare(engine, |o| o.is_le()),
        Gt => numeric::compare(engine, |o| o.is_gt()),
        Ge => numeric::compare(engine, |o| o.is_ge()),
        Min => numeric::min(engine),
        Max => numeric::max(engine),
        Within => numeric::within(engine),

        // Signature checks
        CheckSig => crypto::check_sig(engine),
        CheckMultisig => crypto::check_multisig(engine),

        // Compound types
        PackMap => compound::pack_map(engine),
        PackStruct => compound::pack_struct(engine),
        Pack => compound::pack(engine),
        Unpack => compound::unpack(engine),
        NewArray0 => compound::new_array0(engine),
        NewArray | NewArrayT => compound::new_array(engine, instruction),
        NewStruct0 => compound::new_struct0(engine),
        NewStruct => compound::new_struct(engine),
        NewMap => compound::new_map(engine),
        Size => compound::size(engine),
        HasKey => compound::has_key(engine),
        Keys => compound::keys(engine),
        Values => compound::values(engine),
        PickItem => compound::pick_item(engine),
        Append => compound::append(engine),
        SetItem => compound::set_item(engine),
        ReverseItems => compound::reverse_items(engine),
        Remove => compound::remove(engine),
        ClearItems => compound::clear_items(engine),
        PopItem => compound::pop_item(engine),

        // Types
        IsNull => types::is_null(engine),
        IsType => types::is_type(engine, instruction),
        Convert => types::convert(engine, instruction),
    }
}
