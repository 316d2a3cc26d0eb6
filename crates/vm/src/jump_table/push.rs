//! Constant-pushing handlers.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::OpCode;
use crate::stack_item::{check_integer, StackItem};
use num_bigint::BigInt;

/// `PUSHINT8`..`PUSHINT256`: the operand is a little-endian two's
/// complement integer of the opcode's width.
pub fn push_int(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let value = BigInt::from_signed_bytes_le(&instruction.operand);
    check_integer(&value, engine.limits().max_integer_size)?;
    engine.push(StackItem::Integer(value))
}

/// `PUSHT` / `PUSHF`.
pub fn push_bool(engine: &mut ExecutionEngine, value: bool) -> VmResult<()> {
    engine.push(StackItem::Boolean(value))
}

/// `PUSHA`: a pointer into the current script.
pub fn push_address(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let target = engine.checked_target(instruction, instruction.operand_i32()?)?;
    let script = engine.current_context()?.script().clone();
    engine.push(StackItem::Pointer {
        script,
        position: target,
    })
}

/// `PUSHNULL`.
pub fn push_null(engine: &mut ExecutionEngine) -> VmResult<()> {
    engine.push(StackItem::Null)
}

/// `PUSHDATA1/2/4`: the operand bytes become a byte string.
pub fn push_data(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let size = instruction.operand.len();
    if size > engine.limits().max_item_size {
        return Err(VmError::ItemTooLarge {
            size,
            limit: engine.limits().max_item_size,
        });
    }
    engine.push(StackItem::from_bytes(instruction.operand.clone()))
}

/// `PUSHM1` and `PUSH0`..`PUSH16`.
pub fn push_small_int(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let value: i64 = if instruction.opcode == OpCode::PushM1 {
        -1
    } else {
        (instruction.opcode as u8 - OpCode::Push0 as u8) as i64
    };
    engine.push(StackItem::from_int(value))
}
