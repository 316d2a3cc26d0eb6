//! Bitwise and equality handlers.

use crate::error::VmResult;
use crate::execution_engine::ExecutionEngine;
use crate::stack_item::{check_integer, StackItem};
use num_bigint::BigInt;

fn push_checked(engine: &mut ExecutionEngine, value: BigInt) -> VmResult<()> {
    check_integer(&value, engine.limits().max_integer_size)?;
    engine.push(StackItem::Integer(value))
}

/// `INVERT`: bitwise complement.
pub fn invert(engine: &mut ExecutionEngine) -> VmResult<()> {
    let value = engine.pop_integer()?;
    push_checked(engine, !value)
}

/// `AND`.
pub fn and(engine: &mut ExecutionEngine) -> VmResult<()> {
    let b = engine.pop_integer()?;
    let a = engine.pop_integer()?;
    push_checked(engine, a & b)
}

/// `OR`.
pub fn or(engine: &mut ExecutionEngine) -> VmResult<()> {
    let b = engine.pop_integer()?;
    let a = engine.pop_integer()?;
    push_checked(engine, a | b)
}

/// `XOR`.
pub fn xor(engine: &mut ExecutionEngine) -> VmResult<()> {
    let b = engine.pop_integer()?;
    let a = engine.pop_integer()?;
    push_checked(engine, a ^ b)
}

/// `EQUAL` / `NOTEQUAL`: protocol equality (reference for arrays and maps,
/// structural for structs, value for primitives).
pub fn equal(engine: &mut ExecutionEngine, expect_equal: bool) -> VmResult<()> {
    let b = engine.pop()?;
    let a = engine.pop()?;
    let result = a.equals(&b)?;
    engine.push(StackItem::Boolean(result == expect_equal))
}
