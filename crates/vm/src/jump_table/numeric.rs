//! Arithmetic and comparison handlers.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::stack_item::{check_integer, StackItem};
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use std::cmp::Ordering;

fn push_checked(engine: &mut ExecutionEngine, value: BigInt) -> VmResult<()> {
    check_integer(&value, engine.limits().max_integer_size)?;
    engine.push(StackItem::Integer(value))
}

/// `SIGN`.
pub fn sign(engine: &mut ExecutionEngine) -> VmResult<()> {
    let value = engine.pop_integer()?;
    engine.push(StackItem::from_int(match value.sign() {
        num_bigint::Sign::Minus => -1i64,
        num_bigint::Sign::NoSign => 0,
        num_bigint::Sign::Plus => 1,
    }))
}

/// `ABS`.
pub fn abs(engine: &mut ExecutionEngine) -> VmResult<()> {
    let value = engine.pop_integer()?;
    push_checked(engine, value.abs())
}

/// `NEGATE`.
pub fn negate(engine: &mut ExecutionEngine) -> VmResult<()> {
    let value = engine.pop_integer()?;
    push_checked(engine, -value)
}

/// `INC`.
pub fn inc(engine: &mut ExecutionEngine) -> VmResult<()> {
    let value = engine.pop_integer()?;
    push_checked(engine, value + 1)
}

/// `DEC`.
pub fn dec(engine: &mut ExecutionEngine) -> VmResult<()> {
    let value = engine.pop_integer()?;
    push_checked(engine, value - 1)
}

/// `ADD`.
pub fn add(engine: &mut ExecutionEngine) -> VmResult<()> {
    let b = engine.pop_integer()?;
    let a = engine.pop_integer()?;
    push_checked(engine, a + b)
}

/// `SUB`.
pub fn sub(engine: &mut ExecutionEngine) -> VmResult<()> {
    let b = engine.pop_integer()?;
    let a = engine.pop_integer()?;
    push_checked(engine, a - b)
}

/// `MUL`.
pub fn mul(engine: &mut ExecutionEngine) -> VmResult<()> {
    let b = engine.pop_integer()?;
    let a = engine.pop_integer()?;
    push_checked(engine, a * b)
}

/// `DIV`: truncated division; divide-by-zero faults.
pub fn div(engine: &mut ExecutionEngine) -> VmResult<()> {
    let b = engine.pop_integer()?;
    let a = engine.pop_integer()?;
    if b.is_zero() {
        return Err(VmError::InvalidOperand("division by zero".into()));
    }
    push_checked(engine, a / b)
}

/// `MOD`: truncated remainder; modulo-by-zero faults.
pub fn rem(engine: &mut ExecutionEngine) -> VmResult<()> {
    let b = engine.pop_integer()?;
    let a = engine.pop_integer()?;
    if b.is_zero() {
        return Err(VmError::InvalidOperand("modulo by zero".into()));
    }
    push_checked(engine, a % b)
}

/// `POW`: non-negative exponent bounded to `u32`.
pub fn pow(engine: &mut ExecutionEngine) -> VmResult<()> {
    let exponent = engine.pop_integer()?;
    let base = engine.pop_integer()?;
    let exponent = exponent
        .to_u32()
        .ok_or_else(|| VmError::InvalidOperand("exponent out of range".into()))?;
    push_checked(engine, base.pow(exponent))
}

/// `SQRT`: integer square root; negative input faults.
pub fn sqrt(engine: &mut ExecutionEngine) -> VmResult<()> {
    let value = engine.pop_integer()?;
    if value.is_negative() {
        return Err(VmError::InvalidOperand("square root of negative".into()));
    }
    push_checked(engine, value.sqrt())
}

/// `MODMUL`: `a * b mod m`.
pub fn mod_mul(engine: &mut ExecutionEngine) -> VmResult<()> {
    let modulus = engine.pop_integer()?;
    let b = engine.pop_integer()?;
    let a = engine.pop_integer()?;
    if modulus.is_zero() {
        return Err(VmError::InvalidOperand("modulus is zero".into()));
    }
    push_checked(engine, (a * b) % modulus)
}

/// `MODPOW`: modular exponentiation with a non-negative exponent.
pub fn mod_pow(engine: &mut ExecutionEngine) -> VmResult<()> {
    let modulus = engine.pop_integer()?;
    let exponent = engine.pop_integer()?;
    let base = engine.pop_integer()?;
    if modulus.is_zero() {
        return Err(VmError::InvalidOperand("modulus is zero".into()));
    }
    if exponent.is_negative() {
        return Err(VmError::InvalidOperand("negative exponent".into()));
    }
    push_checked(engine, base.modpow(&exponent, &modulus))
}

const MAX_SHIFT: i64 = 256;

/// `SHL`.
pub fn shl(engine: &mut ExecutionEngine) -> VmResult<()> {
    let shift = engine.pop_integer()?;
    let value = engine.pop_integer()?;
    let shift = shift
        .to_i64()
        .filter(|s| (0..=MAX_SHIFT).contains(s))
        .ok_or_else(|| VmError::InvalidOperand("shift out of range".into()))?;
    if shift == 0 {
        return push_checked(engine, value);
    }
    push_checked(engine, value << (shift as usize))
}

/// `SHR`.
pub fn shr(engine: &mut ExecutionEngine) -> VmResult<()> {
    let shift = engine.pop_integer()?;
    let value = engine.pop_integer()?;
    let shift = shift
        .to_i64()
        .filter(|s| (0..=MAX_SHIFT).contains(s))
        .ok_or_else(|| VmError::InvalidOperand("shift out of range".into()))?;
    if shift == 0 {
        return push_checked(engine, value);
    }
    push_checked(engine, value >> (shift as usize))
}

/// `NOT`: boolean negation.
pub fn not(engine: &mut ExecutionEngine) -> VmResult<()> {
    let value = engine.pop_boolean()?;
    engine.push(StackItem::Boolean(!value))
}

/// `BOOLAND`.
pub fn bool_and(engine: &mut ExecutionEngine) -> VmResult<()> {
    let b = engine.pop_boolean()?;
    let a = engine.pop_boolean()?;
    engine.push(StackItem::Boolean(a && b))
}

/// `BOOLOR`.
pub fn bool_or(engine: &mut ExecutionEngine) -> VmResult<()> {
    let b = engine.pop_boolean()?;
    let a = engine.pop_boolean()?;
    engine.push(StackItem::Boolean(a || b))
}

/// `NZ`: whether the integer is non-zero.
pub fn nz(engine: &mut ExecutionEngine) -> VmResult<()> {
    let value = engine.pop_integer()?;
    engine.push(StackItem::Boolean(!value.is_zero()))
}

/// `NUMEQUAL` / `NUMNOTEQUAL`.
pub fn num_equal(engine: &mut ExecutionEngine, expect_equal: bool) -> VmResult<()> {
    let b = engine.pop_integer()?;
    let a = engine.pop_integer()?;
    engine.push(StackItem::Boolean((a == b) == expect_equal))
}

/// `LT`/`LE`/`GT`/`GE`: a comparison with `Null` is always false.
pub fn compare(engine: &mut ExecutionEngine, accept: fn(Ordering) -> bool) -> VmResult<()> {
    let b = engine.pop()?;
    let a = engine.pop()?;
    if a.is_null() || b.is_null() {
        return engine.push(StackItem::Boolean(false));
    }
    let max = engine.limits().max_integer_size;
    let ordering = a.get_integer(max)?.cmp(&b.get_integer(max)?);
    engine.push(StackItem::Boolean(accept(ordering)))
}

/// `MIN`.
pub fn min(engine: &mut ExecutionEngine) -> VmResult<()> {
    let b = engine.pop_integer()?;
    let a = engine.pop_integer()?;
    push_checked(engine, a.min(b))
}

/// `MAX`.
pub fn max(engine: &mut ExecutionEngine) -> VmResult<()> {
    let b = engine.pop_integer()?;
    let a = engine.pop_integer()?;
    push_checked(engine, a.max(b))
}

/// `WITHIN`: `a <= x < b`.
pub fn within(engine: &mut ExecutionEngine) -> VmResult<()> {
    let b = engine.pop_integer()?;
    let a = engine.pop_integer()?;
    let x = engine.pop_integer()?;
    engine.push(StackItem::Boolean(a <= x && x < b))
}
