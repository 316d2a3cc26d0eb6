//! Flow-control handlers.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::op_code::{OpCode, OperandEncoding};
use crate::stack_item::StackItem;
use crate::try_context::{TryContext, TryState};
use std::cmp::Ordering;

fn jump_offset(instruction: &Instruction) -> VmResult<i32> {
    match instruction.opcode.operand_encoding() {
        OperandEncoding::Fixed(1) => instruction.operand_i8(),
        OperandEncoding::Fixed(4) => instruction.operand_i32(),
        _ => Err(VmError::InvalidOperand("jump without offset operand".into())),
    }
}

/// `JMP` / `JMP_L`.
pub fn jmp(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let target = engine.checked_target(instruction, jump_offset(instruction)?)?;
    engine.jump_to(target)
}

/// `JMPIF[_L]` / `JMPIFNOT[_L]`.
pub fn jmp_if(engine: &mut ExecutionEngine, instruction: &Instruction, when: bool) -> VmResult<()> {
    let condition = engine.pop_boolean()?;
    if condition == when {
        let target = engine.checked_target(instruction, jump_offset(instruction)?)?;
        engine.jump_to(target)?;
    }
    Ok(())
}

/// The integer-comparison jump family.
pub fn jmp_cmp(
    engine: &mut ExecutionEngine,
    instruction: &Instruction,
    accept: fn(Ordering) -> bool,
) -> VmResult<()> {
    let b = engine.pop_integer()?;
    let a = engine.pop_integer()?;
    if accept(a.cmp(&b)) {
        let target = engine.checked_target(instruction, jump_offset(instruction)?)?;
        engine.jump_to(target)?;
    }
    Ok(())
}

/// `CALL` / `CALL_L`: push a frame at the target sharing this frame's
/// stack; the caller's pointer advances past the instruction as usual.
pub fn call(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let target = engine.checked_target(instruction, jump_offset(instruction)?)?;
    let frame = engine.current_context()?.clone_at(target);
    engine.load_context(frame)
}

/// `CALLA`: call through a pointer item; the pointer must address the
/// current script.
pub fn call_a(engine: &mut ExecutionEngine) -> VmResult<()> {
    let item = engine.pop()?;
    let StackItem::Pointer { script, position } = item else {
        return Err(VmError::InvalidType {
            expected: "Pointer",
            found: item.type_name(),
        });
    };
    if !script.same_script(engine.current_context()?.script()) {
        return Err(VmError::InvalidOperand(
            "CALLA pointer addresses a different script".into(),
        ));
    }
    let frame = engine.current_context()?.clone_at(position);
    engine.load_context(frame)
}

/// `CALLT`: method tokens need contract management, which the bare engine
/// does not carry.
pub fn call_t(engine: &mut ExecutionEngine) -> VmResult<()> {
    let _ = engine;
    Err(VmError::InvalidOperand(
        "CALLT requires a loaded contract token table".into(),
    ))
}

/// `ABORT`: uncatchable fault.
pub fn abort(_engine: &mut ExecutionEngine) -> VmResult<()> {
    Err(VmError::UnhandledException("ABORT".into()))
}

/// `ASSERT`: fault unless the popped value is truthy. Not catchable.
pub fn assert(engine: &mut ExecutionEngine) -> VmResult<()> {
    if engine.pop_boolean()? {
        Ok(())
    } else {
        Err(VmError::UnhandledException("ASSERT failed".into()))
    }
}

/// `THROW`: raise the popped item as a script exception.
pub fn throw(engine: &mut ExecutionEngine) -> VmResult<()> {
    let exception = engine.pop()?;
    engine.throw(exception)
}

/// `TRY` / `TRY_L`: enter a protected region. A zero offset means the
/// corresponding block is absent; at least one must be present.
pub fn try_enter(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let (catch_offset, finally_offset) = match instruction.opcode {
        OpCode::Try => instruction.operand_try_offsets()?,
        _ => instruction.operand_try_offsets_long()?,
    };
    if catch_offset == 0 && finally_offset == 0 {
        return Err(VmError::InvalidOperand(
            "TRY with neither catch nor finally".into(),
        ));
    }
    let catch_pointer = if catch_offset == 0 {
        None
    } else {
        Some(engine.checked_target(instruction, catch_offset)?)
    };
    let finally_pointer = if finally_offset == 0 {
        None
    } else {
        Some(engine.checked_target(instruction, finally_offset)?)
    };

    let max_depth = engine.limits().max_try_nesting_depth;
    let context = engine.current_context_mut()?;
    if context.try_stack.len() >= max_depth {
        return Err(VmError::InvalidOperand("TRY nesting too deep".into()));
    }
    context
        .try_stack
        .push(TryContext::new(catch_pointer, finally_pointer));
    Ok(())
}

/// `ENDTRY` / `ENDTRY_L`: leave the try or catch block, running the
/// finally block first when one is declared.
pub fn end_try(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let offset = match instruction.opcode {
        OpCode::EndTry => instruction.operand_i8()?,
        _ => instruction.operand_i32()?,
    };
    let end_pointer = engine.checked_target(instruction, offset)?;

    let target = {
        let context = engine.current_context_mut()?;
        let try_ctx = context
            .try_stack
            .last_mut()
            .ok_or_else(|| VmError::InvalidOperand("ENDTRY outside a try region".into()))?;
        if try_ctx.state == TryState::Finally {
            return Err(VmError::InvalidOperand("ENDTRY inside finally".into()));
        }
        match try_ctx.finally_pointer {
            Some(finally_pointer) => {
                try_ctx.state = TryState::Finally;
                try_ctx.end_pointer = end_pointer;
                finally_pointer
            }
            None => {
                context.try_stack.pop();
                end_pointer
            }
        }
    };
    engine.jump_to(target)
}

/// `ENDFINALLY`: resume after the region, or continue unwinding when an
/// exception is still in flight.
pub fn end_finally(engine: &mut ExecutionEngine) -> VmResult<()> {
    let context = engine.current_context_mut()?;
    let try_ctx = context
        .try_stack
        .pop()
        .ok_or_else(|| VmError::InvalidOperand("ENDFINALLY outside a try region".into()))?;

    if engine.has_uncaught_exception() {
        engine.continue_unwinding()
    } else {
        engine.jump_to(try_ctx.end_pointer)
    }
}

/// `RET`: unload the frame, moving declared return values to the caller.
pub fn ret(engine: &mut ExecutionEngine) -> VmResult<()> {
    engine.unload_current_context()?;
    engine.set_jumping();
    Ok(())
}
