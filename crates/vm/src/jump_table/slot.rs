//! Slot handlers: static fields, locals and arguments.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::slot::Slot;

/// `INITSSLOT`: allocate the shared static field slot.
pub fn init_static_slot(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let count = instruction.operand_u8()? as usize;
    if count == 0 {
        return Err(VmError::InvalidOperand("INITSSLOT of zero fields".into()));
    }
    let counter = engine.reference_counter().clone();
    let context = engine.current_context()?;
    let shared = context.shared();
    if shared.static_fields.borrow().is_some() {
        return Err(VmError::InvalidOperand(
            "static fields already initialized".into(),
        ));
    }
    *shared.static_fields.borrow_mut() = Some(Slot::new(count, counter));
    Ok(())
}

/// `INITSLOT`: allocate locals and move arguments off the stack.
pub fn init_slot(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let (local_count, argument_count) = instruction.operand_two_u8()?;
    if local_count == 0 && argument_count == 0 {
        return Err(VmError::InvalidOperand("INITSLOT of zero slots".into()));
    }
    {
        let context = engine.current_context()?;
        if context.local_variables.is_some() || context.arguments.is_some() {
            return Err(VmError::InvalidOperand("slots already initialized".into()));
        }
    }
    let counter = engine.reference_counter().clone();

    let locals = if local_count > 0 {
        Some(Slot::new(local_count as usize, counter.clone()))
    } else {
        None
    };
    let arguments = if argument_count > 0 {
        let mut items = Vec::with_capacity(argument_count as usize);
        for _ in 0..argument_count {
            items.push(engine.pop()?);
        }
        Some(Slot::with_items(items, counter))
    } else {
        None
    };

    let context = engine.current_context_mut()?;
    context.local_variables = locals;
    context.arguments = arguments;
    Ok(())
}

/// `LDSFLD` family.
pub fn load_static(engine: &mut ExecutionEngine, index: usize) -> VmResult<()> {
    let item = {
        let context = engine.current_context()?;
        let fields = context.shared().static_fields.borrow();
        let slot = fields
            .as_ref()
            .ok_or_else(|| VmError::InvalidOperand("static fields not initialized".into()))?;
        slot.get(index)?
    };
    engine.push(item)
}

/// `STSFLD` family.
pub fn store_static(engine: &mut ExecutionEngine, index: usize) -> VmResult<()> {
    let item = engine.pop()?;
    let context = engine.current_context()?;
    let mut fields = context.shared().static_fields.borrow_mut();
    let slot = fields
        .as_mut()
        .ok_or_else(|| VmError::InvalidOperand("static fields not initialized".into()))?;
    slot.set(index, item)
}

/// `LDLOC` family.
pub fn load_local(engine: &mut ExecutionEngine, index: usize) -> VmResult<()> {
    let item = {
        let context = engine.current_context()?;
        let slot = context
            .local_variables
            .as_ref()
            .ok_or_else(|| VmError::InvalidOperand("locals not initialized".into()))?;
        slot.get(index)?
    };
    engine.push(item)
}

/// `STLOC` family.
pub fn store_local(engine: &mut ExecutionEngine, index: usize) -> VmResult<()> {
    let item = engine.pop()?;
    let context = engine.current_context_mut()?;
    let slot = context
        .local_variables
        .as_mut()
        .ok_or_else(|| VmError::InvalidOperand("locals not initialized".into()))?;
    slot.set(index, item)
}

/// `LDARG` family.
pub fn load_argument(engine: &mut ExecutionEngine, index: usize) -> VmResult<()> {
    let item = {
        let context = engine.current_context()?;
        let slot = context
            .arguments
            .as_ref()
            .ok_or_else(|| VmError::InvalidOperand("arguments not initialized".into()))?;
        slot.get(index)?
    };
    engine.push(item)
}

/// `STARG` family.
pub fn store_argument(engine: &mut ExecutionEngine, index: usize) -> VmResult<()> {
    let item = engine.pop()?;
    let context = engine.current_context_mut()?;
    let slot = context
        .arguments
        .as_mut()
        .ok_or_else(|| VmError::InvalidOperand("arguments not initialized".into()))?;
    slot.set(index, item)
}
