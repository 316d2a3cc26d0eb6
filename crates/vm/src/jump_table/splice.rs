//! Byte-splicing handlers. These charge a per-byte price on top of the
//! opcode's base price.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::gas_table::PRICE_PER_BYTE;
use crate::stack_item::{item_to_index, StackItem};

/// `NEWBUFFER`: allocate a zeroed buffer of the popped size.
pub fn new_buffer(engine: &mut ExecutionEngine) -> VmResult<()> {
    let size = item_to_index(&engine.pop()?, engine.limits().max_item_size)?;
    engine.add_gas(size as i64 * PRICE_PER_BYTE)?;
    engine.push(StackItem::new_buffer(size))
}

/// `MEMCPY`: copy `count` bytes from a source into a buffer.
///
/// Stack (top first): count, source index, source, destination index,
/// destination buffer.
pub fn memcpy(engine: &mut ExecutionEngine) -> VmResult<()> {
    let count = item_to_index(&engine.pop()?, engine.limits().max_item_size)?;
    engine.add_gas(count as i64 * PRICE_PER_BYTE)?;
    let src_index = item_to_index(&engine.pop()?, engine.limits().max_item_size)?;
    let source = engine.pop_bytes()?;
    let dst_index = item_to_index(&engine.pop()?, engine.limits().max_item_size)?;
    let destination = engine.pop()?;

    if src_index + count > source.len() {
        return Err(VmError::InvalidOperand("MEMCPY source out of range".into()));
    }
    let StackItem::Buffer(buffer) = destination else {
        return Err(VmError::InvalidType {
            expected: "Buffer",
            found: destination.type_name(),
        });
    };
    let mut bytes = buffer.borrow_mut();
    if dst_index + count > bytes.len() {
        return Err(VmError::InvalidOperand(
            "MEMCPY destination out of range".into(),
        ));
    }
    bytes[dst_index..dst_index + count].copy_from_slice(&source[src_index..src_index + count]);
    Ok(())
}

/// `CAT`: concatenate two byte sequences into a new buffer.
pub fn cat(engine: &mut ExecutionEngine) -> VmResult<()> {
    let b = engine.pop_bytes()?;
    let a = engine.pop_bytes()?;
    let size = a.len() + b.len();
    if size > engine.limits().max_item_size {
        return Err(VmError::ItemTooLarge {
            size,
            limit: engine.limits().max_item_size,
        });
    }
    engine.add_gas(size as i64 * PRICE_PER_BYTE)?;
    let mut result = a;
    result.extend_from_slice(&b);
    engine.push(StackItem::Buffer(std::rc::Rc::new(std::cell::RefCell::new(
        result,
    ))))
}

/// `SUBSTR`: stack (top first): count, index, source.
pub fn substr(engine: &mut ExecutionEngine) -> VmResult<()> {
    let count = item_to_index(&engine.pop()?, engine.limits().max_item_size)?;
    engine.add_gas(count as i64 * PRICE_PER_BYTE)?;
    let index = item_to_index(&engine.pop()?, engine.limits().max_item_size)?;
    let source = engine.pop_bytes()?;
    if index + count > source.len() {
        return Err(VmError::InvalidOperand("SUBSTR out of range".into()));
    }
    let slice = source[index..index + count].to_vec();
    engine.push(StackItem::Buffer(std::rc::Rc::new(std::cell::RefCell::new(
        slice,
    ))))
}

/// `LEFT`: the first `count` bytes.
pub fn left(engine: &mut ExecutionEngine) -> VmResult<()> {
    let count = item_to_index(&engine.pop()?, engine.limits().max_item_size)?;
    engine.add_gas(count as i64 * PRICE_PER_BYTE)?;
    let source = engine.pop_bytes()?;
    if count > source.len() {
        return Err(VmError::InvalidOperand("LEFT out of range".into()));
    }
    let slice = source[..count].to_vec();
    engine.push(StackItem::Buffer(std::rc::Rc::new(std::cell::RefCell::new(
        slice,
    ))))
}

/// `RIGHT`: the last `count` bytes.
pub fn right(engine: &mut ExecutionEngine) -> VmResult<()> {
    let count = item_to_index(&engine.pop()?, engine.limits().max_item_size)?;
    engine.add_gas(count as i64 * PRICE_PER_BYTE)?;
    let source = engine.pop_bytes()?;
    if count > source.len() {
        return Err(VmError::InvalidOperand("RIGHT out of range".into()));
    }
    let slice = source[source.len() - count..].to_vec();
    engine.push(StackItem::Buffer(std::rc::Rc::new(std::cell::RefCell::new(
        slice,
    ))))
}
