//! Type-inspection and conversion handlers.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::stack_item::{StackItem, StackItemType};
use std::cell::RefCell;
use std::rc::Rc;

/// `ISNULL`.
pub fn is_null(engine: &mut ExecutionEngine) -> VmResult<()> {
    let item = engine.pop()?;
    engine.push(StackItem::Boolean(item.is_null()))
}

/// `ISTYPE`: type test against the operand tag. `Any` is not a valid
/// operand.
pub fn is_type(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let type_byte = instruction.operand_u8()?;
    let target = StackItemType::from_byte(type_byte)
        .ok_or_else(|| VmError::InvalidOperand(format!("invalid type tag 0x{type_byte:02x}")))?;
    if target == StackItemType::Any {
        return Err(VmError::InvalidOperand("ISTYPE against Any".into()));
    }
    let item = engine.pop()?;
    engine.push(StackItem::Boolean(item.item_type() == target))
}

/// `CONVERT`: change an item's type where a conversion is defined.
pub fn convert(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    let type_byte = instruction.operand_u8()?;
    let target = StackItemType::from_byte(type_byte)
        .ok_or_else(|| VmError::InvalidOperand(format!("invalid type tag 0x{type_byte:02x}")))?;
    let item = engine.pop()?;

    if item.item_type() == target {
        return engine.push(item);
    }

    let converted = match target {
        StackItemType::Boolean => StackItem::Boolean(item.get_boolean()),
        StackItemType::Integer => {
            StackItem::Integer(item.get_integer(engine.limits().max_integer_size)?)
        }
        StackItemType::ByteString => StackItem::from_bytes(item.get_byte_array()?),
        StackItemType::Buffer => {
            StackItem::Buffer(Rc::new(RefCell::new(item.get_byte_array()?)))
        }
        StackItemType::Array => match &item {
            StackItem::Struct(items) => {
                let children: Vec<StackItem> = items.borrow().clone();
                let array = StackItem::array_of(children.clone());
                register_children(engine, &children, &array);
                array
            }
            other => {
                return Err(VmError::InvalidType {
                    expected: "Struct",
                    found: other.type_name(),
                })
            }
        },
        StackItemType::Struct => match &item {
            StackItem::Array(items) => {
                let children: Vec<StackItem> = items.borrow().clone();
                let converted = StackItem::struct_of(children.clone());
                register_children(engine, &children, &converted);
                converted
            }
            other => {
                return Err(VmError::InvalidType {
                    expected: "Array",
                    found: other.type_name(),
                })
            }
        },
        StackItemType::Any if item.is_null() => StackItem::Null,
        _ => {
            return Err(VmError::InvalidOperand(format!(
                "cannot convert {} to {target:?}",
                item.type_name()
            )))
        }
    };
    engine.push(converted)
}

fn register_children(engine: &mut ExecutionEngine, children: &[StackItem], parent: &StackItem) {
    let parent_id = parent.tracked_id().expect("parent is compound");
    let counter = engine.reference_counter().clone();
    let mut counter = counter.borrow_mut();
    for child in children {
        counter.add_reference(child, parent_id);
    }
}
