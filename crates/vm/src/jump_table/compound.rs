//! Compound-type handlers. Every mutation reports the parent→child edge
//! change to the reference counter.

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use crate::instruction::Instruction;
use crate::stack_item::{item_to_index, MapKey, StackItem, StackItemType};

/// Upper bound on explicit collection sizes.
const MAX_COLLECTION_SIZE: usize = 2048;

fn add_edge(engine: &mut ExecutionEngine, child: &StackItem, parent: &StackItem) {
    let parent_id = parent.tracked_id().expect("parent is compound");
    engine
        .reference_counter()
        .borrow_mut()
        .add_reference(child, parent_id);
}

fn remove_edge(engine: &mut ExecutionEngine, child: &StackItem, parent: &StackItem) {
    let parent_id = parent.tracked_id().expect("parent is compound");
    engine
        .reference_counter()
        .borrow_mut()
        .remove_reference(child, parent_id);
}

/// `PACKMAP`: pop `n`, then `n` key/value pairs.
pub fn pack_map(engine: &mut ExecutionEngine) -> VmResult<()> {
    let count = item_to_index(&engine.pop()?, MAX_COLLECTION_SIZE)?;
    let map = StackItem::new_map();
    for _ in 0..count {
        let key_item = engine.pop()?;
        let value = engine.pop()?;
        let key = MapKey::from_item(&key_item)?;
        let StackItem::Map(entries) = &map else {
            unreachable!()
        };
        let previous = entries.borrow_mut().insert(key, value.clone());
        if let Some(previous) = previous {
            remove_edge(engine, &previous, &map);
        } else {
            add_edge(engine, &key_item, &map);
        }
        add_edge(engine, &value, &map);
    }
    engine.push(map)
}

/// `PACKSTRUCT`.
pub fn pack_struct(engine: &mut ExecutionEngine) -> VmResult<()> {
    pack_collection(engine, true)
}

/// `PACK`.
pub fn pack(engine: &mut ExecutionEngine) -> VmResult<()> {
    pack_collection(engine, false)
}

fn pack_collection(engine: &mut ExecutionEngine, as_struct: bool) -> VmResult<()> {
    let count = item_to_index(&engine.pop()?, MAX_COLLECTION_SIZE)?;
    let collection = if as_struct {
        StackItem::new_struct()
    } else {
        StackItem::new_array()
    };
    for _ in 0..count {
        let item = engine.pop()?;
        match &collection {
            StackItem::Array(items) | StackItem::Struct(items) => {
                items.borrow_mut().push(item.clone())
            }
            _ => unreachable!(),
        }
        add_edge(engine, &item, &collection);
    }
    engine.push(collection)
}

/// `UNPACK`: push the elements (first element topmost) then the count.
pub fn unpack(engine: &mut ExecutionEngine) -> VmResult<()> {
    let collection = engine.pop()?;
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let snapshot: Vec<StackItem> = items.borrow().clone();
            for item in snapshot.iter().rev() {
                engine.push(item.clone())?;
            }
            engine.push(StackItem::from_int(snapshot.len() as i64))
        }
        StackItem::Map(entries) => {
            let snapshot: Vec<(MapKey, StackItem)> = entries
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            for (key, value) in snapshot.iter().rev() {
                engine.push(value.clone())?;
                engine.push(key.to_item())?;
            }
            engine.push(StackItem::from_int(snapshot.len() as i64))
        }
        other => Err(VmError::InvalidType {
            expected: "Array, Struct or Map",
            found: other.type_name(),
        }),
    }
}

/// `NEWARRAY0`.
pub fn new_array0(engine: &mut ExecutionEngine) -> VmResult<()> {
    engine.push(StackItem::new_array())
}

/// `NEWARRAY` / `NEWARRAY_T`: `n` nulls. The typed form validates its type
/// operand but the elements are nulls either way.
pub fn new_array(engine: &mut ExecutionEngine, instruction: &Instruction) -> VmResult<()> {
    if !instruction.operand.is_empty() {
        let type_byte = instruction.operand_u8()?;
        if StackItemType::from_byte(type_byte).is_none() {
            return Err(VmError::InvalidOperand(format!(
                "invalid element type 0x{type_byte:02x}"
            )));
        }
    }
    let count = item_to_index(&engine.pop()?, MAX_COLLECTION_SIZE)?;
    let array = StackItem::array_of(vec![StackItem::Null; count]);
    for _ in 0..count {
        add_edge(engine, &StackItem::Null, &array);
    }
    engine.push(array)
}

/// `NEWSTRUCT0`.
pub fn new_struct0(engine: &mut ExecutionEngine) -> VmResult<()> {
    engine.push(StackItem::new_struct())
}

/// `NEWSTRUCT`: `n` nulls.
pub fn new_struct(engine: &mut ExecutionEngine) -> VmResult<()> {
    let count = item_to_index(&engine.pop()?, MAX_COLLECTION_SIZE)?;
    let item = StackItem::struct_of(vec![StackItem::Null; count]);
    for _ in 0..count {
        add_edge(engine, &StackItem::Null, &item);
    }
    engine.push(item)
}

/// `NEWMAP`.
pub fn new_map(engine: &mut ExecutionEngine) -> VmResult<()> {
    engine.push(StackItem::new_map())
}

/// `SIZE`: element count of collections, byte length of primitives.
pub fn size(engine: &mut ExecutionEngine) -> VmResult<()> {
    let item = engine.pop()?;
    let size = match &item {
        StackItem::Array(items) | StackItem::Struct(items) => items.borrow().len(),
        StackItem::Map(entries) => entries.borrow().len(),
        StackItem::ByteString(bytes) => bytes.len(),
        StackItem::Buffer(buffer) => buffer.borrow().len(),
        StackItem::Boolean(_) => 1,
        StackItem::Integer(value) => crate::stack_item::bigint_to_le(value).len(),
        other => {
            return Err(VmError::InvalidType {
                expected: "sized item",
                found: other.type_name(),
            })
        }
    };
    engine.push(StackItem::from_int(size as i64))
}

/// `HASKEY`: map key presence, or index bounds for sequences.
pub fn has_key(engine: &mut ExecutionEngine) -> VmResult<()> {
    let key = engine.pop()?;
    let collection = engine.pop()?;
    let result = match &collection {
        StackItem::Map(entries) => entries.borrow().contains_key(&MapKey::from_item(&key)?),
        StackItem::Array(items) | StackItem::Struct(items) => {
            let index = item_to_index(&key, usize::MAX >> 1)?;
            index < items.borrow().len()
        }
        StackItem::ByteString(bytes) => {
            let index = item_to_index(&key, usize::MAX >> 1)?;
            index < bytes.len()
        }
        StackItem::Buffer(buffer) => {
            let index = item_to_index(&key, usize::MAX >> 1)?;
            index < buffer.borrow().len()
        }
        other => {
            return Err(VmError::InvalidType {
                expected: "collection",
                found: other.type_name(),
            })
        }
    };
    engine.push(StackItem::Boolean(result))
}

/// `KEYS`: a new array of a map's keys.
pub fn keys(engine: &mut ExecutionEngine) -> VmResult<()> {
    let item = engine.pop()?;
    let StackItem::Map(entries) = &item else {
        return Err(VmError::InvalidType {
            expected: "Map",
            found: item.type_name(),
        });
    };
    let keys: Vec<StackItem> = entries.borrow().keys().map(MapKey::to_item).collect();
    let array = StackItem::array_of(keys.clone());
    for key in &keys {
        add_edge(engine, key, &array);
    }
    engine.push(array)
}

/// `VALUES`: a new array of a map's values or a collection's items.
pub fn values(engine: &mut ExecutionEngine) -> VmResult<()> {
    let item = engine.pop()?;
    let children: Vec<StackItem> = match &item {
        StackItem::Map(entries) => entries.borrow().values().cloned().collect(),
        StackItem::Array(items) | StackItem::Struct(items) => items.borrow().clone(),
        other => {
            return Err(VmError::InvalidType {
                expected: "Array, Struct or Map",
                found: other.type_name(),
            })
        }
    };
    let array = StackItem::array_of(children.clone());
    for child in &children {
        add_edge(engine, child, &array);
    }
    engine.push(array)
}

/// `PICKITEM`: indexed or keyed element access.
pub fn pick_item(engine: &mut ExecutionEngine) -> VmResult<()> {
    let key = engine.pop()?;
    let collection = engine.pop()?;
    let result = match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let index = item_to_index(&key, usize::MAX >> 1)?;
            let items = items.borrow();
            items
                .get(index)
                .cloned()
                .ok_or_else(|| VmError::InvalidOperand(format!("index {index} out of range")))?
        }
        StackItem::Map(entries) => {
            let map_key = MapKey::from_item(&key)?;
            entries
                .borrow()
                .get(&map_key)
                .cloned()
                .ok_or_else(|| VmError::InvalidOperand("key not found".into()))?
        }
        StackItem::ByteString(bytes) => {
            let index = item_to_index(&key, usize::MAX >> 1)?;
            let byte = *bytes
                .get(index)
                .ok_or_else(|| VmError::InvalidOperand(format!("index {index} out of range")))?;
            StackItem::from_int(byte as i64)
        }
        StackItem::Buffer(buffer) => {
            let index = item_to_index(&key, usize::MAX >> 1)?;
            let bytes = buffer.borrow();
            let byte = *bytes
                .get(index)
                .ok_or_else(|| VmError::InvalidOperand(format!("index {index} out of range")))?;
            StackItem::from_int(byte as i64)
        }
        other => {
            return Err(VmError::InvalidType {
                expected: "collection",
                found: other.type_name(),
            })
        }
    };
    engine.push(result)
}

/// `APPEND`: push an item onto an array or struct. Struct values append as
/// copies, preserving value semantics.
pub fn append(engine: &mut ExecutionEngine) -> VmResult<()> {
    let item = engine.pop()?;
    let collection = engine.pop()?;
    let item = match item {
        StackItem::Struct(_) => item.deep_copy(),
        other => other,
    };
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            items.borrow_mut().push(item.clone());
        }
        other => {
            return Err(VmError::InvalidType {
                expected: "Array or Struct",
                found: other.type_name(),
            })
        }
    }
    add_edge(engine, &item, &collection);
    Ok(())
}

/// `SETITEM`: indexed or keyed element replacement.
pub fn set_item(engine: &mut ExecutionEngine) -> VmResult<()> {
    let value = engine.pop()?;
    let key = engine.pop()?;
    let collection = engine.pop()?;
    let value = match value {
        StackItem::Struct(_) => value.deep_copy(),
        other => other,
    };
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let index = item_to_index(&key, usize::MAX >> 1)?;
            let previous = {
                let mut items = items.borrow_mut();
                let slot = items.get_mut(index).ok_or_else(|| {
                    VmError::InvalidOperand(format!("index {index} out of range"))
                })?;
                std::mem::replace(slot, value.clone())
            };
            remove_edge(engine, &previous, &collection);
            add_edge(engine, &value, &collection);
        }
        StackItem::Map(entries) => {
            let map_key = MapKey::from_item(&key)?;
            let previous = entries.borrow_mut().insert(map_key, value.clone());
            match previous {
                Some(previous) => remove_edge(engine, &previous, &collection),
                None => add_edge(engine, &key, &collection),
            }
            add_edge(engine, &value, &collection);
        }
        StackItem::Buffer(buffer) => {
            let index = item_to_index(&key, usize::MAX >> 1)?;
            let byte = value
                .get_integer(engine.limits().max_integer_size)?
                .to_signed_bytes_le();
            let byte = match byte.as_slice() {
                [] => 0u8,
                [b] => *b,
                _ => {
                    return Err(VmError::InvalidOperand(
                        "buffer element must fit one byte".into(),
                    ))
                }
            };
            let mut bytes = buffer.borrow_mut();
            let slot = bytes
                .get_mut(index)
                .ok_or_else(|| VmError::InvalidOperand(format!("index {index} out of range")))?;
            *slot = byte;
        }
        other => {
            return Err(VmError::InvalidType {
                expected: "Array, Struct, Map or Buffer",
                found: other.type_name(),
            })
        }
    }
    Ok(())
}

/// `REVERSEITEMS`: reverse an array, struct or buffer in place.
pub fn reverse_items(engine: &mut ExecutionEngine) -> VmResult<()> {
    let collection = engine.pop()?;
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            items.borrow_mut().reverse();
            Ok(())
        }
        StackItem::Buffer(buffer) => {
            buffer.borrow_mut().reverse();
            Ok(())
        }
        other => Err(VmError::InvalidType {
            expected: "Array, Struct or Buffer",
            found: other.type_name(),
        }),
    }
}

/// `REMOVE`: delete by index or key.
pub fn remove(engine: &mut ExecutionEngine) -> VmResult<()> {
    let key = engine.pop()?;
    let collection = engine.pop()?;
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let index = item_to_index(&key, usize::MAX >> 1)?;
            let removed = {
                let mut items = items.borrow_mut();
                if index >= items.len() {
                    return Err(VmError::InvalidOperand(format!(
                        "index {index} out of range"
                    )));
                }
                items.remove(index)
            };
            remove_edge(engine, &removed, &collection);
        }
        StackItem::Map(entries) => {
            let map_key = MapKey::from_item(&key)?;
            let removed = entries.borrow_mut().remove(&map_key);
            if let Some(removed) = removed {
                remove_edge(engine, &key, &collection);
                remove_edge(engine, &removed, &collection);
            }
        }
        other => {
            return Err(VmError::InvalidType {
                expected: "Array, Struct or Map",
                found: other.type_name(),
            })
        }
    }
    Ok(())
}

/// `CLEARITEMS`: empty a collection.
pub fn clear_items(engine: &mut ExecutionEngine) -> VmResult<()> {
    let collection = engine.pop()?;
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let drained: Vec<StackItem> = items.borrow_mut().drain(..).collect();
            for item in drained {
                remove_edge(engine, &item, &collection);
            }
        }
        StackItem::Map(entries) => {
            let drained: Vec<(MapKey, StackItem)> = {
                let mut entries = entries.borrow_mut();
                let out = entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                entries.clear();
                out
            };
            for (key, value) in drained {
                remove_edge(engine, &key.to_item(), &collection);
                remove_edge(engine, &value, &collection);
            }
        }
        other => {
            return Err(VmError::InvalidType {
                expected: "Array, Struct or Map",
                found: other.type_name(),
            })
        }
    }
    Ok(())
}

/// `POPITEM`: remove and push the last element of an array or struct.
pub fn pop_item(engine: &mut ExecutionEngine) -> VmResult<()> {
    let collection = engine.pop()?;
    match &collection {
        StackItem::Array(items) | StackItem::Struct(items) => {
            let removed = items
                .borrow_mut()
                .pop()
                .ok_or_else(|| VmError::InvalidOperand("POPITEM from empty collection".into()))?;
            remove_edge(engine, &removed, &collection);
            engine.push(removed)
        }
        other => Err(VmError::InvalidType {
            expected: "Array or Struct",
            found: other.type_name(),
        }),
    }
}
