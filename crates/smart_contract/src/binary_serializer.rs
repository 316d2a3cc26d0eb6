//! The recursive value serializer behind `System.Binary.Serialize`.

use oxneo_io::{BinaryWriter, IoError, IoResult, MemoryReader};
use oxneo_vm::stack_item::{bigint_to_le, MapKey, StackItem, StackItemType};
use std::collections::HashSet;

/// Maximum nesting depth accepted when deserializing.
pub const MAX_SERIALIZE_DEPTH: usize = 16;

/// Serializes a stack item to its tagged binary form.
///
/// Interop interfaces and pointers cannot be serialized; cyclic graphs
/// fail with [`IoError::CircularReference`].
pub fn serialize(item: &StackItem, max_size: usize) -> IoResult<Vec<u8>> {
    let mut writer = BinaryWriter::new();
    let mut visiting = HashSet::new();
    serialize_into(item, &mut writer, &mut visiting)?;
    let bytes = writer.into_bytes();
    if bytes.len() > max_size {
        return Err(IoError::invalid_data(format!(
            "serialized value of {} bytes exceeds limit {max_size}",
            bytes.len()
        )));
    }
    Ok(bytes)
}

fn serialize_into(
    item: &StackItem,
    writer: &mut BinaryWriter,
    visiting: &mut HashSet<usize>,
) -> IoResult<()> {
    match item {
        StackItem::Null => writer.write_u8(StackItemType::Any as u8),
        StackItem::Boolean(value) => {
            writer.write_u8(StackItemType::Boolean as u8);
            writer.write_bool(*value);
        }
        StackItem::Integer(value) => {
            writer.write_u8(StackItemType::Integer as u8);
            writer.write_var_bytes(&bigint_to_le(value));
        }
        StackItem::ByteString(bytes) => {
            writer.write_u8(StackItemType::ByteString as u8);
            writer.write_var_bytes(bytes);
        }
        StackItem::Buffer(buffer) => {
            writer.write_u8(StackItemType::Buffer as u8);
            writer.write_var_bytes(&buffer.borrow());
        }
        StackItem::Array(_) | StackItem::Struct(_) => {
            let id = item.tracked_id().expect("compound is tracked");
            if !visiting.insert(id) {
                return Err(IoError::CircularReference);
            }
            let tag = if matches!(item, StackItem::Array(_)) {
                StackItemType::Array
            } else {
                StackItemType::Struct
            };
            writer.write_u8(tag as u8);
            let children = item.children();
            writer.write_var_int(children.len() as u64);
            for child in &children {
                serialize_into(child, writer, visiting)?;
            }
            visiting.remove(&id);
        }
        StackItem::Map(entries) => {
            let id = item.tracked_id().expect("map is tracked");
            if !visiting.insert(id) {
                return Err(IoError::CircularReference);
            }
            writer.write_u8(StackItemType::Map as u8);
            let snapshot: Vec<(MapKey, StackItem)> = entries
                .borrow()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            writer.write_var_int(snapshot.len() as u64);
            for (key, value) in &snapshot {
                serialize_into(&key.to_item(), writer, visiting)?;
                serialize_into(value, writer, visiting)?;
            }
            visiting.remove(&id);
        }
        StackItem::Pointer { .. } | StackItem::InteropInterface(_) => {
            return Err(IoError::invalid_data(format!(
                "{} cannot be serialized",
                item.type_name()
            )))
        }
    }
    Ok(())
}

/// Deserializes a tagged binary value back into a stack item.
pub fn deserialize(bytes: &[u8]) -> IoResult<StackItem> {
    let mut reader = MemoryReader::new(bytes);
    let item = deserialize_from(&mut reader, MAX_SERIALIZE_DEPTH)?;
    if reader.remaining() != 0 {
        return Err(IoError::invalid_format("trailing bytes after value"));
    }
    Ok(item)
}

fn deserialize_from(reader: &mut MemoryReader<'_>, depth: usize) -> IoResult<StackItem> {
    if depth == 0 {
        return Err(IoError::invalid_format("value nested too deeply"));
    }
    let tag = reader.read_u8()?;
    let item_type = StackItemType::from_byte(tag)
        .ok_or_else(|| IoError::invalid_format(format!("unknown value tag 0x{tag:02x}")))?;
    match item_type {
        StackItemType::Any => Ok(StackItem::Null),
        StackItemType::Boolean => Ok(StackItem::Boolean(reader.read_bool()?)),
        StackItemType::Integer => {
            let bytes = reader.read_var_bytes(32)?;
            Ok(StackItem::Integer(num_bigint::BigInt::from_signed_bytes_le(
                &bytes,
            )))
        }
        StackItemType::ByteString => {
            Ok(StackItem::from_bytes(reader.read_var_bytes(1 << 20)?))
        }
        StackItemType::Buffer => Ok(StackItem::Buffer(std::rc::Rc::new(std::cell::RefCell::new(
            reader.read_var_bytes(1 << 20)?,
        )))),
        StackItemType::Array | StackItemType::Struct => {
            let count = reader.read_var_int(2048)? as usize;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(deserialize_from(reader, depth - 1)?);
            }
            Ok(if item_type == StackItemType::Array {
                StackItem::array_of(items)
            } else {
                StackItem::struct_of(items)
            })
        }
        StackItemType::Map => {
            let count = reader.read_var_int(2048)? as usize;
            let map = StackItem::new_map();
            let StackItem::Map(entries) = &map else {
                unreachable!()
            };
            for _ in 0..count {
                let key_item = deserialize_from(reader, depth - 1)?;
                let key = MapKey::from_item(&key_item)
                    .map_err(|_| IoError::invalid_format("non-primitive map key"))?;
                let value = deserialize_from(reader, depth - 1)?;
                entries.borrow_mut().insert(key, value);
            }
            Ok(map.clone())
        }
        StackItemType::Pointer | StackItemType::InteropInterface => Err(IoError::invalid_format(
            "pointer and interop values have no binary form",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(item: &StackItem) -> StackItem {
        let bytes = serialize(item, 1 << 20).unwrap();
        deserialize(&bytes).unwrap()
    }

    #[test]
    fn primitives_round_trip() {
        assert!(round_trip(&StackItem::Null).is_null());
        assert!(round_trip(&StackItem::Boolean(true)).get_boolean());
        assert_eq!(
            round_trip(&StackItem::from_int(-42)).get_integer(32).unwrap(),
            (-42).into()
        );
        assert_eq!(
            round_trip(&StackItem::from_bytes(b"neo".to_vec()))
                .get_byte_array()
                .unwrap(),
            b"neo"
        );
    }

    #[test]
    fn nested_array_round_trips() {
        let inner = StackItem::array_of(vec![StackItem::from_int(1)]);
        let outer = StackItem::array_of(vec![inner, StackItem::from_bytes(b"x".to_vec())]);
        let copy = round_trip(&outer);
        let StackItem::Array(items) = &copy else {
            panic!("expected array");
        };
        assert_eq!(items.borrow().len(), 2);
    }

    #[test]
    fn map_round_trips() {
        let map = StackItem::new_map();
        if let StackItem::Map(entries) = &map {
            entries.borrow_mut().insert(
                MapKey::ByteString(b"k".to_vec()),
                StackItem::from_int(7),
            );
        }
        let copy = round_trip(&map);
        let StackItem::Map(entries) = &copy else {
            panic!("expected map");
        };
        assert_eq!(entries.borrow().len(), 1);
    }

    #[test]
    fn cycle_fails_with_circular_reference() {
        let array = StackItem::new_array();
        if let StackItem::Array(items) = &array {
            items.borrow_mut().push(array.clone());
        }
        assert!(matches!(
            serialize(&array, 1 << 20),
            Err(IoError::CircularReference)
        ));
        if let StackItem::Array(items) = &array {
            items.borrow_mut().clear();
        }
    }

    #[test]
    fn shared_but_acyclic_values_serialize() {
        // The same child twice is sharing, not a cycle.
        let child = StackItem::array_of(vec![StackItem::from_int(1)]);
        let parent = StackItem::array_of(vec![child.clone(), child]);
        assert!(serialize(&parent, 1 << 20).is_ok());
    }

    #[test]
    fn interop_interface_refuses_serialization() {
        let item = StackItem::InteropInterface(std::rc::Rc::new(42u32));
        assert!(serialize(&item, 1 << 20).is_err());
    }

    #[test]
    fn size_limit_enforced() {
        let item = StackItem::from_bytes(vec![0u8; 100]);
        assert!(serialize(&item, 10).is_err());
    }
}
