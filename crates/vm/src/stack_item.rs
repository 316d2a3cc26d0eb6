//! Sum-typed values manipulated by the engine.
//!
//! Compound variants (`Array`, `Struct`, `Map`, `Buffer`) are shared
//! handles: cloning a [`StackItem`] clones the handle, not the contents,
//! and identity is the handle's address. The reference counter tracks
//! liveness of these shared payloads.

use crate::error::{VmError, VmResult};
use crate::script::Script;
use num_bigint::BigInt;
use num_traits::{Signed, ToPrimitive, Zero};
use std::any::Any;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

/// Default bound on integer width, in bytes of magnitude.
pub const MAX_INTEGER_SIZE: usize = 32;
/// Depth limit for structural `Struct` comparison and cloning.
pub const MAX_COMPARABLE_DEPTH: usize = 64;

/// Wire/type tags, as used by `ISTYPE`, `CONVERT` and the value serializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum StackItemType {
    Any = 0x00,
    Pointer = 0x10,
    Boolean = 0x20,
    Integer = 0x21,
    ByteString = 0x28,
    Buffer = 0x30,
    Array = 0x40,
    Struct = 0x41,
    Map = 0x48,
    InteropInterface = 0x60,
}

impl StackItemType {
    /// Decodes a type byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Self::Any),
            0x10 => Some(Self::Pointer),
            0x20 => Some(Self::Boolean),
            0x21 => Some(Self::Integer),
            0x28 => Some(Self::ByteString),
            0x30 => Some(Self::Buffer),
            0x40 => Some(Self::Array),
            0x41 => Some(Self::Struct),
            0x48 => Some(Self::Map),
            0x60 => Some(Self::InteropInterface),
            _ => None,
        }
    }

    /// Whether items of this type hold other items.
    pub fn is_compound(&self) -> bool {
        matches!(self, Self::Array | Self::Struct | Self::Map)
    }

    /// Whether this is a primitive value type.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::Boolean | Self::Integer | Self::ByteString)
    }
}

/// A key of a `Map` item: primitives only, ordered for deterministic
/// iteration.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MapKey {
    Boolean(bool),
    Integer(BigInt),
    ByteString(Vec<u8>),
}

impl MapKey {
    /// Converts a primitive stack item into a map key.
    pub fn from_item(item: &StackItem) -> VmResult<Self> {
        match item {
            StackItem::Boolean(b) => Ok(MapKey::Boolean(*b)),
            StackItem::Integer(i) => Ok(MapKey::Integer(i.clone())),
            StackItem::ByteString(bytes) => Ok(MapKey::ByteString(bytes.to_vec())),
            other => Err(VmError::InvalidType {
                expected: "primitive map key",
                found: other.type_name(),
            }),
        }
    }

    /// Converts the key back into a stack item.
    pub fn to_item(&self) -> StackItem {
        match self {
            MapKey::Boolean(b) => StackItem::Boolean(*b),
            MapKey::Integer(i) => StackItem::Integer(i.clone()),
            MapKey::ByteString(bytes) => StackItem::ByteString(bytes.clone().into()),
        }
    }
}

/// A value on the evaluation stack.
#[derive(Debug, Clone)]
pub enum StackItem {
    /// The absence of a value.
    Null,
    /// A boolean.
    Boolean(bool),
    /// An arbitrary-precision integer, bounded by [`MAX_INTEGER_SIZE`].
    Integer(BigInt),
    /// Immutable bytes.
    ByteString(Rc<Vec<u8>>),
    /// Mutable bytes with shared identity.
    Buffer(Rc<RefCell<Vec<u8>>>),
    /// An ordered collection with reference semantics.
    Array(Rc<RefCell<Vec<StackItem>>>),
    /// An ordered collection with value semantics on comparison.
    Struct(Rc<RefCell<Vec<StackItem>>>),
    /// Primitive-keyed dictionary.
    Map(Rc<RefCell<BTreeMap<MapKey, StackItem>>>),
    /// An instruction address within a script.
    Pointer { script: Script, position: usize },
    /// An opaque host handle; cannot be serialized.
    InteropInterface(Rc<dyn Any>),
}

impl StackItem {
    /// A shared null singleton.
    pub fn null() -> Self {
        StackItem::Null
    }

    /// Wraps an integer-convertible value.
    pub fn from_int(value: impl Into<BigInt>) -> Self {
        StackItem::Integer(value.into())
    }

    /// Wraps bytes as an immutable byte string.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        StackItem::ByteString(Rc::new(bytes.into()))
    }

    /// Creates an empty array.
    pub fn new_array() -> Self {
        StackItem::Array(Rc::new(RefCell::new(Vec::new())))
    }

    /// Creates an array from items.
    pub fn array_of(items: Vec<StackItem>) -> Self {
        StackItem::Array(Rc::new(RefCell::new(items)))
    }

    /// Creates an empty struct.
    pub fn new_struct() -> Self {
        StackItem::Struct(Rc::new(RefCell::new(Vec::new())))
    }

    /// Creates a struct from items.
    pub fn struct_of(items: Vec<StackItem>) -> Self {
        StackItem::Struct(Rc::new(RefCell::new(items)))
    }

    /// Creates an empty map.
    pub fn new_map() -> Self {
        StackItem::Map(Rc::new(RefCell::new(BTreeMap::new())))
    }

    /// Creates a buffer of `size` zero bytes.
    pub fn new_buffer(size: usize) -> Self {
        StackItem::Buffer(Rc::new(RefCell::new(vec![0u8; size])))
    }

    /// The item's type tag.
    pub fn item_type(&self) -> StackItemType {
        match self {
            StackItem::Null => StackItemType::Any,
            StackItem::Boolean(_) => StackItemType::Boolean,
            StackItem::Integer(_) => StackItemType::Integer,
            StackItem::ByteString(_) => StackItemType::ByteString,
            StackItem::Buffer(_) => StackItemType::Buffer,
            StackItem::Array(_) => StackItemType::Array,
            StackItem::Struct(_) => StackItemType::Struct,
            StackItem::Map(_) => StackItemType::Map,
            StackItem::Pointer { .. } => StackItemType::Pointer,
            StackItem::InteropInterface(_) => StackItemType::InteropInterface,
        }
    }

    /// Human-readable type name, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            StackItem::Null => "Null",
            StackItem::Boolean(_) => "Boolean",
            StackItem::Integer(_) => "Integer",
            StackItem::ByteString(_) => "ByteString",
            StackItem::Buffer(_) => "Buffer",
            StackItem::Array(_) => "Array",
            StackItem::Struct(_) => "Struct",
            StackItem::Map(_) => "Map",
            StackItem::Pointer { .. } => "Pointer",
            StackItem::InteropInterface(_) => "InteropInterface",
        }
    }

    /// Identity of the shared payload, for items the reference counter
    /// tracks. Primitives have no identity.
    pub fn tracked_id(&self) -> Option<usize> {
        match self {
            StackItem::Buffer(rc) => Some(Rc::as_ptr(rc) as *const u8 as usize),
            StackItem::Array(rc) | StackItem::Struct(rc) => {
                Some(Rc::as_ptr(rc) as *const u8 as usize)
            }
            StackItem::Map(rc) => Some(Rc::as_ptr(rc) as *const u8 as usize),
            _ => None,
        }
    }

    /// Child items of a compound, in deterministic order. Buffers and
    /// primitives have none; map keys are primitives and excluded.
    pub fn children(&self) -> Vec<StackItem> {
        match self {
            StackItem::Array(items) | StackItem::Struct(items) => items.borrow().clone(),
            StackItem::Map(entries) => entries.borrow().values().cloned().collect(),
            _ => Vec::new(),
        }
    }

    /// Truthiness, per protocol conversion rules.
    pub fn get_boolean(&self) -> bool {
        match self {
            StackItem::Null => false,
            StackItem::Boolean(b) => *b,
            StackItem::Integer(i) => !i.is_zero(),
            StackItem::ByteString(bytes) => bytes.iter().any(|&b| b != 0),
            // Every other variant is truthy by existence.
            _ => true,
        }
    }

    /// Numeric value, bounded to `max_size` bytes of magnitude.
    ///
    /// Byte strings and buffers decode as little-endian two's complement.
    pub fn get_integer(&self, max_size: usize) -> VmResult<BigInt> {
        let value = match self {
            StackItem::Boolean(b) => BigInt::from(u8::from(*b)),
            StackItem::Integer(i) => i.clone(),
            StackItem::ByteString(bytes) => {
                if bytes.len() > max_size {
                    return Err(VmError::IntegerOverflow(bytes.len()));
                }
                bigint_from_le(bytes)
            }
            StackItem::Buffer(buffer) => {
                let bytes = buffer.borrow();
                if bytes.len() > max_size {
                    return Err(VmError::IntegerOverflow(bytes.len()));
                }
                bigint_from_le(&bytes)
            }
            other => {
                return Err(VmError::InvalidType {
                    expected: "integer-convertible item",
                    found: other.type_name(),
                })
            }
        };
        check_integer(&value, max_size)?;
        Ok(value)
    }

    /// Raw bytes of a primitive or buffer item.
    pub fn get_byte_array(&self) -> VmResult<Vec<u8>> {
        match self {
            StackItem::Boolean(b) => Ok(if *b { vec![1] } else { vec![0] }),
            StackItem::Integer(i) => Ok(bigint_to_le(i)),
            StackItem::ByteString(bytes) => Ok(bytes.to_vec()),
            StackItem::Buffer(buffer) => Ok(buffer.borrow().clone()),
            other => Err(VmError::InvalidType {
                expected: "byte-convertible item",
                found: other.type_name(),
            }),
        }
    }

    /// Whether this item is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, StackItem::Null)
    }

    /// Equality per protocol rules: reference equality for arrays and maps,
    /// structural (depth-limited) equality for structs, value equality for
    /// primitives.
    pub fn equals(&self, other: &StackItem) -> VmResult<bool> {
        self.equals_with_depth(other, MAX_COMPARABLE_DEPTH)
    }

    fn equals_with_depth(&self, other: &StackItem, depth: usize) -> VmResult<bool> {
        if depth == 0 {
            return Err(VmError::InvalidOperand(
                "struct comparison exceeds depth limit".into(),
            ));
        }
        match (self, other) {
            (StackItem::Null, StackItem::Null) => Ok(true),
            (StackItem::Boolean(a), StackItem::Boolean(b)) => Ok(a == b),
            (StackItem::Integer(a), StackItem::Integer(b)) => Ok(a == b),
            // Primitive cross-type comparison is by byte content.
            (a, b) if a.item_type().is_primitive() && b.item_type().is_primitive() => {
                Ok(a.get_byte_array()? == b.get_byte_array()?)
            }
            (StackItem::Buffer(a), StackItem::Buffer(b)) => Ok(Rc::ptr_eq(a, b)),
            (StackItem::Array(a), StackItem::Array(b)) => Ok(Rc::ptr_eq(a, b)),
            (StackItem::Map(a), StackItem::Map(b)) => Ok(Rc::ptr_eq(a, b)),
            (StackItem::Struct(a), StackItem::Struct(b)) => {
                if Rc::ptr_eq(a, b) {
                    return Ok(true);
                }
                let left = a.borrow();
                let right = b.borrow();
                if left.len() != right.len() {
                    return Ok(false);
                }
                for (x, y) in left.iter().zip(right.iter()) {
                    if !x.equals_with_depth(y, depth - 1)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            (
                StackItem::Pointer {
                    script: sa,
                    position: pa,
                },
                StackItem::Pointer {
                    script: sb,
                    position: pb,
                },
            ) => Ok(sa.same_script(sb) && pa == pb),
            (StackItem::InteropInterface(a), StackItem::InteropInterface(b)) => {
                Ok(Rc::ptr_eq(a, b))
            }
            _ => Ok(false),
        }
    }

    /// Recursive copy with a cycle map: each shared payload is copied once
    /// and re-used at every occurrence, so cyclic graphs copy correctly.
    pub fn deep_copy(&self) -> StackItem {
        let mut seen: HashMap<usize, StackItem> = HashMap::new();
        self.deep_copy_with(&mut seen)
    }

    fn deep_copy_with(&self, seen: &mut HashMap<usize, StackItem>) -> StackItem {
        if let Some(id) = self.tracked_id() {
            if let Some(copy) = seen.get(&id) {
                return copy.clone();
            }
        }
        match self {
            StackItem::Buffer(buffer) => {
                let copy = StackItem::Buffer(Rc::new(RefCell::new(buffer.borrow().clone())));
                seen.insert(self.tracked_id().expect("buffer is tracked"), copy.clone());
                copy
            }
            StackItem::Array(items) => {
                let target = Rc::new(RefCell::new(Vec::new()));
                let copy = StackItem::Array(target.clone());
                seen.insert(self.tracked_id().expect("array is tracked"), copy.clone());
                let children: Vec<StackItem> = items.borrow().clone();
                for child in children {
                    target.borrow_mut().push(child.deep_copy_with(seen));
                }
                copy
            }
            StackItem::Struct(items) => {
                let target = Rc::new(RefCell::new(Vec::new()));
                let copy = StackItem::Struct(target.clone());
                seen.insert(self.tracked_id().expect("struct is tracked"), copy.clone());
                let children: Vec<StackItem> = items.borrow().clone();
                for child in children {
                    target.borrow_mut().push(child.deep_copy_with(seen));
                }
                copy
            }
            StackItem::Map(entries) => {
                let target = Rc::new(RefCell::new(BTreeMap::new()));
                let copy = StackItem::Map(target.clone());
                seen.insert(self.tracked_id().expect("map is tracked"), copy.clone());
                let snapshot: Vec<(MapKey, StackItem)> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                for (key, value) in snapshot {
                    target.borrow_mut().insert(key, value.deep_copy_with(seen));
                }
                copy
            }
            other => other.clone(),
        }
    }
}

/// Rejects integers whose two's complement encoding needs more than
/// `max_size` bytes.
pub fn check_integer(value: &BigInt, max_size: usize) -> VmResult<()> {
    if value.is_zero() {
        return Ok(());
    }
    let bytes = value.to_signed_bytes_le().len();
    if bytes > max_size {
        return Err(VmError::IntegerOverflow(bytes));
    }
    Ok(())
}

/// Decodes little-endian two's complement bytes.
pub fn bigint_from_le(bytes: &[u8]) -> BigInt {
    if bytes.is_empty() {
        return BigInt::zero();
    }
    BigInt::from_signed_bytes_le(bytes)
}

/// Encodes to little-endian two's complement, minimal length; zero encodes
/// as the empty string.
pub fn bigint_to_le(value: &BigInt) -> Vec<u8> {
    if value.is_zero() {
        return Vec::new();
    }
    value.to_signed_bytes_le()
}

impl From<bool> for StackItem {
    fn from(value: bool) -> Self {
        StackItem::Boolean(value)
    }
}

impl From<BigInt> for StackItem {
    fn from(value: BigInt) -> Self {
        StackItem::Integer(value)
    }
}

impl From<i64> for StackItem {
    fn from(value: i64) -> Self {
        StackItem::Integer(BigInt::from(value))
    }
}

impl From<Vec<u8>> for StackItem {
    fn from(value: Vec<u8>) -> Self {
        StackItem::from_bytes(value)
    }
}

/// Converts an integer item to `usize` for use as an index or count.
pub fn item_to_index(item: &StackItem, max: usize) -> VmResult<usize> {
    let value = item.get_integer(MAX_INTEGER_SIZE)?;
    if value.is_negative() {
        return Err(VmError::InvalidOperand(format!("negative index {value}")));
    }
    let index = value
        .to_usize()
        .ok_or_else(|| VmError::InvalidOperand(format!("index {value} out of range")))?;
    if index > max {
        return Err(VmError::InvalidOperand(format!(
            "index {index} exceeds limit {max}"
        )));
    }
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_conversions() {
        assert!(!StackItem::Null.get_boolean());
        assert!(StackItem::from_int(5).get_boolean());
        assert!(!StackItem::from_int(0).get_boolean());
        assert!(!StackItem::from_bytes(vec![0, 0]).get_boolean());
        assert!(StackItem::from_bytes(vec![0, 1]).get_boolean());
        assert!(StackItem::new_array().get_boolean());
    }

    #[test]
    fn integer_round_trip_through_bytes() {
        for value in [0i64, 1, -1, 127, 128, -128, 255, 256, i64::MAX, i64::MIN] {
            let item = StackItem::from_bytes(bigint_to_le(&BigInt::from(value)));
            assert_eq!(
                item.get_integer(MAX_INTEGER_SIZE).unwrap(),
                BigInt::from(value),
                "value {value}"
            );
        }
    }

    #[test]
    fn oversized_integer_rejected() {
        let item = StackItem::from_bytes(vec![0xffu8; 33]);
        assert!(matches!(
            item.get_integer(32),
            Err(VmError::IntegerOverflow(_))
        ));
    }

    #[test]
    fn array_equality_is_by_reference() {
        let a = StackItem::array_of(vec![StackItem::from_int(1)]);
        let b = StackItem::array_of(vec![StackItem::from_int(1)]);
        assert!(!a.equals(&b).unwrap());
        assert!(a.equals(&a.clone()).unwrap());
    }

    #[test]
    fn struct_equality_is_structural() {
        let a = StackItem::struct_of(vec![StackItem::from_int(1), StackItem::from_bytes(b"x".to_vec())]);
        let b = StackItem::struct_of(vec![StackItem::from_int(1), StackItem::from_bytes(b"x".to_vec())]);
        assert!(a.equals(&b).unwrap());
        let c = StackItem::struct_of(vec![StackItem::from_int(2)]);
        assert!(!a.equals(&c).unwrap());
    }

    #[test]
    fn primitive_cross_type_equality_is_by_bytes() {
        let int_one = StackItem::from_int(1);
        let bytes_one = StackItem::from_bytes(vec![1u8]);
        assert!(int_one.equals(&bytes_one).unwrap());
    }

    #[test]
    fn deep_copy_preserves_cycles() {
        let array = StackItem::new_array();
        if let StackItem::Array(items) = &array {
            items.borrow_mut().push(array.clone());
        }
        let copy = array.deep_copy();
        let StackItem::Array(copied) = &copy else {
            panic!("expected array");
        };
        // The copy's single element must be the copy itself, not the
        // original.
        let inner = copied.borrow()[0].clone();
        assert_eq!(inner.tracked_id(), copy.tracked_id());
        assert_ne!(copy.tracked_id(), array.tracked_id());
        // Break the cycles so the test does not leak.
        if let StackItem::Array(items) = &array {
            items.borrow_mut().clear();
        }
        copied.borrow_mut().clear();
    }

    #[test]
    fn map_keys_are_ordered() {
        let map = StackItem::new_map();
        if let StackItem::Map(entries) = &map {
            entries
                .borrow_mut()
                .insert(MapKey::Integer(BigInt::from(2)), StackItem::Null);
            entries
                .borrow_mut()
                .insert(MapKey::Integer(BigInt::from(1)), StackItem::Null);
            let keys: Vec<MapKey> = entries.borrow().keys().cloned().collect();
            assert_eq!(
                keys,
                vec![
                    MapKey::Integer(BigInt::from(1)),
                    MapKey::Integer(BigInt::from(2))
                ]
            );
        }
    }
}
