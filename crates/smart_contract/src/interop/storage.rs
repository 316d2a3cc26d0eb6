//! `System.Storage.*` and the iterator services.

use crate::application_engine::HostContext;
use oxneo_persistence::layout;
use oxneo_persistence::{StorageItem, StorageKey, StoreView};
use oxneo_vm::{ExecutionEngine, StackItem, VmError, VmResult};
use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

/// Maximum storage key length.
pub const MAX_STORAGE_KEY_SIZE: usize = 64;
/// Maximum storage value length.
pub const MAX_STORAGE_VALUE_SIZE: usize = 65_535;

/// The handle `System.Storage.GetContext` returns, carried as an interop
/// interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageContext {
    /// Contract id owning the space.
    pub id: i32,
    /// Whether writes are rejected.
    pub read_only: bool,
}

/// The handle `System.Storage.Find` returns.
pub struct FindIterator {
    entries: Vec<(StorageKey, StorageItem)>,
    /// `None` before the first `Next`.
    position: Option<usize>,
}

fn current_contract_id(host: &HostContext) -> VmResult<i32> {
    let script_hash = host
        .current_script_hash()
        .ok_or_else(|| VmError::InteropFailure("no executing script".into()))?;
    // Native contracts have fixed ids; deployed contracts carry theirs in
    // their persisted state.
    if let Some(native_id) = crate::native::native_id_by_hash(&script_hash) {
        return Ok(native_id);
    }
    let raw = host
        .snapshot
        .try_get(&layout::contract_key(&script_hash))
        .ok_or_else(|| {
            VmError::InteropFailure(format!("script {script_hash} is not a deployed contract"))
        })?;
    use oxneo_io::Serializable;
    let state = crate::contract_state::ContractState::from_bytes(&raw)
        .map_err(|e| VmError::InteropFailure(format!("corrupt contract state: {e}")))?;
    Ok(state.id)
}

fn push_context(
    host: &mut HostContext,
    engine: &mut ExecutionEngine,
    read_only: bool,
) -> VmResult<()> {
    let id = current_contract_id(host)?;
    let context = StorageContext { id, read_only };
    engine.push(StackItem::InteropInterface(Rc::new(context)))
}

fn pop_context(engine: &mut ExecutionEngine) -> VmResult<StorageContext> {
    let item = engine.pop()?;
    let StackItem::InteropInterface(handle) = &item else {
        return Err(VmError::InvalidType {
            expected: "StorageContext",
            found: item.type_name(),
        });
    };
    let handle: &dyn Any = handle.as_ref();
    handle
        .downcast_ref::<StorageContext>()
        .copied()
        .ok_or_else(|| VmError::InteropFailure("not a storage context".into()))
}

pub fn get_context(host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    push_context(host, engine, false)
}

pub fn get_read_only_context(host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    push_context(host, engine, true)
}

pub fn as_read_only(_host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let mut context = pop_context(engine)?;
    context.read_only = true;
    engine.push(StackItem::InteropInterface(Rc::new(context)))
}

pub fn get(host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let context = pop_context(engine)?;
    let key = engine.pop_bytes()?;
    let storage_key = StorageKey::new(context.id, key);
    match host.snapshot.get_storage(&storage_key) {
        Some(item) => engine.push(StackItem::from_bytes(item.value)),
        None => engine.push(StackItem::Null),
    }
}

pub fn put(host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let context = pop_context(engine)?;
    if context.read_only {
        return Err(VmError::InteropFailure("storage context is read-only".into()));
    }
    if !host.trigger.allows_writes() {
        return Err(VmError::InteropFailure(
            "verification scripts cannot write storage".into(),
        ));
    }
    let key = engine.pop_bytes()?;
    if key.len() > MAX_STORAGE_KEY_SIZE {
        return Err(VmError::InteropFailure("storage key too long".into()));
    }
    let value = engine.pop_bytes()?;
    if value.len() > MAX_STORAGE_VALUE_SIZE {
        return Err(VmError::InteropFailure("storage value too long".into()));
    }
    // Byte-proportional pricing for writes.
    engine.add_gas((key.len() + value.len()) as i64 * 1024)?;
    let storage_key = StorageKey::new(context.id, key);
    host.snapshot.put_storage(&storage_key, &StorageItem::new(value));
    Ok(())
}

pub fn delete(host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let context = pop_context(engine)?;
    if context.read_only {
        return Err(VmError::InteropFailure("storage context is read-only".into()));
    }
    if !host.trigger.allows_writes() {
        return Err(VmError::InteropFailure(
            "verification scripts cannot write storage".into(),
        ));
    }
    let key = engine.pop_bytes()?;
    let storage_key = StorageKey::new(context.id, key);
    host.snapshot.delete_storage(&storage_key);
    Ok(())
}

pub fn find(host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let context = pop_context(engine)?;
    let prefix = engine.pop_bytes()?;
    let entries = host.snapshot.find_storage(context.id, &prefix);
    let iterator = FindIterator {
        entries,
        position: None,
    };
    engine.push(StackItem::InteropInterface(Rc::new(RefCell::new(iterator))))
}

fn pop_iterator(engine: &mut ExecutionEngine) -> VmResult<Rc<RefCell<FindIterator>>> {
    let item = engine.pop()?;
    let StackItem::InteropInterface(handle) = &item else {
        return Err(VmError::InvalidType {
            expected: "Iterator",
            found: item.type_name(),
        });
    };
    let any_rc: Rc<dyn Any> = handle.clone();
    any_rc
        .downcast::<RefCell<FindIterator>>()
        .map_err(|_| VmError::InteropFailure("not a storage iterator".into()))
}

pub fn iterator_next(_host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let iterator = pop_iterator(engine)?;
    let mut iterator = iterator.borrow_mut();
    let next = iterator.position.map(|p| p + 1).unwrap_or(0);
    let has_next = next < iterator.entries.len();
    if has_next {
        iterator.position = Some(next);
    }
    engine.push(StackItem::Boolean(has_next))
}

pub fn iterator_value(_host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let iterator = pop_iterator(engine)?;
    let iterator = iterator.borrow();
    let position = iterator
        .position
        .ok_or_else(|| VmError::InteropFailure("iterator before first element".into()))?;
    let (key, value) = iterator
        .entries
        .get(position)
        .ok_or_else(|| VmError::InteropFailure("iterator out of range".into()))?;
    engine.push(StackItem::struct_of(vec![
        StackItem::from_bytes(key.key.clone()),
        StackItem::from_bytes(value.value.clone()),
    ]))
}
