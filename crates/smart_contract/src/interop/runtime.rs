//! `System.Runtime.*` services.

use crate::application_engine::HostContext;
use crate::binary_serializer;
use crate::notification::NotifyEventArgs;
use oxneo_core::UInt160;
use oxneo_vm::{ExecutionEngine, StackItem, VmError, VmResult};

/// Maximum notification event name length.
const MAX_EVENT_NAME: usize = 32;
/// Maximum serialized notification state size.
const MAX_NOTIFICATION_SIZE: usize = 1024;
/// Maximum log message length.
const MAX_LOG_LENGTH: usize = 1024;

pub fn platform(_host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    engine.push(StackItem::from_bytes(b"NEO".to_vec()))
}

pub fn get_network(host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    engine.push(StackItem::from_int(host.network_magic as i64))
}

pub fn get_trigger(host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    engine.push(StackItem::from_int(host.trigger as u8 as i64))
}

pub fn get_time(host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    engine.push(StackItem::from_int(host.timestamp as i64))
}

/// Pushes the container's hash, or null when the engine runs detached.
pub fn get_script_container(host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    match host.container.hash() {
        Some(hash) => engine.push(StackItem::from_bytes(hash.as_bytes().to_vec())),
        None => engine.push(StackItem::Null),
    }
}

pub fn get_executing_script_hash(
    host: &mut HostContext,
    engine: &mut ExecutionEngine,
) -> VmResult<()> {
    push_hash(engine, host.current_script_hash())
}

pub fn get_calling_script_hash(
    host: &mut HostContext,
    engine: &mut ExecutionEngine,
) -> VmResult<()> {
    push_hash(engine, host.calling_script_hash())
}

pub fn get_entry_script_hash(host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    push_hash(engine, host.entry_script_hash())
}

fn push_hash(engine: &mut ExecutionEngine, hash: Option<UInt160>) -> VmResult<()> {
    match hash {
        Some(hash) => engine.push(StackItem::from_bytes(hash.as_bytes().to_vec())),
        None => engine.push(StackItem::Null),
    }
}

pub fn check_witness(host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let bytes = engine.pop_bytes()?;
    let hash = UInt160::from_slice(&bytes)
        .map_err(|_| VmError::InteropFailure("CheckWitness expects a 160-bit hash".into()))?;
    let result = host.check_witness(&hash);
    engine.push(StackItem::Boolean(result))
}

pub fn get_invocation_counter(
    _host: &mut HostContext,
    engine: &mut ExecutionEngine,
) -> VmResult<()> {
    // One invocation per engine in this node; per-script counters would
    // need cross-call bookkeeping nothing here consumes.
    engine.push(StackItem::from_int(1))
}

pub fn log(host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let bytes = engine.pop_bytes()?;
    if bytes.len() > MAX_LOG_LENGTH {
        return Err(VmError::InteropFailure("log message too long".into()));
    }
    let message = String::from_utf8_lossy(&bytes);
    let contract = host.current_script_hash().unwrap_or_default();
    tracing::info!(target: "contract", %contract, %message, "runtime log");
    Ok(())
}

pub fn notify(host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let name_bytes = engine.pop_bytes()?;
    if name_bytes.len() > MAX_EVENT_NAME {
        return Err(VmError::InteropFailure("event name too long".into()));
    }
    let event_name = String::from_utf8(name_bytes)
        .map_err(|_| VmError::InteropFailure("event name is not utf-8".into()))?;
    let state = engine.pop()?;
    let serialized =
        binary_serializer::serialize(&state, MAX_NOTIFICATION_SIZE).unwrap_or_default();
    host.notifications.push(NotifyEventArgs {
        contract: host.current_script_hash().unwrap_or_default(),
        event_name,
        state: serialized,
    });
    Ok(())
}

pub fn gas_left(_host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let remaining = engine.gas_limit().saturating_sub(engine.gas_consumed());
    engine.push(StackItem::from_int(remaining))
}

pub fn burn_gas(_host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let amount = engine.pop_integer()?;
    let amount = i64::try_from(amount)
        .map_err(|_| VmError::InteropFailure("burn amount out of range".into()))?;
    if amount <= 0 {
        return Err(VmError::InteropFailure("burn amount must be positive".into()));
    }
    engine.add_gas(amount)
}
