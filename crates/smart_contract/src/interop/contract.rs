//! `System.Contract.*` services.

use crate::application_engine::HostContext;
use crate::contract_state::ContractState;
use oxneo_core::UInt160;
use oxneo_io::Serializable;
use oxneo_persistence::{layout, StoreView};
use oxneo_vm::{CallFlags, ExecutionEngine, Script, StackItem, VmError, VmResult};

/// `System.Contract.Call`: stack (top first) script hash, method name,
/// call flags, argument array.
///
/// Native contracts dispatch directly; deployed contracts load the target
/// method's script region as a new context whose flags are the
/// intersection of the caller's and the requested ones.
pub fn call(host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let hash_bytes = engine.pop_bytes()?;
    let target = UInt160::from_slice(&hash_bytes)
        .map_err(|_| VmError::InteropFailure("contract hash must be 20 bytes".into()))?;
    let method_bytes = engine.pop_bytes()?;
    let method = String::from_utf8(method_bytes)
        .map_err(|_| VmError::InteropFailure("method name is not utf-8".into()))?;
    if method.starts_with('_') {
        return Err(VmError::InteropFailure(
            "reserved method names cannot be called directly".into(),
        ));
    }
    let flags_value = engine.pop_integer()?;
    let requested = u8::try_from(flags_value)
        .ok()
        .and_then(CallFlags::from_bits)
        .ok_or_else(|| VmError::InteropFailure("invalid call flags".into()))?;
    let args_item = engine.pop()?;
    let args = match &args_item {
        StackItem::Array(items) => items.borrow().clone(),
        other => {
            return Err(VmError::InvalidType {
                expected: "argument Array",
                found: other.type_name(),
            })
        }
    };

    let child_flags = requested & host.current_call_flags();

    // Native contracts execute in-place and push their result.
    if let Some(result) = crate::native::invoke(host, &target, &method, &args)? {
        return engine.push(result);
    }

    let raw = host
        .snapshot
        .try_get(&layout::contract_key(&target))
        .ok_or_else(|| VmError::InteropFailure(format!("contract {target} not found")))?;
    let state = ContractState::from_bytes(&raw)
        .map_err(|e| VmError::InteropFailure(format!("corrupt contract state: {e}")))?;
    let descriptor = state
        .method(&method, args.len())
        .ok_or_else(|| {
            VmError::InteropFailure(format!(
                "method {method}/{} not exported by {target}",
                args.len()
            ))
        })?;
    let offset = descriptor.offset as usize;

    engine.load_script(Script::new(state.script.clone()), -1)?;
    {
        let context = engine.current_context_mut()?;
        context.instruction_pointer = offset;
    }
    // Arguments go onto the callee's fresh stack in reverse so the first
    // argument is on top for INITSLOT.
    for arg in args.iter().rev() {
        engine.push(arg.clone())?;
    }
    let depth = engine.invocation_depth();
    host_push_frame(host, depth, target, child_flags);
    Ok(())
}

fn host_push_frame(host: &mut HostContext, depth: usize, hash: UInt160, flags: CallFlags) {
    // HostContext keeps the frame stack private; this shim is the one
    // place outside the engine allowed to grow it.
    host.push_frame_for_call(depth, hash, flags);
}

/// `System.Contract.GetCallFlags`.
pub fn get_call_flags(host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    engine.push(StackItem::from_int(host.current_call_flags().bits() as i64))
}
