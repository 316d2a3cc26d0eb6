//! `System.Binary.*` value serialization services.

use crate::application_engine::HostContext;
use crate::binary_serializer;
use oxneo_io::IoError;
use oxneo_vm::{ExecutionEngine, StackItem, VmError, VmResult};

/// Maximum serialized value size accepted either way.
const MAX_VALUE_SIZE: usize = 1 << 20;

pub fn serialize(_host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let item = engine.pop()?;
    let bytes = binary_serializer::serialize(&item, MAX_VALUE_SIZE).map_err(|e| match e {
        IoError::CircularReference => {
            VmError::InteropFailure("cannot serialize a cyclic value".into())
        }
        other => VmError::InteropFailure(other.to_string()),
    })?;
    engine.push(StackItem::from_bytes(bytes))
}

pub fn deserialize(_host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let bytes = engine.pop_bytes()?;
    if bytes.len() > MAX_VALUE_SIZE {
        return Err(VmError::InteropFailure("serialized value too large".into()));
    }
    let item = binary_serializer::deserialize(&bytes)
        .map_err(|e| VmError::InteropFailure(e.to_string()))?;
    engine.push(item)
}
