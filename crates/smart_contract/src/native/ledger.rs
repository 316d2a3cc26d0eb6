//! The ledger contract: chain pointers exposed to scripts.

use super::NativeContext;
use crate::application_engine::HostContext;
use crate::error::ContractResult;
use oxneo_core::UInt256;
use oxneo_persistence::{layout, StoreCache, StoreView};
use oxneo_vm::{StackItem, VmError, VmResult};

/// Reads the current block pointer: height and hash.
pub fn current(view: &StoreCache) -> Option<(u32, UInt256)> {
    let raw = view.try_get(&layout::current_block_key())?;
    decode_pointer(&raw)
}

/// Decodes a current-block pointer value.
pub fn decode_pointer(raw: &[u8]) -> Option<(u32, UInt256)> {
    if raw.len() != 4 + 32 {
        return None;
    }
    let index = u32::from_le_bytes(raw[..4].try_into().ok()?);
    let hash = UInt256::from_slice(&raw[4..]).ok()?;
    Some((index, hash))
}

/// Encodes a current-block pointer value.
pub fn encode_pointer(index: u32, hash: &UInt256) -> Vec<u8> {
    let mut raw = Vec::with_capacity(36);
    raw.extend_from_slice(&index.to_le_bytes());
    raw.extend_from_slice(hash.as_bytes());
    raw
}

/// Ledger surface reachable through `System.Contract.Call`.
pub fn invoke(host: &mut HostContext, method: &str, _args: &[StackItem]) -> VmResult<StackItem> {
    match method {
        "currentIndex" => match current(&host.snapshot) {
            Some((index, _)) => Ok(StackItem::from_int(index as i64)),
            None => Ok(StackItem::from_int(-1)),
        },
        "currentHash" => match current(&host.snapshot) {
            Some((_, hash)) => Ok(StackItem::from_bytes(hash.as_bytes().to_vec())),
            None => Ok(StackItem::Null),
        },
        other => Err(VmError::InteropFailure(format!(
            "LedgerContract has no method {other}"
        ))),
    }
}

/// Advances the current-block pointer before the block's transactions
/// run, so scripts observe the persisting block's height.
pub fn on_persist(ctx: &mut NativeContext<'_>) -> ContractResult<()> {
    let hash = ctx.block.hash()?;
    ctx.cache.put(
        layout::current_block_key(),
        encode_pointer(ctx.block.index(), &hash),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pointer_round_trip() {
        let hash = UInt256::from_bytes([9u8; 32]);
        let raw = encode_pointer(1234, &hash);
        assert_eq!(decode_pointer(&raw), Some((1234, hash)));
    }

    #[test]
    fn truncated_pointer_rejected() {
        assert!(decode_pointer(&[1, 2, 3]).is_none());
    }
}
