//! Signature-check handlers. Both verify against the digest supplied by
//! the script container (the unsigned payload hash).

use crate::error::{VmError, VmResult};
use crate::execution_engine::ExecutionEngine;
use oxneo_cryptography::ecdsa::{verify_signature, PUBLIC_KEY_SIZE, SIGNATURE_SIZE};

fn container_digest(engine: &ExecutionEngine) -> VmResult<[u8; 32]> {
    engine
        .container_digest()
        .copied()
        .ok_or_else(|| VmError::InteropFailure("no script container to verify against".into()))
}

/// `CHECKSIG`: pop public key then signature, verify against the container
/// digest. Malformed inputs push `false` rather than faulting.
pub fn check_sig(engine: &mut ExecutionEngine) -> VmResult<()> {
    let digest = container_digest(engine)?;
    let public_key = engine.pop_bytes()?;
    let signature = engine.pop_bytes()?;
    let valid = verify_signature(&digest, &signature, &public_key);
    engine.push(crate::stack_item::StackItem::Boolean(valid))
}

/// `CHECKMULTISIG`: pop `n` and the public keys, then `m` and the
/// signatures; verify `m` signatures against the keys in order.
///
/// Signatures and keys must appear in matching order: each signature is
/// matched against keys from where the previous match left off, so an
/// out-of-order set fails even when individually valid.
pub fn check_multisig(engine: &mut ExecutionEngine) -> VmResult<()> {
    let digest = container_digest(engine)?;

    let n = crate::stack_item::item_to_index(&engine.pop()?, 16)?;
    if n == 0 {
        return Err(VmError::InvalidOperand("CHECKMULTISIG with no keys".into()));
    }
    let mut public_keys = Vec::with_capacity(n);
    for _ in 0..n {
        public_keys.push(engine.pop_bytes()?);
    }

    let m = crate::stack_item::item_to_index(&engine.pop()?, 16)?;
    if m == 0 || m > n {
        return Err(VmError::InvalidOperand(format!(
            "CHECKMULTISIG with m={m} of n={n}"
        )));
    }
    let mut signatures = Vec::with_capacity(m);
    for _ in 0..m {
        signatures.push(engine.pop_bytes()?);
    }

    if public_keys
        .iter()
        .any(|key| key.len() != PUBLIC_KEY_SIZE)
        || signatures.iter().any(|sig| sig.len() != SIGNATURE_SIZE)
    {
        return engine.push(crate::stack_item::StackItem::Boolean(false));
    }

    let mut valid = true;
    let mut key_index = 0usize;
    for signature in &signatures {
        let mut matched = false;
        while key_index < public_keys.len() {
            if verify_signature(
                &digest,
                signature,
                &public_keys[key_index],
            ) {
                matched = true;
                key_index += 1;
                break;
            }
            key_index += 1;
        }
        if !matched {
            valid = false;
            break;
        }
    }
    engine.push(crate::stack_item::StackItem::Boolean(valid))
}
