//! `System.Crypto.*` services.

use crate::application_engine::HostContext;
use oxneo_cryptography::ecdsa::verify_signature;
use oxneo_cryptography::hash;
use oxneo_vm::{ExecutionEngine, StackItem, VmError, VmResult};

/// Signature check against the container digest, the syscall twin of the
/// `CHECKSIG` opcode.
pub fn check_sig(host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let digest = host
        .container
        .hash()
        .ok_or_else(|| VmError::InteropFailure("no container to verify against".into()))?;
    let public_key = engine.pop_bytes()?;
    let signature = engine.pop_bytes()?;
    let valid = verify_signature(digest.as_bytes(), &signature, &public_key);
    engine.push(StackItem::Boolean(valid))
}

pub fn sha256_syscall(_host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let data = engine.pop_bytes()?;
    engine.push(StackItem::from_bytes(hash::sha256(&data).to_vec()))
}

pub fn ripemd160_syscall(_host: &mut HostContext, engine: &mut ExecutionEngine) -> VmResult<()> {
    let data = engine.pop_bytes()?;
    engine.push(StackItem::from_bytes(hash::ripemd160(&data).to_vec()))
}
