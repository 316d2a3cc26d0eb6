//! Verification-script construction and recognition.

use crate::error::{CoreError, CoreResult};
use crate::uint160::UInt160;
use oxneo_cryptography::ecdsa::PUBLIC_KEY_SIZE;

/// `PUSHDATA1` opcode.
const OP_PUSHDATA1: u8 = 0x0c;
/// `PUSH1` opcode; `PUSH1..PUSH16` are consecutive.
const OP_PUSH1: u8 = 0x11;
/// `CHECKSIG` opcode.
pub const OP_CHECKSIG: u8 = 0xad;
/// `CHECKMULTISIG` opcode.
pub const OP_CHECKMULTISIG: u8 = 0xae;

/// Builds the single-signature verification script for a public key:
/// `PUSHDATA1 0x21 <key> CHECKSIG`.
pub fn create_signature_redeem_script(public_key: &[u8; PUBLIC_KEY_SIZE]) -> Vec<u8> {
    let mut script = Vec::with_capacity(2 + PUBLIC_KEY_SIZE + 1);
    script.push(OP_PUSHDATA1);
    script.push(PUBLIC_KEY_SIZE as u8);
    script.extend_from_slice(public_key);
    script.push(OP_CHECKSIG);
    script
}

/// Builds the `m`-of-`n` multisig verification script:
/// `PUSH_m (PUSHDATA1 0x21 <key>)* PUSH_n CHECKMULTISIG`.
///
/// Keys are sorted by their encoding so every validator derives the same
/// script for the same validator set. Requires `1 ≤ m ≤ n ≤ 16`.
pub fn create_multisig_redeem_script(
    m: usize,
    public_keys: &[[u8; PUBLIC_KEY_SIZE]],
) -> CoreResult<Vec<u8>> {
    let n = public_keys.len();
    if m < 1 || m > n || n > 16 {
        return Err(CoreError::InvalidFormat(format!(
            "invalid multisig parameters m={m} n={n}"
        )));
    }
    let mut sorted: Vec<[u8; PUBLIC_KEY_SIZE]> = public_keys.to_vec();
    sorted.sort();
    let mut script = Vec::with_capacity(2 + n * (2 + PUBLIC_KEY_SIZE));
    script.push(OP_PUSH1 + (m as u8 - 1));
    for key in &sorted {
        script.push(OP_PUSHDATA1);
        script.push(PUBLIC_KEY_SIZE as u8);
        script.extend_from_slice(key);
    }
    script.push(OP_PUSH1 + (n as u8 - 1));
    script.push(OP_CHECKMULTISIG);
    Ok(script)
}

/// Recognizes a multisig verification script, returning `(m, keys)`.
pub fn parse_multisig_script(script: &[u8]) -> Option<(usize, Vec<[u8; PUBLIC_KEY_SIZE]>)> {
    if script.len() < 5 || *script.last()? != OP_CHECKMULTISIG {
        return None;
    }
    let m_byte = script[0];
    if !(OP_PUSH1..=OP_PUSH1 + 15).contains(&m_byte) {
        return None;
    }
    let m = (m_byte - OP_PUSH1 + 1) as usize;

    let mut keys = Vec::new();
    let mut pos = 1;
    while script.get(pos) == Some(&OP_PUSHDATA1) {
        if script.get(pos + 1) != Some(&(PUBLIC_KEY_SIZE as u8)) {
            return None;
        }
        let key: [u8; PUBLIC_KEY_SIZE] = script
            .get(pos + 2..pos + 2 + PUBLIC_KEY_SIZE)?
            .try_into()
            .ok()?;
        keys.push(key);
        pos += 2 + PUBLIC_KEY_SIZE;
    }

    let n_byte = *script.get(pos)?;
    if !(OP_PUSH1..=OP_PUSH1 + 15).contains(&n_byte) {
        return None;
    }
    let n = (n_byte - OP_PUSH1 + 1) as usize;
    if n != keys.len() || m > n || pos + 2 != script.len() {
        return None;
    }
    Some((m, keys))
}

/// Whether `script` is a single-signature verification script.
pub fn is_signature_script(script: &[u8]) -> bool {
    script.len() == 2 + PUBLIC_KEY_SIZE + 1
        && script[0] == OP_PUSHDATA1
        && script[1] == PUBLIC_KEY_SIZE as u8
        && script[script.len() - 1] == OP_CHECKSIG
}

/// Script hash of the `m`-of-`n` multisig over `public_keys`.
pub fn multisig_script_hash(
    m: usize,
    public_keys: &[[u8; PUBLIC_KEY_SIZE]],
) -> CoreResult<UInt160> {
    Ok(UInt160::from_script(&create_multisig_redeem_script(
        m,
        public_keys,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use oxneo_cryptography::KeyPair;

    #[test]
    fn signature_script_layout() {
        let key = KeyPair::generate().public_key();
        let script = create_signature_redeem_script(&key);
        assert!(is_signature_script(&script));
        assert_eq!(script.len(), 36);
        assert_eq!(script[0], OP_PUSHDATA1);
        assert_eq!(script[1], 33);
        assert_eq!(*script.last().unwrap(), OP_CHECKSIG);
    }

    #[test]
    fn multisig_round_trip() {
        let keys: Vec<[u8; 33]> = (0..4).map(|_| KeyPair::generate().public_key()).collect();
        let script = create_multisig_redeem_script(3, &keys).unwrap();
        let (m, parsed) = parse_multisig_script(&script).unwrap();
        assert_eq!(m, 3);
        assert_eq!(parsed.len(), 4);
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(parsed, sorted);
    }

    #[test]
    fn multisig_is_order_independent() {
        let mut keys: Vec<[u8; 33]> = (0..4).map(|_| KeyPair::generate().public_key()).collect();
        let a = create_multisig_redeem_script(3, &keys).unwrap();
        keys.reverse();
        let b = create_multisig_redeem_script(3, &keys).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_parameters_rejected() {
        let keys: Vec<[u8; 33]> = (0..4).map(|_| KeyPair::generate().public_key()).collect();
        assert!(create_multisig_redeem_script(0, &keys).is_err());
        assert!(create_multisig_redeem_script(5, &keys).is_err());
        let many: Vec<[u8; 33]> = (0..17).map(|_| KeyPair::generate().public_key()).collect();
        assert!(create_multisig_redeem_script(1, &many).is_err());
    }

    #[test]
    fn parse_rejects_garbage() {
        assert!(parse_multisig_script(&[]).is_none());
        assert!(parse_multisig_script(&[0x11, 0xae]).is_none());
    }
}
