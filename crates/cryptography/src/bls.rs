//! BLS12-381 signatures for the oracle witness seam.
//!
//! Min-pk scheme: 48-byte compressed public keys in G1, 96-byte compressed
//! signatures in G2, messages hashed to G2 with the standard ciphersuite.
//! As with ECDSA, verification returns `false` on malformed encodings.

use bls12_381::hash_to_curve::{ExpandMsgXmd, HashToCurve};
use bls12_381::{pairing, G1Affine, G1Projective, G2Affine, G2Projective, Scalar};
use sha2_0_9::Sha256;

/// Ciphersuite domain separation tag.
const DST: &[u8] = b"BLS_SIG_BLS12381G2_XMD:SHA-256_SSWU_RO_NUL_";

/// Byte length of a compressed public key.
pub const BLS_PUBLIC_KEY_SIZE: usize = 48;
/// Byte length of a compressed signature.
pub const BLS_SIGNATURE_SIZE: usize = 96;

fn hash_to_g2(message: &[u8]) -> G2Projective {
    <G2Projective as HashToCurve<ExpandMsgXmd<Sha256>>>::hash_to_curve(message, DST)
}

/// Derives the compressed public key for a secret scalar.
///
/// Returns `None` when `secret` is not a canonical 32-byte scalar.
pub fn bls_public_key(secret: &[u8; 32]) -> Option<[u8; BLS_PUBLIC_KEY_SIZE]> {
    let scalar: Option<Scalar> = Scalar::from_bytes(secret).into();
    let scalar = scalar?;
    let pk = G1Projective::generator() * scalar;
    Some(G1Affine::from(pk).to_compressed())
}

/// Signs `message`, returning the compressed G2 signature.
///
/// Returns `None` when `secret` is not a canonical 32-byte scalar.
pub fn bls_sign(secret: &[u8; 32], message: &[u8]) -> Option<[u8; BLS_SIGNATURE_SIZE]> {
    let scalar: Option<Scalar> = Scalar::from_bytes(secret).into();
    let scalar = scalar?;
    let sig = hash_to_g2(message) * scalar;
    Some(G2Affine::from(sig).to_compressed())
}

/// Verifies a signature against a message and compressed public key.
pub fn bls_verify(message: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    let Ok(pk_bytes) = <&[u8; BLS_PUBLIC_KEY_SIZE]>::try_from(public_key) else {
        return false;
    };
    let Ok(sig_bytes) = <&[u8; BLS_SIGNATURE_SIZE]>::try_from(signature) else {
        return false;
    };
    let pk: Option<G1Affine> = G1Affine::from_compressed(pk_bytes).into();
    let sig: Option<G2Affine> = G2Affine::from_compressed(sig_bytes).into();
    let (Some(pk), Some(sig)) = (pk, sig) else {
        return false;
    };
    if pk.is_identity().into() {
        return false;
    }
    let hm = G2Affine::from(hash_to_g2(message));
    pairing(&pk, &hm) == pairing(&G1Affine::generator(), &sig)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secret(fill: u8) -> [u8; 32] {
        let mut s = [0u8; 32];
        s[0] = fill;
        s
    }

    #[test]
    fn sign_and_verify_round_trip() {
        let sk = secret(7);
        let pk = bls_public_key(&sk).unwrap();
        let sig = bls_sign(&sk, b"oracle response").unwrap();
        assert!(bls_verify(b"oracle response", &sig, &pk));
    }

    #[test]
    fn wrong_message_fails() {
        let sk = secret(7);
        let pk = bls_public_key(&sk).unwrap();
        let sig = bls_sign(&sk, b"message").unwrap();
        assert!(!bls_verify(b"other", &sig, &pk));
    }

    #[test]
    fn malformed_inputs_never_panic() {
        assert!(!bls_verify(b"m", &[0u8; 10], &[0u8; 48]));
        assert!(!bls_verify(b"m", &[0u8; 96], &[0u8; 10]));
        assert!(!bls_verify(b"m", &[0xffu8; 96], &[0xffu8; 48]));
    }
}
