//! ECDSA over secp256r1.
//!
//! Signatures are 64 bytes (`r || s`, big-endian scalars); public keys are
//! 33-byte SEC1 compressed points. Verification never panics: any malformed
//! encoding simply fails to verify.

use crate::error::{CryptoError, CryptoResult};
use p256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::ToEncodedPoint;
use rand::RngCore;

/// Byte length of an encoded signature.
pub const SIGNATURE_SIZE: usize = 64;
/// Byte length of a compressed public key.
pub const PUBLIC_KEY_SIZE: usize = 33;
/// Byte length of a private key scalar.
pub const PRIVATE_KEY_SIZE: usize = 32;

/// A secp256r1 key pair.
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Generates a fresh random key pair.
    pub fn generate() -> Self {
        let mut bytes = [0u8; PRIVATE_KEY_SIZE];
        loop {
            rand::thread_rng().fill_bytes(&mut bytes);
            if let Ok(signing) = SigningKey::from_slice(&bytes) {
                return Self { signing };
            }
        }
    }

    /// Builds a key pair from a 32-byte private scalar.
    pub fn from_private_key(private_key: &[u8]) -> CryptoResult<Self> {
        let signing =
            SigningKey::from_slice(private_key).map_err(|_| CryptoError::InvalidPrivateKey)?;
        Ok(Self { signing })
    }

    /// The 32-byte private scalar.
    pub fn private_key(&self) -> [u8; PRIVATE_KEY_SIZE] {
        self.signing.to_bytes().into()
    }

    /// The 33-byte compressed public key.
    pub fn public_key(&self) -> [u8; PUBLIC_KEY_SIZE] {
        let point = self.signing.verifying_key().to_encoded_point(true);
        point
            .as_bytes()
            .try_into()
            .expect("compressed sec1 point is 33 bytes")
    }

    /// Signs a 32-byte digest, returning the 64-byte `r || s` signature.
    pub fn sign(&self, digest: &[u8; 32]) -> CryptoResult<[u8; SIGNATURE_SIZE]> {
        let signature: Signature = self
            .signing
            .sign_prehash(digest)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        let bytes: [u8; SIGNATURE_SIZE] = signature
            .to_bytes()
            .as_slice()
            .try_into()
            .expect("r||s signature is 64 bytes");
        Ok(bytes)
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never prints the private scalar.
        write!(f, "KeyPair({})", hex::encode(self.public_key()))
    }
}

/// Verifies a 64-byte signature over a 32-byte digest with a compressed key.
///
/// Returns `false` for invalid encodings of the key or signature.
pub fn verify_signature(digest: &[u8; 32], signature: &[u8], public_key: &[u8]) -> bool {
    let Ok(verifying) = VerifyingKey::from_sec1_bytes(public_key) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(signature) else {
        return false;
    };
    verifying.verify_prehash(digest, &signature).is_ok()
}

/// Checks that `public_key` decodes as a compressed secp256r1 point.
pub fn is_valid_public_key(public_key: &[u8]) -> bool {
    public_key.len() == PUBLIC_KEY_SIZE && VerifyingKey::from_sec1_bytes(public_key).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::sha256;

    #[test]
    fn sign_and_verify_round_trip() {
        let pair = KeyPair::generate();
        let digest = sha256(b"neo-oxide");
        let signature = pair.sign(&digest).unwrap();
        assert!(verify_signature(&digest, &signature, &pair.public_key()));
    }

    #[test]
    fn tampered_digest_fails() {
        let pair = KeyPair::generate();
        let signature = pair.sign(&sha256(b"message")).unwrap();
        assert!(!verify_signature(
            &sha256(b"other"),
            &signature,
            &pair.public_key()
        ));
    }

    #[test]
    fn wrong_key_fails() {
        let pair = KeyPair::generate();
        let other = KeyPair::generate();
        let digest = sha256(b"message");
        let signature = pair.sign(&digest).unwrap();
        assert!(!verify_signature(&digest, &signature, &other.public_key()));
    }

    #[test]
    fn malformed_inputs_never_panic() {
        let digest = sha256(b"message");
        assert!(!verify_signature(&digest, &[0u8; 64], &[0u8; 33]));
        assert!(!verify_signature(&digest, &[0u8; 10], &[2u8; 33]));
        assert!(!verify_signature(&digest, &[0u8; 64], b"short"));
    }

    #[test]
    fn private_key_round_trip() {
        let pair = KeyPair::generate();
        let restored = KeyPair::from_private_key(&pair.private_key()).unwrap();
        assert_eq!(pair.public_key(), restored.public_key());
    }
}
