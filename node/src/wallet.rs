//! A thin JSON keystore for the consensus key.
//!
//! One secp256r1 key per file, hex-encoded, written with owner-only
//! permissions. Passphrase encryption is out of scope; the file itself is
//! the secret.

use anyhow::{bail, Context, Result};
use oxneo_core::UInt160;
use oxneo_core::contract::create_signature_redeem_script;
use oxneo_cryptography::base58::address_from_script_hash;
use oxneo_cryptography::KeyPair;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Serialize, Deserialize)]
struct WalletFile {
    version: u32,
    address: String,
    public_key: String,
    private_key: String,
}

/// Generates a fresh key and writes it to `path`. Refuses to overwrite.
pub fn create(path: &Path) -> Result<KeyPair> {
    if path.exists() {
        bail!("wallet file {} already exists", path.display());
    }
    let pair = KeyPair::generate();
    let account = UInt160::from_script(&create_signature_redeem_script(&pair.public_key()));
    let file = WalletFile {
        version: 1,
        address: address_from_script_hash(account.as_bytes()),
        public_key: hex::encode(pair.public_key()),
        private_key: hex::encode(pair.private_key()),
    };
    let json = serde_json::to_string_pretty(&file)?;
    std::fs::write(path, json)
        .with_context(|| format!("cannot write wallet {}", path.display()))?;
    restrict_permissions(path)?;
    Ok(pair)
}

/// Loads a key pair from a wallet file.
pub fn open(path: &Path) -> Result<KeyPair> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read wallet {}", path.display()))?;
    let file: WalletFile = serde_json::from_str(&json)
        .with_context(|| format!("wallet {} is not valid JSON", path.display()))?;
    let private_key = hex::decode(&file.private_key).context("private key is not hex")?;
    let pair = KeyPair::from_private_key(&private_key)
        .map_err(|e| anyhow::anyhow!("invalid private key: {e}"))?;
    // Guard against tampered or mismatched files.
    if hex::encode(pair.public_key()) != file.public_key {
        bail!("wallet public key does not match its private key");
    }
    Ok(pair)
}

/// The address a wallet's key controls.
pub fn address_of(pair: &KeyPair) -> String {
    let account = UInt160::from_script(&create_signature_redeem_script(&pair.public_key()));
    address_from_script_hash(account.as_bytes())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(0o600);
    std::fs::set_permissions(path, permissions)?;
    Ok(())
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.json");
        let created = create(&path).unwrap();
        let opened = open(&path).unwrap();
        assert_eq!(created.public_key(), opened.public_key());
        assert_eq!(address_of(&created), address_of(&opened));
    }

    #[test]
    fn refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.json");
        create(&path).unwrap();
        assert!(create(&path).is_err());
    }

    #[test]
    fn rejects_tampered_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.json");
        create(&path).unwrap();
        let mut json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        json["public_key"] = serde_json::json!(hex::encode([2u8; 33]));
        std::fs::write(&path, serde_json::to_string(&json).unwrap()).unwrap();
        assert!(open(&path).is_err());
    }
}
