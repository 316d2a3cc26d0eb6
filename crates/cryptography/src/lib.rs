//! Cryptographic primitives for the neo-oxide node.
//!
//! Hash helpers, Merkle trees, ECDSA over secp256r1, BLS12-381 signatures
//! for the oracle witness seam, Base58Check addresses and the bloom filter
//! used by SPV peers.

pub mod base58;
pub mod bloom_filter;
pub mod bls;
pub mod ecdsa;
pub mod error;
pub mod hash;
pub mod merkle;
pub mod murmur;

pub use bloom_filter::BloomFilter;
pub use ecdsa::KeyPair;
pub use error::{CryptoError, CryptoResult};
pub use merkle::MerkleTree;
