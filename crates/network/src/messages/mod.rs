//! Wire messages.

pub mod address;
pub mod command;
pub mod filter;
pub mod headers;
pub mod inventory;
pub mod message;
pub mod ping;
pub mod version;

pub use address::{AddrPayload, NetworkAddress, MAX_ADDRESSES_PER_MESSAGE};
pub use command::MessageCommand;
pub use filter::{FilterAddPayload, FilterLoadPayload, MerkleBlockPayload};
pub use headers::{GetBlocksPayload, GetHeadersPayload, HeadersPayload, MAX_HEADERS_PER_MESSAGE};
pub use inventory::{InvPayload, InventoryType, MAX_INV_HASHES};
pub use message::{Message, FRAME_HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use ping::PingPayload;
pub use version::VersionPayload;
