//! The N3 transaction and its attributes.

mod attribute;
#[allow(clippy::module_inception)]
mod transaction;

pub use attribute::{OracleResponseCode, TransactionAttribute};
pub use transaction::Transaction;
