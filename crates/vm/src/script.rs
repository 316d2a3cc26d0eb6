//! Immutable script bytes shared between contexts.

use std::rc::Rc;

/// A script loaded into the engine. Cloning is cheap and preserves
/// identity: contexts created by `CALL` share the same script object.
#[derive(Debug, Clone)]
pub struct Script(Rc<Vec<u8>>);

impl Script {
    /// Wraps raw script bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Rc::new(bytes))
    }

    /// The script bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Script length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the script is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether two handles refer to the same loaded script object.
    pub fn same_script(&self, other: &Script) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Vec<u8>> for Script {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for Script {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}
