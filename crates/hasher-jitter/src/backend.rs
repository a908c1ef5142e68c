//! Double-hash backends.
//!
//! The engine only needs one capability: standard double SHA-256 over a byte
//! slice. Software, GPU and ASIC backends all implement [`HashBackend`] and
//! must agree bit-for-bit; swapping them changes throughput, never results.

use sha2::{Digest, Sha256};

/// Double SHA-256 capability
pub trait HashBackend: Send + Sync {
    /// Short backend name for logs
    fn name(&self) -> &str;

    /// `SHA256(SHA256(data))`
    fn compute_double_hash(&self, data: &[u8]) -> [u8; 32];
}

impl<T: HashBackend + ?Sized> HashBackend for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn compute_double_hash(&self, data: &[u8]) -> [u8; 32] {
        (**self).compute_double_hash(data)
    }
}

impl<T: HashBackend + ?Sized> HashBackend for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn compute_double_hash(&self, data: &[u8]) -> [u8; 32] {
        (**self).compute_double_hash(data)
    }
}

/// Pure-software backend on top of `sha2`
#[derive(Debug, Clone, Copy, Default)]
pub struct SoftwareHasher;

impl HashBackend for SoftwareHasher {
    fn name(&self) -> &str {
        "software"
    }

    fn compute_double_hash(&self, data: &[u8]) -> [u8; 32] {
        double_sha256(data)
    }
}

/// `SHA256(SHA256(data))`
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    Sha256::digest(first).into()
}
