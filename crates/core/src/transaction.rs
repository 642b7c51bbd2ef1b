//! Simulated transactions.
//!
//! A transaction here has no structure: it is an opaque payload of a
//! configured byte length filled with pseudo-random bits. It exists only so
//! blocks have something to summarize in their merkle root.
//!
//! Leaf digests are taken over the raw payload bytes, not over
//! [`Transaction::to_bit_string`].

use crate::hash::{digest, Hash, HashMode};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// An opaque simulated transaction payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    payload: Vec<u8>,
}

impl Transaction {
    /// Wrap an existing payload.
    pub fn from_bytes(payload: Vec<u8>) -> Self {
        Self { payload }
    }

    /// Create a transaction of `size` random bytes using the thread RNG.
    pub fn random(size: usize) -> Self {
        Self::random_with(&mut rand::thread_rng(), size)
    }

    /// Create a transaction of `size` random bytes from the given RNG.
    pub fn random_with<R: RngCore + ?Sized>(rng: &mut R, size: usize) -> Self {
        let mut payload = vec![0u8; size];
        rng.fill_bytes(&mut payload);
        Self { payload }
    }

    /// Generate the transaction set for one block.
    ///
    /// `tx_size` controls both the number of transactions and the byte
    /// length of each one.
    pub fn batch(tx_size: usize) -> Vec<Self> {
        let mut rng = rand::thread_rng();
        (0..tx_size)
            .map(|_| Self::random_with(&mut rng, tx_size))
            .collect()
    }

    /// The raw payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Digest of the payload under the given mode.
    pub fn hash(&self, mode: HashMode) -> Hash {
        digest(mode, &self.payload)
    }

    /// Payload as a string of `'0'`/`'1'` characters, for detail views.
    pub fn to_bit_string(&self) -> String {
        self.payload
            .iter()
            .map(|byte| format!("{:08b}", byte))
            .collect()
    }
}
