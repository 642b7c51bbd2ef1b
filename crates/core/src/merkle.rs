//! Merkle root reduction over transaction payloads.
//!
//! Leaves are the hex digests of each payload. Each level pairs adjacent
//! hex strings, concatenates them and digests the concatenation. An odd
//! level duplicates its last hash before pairing.

use crate::hash::{digest, Hash, HashMode};
use crate::transaction::Transaction;
use crate::{CoreError, Result};

/// Compute the merkle root of an ordered list of transactions.
///
/// A single transaction's root is its own digest.
pub fn merkle_root(mode: HashMode, transactions: &[Transaction]) -> Result<Hash> {
    let levels = merkle_levels(mode, transactions)?;
    levels
        .last()
        .and_then(|level| level.first())
        .copied()
        .ok_or(CoreError::EmptyTransactions)
}

/// Build every level of the tree, leaves first and the root level last.
///
/// Levels are recorded before odd-count duplication is applied.
pub fn merkle_levels(mode: HashMode, transactions: &[Transaction]) -> Result<Vec<Vec<Hash>>> {
    if transactions.is_empty() {
        return Err(CoreError::EmptyTransactions);
    }

    let leaves: Vec<Hash> = transactions.iter().map(|tx| tx.hash(mode)).collect();
    let mut levels = vec![leaves];

    loop {
        let current = &levels[levels.len() - 1];
        if current.len() <= 1 {
            break;
        }

        let mut next = Vec::with_capacity(current.len().div_ceil(2));
        for chunk in current.chunks(2) {
            let right = chunk.get(1).unwrap_or(&chunk[0]);
            next.push(hash_pair(mode, &chunk[0], right));
        }

        levels.push(next);
    }

    Ok(levels)
}

/// Digest the concatenated hex strings of two nodes.
fn hash_pair(mode: HashMode, left: &Hash, right: &Hash) -> Hash {
    let mut joined = String::with_capacity(128);
    joined.push_str(&left.to_hex());
    joined.push_str(&right.to_hex());
    digest(mode, joined.as_bytes())
}
