//! Streaming file hashing and an incrementally-updatable Merkle tree over
//! the sorted set of (path, content-hash) pairs a host is tracking.
//!
//! This crate owns components C1 (Hasher) and C2 (Merkle engine): it knows
//! nothing about events, queues, or the network — callers hand it bytes and
//! paths and get back hashes, trees, and proofs.

mod hasher;
mod tree;

pub use hasher::{hash_bytes, hash_file, Hash};
pub use tree::{index_of, MerkleProof, MerkleTree, TrackedFile};

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MerkleError {
    #[error("path not tracked: {0}")]
    PathNotTracked(String),
}

/// Convenience wrapper around [`tree::index_of`] + [`MerkleTree::proof`] for
/// callers that only have a path, not an already-resolved index.
pub fn proof_for_path(
    tree: &MerkleTree,
    files: &[TrackedFile],
    path: &Path,
) -> Result<MerkleProof, MerkleError> {
    let index = index_of(files, path)
        .ok_or_else(|| MerkleError::PathNotTracked(path.display().to_string()))?;
    Ok(tree.proof(index))
}
