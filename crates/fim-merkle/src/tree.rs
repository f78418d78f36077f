//! Binary Merkle tree over sorted (path, hash) pairs.
//!
//! Levels are stored root-first: `levels[0]` is the root, `levels.last()`
//! is the leaf level, matching this system's wire format (§3 of the spec:
//! "level 0 = root, level L-1 = leaves"). An odd-length level's rightmost
//! node is paired with itself rather than materialized as a duplicate
//! entry — both representations hash identically, this one just avoids
//! growing the level arrays.

use crate::hasher::{hash_bytes, Hash};
use std::path::{Path, PathBuf};

/// A file tracked by content hash, ordered by path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedFile {
    pub path: PathBuf,
    pub hash: Hash,
}

/// An inclusion proof: the leaf's position and the sibling digests from the
/// leaf level up to (but not including) the root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    pub index: usize,
    pub siblings: Vec<Hash>,
    pub root: Hash,
}

#[derive(Debug, Clone)]
pub struct MerkleTree {
    /// Root-first: levels[0] == [root], levels.last() == leaves.
    levels: Vec<Vec<Hash>>,
}

fn hash_pair(left: Hash, right: Hash) -> Hash {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(&left);
    buf.extend_from_slice(&right);
    hash_bytes(&buf)
}

fn fold_level(level: &[Hash]) -> Vec<Hash> {
    let mut out = Vec::with_capacity((level.len() + 1) / 2);
    let mut i = 0;
    while i < level.len() {
        let left = level[i];
        let right = if i + 1 < level.len() { level[i + 1] } else { left };
        out.push(hash_pair(left, right));
        i += 2;
    }
    out
}

impl MerkleTree {
    /// Sort `files` by path and build a tree over their hashes. An empty
    /// input yields a null tree (I3). Returns the tree alongside the
    /// now-sorted file list, which callers must keep alongside the tree
    /// since leaf order is significant (I1).
    pub fn build(mut files: Vec<TrackedFile>) -> (Option<MerkleTree>, Vec<TrackedFile>) {
        files.sort_by(|a, b| a.path.cmp(&b.path));
        if files.is_empty() {
            return (None, files);
        }

        let leaves: Vec<Hash> = files.iter().map(|f| f.hash).collect();
        let mut bottom_up = vec![leaves.clone()];
        let mut current = leaves;
        while current.len() > 1 {
            let next = fold_level(&current);
            bottom_up.push(next.clone());
            current = next;
        }
        bottom_up.reverse();
        (Some(MerkleTree { levels: bottom_up }), files)
    }

    /// Overwrite a leaf's hash and recompute only its ancestor spine.
    /// Precondition: the set of leaves is unchanged, only `leaf_index`'s
    /// content hash differs (§4.2).
    pub fn update(&mut self, leaf_index: usize, new_hash: Hash) {
        let leaf_level = self.levels.len() - 1;
        self.levels[leaf_level][leaf_index] = new_hash;

        let mut idx = leaf_index;
        let mut level_idx = leaf_level;
        while level_idx > 0 {
            let (left, right) = {
                let level = &self.levels[level_idx];
                let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
                let sibling = if sibling_idx < level.len() {
                    level[sibling_idx]
                } else {
                    level[idx]
                };
                if idx % 2 == 0 {
                    (level[idx], sibling)
                } else {
                    (sibling, level[idx])
                }
            };
            let parent = hash_pair(left, right);
            let parent_idx = idx / 2;
            level_idx -= 1;
            self.levels[level_idx][parent_idx] = parent;
            idx = parent_idx;
        }
    }

    /// Walk from `leaf_index` up to the root, collecting sibling digests.
    /// A leaf with no true sibling contributes its own current-level digest
    /// (the duplicate-self rule).
    pub fn proof(&self, leaf_index: usize) -> MerkleProof {
        let mut siblings = Vec::new();
        let mut idx = leaf_index;
        let leaf_level = self.levels.len() - 1;
        for level_idx in (1..=leaf_level).rev() {
            let level = &self.levels[level_idx];
            let sibling_idx = if idx % 2 == 0 { idx + 1 } else { idx - 1 };
            let sibling = if sibling_idx < level.len() {
                level[sibling_idx]
            } else {
                level[idx]
            };
            siblings.push(sibling);
            idx /= 2;
        }
        MerkleProof {
            index: leaf_index,
            siblings,
            root: self.root(),
        }
    }

    pub fn root(&self) -> Hash {
        self.levels[0][0]
    }

    pub fn leaf_count(&self) -> usize {
        self.levels.last().map_or(0, Vec::len)
    }
}

/// Locate a path's index within a sorted, built file list. Leaf order
/// tracks the file list 1:1 (I1), so a linear scan is sufficient — callers
/// hold file lists sized for a single host's watched tree, not a corpus.
pub fn index_of(files: &[TrackedFile], path: &Path) -> Option<usize> {
    files.iter().position(|f| f.path == path)
}
