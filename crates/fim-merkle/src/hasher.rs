//! Streaming SHA-256 file hashing with bounded retry on transient locks.

use sha2::{Digest, Sha256};
use std::io::{self, ErrorKind, Read};
use std::path::Path;
use std::thread;
use std::time::Duration;

/// Raw 32-byte content digest of a tracked file.
pub type Hash = [u8; 32];

const CHUNK_SIZE: usize = 4096;
const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Hash a file's contents with SHA-256, retrying on permission errors only.
///
/// Any other I/O error (file vanished, not a regular file, etc.) is treated
/// as "unhashable" and returned as `Ok(None)` rather than surfaced to the
/// caller as a hard failure — callers skip the path for this round rather
/// than mutate tree state on partial information.
pub fn hash_file(path: &Path) -> io::Result<Option<Hash>> {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match hash_once(path) {
            Ok(hash) => return Ok(Some(hash)),
            Err(e) if e.kind() == ErrorKind::PermissionDenied && attempt < MAX_ATTEMPTS => {
                thread::sleep(RETRY_DELAY);
                continue;
            }
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                tracing::warn!(path = %path.display(), attempts = attempt, "permission denied hashing file, giving up");
                return Ok(None);
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "file unhashable, skipping");
                return Ok(None);
            }
        }
    }
}

fn hash_once(path: &Path) -> io::Result<Hash> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().into())
}

/// SHA-256 of an in-memory buffer, used by the Merkle engine for internal
/// node digests and by tests that don't want to touch the filesystem.
pub fn hash_bytes(data: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}
