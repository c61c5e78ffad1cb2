//! The hash chain primitive: `sha256:` + hex, and the all-zeros genesis value.

use sha2::{Digest, Sha256};

/// `prev_hash` of the very first line in a fresh log.
pub const GENESIS_HASH: &str = "sha256:0000000000000000000000000000000000000000000000000000000000000000";

/// `sha256` of the exact bytes of one serialized line (no trailing newline),
/// hex-encoded and prefixed `"sha256:"`.
pub fn hash_line(line: &[u8]) -> String {
    let digest = Sha256::digest(line);
    format!("sha256:{}", hex::encode(digest))
}
