use sha2::{Digest, Sha256};

/// Content fingerprint: lowercase hex SHA-256 of the raw bytes.
/// Filenames and upload counts never enter the identity.
pub fn compute_fingerprint(content: &[u8]) -> String {
    format!("{:x}", Sha256::digest(content))
}

/// Cheap shape check for fingerprints arriving from outside (URLs, queues).
pub fn is_valid_fingerprint(candidate: &str) -> bool {
    candidate.len() == 64 && candidate.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
