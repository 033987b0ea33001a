//! Request fingerprinting for conflict detection.

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a request body.
///
/// Stored alongside an idempotency record so a retried key can be checked
/// against the bytes it was first used with.
pub fn request_fingerprint(body: &[u8]) -> String {
    let digest = Sha256::digest(body);
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable() {
        let a = request_fingerprint(b"{\"amount\":100}");
        let b = request_fingerprint(b"{\"amount\":100}");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_differs_on_different_bodies() {
        let a = request_fingerprint(b"{\"amount\":100}");
        let b = request_fingerprint(b"{\"amount\":101}");
        assert_ne!(a, b);
    }
}
