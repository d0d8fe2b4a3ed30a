use sha2::{Digest, Sha256};

/// Cheap content-change detector: byte length plus a 64-bit digest prefix.
///
/// Two payloads with equal fingerprints are treated as identical. This is a
/// cache key, not a cryptographic guarantee: a collision between differing
/// payloads of the same length serves the older result as if unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Fingerprint {
    pub length: usize,
    pub hash: u64,
}

impl Fingerprint {
    pub fn of(bytes: &[u8]) -> Self {
        Self {
            length: bytes.len(),
            hash: short_hash(bytes),
        }
    }

    pub fn new(length: usize, hash: u64) -> Self {
        Self { length, hash }
    }
}

fn short_hash(bytes: &[u8]) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}

#[cfg(test)]
mod tests {
    use super::Fingerprint;

    #[test]
    fn identical_bytes_share_a_fingerprint() {
        assert_eq!(Fingerprint::of(b"<p>a</p>"), Fingerprint::of(b"<p>a</p>"));
    }

    #[test]
    fn length_is_part_of_the_key() {
        let a = Fingerprint::of(b"abc");
        assert_eq!(a.length, 3);
        assert_ne!(a, Fingerprint::new(4, a.hash));
    }

    #[test]
    fn different_content_changes_the_hash() {
        assert_ne!(Fingerprint::of(b"<p>a</p>"), Fingerprint::of(b"<p>b</p>"));
    }

    #[test]
    fn empty_payload_is_fingerprinted() {
        let empty = Fingerprint::of(b"");
        assert_eq!(empty.length, 0);
        assert_eq!(empty, Fingerprint::of(&[]));
    }
}
