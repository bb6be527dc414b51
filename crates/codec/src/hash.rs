use sha2::{Digest, Sha256};

/// Computes SHA-256 of a chunk and returns the hex-encoded digest.
pub fn chunk_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of whole-file content.
///
/// Same digest as [`chunk_hash`]; the separate name marks the call sites
/// that derive file ids and run the final reassembly gate.
pub fn content_hash(data: &[u8]) -> String {
    chunk_hash(data)
}

/// Incremental SHA-256 for content too large to hold in memory.
///
/// Feeding the same bytes in any split yields the same digest as
/// [`content_hash`] over the whole input.
#[derive(Default)]
pub struct ContentHasher(Sha256);

impl ContentHasher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.0.update(data);
    }

    pub fn finish(self) -> String {
        hex::encode(self.0.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_deterministic() {
        let a = chunk_hash(b"hello world");
        let b = chunk_hash(b"hello world");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64); // SHA-256 = 64 hex chars.
    }

    #[test]
    fn hash_differs_for_different_data() {
        assert_ne!(chunk_hash(b"hello"), chunk_hash(b"world"));
    }

    #[test]
    fn single_bit_flip_changes_digest() {
        let data = vec![0u8; 256];
        let mut flipped = data.clone();
        flipped[100] ^= 0x01;
        assert_ne!(chunk_hash(&data), chunk_hash(&flipped));
    }

    #[test]
    fn streaming_matches_one_shot() {
        let data: Vec<u8> = (0..=255u8).cycle().take(5000).collect();
        let mut hasher = ContentHasher::new();
        for piece in data.chunks(777) {
            hasher.update(piece);
        }
        assert_eq!(hasher.finish(), content_hash(&data));
    }

    #[test]
    fn known_vector() {
        // SHA-256 of the empty string.
        assert_eq!(
            chunk_hash(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
