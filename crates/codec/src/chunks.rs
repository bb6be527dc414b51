use std::collections::BTreeMap;

use crate::{CodecError, hash::chunk_hash};

/// A single chunk of file data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based chunk index.
    pub index: u32,
    /// Byte offset within the file.
    pub offset: u64,
    /// Raw chunk data.
    pub data: Vec<u8>,
    /// Hex SHA-256 of `data`.
    pub hash: String,
}

/// Number of chunks for a file of `size` bytes at the given chunk size.
pub fn chunk_count(size: u64, chunk_size: u32) -> Result<u32, CodecError> {
    if chunk_size == 0 {
        return Err(CodecError::ZeroChunkSize);
    }
    Ok(size.div_ceil(chunk_size as u64) as u32)
}

/// Splits `data` into fixed-size chunks.
///
/// Chunk `i` covers bytes `[i*S, min((i+1)*S, len))`; only the last chunk
/// may be short. Deterministic: identical input yields identical chunks.
pub fn split(data: &[u8], chunk_size: u32) -> Result<Vec<Chunk>, CodecError> {
    if chunk_size == 0 {
        return Err(CodecError::ZeroChunkSize);
    }

    let chunks = data
        .chunks(chunk_size as usize)
        .enumerate()
        .map(|(i, piece)| Chunk {
            index: i as u32,
            offset: i as u64 * chunk_size as u64,
            data: piece.to_vec(),
            hash: chunk_hash(piece),
        })
        .collect();
    Ok(chunks)
}

/// Rebuilds the original byte stream from chunks, in any input order.
///
/// `declared_hashes` is the ordered per-chunk hash list from the file
/// descriptor; its length defines the expected chunk count. Fails with
/// [`CodecError::IncompleteInput`] when any index in `[0, count)` is
/// absent, and [`CodecError::Integrity`] when a recomputed hash disagrees
/// with the declared one.
pub fn reassemble(chunks: &[Chunk], declared_hashes: &[String]) -> Result<Vec<u8>, CodecError> {
    let count = declared_hashes.len() as u32;

    let by_index: BTreeMap<u32, &Chunk> = chunks
        .iter()
        .filter(|c| c.index < count)
        .map(|c| (c.index, c))
        .collect();

    let missing: Vec<u32> = (0..count).filter(|i| !by_index.contains_key(i)).collect();
    if !missing.is_empty() {
        return Err(CodecError::IncompleteInput { missing });
    }

    let mut data = Vec::with_capacity(chunks.iter().map(|c| c.data.len()).sum());
    for (index, chunk) in by_index {
        let actual = chunk_hash(&chunk.data);
        let declared = &declared_hashes[index as usize];
        if actual != *declared {
            return Err(CodecError::Integrity {
                index,
                declared: declared.clone(),
                actual,
            });
        }
        data.extend_from_slice(&chunk.data);
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hashes(chunks: &[Chunk]) -> Vec<String> {
        chunks.iter().map(|c| c.hash.clone()).collect()
    }

    #[test]
    fn chunk_count_rounds_up() {
        assert_eq!(chunk_count(0, 4).unwrap(), 0);
        assert_eq!(chunk_count(4, 4).unwrap(), 1);
        assert_eq!(chunk_count(5, 4).unwrap(), 2);
        assert_eq!(chunk_count(10 * 1024 * 1024, 1024 * 1024).unwrap(), 10);
    }

    #[test]
    fn chunk_count_rejects_zero_chunk_size() {
        assert!(matches!(chunk_count(10, 0), Err(CodecError::ZeroChunkSize)));
    }

    #[test]
    fn split_exact_and_short_last_chunk() {
        let chunks = split(b"AABBCCDDEE", 4).unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].data, b"AABB");
        assert_eq!(chunks[0].offset, 0);
        assert_eq!(chunks[1].data, b"CCDD");
        assert_eq!(chunks[1].offset, 4);
        assert_eq!(chunks[2].data, b"EE");
        assert_eq!(chunks[2].offset, 8);
        assert_eq!(chunks[2].index, 2);
    }

    #[test]
    fn split_empty_input() {
        let chunks = split(b"", 4).unwrap();
        assert!(chunks.is_empty());
        assert_eq!(reassemble(&chunks, &[]).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn split_is_deterministic() {
        let data: Vec<u8> = (0..=255u8).cycle().take(10_000).collect();
        let a = split(&data, 1000).unwrap();
        let b = split(&data, 1000).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn roundtrip_various_chunk_sizes() {
        let data: Vec<u8> = (0..=255u8).cycle().take(7777).collect();
        for chunk_size in [1u32, 7, 256, 1024, 7777, 10_000] {
            let chunks = split(&data, chunk_size).unwrap();
            let declared = hashes(&chunks);
            let rebuilt = reassemble(&chunks, &declared).unwrap();
            assert_eq!(rebuilt, data, "chunk_size={chunk_size}");
        }
    }

    #[test]
    fn reassemble_accepts_unordered_input() {
        let data = b"the quick brown fox jumps over the lazy dog";
        let mut chunks = split(data, 5).unwrap();
        let declared = hashes(&chunks);
        chunks.reverse();
        assert_eq!(reassemble(&chunks, &declared).unwrap(), data);
    }

    #[test]
    fn reassemble_reports_missing_indices() {
        let mut chunks = split(b"0123456789", 3).unwrap();
        let declared = hashes(&chunks);
        chunks.remove(1);
        let err = reassemble(&chunks, &declared).unwrap_err();
        match err {
            CodecError::IncompleteInput { missing } => assert_eq!(missing, vec![1]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn reassemble_detects_corruption() {
        let mut chunks = split(b"0123456789", 3).unwrap();
        let declared = hashes(&chunks);
        chunks[1].data[0] ^= 0xFF;
        let err = reassemble(&chunks, &declared).unwrap_err();
        assert!(matches!(err, CodecError::Integrity { index: 1, .. }));
    }

    #[test]
    fn reassemble_detects_swapped_chunks() {
        // Two chunks with swapped indices must not pass the declared-hash
        // check even though each chunk is individually valid.
        let mut chunks = split(b"AAAABBBB", 4).unwrap();
        let declared = hashes(&chunks);
        chunks[0].index = 1;
        chunks[1].index = 0;
        let err = reassemble(&chunks, &declared).unwrap_err();
        assert!(matches!(err, CodecError::Integrity { .. }));
    }
}
