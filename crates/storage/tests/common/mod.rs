#![allow(dead_code)]

use bytes::Bytes;
use coffer_storage::ObjectStore;
use futures::TryStreamExt;

/// Deterministic test data from a seed (LCG), so failures are reproducible.
pub fn seeded_bytes(seed: u64, len: usize) -> Bytes {
    let mut data = vec![0u8; len];
    let mut state = seed;
    for chunk in data.chunks_mut(8) {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        let bytes = state.to_le_bytes();
        chunk.copy_from_slice(&bytes[..chunk.len()]);
    }
    Bytes::from(data)
}

/// Stream an object to the end and join its chunks.
pub async fn read_object(store: &dyn ObjectStore, key: &str) -> Bytes {
    let chunks: Vec<Bytes> = store
        .get_stream(key)
        .await
        .unwrap()
        .try_collect()
        .await
        .unwrap();
    Bytes::from(chunks.concat())
}
