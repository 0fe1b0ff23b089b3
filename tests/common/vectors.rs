use std::io::Read;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use zeppelin_remote_build::types::VectorDataType;
use zeppelin_remote_build::vectors::{InMemoryVectors, VectorValue};

/// `n` random float vectors of dimension `dims` with values in [-1, 1],
/// doc ids `0..n`.
pub fn random_float_vectors(n: usize, dims: usize) -> InMemoryVectors {
    let mut rng = StdRng::seed_from_u64(42);
    let vectors = (0..n)
        .map(|_| (0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect())
        .collect();
    InMemoryVectors::from_floats(dims, vectors).expect("valid float vectors")
}

/// `n` random vectors of `data_type`, with sparse ascending doc ids so the
/// doc id blob is not just `0..n`.
pub fn random_vectors(data_type: VectorDataType, n: usize, dims: usize, seed: u64) -> InMemoryVectors {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut doc = 0u32;
    let docs = (0..n)
        .map(|_| {
            doc += rng.gen_range(1..4);
            let value = match data_type {
                VectorDataType::Float => {
                    VectorValue::Float((0..dims).map(|_| rng.gen_range(-1.0..1.0)).collect())
                }
                VectorDataType::Byte => VectorValue::Byte((0..dims).map(|_| rng.gen()).collect()),
                VectorDataType::Binary => {
                    VectorValue::Binary((0..dims / 8).map(|_| rng.gen()).collect())
                }
            };
            (doc, value)
        })
        .collect();
    InMemoryVectors::new(data_type, dims, docs).expect("valid vectors")
}

/// Drain a reader into a vector.
pub fn read_all(mut reader: impl Read) -> Vec<u8> {
    let mut out = Vec::new();
    reader.read_to_end(&mut out).expect("read should succeed");
    out
}
