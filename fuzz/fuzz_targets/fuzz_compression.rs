#![no_main]

use afrs::transform::compression::{compress, decompress};
use afrs::transform::CompressionAlgorithm;
use libfuzzer_sys::fuzz_target;

const ALGORITHMS: [CompressionAlgorithm; 4] = [
    CompressionAlgorithm::Lz4,
    CompressionAlgorithm::Zstd,
    CompressionAlgorithm::Gzip,
    CompressionAlgorithm::Deflate,
];

fuzz_target!(|data: &[u8]| {
    for algorithm in ALGORITHMS {
        // Round trip must be exact
        if let Ok(compressed) = compress(data, algorithm, 0) {
            let restored = decompress(&compressed, algorithm, data.len());
            assert_eq!(restored.ok().as_deref(), Some(data));
        }

        // Malformed input must fail cleanly and never exceed the declared size
        if let Ok(out) = decompress(data, algorithm, 4096) {
            assert_eq!(out.len(), 4096);
        }
    }
});
