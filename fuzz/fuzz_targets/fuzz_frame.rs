#![no_main]

use afrs::config::DeserializeOptions;
use afrs::core::header::HEADER_SIZE;
use afrs::transform::checksum::fnv1a32;
use afrs::BinarySerializer;
use libfuzzer_sys::fuzz_target;
use once_cell::sync::Lazy;

static SERIALIZER: Lazy<BinarySerializer> = Lazy::new(BinarySerializer::new);

fuzz_target!(|data: &[u8]| {
    let lenient = DeserializeOptions::lenient();
    let safe = DeserializeOptions::safe();

    // Raw input: almost always rejected at the header
    let _ = SERIALIZER.deserialize_value(data, None, &safe);

    // Reseal the header checksum so the fuzzer reaches the body decoder
    if data.len() >= HEADER_SIZE {
        let mut frame = data.to_vec();
        let checksum = fnv1a32(&frame[..HEADER_SIZE - 4]);
        frame[HEADER_SIZE - 4..HEADER_SIZE].copy_from_slice(&checksum.to_le_bytes());
        let _ = SERIALIZER.inspect(&frame);
        let _ = SERIALIZER.deserialize_value(&frame, None, &safe);
        let _ = SERIALIZER.deserialize_value(&frame, None, &lenient);
    }
});
