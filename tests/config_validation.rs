//! Integration tests for option validation and TOML configuration

#![allow(clippy::unwrap_used, clippy::expect_used)]

use afrs::config::{DeserializeOptions, SerializeOptions, StringEncoding};
use afrs::core::mode::{Layout, SerializationMode};
use afrs::error::ErrorCode;
use afrs::policy::{MigrationStrategy, UnionFallbackBehavior, VersionInfo};
use afrs::transform::CompressionAlgorithm;
use afrs::BehaviorFlags;

fn serialize_issues(toml_text: &str) -> Vec<String> {
    toml::from_str::<SerializeOptions>(toml_text)
        .expect("well-formed TOML")
        .validate()
}

fn deserialize_issues(toml_text: &str) -> Vec<String> {
    toml::from_str::<DeserializeOptions>(toml_text)
        .expect("well-formed TOML")
        .validate()
}

#[test]
fn test_defaults_and_presets_validate() {
    for opts in [
        SerializeOptions::default(),
        SerializeOptions::for_network(),
        SerializeOptions::for_storage(),
        SerializeOptions::for_save_game(),
        SerializeOptions::for_debug(),
    ] {
        let errors = opts.validate();
        assert!(errors.is_empty(), "{:?}: {errors:?}", opts.mode());
    }
    for opts in [
        DeserializeOptions::default(),
        DeserializeOptions::safe(),
        DeserializeOptions::strict(),
        DeserializeOptions::lenient(),
        DeserializeOptions::version_tolerant(),
    ] {
        let errors = opts.validate();
        assert!(errors.is_empty(), "{errors:?}");
    }
}

#[test]
fn test_preset_contents() {
    let network = SerializeOptions::for_network();
    assert_eq!(network.mode(), SerializationMode::Compact);
    assert_eq!(network.compression(), CompressionAlgorithm::Lz4);
    assert_eq!(network.compression_threshold(), 256);

    let storage = SerializeOptions::for_storage();
    assert_eq!(storage.mode(), SerializationMode::VersionTolerant);
    assert!(storage.has_flag(BehaviorFlags::INCLUDE_TYPE_INFO));

    let strict = DeserializeOptions::strict();
    assert_eq!(strict.migration(), MigrationStrategy::Strict);
    assert!(strict.has_flag(BehaviorFlags::STRICT));
    assert!(strict.check_minor_version());

    let lenient = DeserializeOptions::lenient();
    assert_eq!(lenient.union_fallback(), UnionFallbackBehavior::ReturnNull);
    assert!(lenient.has_flag(BehaviorFlags::ALLOW_TRAILING_DATA));

    assert_eq!(
        DeserializeOptions::version_tolerant().mode(),
        Some(SerializationMode::VersionTolerant)
    );
    assert!(DeserializeOptions::safe().timeout_ms() > 0);
}

#[test]
fn test_depth_bounds() {
    let errors = serialize_issues("[limits]\nmax_depth = 0\n");
    assert!(errors.iter().any(|e| e.contains("max_depth 0")));

    let errors = deserialize_issues("[limits]\nmax_depth = 2048\n");
    assert!(errors.iter().any(|e| e.contains("outside 1..=1024")));

    assert!(deserialize_issues("[limits]\nmax_depth = 1024\n").is_empty());
}

#[test]
fn test_zero_limits() {
    let errors = deserialize_issues(
        "[limits]\nmax_object_count = 0\nmax_collection_count = 0\nmax_string_length = 0\n",
    );
    assert_eq!(errors.len(), 3, "{errors:?}");
    assert!(errors.iter().all(|e| e.contains("must be greater than 0")));
}

#[test]
fn test_oversized_payload_limit() {
    let errors = serialize_issues("[limits]\nmax_payload_size = 8589934592\n");
    assert!(errors.iter().any(|e| e.contains("32-bit")));
}

#[test]
fn test_timeout_values() {
    assert!(deserialize_issues("timeout_ms = \"infinite\"\n").is_empty());
    assert!(deserialize_issues("timeout_ms = 0\n").is_empty());
    let errors = deserialize_issues("timeout_ms = -7\n");
    assert!(errors.iter().any(|e| e.contains("use -1 for no timeout")));
    assert!(toml::from_str::<DeserializeOptions>("timeout_ms = \"forever\"\n").is_err());
}

#[test]
fn test_compression_level_outside_range() {
    let errors = serialize_issues("compression = \"Zstd\"\ncompression_level = 40\n");
    assert!(errors.iter().any(|e| e.contains("outside 1..=22")));

    let built = SerializeOptions::builder()
        .compression(CompressionAlgorithm::Gzip)
        .compression_level(12)
        .build();
    assert_eq!(built.unwrap_err().code(), ErrorCode::InvalidConfiguration);
}

#[test]
fn test_interning_needs_utf8() {
    let built = SerializeOptions::builder()
        .string_encoding(StringEncoding::Utf16)
        .flag(BehaviorFlags::INTERN_STRINGS, true)
        .build();
    let err = built.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
    assert!(err.to_string().contains("UTF-8"));
}

#[test]
fn test_fallback_type_and_format_version() {
    let errors = deserialize_issues("union_fallback = \"UseFallbackType\"\n");
    assert!(errors.iter().any(|e| e.contains("requires a fallback_type")));
    assert!(deserialize_issues(
        "union_fallback = \"UseFallbackType\"\nfallback_type = \"game.Entity\"\n"
    )
    .is_empty());

    let built = DeserializeOptions::builder()
        .min_format_version(VersionInfo::new(0, 9, 0))
        .build();
    assert!(built.is_err());
}

#[test]
fn test_from_toml_rejects_what_validate_reports() {
    let err = DeserializeOptions::from_toml("[limits]\nmax_depth = 0\n").unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidConfiguration);

    let err = SerializeOptions::from_toml("mode = \"NoSuchMode\"\n").unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidConfiguration);
}

#[test]
fn test_storage_file_round_trip() {
    let text = r#"
        mode = "Full"
        layout = "KeyValue"
        compression = "Zstd"
        compression_level = 9
        checksum = "Sha256"
        timeout_ms = 1500

        [limits]
        max_depth = 32
        max_object_count = 5000
    "#;
    let opts = SerializeOptions::from_toml(text).unwrap();
    assert_eq!(opts.mode(), SerializationMode::Full);
    assert_eq!(opts.layout(), Layout::KeyValue);
    assert_eq!(opts.compression_level(), 9);
    assert_eq!(opts.limits().max_depth, 32);
    assert_eq!(opts.limits().max_collection_count, 1_000_000);
    assert_eq!(opts.timeout_ms(), 1500);

    let again = SerializeOptions::from_toml(&opts.to_toml().unwrap()).unwrap();
    assert_eq!(again, opts);
}

#[test]
fn test_mode_capabilities() {
    for mode in SerializationMode::ALL {
        let caps = mode.capabilities();
        assert!(caps.structurally_matches(caps), "{}", mode.name());
    }
    let full = SerializationMode::Full.capabilities();
    assert!(full.keyed && full.references && full.type_tags);
    assert!(!full.debug_info);
    assert!(SerializationMode::Debug.capabilities().debug_info);
    assert!(SerializationMode::Compact.capabilities().bit_packed);
    assert!(SerializationMode::Streaming.capabilities().streaming);

    let forced = SerializeOptions::builder()
        .mode(SerializationMode::Object)
        .layout(Layout::KeyValue)
        .build()
        .unwrap();
    assert!(forced.capabilities().keyed);
}
