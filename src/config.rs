//! # Options
//!
//! Immutable, validated configuration for serialize and deserialize calls.
//!
//! Options are built through a builder whose `build()` runs the same validation that
//! every operation repeats on entry. A built value is never mutated; derived options go
//! through `to_builder()`.
//!
//! ## Configuration Sources
//! - Named presets (`SerializeOptions::for_network()`, `DeserializeOptions::safe()`, ...)
//! - Builders
//! - TOML via `from_toml()` / `to_toml()`
//!
//! Secret keys, migrators and cancellation tokens are runtime-only and never appear
//! in TOML.
//!
//! ## Example
//! ```rust
//! use afrs::config::SerializeOptions;
//! use afrs::core::mode::SerializationMode;
//! use afrs::transform::CompressionAlgorithm;
//!
//! let opts = SerializeOptions::builder()
//!     .mode(SerializationMode::VersionTolerant)
//!     .compression(CompressionAlgorithm::Zstd)
//!     .compression_level(5)
//!     .build()
//!     .unwrap();
//! assert_eq!(opts.compression_level(), 5);
//! ```

use crate::core::buffer::Endianness;
use crate::core::mode::{Capabilities, Layout, SerializationMode};
use crate::error::{ErrorCode, Result, SerializerError};
use crate::policy::guard::{CancellationToken, Limits, OutOfRangeHandling};
use crate::policy::reference::UnionFallbackBehavior;
use crate::policy::version::{MigrationStrategy, MigratorRef, VersionInfo};
use crate::transform::checksum::ChecksumAlgorithm;
use crate::transform::compression::CompressionAlgorithm;
use crate::transform::encryption::{EncryptionAlgorithm, EncryptionKey};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};

/// Payloads smaller than this bypass compression by default.
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 512;

/// No deadline.
pub const INFINITE_TIMEOUT: i64 = -1;

/// Character encoding of string values on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum StringEncoding {
    #[default]
    Utf8,
    /// UTF-16 code units in the frame's byte order.
    Utf16,
    /// 7-bit ASCII; other characters fail to encode.
    Ascii,
    /// ISO-8859-1; characters above U+00FF fail to encode.
    Latin1,
}

impl StringEncoding {
    pub fn id(self) -> u8 {
        match self {
            StringEncoding::Utf8 => 0,
            StringEncoding::Utf16 => 1,
            StringEncoding::Ascii => 2,
            StringEncoding::Latin1 => 3,
        }
    }

    pub fn from_id(id: u8) -> Result<Self> {
        match id {
            0 => Ok(StringEncoding::Utf8),
            1 => Ok(StringEncoding::Utf16),
            2 => Ok(StringEncoding::Ascii),
            3 => Ok(StringEncoding::Latin1),
            other => Err(SerializerError::new(
                ErrorCode::InvalidEncoding,
                format!("unknown string encoding id {other}"),
            )),
        }
    }

    /// Bytes per code unit.
    pub fn unit_size(self) -> usize {
        match self {
            StringEncoding::Utf16 => 2,
            _ => 1,
        }
    }
}

bitflags! {
    /// Behaviour switches shared by serialize and deserialize options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct BehaviorFlags: u32 {
        /// Write the root type name into the payload preamble.
        const INCLUDE_TYPE_INFO = 0x0001;
        /// Write member wire names next to their keys.
        const INCLUDE_FIELD_NAMES = 0x0002;
        const IGNORE_NULL_VALUES = 0x0004;
        const IGNORE_DEFAULT_VALUES = 0x0008;
        /// Reject unknown members and never default missing ones.
        const STRICT = 0x0010;
        const INTERN_STRINGS = 0x0020;
        /// Keep compressed output only when it is smaller.
        const ADAPTIVE_COMPRESSION = 0x0040;
        const IGNORE_UNKNOWN_FIELDS = 0x0080;
        const USE_DEFAULT_FOR_MISSING = 0x0100;
        const ALLOW_TRAILING_DATA = 0x0200;
    }
}

impl Default for BehaviorFlags {
    fn default() -> Self {
        BehaviorFlags::ADAPTIVE_COMPRESSION
            | BehaviorFlags::IGNORE_UNKNOWN_FIELDS
            | BehaviorFlags::USE_DEFAULT_FOR_MISSING
    }
}

fn validate_timeout(timeout_ms: i64, issues: &mut Vec<String>) {
    if timeout_ms < INFINITE_TIMEOUT {
        issues.push(format!(
            "timeout_ms {timeout_ms} is invalid (use -1 for no timeout)"
        ));
    }
}

fn into_config_result(issues: Vec<String>) -> Result<()> {
    if issues.is_empty() {
        Ok(())
    } else {
        Err(SerializerError::ConfigError(format!(
            "Options validation failed:\n  - {}",
            issues.join("\n  - ")
        )))
    }
}

/// Options for one serialize call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerializeOptions {
    mode: SerializationMode,
    layout: Layout,
    compression: CompressionAlgorithm,
    /// 0 selects the algorithm's default level.
    compression_level: i32,
    compression_threshold: usize,
    encryption: EncryptionAlgorithm,
    #[serde(skip)]
    key: Option<EncryptionKey>,
    checksum: ChecksumAlgorithm,
    string_encoding: StringEncoding,
    endianness: Endianness,
    limits: Limits,
    #[serde(with = "timeout_serde")]
    timeout_ms: i64,
    flags: BehaviorFlags,
}

impl Default for SerializeOptions {
    fn default() -> Self {
        Self {
            mode: SerializationMode::Object,
            layout: Layout::Sequential,
            compression: CompressionAlgorithm::None,
            compression_level: 0,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            encryption: EncryptionAlgorithm::None,
            key: None,
            checksum: ChecksumAlgorithm::Crc32,
            string_encoding: StringEncoding::Utf8,
            endianness: Endianness::Little,
            limits: Limits::default(),
            timeout_ms: INFINITE_TIMEOUT,
            flags: BehaviorFlags::default(),
        }
    }
}

impl SerializeOptions {
    pub fn builder() -> SerializeOptionsBuilder {
        SerializeOptionsBuilder {
            options: Self::default(),
        }
    }

    pub fn to_builder(&self) -> SerializeOptionsBuilder {
        SerializeOptionsBuilder {
            options: self.clone(),
        }
    }

    /// Small frames for real-time traffic: varint packing, fast compression.
    pub fn for_network() -> Self {
        Self {
            mode: SerializationMode::Compact,
            compression: CompressionAlgorithm::Lz4,
            compression_threshold: 256,
            limits: Limits {
                max_payload_size: 4 * 1024 * 1024,
                ..Limits::default()
            },
            ..Self::default()
        }
    }

    /// Long-lived data that must survive schema changes.
    pub fn for_storage() -> Self {
        Self {
            mode: SerializationMode::VersionTolerant,
            compression: CompressionAlgorithm::Zstd,
            compression_level: 3,
            checksum: ChecksumAlgorithm::XxHash64,
            flags: BehaviorFlags::default() | BehaviorFlags::INCLUDE_TYPE_INFO,
            ..Self::default()
        }
    }

    /// Shared and cyclic game state with polymorphic members.
    pub fn for_save_game() -> Self {
        Self {
            mode: SerializationMode::Full,
            compression: CompressionAlgorithm::Lz4,
            checksum: ChecksumAlgorithm::Crc32,
            flags: BehaviorFlags::default()
                | BehaviorFlags::INCLUDE_TYPE_INFO
                | BehaviorFlags::INTERN_STRINGS,
            ..Self::default()
        }
    }

    /// Self-describing frames for inspection.
    pub fn for_debug() -> Self {
        Self {
            mode: SerializationMode::Debug,
            flags: BehaviorFlags::default()
                | BehaviorFlags::INCLUDE_TYPE_INFO
                | BehaviorFlags::INCLUDE_FIELD_NAMES,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> SerializationMode {
        self.mode
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Wire capabilities this configuration produces.
    pub fn capabilities(&self) -> Capabilities {
        let mut caps = Capabilities::resolve(self.mode, self.layout);
        if self.flags.contains(BehaviorFlags::INCLUDE_FIELD_NAMES) {
            caps.debug_info = true;
        }
        caps
    }

    pub fn compression(&self) -> CompressionAlgorithm {
        self.compression
    }

    /// Configured level, or the algorithm default when unset.
    pub fn compression_level(&self) -> i32 {
        if self.compression_level == 0 {
            self.compression.default_level()
        } else {
            self.compression_level
        }
    }

    pub fn compression_threshold(&self) -> usize {
        self.compression_threshold
    }

    pub fn encryption(&self) -> EncryptionAlgorithm {
        self.encryption
    }

    pub fn key(&self) -> Option<&EncryptionKey> {
        self.key.as_ref()
    }

    pub fn checksum(&self) -> ChecksumAlgorithm {
        self.checksum
    }

    pub fn string_encoding(&self) -> StringEncoding {
        self.string_encoding
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn timeout_ms(&self) -> i64 {
        self.timeout_ms
    }

    pub fn flags(&self) -> BehaviorFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: BehaviorFlags) -> bool {
        self.flags.contains(flag)
    }

    /// Collect every configuration issue. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut issues = self.limits.validate();
        validate_timeout(self.timeout_ms, &mut issues);

        if self.compression_level != 0 {
            if let Some((min, max)) = self.compression.level_range() {
                if !(min..=max).contains(&self.compression_level) {
                    issues.push(format!(
                        "compression level {} outside {}..={} for {}",
                        self.compression_level,
                        min,
                        max,
                        self.compression.name()
                    ));
                }
            }
        }

        if self.flags.contains(BehaviorFlags::INTERN_STRINGS)
            && self.string_encoding != StringEncoding::Utf8
        {
            issues.push("string interning requires UTF-8 string encoding".to_string());
        }

        issues
    }

    pub fn validate_strict(&self) -> Result<()> {
        into_config_result(self.validate())
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let options = toml::from_str::<Self>(content)
            .map_err(|e| SerializerError::ConfigError(format!("Failed to parse TOML: {e}")))?;
        options.validate_strict()?;
        Ok(options)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SerializerError::ConfigError(format!("Failed to serialize options: {e}")))
    }
}

#[derive(Debug, Clone)]
pub struct SerializeOptionsBuilder {
    options: SerializeOptions,
}

impl SerializeOptionsBuilder {
    pub fn mode(mut self, mode: SerializationMode) -> Self {
        self.options.mode = mode;
        self
    }

    pub fn layout(mut self, layout: Layout) -> Self {
        self.options.layout = layout;
        self
    }

    pub fn compression(mut self, algorithm: CompressionAlgorithm) -> Self {
        self.options.compression = algorithm;
        self
    }

    pub fn compression_level(mut self, level: i32) -> Self {
        self.options.compression_level = level;
        self
    }

    pub fn compression_threshold(mut self, bytes: usize) -> Self {
        self.options.compression_threshold = bytes;
        self
    }

    pub fn encryption(mut self, algorithm: EncryptionAlgorithm, key: EncryptionKey) -> Self {
        self.options.encryption = algorithm;
        self.options.key = Some(key);
        self
    }

    /// Select an algorithm without a key; the serialize call then fails
    /// `InvalidEncryptionKey`.
    pub fn encryption_algorithm(mut self, algorithm: EncryptionAlgorithm) -> Self {
        self.options.encryption = algorithm;
        self
    }

    pub fn checksum(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.options.checksum = algorithm;
        self
    }

    pub fn string_encoding(mut self, encoding: StringEncoding) -> Self {
        self.options.string_encoding = encoding;
        self
    }

    pub fn endianness(mut self, endianness: Endianness) -> Self {
        self.options.endianness = endianness;
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.options.limits = limits;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.options.limits.max_depth = depth;
        self
    }

    pub fn max_object_count(mut self, count: usize) -> Self {
        self.options.limits.max_object_count = count;
        self
    }

    pub fn max_collection_count(mut self, count: usize) -> Self {
        self.options.limits.max_collection_count = count;
        self
    }

    pub fn max_string_length(mut self, units: usize) -> Self {
        self.options.limits.max_string_length = units;
        self
    }

    pub fn max_payload_size(mut self, bytes: usize) -> Self {
        self.options.limits.max_payload_size = bytes;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.options.timeout_ms = timeout_ms;
        self
    }

    /// Replace the whole flag set.
    pub fn flags(mut self, flags: BehaviorFlags) -> Self {
        self.options.flags = flags;
        self
    }

    pub fn flag(mut self, flag: BehaviorFlags, enabled: bool) -> Self {
        self.options.flags.set(flag, enabled);
        self
    }

    pub fn build(self) -> Result<SerializeOptions> {
        self.options.validate_strict()?;
        Ok(self.options)
    }
}

/// Options for one deserialize call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeserializeOptions {
    /// Expected mode; `None` accepts whatever mode the header declares.
    mode: Option<SerializationMode>,
    layout: Layout,
    #[serde(skip)]
    key: Option<EncryptionKey>,
    limits: Limits,
    #[serde(with = "timeout_serde")]
    timeout_ms: i64,
    flags: BehaviorFlags,
    migration: MigrationStrategy,
    #[serde(skip)]
    migrator: Option<MigratorRef>,
    union_fallback: UnionFallbackBehavior,
    fallback_type: Option<String>,
    out_of_range: OutOfRangeHandling,
    #[serde(skip)]
    cancellation: Option<CancellationToken>,
    min_format_version: VersionInfo,
    check_minor_version: bool,
    /// Schema to reconcile against; defaults to the registered root's schema.
    target_schema_version: Option<u32>,
}

impl Default for DeserializeOptions {
    fn default() -> Self {
        Self {
            mode: None,
            layout: Layout::Sequential,
            key: None,
            limits: Limits::default(),
            timeout_ms: INFINITE_TIMEOUT,
            flags: BehaviorFlags::default(),
            migration: MigrationStrategy::Automatic,
            migrator: None,
            union_fallback: UnionFallbackBehavior::ThrowException,
            fallback_type: None,
            out_of_range: OutOfRangeHandling::Error,
            cancellation: None,
            min_format_version: VersionInfo::new(1, 0, 0),
            check_minor_version: false,
            target_schema_version: None,
        }
    }
}

impl DeserializeOptions {
    pub fn builder() -> DeserializeOptionsBuilder {
        DeserializeOptionsBuilder {
            options: Self::default(),
        }
    }

    pub fn to_builder(&self) -> DeserializeOptionsBuilder {
        DeserializeOptionsBuilder {
            options: self.clone(),
        }
    }

    /// Tight limits and a deadline for untrusted input.
    pub fn safe() -> Self {
        Self {
            limits: Limits::restrictive(),
            timeout_ms: 5_000,
            flags: BehaviorFlags::default() | BehaviorFlags::STRICT,
            ..Self::default()
        }
    }

    /// Any schema or member difference fails.
    pub fn strict() -> Self {
        Self {
            migration: MigrationStrategy::Strict,
            flags: BehaviorFlags::default() | BehaviorFlags::STRICT,
            check_minor_version: true,
            ..Self::default()
        }
    }

    /// Accept as much as possible.
    pub fn lenient() -> Self {
        Self {
            migration: MigrationStrategy::Lenient,
            union_fallback: UnionFallbackBehavior::ReturnNull,
            out_of_range: OutOfRangeHandling::Truncate,
            flags: BehaviorFlags::default() | BehaviorFlags::ALLOW_TRAILING_DATA,
            ..Self::default()
        }
    }

    pub fn version_tolerant() -> Self {
        Self {
            mode: Some(SerializationMode::VersionTolerant),
            migration: MigrationStrategy::Automatic,
            ..Self::default()
        }
    }

    pub fn mode(&self) -> Option<SerializationMode> {
        self.mode
    }

    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Structural capabilities the configured mode expects, if one is configured.
    pub fn expected_capabilities(&self) -> Option<Capabilities> {
        self.mode.map(|m| Capabilities::resolve(m, self.layout))
    }

    pub fn key(&self) -> Option<&EncryptionKey> {
        self.key.as_ref()
    }

    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    pub fn timeout_ms(&self) -> i64 {
        self.timeout_ms
    }

    pub fn flags(&self) -> BehaviorFlags {
        self.flags
    }

    pub fn has_flag(&self, flag: BehaviorFlags) -> bool {
        self.flags.contains(flag)
    }

    pub fn migration(&self) -> MigrationStrategy {
        self.migration
    }

    pub fn migrator(&self) -> Option<&MigratorRef> {
        self.migrator.as_ref()
    }

    pub fn union_fallback(&self) -> UnionFallbackBehavior {
        self.union_fallback
    }

    pub fn fallback_type(&self) -> Option<&str> {
        self.fallback_type.as_deref()
    }

    pub fn out_of_range(&self) -> OutOfRangeHandling {
        self.out_of_range
    }

    pub fn cancellation(&self) -> Option<&CancellationToken> {
        self.cancellation.as_ref()
    }

    pub fn min_format_version(&self) -> &VersionInfo {
        &self.min_format_version
    }

    pub fn check_minor_version(&self) -> bool {
        self.check_minor_version
    }

    pub fn target_schema_version(&self) -> Option<u32> {
        self.target_schema_version
    }

    pub fn validate(&self) -> Vec<String> {
        let mut issues = self.limits.validate();
        validate_timeout(self.timeout_ms, &mut issues);

        if self.union_fallback == UnionFallbackBehavior::UseFallbackType
            && self.fallback_type.as_deref().map_or(true, str::is_empty)
        {
            issues.push("UseFallbackType requires a fallback_type".to_string());
        }
        if self.min_format_version.major == 0 {
            issues.push("min_format_version major must be at least 1".to_string());
        }

        issues
    }

    pub fn validate_strict(&self) -> Result<()> {
        into_config_result(self.validate())
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let options = toml::from_str::<Self>(content)
            .map_err(|e| SerializerError::ConfigError(format!("Failed to parse TOML: {e}")))?;
        options.validate_strict()?;
        Ok(options)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| SerializerError::ConfigError(format!("Failed to serialize options: {e}")))
    }
}

#[derive(Debug, Clone)]
pub struct DeserializeOptionsBuilder {
    options: DeserializeOptions,
}

impl DeserializeOptionsBuilder {
    pub fn mode(mut self, mode: SerializationMode) -> Self {
        self.options.mode = Some(mode);
        self
    }

    /// Accept the header's mode.
    pub fn any_mode(mut self) -> Self {
        self.options.mode = None;
        self
    }

    pub fn layout(mut self, layout: Layout) -> Self {
        self.options.layout = layout;
        self
    }

    pub fn key(mut self, key: EncryptionKey) -> Self {
        self.options.key = Some(key);
        self
    }

    pub fn limits(mut self, limits: Limits) -> Self {
        self.options.limits = limits;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.options.limits.max_depth = depth;
        self
    }

    pub fn max_object_count(mut self, count: usize) -> Self {
        self.options.limits.max_object_count = count;
        self
    }

    pub fn max_collection_count(mut self, count: usize) -> Self {
        self.options.limits.max_collection_count = count;
        self
    }

    pub fn max_string_length(mut self, units: usize) -> Self {
        self.options.limits.max_string_length = units;
        self
    }

    pub fn max_payload_size(mut self, bytes: usize) -> Self {
        self.options.limits.max_payload_size = bytes;
        self
    }

    pub fn timeout_ms(mut self, timeout_ms: i64) -> Self {
        self.options.timeout_ms = timeout_ms;
        self
    }

    pub fn flags(mut self, flags: BehaviorFlags) -> Self {
        self.options.flags = flags;
        self
    }

    pub fn flag(mut self, flag: BehaviorFlags, enabled: bool) -> Self {
        self.options.flags.set(flag, enabled);
        self
    }

    pub fn migration(mut self, strategy: MigrationStrategy) -> Self {
        self.options.migration = strategy;
        self
    }

    pub fn migrator(mut self, migrator: MigratorRef) -> Self {
        self.options.migrator = Some(migrator);
        self
    }

    pub fn union_fallback(mut self, behavior: UnionFallbackBehavior) -> Self {
        self.options.union_fallback = behavior;
        self
    }

    pub fn fallback_type(mut self, type_name: impl Into<String>) -> Self {
        self.options.fallback_type = Some(type_name.into());
        self
    }

    pub fn out_of_range(mut self, handling: OutOfRangeHandling) -> Self {
        self.options.out_of_range = handling;
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.options.cancellation = Some(token);
        self
    }

    pub fn min_format_version(mut self, version: VersionInfo) -> Self {
        self.options.min_format_version = version;
        self
    }

    pub fn check_minor_version(mut self, check: bool) -> Self {
        self.options.check_minor_version = check;
        self
    }

    pub fn target_schema_version(mut self, schema: u32) -> Self {
        self.options.target_schema_version = Some(schema);
        self
    }

    pub fn build(self) -> Result<DeserializeOptions> {
        self.options.validate_strict()?;
        Ok(self.options)
    }
}

/// Timeouts serialize as milliseconds, with `"infinite"` standing for -1.
mod timeout_serde {
    use super::INFINITE_TIMEOUT;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Millis(i64),
        Named(String),
    }

    pub fn serialize<S>(timeout_ms: &i64, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if *timeout_ms == INFINITE_TIMEOUT {
            "infinite".serialize(serializer)
        } else {
            timeout_ms.serialize(serializer)
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<i64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Repr::deserialize(deserializer)? {
            Repr::Millis(ms) => Ok(ms),
            Repr::Named(name) if name.eq_ignore_ascii_case("infinite") => Ok(INFINITE_TIMEOUT),
            Repr::Named(name) => Err(serde::de::Error::custom(format!(
                "Invalid timeout: {name}"
            ))),
        }
    }
}
