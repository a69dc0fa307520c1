//! # Version & Migration Policy
//!
//! Two independent version axes travel with a frame:
//!
//! - the **format version** in the header, gated by [`VersionInfo::is_compatible`]
//! - the **schema version** in the payload preamble, reconciled against the registered
//!   type by a [`MigrationStrategy`]
//!
//! The strategy is evaluated once per decode, after the header has been validated and
//! before any member is bound, into a [`MigrationPolicy`] that the decoder consults for
//! unknown and missing members.

use crate::config::BehaviorFlags;
use crate::core::value::Object;
use crate::error::{ErrorCode, Result, SerializerError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionInfo {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
    pub build: u32,
    pub schema_version: u32,
    pub timestamp: Option<DateTime<Utc>>,
}

impl VersionInfo {
    pub fn new(major: u16, minor: u16, patch: u16) -> Self {
        Self {
            major,
            minor,
            patch,
            ..Self::default()
        }
    }

    pub fn with_build(mut self, build: u32) -> Self {
        self.build = build;
        self
    }

    pub fn with_schema_version(mut self, schema_version: u32) -> Self {
        self.schema_version = schema_version;
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    /// Majors must match; with `check_minor`, the data minor must be at least the
    /// required minor.
    pub fn is_compatible(data: &VersionInfo, required: &VersionInfo, check_minor: bool) -> bool {
        if data.major != required.major {
            return false;
        }
        !check_minor || data.minor >= required.minor
    }

    /// `self` as the data version.
    pub fn is_compatible_with(&self, required: &VersionInfo, check_minor: bool) -> bool {
        Self::is_compatible(self, required, check_minor)
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if self.build != 0 {
            write!(f, ".{}", self.build)?;
        }
        Ok(())
    }
}

impl FromStr for VersionInfo {
    type Err = SerializerError;

    /// Parses `major.minor[.patch[.build]]`.
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || SerializerError::new(ErrorCode::InvalidArgument, format!("invalid version '{s}'"));
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() < 2 || parts.len() > 4 {
            return Err(invalid());
        }
        let num = |i: usize| -> Result<u16> {
            parts.get(i).map_or(Ok(0), |p| p.parse::<u16>().map_err(|_| invalid()))
        };
        let build = match parts.get(3) {
            Some(p) => p.parse::<u32>().map_err(|_| invalid())?,
            None => 0,
        };
        Ok(VersionInfo::new(num(0)?, num(1)?, num(2)?).with_build(build))
    }
}

/// True iff the data carries a schema version and it differs from the target.
pub fn requires_migration(data_schema: u32, target_schema: u32) -> bool {
    data_schema > 0 && data_schema != target_schema
}

/// How schema differences between data and registration are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum MigrationStrategy {
    /// Defaults for added members, drops removed ones.
    #[default]
    Automatic,
    /// Hands every differing object to the configured migrator.
    Manual,
    /// Any difference fails.
    Strict,
    /// Never fails on a difference alone.
    Lenient,
    /// Automatic for additive changes, migrator for structural ones.
    Hybrid,
    /// Fails immediately on a difference.
    Disabled,
}

/// What the decoder does with a wire member the registration does not declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnknownMemberAction {
    Ignore,
    /// Kept on the object for a migrator.
    Retain,
    /// Fails with `MemberNotFound`.
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MigratorInvocation {
    Never,
    /// Once per decoded object of the root type.
    Always,
    /// Only when unknown members were encountered.
    OnStructuralChange,
}

/// Input handed to a [`Migrator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationContext {
    pub type_name: String,
    pub from_schema: u32,
    pub to_schema: u32,
    /// Declared members absent from the payload.
    pub missing_members: Vec<String>,
}

/// User-supplied reconciliation of an object decoded from an older or newer schema.
///
/// Retained unknown members are available through [`Object::take_unknown`].
pub trait Migrator: Send + Sync {
    fn migrate(&self, object: &mut Object, context: &MigrationContext) -> Result<()>;
}

impl<F> Migrator for F
where
    F: Fn(&mut Object, &MigrationContext) -> Result<()> + Send + Sync,
{
    fn migrate(&self, object: &mut Object, context: &MigrationContext) -> Result<()> {
        self(object, context)
    }
}

/// Shareable migrator handle, held by deserialize options.
#[derive(Clone)]
pub struct MigratorRef(Arc<dyn Migrator>);

impl MigratorRef {
    pub fn new(migrator: impl Migrator + 'static) -> Self {
        Self(Arc::new(migrator))
    }

    pub fn migrate(&self, object: &mut Object, context: &MigrationContext) -> Result<()> {
        self.0.migrate(object, context).map_err(|e| match e.code() {
            ErrorCode::MigrationFailed => e,
            code => SerializerError::new(
                ErrorCode::MigrationFailed,
                format!(
                    "migrating {} from schema {} to {}: {} ({})",
                    context.type_name, context.from_schema, context.to_schema, e, code
                ),
            ),
        })
    }
}

impl fmt::Debug for MigratorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MigratorRef(..)")
    }
}

/// Resolved per-decode reconciliation rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationPolicy {
    pub unknown_members: UnknownMemberAction,
    pub use_default_for_missing: bool,
    pub enforce_required: bool,
    pub invocation: MigratorInvocation,
    pub migration_required: bool,
    /// Lenient read of a positional payload written under another schema.
    pub reinterpreted_layout: bool,
    pub data_schema: u32,
    pub target_schema: u32,
}

impl MigrationPolicy {
    /// Evaluate `strategy` for one decode.
    ///
    /// `keyed` is whether the payload carries member keys; positional payloads cannot
    /// be reconciled, so a schema difference there fails unless the strategy is
    /// lenient.
    pub fn evaluate(
        strategy: MigrationStrategy,
        data_schema: u32,
        target_schema: u32,
        keyed: bool,
        has_migrator: bool,
        behavior: BehaviorFlags,
    ) -> Result<Self> {
        let required = requires_migration(data_schema, target_schema);
        let base = Self {
            unknown_members: UnknownMemberAction::Ignore,
            use_default_for_missing: true,
            enforce_required: true,
            invocation: MigratorInvocation::Never,
            migration_required: required,
            reinterpreted_layout: false,
            data_schema,
            target_schema,
        };

        if !required {
            let strict =
                strategy == MigrationStrategy::Strict || behavior.contains(BehaviorFlags::STRICT);
            if strategy == MigrationStrategy::Lenient {
                return Ok(Self {
                    enforce_required: false,
                    ..base
                });
            }
            let unknown_members = if !strict && behavior.contains(BehaviorFlags::IGNORE_UNKNOWN_FIELDS) {
                UnknownMemberAction::Ignore
            } else {
                UnknownMemberAction::Reject
            };
            return Ok(Self {
                unknown_members,
                use_default_for_missing: !strict
                    && behavior.contains(BehaviorFlags::USE_DEFAULT_FOR_MISSING),
                ..base
            });
        }

        match strategy {
            MigrationStrategy::Disabled | MigrationStrategy::Strict => {
                return Err(SerializerError::new(
                    ErrorCode::VersionMismatch,
                    format!(
                        "schema version {data_schema} differs from {target_schema} under {strategy:?} migration"
                    ),
                ));
            }
            MigrationStrategy::Lenient => {
                if !keyed {
                    warn!(
                        data_schema,
                        target_schema,
                        "positional payload from another schema is bound by position; members may not line up"
                    );
                }
                return Ok(Self {
                    enforce_required: false,
                    reinterpreted_layout: !keyed,
                    ..base
                });
            }
            _ => {}
        }

        if !keyed {
            return Err(SerializerError::new(
                ErrorCode::IncompatibleSchemaChange,
                format!(
                    "positional payload with schema {data_schema} cannot be reconciled with {target_schema}"
                ),
            ));
        }

        Ok(match strategy {
            MigrationStrategy::Manual => {
                if !has_migrator {
                    return Err(SerializerError::new(
                        ErrorCode::MigratorNotFound,
                        "manual migration requires a migrator",
                    ));
                }
                Self {
                    unknown_members: UnknownMemberAction::Retain,
                    use_default_for_missing: false,
                    enforce_required: false,
                    invocation: MigratorInvocation::Always,
                    ..base
                }
            }
            MigrationStrategy::Hybrid => Self {
                unknown_members: UnknownMemberAction::Retain,
                invocation: MigratorInvocation::OnStructuralChange,
                ..base
            },
            _ => base,
        })
    }

    /// Whether the migrator runs for an object that did or did not carry unknown members.
    pub fn should_invoke(&self, saw_unknown: bool) -> bool {
        match self.invocation {
            MigratorInvocation::Never => false,
            MigratorInvocation::Always => true,
            MigratorInvocation::OnStructuralChange => saw_unknown,
        }
    }
}
