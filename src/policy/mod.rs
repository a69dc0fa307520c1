//! Decode-time policies: version reconciliation, resource limits, references and unions.

pub mod guard;
pub mod reference;
pub mod version;

pub use guard::{CancellationToken, Limits, OutOfRangeHandling, ResourceGuard};
pub use reference::{ReferenceTable, ReferenceTracker, UnionFallbackBehavior};
pub use version::{
    requires_migration, MigrationContext, MigrationPolicy, MigrationStrategy, Migrator,
    MigratorRef, VersionInfo,
};
