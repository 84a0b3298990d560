//! Catalog manager core for sound-recording metadata.
//!
//! A single-user, SQLite-backed store for tracks carrying globally unique
//! industry identifiers (ISRC, ISWC). The crate owns the versioned
//! schema-migration engine, the identifier codec and sequential
//! allocator, the append-only audit trail and the backup/integrity
//! manager; presentation (forms, tables, previews) sits on top and only
//! ever calls through [`catalog_store::SqliteCatalogStore`].

pub mod catalog_store;
pub mod identifier;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use catalog_store::{
    AuditAction, AuditFilter, AuditTrail, CatalogSettings, CustomFieldKind, CustomValuePayload,
    ImportReport, IntegrityReport, NewTrack, SqliteCatalogStore, StoreError, StoreResult, Track,
    TrackRecord, TrackUpdate,
};
