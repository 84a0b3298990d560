//! Error taxonomy for the catalog store.
//!
//! Every boundary operation returns [`StoreResult`]. Validation,
//! duplicate-identifier and allocator-exhaustion failures are recoverable
//! and never leave a partial write behind; migration and integrity
//! failures are fatal for the operation that raised them but leave the
//! store file untouched at its last good state.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// Malformed identifier, missing required field or out-of-range code.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The compact identifier is already assigned to another track.
    #[error("identifier '{0}' is already assigned to another track")]
    DuplicateIdentifier(String),

    /// All 999 sequence numbers for the stem are taken. The caller may
    /// retry with a different year or artist code; numbers are never
    /// reused.
    #[error("no free sequence number (001-999) left for stem '{stem}'")]
    ExhaustedSequence { stem: String },

    /// A custom-field payload contradicts the field's declared kind.
    #[error("custom field '{field}' stores {expected} values, got {given}")]
    KindMismatch {
        field: String,
        expected: &'static str,
        given: &'static str,
    },

    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    /// A migration step failed and was unwound; the version counter is
    /// unadvanced and the same step is retried on the next open.
    #[error("schema migration failed: {0:#}")]
    MigrationFailure(anyhow::Error),

    /// The self-consistency check reported corruption.
    #[error("integrity check failed: {0}")]
    IntegrityFailure(String),

    #[error(transparent)]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

impl StoreError {
    /// Map a constraint violation on the compact-identifier unique index
    /// to [`StoreError::DuplicateIdentifier`]; the index is the final
    /// authority on uniqueness, the allocator scan only an optimization.
    pub(crate) fn from_track_insert(err: rusqlite::Error, iso_isrc: &str) -> Self {
        if let rusqlite::Error::SqliteFailure(e, Some(msg)) = &err {
            if e.code == rusqlite::ErrorCode::ConstraintViolation && msg.contains("isrc") {
                return StoreError::DuplicateIdentifier(iso_isrc.to_string());
            }
        }
        StoreError::Database(err)
    }
}
