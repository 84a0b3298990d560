//! Versioned schema migration engine.
//!
//! The store's schema version is the SQLite `user_version` pragma: it is
//! persisted in the file header itself, so it survives even if every
//! application table is corrupted or absent. A brand-new store reports 0
//! and is promoted straight to [`SCHEMA_BASELINE`] without running any
//! step; from there the engine walks the fixed step table until
//! [`SCHEMA_TARGET`].
//!
//! Each step runs inside a savepoint nested in an outer transaction: the
//! body, the version advance and the migration-log row are released
//! together, and a failing body unwinds to the savepoint leaving the
//! version counter unadvanced so the same step is retried on the next
//! open. Steps are therefore written to be idempotent with respect to
//! their own preconditions (add column if absent, `CREATE ... IF NOT
//! EXISTS`), because a step may be re-attempted after an interrupted run.
//!
//! Steps are never skipped, reordered or collapsed. In particular the
//! chain carries two shipped-defective steps (6 installed an ISRC trigger
//! with one digit class too many, and a locale-sensitive GLOB date
//! check) and their corrective successors (7, 8): deployed stores have
//! already applied the defective versions, so the fixes must replay as
//! separate steps on every path through the chain.

use anyhow::{bail, Context, Result};
use rusqlite::{params, Connection};
use tracing::{info, warn};

use crate::identifier::to_compact_isrc;

/// First schema version, assigned to fresh stores without running a step.
pub const SCHEMA_BASELINE: i64 = 1;
/// Current target version. Bump when adding a new migration step.
pub const SCHEMA_TARGET: i64 = 10;

/// One registered migration step. `version` is the version the step
/// produces; the mapping from version to step is fixed at compile time.
pub struct MigrationStep {
    pub version: i64,
    pub name: &'static str,
    pub apply: fn(&Connection) -> Result<()>,
}

/// The fixed, strictly linear step table.
pub const MIGRATION_STEPS: &[MigrationStep] = &[
    MigrationStep {
        version: 2,
        name: "custom_field_metadata",
        apply: mig_custom_field_metadata,
    },
    MigrationStep {
        version: 3,
        name: "secondary_indexes",
        apply: mig_secondary_indexes,
    },
    MigrationStep {
        version: 4,
        name: "compact_isrc_column",
        apply: mig_compact_isrc_column,
    },
    MigrationStep {
        version: 5,
        name: "audit_append_only",
        apply: mig_audit_append_only,
    },
    MigrationStep {
        version: 6,
        name: "track_validation_triggers",
        apply: mig_track_validation_triggers,
    },
    MigrationStep {
        version: 7,
        name: "release_date_like_fix",
        apply: mig_release_date_like_fix,
    },
    MigrationStep {
        version: 8,
        name: "isrc_digit_count_fix",
        apply: mig_isrc_digit_count_fix,
    },
    MigrationStep {
        version: 9,
        name: "track_length_column",
        apply: mig_track_length_column,
    },
    MigrationStep {
        version: 10,
        name: "custom_field_blobs",
        apply: mig_custom_field_blobs,
    },
];

/// Read the schema version from the store file header.
pub fn schema_version(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("PRAGMA user_version", [], |r| r.get(0))
}

fn ensure_migration_log(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS migration_log (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now')),
            step TEXT
        )",
    )
}

/// Bring the store to [`SCHEMA_TARGET`], applying pending steps in order.
///
/// Returns the number of steps applied. A version above the target, or a
/// version with no registered step, halts migration with an error without
/// touching the file: the store remains usable at its last safely-reached
/// version by whatever build understands it.
pub fn migrate_schema(conn: &mut Connection) -> Result<usize> {
    ensure_migration_log(conn)?;

    let mut version = schema_version(conn)?;
    if version == 0 {
        conn.pragma_update(None, "user_version", SCHEMA_BASELINE)?;
        version = SCHEMA_BASELINE;
        info!("initialized store schema version to baseline {SCHEMA_BASELINE}");
    }
    if version > SCHEMA_TARGET {
        bail!(
            "store schema version {version} is newer than the supported target {SCHEMA_TARGET}; \
             refusing to touch it"
        );
    }

    let mut applied = 0;
    while version < SCHEMA_TARGET {
        let step = MIGRATION_STEPS
            .iter()
            .find(|s| s.version == version + 1)
            .with_context(|| {
                format!(
                    "no migration step registered for version {} (current {version})",
                    version + 1
                )
            })?;
        apply_step(conn, version, step)?;
        record_migration_audit(conn, version, step);
        info!(
            "applied migration {}->{} ({})",
            version, step.version, step.name
        );
        version = step.version;
        applied += 1;
    }
    Ok(applied)
}

/// Run one step under savepoint discipline.
///
/// The step body must not commit or roll back on its own; the savepoint
/// releases the body, the version advance and the migration-log row as a
/// unit, and the outer transaction commit makes them durable.
fn apply_step(conn: &mut Connection, from: i64, step: &MigrationStep) -> Result<()> {
    let mut tx = conn.transaction()?;
    {
        let sp = tx.savepoint_with_name("migration_step")?;
        (step.apply)(&sp)
            .with_context(|| format!("migration {}->{} ({}) failed", from, step.version, step.name))?;
        sp.pragma_update(None, "user_version", step.version)?;
        sp.execute(
            "INSERT OR REPLACE INTO migration_log (version, step) VALUES (?1, ?2)",
            params![step.version, step.name],
        )?;
        sp.commit()?;
    }
    tx.commit()?;
    Ok(())
}

/// Best-effort `MIGRATE` audit entry, written after the step committed.
/// An audit failure never rolls back the migration it describes.
fn record_migration_audit(conn: &Connection, from: i64, step: &MigrationStep) {
    let result = conn.execute(
        "INSERT INTO audit_log (action, entity, ref_id, details) VALUES ('MIGRATE', 'store', ?1, ?2)",
        params![format!("{}->{}", from, step.version), step.name],
    );
    if let Err(e) = result {
        warn!("failed to write MIGRATE audit entry: {e}");
    }
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    conn.prepare(&format!(
        "SELECT 1 FROM pragma_table_info('{table}') WHERE name = ?1"
    ))?
    .exists(params![column])
}

// ---- Concrete steps ----

/// v1 -> v2: custom field definitions gain a kind and a dropdown option
/// list.
fn mig_custom_field_metadata(conn: &Connection) -> Result<()> {
    if !column_exists(conn, "custom_field_defs", "field_type")? {
        conn.execute(
            "ALTER TABLE custom_field_defs ADD COLUMN field_type TEXT NOT NULL DEFAULT 'text'",
            [],
        )?;
    }
    if !column_exists(conn, "custom_field_defs", "options")? {
        conn.execute("ALTER TABLE custom_field_defs ADD COLUMN options TEXT", [])?;
    }
    Ok(())
}

/// v2 -> v3: secondary indexes for release-date and custom-value lookups.
fn mig_secondary_indexes(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_tracks_release_date ON tracks(release_date);
         CREATE INDEX IF NOT EXISTS idx_cfvalues_field ON custom_field_values(field_def_id);",
    )?;
    Ok(())
}

/// v3 -> v4: derived compact-identifier column, backfilled from the
/// canonical ISO column, with a uniqueness constraint over it.
///
/// The unique index is created on every path, not only when the column was
/// just added: the allocator's correctness depends on it.
fn mig_compact_isrc_column(conn: &Connection) -> Result<()> {
    if !column_exists(conn, "tracks", "isrc_compact")? {
        conn.execute("ALTER TABLE tracks ADD COLUMN isrc_compact TEXT", [])?;
    }
    // Backfill any row whose compact form is missing.
    let mut stmt =
        conn.prepare("SELECT id, isrc FROM tracks WHERE isrc_compact IS NULL OR isrc_compact = ''")?;
    let rows: Vec<(i64, String)> = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<rusqlite::Result<_>>()?;
    for (id, isrc) in rows {
        let compact = to_compact_isrc(&isrc).unwrap_or_default();
        conn.execute(
            "UPDATE tracks SET isrc_compact = ?1 WHERE id = ?2",
            params![compact, id],
        )?;
    }
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_tracks_isrc_compact_unique ON tracks(isrc_compact)",
        [],
    )?;
    Ok(())
}

/// v4 -> v5: the audit log becomes append-only at the storage layer.
fn mig_audit_append_only(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TRIGGER IF NOT EXISTS trg_auditlog_no_update
        BEFORE UPDATE ON audit_log
        BEGIN
            SELECT RAISE(ABORT, 'audit_log is append-only (UPDATE forbidden)');
        END;
        CREATE TRIGGER IF NOT EXISTS trg_auditlog_no_delete
        BEFORE DELETE ON audit_log
        BEGIN
            SELECT RAISE(ABORT, 'audit_log is append-only (DELETE forbidden)');
        END;
        ",
    )?;
    Ok(())
}

/// v5 -> v6: validation triggers on the track table (ISRC shape, UPC/EAN
/// length, release-date shape).
///
/// The ISRC pattern shipped here carries one `[0-9]` class too many (13
/// positions against a length-12 operand), so it rejects every insert;
/// step 8 supersedes it. Kept verbatim because deployed stores already
/// passed through this version.
fn mig_track_validation_triggers(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TRIGGER IF NOT EXISTS trg_tracks_isrc_validate_ins
        BEFORE INSERT ON tracks
        FOR EACH ROW
        WHEN NOT (
            length(replace(replace(upper(NEW.isrc),'-',''),' ','')) = 12
            AND replace(upper(NEW.isrc),'-','') GLOB
                '[A-Z][A-Z][A-Z0-9][A-Z0-9][A-Z0-9][0-9][0-9][0-9][0-9][0-9][0-9][0-9][0-9]'
            AND NEW.isrc_compact = replace(replace(upper(NEW.isrc),'-',''),' ','')
        )
        BEGIN
            SELECT RAISE(ABORT, 'ISRC validation failed');
        END;

        CREATE TRIGGER IF NOT EXISTS trg_tracks_isrc_validate_upd
        BEFORE UPDATE ON tracks
        FOR EACH ROW
        WHEN NOT (
            length(replace(replace(upper(NEW.isrc),'-',''),' ','')) = 12
            AND replace(upper(NEW.isrc),'-','') GLOB
                '[A-Z][A-Z][A-Z0-9][A-Z0-9][A-Z0-9][0-9][0-9][0-9][0-9][0-9][0-9][0-9][0-9]'
            AND NEW.isrc_compact = replace(replace(upper(NEW.isrc),'-',''),' ','')
        )
        BEGIN
            SELECT RAISE(ABORT, 'ISRC validation failed');
        END;

        CREATE TRIGGER IF NOT EXISTS trg_tracks_upc_check_ins
        BEFORE INSERT ON tracks
        FOR EACH ROW
        WHEN NEW.upc IS NOT NULL AND NEW.upc <> '' AND length(NEW.upc) NOT IN (12,13)
        BEGIN
            SELECT RAISE(ABORT, 'UPC/EAN must be 12 or 13 digits');
        END;

        CREATE TRIGGER IF NOT EXISTS trg_tracks_upc_check_upd
        BEFORE UPDATE ON tracks
        FOR EACH ROW
        WHEN NEW.upc IS NOT NULL AND NEW.upc <> '' AND length(NEW.upc) NOT IN (12,13)
        BEGIN
            SELECT RAISE(ABORT, 'UPC/EAN must be 12 or 13 digits');
        END;

        CREATE TRIGGER IF NOT EXISTS trg_tracks_reldate_check_ins
        BEFORE INSERT ON tracks
        FOR EACH ROW
        WHEN NEW.release_date IS NOT NULL AND NEW.release_date <> '' AND NEW.release_date NOT GLOB '____-__-__'
        BEGIN
            SELECT RAISE(ABORT, 'release_date must be YYYY-MM-DD');
        END;

        CREATE TRIGGER IF NOT EXISTS trg_tracks_reldate_check_upd
        BEFORE UPDATE ON tracks
        FOR EACH ROW
        WHEN NEW.release_date IS NOT NULL AND NEW.release_date <> '' AND NEW.release_date NOT GLOB '____-__-__'
        BEGIN
            SELECT RAISE(ABORT, 'release_date must be YYYY-MM-DD');
        END;
        ",
    )?;
    Ok(())
}

/// v6 -> v7: replace the GLOB date validator with LIKE placeholders. The
/// GLOB form rejected otherwise-valid dates under some glob engines; this
/// step supersedes, not coexists with, the defective triggers.
fn mig_release_date_like_fix(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        DROP TRIGGER IF EXISTS trg_tracks_reldate_check_ins;
        DROP TRIGGER IF EXISTS trg_tracks_reldate_check_upd;

        CREATE TRIGGER IF NOT EXISTS trg_tracks_reldate_check_ins
        BEFORE INSERT ON tracks
        FOR EACH ROW
        WHEN NEW.release_date IS NOT NULL
        AND NEW.release_date <> ''
        AND NEW.release_date NOT LIKE '____-__-__'
        BEGIN
            SELECT RAISE(ABORT, 'release_date must be YYYY-MM-DD');
        END;

        CREATE TRIGGER IF NOT EXISTS trg_tracks_reldate_check_upd
        BEFORE UPDATE ON tracks
        FOR EACH ROW
        WHEN NEW.release_date IS NOT NULL
        AND NEW.release_date <> ''
        AND NEW.release_date NOT LIKE '____-__-__'
        BEGIN
            SELECT RAISE(ABORT, 'release_date must be YYYY-MM-DD');
        END;
        ",
    )?;
    Ok(())
}

/// v7 -> v8: correct the ISRC trigger pattern to the 7-digit tail
/// (2-digit year + 5-digit designation), superseding the defective step-6
/// triggers.
fn mig_isrc_digit_count_fix(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        DROP TRIGGER IF EXISTS trg_tracks_isrc_validate_ins;
        DROP TRIGGER IF EXISTS trg_tracks_isrc_validate_upd;

        CREATE TRIGGER IF NOT EXISTS trg_tracks_isrc_validate_ins
        BEFORE INSERT ON tracks
        FOR EACH ROW
        WHEN NOT (
            length(replace(replace(upper(NEW.isrc),'-',''),' ','')) = 12
            AND replace(replace(upper(NEW.isrc),'-',''),' ','') GLOB
                '[A-Z][A-Z][A-Z0-9][A-Z0-9][A-Z0-9][0-9][0-9][0-9][0-9][0-9][0-9][0-9]'
            AND upper(NEW.isrc_compact) = replace(replace(upper(NEW.isrc),'-',''),' ','')
        )
        BEGIN
            SELECT RAISE(ABORT, 'ISRC validation failed');
        END;

        CREATE TRIGGER IF NOT EXISTS trg_tracks_isrc_validate_upd
        BEFORE UPDATE ON tracks
        FOR EACH ROW
        WHEN NOT (
            length(replace(replace(upper(NEW.isrc),'-',''),' ','')) = 12
            AND replace(replace(upper(NEW.isrc),'-',''),' ','') GLOB
                '[A-Z][A-Z][A-Z0-9][A-Z0-9][A-Z0-9][0-9][0-9][0-9][0-9][0-9][0-9][0-9]'
            AND upper(NEW.isrc_compact) = replace(replace(upper(NEW.isrc),'-',''),' ','')
        )
        BEGIN
            SELECT RAISE(ABORT, 'ISRC validation failed');
        END;
        ",
    )?;
    Ok(())
}

/// v8 -> v9: track length in seconds.
fn mig_track_length_column(conn: &Connection) -> Result<()> {
    if !column_exists(conn, "tracks", "length_sec")? {
        conn.execute(
            "ALTER TABLE tracks ADD COLUMN length_sec INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }
    Ok(())
}

/// v9 -> v10: binary payload storage for attachment-kind custom fields,
/// plus the triggers enforcing text/binary exclusivity per field kind.
fn mig_custom_field_blobs(conn: &Connection) -> Result<()> {
    if !column_exists(conn, "custom_field_values", "blob_value")? {
        conn.execute(
            "ALTER TABLE custom_field_values ADD COLUMN blob_value BLOB",
            [],
        )?;
    }
    if !column_exists(conn, "custom_field_values", "mime_type")? {
        conn.execute(
            "ALTER TABLE custom_field_values ADD COLUMN mime_type TEXT",
            [],
        )?;
    }
    if !column_exists(conn, "custom_field_values", "size_bytes")? {
        conn.execute(
            "ALTER TABLE custom_field_values ADD COLUMN size_bytes INTEGER NOT NULL DEFAULT 0",
            [],
        )?;
    }

    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_cfvalues_track_field
        ON custom_field_values(track_id, field_def_id);
        CREATE INDEX IF NOT EXISTS idx_cfvalues_field_track
        ON custom_field_values(field_def_id, track_id);

        DROP TRIGGER IF EXISTS trg_cfvalues_blob_enforce_ins;
        DROP TRIGGER IF EXISTS trg_cfvalues_blob_enforce_upd;
        DROP TRIGGER IF EXISTS trg_cfvalues_text_enforce_ins;
        DROP TRIGGER IF EXISTS trg_cfvalues_text_enforce_upd;

        CREATE TRIGGER trg_cfvalues_blob_enforce_ins
        BEFORE INSERT ON custom_field_values
        FOR EACH ROW
        WHEN EXISTS (
            SELECT 1 FROM custom_field_defs d
            WHERE d.id = NEW.field_def_id AND d.field_type IN ('blob_image','blob_audio')
        )
        AND (
            NEW.blob_value IS NULL
            OR NEW.value IS NOT NULL
            OR NEW.size_bytes < 0
        )
        BEGIN
            SELECT RAISE(ABORT, 'attachment field requires blob_value (and NULL text); size_bytes must be >= 0');
        END;

        CREATE TRIGGER trg_cfvalues_blob_enforce_upd
        BEFORE UPDATE ON custom_field_values
        FOR EACH ROW
        WHEN EXISTS (
            SELECT 1 FROM custom_field_defs d
            WHERE d.id = NEW.field_def_id AND d.field_type IN ('blob_image','blob_audio')
        )
        AND (
            NEW.blob_value IS NULL
            OR NEW.value IS NOT NULL
            OR NEW.size_bytes < 0
        )
        BEGIN
            SELECT RAISE(ABORT, 'attachment field requires blob_value (and NULL text); size_bytes must be >= 0');
        END;

        CREATE TRIGGER trg_cfvalues_text_enforce_ins
        BEFORE INSERT ON custom_field_values
        FOR EACH ROW
        WHEN EXISTS (
            SELECT 1 FROM custom_field_defs d
            WHERE d.id = NEW.field_def_id AND d.field_type NOT IN ('blob_image','blob_audio')
        )
        AND NEW.blob_value IS NOT NULL
        BEGIN
            SELECT RAISE(ABORT, 'non-attachment field must not store blob_value');
        END;

        CREATE TRIGGER trg_cfvalues_text_enforce_upd
        BEFORE UPDATE ON custom_field_values
        FOR EACH ROW
        WHEN EXISTS (
            SELECT 1 FROM custom_field_defs d
            WHERE d.id = NEW.field_def_id AND d.field_type NOT IN ('blob_image','blob_audio')
        )
        AND NEW.blob_value IS NOT NULL
        BEGIN
            SELECT RAISE(ABORT, 'non-attachment field must not store blob_value');
        END;
        ",
    )?;
    Ok(())
}
