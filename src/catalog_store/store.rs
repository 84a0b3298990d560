//! SQLite-backed catalog store.
//!
//! Owns the single writer connection, runs initialization and pending
//! migrations at open time, and exposes the boundary operations consumed
//! by the presentation layer. All mutations are all-or-nothing: a save,
//! update or import either commits completely or leaves no trace.

use anyhow::Context;
use chrono::{Datelike, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

use crate::identifier::{
    allocate_isrc, is_valid_artist_code, is_valid_iswc, is_valid_registrant_prefix,
    is_valid_upc_ean, to_compact_isrc, to_iso_isrc, to_iso_iswc,
};
use crate::sqlite_persistence::{migrate_schema, SCHEMA_TARGET};

use super::audit::{AuditAction, AuditTrail};
use super::error::{StoreError, StoreResult};
use super::models::*;
use super::schema::{self, SETTING_ARTIST_CODE, SETTING_REGISTRANT_PREFIX};

/// Handle over one catalog store file. One active writer per store.
#[derive(Clone, Debug)]
pub struct SqliteCatalogStore {
    pub(super) conn: Arc<Mutex<Connection>>,
    pub(super) db_path: PathBuf,
    pub(super) audit: AuditTrail,
}

impl SqliteCatalogStore {
    /// Open (or create) the store at `path`: apply pragmas, lay down the
    /// base schema and bring it to the target version before returning a
    /// usable handle.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create store directory {parent:?}"))?;
            }
        }

        let mut conn = Connection::open(path)?;
        Self::apply_pragmas(&conn)?;
        schema::create_base_schema(&conn)?;
        migrate_schema(&mut conn).map_err(StoreError::MigrationFailure)?;

        let conn = Arc::new(Mutex::new(conn));
        let audit = AuditTrail::new(conn.clone());
        let store = Self {
            conn,
            db_path: path.to_path_buf(),
            audit,
        };

        info!(
            "opened catalog store at {:?} (schema version {})",
            path, SCHEMA_TARGET
        );
        store.audit.record(
            AuditAction::Profile,
            "store",
            Some(&path.display().to_string()),
            Some("open"),
            None,
        );
        Ok(store)
    }

    pub(super) fn apply_pragmas(conn: &Connection) -> rusqlite::Result<()> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    /// The append-only audit trail for this store.
    pub fn audit(&self) -> &AuditTrail {
        &self.audit
    }

    // =========================================================================
    // Settings
    // =========================================================================

    pub fn settings(&self) -> StoreResult<CatalogSettings> {
        let conn = self.conn.lock().unwrap();
        Ok(read_settings(&conn)?)
    }

    pub fn set_registrant_prefix(&self, prefix: &str) -> StoreResult<()> {
        let prefix = prefix.trim().to_ascii_uppercase();
        if !is_valid_registrant_prefix(&prefix) {
            return Err(StoreError::Validation(format!(
                "registrant prefix must be 2 letters + 3 alphanumerics, got '{prefix}'"
            )));
        }
        self.put_setting(SETTING_REGISTRANT_PREFIX, &prefix)?;
        self.audit.record(
            AuditAction::Settings,
            "settings",
            Some(SETTING_REGISTRANT_PREFIX),
            Some(&prefix),
            None,
        );
        Ok(())
    }

    pub fn set_artist_code(&self, code: &str) -> StoreResult<()> {
        if !is_valid_artist_code(code) {
            return Err(StoreError::Validation(format!(
                "artist code must be 2 digits (00-99), got '{code}'"
            )));
        }
        self.put_setting(SETTING_ARTIST_CODE, code)?;
        self.audit.record(
            AuditAction::Settings,
            "settings",
            Some(SETTING_ARTIST_CODE),
            Some(code),
            None,
        );
        Ok(())
    }

    fn put_setting(&self, key: &str, value: &str) -> rusqlite::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO catalog_settings (key, value, updated_at)
             VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    // =========================================================================
    // Identifier allocation
    // =========================================================================

    /// Preview the next free ISRC for the given stem without reserving it.
    ///
    /// The authoritative allocation happens inside [`Self::save_track`]'s
    /// transaction; this read-only variant exists for display purposes.
    pub fn allocate_isrc(&self, prefix: &str, year: u32, artist_code: &str) -> StoreResult<String> {
        let conn = self.conn.lock().unwrap();
        allocate_isrc(&conn, prefix, year, artist_code)
    }

    pub fn is_isrc_taken(&self, candidate: &str, exclude_track_id: Option<i64>) -> StoreResult<bool> {
        let Some(compact) = to_compact_isrc(candidate) else {
            return Ok(false);
        };
        let conn = self.conn.lock().unwrap();
        Ok(compact_taken(&conn, &compact, exclude_track_id)?)
    }

    // =========================================================================
    // Tracks
    // =========================================================================

    /// Create a track, allocating its ISRC inside the insert transaction.
    pub fn save_track(&self, new: &NewTrack) -> StoreResult<i64> {
        validate_common(
            &new.title,
            &new.artist,
            new.release_date.as_deref(),
            new.length_sec,
            new.iswc.as_deref(),
            new.upc.as_deref(),
        )?;
        let iso_iswc = normalized_iswc(new.iswc.as_deref())?;

        let year = allocation_year(new)?;

        let mut guard = self.conn.lock().unwrap();
        let tx = guard.transaction()?;

        let settings = read_settings(&tx)?;
        let prefix = settings.registrant_prefix.ok_or_else(|| {
            StoreError::Validation("registrant prefix is not configured for this catalog".into())
        })?;

        let iso_isrc = allocate_isrc(&tx, &prefix, year, &settings.artist_code)?;
        let compact = to_compact_isrc(&iso_isrc)
            .ok_or_else(|| StoreError::Validation(format!("allocated ISRC '{iso_isrc}' is invalid")))?;

        let artist_id = get_or_create_artist(&tx, &new.artist)?;
        let album_id = get_or_create_album(&tx, new.album.as_deref())?;

        tx.execute(
            "INSERT INTO tracks (isrc, isrc_compact, title, main_artist_id, album_id,
                                 release_date, length_sec, iswc, upc, genre)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                iso_isrc,
                compact,
                new.title.trim(),
                artist_id,
                album_id,
                none_if_blank(new.release_date.as_deref()),
                new.length_sec,
                iso_iswc,
                none_if_blank(new.upc.as_deref()),
                none_if_blank(new.genre.as_deref()),
            ],
        )
        .map_err(|e| StoreError::from_track_insert(e, &iso_isrc))?;
        let track_id = tx.last_insert_rowid();

        replace_additional_artists(&tx, track_id, &new.additional_artists)?;

        tx.commit()?;
        drop(guard);

        info!("track created id={track_id} isrc={iso_isrc}");
        self.audit.record(
            AuditAction::Create,
            "track",
            Some(&track_id.to_string()),
            Some(&format!("isrc={iso_isrc}")),
            None,
        );
        Ok(track_id)
    }

    /// Update a track. The caller-supplied ISRC is re-validated,
    /// re-normalized and duplicate-checked against every other track.
    pub fn update_track(&self, id: i64, update: &TrackUpdate) -> StoreResult<()> {
        validate_common(
            &update.title,
            &update.artist,
            update.release_date.as_deref(),
            update.length_sec,
            update.iswc.as_deref(),
            update.upc.as_deref(),
        )?;
        let iso_iswc = normalized_iswc(update.iswc.as_deref())?;

        let iso_isrc = to_iso_isrc(&update.isrc).ok_or_else(|| {
            StoreError::Validation(format!(
                "ISRC must look like CCXXXYYNNNNN or CC-XXX-YY-NNNNN, got '{}'",
                update.isrc
            ))
        })?;
        // The codec guarantees the compact form exists for any ISO form.
        let compact = to_compact_isrc(&iso_isrc).unwrap_or_default();

        let mut guard = self.conn.lock().unwrap();
        let tx = guard.transaction()?;

        if compact_taken(&tx, &compact, Some(id))? {
            return Err(StoreError::DuplicateIdentifier(iso_isrc));
        }

        let artist_id = get_or_create_artist(&tx, &update.artist)?;
        let album_id = get_or_create_album(&tx, update.album.as_deref())?;

        let changed = tx.execute(
            "UPDATE tracks SET isrc = ?1, isrc_compact = ?2, title = ?3, main_artist_id = ?4,
                               album_id = ?5, release_date = ?6, length_sec = ?7, iswc = ?8,
                               upc = ?9, genre = ?10
             WHERE id = ?11",
            params![
                iso_isrc,
                compact,
                update.title.trim(),
                artist_id,
                album_id,
                none_if_blank(update.release_date.as_deref()),
                update.length_sec,
                iso_iswc,
                none_if_blank(update.upc.as_deref()),
                none_if_blank(update.genre.as_deref()),
                id,
            ],
        )
        .map_err(|e| StoreError::from_track_insert(e, &iso_isrc))?;
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "track",
                id,
            });
        }

        replace_additional_artists(&tx, id, &update.additional_artists)?;

        tx.commit()?;
        drop(guard);

        info!("track updated id={id} isrc={iso_isrc}");
        self.audit.record(
            AuditAction::Update,
            "track",
            Some(&id.to_string()),
            Some(&format!("isrc={iso_isrc}")),
            None,
        );
        Ok(())
    }

    /// Delete a track; custom values and artist links cascade.
    pub fn delete_track(&self, id: i64) -> StoreResult<()> {
        let deleted = {
            let conn = self.conn.lock().unwrap();
            conn.execute("DELETE FROM tracks WHERE id = ?1", params![id])?
        };
        if deleted > 0 {
            info!("track deleted id={id}");
            self.audit.record(
                AuditAction::Delete,
                "track",
                Some(&id.to_string()),
                None,
                None,
            );
        }
        Ok(())
    }

    pub fn get_track(&self, id: i64) -> StoreResult<Track> {
        let conn = self.conn.lock().unwrap();
        load_track(&conn, id)?.ok_or(StoreError::NotFound {
            entity: "track",
            id,
        })
    }

    pub fn list_tracks(&self) -> StoreResult<Vec<Track>> {
        let conn = self.conn.lock().unwrap();
        let ids: Vec<i64> = conn
            .prepare("SELECT id FROM tracks ORDER BY id")?
            .query_map([], |r| r.get(0))?
            .collect::<rusqlite::Result<_>>()?;
        let mut tracks = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(track) = load_track(&conn, id)? {
                tracks.push(track);
            }
        }
        Ok(tracks)
    }

    // =========================================================================
    // Custom fields
    // =========================================================================

    /// Create a custom field definition. Dropdown kinds require a
    /// non-empty option list; every other kind must not carry one.
    pub fn create_custom_field(
        &self,
        name: &str,
        kind: CustomFieldKind,
        options: Option<Vec<String>>,
    ) -> StoreResult<i64> {
        let name = name.trim();
        if name.is_empty() {
            return Err(StoreError::Validation("custom field name is required".into()));
        }
        match (kind, &options) {
            (CustomFieldKind::Dropdown, None) => {
                return Err(StoreError::Validation(
                    "dropdown fields require an option list".into(),
                ))
            }
            (CustomFieldKind::Dropdown, Some(opts)) if opts.is_empty() => {
                return Err(StoreError::Validation(
                    "dropdown fields require an option list".into(),
                ))
            }
            (k, Some(_)) if k != CustomFieldKind::Dropdown => {
                return Err(StoreError::Validation(format!(
                    "only dropdown fields carry options, not '{}'",
                    k.to_db_str()
                )))
            }
            _ => {}
        }
        let options_json = options
            .map(|o| serde_json::to_string(&o))
            .transpose()
            .context("failed to encode dropdown options")?;

        let id = {
            let conn = self.conn.lock().unwrap();
            let next_order: i64 = conn.query_row(
                "SELECT COALESCE(MAX(sort_order), 0) + 1 FROM custom_field_defs",
                [],
                |r| r.get(0),
            )?;
            conn.execute(
                "INSERT INTO custom_field_defs (name, active, sort_order, field_type, options)
                 VALUES (?1, 1, ?2, ?3, ?4)",
                params![name, next_order, kind.to_db_str(), options_json],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, Some(msg))
                    if err.code == rusqlite::ErrorCode::ConstraintViolation
                        && msg.contains("name") =>
                {
                    StoreError::Validation(format!("custom field '{name}' already exists"))
                }
                other => StoreError::Database(other),
            })?;
            conn.last_insert_rowid()
        };

        self.audit.record(
            AuditAction::Create,
            "custom_field",
            Some(&id.to_string()),
            Some(&format!("name={name} kind={}", kind.to_db_str())),
            None,
        );
        Ok(id)
    }

    pub fn set_custom_field_active(&self, id: i64, active: bool) -> StoreResult<()> {
        let changed = {
            let conn = self.conn.lock().unwrap();
            conn.execute(
                "UPDATE custom_field_defs SET active = ?1 WHERE id = ?2",
                params![active as i64, id],
            )?
        };
        if changed == 0 {
            return Err(StoreError::NotFound {
                entity: "custom field",
                id,
            });
        }
        self.audit.record(
            AuditAction::Update,
            "custom_field",
            Some(&id.to_string()),
            Some(if active { "activated" } else { "deactivated" }),
            None,
        );
        Ok(())
    }

    /// Delete a definition; all values cascade with it.
    pub fn delete_custom_field(&self, id: i64) -> StoreResult<()> {
        let deleted = {
            let conn = self.conn.lock().unwrap();
            conn.execute("DELETE FROM custom_field_defs WHERE id = ?1", params![id])?
        };
        if deleted == 0 {
            return Err(StoreError::NotFound {
                entity: "custom field",
                id,
            });
        }
        self.audit.record(
            AuditAction::Delete,
            "custom_field",
            Some(&id.to_string()),
            None,
            None,
        );
        Ok(())
    }

    pub fn list_custom_fields(&self, only_active: bool) -> StoreResult<Vec<CustomFieldDefinition>> {
        let conn = self.conn.lock().unwrap();
        let sql = if only_active {
            "SELECT id, name, field_type, active, sort_order, options FROM custom_field_defs
             WHERE active = 1 ORDER BY COALESCE(sort_order, 999999), name"
        } else {
            "SELECT id, name, field_type, active, sort_order, options FROM custom_field_defs
             ORDER BY COALESCE(sort_order, 999999), name"
        };
        let mut stmt = conn.prepare(sql)?;
        let defs = stmt
            .query_map([], row_to_field_def)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(defs)
    }

    /// Store a value for (track, field). The payload must agree with the
    /// field's kind; the check runs before any row is written, and the
    /// exclusivity triggers back it up at the storage layer.
    pub fn upsert_custom_value(
        &self,
        track_id: i64,
        field_id: i64,
        payload: &CustomValuePayload,
    ) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();

        let def = conn
            .query_row(
                "SELECT id, name, field_type, active, sort_order, options
                 FROM custom_field_defs WHERE id = ?1",
                params![field_id],
                row_to_field_def,
            )
            .optional()?
            .ok_or(StoreError::NotFound {
                entity: "custom field",
                id: field_id,
            })?;

        write_custom_value(&conn, track_id, &def, payload)?;
        drop(conn);

        self.audit.record(
            AuditAction::Update,
            "custom_field_value",
            Some(&format!("{track_id}/{field_id}")),
            None,
            None,
        );
        Ok(())
    }

    pub fn get_custom_text(&self, track_id: i64, field_id: i64) -> StoreResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                "SELECT value FROM custom_field_values WHERE track_id = ?1 AND field_def_id = ?2",
                params![track_id, field_id],
                |r| r.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Fetch an attachment payload and its declared content type.
    pub fn fetch_attachment(
        &self,
        track_id: i64,
        field_id: i64,
    ) -> StoreResult<Option<(Vec<u8>, Option<String>)>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT blob_value, mime_type FROM custom_field_values
                 WHERE track_id = ?1 AND field_def_id = ?2",
                params![track_id, field_id],
                |r| {
                    Ok((
                        r.get::<_, Option<Vec<u8>>>(0)?,
                        r.get::<_, Option<String>>(1)?,
                    ))
                },
            )
            .optional()?;
        Ok(row.and_then(|(blob, mime)| blob.map(|b| (b, mime))))
    }
}

// =============================================================================
// Internal helpers (shared with the interchange module)
// =============================================================================

pub(super) fn read_settings(conn: &Connection) -> rusqlite::Result<CatalogSettings> {
    let get = |key: &str| -> rusqlite::Result<Option<String>> {
        conn.query_row(
            "SELECT value FROM catalog_settings WHERE key = ?1",
            params![key],
            |r| r.get(0),
        )
        .optional()
    };
    Ok(CatalogSettings {
        registrant_prefix: get(SETTING_REGISTRANT_PREFIX)?,
        artist_code: get(SETTING_ARTIST_CODE)?.unwrap_or_else(|| "00".to_string()),
    })
}

pub(super) fn compact_taken(
    conn: &Connection,
    compact: &str,
    exclude_track_id: Option<i64>,
) -> rusqlite::Result<bool> {
    match exclude_track_id {
        None => conn
            .prepare_cached("SELECT 1 FROM tracks WHERE isrc_compact = ?1 LIMIT 1")?
            .exists(params![compact]),
        Some(id) => conn
            .prepare_cached("SELECT 1 FROM tracks WHERE isrc_compact = ?1 AND id != ?2 LIMIT 1")?
            .exists(params![compact, id]),
    }
}

/// Artists are deduplicated by case-insensitive name and never deleted
/// while referenced (FK RESTRICT).
pub(super) fn get_or_create_artist(conn: &Connection, name: &str) -> StoreResult<i64> {
    let name = name.trim();
    if name.is_empty() {
        return Err(StoreError::Validation("artist name is required".into()));
    }
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM artists WHERE name = ?1 COLLATE NOCASE ORDER BY id LIMIT 1",
            params![name],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(id);
    }
    conn.execute("INSERT INTO artists (name) VALUES (?1)", params![name])?;
    Ok(conn.last_insert_rowid())
}

pub(super) fn get_or_create_album(conn: &Connection, title: Option<&str>) -> StoreResult<Option<i64>> {
    let Some(title) = title.map(str::trim).filter(|t| !t.is_empty()) else {
        return Ok(None);
    };
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM albums WHERE title = ?1 COLLATE NOCASE ORDER BY id LIMIT 1",
            params![title],
            |r| r.get(0),
        )
        .optional()?;
    if let Some(id) = existing {
        return Ok(Some(id));
    }
    conn.execute("INSERT INTO albums (title) VALUES (?1)", params![title])?;
    Ok(Some(conn.last_insert_rowid()))
}

pub(super) fn replace_additional_artists(
    conn: &Connection,
    track_id: i64,
    names: &[String],
) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM track_artists WHERE track_id = ?1 AND role = 'additional'",
        params![track_id],
    )?;
    for name in names {
        if name.trim().is_empty() {
            continue;
        }
        let artist_id = get_or_create_artist(conn, name)?;
        conn.execute(
            "INSERT OR IGNORE INTO track_artists (track_id, artist_id, role)
             VALUES (?1, ?2, 'additional')",
            params![track_id, artist_id],
        )?;
    }
    Ok(())
}

pub(super) fn load_track(conn: &Connection, id: i64) -> rusqlite::Result<Option<Track>> {
    let row = conn
        .query_row(
            "SELECT t.id, t.isrc, t.isrc_compact, t.entry_date, t.title, a.name,
                    al.title, t.release_date, t.length_sec, t.iswc, t.upc, t.genre
             FROM tracks t
             JOIN artists a ON a.id = t.main_artist_id
             LEFT JOIN albums al ON al.id = t.album_id
             WHERE t.id = ?1",
            params![id],
            |r| {
                Ok(Track {
                    id: r.get(0)?,
                    isrc: r.get(1)?,
                    isrc_compact: r.get(2)?,
                    entry_date: r.get(3)?,
                    title: r.get(4)?,
                    artist: r.get(5)?,
                    additional_artists: Vec::new(),
                    album: r.get(6)?,
                    release_date: r.get(7)?,
                    length_sec: r.get(8)?,
                    iswc: r.get(9)?,
                    upc: r.get(10)?,
                    genre: r.get(11)?,
                })
            },
        )
        .optional()?;

    let Some(mut track) = row else {
        return Ok(None);
    };
    track.additional_artists = conn
        .prepare_cached(
            "SELECT a.name FROM track_artists ta
             JOIN artists a ON a.id = ta.artist_id
             WHERE ta.track_id = ?1 AND ta.role = 'additional'
             ORDER BY a.name",
        )?
        .query_map(params![id], |r| r.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    Ok(Some(track))
}

/// Write one custom value, enforcing the text/binary exclusivity of the
/// field's kind before any row is touched. The storage triggers back this
/// check up at the SQL layer.
pub(super) fn write_custom_value(
    conn: &Connection,
    track_id: i64,
    def: &CustomFieldDefinition,
    payload: &CustomValuePayload,
) -> StoreResult<()> {
    match (def.kind.is_attachment(), payload) {
        (false, CustomValuePayload::Text(value)) => {
            conn.execute(
                "INSERT INTO custom_field_values
                     (track_id, field_def_id, value, blob_value, mime_type, size_bytes)
                 VALUES (?1, ?2, ?3, NULL, NULL, 0)
                 ON CONFLICT(track_id, field_def_id) DO UPDATE SET
                     value = excluded.value, blob_value = NULL, mime_type = NULL, size_bytes = 0",
                params![track_id, def.id, value],
            )?;
        }
        (true, CustomValuePayload::Attachment { bytes, mime_type }) => {
            if bytes.is_empty() {
                return Err(StoreError::Validation(format!(
                    "attachment payload for field '{}' is empty",
                    def.name
                )));
            }
            conn.execute(
                "INSERT INTO custom_field_values
                     (track_id, field_def_id, value, blob_value, mime_type, size_bytes)
                 VALUES (?1, ?2, NULL, ?3, ?4, ?5)
                 ON CONFLICT(track_id, field_def_id) DO UPDATE SET
                     value = NULL, blob_value = excluded.blob_value,
                     mime_type = excluded.mime_type, size_bytes = excluded.size_bytes",
                params![track_id, def.id, bytes, mime_type, bytes.len() as i64],
            )?;
        }
        (true, other) => {
            return Err(StoreError::KindMismatch {
                field: def.name.clone(),
                expected: "binary attachment",
                given: other.describe(),
            })
        }
        (false, other) => {
            return Err(StoreError::KindMismatch {
                field: def.name.clone(),
                expected: "textual",
                given: other.describe(),
            })
        }
    }
    Ok(())
}

pub(super) fn row_to_field_def(row: &rusqlite::Row) -> rusqlite::Result<CustomFieldDefinition> {
    let kind_str: String = row.get(2)?;
    let options_json: Option<String> = row.get(5)?;
    Ok(CustomFieldDefinition {
        id: row.get(0)?,
        name: row.get(1)?,
        kind: CustomFieldKind::from_db_str(&kind_str).unwrap_or(CustomFieldKind::Text),
        active: row.get::<_, i64>(3)? != 0,
        sort_order: row.get(4)?,
        options: options_json.and_then(|s| serde_json::from_str(&s).ok()),
    })
}

pub(super) fn none_if_blank(s: Option<&str>) -> Option<String> {
    s.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

/// Shared field validation for save and update. Identifier shape checks
/// mirror the storage triggers so callers get typed errors instead of
/// constraint failures.
pub(super) fn validate_common(
    title: &str,
    artist: &str,
    release_date: Option<&str>,
    length_sec: i64,
    iswc: Option<&str>,
    upc: Option<&str>,
) -> StoreResult<()> {
    if title.trim().is_empty() {
        return Err(StoreError::Validation("track title is required".into()));
    }
    if artist.trim().is_empty() {
        return Err(StoreError::Validation("artist is required".into()));
    }
    if length_sec < 0 {
        return Err(StoreError::Validation(format!(
            "track length must be non-negative, got {length_sec}"
        )));
    }
    if let Some(date) = release_date.map(str::trim).filter(|d| !d.is_empty()) {
        NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
            StoreError::Validation(format!("release date must be YYYY-MM-DD, got '{date}'"))
        })?;
    }
    if let Some(iswc) = iswc {
        if !is_valid_iswc(iswc) {
            return Err(StoreError::Validation(format!(
                "ISWC must be like T-123.456.789-0 or T1234567890 (checksum 0-9 or X), got '{iswc}'"
            )));
        }
    }
    if let Some(upc) = upc {
        if !is_valid_upc_ean(upc) {
            return Err(StoreError::Validation(format!(
                "UPC/EAN must be 12 or 13 digits, got '{upc}'"
            )));
        }
    }
    Ok(())
}

pub(super) fn normalized_iswc(iswc: Option<&str>) -> StoreResult<Option<String>> {
    let Some(raw) = iswc.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    to_iso_iswc(raw)
        .map(Some)
        .ok_or_else(|| StoreError::Validation(format!("ISWC '{raw}' is malformed")))
}

/// Allocation year: current year, or the release year for re-issues.
fn allocation_year(new: &NewTrack) -> StoreResult<u32> {
    if !new.reissue {
        return Ok(Utc::now().year() as u32 % 100);
    }
    let date = new
        .release_date
        .as_deref()
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .ok_or_else(|| {
            StoreError::Validation("re-issue tracks need a release date for the ISRC year".into())
        })?;
    let parsed = NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
        StoreError::Validation(format!("release date must be YYYY-MM-DD, got '{date}'"))
    })?;
    Ok(parsed.year() as u32 % 100)
}
