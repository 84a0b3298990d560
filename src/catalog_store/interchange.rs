//! Tagged-record interchange for import/export.
//!
//! The presentation layer owns the on-disk serialization (one root element
//! with one element per track); the core consumes and produces the parsed
//! records and enforces the boundary rules: identifiers are re-validated
//! and re-normalized on import, duplicate identifiers are skipped and
//! counted, and a custom field referenced by name and kind that does not
//! exist as an active definition aborts the entire import with no partial
//! writes.

use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::info;

use crate::identifier::{to_compact_isrc, to_iso_isrc};

use super::audit::AuditAction;
use super::error::{StoreError, StoreResult};
use super::models::{CustomFieldKind, CustomValuePayload};
use super::store::{
    self, compact_taken, get_or_create_album, get_or_create_artist, replace_additional_artists,
    SqliteCatalogStore,
};

/// One custom-field entry of an interchange record, distinguishing
/// textual values from binary-attachment payloads.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomFieldRecord {
    pub name: String,
    pub kind: CustomFieldKind,
    pub value: CustomValuePayload,
}

/// One track element of the interchange document.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrackRecord {
    /// Any ISRC spelling; re-normalized to the ISO form on import.
    pub isrc: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub additional_artists: Vec<String>,
    pub album: Option<String>,
    pub release_date: Option<String>,
    #[serde(default)]
    pub length_sec: i64,
    pub iswc: Option<String>,
    pub upc: Option<String>,
    pub genre: Option<String>,
    #[serde(default)]
    pub custom_fields: Vec<CustomFieldRecord>,
}

/// Outcome of an import run.
#[derive(Clone, Debug, Default, Serialize)]
pub struct ImportReport {
    pub imported: usize,
    pub skipped_duplicates: usize,
}

impl SqliteCatalogStore {
    /// Import parsed interchange records in a single transaction.
    ///
    /// Any validation failure (malformed identifier, unknown or inactive
    /// custom field, kind mismatch) aborts the whole import; duplicate
    /// identifiers are not an error, they are skipped and counted.
    pub fn import_tracks(&self, records: &[TrackRecord]) -> StoreResult<ImportReport> {
        let mut report = ImportReport::default();

        let mut guard = self.conn.lock().unwrap();
        let tx = guard.transaction()?;

        // Resolve every referenced custom field up front so nothing is
        // written when any record references an unknown definition.
        let defs = {
            let mut stmt = tx.prepare(
                "SELECT id, name, field_type, active, sort_order, options
                 FROM custom_field_defs WHERE active = 1",
            )?;
            let defs: Vec<_> = stmt
                .query_map([], store::row_to_field_def)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            defs
        };
        let by_name: HashMap<&str, &super::models::CustomFieldDefinition> =
            defs.iter().map(|d| (d.name.as_str(), d)).collect();
        for record in records {
            for field in &record.custom_fields {
                match by_name.get(field.name.as_str()) {
                    Some(def) if def.kind == field.kind => {}
                    Some(def) => {
                        return Err(StoreError::Validation(format!(
                            "custom field '{}' is declared as '{}' but the catalog defines it as '{}'",
                            field.name,
                            field.kind.to_db_str(),
                            def.kind.to_db_str()
                        )))
                    }
                    None => {
                        return Err(StoreError::Validation(format!(
                            "custom field '{}' does not exist as an active definition; \
                             import aborted with no partial writes",
                            field.name
                        )))
                    }
                }
            }
        }

        let mut seen: HashSet<String> = HashSet::new();
        for record in records {
            let iso_isrc = to_iso_isrc(&record.isrc).ok_or_else(|| {
                StoreError::Validation(format!("ISRC '{}' is malformed", record.isrc))
            })?;
            // The codec guarantees the compact form exists for any ISO form.
            let compact = to_compact_isrc(&iso_isrc).unwrap_or_default();

            store::validate_common(
                &record.title,
                &record.artist,
                record.release_date.as_deref(),
                record.length_sec,
                record.iswc.as_deref(),
                record.upc.as_deref(),
            )?;
            let iso_iswc = store::normalized_iswc(record.iswc.as_deref())?;

            if seen.contains(&compact) || compact_taken(&tx, &compact, None)? {
                report.skipped_duplicates += 1;
                continue;
            }

            let artist_id = get_or_create_artist(&tx, &record.artist)?;
            let album_id = get_or_create_album(&tx, record.album.as_deref())?;
            tx.execute(
                "INSERT INTO tracks (isrc, isrc_compact, title, main_artist_id, album_id,
                                     release_date, length_sec, iswc, upc, genre)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    iso_isrc,
                    compact,
                    record.title.trim(),
                    artist_id,
                    album_id,
                    store::none_if_blank(record.release_date.as_deref()),
                    record.length_sec,
                    iso_iswc,
                    store::none_if_blank(record.upc.as_deref()),
                    store::none_if_blank(record.genre.as_deref()),
                ],
            )
            .map_err(|e| StoreError::from_track_insert(e, &iso_isrc))?;
            let track_id = tx.last_insert_rowid();

            replace_additional_artists(&tx, track_id, &record.additional_artists)?;

            for field in &record.custom_fields {
                // Present in the map: checked in the preflight pass.
                let def = by_name.get(field.name.as_str()).ok_or_else(|| {
                    StoreError::Validation(format!("custom field '{}' vanished mid-import", field.name))
                })?;
                store::write_custom_value(&tx, track_id, def, &field.value)?;
            }

            seen.insert(compact);
            report.imported += 1;
        }

        tx.commit()?;
        drop(guard);

        info!(
            "import finished: {} imported, {} duplicates skipped",
            report.imported, report.skipped_duplicates
        );
        self.audit.record(
            AuditAction::Import,
            "store",
            None,
            Some(&format!(
                "imported={} skipped_duplicates={}",
                report.imported, report.skipped_duplicates
            )),
            None,
        );
        Ok(report)
    }

    /// Full-fidelity dump of every track, including custom values and
    /// attachment bytes, for the presentation layer to serialize.
    pub fn export_tracks(&self) -> StoreResult<Vec<TrackRecord>> {
        let tracks = self.list_tracks()?;
        let conn = self.conn.lock().unwrap();

        let mut records = Vec::with_capacity(tracks.len());
        for track in tracks {
            let mut stmt = conn.prepare_cached(
                "SELECT d.name, d.field_type, v.value, v.blob_value, v.mime_type
                 FROM custom_field_values v
                 JOIN custom_field_defs d ON d.id = v.field_def_id
                 WHERE v.track_id = ?1
                 ORDER BY COALESCE(d.sort_order, 999999), d.name",
            )?;
            let custom_fields = stmt
                .query_map(params![track.id], |row| {
                    let name: String = row.get(0)?;
                    let kind_str: String = row.get(1)?;
                    let value: Option<String> = row.get(2)?;
                    let blob: Option<Vec<u8>> = row.get(3)?;
                    let mime: Option<String> = row.get(4)?;
                    Ok((name, kind_str, value, blob, mime))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .filter_map(|(name, kind_str, value, blob, mime)| {
                    let kind = CustomFieldKind::from_db_str(&kind_str)?;
                    let payload = match blob {
                        Some(bytes) => CustomValuePayload::Attachment {
                            bytes,
                            mime_type: mime.unwrap_or_default(),
                        },
                        None => CustomValuePayload::Text(value.unwrap_or_default()),
                    };
                    Some(CustomFieldRecord {
                        name,
                        kind,
                        value: payload,
                    })
                })
                .collect();

            records.push(TrackRecord {
                isrc: track.isrc,
                title: track.title,
                artist: track.artist,
                additional_artists: track.additional_artists,
                album: track.album,
                release_date: track.release_date,
                length_sec: track.length_sec,
                iswc: track.iswc,
                upc: track.upc,
                genre: track.genre,
                custom_fields,
            });
        }
        Ok(records)
    }
}
