//! Base schema for the catalog store.
//!
//! `create_base_schema` lays down the core tables with `IF NOT EXISTS` on
//! every open, so a fresh store and a legacy store converge on the same
//! table set before the migration chain runs. Columns that were added over
//! the store's history (`isrc_compact`, `length_sec`, the blob columns on
//! custom-field values) are part of the current `CREATE TABLE` shape; the
//! corresponding migration steps guard on column presence and so become
//! no-ops on fresh stores. Triggers and the compact-identifier unique
//! index are installed exclusively by the migration chain.

use rusqlite::Connection;

/// Create core tables and base indexes if missing. Idempotent.
pub fn create_base_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS artists (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_artists_name ON artists(name);

        CREATE TABLE IF NOT EXISTS albums (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_albums_title ON albums(title);

        CREATE TABLE IF NOT EXISTS tracks (
            id INTEGER PRIMARY KEY,
            isrc TEXT NOT NULL,
            isrc_compact TEXT,
            entry_date TEXT NOT NULL DEFAULT (date('now')),
            title TEXT NOT NULL,
            main_artist_id INTEGER NOT NULL,
            album_id INTEGER,
            release_date TEXT,
            length_sec INTEGER NOT NULL DEFAULT 0,
            iswc TEXT,
            upc TEXT,
            genre TEXT,
            FOREIGN KEY (main_artist_id) REFERENCES artists(id) ON DELETE RESTRICT,
            FOREIGN KEY (album_id) REFERENCES albums(id) ON DELETE SET NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS idx_tracks_isrc_unique ON tracks(isrc);
        CREATE INDEX IF NOT EXISTS idx_tracks_title ON tracks(title);
        CREATE INDEX IF NOT EXISTS idx_tracks_upc ON tracks(upc);
        CREATE INDEX IF NOT EXISTS idx_tracks_genre ON tracks(genre);

        CREATE TABLE IF NOT EXISTS track_artists (
            track_id INTEGER NOT NULL,
            artist_id INTEGER NOT NULL,
            role TEXT NOT NULL DEFAULT 'additional',
            PRIMARY KEY (track_id, artist_id, role),
            FOREIGN KEY (track_id) REFERENCES tracks(id) ON DELETE CASCADE,
            FOREIGN KEY (artist_id) REFERENCES artists(id) ON DELETE RESTRICT
        );

        CREATE TABLE IF NOT EXISTS custom_field_defs (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            active INTEGER NOT NULL DEFAULT 1,
            sort_order INTEGER,
            field_type TEXT NOT NULL DEFAULT 'text',
            options TEXT
        );

        CREATE TABLE IF NOT EXISTS custom_field_values (
            track_id INTEGER NOT NULL,
            field_def_id INTEGER NOT NULL,
            value TEXT,
            blob_value BLOB,
            mime_type TEXT,
            size_bytes INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (track_id, field_def_id),
            FOREIGN KEY (track_id) REFERENCES tracks(id) ON DELETE CASCADE,
            FOREIGN KEY (field_def_id) REFERENCES custom_field_defs(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS catalog_settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS audit_log (
            id INTEGER PRIMARY KEY,
            ts TEXT NOT NULL DEFAULT (datetime('now')),
            user TEXT,
            action TEXT NOT NULL,
            entity TEXT,
            ref_id TEXT,
            details TEXT
        );
        ",
    )
}

/// Settings keys for the per-catalog key-value table.
pub(crate) const SETTING_REGISTRANT_PREFIX: &str = "registrant_prefix";
pub(crate) const SETTING_ARTIST_CODE: &str = "artist_code";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        create_base_schema(&conn).unwrap();
        create_base_schema(&conn).unwrap();

        let table_count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(table_count, 8);
    }

    #[test]
    fn test_tracks_default_entry_date() {
        let conn = Connection::open_in_memory().unwrap();
        create_base_schema(&conn).unwrap();
        conn.execute("INSERT INTO artists (name) VALUES ('a')", [])
            .unwrap();
        conn.execute(
            "INSERT INTO tracks (isrc, isrc_compact, title, main_artist_id)
             VALUES ('GB-ABC-25-00001', 'GBABC2500001', 't', 1)",
            [],
        )
        .unwrap();
        let entry_date: String = conn
            .query_row("SELECT entry_date FROM tracks WHERE id = 1", [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(entry_date.len(), 10); // YYYY-MM-DD
    }
}
