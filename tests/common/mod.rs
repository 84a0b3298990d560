//! Common test infrastructure
//!
//! Creates a temporary catalog store, configured with a registrant prefix
//! and artist code so allocation works out of the box.
#![allow(dead_code)]

use isrc_catalog::{NewTrack, SqliteCatalogStore};
use std::path::PathBuf;
use tempfile::TempDir;

pub const TEST_PREFIX: &str = "GBABC";
pub const TEST_ARTIST_CODE: &str = "07";

pub struct TestStore {
    pub store: SqliteCatalogStore,
    pub db_path: PathBuf,
    // Kept so the directory outlives the store handle.
    _dir: TempDir,
}

impl TestStore {
    /// Fresh store with identifier settings configured.
    pub fn create() -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("catalog.db");
        let store = SqliteCatalogStore::open(&db_path).unwrap();
        store.set_registrant_prefix(TEST_PREFIX).unwrap();
        store.set_artist_code(TEST_ARTIST_CODE).unwrap();
        Self {
            store,
            db_path,
            _dir: dir,
        }
    }

    /// Fresh store with no settings configured.
    #[allow(dead_code)]
    pub fn create_unconfigured() -> Self {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("catalog.db");
        let store = SqliteCatalogStore::open(&db_path).unwrap();
        Self {
            store,
            db_path,
            _dir: dir,
        }
    }
}

/// A valid track input pinned to allocation year 25 (re-issue of a 2025
/// release), so allocated identifiers are deterministic in tests.
#[allow(dead_code)]
pub fn track_2025(title: &str) -> NewTrack {
    NewTrack {
        title: title.to_string(),
        artist: "Test Artist".to_string(),
        album: Some("Test Album".to_string()),
        release_date: Some("2025-06-01".to_string()),
        reissue: true,
        length_sec: 215,
        genre: Some("Electronic".to_string()),
        ..Default::default()
    }
}
