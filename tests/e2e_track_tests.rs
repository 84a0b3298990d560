//! End-to-end tests for track save/update/delete and ISRC allocation
//! through the store boundary.

mod common;

use common::{track_2025, TestStore, TEST_ARTIST_CODE, TEST_PREFIX};
use isrc_catalog::{AuditAction, AuditFilter, NewTrack, StoreError, TrackUpdate};

#[test]
fn test_save_allocates_sequential_isrcs() {
    let ts = TestStore::create();

    let id1 = ts.store.save_track(&track_2025("First")).unwrap();
    let id2 = ts.store.save_track(&track_2025("Second")).unwrap();

    let t1 = ts.store.get_track(id1).unwrap();
    let t2 = ts.store.get_track(id2).unwrap();
    assert_eq!(t1.isrc, "GB-ABC-25-07001");
    assert_eq!(t1.isrc_compact, "GBABC2507001");
    assert_eq!(t2.isrc, "GB-ABC-25-07002");
    assert_eq!(t2.isrc_compact, "GBABC2507002");
}

#[test]
fn test_allocate_preview_does_not_reserve() {
    let ts = TestStore::create();

    let preview = ts
        .store
        .allocate_isrc(TEST_PREFIX, 25, TEST_ARTIST_CODE)
        .unwrap();
    assert_eq!(preview, "GB-ABC-25-07001");
    // Previewing twice returns the same number until a save claims it.
    let again = ts
        .store
        .allocate_isrc(TEST_PREFIX, 25, TEST_ARTIST_CODE)
        .unwrap();
    assert_eq!(again, preview);

    ts.store.save_track(&track_2025("Claims 001")).unwrap();
    let next = ts
        .store
        .allocate_isrc(TEST_PREFIX, 25, TEST_ARTIST_CODE)
        .unwrap();
    assert_eq!(next, "GB-ABC-25-07002");
}

#[test]
fn test_save_requires_registrant_prefix() {
    let ts = TestStore::create_unconfigured();
    let err = ts.store.save_track(&track_2025("No prefix")).unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert!(ts.store.list_tracks().unwrap().is_empty());
}

#[test]
fn test_save_validation_errors() {
    let ts = TestStore::create();

    let mut no_title = track_2025("x");
    no_title.title = "  ".to_string();
    assert!(matches!(
        ts.store.save_track(&no_title).unwrap_err(),
        StoreError::Validation(_)
    ));

    let mut bad_upc = track_2025("x");
    bad_upc.upc = Some("1234".to_string());
    assert!(matches!(
        ts.store.save_track(&bad_upc).unwrap_err(),
        StoreError::Validation(_)
    ));

    let mut bad_iswc = track_2025("x");
    bad_iswc.iswc = Some("T-123".to_string());
    assert!(matches!(
        ts.store.save_track(&bad_iswc).unwrap_err(),
        StoreError::Validation(_)
    ));

    let mut bad_date = track_2025("x");
    bad_date.release_date = Some("01-06-2025".to_string());
    assert!(matches!(
        ts.store.save_track(&bad_date).unwrap_err(),
        StoreError::Validation(_)
    ));

    // No partial writes from any of the rejected saves.
    assert!(ts.store.list_tracks().unwrap().is_empty());
}

#[test]
fn test_iswc_is_normalized_on_save() {
    let ts = TestStore::create();
    let mut track = track_2025("With ISWC");
    track.iswc = Some("t1234567890".to_string());
    let id = ts.store.save_track(&track).unwrap();
    assert_eq!(
        ts.store.get_track(id).unwrap().iswc.as_deref(),
        Some("T-123.456.789-0")
    );
}

#[test]
fn test_artists_and_albums_deduplicate_case_insensitively() {
    let ts = TestStore::create();

    let mut a = track_2025("One");
    a.artist = "The Band".to_string();
    a.album = Some("Greatest".to_string());
    let mut b = track_2025("Two");
    b.artist = "the band".to_string();
    b.album = Some("GREATEST".to_string());

    let id1 = ts.store.save_track(&a).unwrap();
    let id2 = ts.store.save_track(&b).unwrap();

    // Both resolve to the first spelling.
    assert_eq!(ts.store.get_track(id1).unwrap().artist, "The Band");
    assert_eq!(ts.store.get_track(id2).unwrap().artist, "The Band");
    assert_eq!(
        ts.store.get_track(id2).unwrap().album.as_deref(),
        Some("Greatest")
    );
}

#[test]
fn test_additional_artists_roundtrip() {
    let ts = TestStore::create();
    let mut track = track_2025("Featuring");
    track.additional_artists = vec!["Guest One".to_string(), "Guest Two".to_string()];
    let id = ts.store.save_track(&track).unwrap();
    assert_eq!(
        ts.store.get_track(id).unwrap().additional_artists,
        vec!["Guest One".to_string(), "Guest Two".to_string()]
    );
}

#[test]
fn test_update_track() {
    let ts = TestStore::create();
    let id = ts.store.save_track(&track_2025("Before")).unwrap();
    let original = ts.store.get_track(id).unwrap();

    ts.store
        .update_track(
            id,
            &TrackUpdate {
                // Hand-corrected spelling of the same identifier.
                isrc: original.isrc.to_lowercase(),
                title: "After".to_string(),
                artist: "Test Artist".to_string(),
                release_date: Some("2025-07-01".to_string()),
                length_sec: 321,
                upc: Some("123456789012".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

    let updated = ts.store.get_track(id).unwrap();
    assert_eq!(updated.title, "After");
    assert_eq!(updated.isrc, original.isrc); // re-normalized
    assert_eq!(updated.length_sec, 321);
    assert_eq!(updated.upc.as_deref(), Some("123456789012"));
}

#[test]
fn test_update_rejects_duplicate_isrc() {
    let ts = TestStore::create();
    let id1 = ts.store.save_track(&track_2025("One")).unwrap();
    let id2 = ts.store.save_track(&track_2025("Two")).unwrap();
    let isrc1 = ts.store.get_track(id1).unwrap().isrc;

    let err = ts
        .store
        .update_track(
            id2,
            &TrackUpdate {
                isrc: isrc1,
                title: "Two".to_string(),
                artist: "Test Artist".to_string(),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::DuplicateIdentifier(_)));

    // The rejected update left the row untouched.
    assert_eq!(ts.store.get_track(id2).unwrap().isrc, "GB-ABC-25-07002");
}

#[test]
fn test_update_missing_track_is_not_found() {
    let ts = TestStore::create();
    let err = ts
        .store
        .update_track(
            4242,
            &TrackUpdate {
                isrc: "GB-ABC-25-07001".to_string(),
                title: "Ghost".to_string(),
                artist: "Nobody".to_string(),
                ..Default::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[test]
fn test_delete_track() {
    let ts = TestStore::create();
    let id = ts.store.save_track(&track_2025("Doomed")).unwrap();
    ts.store.delete_track(id).unwrap();
    assert!(matches!(
        ts.store.get_track(id).unwrap_err(),
        StoreError::NotFound { .. }
    ));
    // Deleting again is a no-op.
    ts.store.delete_track(id).unwrap();
}

#[test]
fn test_is_isrc_taken_across_spellings() {
    let ts = TestStore::create();
    let id = ts.store.save_track(&track_2025("Taken")).unwrap();

    assert!(ts.store.is_isrc_taken("gb-abc-25-07001", None).unwrap());
    assert!(ts.store.is_isrc_taken("GBABC2507001", None).unwrap());
    assert!(!ts.store.is_isrc_taken("GBABC2507001", Some(id)).unwrap());
    assert!(!ts.store.is_isrc_taken("not an isrc", None).unwrap());
}

#[test]
fn test_mutations_are_audited() {
    let ts = TestStore::create();
    let id = ts.store.save_track(&track_2025("Audited")).unwrap();
    ts.store.delete_track(id).unwrap();

    let creates = ts
        .store
        .audit()
        .query(&AuditFilter {
            action: Some(AuditAction::Create),
            entity: Some("track".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(creates.len(), 1);
    assert_eq!(creates[0].ref_id.as_deref(), Some(&*id.to_string()));
    assert!(creates[0]
        .details
        .as_deref()
        .unwrap()
        .contains("GB-ABC-25-07001"));

    let deletes = ts
        .store
        .audit()
        .query(&AuditFilter {
            action: Some(AuditAction::Delete),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(deletes.len(), 1);
}

#[test]
fn test_settings_roundtrip_and_validation() {
    let ts = TestStore::create_unconfigured();

    let settings = ts.store.settings().unwrap();
    assert_eq!(settings.registrant_prefix, None);
    assert_eq!(settings.artist_code, "00");

    ts.store.set_registrant_prefix("nla0b").unwrap();
    ts.store.set_artist_code("42").unwrap();
    let settings = ts.store.settings().unwrap();
    assert_eq!(settings.registrant_prefix.as_deref(), Some("NLA0B"));
    assert_eq!(settings.artist_code, "42");

    assert!(matches!(
        ts.store.set_registrant_prefix("bad").unwrap_err(),
        StoreError::Validation(_)
    ));
    assert!(matches!(
        ts.store.set_artist_code("123").unwrap_err(),
        StoreError::Validation(_)
    ));
}

#[test]
fn test_non_reissue_uses_current_year() {
    let ts = TestStore::create();
    let id = ts
        .store
        .save_track(&NewTrack {
            title: "Fresh".to_string(),
            artist: "Test Artist".to_string(),
            ..Default::default()
        })
        .unwrap();
    let yy = chrono::Utc::now().format("%y").to_string();
    let track = ts.store.get_track(id).unwrap();
    assert_eq!(&track.isrc[7..9], yy.as_str());
}
