//! End-to-end tests for the tagged-record import/export boundary.

mod common;

use common::{track_2025, TestStore};
use isrc_catalog::catalog_store::{CustomFieldRecord, TrackRecord};
use isrc_catalog::{CustomFieldKind, CustomValuePayload, StoreError};

fn record(isrc: &str, title: &str) -> TrackRecord {
    TrackRecord {
        isrc: isrc.to_string(),
        title: title.to_string(),
        artist: "Imported Artist".to_string(),
        additional_artists: Vec::new(),
        album: Some("Imported Album".to_string()),
        release_date: Some("2024-03-01".to_string()),
        length_sec: 180,
        iswc: None,
        upc: None,
        genre: Some("Jazz".to_string()),
        custom_fields: Vec::new(),
    }
}

#[test]
fn test_import_normalizes_and_counts() {
    let ts = TestStore::create();

    let report = ts
        .store
        .import_tracks(&[
            // Inconsistent spellings of distinct identifiers
            record("us-xyz-24-00001", "One"),
            record("USXYZ2400002", "Two"),
            // Same identifier as the first, different spelling
            record("usxyz2400001", "Duplicate of One"),
        ])
        .unwrap();

    assert_eq!(report.imported, 2);
    assert_eq!(report.skipped_duplicates, 1);

    let tracks = ts.store.list_tracks().unwrap();
    assert_eq!(tracks.len(), 2);
    assert_eq!(tracks[0].isrc, "US-XYZ-24-00001");
    assert_eq!(tracks[0].isrc_compact, "USXYZ2400001");
}

#[test]
fn test_import_skips_identifiers_already_in_store() {
    let ts = TestStore::create();
    ts.store.save_track(&track_2025("Existing")).unwrap(); // GB-ABC-25-07001

    let report = ts
        .store
        .import_tracks(&[record("GBABC2507001", "Clash"), record("GBABC2507099", "New")])
        .unwrap();
    assert_eq!(report.imported, 1);
    assert_eq!(report.skipped_duplicates, 1);
    assert_eq!(ts.store.list_tracks().unwrap().len(), 2);
}

#[test]
fn test_import_malformed_identifier_aborts() {
    let ts = TestStore::create();
    let err = ts
        .store
        .import_tracks(&[record("USXYZ2400001", "Good"), record("not-an-isrc", "Bad")])
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    // No partial writes: the good record was rolled back with the batch.
    assert!(ts.store.list_tracks().unwrap().is_empty());
}

#[test]
fn test_import_unknown_custom_field_aborts() {
    let ts = TestStore::create();

    let mut with_field = record("USXYZ2400001", "Tagged");
    with_field.custom_fields.push(CustomFieldRecord {
        name: "Mood".to_string(),
        kind: CustomFieldKind::Text,
        value: CustomValuePayload::Text("mellow".to_string()),
    });

    let err = ts
        .store
        .import_tracks(&[record("USXYZ2400002", "Plain"), with_field.clone()])
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert!(ts.store.list_tracks().unwrap().is_empty());

    // An inactive definition does not count either.
    let field_id = ts
        .store
        .create_custom_field("Mood", CustomFieldKind::Text, None)
        .unwrap();
    ts.store.set_custom_field_active(field_id, false).unwrap();
    let err = ts.store.import_tracks(&[with_field.clone()]).unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));

    // Re-activated, the same import goes through.
    ts.store.set_custom_field_active(field_id, true).unwrap();
    let report = ts.store.import_tracks(&[with_field]).unwrap();
    assert_eq!(report.imported, 1);
    let track = &ts.store.list_tracks().unwrap()[0];
    assert_eq!(
        ts.store
            .get_custom_text(track.id, field_id)
            .unwrap()
            .as_deref(),
        Some("mellow")
    );
}

#[test]
fn test_import_kind_mismatch_aborts() {
    let ts = TestStore::create();
    ts.store
        .create_custom_field("Cover", CustomFieldKind::BlobImage, None)
        .unwrap();

    let mut bad = record("USXYZ2400001", "Mislabeled");
    bad.custom_fields.push(CustomFieldRecord {
        name: "Cover".to_string(),
        // Declared as text in the document, defined as an image field.
        kind: CustomFieldKind::Text,
        value: CustomValuePayload::Text("not bytes".to_string()),
    });

    let err = ts.store.import_tracks(&[bad]).unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
    assert!(ts.store.list_tracks().unwrap().is_empty());
}

#[test]
fn test_export_import_roundtrip_with_attachments() {
    let source = TestStore::create();
    let id = source.store.save_track(&track_2025("Original")).unwrap();
    let field_id = source
        .store
        .create_custom_field("Cover", CustomFieldKind::BlobImage, None)
        .unwrap();
    source
        .store
        .upsert_custom_value(
            id,
            field_id,
            &CustomValuePayload::Attachment {
                bytes: b"cover-bytes".to_vec(),
                mime_type: "image/png".to_string(),
            },
        )
        .unwrap();

    let records = source.store.export_tracks().unwrap();
    assert_eq!(records.len(), 1);

    // Import into a second catalog that defines the same field.
    let target = TestStore::create();
    target
        .store
        .create_custom_field("Cover", CustomFieldKind::BlobImage, None)
        .unwrap();
    let report = target.store.import_tracks(&records).unwrap();
    assert_eq!(report.imported, 1);

    let imported = &target.store.list_tracks().unwrap()[0];
    assert_eq!(imported.isrc, "GB-ABC-25-07001");
    let fields = target.store.list_custom_fields(true).unwrap();
    let (bytes, mime) = target
        .store
        .fetch_attachment(imported.id, fields[0].id)
        .unwrap()
        .unwrap();
    assert_eq!(bytes, b"cover-bytes");
    assert_eq!(mime.as_deref(), Some("image/png"));
}

#[test]
fn test_import_is_audited() {
    let ts = TestStore::create();
    ts.store
        .import_tracks(&[record("USXYZ2400001", "One")])
        .unwrap();
    let entries = ts
        .store
        .audit()
        .query(&isrc_catalog::AuditFilter {
            action: Some(isrc_catalog::AuditAction::Import),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries[0]
        .details
        .as_deref()
        .unwrap()
        .contains("imported=1"));
}
