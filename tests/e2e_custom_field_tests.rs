//! End-to-end tests for custom field definitions and values, including
//! the text/binary exclusivity invariant.

mod common;

use common::{track_2025, TestStore};
use isrc_catalog::{CustomFieldKind, CustomValuePayload, StoreError};

const PNG_BYTES: &[u8] = b"\x89PNG\r\n\x1a\nfake-image-payload";

#[test]
fn test_create_and_list_custom_fields() {
    let ts = TestStore::create();

    ts.store
        .create_custom_field("Label notes", CustomFieldKind::Text, None)
        .unwrap();
    ts.store
        .create_custom_field(
            "Territory",
            CustomFieldKind::Dropdown,
            Some(vec!["EU".to_string(), "US".to_string()]),
        )
        .unwrap();
    ts.store
        .create_custom_field("Cover", CustomFieldKind::BlobImage, None)
        .unwrap();

    let fields = ts.store.list_custom_fields(true).unwrap();
    assert_eq!(fields.len(), 3);
    let territory = fields.iter().find(|f| f.name == "Territory").unwrap();
    assert_eq!(territory.kind, CustomFieldKind::Dropdown);
    assert_eq!(
        territory.options.as_deref(),
        Some(&["EU".to_string(), "US".to_string()][..])
    );
}

#[test]
fn test_dropdown_requires_options() {
    let ts = TestStore::create();
    assert!(matches!(
        ts.store
            .create_custom_field("Territory", CustomFieldKind::Dropdown, None)
            .unwrap_err(),
        StoreError::Validation(_)
    ));
    assert!(matches!(
        ts.store
            .create_custom_field("Territory", CustomFieldKind::Dropdown, Some(vec![]))
            .unwrap_err(),
        StoreError::Validation(_)
    ));
    assert!(matches!(
        ts.store
            .create_custom_field(
                "Notes",
                CustomFieldKind::Text,
                Some(vec!["spurious".to_string()])
            )
            .unwrap_err(),
        StoreError::Validation(_)
    ));
}

#[test]
fn test_duplicate_field_name_rejected() {
    let ts = TestStore::create();
    ts.store
        .create_custom_field("Notes", CustomFieldKind::Text, None)
        .unwrap();
    assert!(matches!(
        ts.store
            .create_custom_field("Notes", CustomFieldKind::Date, None)
            .unwrap_err(),
        StoreError::Validation(_)
    ));
}

#[test]
fn test_text_value_roundtrip() {
    let ts = TestStore::create();
    let track_id = ts.store.save_track(&track_2025("Valued")).unwrap();
    let field_id = ts
        .store
        .create_custom_field("Notes", CustomFieldKind::Text, None)
        .unwrap();

    ts.store
        .upsert_custom_value(
            track_id,
            field_id,
            &CustomValuePayload::Text("remaster pending".to_string()),
        )
        .unwrap();
    assert_eq!(
        ts.store.get_custom_text(track_id, field_id).unwrap().as_deref(),
        Some("remaster pending")
    );

    // Upsert overwrites in place.
    ts.store
        .upsert_custom_value(
            track_id,
            field_id,
            &CustomValuePayload::Text("remaster done".to_string()),
        )
        .unwrap();
    assert_eq!(
        ts.store.get_custom_text(track_id, field_id).unwrap().as_deref(),
        Some("remaster done")
    );
}

#[test]
fn test_attachment_roundtrip() {
    let ts = TestStore::create();
    let track_id = ts.store.save_track(&track_2025("Art")).unwrap();
    let field_id = ts
        .store
        .create_custom_field("Cover", CustomFieldKind::BlobImage, None)
        .unwrap();

    ts.store
        .upsert_custom_value(
            track_id,
            field_id,
            &CustomValuePayload::Attachment {
                bytes: PNG_BYTES.to_vec(),
                mime_type: "image/png".to_string(),
            },
        )
        .unwrap();

    let (bytes, mime) = ts
        .store
        .fetch_attachment(track_id, field_id)
        .unwrap()
        .unwrap();
    assert_eq!(bytes, PNG_BYTES);
    assert_eq!(mime.as_deref(), Some("image/png"));
}

#[test]
fn test_kind_exclusivity_is_rejected_before_write() {
    let ts = TestStore::create();
    let track_id = ts.store.save_track(&track_2025("Strict")).unwrap();
    let text_field = ts
        .store
        .create_custom_field("Notes", CustomFieldKind::Text, None)
        .unwrap();
    let blob_field = ts
        .store
        .create_custom_field("Cover", CustomFieldKind::BlobImage, None)
        .unwrap();

    let err = ts
        .store
        .upsert_custom_value(
            track_id,
            text_field,
            &CustomValuePayload::Attachment {
                bytes: PNG_BYTES.to_vec(),
                mime_type: "image/png".to_string(),
            },
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::KindMismatch { .. }));

    let err = ts
        .store
        .upsert_custom_value(
            track_id,
            blob_field,
            &CustomValuePayload::Text("not bytes".to_string()),
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::KindMismatch { .. }));

    // Nothing was written by either rejected upsert.
    assert_eq!(ts.store.get_custom_text(track_id, text_field).unwrap(), None);
    assert!(ts
        .store
        .fetch_attachment(track_id, blob_field)
        .unwrap()
        .is_none());
}

#[test]
fn test_empty_attachment_rejected() {
    let ts = TestStore::create();
    let track_id = ts.store.save_track(&track_2025("Empty")).unwrap();
    let field_id = ts
        .store
        .create_custom_field("Clip", CustomFieldKind::BlobAudio, None)
        .unwrap();
    let err = ts
        .store
        .upsert_custom_value(
            track_id,
            field_id,
            &CustomValuePayload::Attachment {
                bytes: Vec::new(),
                mime_type: "audio/wav".to_string(),
            },
        )
        .unwrap_err();
    assert!(matches!(err, StoreError::Validation(_)));
}

#[test]
fn test_unknown_field_or_kind() {
    let ts = TestStore::create();
    let track_id = ts.store.save_track(&track_2025("Orphan")).unwrap();
    let err = ts
        .store
        .upsert_custom_value(track_id, 999, &CustomValuePayload::Text("x".to_string()))
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[test]
fn test_deactivated_fields_are_hidden_not_deleted() {
    let ts = TestStore::create();
    let field_id = ts
        .store
        .create_custom_field("Seasonal", CustomFieldKind::Checkbox, None)
        .unwrap();

    ts.store.set_custom_field_active(field_id, false).unwrap();
    assert!(ts.store.list_custom_fields(true).unwrap().is_empty());
    assert_eq!(ts.store.list_custom_fields(false).unwrap().len(), 1);

    ts.store.set_custom_field_active(field_id, true).unwrap();
    assert_eq!(ts.store.list_custom_fields(true).unwrap().len(), 1);
}

#[test]
fn test_delete_field_cascades_to_values() {
    let ts = TestStore::create();
    let track_id = ts.store.save_track(&track_2025("Cascade")).unwrap();
    let field_id = ts
        .store
        .create_custom_field("Doomed", CustomFieldKind::Text, None)
        .unwrap();
    ts.store
        .upsert_custom_value(
            track_id,
            field_id,
            &CustomValuePayload::Text("here today".to_string()),
        )
        .unwrap();

    ts.store.delete_custom_field(field_id).unwrap();
    assert_eq!(ts.store.get_custom_text(track_id, field_id).unwrap(), None);
}

#[test]
fn test_delete_track_cascades_to_values() {
    let ts = TestStore::create();
    let track_id = ts.store.save_track(&track_2025("Gone")).unwrap();
    let field_id = ts
        .store
        .create_custom_field("Notes", CustomFieldKind::Text, None)
        .unwrap();
    ts.store
        .upsert_custom_value(
            track_id,
            field_id,
            &CustomValuePayload::Text("value".to_string()),
        )
        .unwrap();

    ts.store.delete_track(track_id).unwrap();
    assert_eq!(ts.store.get_custom_text(track_id, field_id).unwrap(), None);
}
