//! Catalog entity models.

use serde::{Deserialize, Serialize};

/// Kind of a custom field definition.
///
/// Text-like kinds carry their value in the textual column; attachment
/// kinds carry a binary payload plus declared content type and size, and
/// never a textual value. The exclusivity is enforced both here (before
/// any write) and structurally by triggers in the store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum CustomFieldKind {
    Text,
    Dropdown,
    Checkbox,
    Date,
    BlobImage,
    BlobAudio,
}

impl CustomFieldKind {
    /// Convert from database string representation
    pub fn from_db_str(s: &str) -> Option<Self> {
        match s {
            "text" => Some(CustomFieldKind::Text),
            "dropdown" => Some(CustomFieldKind::Dropdown),
            "checkbox" => Some(CustomFieldKind::Checkbox),
            "date" => Some(CustomFieldKind::Date),
            "blob_image" => Some(CustomFieldKind::BlobImage),
            "blob_audio" => Some(CustomFieldKind::BlobAudio),
            _ => None,
        }
    }

    /// Convert to database string representation
    pub fn to_db_str(&self) -> &'static str {
        match self {
            CustomFieldKind::Text => "text",
            CustomFieldKind::Dropdown => "dropdown",
            CustomFieldKind::Checkbox => "checkbox",
            CustomFieldKind::Date => "date",
            CustomFieldKind::BlobImage => "blob_image",
            CustomFieldKind::BlobAudio => "blob_audio",
        }
    }

    /// True for kinds that store a binary payload instead of text.
    pub fn is_attachment(&self) -> bool {
        matches!(self, CustomFieldKind::BlobImage | CustomFieldKind::BlobAudio)
    }
}

/// A custom field definition.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CustomFieldDefinition {
    pub id: i64,
    pub name: String,
    pub kind: CustomFieldKind,
    pub active: bool,
    pub sort_order: Option<i64>,
    /// Option list for dropdown fields, `None` for every other kind.
    pub options: Option<Vec<String>>,
}

/// Value payload for a custom field, one of text or binary attachment.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum CustomValuePayload {
    Text(String),
    Attachment { bytes: Vec<u8>, mime_type: String },
}

impl CustomValuePayload {
    pub(crate) fn describe(&self) -> &'static str {
        match self {
            CustomValuePayload::Text(_) => "textual",
            CustomValuePayload::Attachment { .. } => "binary attachment",
        }
    }
}

/// A fully-loaded track row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Track {
    pub id: i64,
    /// ISO-hyphenated canonical ISRC, `CC-XXX-YY-NNNNN`.
    pub isrc: String,
    /// Derived compact form, always `to_compact_isrc(isrc)`, unique.
    pub isrc_compact: String,
    pub entry_date: String,
    pub title: String,
    pub artist: String,
    pub additional_artists: Vec<String>,
    pub album: Option<String>,
    pub release_date: Option<String>,
    pub length_sec: i64,
    pub iswc: Option<String>,
    pub upc: Option<String>,
    pub genre: Option<String>,
}

/// Input for creating a track. The ISRC is not supplied: it is allocated
/// from the catalog's registrant prefix and artist code at save time.
#[derive(Clone, Debug, Default)]
pub struct NewTrack {
    pub title: String,
    pub artist: String,
    pub additional_artists: Vec<String>,
    pub album: Option<String>,
    /// `YYYY-MM-DD`.
    pub release_date: Option<String>,
    /// When true the allocation year is taken from `release_date` instead
    /// of the current year (re-issue of a previously released work).
    pub reissue: bool,
    pub length_sec: i64,
    pub iswc: Option<String>,
    pub upc: Option<String>,
    pub genre: Option<String>,
}

/// Input for updating a track. Unlike creation, the ISRC is caller-supplied
/// (it may be hand-corrected) and is re-validated and duplicate-checked.
#[derive(Clone, Debug, Default)]
pub struct TrackUpdate {
    pub isrc: String,
    pub title: String,
    pub artist: String,
    pub additional_artists: Vec<String>,
    pub album: Option<String>,
    pub release_date: Option<String>,
    pub length_sec: i64,
    pub iswc: Option<String>,
    pub upc: Option<String>,
    pub genre: Option<String>,
}

/// Per-catalog mutable settings, stored as key-value rows in the store
/// itself and passed explicitly to the allocator.
#[derive(Clone, Debug, Default)]
pub struct CatalogSettings {
    /// 5-character registrant prefix (2 letters + 3 alphanumerics),
    /// required before any ISRC can be allocated.
    pub registrant_prefix: Option<String>,
    /// 2-digit artist code, `"00"` when unset.
    pub artist_code: String,
}

/// Verdict of the store's self-consistency check.
#[derive(Clone, Debug, Serialize)]
pub struct IntegrityReport {
    pub ok: bool,
    /// Raw `integrity_check` messages; `["ok"]` when healthy.
    pub messages: Vec<String>,
}
