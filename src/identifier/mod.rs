//! Identifier codec for sound-recording metadata.
//!
//! Pure parsing, validation and cross-format conversion for the two
//! identifier families carried by catalog records: ISRC (identifies a
//! specific recording) and ISWC (identifies the underlying musical work),
//! plus the optional UPC/EAN product code.
//!
//! Identifiers arrive from manual entry, generation and import in
//! inconsistent casing and punctuation. Normalization is total (empty in,
//! empty out, never an error) so any two inputs can be compared for
//! equality; format validation is strict and explicit.

mod allocator;

pub use allocator::{allocate_isrc, SEQUENCE_MAX};

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref ISRC_COMPACT_RE: Regex =
        Regex::new(r"^[A-Z]{2}[A-Z0-9]{3}[0-9]{7}$").unwrap();
    static ref ISRC_ISO_RE: Regex =
        Regex::new(r"^[A-Z]{2}-[A-Z0-9]{3}-[0-9]{2}-[0-9]{5}$").unwrap();
    // Accept both compact (T1234567890) and ISO (T-123.456.789-0)
    static ref ISWC_ANY_RE: Regex =
        Regex::new(r"^(?:T[0-9]{9}[0-9X]|T-[0-9]{3}\.[0-9]{3}\.[0-9]{3}-[0-9X])$").unwrap();
    static ref UPC_EAN_RE: Regex = Regex::new(r"^[0-9]{12,13}$").unwrap();
    static ref REGISTRANT_PREFIX_RE: Regex = Regex::new(r"^[A-Z]{2}[A-Z0-9]{3}$").unwrap();
    static ref ARTIST_CODE_RE: Regex = Regex::new(r"^[0-9]{2}$").unwrap();
}

fn is_blank(s: &str) -> bool {
    s.trim().is_empty()
}

// ---------- ISRC ----------

/// Strip everything outside `A-Z0-9` after upper-casing.
///
/// Total: any input maps to some (possibly empty) compact string.
pub fn normalize_isrc(s: &str) -> String {
    s.to_ascii_uppercase()
        .chars()
        .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
        .collect()
}

/// Render any ISRC spelling as ISO `CC-XXX-YY-NNNNN`, or `None` if the
/// normalized form is not a valid 12-character ISRC.
pub fn to_iso_isrc(s: &str) -> Option<String> {
    let sc = normalize_isrc(s);
    if !ISRC_COMPACT_RE.is_match(&sc) {
        return None;
    }
    Some(format!(
        "{}-{}-{}-{}",
        &sc[0..2],
        &sc[2..5],
        &sc[5..7],
        &sc[7..12]
    ))
}

/// Strict compact 12-character ISRC, or `None`.
pub fn to_compact_isrc(s: &str) -> Option<String> {
    let sc = normalize_isrc(s);
    ISRC_COMPACT_RE.is_match(&sc).then_some(sc)
}

/// True if the input matches either the compact or the ISO-hyphenated form.
pub fn is_valid_isrc(s: &str) -> bool {
    if is_blank(s) {
        return false;
    }
    let trimmed = s.trim().to_ascii_uppercase();
    ISRC_COMPACT_RE.is_match(&normalize_isrc(&trimmed)) || ISRC_ISO_RE.is_match(&trimmed)
}

/// True for a well-formed 5-character registrant prefix (`CC` + `XXX`).
pub fn is_valid_registrant_prefix(s: &str) -> bool {
    REGISTRANT_PREFIX_RE.is_match(s)
}

/// True for a 2-digit artist code (`00`..`99`).
pub fn is_valid_artist_code(s: &str) -> bool {
    ARTIST_CODE_RE.is_match(s)
}

// ---------- ISWC ----------

/// Compact uppercase ISWC (e.g. `T1234567890`); total like [`normalize_isrc`].
pub fn normalize_iswc(s: &str) -> String {
    normalize_isrc(s)
}

/// Render any ISWC spelling as ISO `T-DDD.DDD.DDD-C`, or `None`.
pub fn to_iso_iswc(s: &str) -> Option<String> {
    let sc = normalize_iswc(s);
    if !sc.starts_with('T') || sc.len() != 11 {
        return None;
    }
    let body = &sc[1..10];
    let chk = &sc[10..11];
    if !body.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if !(chk.bytes().all(|b| b.is_ascii_digit()) || chk == "X") {
        return None;
    }
    Some(format!(
        "T-{}.{}.{}-{}",
        &body[0..3],
        &body[3..6],
        &body[6..9],
        chk
    ))
}

/// ISWC is optional: blank is valid; otherwise the input must match the
/// compact or ISO pattern.
pub fn is_valid_iswc(s: &str) -> bool {
    if is_blank(s) {
        return true;
    }
    ISWC_ANY_RE.is_match(&s.trim().to_ascii_uppercase())
}

// ---------- UPC / EAN ----------

/// UPC/EAN is optional: blank is valid; otherwise exactly 12 or 13 digits.
pub fn is_valid_upc_ean(s: &str) -> bool {
    if is_blank(s) {
        return true;
    }
    UPC_EAN_RE.is_match(s.trim())
}

// ---------- Track length helpers ----------

/// Format a non-negative seconds count as `hh:mm:ss`.
pub fn seconds_to_hms(total: i64) -> String {
    let total = total.max(0);
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Parse an `hh:mm:ss` string back to seconds; anything unparsable is 0.
pub fn parse_hms_text(t: &str) -> i64 {
    let parts: Vec<i64> = t
        .split(':')
        .map(|p| p.trim().parse::<i64>())
        .collect::<Result<_, _>>()
        .unwrap_or_default();
    if parts.len() != 3 {
        return 0;
    }
    let (h, m, s) = (parts[0].max(0), parts[1].clamp(0, 59), parts[2].clamp(0, 59));
    h * 3600 + m * 60 + s
}
