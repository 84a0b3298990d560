//! Sequential ISRC allocator.
//!
//! Given a registrant prefix, a 2-digit year and a 2-digit artist code,
//! finds the lowest unused sequence number against the live store. The
//! five-digit designation code is sub-allocated as `AA` (artist code) +
//! `SSS` (sequence), so each (prefix, year, artist) stem owns 999 slots.
//!
//! The scan is an optimization, not the correctness guarantee: allocation
//! runs inside the same transaction as the insert, and the unique index on
//! `tracks.isrc_compact` closes the race between two saves picking the
//! same number.

use rusqlite::{params, Connection};

use crate::catalog_store::{StoreError, StoreResult};

use super::{is_valid_artist_code, is_valid_registrant_prefix};

/// Highest sequence number per stem. Sequence `000` is never issued.
pub const SEQUENCE_MAX: u32 = 999;

/// Allocate the next free ISRC for `PREFIX+YY+AA` and return it in ISO
/// form (`CC-XXX-YY-NNNNN`).
///
/// Numbers are never reused once issued, so exhaustion of all 999 slots is
/// a hard error: the caller must pick a different year or artist code.
pub fn allocate_isrc(
    conn: &Connection,
    prefix: &str,
    year: u32,
    artist_code: &str,
) -> StoreResult<String> {
    let prefix = prefix.trim().to_ascii_uppercase();
    if !is_valid_registrant_prefix(&prefix) {
        return Err(StoreError::Validation(format!(
            "registrant prefix must be 2 letters + 3 alphanumerics, got '{prefix}'"
        )));
    }
    if !is_valid_artist_code(artist_code) {
        return Err(StoreError::Validation(format!(
            "artist code must be 2 digits (00-99), got '{artist_code}'"
        )));
    }
    if year > 99 {
        return Err(StoreError::Validation(format!(
            "allocation year must be 2 digits (00-99), got '{year}'"
        )));
    }

    let stem = format!("{prefix}{year:02}{artist_code}");

    let mut stmt = conn.prepare_cached("SELECT 1 FROM tracks WHERE isrc_compact = ?1 LIMIT 1")?;
    for seq in 1..=SEQUENCE_MAX {
        let candidate = format!("{stem}{seq:03}");
        let taken = stmt.exists(params![candidate])?;
        if !taken {
            return Ok(format!(
                "{}-{}-{year:02}-{artist_code}{seq:03}",
                &prefix[0..2],
                &prefix[2..5]
            ));
        }
    }

    Err(StoreError::ExhaustedSequence { stem })
}
