//! Note UIDs.
//!
//! A UID is minted from wall-clock time as `YYYYMMDD 'T' HHMMSS MMM CCC 'Z'`
//! where `MMM` is the current millisecond and `CCC` a process-local
//! counter modulo 1000. The counter disambiguates mints that land in
//! the same millisecond, so sorting UIDs lexicographically yields
//! creation order.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

static UID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{8}T\d{12}Z$").unwrap());

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// Mint a fresh UID from the current wall-clock time.
pub fn mint_uid() -> String {
    let now = Utc::now();
    let count = COUNTER.fetch_add(1, Ordering::Relaxed) % 1000;
    format!(
        "{}{:03}{:03}Z",
        now.format("%Y%m%dT%H%M%S"),
        now.timestamp_subsec_millis(),
        count
    )
}

/// Whether `candidate` has the UID shape.
pub fn is_valid_uid(candidate: &str) -> bool {
    UID_PATTERN.is_match(candidate)
}

/// Extract the UID embedded at the tail of a note file name
/// (`{slug}-{uid}.md` or `{uid}.md`).
pub fn uid_from_file_name(file_name: &str) -> Option<&str> {
    let stem = file_name.strip_suffix(".md")?;
    if stem.len() < 22 || !stem.is_char_boundary(stem.len() - 22) {
        return None;
    }
    let tail = &stem[stem.len() - 22..];
    if is_valid_uid(tail) && (stem.len() == 22 || stem.as_bytes()[stem.len() - 23] == b'-') {
        Some(tail)
    } else {
        None
    }
}
