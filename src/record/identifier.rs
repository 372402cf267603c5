//! Stable record identifiers
//!
//! The identifier is a truncated SHA-256 over the normalized date, author and
//! title, so fetching the same logical mix twice always yields the same value.
//! Fields are length-prefixed before hashing.
//! Cosmetic differences (case, runs of whitespace) do not change it.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

/// Hex characters kept from the digest
const IDENTIFIER_LEN: usize = 16;

fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Derives the identifier of a record
///
/// # Arguments
///
/// * `date` - Release date, if known
/// * `author` - Attributed DJ or artist, if known
/// * `title` - Record title
///
/// # Returns
///
/// * `Some(String)` - 16 lowercase hex characters
/// * `None` - The title is blank, so there is nothing stable to identify
pub fn record_identifier(date: Option<NaiveDate>, author: Option<&str>, title: &str) -> Option<String> {
    let title = normalize(title);
    if title.is_empty() {
        return None;
    }

    let date = date.map(|d| d.format("%Y-%m-%d").to_string()).unwrap_or_default();
    let author = author.map(normalize).unwrap_or_default();

    // Each field is length-prefixed, so no separator inside a field can move a boundary
    let mut hasher = Sha256::new();
    for field in [&date, &author, &title] {
        hasher.update((field.len() as u64).to_le_bytes());
        hasher.update(field.as_bytes());
    }
    let digest = hex::encode(hasher.finalize());

    Some(digest[..IDENTIFIER_LEN].to_string())
}
