//! Genre name to style code lookup
//!
//! MixesDB filters its Explorer listing by a short style code. Users refer to
//! genres by name (or a familiar alias), so every run resolves its genre here
//! before any page is requested.

use crate::config::types::GenreEntry;
use crate::{ConfigError, ConfigResult};

/// Built-in MixesDB style codes: (name, code, estimated mixes, aliases)
const BUILTIN_GENRES: &[(&str, &str, usize, &[&str])] = &[
    ("Hip Hop", "HH", 2934, &["Hip Hop / R&B"]),
    ("Deep House", "DH", 16089, &[]),
    ("Techno", "TA", 42933, &["Techno / Acid"]),
    ("Progressive / Trance", "PT", 37651, &["Progressive", "Trance"]),
    ("Progressive House", "PH", 35541, &[]),
    ("Minimal House", "MH", 3138, &[]),
    ("Tech House", "TH", 44431, &["Tech House / Electro", "Electro"]),
    ("Pure Minimal", "PM", 617, &["Minimal"]),
    ("Drum & Bass", "DB", 2890, &["Drum & Bass / Jungle", "Jungle"]),
    ("Chill Out / Ambient", "CA", 5971, &["Chill Out", "Ambient"]),
    ("House", "H", 0, &[]),
];

/// Read-only genre table, resolved case-insensitively by name or alias
#[derive(Debug, Clone)]
pub struct GenreTable {
    entries: Vec<GenreEntry>,
}

impl GenreTable {
    /// The style codes MixesDB publishes
    pub fn builtin() -> Self {
        let entries = BUILTIN_GENRES
            .iter()
            .map(|(name, code, estimate, aliases)| GenreEntry {
                name: (*name).to_string(),
                style_code: (*code).to_string(),
                aliases: aliases.iter().map(|a| (*a).to_string()).collect(),
                // An estimate of zero means the site does not report a count
                estimated_count: (*estimate > 0).then_some(*estimate),
            })
            .collect();
        Self { entries }
    }

    pub fn from_entries(entries: Vec<GenreEntry>) -> Self {
        Self { entries }
    }

    /// Looks up a genre by name or alias, ignoring case and surrounding whitespace
    pub fn lookup(&self, name: &str) -> Option<&GenreEntry> {
        let wanted = name.trim().to_lowercase();
        if wanted.is_empty() {
            return None;
        }
        self.entries.iter().find(|entry| {
            entry.name.to_lowercase() == wanted
                || entry.aliases.iter().any(|a| a.to_lowercase() == wanted)
        })
    }

    /// Like [`GenreTable::lookup`], but an unknown name is an error
    pub fn resolve(&self, name: &str) -> ConfigResult<&GenreEntry> {
        self.lookup(name)
            .ok_or_else(|| ConfigError::UnknownGenre(name.trim().to_string()))
    }

    pub fn entries(&self) -> &[GenreEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for GenreTable {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_codes() {
        let table = GenreTable::builtin();
        assert_eq!(table.len(), 11);
        assert_eq!(table.lookup("Techno").unwrap().style_code, "TA");
        assert_eq!(table.lookup("Deep House").unwrap().style_code, "DH");
        assert_eq!(table.lookup("House").unwrap().style_code, "H");
    }

    #[test]
    fn test_resolve_unknown_genre() {
        let table = GenreTable::builtin();
        assert_eq!(table.resolve(" techno ").unwrap().name, "Techno");
        assert!(matches!(table.resolve("Polka"), Err(ConfigError::UnknownGenre(name)) if name == "Polka"));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let table = GenreTable::builtin();
        assert_eq!(table.lookup("tech house").unwrap().style_code, "TH");
        assert_eq!(table.lookup("  DRUM & BASS ").unwrap().style_code, "DB");
    }

    #[test]
    fn test_lookup_by_alias() {
        let table = GenreTable::builtin();
        assert_eq!(table.lookup("jungle").unwrap().name, "Drum & Bass");
        assert_eq!(table.lookup("Ambient").unwrap().style_code, "CA");
        assert_eq!(table.lookup("Minimal").unwrap().style_code, "PM");
    }

    #[test]
    fn test_unknown_genre() {
        let table = GenreTable::builtin();
        assert!(table.lookup("Polka").is_none());
        assert!(table.lookup("").is_none());
    }

    #[test]
    fn test_house_has_no_estimate() {
        let table = GenreTable::builtin();
        assert_eq!(table.lookup("House").unwrap().estimated_count, None);
        assert_eq!(table.lookup("Techno").unwrap().estimated_count, Some(42933));
    }
}
