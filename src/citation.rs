//! Citation lookup.
//!
//! A lookup maps the book's title and author line to a citation record.
//! No match is normal and only means headers carry no citation key.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationRecord {
    /// Citation key, e.g. `smith2019history`
    pub key: String,
    /// Canonical title
    pub title: String,
    /// Authors as the database spells them ("Last, First" or "First Last")
    #[serde(default)]
    pub authors: Vec<String>,
}

pub trait CitationLookup {
    fn lookup(&self, title: &str, author: &str) -> Option<CitationRecord>;
}

/// Lookup that never matches.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCitations;

impl CitationLookup for NoCitations {
    fn lookup(&self, _title: &str, _author: &str) -> Option<CitationRecord> {
        None
    }
}

/// Citation records loaded from a JSON array.
#[derive(Debug, Default, Clone)]
pub struct JsonCitations {
    records: Vec<CitationRecord>,
}

impl JsonCitations {
    pub fn new(records: Vec<CitationRecord>) -> Self {
        Self { records }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Citation(format!("{}: {e}", path.display())))?;
        let records: Vec<CitationRecord> = serde_json::from_str(&content)
            .map_err(|e| Error::Citation(format!("{}: {e}", path.display())))?;
        debug!("loaded {} citation records", records.len());
        Ok(Self::new(records))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl CitationLookup for JsonCitations {
    /// Titles match when equal after normalization; a record's subtitle may
    /// be missing from the book's title. Authors match on any surname.
    fn lookup(&self, title: &str, author: &str) -> Option<CitationRecord> {
        let wanted = normalize(title);
        if wanted.is_empty() {
            return None;
        }
        let author = normalize(author);
        self.records
            .iter()
            .find(|record| {
                let title_matches = {
                    let full = normalize(&record.title);
                    let main = normalize(record.title.split(':').next().unwrap_or_default());
                    full == wanted || main == wanted
                };
                title_matches
                    && (author.is_empty()
                        || record.authors.is_empty()
                        || record
                            .authors
                            .iter()
                            .any(|a| surname(a).is_some_and(|s| author.split(' ').any(|w| w == s))))
            })
            .cloned()
    }
}

/// Lowercase alphanumeric words joined by single spaces.
fn normalize(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn surname(author: &str) -> Option<String> {
    let name = match author.split_once(',') {
        Some((last, _)) => last,
        None => author.split_whitespace().last()?,
    };
    let name = normalize(name);
    (!name.is_empty()).then(|| name.split(' ').last().unwrap_or_default().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn db() -> JsonCitations {
        JsonCitations::new(vec![
            CitationRecord {
                key: "roe2001sea".into(),
                title: "The Sea: A Natural History".into(),
                authors: vec!["Roe, Jane".into()],
            },
            CitationRecord {
                key: "doe1999land".into(),
                title: "Land".into(),
                authors: vec!["John Doe".into()],
            },
        ])
    }

    #[test]
    fn test_lookup_matches_title_and_surname() {
        let hit = db().lookup("The Sea", "Jane Roe").unwrap();
        assert_eq!(hit.key, "roe2001sea");
        assert_eq!(db().lookup("the sea: a natural history", "").unwrap().key, "roe2001sea");
        assert_eq!(db().lookup("LAND", "J. Doe").unwrap().key, "doe1999land");
    }

    #[test]
    fn test_lookup_misses() {
        assert!(db().lookup("The Sea", "Someone Else").is_none());
        assert!(db().lookup("Sky", "Jane Roe").is_none());
        assert!(db().lookup("", "Jane Roe").is_none());
        assert!(NoCitations.lookup("The Sea", "Jane Roe").is_none());
    }

    #[test]
    fn test_from_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("refs.json");
        fs::write(&path, r#"[{"key": "k", "title": "T"}]"#).unwrap();
        let db = JsonCitations::from_path(&path).unwrap();
        assert_eq!(db.len(), 1);
        assert_eq!(db.lookup("T", "Anyone").unwrap().authors, Vec::<String>::new());

        fs::write(&path, "not json").unwrap();
        assert!(matches!(JsonCitations::from_path(&path), Err(Error::Citation(_))));
    }
}
