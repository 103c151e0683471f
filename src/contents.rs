//! The contents index: one document linking every emitted unit in label
//! order.

use crate::labels::{output_stem, LabeledUnit};
use crate::markdown::wiki_link;
use lazy_static::lazy_static;
use regex::Regex;

/// File name of the contents index in the output directory.
pub const CONTENTS_FILE: &str = "README.md";

/// Localized "index" titles; a second one in the book is a navigation
/// artifact.
const INDEX_TITLES: &[&str] = &["index", "indice", "índice", "register", "indeks", "sachregister"];

lazy_static! {
    static ref ROMAN_ONLY: Regex = Regex::new(r"(?i)^m{0,3}(?:cm|cd|d?c{0,3})(?:xc|xl|l?x{0,3})(?:ix|iv|v?i{0,3})\.?$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentsEntry {
    pub label: String,
    pub title: String,
    pub output_file: String,
}

impl From<&LabeledUnit> for ContentsEntry {
    fn from(entry: &LabeledUnit) -> Self {
        Self {
            label: entry.label.clone(),
            title: entry.unit.title.clone(),
            output_file: entry.output_file.clone(),
        }
    }
}

impl ContentsEntry {
    /// Chapter-defining and front/back entries sit at the top level.
    fn is_top_level(&self) -> bool {
        match self.label.split_once('.') {
            Some((_, part)) => part == "0",
            None => true,
        }
    }

    /// Entries of one family share a chapter, or are all front or all back
    /// matter.
    fn family(&self) -> &str {
        match self.label.split_once('.') {
            Some((chapter, _)) => chapter,
            None if self.label.ends_with(|c: char| c.is_ascii_alphabetic()) => "front",
            None => "back",
        }
    }

    fn is_chapter_head(&self) -> bool {
        self.label.ends_with(".0")
    }
}

/// Render the contents index below `header`.
///
/// Decorative navigation artifacts are skipped, and so is the rest of the
/// contiguous run they start; a chapter head or a change of family ends
/// the run.
pub fn build_contents(entries: &[ContentsEntry], header: &str) -> String {
    let mut entries: Vec<&ContentsEntry> = entries.iter().collect();
    entries.sort_by(|a, b| a.label.cmp(&b.label));

    let mut out = String::from(header);
    out.push_str("## Contents\n\n");

    let mut seen_index = false;
    let mut skipping: Option<&str> = None;
    for entry in entries {
        if entry.is_chapter_head() || skipping.is_some_and(|family| family != entry.family()) {
            skipping = None;
        }
        if skipping.is_none() && !entry.is_chapter_head() && is_artifact(&entry.title, seen_index) {
            skipping = Some(entry.family());
        }
        if is_index_title(&entry.title) {
            seen_index = true;
        }
        if skipping.is_some() {
            continue;
        }

        let indent = if entry.is_top_level() { "" } else { "    " };
        let link = wiki_link(output_stem(&entry.output_file), None, &entry.title);
        out.push_str(&format!("{indent}- {} {link}\n", entry.label));
    }
    out
}

fn is_index_title(title: &str) -> bool {
    let title = title.trim().to_lowercase();
    INDEX_TITLES.contains(&title.as_str())
}

fn is_artifact(title: &str, seen_index: bool) -> bool {
    let title = title.trim();
    (!title.is_empty() && ROMAN_ONLY.is_match(title)) || (seen_index && is_index_title(title))
}
