//! Structural labels, output file names, and the cross-reference map.
//!
//! Labels double as sort keys: front matter `00a`, `00b`, ...; chapters
//! `NN.0` for the defining unit and `NN.i` for the units after it; back
//! matter `90`, `91`, .... Plain byte order of the labels is reading order.

use crate::classifier::ContentUnit;
use crate::report::Warnings;
use crate::structure::DocumentStructure;
use serde::Serialize;
use std::collections::BTreeMap;

/// Extension of every emitted document.
pub const OUTPUT_EXTENSION: &str = "md";

const MAX_TITLE_CHARS: usize = 60;
const ELLIPSIS: char = '\u{2026}';

/// Dropped from file names: illegal on common filesystems or meaningful
/// inside a wiki link.
const DROPPED_CHARS: &[char] = &['?', '*', '"', '<', '>', '#', '^', '[', ']'];
/// Replaced by a hyphen in file names.
const HYPHENATED_CHARS: &[char] = &['/', '\\', ':', '|'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    Front,
    /// First unit of a chapter group
    ChapterHead,
    /// Any later unit of a chapter group
    ChapterPart,
    Back,
}

#[derive(Debug, Clone, Serialize)]
pub struct LabeledUnit {
    pub label: String,
    pub kind: LabelKind,
    /// `"<label> - <safe title>.md"`
    pub output_file: String,
    pub unit: ContentUnit,
}

impl LabeledUnit {
    /// Output file name without extension; the target of wiki links.
    pub fn output_stem(&self) -> &str {
        output_stem(&self.output_file)
    }
}

/// Original unit file name -> output file name.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct CrossReferenceMap(BTreeMap<String, String>);

impl CrossReferenceMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the previous mapping for `original`, if any.
    pub fn insert(&mut self, original: &str, output_file: &str) -> Option<String> {
        self.0.insert(original.to_string(), output_file.to_string())
    }

    pub fn get(&self, original: &str) -> Option<&str> {
        self.0.get(original).map(String::as_str)
    }

    pub fn remove(&mut self, original: &str) -> Option<String> {
        self.0.remove(original)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Assign every unit its label and output file name, and record each in a
/// cross-reference map.
pub fn assign_labels(
    structure: &DocumentStructure,
    warnings: &mut Warnings,
) -> (Vec<LabeledUnit>, CrossReferenceMap) {
    let numbers = chapter_numbers(structure, warnings);
    let width = label_width(numbers.last().copied().unwrap_or(0));
    let mut labeled = Vec::with_capacity(structure.unit_count());

    for (i, unit) in structure.front_matter.iter().enumerate() {
        let label = format!("{}{}", "0".repeat(width), alpha_suffix(i));
        labeled.push(make(label, LabelKind::Front, unit));
    }

    for (group, number) in structure.chapters.iter().zip(&numbers) {
        let part_width = digits(group.units.len().saturating_sub(1));
        for (i, unit) in group.units.iter().enumerate() {
            if i == 0 {
                let label = format!("{number:0width$}.0");
                labeled.push(make(label, LabelKind::ChapterHead, unit));
            } else {
                let label = format!("{number:0width$}.{i:0part_width$}");
                labeled.push(make(label, LabelKind::ChapterPart, unit));
            }
        }
    }

    let back_slots = 10usize.pow(width as u32 - 1);
    for (i, unit) in structure.back_matter.iter().enumerate() {
        let label = if i < back_slots {
            format!("9{:0w$}", i, w = width - 1)
        } else {
            format!("{}{}", "9".repeat(width), alpha_suffix(i - back_slots))
        };
        labeled.push(make(label, LabelKind::Back, unit));
    }

    let mut xref = CrossReferenceMap::new();
    for entry in &labeled {
        if let Some(previous) = xref.insert(&entry.unit.file_name, &entry.output_file) {
            warnings.push(format!(
                "{} appears more than once; links now point at {} instead of {}",
                entry.unit.file_name, entry.output_file, previous
            ));
        }
    }

    (labeled, xref)
}

fn make(label: String, kind: LabelKind, unit: &ContentUnit) -> LabeledUnit {
    let output_file = output_file_name(&label, &unit.title, &unit.file_name);
    LabeledUnit {
        label,
        kind,
        output_file,
        unit: unit.clone(),
    }
}

/// Numbers used in chapter labels.
///
/// Extracted chapter numbers are kept when every group has one and they
/// strictly increase from 1 up; otherwise groups are numbered by position.
fn chapter_numbers(structure: &DocumentStructure, warnings: &mut Warnings) -> Vec<usize> {
    let extracted: Option<Vec<u32>> = structure.chapters.iter().map(|g| g.number).collect();
    match extracted {
        Some(numbers)
            if numbers.first().map_or(true, |n| *n > 0)
                && numbers.windows(2).all(|w| w[0] < w[1]) =>
        {
            numbers.into_iter().map(|n| n as usize).collect()
        }
        _ => {
            warnings.push(
                "chapter numbers are missing or out of order; numbering chapters by position",
            );
            (1..=structure.chapters.len()).collect()
        }
    }
}

/// Digits in chapter labels: at least two, and enough that the highest
/// chapter still sorts before the back matter's leading 9.
fn label_width(max_chapter: usize) -> usize {
    let mut width = 2;
    while max_chapter >= 9 * 10usize.pow(width as u32 - 1) {
        width += 1;
    }
    width
}

fn digits(n: usize) -> usize {
    n.to_string().len()
}

/// `a`..`z`, then `za`..`zz`, then `zza`...; sorts in index order.
fn alpha_suffix(index: usize) -> String {
    let letter = (b'a' + (index % 26) as u8) as char;
    format!("{}{}", "z".repeat(index / 26), letter)
}

/// `"<label> - <safe title>.md"`, falling back to the source file's stem.
pub fn output_file_name(label: &str, title: &str, source_file: &str) -> String {
    let mut safe = safe_title(title);
    if safe.is_empty() {
        safe = safe_title(source_file.rsplit_once('.').map_or(source_file, |(stem, _)| stem));
    }
    if safe.is_empty() {
        safe = "Untitled".to_string();
    }
    format!("{label} - {safe}.{OUTPUT_EXTENSION}")
}

/// Make a title usable as a file name, truncating long titles with an
/// ellipsis.
pub fn safe_title(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !DROPPED_CHARS.contains(c) && !c.is_control())
        .map(|c| if HYPHENATED_CHARS.contains(&c) { '-' } else { c })
        .collect();
    let cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let cleaned = cleaned.trim_end_matches(['.', ' ']);

    if cleaned.chars().count() <= MAX_TITLE_CHARS {
        return cleaned.to_string();
    }
    let mut truncated: String = cleaned.chars().take(MAX_TITLE_CHARS - 1).collect();
    truncated.truncate(truncated.trim_end_matches(['.', ' ']).len());
    truncated.push(ELLIPSIS);
    truncated
}

pub fn output_stem(output_file: &str) -> &str {
    output_file
        .strip_suffix(OUTPUT_EXTENSION)
        .and_then(|s| s.strip_suffix('.'))
        .unwrap_or(output_file)
}
