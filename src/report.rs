//! Structured records describing a run.
//!
//! The pipeline fills these in and hands them back; displaying or persisting
//! them is up to the caller.

use crate::classifier::{Classification, ContentUnit};
use crate::error::Result;
use crate::labels::LabeledUnit;
use crate::structure::DocumentStructure;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Warnings collected over a run, in the order they were raised.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Warnings(Vec<String>);

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a warning; it is also logged at the moment it is raised.
    pub fn push(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.0.push(message);
    }

    /// Take over warnings raised and logged elsewhere.
    pub fn append(&mut self, other: Warnings) {
        self.0.extend(other.0);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.0.iter().any(|w| w.contains(needle))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnitRecord {
    pub file: String,
    pub title: String,
    pub classification: Classification,
    pub primary_id: Option<String>,
}

impl From<&ContentUnit> for UnitRecord {
    fn from(unit: &ContentUnit) -> Self {
        Self {
            file: unit.file_name.clone(),
            title: unit.title.clone(),
            classification: unit.classification.clone(),
            primary_id: unit.primary_id.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupRecord {
    pub number: Option<u32>,
    pub title: String,
    pub files: Vec<String>,
}

#[derive(Debug, Default, Clone, Serialize)]
pub struct RunReport {
    pub units_converted: usize,
    pub units_skipped: usize,
    pub chapters_detected: usize,
    pub front_matter: Vec<String>,
    pub chapters: Vec<GroupRecord>,
    pub back_matter: Vec<String>,
    pub units: Vec<UnitRecord>,
    /// Structural label -> output file name
    pub labels: BTreeMap<String, String>,
    pub warnings: Warnings,
}

impl RunReport {
    pub fn record_structure(&mut self, structure: &DocumentStructure) {
        let files = |units: &[ContentUnit]| units.iter().map(|u| u.file_name.clone()).collect();
        self.front_matter = files(&structure.front_matter);
        self.back_matter = files(&structure.back_matter);
        self.chapters = structure
            .chapters
            .iter()
            .map(|group| GroupRecord {
                number: group.number,
                title: group.title.clone(),
                files: files(&group.units),
            })
            .collect();
        self.chapters_detected = structure.chapters.len();
        self.units = structure.units().map(UnitRecord::from).collect();
    }

    pub fn record_labels(&mut self, labeled: &[LabeledUnit]) {
        self.labels = labeled
            .iter()
            .map(|l| (l.label.clone(), l.output_file.clone()))
            .collect();
    }

    pub fn write_json(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// One-paragraph summary followed by the collected warnings.
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Converted {} units into {} chapters ({} skipped)",
            self.units_converted, self.chapters_detected, self.units_skipped
        );
        if !self.warnings.is_empty() {
            out.push_str(&format!("\n{} warnings:", self.warnings.len()));
            for warning in self.warnings.iter() {
                out.push_str("\n  - ");
                out.push_str(warning);
            }
        }
        out
    }
}
