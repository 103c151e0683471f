//! Grouping classified units into front matter, chapters, and back matter.

use crate::classifier::{Classification, ContentUnit};
use crate::report::Warnings;
use serde::Serialize;

/// Share of single-unit chapters above which grouping looks broken.
const SINGLE_UNIT_RATIO: f64 = 0.7;
/// Fewer groups than this say nothing about the single-unit ratio.
const MIN_GROUPS_FOR_RATIO: usize = 4;
/// A chapter is an outlier when it holds more than this many units...
const OUTLIER_MIN_UNITS: usize = 15;
/// ...and more than this multiple of the median chapter size.
const OUTLIER_MEDIAN_FACTOR: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChapterGroup {
    pub number: Option<u32>,
    /// Title of the chapter-defining (first) unit
    pub title: String,
    pub units: Vec<ContentUnit>,
}

impl ChapterGroup {
    fn open(unit: ContentUnit) -> Self {
        Self {
            number: unit.chapter_number(),
            title: unit.title.clone(),
            units: vec![unit],
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DocumentStructure {
    pub front_matter: Vec<ContentUnit>,
    pub chapters: Vec<ChapterGroup>,
    pub back_matter: Vec<ContentUnit>,
}

impl DocumentStructure {
    /// Every unit in final reading order.
    pub fn units(&self) -> impl Iterator<Item = &ContentUnit> {
        self.front_matter
            .iter()
            .chain(self.chapters.iter().flat_map(|g| g.units.iter()))
            .chain(self.back_matter.iter())
    }

    pub fn unit_count(&self) -> usize {
        self.units().count()
    }
}

/// Walk units in reading order and group them.
pub fn build_structure(units: Vec<ContentUnit>, warnings: &mut Warnings) -> DocumentStructure {
    let mut structure = DocumentStructure::default();
    let mut open: Option<ChapterGroup> = None;
    let mut in_back_matter = false;

    for unit in units {
        let classification = unit.classification.clone();
        match classification {
            Classification::Chapter { number } => {
                let continues = number.is_some()
                    && open.as_ref().is_some_and(|group| group.number == number);
                if continues {
                    if let Some(group) = open.as_mut() {
                        group.units.push(unit);
                    }
                } else {
                    structure.chapters.extend(open.take());
                    open = Some(ChapterGroup::open(unit));
                    in_back_matter = false;
                }
            }
            Classification::Backmatter => {
                structure.chapters.extend(open.take());
                structure.back_matter.push(unit);
                in_back_matter = true;
            }
            _ if open.is_some() => {
                if let Some(group) = open.as_mut() {
                    group.units.push(unit);
                }
            }
            _ if in_back_matter => structure.back_matter.push(unit),
            Classification::Frontmatter => structure.front_matter.push(unit),
            Classification::Unclassified => {
                warnings.push(format!(
                    "{} could not be classified; placed in front matter",
                    unit.file_name
                ));
                structure.front_matter.push(unit);
            }
            Classification::Level { .. } => {
                warnings.push(format!(
                    "{} is a subsection with no open chapter; placed in front matter",
                    unit.file_name
                ));
                structure.front_matter.push(unit);
            }
        }
    }
    structure.chapters.extend(open);

    for warning in validate(&structure) {
        warnings.push(warning);
    }
    structure
}

/// Flag groupings that suggest the classification heuristics misfired.
pub fn validate(structure: &DocumentStructure) -> Vec<String> {
    let mut warnings = Vec::new();
    let groups = &structure.chapters;

    if groups.is_empty() {
        if structure.unit_count() > 0 {
            warnings.push("no chapters detected; every unit is front or back matter".to_string());
        }
        return warnings;
    }

    let singles = groups.iter().filter(|g| g.units.len() == 1).count();
    if groups.len() >= MIN_GROUPS_FOR_RATIO
        && singles as f64 / groups.len() as f64 > SINGLE_UNIT_RATIO
    {
        warnings.push(format!(
            "{singles} of {} chapters hold a single unit; chapter boundaries may be wrong",
            groups.len()
        ));
    }

    let mut sizes: Vec<usize> = groups.iter().map(|g| g.units.len()).collect();
    sizes.sort_unstable();
    let median = sizes[sizes.len() / 2];
    let limit = OUTLIER_MIN_UNITS.max(OUTLIER_MEDIAN_FACTOR * median);
    for group in groups.iter().filter(|g| g.units.len() > limit) {
        warnings.push(format!(
            "chapter \"{}\" holds {} units (median {median}); subsections may have been merged",
            group.title,
            group.units.len()
        ));
    }

    warnings
}
