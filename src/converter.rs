//! The conversion pipeline.
//!
//! Package reading, classification, grouping, and labeling run first; then
//! every unit goes through the pre-pass and the converter and is normalized
//! twice. The first pass only knows the units written so far; the second
//! runs once every output file name is final, so links to later units
//! resolve too.

use crate::archive::unpack_epub;
use crate::backend::MarkupConverter;
use crate::citation::{CitationLookup, CitationRecord};
use crate::classifier::ContentUnit;
use crate::context::RunContext;
use crate::contents::{build_contents, ContentsEntry, CONTENTS_FILE};
use crate::epub_reader::{read_text, ManifestItem, Package};
use crate::error::{Error, Result};
use crate::image::copy_images;
use crate::labels::{assign_labels, CrossReferenceMap, LabeledUnit};
use crate::markdown::normalize;
use crate::metadata::{document_header, format_metadata, BookMetadata};
use crate::navigation::{load_navigation, Navigation};
use crate::prepass::prepass;
use crate::report::{RunReport, Warnings};
use crate::structure::build_structure;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// Name of the work directory kept under the output directory.
pub const KEPT_WORK_DIR: &str = ".epub2notes-work";

/// Options for [`convert`].
#[derive(Debug, Clone)]
pub struct ConvertOptions {
    pub output_dir: PathBuf,
    pub copy_images: bool,
    /// Keep pre-pass markup and raw converter output under the output
    /// directory instead of a temporary directory
    pub keep_work: bool,
}

impl ConvertOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            copy_images: true,
            keep_work: false,
        }
    }
}

/// Convert an `.epub` file or an unpacked package directory.
pub fn convert(
    input: &Path,
    options: &ConvertOptions,
    converter: &dyn MarkupConverter,
    citations: &dyn CitationLookup,
) -> Result<RunReport> {
    let mut scratch: Vec<TempDir> = Vec::new();

    let package_root = if input.is_dir() {
        input.to_path_buf()
    } else {
        let dir = TempDir::new()?;
        unpack_epub(input, dir.path())?;
        let root = dir.path().to_path_buf();
        scratch.push(dir);
        root
    };

    let work_dir = if options.keep_work {
        options.output_dir.join(KEPT_WORK_DIR)
    } else {
        let dir = TempDir::new()?;
        let path = dir.path().to_path_buf();
        scratch.push(dir);
        path
    };

    let ctx = RunContext::new(&package_root, &options.output_dir, &work_dir)
        .with_images(options.copy_images);

    let mut warnings = Warnings::new();
    let metadata = BookMetadata::read(input, &mut warnings);
    let mut report = convert_package(&ctx, converter, citations, &metadata)?;
    report.warnings.append(warnings);
    if options.keep_work {
        info!("work files kept in {}", work_dir.display());
    }
    Ok(report)
}

/// Run the pipeline over an unpacked package.
pub fn convert_package(
    ctx: &RunContext,
    converter: &dyn MarkupConverter,
    citations: &dyn CitationLookup,
    metadata: &BookMetadata,
) -> Result<RunReport> {
    let mut report = RunReport::default();

    let package = Package::open(&ctx.package_root)?;
    let navigation = load_navigation(&package)?;
    info!(
        "read package {} ({} navigation entries from {})",
        package.opf_path.display(),
        navigation.entries.len(),
        navigation.source.display()
    );

    let units = read_units(&package, &navigation, &mut report)?;
    let structure = build_structure(units, &mut report.warnings);
    report.record_structure(&structure);
    info!(
        front = structure.front_matter.len(),
        chapters = structure.chapters.len(),
        back = structure.back_matter.len(),
        "structure built"
    );

    let (labeled, mut xref) = assign_labels(&structure, &mut report.warnings);

    fs::create_dir_all(&ctx.output_dir)?;
    fs::create_dir_all(&ctx.work_dir)?;
    if ctx.copy_images {
        copy_images(&package, &ctx.asset_dir(), &mut report.warnings)?;
    }

    let citation = metadata
        .title
        .as_deref()
        .and_then(|title| citations.lookup(title, &metadata.authors_line()));
    if citation.is_none() && metadata.title.is_some() {
        debug!("no citation record matched the book");
    }

    // Pass one: convert, and normalize against the units written so far.
    let mut written: Vec<(&LabeledUnit, String)> = Vec::new();
    let mut partial = CrossReferenceMap::new();
    for entry in &labeled {
        match convert_unit(ctx, converter, entry)? {
            Some(raw) => {
                partial.insert(&entry.unit.file_name, &entry.output_file);
                let body = normalize(&raw, &partial, &entry.unit.file_name, &entry.unit.title);
                write_document(ctx, entry, metadata, citation.as_ref(), &body)?;
                written.push((entry, raw));
            }
            None => {
                report.warnings.push(format!(
                    "converter produced no output for {}; skipped",
                    entry.unit.file_name
                ));
                report.units_skipped += 1;
                xref.remove(&entry.unit.file_name);
            }
        }
    }

    // Pass two: every output file name is final now.
    debug!(units = written.len(), targets = xref.len(), "rewriting cross-references");
    for (entry, raw) in &written {
        let body = normalize(raw, &xref, &entry.unit.file_name, &entry.unit.title);
        write_document(ctx, entry, metadata, citation.as_ref(), &body)?;
    }

    let emitted: Vec<LabeledUnit> = written.iter().map(|(entry, _)| (*entry).clone()).collect();
    let entries: Vec<ContentsEntry> = emitted.iter().map(ContentsEntry::from).collect();
    let index = build_contents(&entries, &format_metadata(metadata, citation.as_ref()));
    fs::write(ctx.output_dir.join(CONTENTS_FILE), index)?;

    report.units_converted = emitted.len();
    report.record_labels(&emitted);
    info!(
        "wrote {} documents to {}",
        report.units_converted,
        ctx.output_dir.display()
    );
    Ok(report)
}

/// Content units in reading order. Units missing from disk are skipped
/// with a warning.
fn read_units(
    package: &Package,
    navigation: &Navigation,
    report: &mut RunReport,
) -> Result<Vec<ContentUnit>> {
    let mut items = package.spine_items();
    if items.is_empty() {
        report
            .warnings
            .push("spine lists no content documents; using navigation order");
        items = navigation
            .files_in_order()
            .iter()
            .filter_map(|file| manifest_item_for(package, file))
            .collect();
    }

    let mut units = Vec::with_capacity(items.len());
    for item in items {
        let path = package.resolve(&item.href);
        let file_name = item.file_name();
        if !path.is_file() {
            report
                .warnings
                .push(format!("content unit {} is missing; skipped", item.href));
            report.units_skipped += 1;
            continue;
        }
        let markup = read_text(&path)?;
        units.push(ContentUnit::from_markup(
            &item.id,
            &file_name,
            &path,
            &markup,
            navigation.label_for(&file_name),
        ));
    }
    Ok(units)
}

fn manifest_item_for<'a>(package: &'a Package, file: &str) -> Option<&'a ManifestItem> {
    package
        .manifest_items()
        .find(|item| item.is_content() && item.file_name() == file)
}

/// Pre-pass and convert one unit. `None` when the converter wrote nothing
/// or only whitespace.
fn convert_unit(
    ctx: &RunContext,
    converter: &dyn MarkupConverter,
    entry: &LabeledUnit,
) -> Result<Option<String>> {
    let markup = read_text(&entry.unit.path)?;
    let input = ctx.work_dir.join(format!("{}.xhtml", entry.label));
    let output = ctx.work_dir.join(format!("{}.md", entry.label));
    fs::write(&input, prepass(&markup))?;
    if output.exists() {
        fs::remove_file(&output)?;
    }

    debug!(unit = %entry.unit.file_name, label = %entry.label, "converting with {}", converter.name());
    converter.convert(&input, &output).map_err(|err| match err {
        Error::Converter { detail, .. } => Error::Converter {
            unit: entry.unit.file_name.clone(),
            detail,
        },
        other => other,
    })?;

    if !output.is_file() {
        return Ok(None);
    }
    let text = read_text(&output)?;
    if text.trim().is_empty() {
        return Ok(None);
    }
    Ok(Some(text))
}

fn write_document(
    ctx: &RunContext,
    entry: &LabeledUnit,
    metadata: &BookMetadata,
    citation: Option<&CitationRecord>,
    body: &str,
) -> Result<()> {
    let mut document = document_header(entry, metadata, citation)?;
    document.push_str(body);
    fs::write(ctx.output_dir.join(&entry.output_file), document)?;
    Ok(())
}
