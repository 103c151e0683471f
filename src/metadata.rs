//! Book-level metadata and the headers built from it.

use crate::citation::CitationRecord;
use crate::error::Result;
use crate::labels::LabeledUnit;
use crate::report::Warnings;
use rbook::prelude::*;
use rbook::Epub;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BookMetadata {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub publisher: Option<String>,
    pub language: Option<String>,
    pub description: Option<String>,
}

impl BookMetadata {
    /// Read metadata from an `.epub` file or unpacked package directory.
    /// A package rbook cannot open yields empty metadata and a warning.
    pub fn read(path: &Path, warnings: &mut Warnings) -> Self {
        match Epub::options().strict(false).open(path) {
            Ok(epub) => Self::from_epub(&epub),
            Err(err) => {
                warnings.push(format!(
                    "could not read book metadata from {}: {err}",
                    path.display()
                ));
                Self::default()
            }
        }
    }

    pub fn from_epub(epub: &Epub) -> Self {
        let metadata = epub.metadata();
        Self {
            title: metadata.title().map(|t| t.value().to_string()),
            authors: metadata
                .creators()
                .map(|creator| creator.value().to_string())
                .collect(),
            publisher: metadata.publishers().next().map(|p| p.value().to_string()),
            language: metadata.languages().next().map(|l| l.value().to_string()),
            description: metadata.descriptions().next().map(|d| d.value().to_string()),
        }
    }

    pub fn authors_line(&self) -> String {
        self.authors.join(", ")
    }
}

/// Markdown header for the contents index.
pub fn format_metadata(meta: &BookMetadata, citation: Option<&CitationRecord>) -> String {
    let mut lines = Vec::new();

    let title = citation
        .map(|c| c.title.clone())
        .or_else(|| meta.title.clone());
    if let Some(title) = title {
        lines.push(format!("# {}", title));
        lines.push(String::new());
    }

    if !meta.authors.is_empty() {
        lines.push(format!("**Author:** {}", meta.authors_line()));
    }

    if let Some(publisher) = &meta.publisher {
        lines.push(format!("**Publisher:** {}", publisher));
    }

    if let Some(language) = &meta.language {
        lines.push(format!("**Language:** {}", language));
    }

    if let Some(citation) = citation {
        lines.push(format!("**Citation:** [@{}]", citation.key));
    }

    if let Some(description) = &meta.description {
        lines.push(String::new());
        lines.push(format!("> {}", description.trim()));
    }

    if !lines.is_empty() {
        lines.push(String::new());
        lines.push("---".to_string());
        lines.push(String::new());
    }

    let result = lines.join("\n");
    if result.is_empty() {
        result
    } else {
        result + "\n"
    }
}

#[derive(Serialize)]
struct DocumentHeader<'a> {
    title: &'a str,
    label: &'a str,
    source: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    book: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    citekey: Option<&'a str>,
}

/// YAML front matter opening every emitted document.
pub fn document_header(
    entry: &LabeledUnit,
    meta: &BookMetadata,
    citation: Option<&CitationRecord>,
) -> Result<String> {
    let header = DocumentHeader {
        title: &entry.unit.title,
        label: &entry.label,
        source: &entry.unit.file_name,
        book: meta.title.as_deref(),
        citekey: citation.map(|c| c.key.as_str()),
    };
    Ok(format!("---\n{}---\n\n", serde_yaml::to_string(&header)?))
}
