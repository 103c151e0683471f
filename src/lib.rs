//! Convert EPUB packages into a linked set of normalized Markdown notes.
//!
//! The library infers a front matter / chapter / back matter structure from
//! the package, gives every content unit a sortable label and file name,
//! and repairs what a generic HTML-to-Markdown converter gets wrong.

pub mod archive;
pub mod backend;
pub mod citation;
pub mod classifier;
pub mod contents;
pub mod context;
pub mod converter;
pub mod epub_reader;
pub mod error;
pub mod image;
pub mod labels;
pub mod markdown;
pub mod metadata;
pub mod navigation;
pub mod prepass;
pub mod report;
pub mod rules;
pub mod structure;

pub use backend::{Html2Md, MarkupConverter, Pandoc};
pub use citation::{CitationLookup, CitationRecord, JsonCitations, NoCitations};
pub use classifier::{Classification, ContentUnit};
pub use context::RunContext;
pub use converter::{convert, convert_package, ConvertOptions};
pub use error::{Error, PackageStructureError, Result};
pub use labels::{CrossReferenceMap, LabeledUnit};
pub use report::{RunReport, Warnings};
pub use structure::{ChapterGroup, DocumentStructure};
