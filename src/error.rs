//! Error types for the conversion pipeline.
//!
//! Only structural problems with the package and converter failures are
//! errors. Anything that affects a single unit, or the quality of the
//! inferred structure, is recorded as a warning in the run report instead.

use std::path::PathBuf;

/// Type alias for Results with epub2notes errors.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Xml(#[from] quick_xml::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
    /// The package is not laid out the way an EPUB must be
    #[error(transparent)]
    PackageStructure(#[from] PackageStructureError),
    /// The external converter failed for one unit; the run cannot continue
    #[error("converter failed on {unit}: {detail}")]
    Converter { unit: String, detail: String },
    /// The citation database could not be read
    #[error("citation database: {0}")]
    Citation(String),
}

/// Fatal structural problems. Each names the artifact that is missing.
#[derive(thiserror::Error, Debug)]
pub enum PackageStructureError {
    #[error("no container descriptor at {0}")]
    MissingContainer(PathBuf),
    #[error("container descriptor {0} names no package document")]
    NoRootfile(PathBuf),
    #[error("package document {0} does not exist")]
    MissingPackageDocument(PathBuf),
    #[error("no content root with XHTML files under {0}")]
    MissingContentRoot(PathBuf),
    #[error("no navigation document found in {0}")]
    MissingNavigation(PathBuf),
}
