//! Generic markup-to-text converters.
//!
//! The pipeline hands each pre-processed unit to one of these and reads the
//! text back from the destination path. A converter that fails aborts the
//! run; one that succeeds but writes nothing is handled by the caller.

use crate::epub_reader::read_text;
use crate::error::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::debug;

pub trait MarkupConverter {
    /// Short name for logs and the run report.
    fn name(&self) -> &str;

    /// Convert the markup file at `input`, writing text to `output`.
    fn convert(&self, input: &Path, output: &Path) -> Result<()>;
}

/// In-process conversion with `fast_html2md`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Html2Md;

impl MarkupConverter for Html2Md {
    fn name(&self) -> &str {
        "html2md"
    }

    fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        let html = read_text(input)?;
        let md = html2md::parse_html(&html, false);
        fs::write(output, md)?;
        Ok(())
    }
}

/// Conversion through a `pandoc` executable.
#[derive(Debug, Clone)]
pub struct Pandoc {
    program: PathBuf,
}

impl Pandoc {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl MarkupConverter for Pandoc {
    fn name(&self) -> &str {
        "pandoc"
    }

    fn convert(&self, input: &Path, output: &Path) -> Result<()> {
        let unit = unit_name(input);
        debug!(unit = %unit, "running {}", self.program.display());

        let result = Command::new(&self.program)
            .arg(input)
            .args(["-f", "html", "-t", "markdown", "--wrap=none", "-o"])
            .arg(output)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| Error::Converter {
                unit: unit.clone(),
                detail: format!("failed to run {}: {e}", self.program.display()),
            })?;

        if !result.status.success() {
            return Err(Error::Converter {
                unit,
                detail: format!(
                    "{} exited with {}: {}",
                    self.program.display(),
                    result.status,
                    String::from_utf8_lossy(&result.stderr).trim()
                ),
            });
        }
        Ok(())
    }
}

fn unit_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
