use crate::error::Result;
use std::fs::{self, File};
use std::path::Path;
use tracing::info;
use zip::ZipArchive;

/// Unpacks an EPUB archive into `dest`.
///
/// An entry whose name would escape `dest` fails the whole extraction.
pub fn unpack_epub(epub_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(epub_path)?;
    let mut archive = ZipArchive::new(file)?;

    fs::create_dir_all(dest)?;
    archive.extract(dest)?;

    info!(
        entries = archive.len(),
        "unpacked {} into {}",
        epub_path.display(),
        dest.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    #[test]
    fn test_unpack_writes_entries() {
        let dir = TempDir::new().unwrap();
        let epub = dir.path().join("book.epub");
        {
            let mut writer = zip::ZipWriter::new(File::create(&epub).unwrap());
            let options = SimpleFileOptions::default();
            writer.start_file("mimetype", options).unwrap();
            writer.write_all(b"application/epub+zip").unwrap();
            writer.start_file("META-INF/container.xml", options).unwrap();
            writer.write_all(b"<container/>").unwrap();
            writer.finish().unwrap();
        }

        let out = dir.path().join("out");
        unpack_epub(&epub, &out).unwrap();

        assert_eq!(
            fs::read_to_string(out.join("mimetype")).unwrap(),
            "application/epub+zip"
        );
        assert!(out.join("META-INF/container.xml").exists());
    }

    #[test]
    fn test_unpack_rejects_non_archive() {
        let dir = TempDir::new().unwrap();
        let bogus = dir.path().join("bogus.epub");
        fs::write(&bogus, b"not a zip").unwrap();
        assert!(unpack_epub(&bogus, &dir.path().join("out")).is_err());
    }
}
