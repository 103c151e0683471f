use crate::epub_reader::Package;
use crate::error::Result;
use crate::report::Warnings;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use tracing::info;

/// Copy every manifest image into the flat asset directory.
///
/// Returns the number of images copied. Missing files and name collisions
/// are warnings.
pub fn copy_images(package: &Package, asset_dir: &Path, warnings: &mut Warnings) -> Result<usize> {
    let images = package.images();
    if images.is_empty() {
        return Ok(0);
    }

    fs::create_dir_all(asset_dir)?;

    let mut copied = BTreeSet::new();
    for item in images {
        let source = package.resolve(&item.href);
        if !source.is_file() {
            warnings.push(format!("image {} is missing from the package", item.href));
            continue;
        }

        let filename = item.file_name();
        if !copied.insert(filename.clone()) {
            warnings.push(format!(
                "image {} has the same name as an earlier image and replaces it",
                item.href
            ));
        }
        fs::copy(&source, asset_dir.join(&filename))?;
    }

    info!("copied {} images to {}", copied.len(), asset_dir.display());
    Ok(copied.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONTAINER: &str = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles><rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/></rootfiles>
</container>"#;

    const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <manifest>
    <item id="c1" href="Text/c1.xhtml" media-type="application/xhtml+xml"/>
    <item id="i1" href="Images/a/fig.png" media-type="image/png"/>
    <item id="i2" href="Images/b/fig.png" media-type="image/png"/>
    <item id="i3" href="Images/gone.jpg" media-type="image/jpeg"/>
  </manifest>
  <spine><itemref idref="c1"/></spine>
</package>"#;

    #[test]
    fn test_images_flattened_with_warnings() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("META-INF")).unwrap();
        fs::create_dir_all(root.join("OEBPS/Text")).unwrap();
        fs::create_dir_all(root.join("OEBPS/Images/a")).unwrap();
        fs::create_dir_all(root.join("OEBPS/Images/b")).unwrap();
        fs::write(root.join("META-INF/container.xml"), CONTAINER).unwrap();
        fs::write(root.join("OEBPS/content.opf"), OPF).unwrap();
        fs::write(root.join("OEBPS/Text/c1.xhtml"), "<html/>").unwrap();
        fs::write(root.join("OEBPS/Images/a/fig.png"), b"first").unwrap();
        fs::write(root.join("OEBPS/Images/b/fig.png"), b"second").unwrap();

        let package = Package::open(root).unwrap();
        let out = TempDir::new().unwrap();
        let assets = out.path().join("images");
        let mut warnings = Warnings::new();

        let copied = copy_images(&package, &assets, &mut warnings).unwrap();
        assert_eq!(copied, 1);
        assert_eq!(fs::read(assets.join("fig.png")).unwrap(), b"second");
        assert!(warnings.contains("Images/gone.jpg is missing"));
        assert!(warnings.contains("Images/b/fig.png has the same name"));
    }
}
