//! Package reading: container descriptor, package document (manifest and
//! spine), and the content root the units live under.

use crate::error::{PackageStructureError, Result};
use percent_encoding::percent_decode_str;
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Extensions a content unit may have.
pub const CONTENT_EXTENSIONS: &[&str] = &["xhtml", "html", "htm"];

/// Conventional places a package keeps its content files, relative to the
/// package root. The package document's own directory is tried first.
const CONTENT_ROOT_CANDIDATES: &[&str] = &[
    "OEBPS",
    "OPS",
    "EPUB",
    "OEBPS/Text",
    "OEBPS/text",
    "OEBPS/xhtml",
    "OPS/xhtml",
    "EPUB/xhtml",
    "EPUB/text",
    "Text",
    "xhtml",
    "",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestItem {
    pub id: String,
    /// Percent-decoded href, relative to the package document
    pub href: String,
    pub media_type: String,
    pub properties: Option<String>,
}

impl ManifestItem {
    pub fn is_content(&self) -> bool {
        matches!(
            self.media_type.as_str(),
            "application/xhtml+xml" | "text/html"
        ) || is_content_file(&self.href)
    }

    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }

    pub fn is_nav(&self) -> bool {
        self.has_property("nav")
    }

    pub fn is_ncx(&self) -> bool {
        self.media_type == "application/x-dtbncx+xml"
    }

    fn has_property(&self, name: &str) -> bool {
        self.properties
            .as_deref()
            .is_some_and(|props| props.split_ascii_whitespace().any(|p| p == name))
    }

    /// The bare file name, used as the unit's key everywhere downstream.
    pub fn file_name(&self) -> String {
        file_name_of(&self.href)
    }
}

/// Raw result of parsing the package document.
#[derive(Debug, Default)]
pub struct OpfData {
    /// Manifest items in document order
    pub manifest: Vec<ManifestItem>,
    /// Spine `idref`s in reading order
    pub spine: Vec<String>,
    /// `toc` attribute of the spine (EPUB 2 NCX reference)
    pub toc_id: Option<String>,
}

/// An unpacked package, ready to be read unit by unit.
#[derive(Debug)]
pub struct Package {
    pub root: PathBuf,
    pub opf_path: PathBuf,
    pub opf_dir: PathBuf,
    pub content_root: PathBuf,
    manifest: BTreeMap<String, ManifestItem>,
    manifest_order: Vec<String>,
    pub spine: Vec<String>,
    toc_id: Option<String>,
}

impl Package {
    /// Reads the container descriptor and package document under `root`.
    pub fn open(root: &Path) -> Result<Self> {
        let container = root.join("META-INF").join("container.xml");
        if !container.is_file() {
            return Err(PackageStructureError::MissingContainer(container).into());
        }

        let opf_rel = parse_container_xml(&fs::read(&container)?)?
            .ok_or_else(|| PackageStructureError::NoRootfile(container.clone()))?;
        let opf_path = root.join(&opf_rel);
        if !opf_path.is_file() {
            return Err(PackageStructureError::MissingPackageDocument(opf_path).into());
        }
        let opf_dir = opf_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| root.to_path_buf());

        let opf = parse_opf(&read_text(&opf_path)?)?;
        let content_root = find_content_root(root, &opf_dir)
            .ok_or_else(|| PackageStructureError::MissingContentRoot(root.to_path_buf()))?;

        debug!(
            manifest = opf.manifest.len(),
            spine = opf.spine.len(),
            "package document {} (content root {})",
            opf_path.display(),
            content_root.display()
        );

        let manifest_order = opf.manifest.iter().map(|item| item.id.clone()).collect();
        let manifest = opf
            .manifest
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();

        Ok(Self {
            root: root.to_path_buf(),
            opf_path,
            opf_dir,
            content_root,
            manifest,
            manifest_order,
            spine: opf.spine,
            toc_id: opf.toc_id,
        })
    }

    /// Manifest items in the order the package document declares them.
    pub fn manifest_items(&self) -> impl Iterator<Item = &ManifestItem> {
        self.manifest_order
            .iter()
            .filter_map(|id| self.manifest.get(id))
    }

    /// Spine items that resolve to content documents, in reading order.
    pub fn spine_items(&self) -> Vec<&ManifestItem> {
        self.spine
            .iter()
            .filter_map(|idref| self.manifest.get(idref))
            .filter(|item| item.is_content())
            .collect()
    }

    pub fn images(&self) -> Vec<&ManifestItem> {
        self.manifest_items().filter(|item| item.is_image()).collect()
    }

    /// The EPUB 3 navigation document, if declared.
    pub fn nav_item(&self) -> Option<&ManifestItem> {
        self.manifest_items().find(|item| item.is_nav())
    }

    /// The EPUB 2 NCX, either named by the spine or found by media type.
    pub fn ncx_item(&self) -> Option<&ManifestItem> {
        self.toc_id
            .as_deref()
            .and_then(|id| self.manifest.get(id))
            .or_else(|| self.manifest_items().find(|item| item.is_ncx()))
    }

    /// Where a manifest href lives on disk.
    ///
    /// Hrefs are relative to the package document; packages that get that
    /// wrong usually still keep the file directly under the content root.
    pub fn resolve(&self, href: &str) -> PathBuf {
        let direct = self.opf_dir.join(href);
        if direct.exists() {
            return direct;
        }
        self.content_root.join(file_name_of(href))
    }
}

/// Parse META-INF/container.xml and return the package document path.
pub fn parse_container_xml(bytes: &[u8]) -> Result<Option<String>> {
    let content = String::from_utf8_lossy(strip_bom(bytes));
    let mut reader = Reader::from_str(&content);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) if local_name(e.name().as_ref()) == b"rootfile" => {
                if let Some(path) = attr(&e, b"full-path") {
                    return Ok(Some(path));
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

/// Parse the package document into manifest and spine.
pub fn parse_opf(content: &str) -> Result<OpfData> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut opf = OpfData::default();

    loop {
        match reader.read_event()? {
            Event::Empty(e) | Event::Start(e) => match local_name(e.name().as_ref()) {
                b"item" => {
                    let (Some(id), Some(href)) = (attr(&e, b"id"), attr(&e, b"href")) else {
                        continue;
                    };
                    opf.manifest.push(ManifestItem {
                        id,
                        href: decode_href(&href),
                        media_type: attr(&e, b"media-type").unwrap_or_default(),
                        properties: attr(&e, b"properties"),
                    });
                }
                b"itemref" => {
                    if let Some(idref) = attr(&e, b"idref") {
                        opf.spine.push(idref);
                    }
                }
                b"spine" => opf.toc_id = attr(&e, b"toc"),
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(opf)
}

/// First conventional directory that directly holds content files.
pub fn find_content_root(root: &Path, opf_dir: &Path) -> Option<PathBuf> {
    std::iter::once(opf_dir.to_path_buf())
        .chain(
            CONTENT_ROOT_CANDIDATES
                .iter()
                .map(|sub| if sub.is_empty() { root.to_path_buf() } else { root.join(sub) }),
        )
        .find(|dir| holds_content_files(dir))
}

fn holds_content_files(dir: &Path) -> bool {
    let Ok(entries) = fs::read_dir(dir) else {
        return false;
    };
    entries
        .flatten()
        .any(|entry| entry.path().is_file() && is_content_file(&entry.file_name().to_string_lossy()))
}

pub fn is_content_file(href: &str) -> bool {
    let (file, _) = split_href(href);
    Path::new(&file)
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|ext| CONTENT_EXTENSIONS.contains(&ext.as_str()))
}

/// Splits `dir/file.xhtml#anchor` into the decoded file part and the anchor.
pub fn split_href(href: &str) -> (String, Option<String>) {
    match href.split_once('#') {
        Some((file, anchor)) => {
            let anchor = (!anchor.is_empty()).then(|| decode_href(anchor));
            (decode_href(file), anchor)
        }
        None => (decode_href(href), None),
    }
}

/// Bare file name of an href, without directories or fragment.
pub fn file_name_of(href: &str) -> String {
    let (file, _) = split_href(href);
    file.rsplit(['/', '\\']).next().unwrap_or_default().to_string()
}

pub fn decode_href(href: &str) -> String {
    percent_decode_str(href).decode_utf8_lossy().into_owned()
}

/// Reads a text file, tolerating a BOM and invalid UTF-8.
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(String::from_utf8_lossy(strip_bom(&bytes)).into_owned())
}

// ----------------------------------------------------------------------------
// XML helpers shared by the navigation parser and the classifier
// ----------------------------------------------------------------------------

/// Strip UTF-8 BOM if present.
pub(crate) fn strip_bom(data: &[u8]) -> &[u8] {
    data.strip_prefix(&[0xEFu8, 0xBB, 0xBF][..]).unwrap_or(data)
}

/// Extract local name from namespaced XML name (e.g., "dc:title" -> "title").
pub(crate) fn local_name(name: &[u8]) -> &[u8] {
    name.iter()
        .rposition(|&b| b == b':')
        .map(|i| &name[i + 1..])
        .unwrap_or(name)
}

/// Attribute value by qualified name, with entities resolved.
pub(crate) fn attr(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .map(|a| attr_value(&a))
}

/// Attribute value by local name, ignoring any namespace prefix.
pub(crate) fn attr_local(e: &BytesStart, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| local_name(a.key.as_ref()) == name)
        .map(|a| attr_value(&a))
}

/// Unescaped value; one that does not unescape cleanly is kept raw.
fn attr_value(a: &Attribute) -> String {
    a.unescape_value_with(named_entity)
        .map(|value| value.into_owned())
        .unwrap_or_else(|_| String::from_utf8_lossy(&a.value).into_owned())
}

/// XML and common HTML named entities.
fn named_entity(entity: &str) -> Option<&'static str> {
    let resolved = match entity {
        "apos" => "'",
        "quot" => "\"",
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "nbsp" => " ",
        "mdash" => "\u{2014}",
        "ndash" => "\u{2013}",
        "hellip" => "\u{2026}",
        "lsquo" => "\u{2018}",
        "rsquo" => "\u{2019}",
        "ldquo" => "\u{201C}",
        "rdquo" => "\u{201D}",
        _ => return None,
    };
    Some(resolved)
}

/// Resolve a named or numeric entity reference from a text event.
pub(crate) fn resolve_entity(entity: &str) -> Option<String> {
    if let Some(named) = named_entity(entity) {
        return Some(named.to_string());
    }

    let code = if let Some(hex) = entity.strip_prefix("#x").or_else(|| entity.strip_prefix("#X")) {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(dec) = entity.strip_prefix('#') {
        dec.parse::<u32>().ok()
    } else {
        None
    };
    code.and_then(char::from_u32).map(|c| c.to_string())
}
