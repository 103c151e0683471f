//! Navigation document parsing.
//!
//! Produces a flat, document-ordered list of entries with their nesting
//! depth. EPUB 3 navigation documents are preferred; an EPUB 2 NCX is read
//! when that is all the package has.

use crate::epub_reader::{
    attr, attr_local, file_name_of, is_content_file, local_name, read_text, resolve_entity,
    split_href, Package,
};
use crate::error::{PackageStructureError, Result};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::path::PathBuf;
use tracing::debug;

/// File names tried when the manifest declares no navigation at all.
const CONVENTIONAL_NAV_FILES: &[&str] = &["nav.xhtml", "toc.xhtml"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationEntry {
    /// Bare file name of the target content unit
    pub target_file: String,
    pub anchor: Option<String>,
    pub label: String,
    /// Nesting level, starting at 1
    pub depth: usize,
}

#[derive(Debug, Default)]
pub struct Navigation {
    /// The document the entries were read from
    pub source: PathBuf,
    pub entries: Vec<NavigationEntry>,
}

impl Navigation {
    /// Label of the first entry pointing at `file`.
    pub fn label_for(&self, file: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.target_file == file)
            .map(|e| e.label.as_str())
    }

    /// Target files in first-mention order, each once.
    pub fn files_in_order(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&entry.target_file) {
                seen.push(entry.target_file.clone());
            }
        }
        seen
    }
}

/// Locate and parse the package's navigation data.
pub fn load_navigation(package: &Package) -> Result<Navigation> {
    if let Some(item) = package.nav_item() {
        let source = package.resolve(&item.href);
        if source.is_file() {
            let entries = parse_nav_document(&read_text(&source)?);
            return Ok(Navigation { source, entries });
        }
    }

    if let Some(item) = package.ncx_item() {
        let source = package.resolve(&item.href);
        if source.is_file() {
            let entries = parse_ncx(&read_text(&source)?);
            return Ok(Navigation { source, entries });
        }
    }

    for name in CONVENTIONAL_NAV_FILES {
        let source = package.content_root.join(name);
        if source.is_file() {
            let entries = parse_nav_document(&read_text(&source)?);
            return Ok(Navigation { source, entries });
        }
    }

    Err(PackageStructureError::MissingNavigation(package.root.clone()).into())
}

struct NavList {
    is_toc: bool,
    entries: Vec<NavigationEntry>,
}

/// Parse an XHTML navigation document.
///
/// Links nested in `<nav>` ordered lists carry the list depth. When no such
/// list exists, every content link in the document is returned at depth 1.
/// A `<nav epub:type="toc">` wins over any other `<nav>`.
pub fn parse_nav_document(content: &str) -> Vec<NavigationEntry> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().check_end_names = false;

    let mut navs: Vec<NavList> = Vec::new();
    let mut flat: Vec<NavigationEntry> = Vec::new();
    let mut in_nav = false;
    let mut ol_depth = 0usize;
    let mut link: Option<(String, String)> = None;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                debug!("navigation document stopped parsing early: {e}");
                break;
            }
        };
        match event {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"nav" => {
                    let is_toc = attr_local(&e, b"type")
                        .is_some_and(|t| t.split_ascii_whitespace().any(|t| t == "toc"));
                    navs.push(NavList {
                        is_toc,
                        entries: Vec::new(),
                    });
                    in_nav = true;
                    ol_depth = 0;
                }
                b"ol" | b"ul" if in_nav => ol_depth += 1,
                b"a" => link = attr(&e, b"href").map(|href| (href, String::new())),
                _ => {}
            },
            Event::Text(e) => {
                if let Some((_, text)) = link.as_mut() {
                    text.push_str(&String::from_utf8_lossy(e.as_ref()));
                }
            }
            Event::GeneralRef(e) => {
                if let Some((_, text)) = link.as_mut() {
                    if let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref())) {
                        text.push_str(&resolved);
                    }
                }
            }
            Event::End(e) => match local_name(e.name().as_ref()) {
                b"nav" => in_nav = false,
                b"ol" | b"ul" if in_nav => ol_depth = ol_depth.saturating_sub(1),
                b"a" => {
                    let Some((href, text)) = link.take() else {
                        continue;
                    };
                    let Some(entry) = make_entry(&href, &text, 1) else {
                        continue;
                    };
                    if in_nav && ol_depth > 0 {
                        if let Some(nav) = navs.last_mut() {
                            nav.entries.push(NavigationEntry {
                                depth: ol_depth,
                                ..entry.clone()
                            });
                        }
                    }
                    flat.push(entry);
                }
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    let chosen = navs
        .iter()
        .position(|nav| nav.is_toc && !nav.entries.is_empty())
        .or_else(|| navs.iter().position(|nav| !nav.entries.is_empty()));

    match chosen {
        Some(index) => navs.swap_remove(index).entries,
        None => flat,
    }
}

/// Parse an EPUB 2 NCX; `navPoint` nesting gives the depth.
pub fn parse_ncx(content: &str) -> Vec<NavigationEntry> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut depth = 0usize;
    let mut label = String::new();
    let mut in_text = false;

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            Err(e) => {
                debug!("NCX stopped parsing early: {e}");
                break;
            }
        };
        match event {
            Event::Start(e) => match local_name(e.name().as_ref()) {
                b"navPoint" => {
                    depth += 1;
                    label.clear();
                }
                b"text" => in_text = true,
                _ => {}
            },
            Event::Empty(e) if local_name(e.name().as_ref()) == b"content" && depth > 0 => {
                if let Some(entry) = attr(&e, b"src").and_then(|src| make_entry(&src, &label, depth)) {
                    entries.push(entry);
                }
            }
            Event::Text(e) if in_text => label.push_str(&String::from_utf8_lossy(e.as_ref())),
            Event::GeneralRef(e) if in_text => {
                if let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref())) {
                    label.push_str(&resolved);
                }
            }
            Event::End(e) => match local_name(e.name().as_ref()) {
                b"navPoint" => depth = depth.saturating_sub(1),
                b"text" => in_text = false,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    entries
}

fn make_entry(href: &str, label: &str, depth: usize) -> Option<NavigationEntry> {
    if !is_content_file(href) {
        return None;
    }
    let (_, anchor) = split_href(href);
    Some(NavigationEntry {
        target_file: file_name_of(href),
        anchor,
        label: collapse_whitespace(label),
        depth,
    })
}

pub(crate) fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const NAV: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<body>
  <nav epub:type="landmarks"><ol><li><a href="cover.xhtml">Cover</a></li></ol></nav>
  <nav epub:type="toc" id="toc">
    <h1>Contents</h1>
    <ol>
      <li><a href="Text/front.xhtml">Preface</a></li>
      <li><a href="Text/ch01.xhtml">Chapter&#160;1 Origins</a>
        <ol>
          <li><a href="Text/ch01.xhtml#sec1">1.1   First
             steps</a></li>
          <li><a href="Text/ch01b.xhtml">1.2 More</a></li>
        </ol>
      </li>
      <li><a href="http://example.com/">External</a></li>
      <li><a href="Text/refs.xhtml">References &amp; Notes</a></li>
    </ol>
  </nav>
</body>
</html>"#;

    #[test]
    fn test_nested_nav_depths_and_order() {
        let entries = parse_nav_document(NAV);
        let summary: Vec<_> = entries
            .iter()
            .map(|e| (e.target_file.as_str(), e.anchor.as_deref(), e.depth))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("front.xhtml", None, 1),
                ("ch01.xhtml", None, 1),
                ("ch01.xhtml", Some("sec1"), 2),
                ("ch01b.xhtml", None, 2),
                ("refs.xhtml", None, 1),
            ]
        );
        assert_eq!(entries[1].label, "Chapter 1 Origins");
        assert_eq!(entries[2].label, "1.1 First steps");
        assert_eq!(entries[4].label, "References & Notes");
    }

    #[test]
    fn test_flat_fallback_without_nested_list() {
        let html = r#"<html><body>
            <p><a href="a.xhtml">A</a> and <a href="b.html#x">B</a></p>
            <a href="style.css">not content</a>
        </body></html>"#;
        let entries = parse_nav_document(html);
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.depth == 1));
        assert_eq!(entries[1].anchor.as_deref(), Some("x"));
    }

    #[test]
    fn test_ncx_depths() {
        let ncx = r#"<?xml version="1.0"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <navMap>
    <navPoint id="p1" playOrder="1">
      <navLabel><text>Part I</text></navLabel>
      <content src="part1.xhtml"/>
      <navPoint id="c1" playOrder="2">
        <navLabel><text>Chapter 1</text></navLabel>
        <content src="ch1.xhtml#start"/>
      </navPoint>
    </navPoint>
    <navPoint id="c2" playOrder="3">
      <navLabel><text>Chapter 2</text></navLabel>
      <content src="ch2.xhtml"/>
    </navPoint>
  </navMap>
</ncx>"#;
        let entries = parse_ncx(ncx);
        let summary: Vec<_> = entries
            .iter()
            .map(|e| (e.label.as_str(), e.target_file.as_str(), e.depth))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("Part I", "part1.xhtml", 1),
                ("Chapter 1", "ch1.xhtml", 2),
                ("Chapter 2", "ch2.xhtml", 1),
            ]
        );
    }

    #[test]
    fn test_files_in_order_dedups() {
        let nav = Navigation {
            source: PathBuf::new(),
            entries: parse_nav_document(NAV),
        };
        assert_eq!(
            nav.files_in_order(),
            vec!["front.xhtml", "ch01.xhtml", "ch01b.xhtml", "refs.xhtml"]
        );
        assert_eq!(nav.label_for("ch01.xhtml"), Some("Chapter 1 Origins"));
    }
}
