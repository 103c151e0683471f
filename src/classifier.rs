//! Content unit classification.
//!
//! One parse pass over a unit's markup collects its markers (body type,
//! identifiers, heading text). A prioritized list of rules then turns the
//! markers into a [`Classification`]; the first rule that matches wins.

use crate::epub_reader::{attr, attr_local, local_name, resolve_entity};
use crate::navigation::collapse_whitespace;
use lazy_static::lazy_static;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

const FRONT_ID_PREFIXES: &[&str] = &[
    "frontmatter_",
    "page_",
    "preface",
    "acknowledg",
    "introduction",
    "foreword",
    "dedication",
    "titlepage",
    "copyright",
];

const FRONT_TITLES: &[&str] = &[
    "contents",
    "table of contents",
    "acknowledgements",
    "acknowledgments",
    "about the authors",
    "about the author",
    "introduction",
    "preface",
    "foreword",
];

const CHAPTER_ID_PREFIXES: &[&str] = &["chapter", "ch", "sec"];

const BACK_KEYWORDS: &[&str] = &[
    "references",
    "index",
    "glossary",
    "bibliography",
    "conclusion",
    "appendix",
    "afterword",
    "endnotes",
    "colophon",
];

lazy_static! {
    static ref CHAPTER_IN_TITLE: Regex =
        Regex::new(r"(?i)\bchapter\s+(\d+|[ivxlc]+\b)").unwrap();
    static ref LEVEL_ID: Regex = Regex::new(r"(?i)^level(\d+)?(?:_(\d+))?").unwrap();
    static ref FIRST_NUMBER: Regex = Regex::new(r"\d+").unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Classification {
    Frontmatter,
    Chapter {
        number: Option<u32>,
    },
    /// A subsection anchored inside its parent chapter's file
    Level {
        level: Option<u32>,
        subsection: Option<u32>,
    },
    Backmatter,
    Unclassified,
}

impl Classification {
    pub fn name(&self) -> &'static str {
        match self {
            Classification::Frontmatter => "frontmatter",
            Classification::Chapter { .. } => "chapter",
            Classification::Level { .. } => "level",
            Classification::Backmatter => "backmatter",
            Classification::Unclassified => "unclassified",
        }
    }
}

/// What a single parse pass finds in a unit's markup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitMarkers {
    /// `epub:type` of the body, or of the first section when the body has none
    pub body_type: Option<String>,
    /// Identifier of the outermost structural element
    pub primary_id: Option<String>,
    /// Every `id` in the body, in document order
    pub ids: Vec<String>,
    /// First heading text, falling back to the document `<title>`
    pub title: Option<String>,
}

/// A named classification rule.
pub struct Rule {
    pub name: &'static str,
    pub apply: fn(&UnitMarkers) -> Option<Classification>,
}

/// Classification rules in priority order.
pub const RULES: &[Rule] = &[
    Rule {
        name: "frontmatter",
        apply: frontmatter_rule,
    },
    Rule {
        name: "chapter",
        apply: chapter_rule,
    },
    Rule {
        name: "level",
        apply: level_rule,
    },
    Rule {
        name: "backmatter",
        apply: backmatter_rule,
    },
];

/// Run the rules in order; `None` for the rule name means nothing matched.
pub fn classify(markers: &UnitMarkers) -> (Classification, Option<&'static str>) {
    RULES
        .iter()
        .find_map(|rule| (rule.apply)(markers).map(|c| (c, Some(rule.name))))
        .unwrap_or((Classification::Unclassified, None))
}

fn has_type_token(m: &UnitMarkers, token: &str) -> bool {
    m.body_type
        .as_deref()
        .is_some_and(|t| t.split_ascii_whitespace().any(|t| t == token))
}

fn frontmatter_rule(m: &UnitMarkers) -> Option<Classification> {
    let marker = has_type_token(m, "frontmatter");
    let id = id_lower(m).is_some_and(|id| FRONT_ID_PREFIXES.iter().any(|p| id.starts_with(p)));
    let title = title_lower(m).is_some_and(|t| FRONT_TITLES.contains(&t.as_str()));
    (marker || id || title).then_some(Classification::Frontmatter)
}

fn chapter_rule(m: &UnitMarkers) -> Option<Classification> {
    let by_marker = has_type_token(m, "chapter");
    let by_id = id_lower(m).is_some_and(|id| CHAPTER_ID_PREFIXES.iter().any(|p| id.starts_with(p)));
    let by_title = title_lower(m).is_some_and(|t| t.contains("chapter"));
    if !by_marker && !by_id && !by_title {
        return None;
    }

    let number = m
        .primary_id
        .as_deref()
        .and_then(first_number)
        .or_else(|| m.title.as_deref().and_then(chapter_number_in_title));
    Some(Classification::Chapter { number })
}

fn level_rule(m: &UnitMarkers) -> Option<Classification> {
    let caps = LEVEL_ID.captures(m.primary_id.as_deref()?)?;
    let number = |i: usize| caps.get(i).and_then(|n| n.as_str().parse().ok());
    Some(Classification::Level {
        level: number(1),
        subsection: number(2),
    })
}

fn backmatter_rule(m: &UnitMarkers) -> Option<Classification> {
    let marker = has_type_token(m, "backmatter");
    let id = id_lower(m).is_some_and(|id| BACK_KEYWORDS.iter().any(|k| id.starts_with(k)));
    let title = title_lower(m).is_some_and(|t| {
        BACK_KEYWORDS.iter().any(|k| {
            t == *k
                || t.strip_prefix(k)
                    .and_then(|rest| rest.chars().next())
                    .is_some_and(|c| !c.is_alphanumeric())
        })
    });
    (marker || id || title).then_some(Classification::Backmatter)
}

fn id_lower(m: &UnitMarkers) -> Option<String> {
    m.primary_id.as_deref().map(str::to_lowercase)
}

fn title_lower(m: &UnitMarkers) -> Option<String> {
    m.title.as_deref().map(|t| t.trim().to_lowercase())
}

/// First run of digits in `s`.
pub fn first_number(s: &str) -> Option<u32> {
    FIRST_NUMBER.find(s).and_then(|m| m.as_str().parse().ok())
}

fn chapter_number_in_title(title: &str) -> Option<u32> {
    let found = CHAPTER_IN_TITLE.captures(title)?.get(1)?.as_str();
    found.parse().ok().or_else(|| roman_value(found))
}

fn roman_value(s: &str) -> Option<u32> {
    let digit = |c: char| match c.to_ascii_lowercase() {
        'i' => Some(1),
        'v' => Some(5),
        'x' => Some(10),
        'l' => Some(50),
        'c' => Some(100),
        _ => None,
    };
    let values: Vec<u32> = s.chars().map(digit).collect::<Option<_>>()?;
    let mut total = 0;
    for (i, v) in values.iter().enumerate() {
        if values.get(i + 1).is_some_and(|next| next > v) {
            total -= *v as i64;
        } else {
            total += *v as i64;
        }
    }
    u32::try_from(total).ok().filter(|n| *n > 0)
}

/// Rank of an element as the carrier of a unit's primary identifier.
fn id_rank(name: &[u8]) -> u8 {
    match name {
        b"section" => 0,
        b"body" | b"article" | b"div" => 1,
        b"h1" | b"h2" | b"h3" | b"h4" | b"h5" | b"h6" => 2,
        _ => 3,
    }
}

fn is_heading(name: &[u8]) -> bool {
    matches!(name, b"h1" | b"h2" | b"h3" | b"h4" | b"h5" | b"h6")
}

#[derive(Default)]
struct Scan {
    markers: UnitMarkers,
    in_body: bool,
    best_rank: Option<u8>,
    section_type: Option<String>,
    doc_title: String,
    in_doc_title: bool,
    heading: Option<(Vec<u8>, String)>,
    heading_done: bool,
}

impl Scan {
    fn open(&mut self, e: &BytesStart, empty: bool) {
        let qname = e.name();
        let name = local_name(qname.as_ref());

        if name == b"body" {
            self.in_body = true;
            self.markers.body_type = attr_local(e, b"type");
        }
        if !self.in_body {
            self.in_doc_title = name == b"title" && !empty;
            return;
        }

        if name == b"section" && self.section_type.is_none() {
            self.section_type = attr_local(e, b"type");
        }
        if let Some(id) = attr(e, b"id") {
            let rank = id_rank(name);
            if self.best_rank.map_or(true, |best| rank < best) {
                self.best_rank = Some(rank);
                self.markers.primary_id = Some(id.clone());
            }
            self.markers.ids.push(id);
        }

        match &mut self.heading {
            Some((_, text)) if name == b"br" => text.push(' '),
            None if !empty && !self.heading_done && is_heading(name) => {
                self.heading = Some((name.to_vec(), String::new()));
            }
            _ => {}
        }
    }

    fn close(&mut self, name: &[u8]) {
        if name == b"title" {
            self.in_doc_title = false;
        }
        if let Some((tag, text)) = &self.heading {
            if tag.as_slice() == name {
                let text = collapse_whitespace(text);
                self.heading = None;
                if !text.is_empty() {
                    self.markers.title = Some(text);
                    self.heading_done = true;
                }
            }
        }
    }

    fn text(&mut self, s: &str) {
        if let Some((_, text)) = self.heading.as_mut() {
            text.push_str(s);
        } else if self.in_doc_title {
            self.doc_title.push_str(s);
        }
    }

    fn finish(mut self) -> UnitMarkers {
        if self.markers.body_type.is_none() {
            self.markers.body_type = self.section_type;
        }
        if self.markers.title.is_none() {
            let title = collapse_whitespace(&self.doc_title);
            self.markers.title = (!title.is_empty()).then_some(title);
        }
        self.markers
    }
}

/// Collect classification markers from a unit's markup.
///
/// Malformed markup ends the scan early; whatever was found up to that
/// point is used.
pub fn scan_markup(markup: &str) -> UnitMarkers {
    let mut reader = Reader::from_str(markup);
    reader.config_mut().check_end_names = false;
    let mut scan = Scan::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => scan.open(&e, false),
            Ok(Event::Empty(e)) => scan.open(&e, true),
            Ok(Event::End(e)) => scan.close(local_name(e.name().as_ref())),
            Ok(Event::Text(e)) => scan.text(&String::from_utf8_lossy(e.as_ref())),
            Ok(Event::GeneralRef(e)) => {
                if let Some(resolved) = resolve_entity(&String::from_utf8_lossy(e.as_ref())) {
                    scan.text(&resolved);
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("markup scan stopped early: {e}");
                break;
            }
        }
    }

    scan.finish()
}

/// Title-case each word: first letter upper, the rest lower.
pub fn title_case(s: &str) -> String {
    s.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

/// One addressable content file and what the classifier made of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContentUnit {
    /// Manifest id
    pub id: String,
    /// Bare file name; the unit's key in the cross-reference map
    pub file_name: String,
    #[serde(skip)]
    pub path: PathBuf,
    pub title: String,
    pub body_type: Option<String>,
    pub primary_id: Option<String>,
    pub ids: Vec<String>,
    pub classification: Classification,
}

impl ContentUnit {
    /// Classify one unit from its markup.
    ///
    /// The title is the unit's own heading or `<title>`, else the navigation
    /// label, else the file stem.
    pub fn from_markup(
        id: &str,
        file_name: &str,
        path: &Path,
        markup: &str,
        nav_label: Option<&str>,
    ) -> Self {
        let markers = scan_markup(markup);
        let (classification, rule) = classify(&markers);
        debug!(
            file = file_name,
            rule = rule.unwrap_or("none"),
            "classified as {}",
            classification.name()
        );

        let raw_title = markers
            .title
            .clone()
            .or_else(|| nav_label.filter(|l| !l.trim().is_empty()).map(str::to_string))
            .unwrap_or_else(|| {
                Path::new(file_name)
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default()
            });

        Self {
            id: id.to_string(),
            file_name: file_name.to_string(),
            path: path.to_path_buf(),
            title: title_case(&raw_title),
            body_type: markers.body_type,
            primary_id: markers.primary_id,
            ids: markers.ids,
            classification,
        }
    }

    pub fn chapter_number(&self) -> Option<u32> {
        match self.classification {
            Classification::Chapter { number } => number,
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn markers(id: Option<&str>, title: Option<&str>, body_type: Option<&str>) -> UnitMarkers {
        UnitMarkers {
            body_type: body_type.map(str::to_string),
            primary_id: id.map(str::to_string),
            ids: id.map(|i| vec![i.to_string()]).unwrap_or_default(),
            title: title.map(str::to_string),
        }
    }

    fn class_of(id: Option<&str>, title: Option<&str>, body_type: Option<&str>) -> Classification {
        classify(&markers(id, title, body_type)).0
    }

    #[test]
    fn test_frontmatter_signals() {
        assert_eq!(class_of(None, None, Some("frontmatter")), Classification::Frontmatter);
        assert_eq!(class_of(Some("frontmatter_001"), None, None), Classification::Frontmatter);
        assert_eq!(class_of(Some("page_xiv"), None, None), Classification::Frontmatter);
        assert_eq!(class_of(Some("Preface1"), None, None), Classification::Frontmatter);
        assert_eq!(class_of(None, Some(" Contents "), None), Classification::Frontmatter);
        assert_eq!(
            class_of(None, Some("About the Authors"), None),
            Classification::Frontmatter
        );
    }

    #[test]
    fn test_frontmatter_outranks_chapter() {
        // Both rules would match; the first one in priority order wins
        let (class, rule) = classify(&markers(Some("ch00"), Some("Introduction"), None));
        assert_eq!(class, Classification::Frontmatter);
        assert_eq!(rule, Some("frontmatter"));
    }

    #[test]
    fn test_chapter_number_extraction() {
        assert_eq!(
            class_of(Some("ch07"), Some("Storms"), None),
            Classification::Chapter { number: Some(7) }
        );
        assert_eq!(
            class_of(Some("Sec12"), None, None),
            Classification::Chapter { number: Some(12) }
        );
        assert_eq!(
            class_of(None, Some("CHAPTER 3 The Voyage"), None),
            Classification::Chapter { number: Some(3) }
        );
        assert_eq!(
            class_of(Some("chapter"), Some("Chapter IV"), None),
            Classification::Chapter { number: Some(4) }
        );
        // No digits anywhere: the number stays unset
        assert_eq!(
            class_of(Some("chapter-start"), Some("Storms"), None),
            Classification::Chapter { number: None }
        );
    }

    #[test]
    fn test_chapter_type_marker() {
        assert_eq!(
            class_of(Some("c05"), Some("The Storm"), Some("chapter")),
            Classification::Chapter { number: Some(5) }
        );
        assert_eq!(
            class_of(None, Some("The Storm"), Some("bodymatter chapter")),
            Classification::Chapter { number: None }
        );
        assert_eq!(
            class_of(Some("c05"), Some("The Storm"), Some("bodymatter")),
            Classification::Unclassified
        );
    }

    #[test]
    fn test_level_rule() {
        assert_eq!(
            class_of(Some("level2_3"), Some("Sub"), None),
            Classification::Level {
                level: Some(2),
                subsection: Some(3)
            }
        );
        assert_eq!(
            class_of(Some("level_x"), None, None),
            Classification::Level {
                level: None,
                subsection: None
            }
        );
    }

    #[test]
    fn test_backmatter_and_unclassified() {
        assert_eq!(class_of(Some("references"), None, None), Classification::Backmatter);
        assert_eq!(class_of(None, Some("Index"), None), Classification::Backmatter);
        assert_eq!(
            class_of(None, Some("Bibliography: further reading"), None),
            Classification::Backmatter
        );
        assert_eq!(class_of(None, Some("Indexing Strategies"), None), Classification::Unclassified);
        assert_eq!(class_of(Some("x1"), Some("Storms"), None), Classification::Unclassified);
    }

    #[test]
    fn test_scan_markup() {
        let html = r#"<?xml version="1.0" encoding="UTF-8"?>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head><title>Book Title</title></head>
<body>
  <span id="page_5" epub:type="pagebreak"/>
  <section epub:type="chapter" id="ch05">
    <h1 id="h-1">Chapter 5<br/>The   Long&#160;Night</h1>
    <p id="p1">Text &amp; more.</p>
  </section>
</body>
</html>"#;
        let m = scan_markup(html);
        assert_eq!(m.body_type.as_deref(), Some("chapter"));
        assert_eq!(m.primary_id.as_deref(), Some("ch05"));
        assert_eq!(m.ids, vec!["page_5", "ch05", "h-1", "p1"]);
        assert_eq!(m.title.as_deref(), Some("Chapter 5 The Long Night"));
    }

    #[test]
    fn test_scan_falls_back_to_document_title() {
        let html = "<html><head><title>Copyright</title></head><body><p>x</p></body></html>";
        let m = scan_markup(html);
        assert_eq!(m.title.as_deref(), Some("Copyright"));
        assert_eq!(m.primary_id, None);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let html = r#"<html><body><div id="chapter12"><h2>CHAPTER TWELVE</h2></div></body></html>"#;
        let a = ContentUnit::from_markup("c12", "c12.xhtml", Path::new("c12.xhtml"), html, None);
        let b = ContentUnit::from_markup("c12", "c12.xhtml", Path::new("c12.xhtml"), html, None);
        assert_eq!(a, b);
        assert_eq!(a.chapter_number(), Some(12));
        assert_eq!(a.title, "Chapter Twelve");
    }

    #[test]
    fn test_unit_title_fallbacks() {
        let html = "<html><body><p>no heading</p></body></html>";
        let with_nav =
            ContentUnit::from_markup("x", "x.xhtml", Path::new("x.xhtml"), html, Some("nav label"));
        assert_eq!(with_nav.title, "Nav Label");
        let bare = ContentUnit::from_markup("x", "part_two.xhtml", Path::new("p"), html, None);
        assert_eq!(bare.title, "Part_two");
    }

    #[test]
    fn test_title_case() {
        assert_eq!(title_case("CHAPTER  ONE: the end"), "Chapter One: The End");
        assert_eq!(title_case(""), "");
    }

    #[test]
    fn test_roman_value() {
        assert_eq!(roman_value("iv"), Some(4));
        assert_eq!(roman_value("XIV"), Some(14));
        assert_eq!(roman_value("q"), None);
    }
}
