//! Markup pre-pass, applied to each unit before it goes to the converter.
//!
//! Each rule rewrites one known idiom into markup the converter handles
//! well. Rules run in the order of [`PREPASS_RULES`].

use crate::context::ASSET_DIR;
use crate::epub_reader::file_name_of;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use tracing::trace;

/// A named markup rewrite.
pub struct MarkupRule {
    pub name: &'static str,
    pub apply: fn(&str) -> String,
}

pub const PREPASS_RULES: &[MarkupRule] = &[
    MarkupRule {
        name: "rewrite_image_sources",
        apply: rewrite_image_sources,
    },
    MarkupRule {
        name: "title_blocks_to_headings",
        apply: title_blocks_to_headings,
    },
    MarkupRule {
        name: "subtitles_to_headings",
        apply: subtitles_to_headings,
    },
    MarkupRule {
        name: "author_blocks_to_italics",
        apply: author_blocks_to_italics,
    },
    MarkupRule {
        name: "superscripts_to_footnote_refs",
        apply: superscripts_to_footnote_refs,
    },
    MarkupRule {
        name: "unlink_figure_list_captions",
        apply: unlink_figure_list_captions,
    },
    MarkupRule {
        name: "strip_wrappers",
        apply: strip_wrappers,
    },
];

lazy_static! {
    static ref SVG_IMAGE: Regex = Regex::new(
        r#"(?is)<svg\b[^>]*>.*?<image\b[^>]*?\b(?:xlink:)?href\s*=\s*["']([^"']*)["'][^>]*>.*?</svg>"#
    )
    .unwrap();
    static ref IMG_SRC: Regex =
        Regex::new(r#"(?is)(<img\b[^>]*?\bsrc\s*=\s*)(["'])([^"']*)["']"#).unwrap();
    static ref TITLE_BLOCK: Regex = Regex::new(
        r#"(?is)<(?:p|div|h[1-6])\b[^>]*>\s*<span\b[^>]*\bclass\s*=\s*["'][^"']*\b(?:label|num|number|chapter-num|chapter-number)\b[^"']*["'][^>]*>(.*?)</span>\s*(?:<br\s*/?>\s*)?<(?:b|strong)\b[^>]*>(.*?)</(?:b|strong)>\s*</(?:p|div|h[1-6])>"#
    )
    .unwrap();
    static ref SUBTITLE_BLOCK: Regex = Regex::new(
        r#"(?is)<(?:p|div)\b[^>]*\bclass\s*=\s*["'][^"']*\bsubtitle\b[^"']*["'][^>]*>(.*?)</(?:p|div)>"#
    )
    .unwrap();
    static ref AUTHOR_BLOCK: Regex = Regex::new(
        r#"(?is)<(?:p|div)\b[^>]*\bclass\s*=\s*["'][^"']*\b(?:author|byline)\b[^"']*["'][^>]*>(.*?)</(?:p|div)>"#
    )
    .unwrap();
    static ref LINKED_SUPERSCRIPT: Regex =
        Regex::new(r"(?is)<a\b[^>]*>\s*<sup\b[^>]*>\s*(\d{1,4})\s*</sup>\s*</a>").unwrap();
    static ref SUPERSCRIPT: Regex = Regex::new(
        r"(?is)<sup\b[^>]*>\s*(?:<a\b[^>]*>\s*)?(\d{1,4})\s*(?:</a>\s*)?</sup>"
    )
    .unwrap();
    static ref CAPTION: Regex = Regex::new(
        r#"(?is)<figcaption\b[^>]*>.*?</figcaption>|<(?:p|div)\b[^>]*\bclass\s*=\s*["'][^"']*\bcaption\b[^"']*["'][^>]*>.*?</(?:p|div)>"#
    )
    .unwrap();
    static ref LINK: Regex =
        Regex::new(r#"(?is)<a\b[^>]*?\bhref\s*=\s*["']([^"']*)["'][^>]*>(.*?)</a>"#).unwrap();
    static ref PAGEBREAK: Regex = Regex::new(
        r#"(?is)<(?:span|a|div)\b[^>]*\b(?:epub:type|role)\s*=\s*["'][^"']*pagebreak[^"']*["'][^>]*?(?:/>|>[^<]*</(?:span|a|div)>)"#
    )
    .unwrap();
    static ref EMPTY_SPAN: Regex = Regex::new(r"(?is)<span\b([^>]*?)/>").unwrap();
    static ref SPAN_OPEN: Regex = Regex::new(r"(?is)<span\b([^>]*)>").unwrap();
    static ref SPAN_CLOSE: Regex = Regex::new(r"(?i)</span\s*>").unwrap();
    static ref DIV_OPEN: Regex = Regex::new(r"(?is)<div\b([^>]*)>").unwrap();
    static ref ID_ATTR: Regex = Regex::new(r#"(?i)\bid\s*=\s*["']([^"']*)["']"#).unwrap();
}

/// Run every pre-pass rule in order.
pub fn prepass(markup: &str) -> String {
    PREPASS_RULES.iter().fold(markup.to_string(), |text, rule| {
        let rewritten = (rule.apply)(&text);
        if rewritten != text {
            trace!(rule = rule.name, "pre-pass rule applied");
        }
        rewritten
    })
}

/// Path of an image inside the flat asset directory; remote and inline
/// sources are left alone.
pub fn flat_asset_path(src: &str) -> String {
    let lower = src.to_ascii_lowercase();
    if lower.starts_with("http:") || lower.starts_with("https:") || lower.starts_with("data:") {
        return src.to_string();
    }
    format!("{ASSET_DIR}/{}", file_name_of(src))
}

/// Point every image at the flat asset directory; SVG-wrapped images become
/// plain `<img>` elements.
pub fn rewrite_image_sources(markup: &str) -> String {
    let unwrapped = SVG_IMAGE.replace_all(markup, |caps: &Captures| {
        format!(r#"<img src="{}" alt=""/>"#, &caps[1])
    });
    IMG_SRC
        .replace_all(&unwrapped, |caps: &Captures| {
            format!("{}{}{}{}", &caps[1], &caps[2], flat_asset_path(&caps[3]), &caps[2])
        })
        .into_owned()
}

/// A label span followed by a bold run is a chapter title.
pub fn title_blocks_to_headings(markup: &str) -> String {
    TITLE_BLOCK
        .replace_all(markup, |caps: &Captures| {
            format!("<h1>{}: {}</h1>", caps[1].trim(), caps[2].trim())
        })
        .into_owned()
}

pub fn subtitles_to_headings(markup: &str) -> String {
    SUBTITLE_BLOCK
        .replace_all(markup, |caps: &Captures| format!("<h2>{}</h2>", caps[1].trim()))
        .into_owned()
}

pub fn author_blocks_to_italics(markup: &str) -> String {
    AUTHOR_BLOCK
        .replace_all(markup, |caps: &Captures| {
            format!("<p><em>{}</em></p>", caps[1].trim())
        })
        .into_owned()
}

/// Numeric superscripts become `[^n]` footnote references.
pub fn superscripts_to_footnote_refs(markup: &str) -> String {
    let linked = LINKED_SUPERSCRIPT.replace_all(markup, "[^$1]");
    SUPERSCRIPT.replace_all(&linked, "[^$1]").into_owned()
}

/// Captions that link to a separate list-of-figures unit keep only the text.
pub fn unlink_figure_list_captions(markup: &str) -> String {
    CAPTION
        .replace_all(markup, |caps: &Captures| {
            LINK.replace_all(&caps[0], |link: &Captures| {
                if is_figure_list(&link[1]) {
                    link[2].to_string()
                } else {
                    link[0].to_string()
                }
            })
            .into_owned()
        })
        .into_owned()
}

fn is_figure_list(href: &str) -> bool {
    let file = file_name_of(href).to_ascii_lowercase();
    file.starts_with("lof") || file.contains("figure") || file.contains("list_of_fig")
}

/// Drop page-break markers, unwrap spans, and strip div attributes.
/// Identifiers survive as empty anchors.
pub fn strip_wrappers(markup: &str) -> String {
    let text = PAGEBREAK.replace_all(markup, "");
    let text = EMPTY_SPAN.replace_all(&text, |caps: &Captures| anchor_for(&caps[1]));
    let text = SPAN_OPEN.replace_all(&text, |caps: &Captures| anchor_for(&caps[1]));
    let text = SPAN_CLOSE.replace_all(&text, "");
    DIV_OPEN
        .replace_all(&text, |caps: &Captures| format!("<div>{}", anchor_for(&caps[1])))
        .into_owned()
}

fn anchor_for(attrs: &str) -> String {
    ID_ATTR
        .captures(attrs)
        .map(|id| format!(r#"<a id="{}"></a>"#, &id[1]))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_sources_flattened() {
        let html = r#"<p><img class="x" src="../Images/ch1/fig 1.png" alt="A"/></p>
<img src='http://example.com/a.png'/>"#;
        let out = rewrite_image_sources(html);
        assert!(out.contains(r#"src="images/fig 1.png""#));
        assert!(out.contains("src='http://example.com/a.png'"));
        assert_eq!(rewrite_image_sources(&out), out);
    }

    #[test]
    fn test_svg_cover_becomes_img() {
        let html = r#"<div><svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 600 800">
<image width="600" height="800" xlink:href="../Images/cover.jpg"/></svg></div>"#;
        let out = rewrite_image_sources(html);
        assert!(out.contains(r#"<img src="images/cover.jpg" alt=""/>"#));
        assert!(!out.contains("<svg"));
    }

    #[test]
    fn test_title_block() {
        let html = r#"<p class="chapter-title"><span class="chapter-label">Chapter 3</span><br/>
<b>The Long Night</b></p>"#;
        assert_eq!(
            title_blocks_to_headings(html),
            "<h1>Chapter 3: The Long Night</h1>"
        );
    }

    #[test]
    fn test_subtitle_and_author() {
        let html = r#"<p class="chapter-subtitle">A Study</p><div class="author">Jane Roe</div>"#;
        let out = author_blocks_to_italics(&subtitles_to_headings(html));
        assert_eq!(out, "<h2>A Study</h2><p><em>Jane Roe</em></p>");
    }

    #[test]
    fn test_superscripts() {
        let html = r##"word<sup>3</sup> and<sup class="fn"><a href="notes.xhtml#n4">4</a></sup>
and <a href="#n5"><sup>5</sup></a> but <sup>th</sup>"##;
        let out = superscripts_to_footnote_refs(html);
        assert!(out.contains("word[^3] and[^4]"));
        assert!(out.contains("and [^5] but <sup>th</sup>"));
    }

    #[test]
    fn test_figure_list_links_removed_from_captions() {
        let html = r#"<figcaption><a href="lof.xhtml#f1">Figure 1.1</a> A map</figcaption>
<p><a href="lof.xhtml#f1">kept outside captions</a></p>
<p class="caption"><a href="ch2.xhtml#s">see ch2</a></p>"#;
        let out = unlink_figure_list_captions(html);
        assert!(out.contains("<figcaption>Figure 1.1 A map</figcaption>"));
        assert!(out.contains(r#"<a href="lof.xhtml#f1">kept outside captions</a>"#));
        assert!(out.contains(r#"<a href="ch2.xhtml#s">see ch2</a>"#));
    }

    #[test]
    fn test_strip_wrappers() {
        let html = r#"<div class="body" id="sec2"><p><span class="x">a</span><span id="p7">b</span>
<span epub:type="pagebreak" id="page_12" title="12"/>c<span/></p></div>"#;
        let out = strip_wrappers(html);
        assert_eq!(
            out,
            "<div><a id=\"sec2\"></a><p>a<a id=\"p7\"></a>b\nc</p></div>"
        );
    }

    #[test]
    fn test_prepass_runs_all_rules() {
        let html = r#"<body><div class="c"><img src="Images/a.png"/><p>x<sup>1</sup></p></div></body>"#;
        assert_eq!(
            prepass(html),
            r#"<body><div><img src="images/a.png"/><p>x[^1]</p></div></body>"#
        );
    }
}
