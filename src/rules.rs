//! Repair battery for converter output.
//!
//! Every rule is a pure text-to-text function that fixes one known converter
//! failure mode. Links and images are already replaced by placeholder tokens
//! when the battery runs, so no rule needs to care about link syntax.
//! Running the whole battery on its own output changes nothing.

use crate::prepass::flat_asset_path;
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use tracing::trace;

/// A named post-pass rewrite.
pub struct RepairRule {
    pub name: &'static str,
    pub apply: fn(&str) -> String,
}

pub const REPAIR_RULES: &[RepairRule] = &[
    RepairRule {
        name: "strip_fenced_divs",
        apply: strip_fenced_divs,
    },
    RepairRule {
        name: "strip_attribute_blocks",
        apply: strip_attribute_blocks,
    },
    RepairRule {
        name: "rebuild_image_refs",
        apply: rebuild_image_refs,
    },
    RepairRule {
        name: "unescape_footnote_refs",
        apply: unescape_footnote_refs,
    },
    RepairRule {
        name: "setext_to_atx",
        apply: setext_to_atx,
    },
    RepairRule {
        name: "tables_to_headings_and_lists",
        apply: tables_to_headings_and_lists,
    },
    RepairRule {
        name: "separate_blocks",
        apply: separate_blocks,
    },
    RepairRule {
        name: "rejoin_broken_emphasis",
        apply: rejoin_broken_emphasis,
    },
    RepairRule {
        name: "split_bold_lead_heading",
        apply: split_bold_lead_heading,
    },
    RepairRule {
        name: "separate_headings",
        apply: separate_headings,
    },
    RepairRule {
        name: "rejoin_broken_lists",
        apply: rejoin_broken_lists,
    },
    RepairRule {
        name: "notes_to_footnote_definitions",
        apply: notes_to_footnote_definitions,
    },
];

lazy_static! {
    static ref FENCED_DIV: Regex = Regex::new(r"^\s*:{3,}").unwrap();
    static ref BRACKETED_SPAN: Regex = Regex::new(r"\[([^\[\]\n]*)\]\{[^{}\n]*\}").unwrap();
    static ref ATTRIBUTE_BLOCK: Regex =
        Regex::new(r#"\{(?:[#.][^{}\n]*|[A-Za-z-]+=[^{}\n]*)\}"#).unwrap();
    static ref RAW_IMG: Regex = Regex::new(r"(?is)<img\b[^>]*>").unwrap();
    static ref SRC_ATTR: Regex = Regex::new(r#"(?i)\bsrc\s*=\s*["']([^"']*)["']"#).unwrap();
    static ref ALT_ATTR: Regex = Regex::new(r#"(?i)\balt\s*=\s*["']([^"']*)["']"#).unwrap();
    static ref ESCAPED_FOOTNOTE_REF: Regex = Regex::new(r"\\?\[\\?\^(\d+)\\?\]").unwrap();
    static ref PIPE_ROW: Regex = Regex::new(r"^\s*\|([^|]*)\|\s*$").unwrap();
    static ref SEPARATOR_CELL: Regex = Regex::new(r"^:?-+:?$").unwrap();
    static ref DASH_RULE: Regex = Regex::new(r"^\s*-{3,}\s*$").unwrap();
    static ref SETEXT_UNDERLINE: Regex = Regex::new(r"^ {0,3}(={3,}|-{3,})\s*$").unwrap();
    static ref HEADING: Regex = Regex::new(r"^#{1,6}[ \t]+(\S.*?)[ \t#]*$").unwrap();
    static ref LIST_ITEM: Regex = Regex::new(r"^\s*(?:[-*+]|\d+[.)])[ \t]+\S").unwrap();
    static ref THEMATIC_BREAK: Regex =
        Regex::new(r"^\s*(?:(?:\*\s*){3,}|(?:-\s*){3,}|(?:_\s*){3,})$").unwrap();
    static ref FOOTNOTE_DEFINITION: Regex = Regex::new(r"^\[\^\d+\]:").unwrap();
    static ref BOLD_LEAD: Regex =
        Regex::new(r"^\*\*([^*\n]{1,80})\*\*[ \t]+([A-Z][^\n]{20,})$").unwrap();
    static ref NUMBERED_NOTE: Regex =
        Regex::new(r"^(?:(\d{1,4})(?:\\?\.)?|\[\^(\d{1,4})\])[ \t]+(\S.*)$").unwrap();
}

/// Run every repair rule in order.
pub fn repair(text: &str) -> String {
    REPAIR_RULES.iter().fold(text.to_string(), |text, rule| {
        let repaired = (rule.apply)(&text);
        if repaired != text {
            trace!(rule = rule.name, "repair rule applied");
        }
        repaired
    })
}

fn is_blank(line: &str) -> bool {
    line.trim().is_empty()
}

fn is_heading(line: &str) -> bool {
    HEADING.is_match(line)
}

fn is_list_item(line: &str) -> bool {
    LIST_ITEM.is_match(line) && !THEMATIC_BREAK.is_match(line)
}

/// A paragraph can begin after nothing, a blank line, or a heading.
fn starts_block(prev: Option<&String>) -> bool {
    prev.map_or(true, |line| is_blank(line) || is_heading(line))
}

/// Plain paragraph text, as opposed to any block-level construct.
fn is_prose(line: &str) -> bool {
    !is_blank(line)
        && !is_heading(line)
        && !is_list_item(line)
        && !THEMATIC_BREAK.is_match(line)
        && !SETEXT_UNDERLINE.is_match(line)
        && !FOOTNOTE_DEFINITION.is_match(line)
        && !is_table_row(line)
        && !is_fence(line)
}

/// List items and footnote definitions both run as line-per-entry groups.
fn is_item(line: &str) -> bool {
    is_list_item(line) || FOOTNOTE_DEFINITION.is_match(line)
}

fn is_indented(line: &str) -> bool {
    line.starts_with([' ', '\t'])
}

fn is_quote(line: &str) -> bool {
    line.trim_start().starts_with('>')
}

fn is_table_row(line: &str) -> bool {
    line.trim_start().starts_with('|')
}

fn is_fence(line: &str) -> bool {
    line.trim_start().starts_with("```")
}

fn lines(text: &str) -> Vec<&str> {
    text.split('\n').collect()
}

/// Drop pandoc fenced-div markers (`::: {.class}` and bare `:::`).
pub fn strip_fenced_divs(text: &str) -> String {
    lines(text)
        .into_iter()
        .filter(|line| !FENCED_DIV.is_match(line))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `[text]{.smallcaps}` becomes `text`; stray `{#id}` and `{width=..}`
/// blocks are removed. Nested spans unwrap from the inside out.
pub fn strip_attribute_blocks(text: &str) -> String {
    let mut text = text.to_string();
    loop {
        let spans = BRACKETED_SPAN.replace_all(&text, "$1");
        let next = ATTRIBUTE_BLOCK.replace_all(&spans, "").into_owned();
        if next == text {
            return text;
        }
        text = next;
    }
}

/// Raw `<img>` tags the converter passed through become Markdown images
/// pointing into the asset directory.
pub fn rebuild_image_refs(text: &str) -> String {
    RAW_IMG
        .replace_all(text, |caps: &Captures| {
            let tag = &caps[0];
            match SRC_ATTR.captures(tag) {
                Some(src) => {
                    let alt = ALT_ATTR
                        .captures(tag)
                        .and_then(|a| a.get(1))
                        .map_or("", |m| m.as_str());
                    format!("![{}]({})", alt, flat_asset_path(&src[1]))
                }
                None => String::new(),
            }
        })
        .into_owned()
}

/// `\[\^3\]` and similar escapes of footnote references become `[^3]`.
pub fn unescape_footnote_refs(text: &str) -> String {
    ESCAPED_FOOTNOTE_REF.replace_all(text, "[^$1]").into_owned()
}

/// Single-column tables are layout, not data: one row becomes a heading,
/// several rows become a bullet list.
pub fn tables_to_headings_and_lists(text: &str) -> String {
    let lines = lines(text);
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let block = pipe_table(&lines, i).or_else(|| {
            if starts_block(out.last()) {
                rule_table(&lines, i)
            } else {
                None
            }
        });
        match block {
            Some((rows, end)) => {
                match rows.as_slice() {
                    [] => {}
                    [row] => out.push(format!("### {row}")),
                    rows => out.extend(rows.iter().map(|row| format!("- {row}"))),
                }
                i = end;
            }
            None => {
                out.push(lines[i].to_string());
                i += 1;
            }
        }
    }
    out.join("\n")
}

/// Rows of a `| cell |` table starting at `start`, and the index after it.
fn pipe_table(lines: &[&str], start: usize) -> Option<(Vec<String>, usize)> {
    let mut rows = Vec::new();
    let mut end = start;
    while let Some(caps) = lines.get(end).and_then(|line| PIPE_ROW.captures(line)) {
        let cell = caps[1].trim();
        if !cell.is_empty() && !SEPARATOR_CELL.is_match(cell) {
            rows.push(cell.to_string());
        }
        end += 1;
    }
    (end > start).then_some((rows, end))
}

/// Rows between two dash rules, as pandoc writes single-column simple tables.
fn rule_table(lines: &[&str], start: usize) -> Option<(Vec<String>, usize)> {
    if !DASH_RULE.is_match(lines[start]) {
        return None;
    }
    let mut end = start + 1;
    while let Some(line) = lines.get(end) {
        if DASH_RULE.is_match(line) {
            break;
        }
        if is_blank(line) {
            return None;
        }
        end += 1;
    }
    if end >= lines.len() || end == start + 1 {
        return None;
    }
    let rows = lines[start + 1..end]
        .iter()
        .map(|line| line.trim().to_string())
        .collect();
    Some((rows, end + 1))
}

/// Underlined headings become `#`/`##` headings.
pub fn setext_to_atx(text: &str) -> String {
    let lines = lines(text);
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        let underline = lines.get(i + 1).and_then(|next| SETEXT_UNDERLINE.captures(next));
        match underline {
            Some(caps) if is_prose(line) && starts_block(out.last()) => {
                let marks = if caps[1].starts_with('=') { "#" } else { "##" };
                out.push(format!("{marks} {}", line.trim()));
                i += 2;
            }
            _ => {
                out.push(line.to_string());
                i += 1;
            }
        }
    }
    out.join("\n")
}

/// Converters that write one line per block leave paragraphs touching.
/// A blank line goes between two adjacent lines unless they continue one
/// block: items with their indented continuations, quote lines, table rows,
/// or anything inside a code fence.
pub fn separate_blocks(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    let mut in_fence = false;
    let mut in_items = false;
    for line in lines(text) {
        if in_fence {
            in_fence = !is_fence(line);
            out.push(line.to_string());
            continue;
        }
        if is_blank(line) {
            in_items = false;
            out.push(line.to_string());
            continue;
        }
        let continues = match out.last() {
            None => true,
            Some(prev) if is_blank(prev) => true,
            Some(prev) => {
                (in_items && (is_item(line) || is_indented(line)))
                    || (is_quote(prev) && is_quote(line))
                    || (is_table_row(prev) && is_table_row(line))
            }
        };
        if !continues {
            out.push(String::new());
        }
        in_items = is_item(line) || (in_items && is_indented(line));
        in_fence = is_fence(line);
        out.push(line.to_string());
    }
    out.join("\n")
}

fn unbalanced_emphasis(line: &str) -> bool {
    line.matches('*').count() % 2 == 1 || line.matches("**").count() % 2 == 1
}

/// Emphasis the converter split across a spurious blank line is joined back
/// into one paragraph.
pub fn rejoin_broken_emphasis(text: &str) -> String {
    let lines = lines(text);
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let mut current = lines[i].to_string();
        i += 1;
        while is_prose(&current) && unbalanced_emphasis(&current) {
            let joinable = matches!(
                (lines.get(i), lines.get(i + 1)),
                (Some(gap), Some(next)) if is_blank(gap) && is_prose(next) && unbalanced_emphasis(next)
            );
            if !joinable {
                break;
            }
            current = format!("{} {}", current.trim_end(), lines[i + 1].trim_start());
            i += 2;
        }
        out.push(current);
    }
    out.join("\n")
}

/// A bold run opening a paragraph and followed by a sentence is a heading
/// the converter merged into the body.
pub fn split_bold_lead_heading(text: &str) -> String {
    let mut out: Vec<String> = Vec::new();
    for line in lines(text) {
        let split = BOLD_LEAD.captures(line).filter(|caps| {
            let title = caps[1].trim();
            !title.is_empty() && !title.ends_with(['.', ',', ';', ':', '!', '?'])
        });
        match split {
            Some(caps) if starts_block(out.last()) => {
                out.push(format!("### {}", caps[1].trim()));
                out.push(String::new());
                out.push(caps[2].to_string());
            }
            _ => out.push(line.to_string()),
        }
    }
    out.join("\n")
}

/// Every heading gets a blank line before and after it.
pub fn separate_headings(text: &str) -> String {
    let lines = lines(text);
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    for (i, line) in lines.iter().enumerate() {
        let heading = is_heading(line);
        if heading && out.last().is_some_and(|prev| !is_blank(prev)) {
            out.push(String::new());
        }
        out.push(line.to_string());
        if heading && lines.get(i + 1).is_some_and(|next| !is_blank(next)) {
            out.push(String::new());
        }
    }
    out.join("\n")
}

/// Blank lines between consecutive list items are dropped.
pub fn rejoin_broken_lists(text: &str) -> String {
    let lines = lines(text);
    let mut out: Vec<String> = Vec::with_capacity(lines.len());
    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        out.push(line.to_string());
        i += 1;
        if is_list_item(line) {
            let mut next = i;
            while lines.get(next).is_some_and(|l| is_blank(l)) {
                next += 1;
            }
            if next > i && lines.get(next).is_some_and(|l| is_list_item(l)) {
                i = next;
            }
        }
    }
    out.join("\n")
}

/// Numbered lines under a "Notes" heading become footnote definitions.
/// The section ends at the next heading; numbered lines anywhere else are
/// left alone.
pub fn notes_to_footnote_definitions(text: &str) -> String {
    let mut in_notes = false;
    let mut out: Vec<String> = Vec::new();
    for line in lines(text) {
        if let Some(caps) = HEADING.captures(line) {
            let title = caps[1].trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace());
            in_notes = title.eq_ignore_ascii_case("notes");
            out.push(line.to_string());
            continue;
        }
        let definition = NUMBERED_NOTE
            .captures(line)
            .filter(|_| in_notes)
            .and_then(|caps| {
                let number = caps.get(1).or_else(|| caps.get(2))?;
                Some(format!("[^{}]: {}", number.as_str(), &caps[3]))
            });
        out.push(definition.unwrap_or_else(|| line.to_string()));
    }
    out.join("\n")
}
