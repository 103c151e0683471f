//! Post-pass over converter output: protect links, repair, restore, finalize.

use crate::epub_reader::{file_name_of, is_content_file, split_href};
use crate::labels::{output_stem, CrossReferenceMap};
use crate::prepass::flat_asset_path;
use crate::rules;
use lazy_static::lazy_static;
use regex::{Captures, Regex};

const TOKEN_OPEN: char = '\u{E000}';
const TOKEN_CLOSE: char = '\u{E001}';

lazy_static! {
    static ref IMAGE: Regex =
        Regex::new(r#"!\[([^\]\n]*)\]\((<[^>\n]*>|[^)\s]*)(?:\s+"[^"\n]*")?\)"#).unwrap();
    static ref LINK: Regex = Regex::new(
        r#"\[((?:[^\[\]\n]|\[[^\[\]\n]*\])*)\]\((<[^>\n]*>|[^)\s]*)(?:\s+"[^"\n]*")?\)"#
    )
    .unwrap();
    static ref AUTOLINK: Regex = Regex::new(r"<((?:https?|mailto):[^>\s]+)>").unwrap();
    static ref TOKEN: Regex = Regex::new("\u{E000}(\\d+)\u{E001}").unwrap();
    static ref SCHEME: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9+.-]*:").unwrap();
}

/// Something pulled out of the text before repair.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Protected {
    Image { alt: String, target: String },
    /// External or non-document link, restored exactly as written
    Link { original: String },
    /// Link to another content unit, or to an anchor in this one
    CrossRef {
        text: String,
        file: String,
        anchor: Option<String>,
    },
}

/// Placeholders handed out during one protect step.
#[derive(Debug, Default)]
struct Protector {
    items: Vec<Protected>,
}

impl Protector {
    fn token(&mut self, item: Protected) -> String {
        self.items.push(item);
        format!("{TOKEN_OPEN}{}{TOKEN_CLOSE}", self.items.len() - 1)
    }

    /// Images first so a linked image nests inside its link's token.
    fn protect(&mut self, text: &str, current_file: &str) -> String {
        let text = IMAGE.replace_all(text, |caps: &Captures| {
            self.token(Protected::Image {
                alt: caps[1].to_string(),
                target: unbracket(&caps[2]).to_string(),
            })
        });
        let text = LINK.replace_all(&text, |caps: &Captures| {
            let item = classify_link(&caps[0], &caps[1], unbracket(&caps[2]), current_file);
            self.token(item)
        });
        AUTOLINK
            .replace_all(&text, |caps: &Captures| {
                self.token(Protected::Link {
                    original: caps[0].to_string(),
                })
            })
            .into_owned()
    }

    /// Swap every token for its final form. Link text can itself hold
    /// tokens, so this repeats until none are left.
    fn restore(&self, text: &str, xref: &CrossReferenceMap) -> String {
        let mut text = text.to_string();
        for _ in 0..=self.items.len() {
            if !TOKEN.is_match(&text) {
                break;
            }
            text = TOKEN
                .replace_all(&text, |caps: &Captures| {
                    caps[1]
                        .parse::<usize>()
                        .ok()
                        .and_then(|i| self.items.get(i))
                        .map_or_else(String::new, |item| render(item, xref))
                })
                .into_owned();
        }
        text
    }
}

fn unbracket(target: &str) -> &str {
    target
        .strip_prefix('<')
        .and_then(|t| t.strip_suffix('>'))
        .unwrap_or(target)
}

fn classify_link(original: &str, text: &str, target: &str, current_file: &str) -> Protected {
    if SCHEME.is_match(target) {
        return Protected::Link {
            original: original.to_string(),
        };
    }
    let (file, anchor) = split_href(target);
    if file.is_empty() && anchor.is_some() {
        return Protected::CrossRef {
            text: text.to_string(),
            file: current_file.to_string(),
            anchor,
        };
    }
    if is_content_file(&file) {
        return Protected::CrossRef {
            text: text.to_string(),
            file: file_name_of(&file),
            anchor,
        };
    }
    Protected::Link {
        original: original.to_string(),
    }
}

fn render(item: &Protected, xref: &CrossReferenceMap) -> String {
    match item {
        Protected::Image { alt, target } => format!("![{alt}]({})", flat_asset_path(target)),
        Protected::Link { original } => original.clone(),
        Protected::CrossRef { text, file, anchor } => match xref.get(file) {
            Some(output_file) => wiki_link(output_stem(output_file), anchor.as_deref(), text),
            None => text.clone(),
        },
    }
}

/// `[[stem#anchor|text]]`; brackets and pipes in the text would end the link
/// early and are dropped.
pub fn wiki_link(stem: &str, anchor: Option<&str>, text: &str) -> String {
    let alias: String = text
        .chars()
        .filter(|c| !matches!(c, '[' | ']' | '|'))
        .collect();
    let alias = alias.trim();
    let mut link = format!("[[{stem}");
    if let Some(anchor) = anchor {
        link.push('#');
        link.push_str(anchor);
    }
    if !alias.is_empty() {
        link.push('|');
        link.push_str(alias);
    }
    link.push_str("]]");
    link
}

/// Full post-pass for one unit's converter output.
///
/// `current_file` is the unit's original file name, used to resolve
/// anchor-only links. Output depends only on the arguments.
pub fn normalize(raw: &str, xref: &CrossReferenceMap, current_file: &str, title: &str) -> String {
    let text: String = raw
        .replace("\r\n", "\n")
        .chars()
        .filter(|c| *c != TOKEN_OPEN && *c != TOKEN_CLOSE)
        .collect();
    let mut protector = Protector::default();
    let protected = protector.protect(&text, current_file);
    let repaired = rules::repair(&protected);
    let restored = protector.restore(&repaired, xref);
    finalize(&restored, title)
}

/// Collapse blank-line runs, trim trailing whitespace, and end with exactly
/// one newline. Empty output becomes a bare title heading.
pub fn finalize(md: &str, title: &str) -> String {
    let mut result = md.to_string();

    // Trim trailing whitespace per line
    result = result
        .lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n");

    // Collapse 3+ consecutive newlines to 2
    while result.contains("\n\n\n") {
        result = result.replace("\n\n\n", "\n\n");
    }

    let trimmed = result.trim().to_string();
    if trimmed.is_empty() {
        format!("# {}\n", title.trim())
    } else {
        trimmed + "\n"
    }
}
