//! Text helpers: markup stripping, escaping, boilerplate removal and the
//! "looks like a question" classifier.

use std::sync::OnceLock;

use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

/// Line separator used in display text. Tooltips render HTML, so a literal
/// newline would collapse.
pub const LINE_BREAK: &str = "<br>";

/// Narration noise some hosts inject as accessible text ahead of the message.
const NARRATION_PREFIXES: &[&str] = &[
    "you said",
    "나의 말",
    "vous avez dit",
    "du hast gesagt",
    "has dicho",
];

fn markup_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

fn interrogative_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(what|where|when|who|why|how|is|are|can|could|would|do|does|did|will|should|may|might)(\s|$)",
        )
        .expect("static regex")
    })
}

fn korean_ending_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[가까나오죠요][?？]*$").expect("static regex"))
}

/// Remove tags, decode the entities we produce ourselves, collapse whitespace.
pub fn strip_markup(text: &str) -> String {
    let without_tags = markup_re().replace_all(text, " ");
    let decoded = html_unescape(&without_tags);
    collapse_whitespace(&decoded)
}

pub fn collapse_whitespace(text: &str) -> String {
    whitespace_re().replace_all(text.trim(), " ").into_owned()
}

pub fn html_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn html_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

/// Drop leading narration phrases ("You said:" and localized variants).
/// The phrase only counts when a colon or line break follows it, so a
/// message that genuinely starts with "You said earlier..." survives.
pub fn strip_narration(text: &str) -> String {
    let mut rest = text.trim_start();
    'outer: loop {
        let lower = rest.to_lowercase();
        for prefix in NARRATION_PREFIXES {
            if !lower.starts_with(prefix) || !rest.is_char_boundary(prefix.len()) {
                continue;
            }
            let tail = &rest[prefix.len()..];
            let after_spaces = tail.trim_start_matches([' ', '\t']);
            if tail.is_empty() {
                rest = tail;
                break 'outer;
            }
            if let Some(stripped) = after_spaces.strip_prefix(':') {
                rest = stripped.trim_start();
                continue 'outer;
            }
            if after_spaces.starts_with('\n') {
                rest = after_spaces.trim_start();
                continue 'outer;
            }
        }
        break;
    }
    rest.to_string()
}

/// Normalize an attachment name: collapse whitespace and drop a trailing
/// file-type badge the widgets render next to the name ("report.pdf PDF").
pub fn clean_file_name(raw: &str) -> String {
    let collapsed = collapse_whitespace(raw);
    if let Some((name, badge)) = collapsed.rsplit_once(' ') {
        let ext = name.rsplit_once('.').map(|(_, e)| e.to_lowercase());
        if ext.as_deref() == Some(&badge.to_lowercase()) {
            return name.to_string();
        }
    }
    collapsed
}

/// First `max` grapheme clusters of `text`.
pub fn truncate_graphemes(text: &str, max: usize) -> String {
    text.graphemes(true).take(max).collect()
}

/// True for text that ends with a question mark, starts with an
/// interrogative word, or ends with a Korean question ending.
pub fn is_question(text: &str) -> bool {
    let clean = strip_markup(text);
    if clean.chars().count() < 2 {
        return false;
    }
    if clean.ends_with('?') || clean.ends_with('？') {
        return true;
    }
    if interrogative_re().is_match(&clean) {
        return true;
    }
    korean_ending_re().is_match(&clean)
}
