//! SiteAdapter: per-host selectors and text extraction
//!
//! Each supported host gets a static [`SiteProfile`] (a strategy table, not
//! a type hierarchy). The adapter adds the one piece of state it needs: the
//! index of the extraction strategy that last found messages, so the next
//! discovery call tries it first.

use serde::{Deserialize, Serialize};

use crate::dom::{ChildNode, HostDom, NodeId};
use crate::text::{self, LINE_BREAK};

// =============================================================================
// Site detection
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SiteTag {
    ChatGpt,
    Gemini,
    Unknown,
}

impl SiteTag {
    pub fn detect(hostname: &str) -> Self {
        let host = hostname.to_ascii_lowercase();
        if host.contains("chat.openai.com") || host.contains("chatgpt.com") {
            SiteTag::ChatGpt
        } else if host.contains("gemini.google.com") {
            SiteTag::Gemini
        } else {
            SiteTag::Unknown
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SiteTag::ChatGpt => "chatgpt",
            SiteTag::Gemini => "gemini",
            SiteTag::Unknown => "unknown",
        }
    }

    pub fn profile(&self) -> &'static SiteProfile {
        match self {
            SiteTag::ChatGpt => &CHATGPT,
            SiteTag::Gemini => &GEMINI,
            SiteTag::Unknown => &UNKNOWN,
        }
    }
}

// =============================================================================
// Profiles
// =============================================================================

/// Static description of one host's conversation page.
#[derive(Debug)]
pub struct SiteProfile {
    pub tag: SiteTag,
    /// Message selectors, highest priority first.
    pub strategies: &'static [&'static str],
    /// Conversation-turn wrapper; text is extracted from here when present.
    pub turn_wrapper: Option<&'static str>,
    /// Visual row of a message; used for geometry and star placement.
    pub row_wrapper: Option<&'static str>,
    /// Elements naming attachments (file chips, image alts).
    pub file_selectors: &'static [&'static str],
    /// Attachment chrome skipped by the text walker.
    pub exclude_selectors: &'static [&'static str],
    /// Known scroll container shapes, tried before the ancestor walk.
    pub container_guesses: &'static [&'static str],
    /// Sticky chrome that can cover the top of the viewport.
    pub header_selectors: &'static [&'static str],
    /// Fixed scroll margin, overriding the header measurement.
    pub fixed_scroll_offset: Option<f64>,
}

static CHATGPT: SiteProfile = SiteProfile {
    tag: SiteTag::ChatGpt,
    strategies: &[
        r#"div[data-message-author-role="user"]"#,
        r#"article[data-testid^="conversation-turn"] [data-message-author-role="user"]"#,
        r#"[data-turn="user"]"#,
    ],
    turn_wrapper: Some(r#"[data-testid^="conversation-turn"]"#),
    row_wrapper: Some(r#"[data-testid^="conversation-turn"]"#),
    file_selectors: &[
        "img[alt]",
        r#"div[data-testid^="file-attachment"] .font-medium"#,
    ],
    exclude_selectors: &[r#"div[data-testid^="file-attachment"]"#, ".image-upload-item"],
    container_guesses: &[
        r#"div[class*="react-scroll-to-bottom"] > div"#,
        "main div.overflow-y-auto",
    ],
    header_selectors: &["header", "nav", r#"[data-testid="sidebar-nav"]"#],
    fixed_scroll_offset: None,
};

static GEMINI: SiteProfile = SiteProfile {
    tag: SiteTag::Gemini,
    strategies: &["div.query-text", "user-query .query-text", ".user-query"],
    turn_wrapper: Some(".user-query"),
    row_wrapper: Some(".user-query"),
    file_selectors: &[".file-attachment-card .filename", "img"],
    exclude_selectors: &[".file-attachment-card", ".upload-preview-container"],
    container_guesses: &["infinite-scroller.chat-history", "main"],
    header_selectors: &["header", "top-bar-actions"],
    fixed_scroll_offset: Some(20.0),
};

static UNKNOWN: SiteProfile = SiteProfile {
    tag: SiteTag::Unknown,
    strategies: &[r#"div[data-message-author-role="user"]"#],
    turn_wrapper: None,
    row_wrapper: None,
    file_selectors: &[],
    exclude_selectors: &[],
    container_guesses: &[],
    header_selectors: &["header", "nav"],
    fixed_scroll_offset: None,
};

/// Tags after which the walker inserts a line break, like `innerText` does.
const BLOCK_TAGS: &[&str] = &[
    "DIV", "P", "LI", "BR", "PRE", "BLOCKQUOTE", "H1", "H2", "H3", "H4", "H5", "H6", "TR",
];

// =============================================================================
// Extracted text
// =============================================================================

/// Structured text of one message: attachment labels, then body lines.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExtractedText {
    pub attachments: Vec<String>,
    pub body_lines: Vec<String>,
}

impl ExtractedText {
    pub fn is_empty(&self) -> bool {
        self.attachments.is_empty() && self.body_lines.is_empty()
    }

    /// Body as a single line, for classification and id derivation.
    pub fn body(&self) -> String {
        self.body_lines.join(" ")
    }

    /// Escaped lines joined with the explicit line-break marker.
    pub fn to_display(&self) -> String {
        self.attachments
            .iter()
            .chain(self.body_lines.iter())
            .map(|line| text::html_escape(line))
            .collect::<Vec<_>>()
            .join(LINE_BREAK)
    }

    /// Cap the body at `max_chars` graphemes; attachments are kept whole.
    pub fn truncated(&self, max_chars: usize) -> ExtractedText {
        let mut budget = max_chars;
        let mut body_lines = Vec::new();
        for line in &self.body_lines {
            if budget == 0 {
                break;
            }
            let cut = text::truncate_graphemes(line, budget);
            let used = cut.chars().count();
            let was_cut = cut.len() < line.len();
            budget = budget.saturating_sub(used);
            body_lines.push(if was_cut { format!("{}…", cut) } else { cut });
            if was_cut {
                break;
            }
        }
        ExtractedText {
            attachments: self.attachments.clone(),
            body_lines,
        }
    }
}

// =============================================================================
// SiteAdapter
// =============================================================================

pub struct SiteAdapter {
    tag: SiteTag,
    profile: &'static SiteProfile,
    /// Strategy index that last returned messages.
    last_strategy: Option<usize>,
    /// Extra exclusions (our own injected decorations).
    extra_excludes: Vec<String>,
    image_label_single: String,
    image_label_multi: String,
}

impl SiteAdapter {
    pub fn new(tag: SiteTag) -> Self {
        Self {
            tag,
            profile: tag.profile(),
            last_strategy: None,
            extra_excludes: Vec::new(),
            image_label_single: "[Uploaded image]".to_string(),
            image_label_multi: "[Uploaded images]".to_string(),
        }
    }

    pub fn for_host(hostname: &str) -> Self {
        Self::new(SiteTag::detect(hostname))
    }

    /// Also skip these selectors when walking message text.
    pub fn with_excluded(mut self, selectors: impl IntoIterator<Item = String>) -> Self {
        self.extra_excludes.extend(selectors);
        self
    }

    /// Override the anonymous-upload labels (localized strings).
    pub fn with_image_labels(mut self, single: &str, multi: &str) -> Self {
        self.image_label_single = single.to_string();
        self.image_label_multi = multi.to_string();
        self
    }

    pub fn tag(&self) -> SiteTag {
        self.tag
    }

    pub fn profile(&self) -> &'static SiteProfile {
        self.profile
    }

    pub fn last_strategy(&self) -> Option<usize> {
        self.last_strategy
    }

    /// Current user messages in document order. Tries the last successful
    /// strategy first, then the rest in priority order.
    pub fn message_elements<D: HostDom>(&mut self, dom: &mut D) -> Vec<NodeId> {
        let strategies = self.profile.strategies;
        let mut order: Vec<usize> = Vec::with_capacity(strategies.len());
        if let Some(cached) = self.last_strategy.filter(|i| *i < strategies.len()) {
            order.push(cached);
        }
        order.extend((0..strategies.len()).filter(|i| Some(*i) != self.last_strategy));

        for idx in order {
            let found = dom.query_all(strategies[idx]);
            if !found.is_empty() {
                if self.last_strategy != Some(idx) {
                    log::debug!(
                        "[SiteAdapter] {} strategy #{} matched {} messages",
                        self.tag.as_str(),
                        idx,
                        found.len()
                    );
                }
                self.last_strategy = Some(idx);
                return found;
            }
        }
        Vec::new()
    }

    /// The message's visual row (closest wrapper), or the node itself.
    pub fn row_of<D: HostDom>(&self, dom: &mut D, node: NodeId) -> NodeId {
        self.profile
            .row_wrapper
            .and_then(|sel| dom.closest(node, sel))
            .unwrap_or(node)
    }

    /// Full structured text of a message.
    pub fn extract_text<D: HostDom>(&self, dom: &mut D, node: NodeId) -> ExtractedText {
        if !dom.is_connected(node) {
            return ExtractedText::default();
        }
        let root = self
            .profile
            .turn_wrapper
            .and_then(|sel| dom.closest(node, sel))
            .unwrap_or(node);

        let attachments = self.collect_attachments(dom, root);

        let mut raw = String::new();
        self.walk_text(dom, root, &mut raw);
        let body = text::strip_narration(&raw);
        let body_lines = body
            .lines()
            .map(text::collapse_whitespace)
            .filter(|l| !l.is_empty())
            .collect();

        ExtractedText {
            attachments,
            body_lines,
        }
    }

    pub fn is_question(&self, text: &ExtractedText) -> bool {
        text::is_question(&text.body())
    }

    fn collect_attachments<D: HostDom>(&self, dom: &mut D, root: NodeId) -> Vec<String> {
        let mut image_uploads = 0usize;
        let mut names: Vec<String> = Vec::new();

        for selector in self.profile.file_selectors {
            for el in dom.query_within(root, selector) {
                let is_img = dom.tag_name(el).eq_ignore_ascii_case("IMG");
                let raw = if is_img {
                    dom.attribute(el, "alt").unwrap_or_default()
                } else {
                    dom.text_content(el)
                };
                let name = text::clean_file_name(&raw);
                let lower = name.to_lowercase();
                if is_img && (lower == "image" || lower.starts_with("image:")) {
                    image_uploads += 1;
                } else if !name.is_empty() && !names.contains(&name) {
                    names.push(name);
                }
            }
        }

        let mut parts = Vec::with_capacity(names.len() + 1);
        match image_uploads {
            0 => {}
            1 => parts.push(self.image_label_single.clone()),
            _ => parts.push(self.image_label_multi.clone()),
        }
        parts.extend(names.into_iter().map(|n| format!("[{}]", n)));
        parts
    }

    fn is_excluded<D: HostDom>(&self, dom: &mut D, el: NodeId) -> bool {
        self.profile
            .exclude_selectors
            .iter()
            .any(|sel| dom.matches(el, sel))
            || self.extra_excludes.iter().any(|sel| dom.matches(el, sel))
    }

    fn walk_text<D: HostDom>(&self, dom: &mut D, node: NodeId, out: &mut String) {
        for child in dom.children(node) {
            match child {
                ChildNode::Text(t) => out.push_str(&t),
                ChildNode::Element(el) => {
                    if self.is_excluded(dom, el) {
                        continue;
                    }
                    let tag = dom.tag_name(el).to_ascii_uppercase();
                    let block = BLOCK_TAGS.contains(&tag.as_str());
                    if block && !out.is_empty() && !out.ends_with('\n') {
                        out.push('\n');
                    }
                    self.walk_text(dom, el, out);
                    if block && !out.ends_with('\n') {
                        out.push('\n');
                    }
                }
            }
        }
    }
}
