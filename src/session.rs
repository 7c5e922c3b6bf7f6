//! Session (conversation) change detection.
//!
//! Chat hosts are single-page apps: switching conversation rewrites the URL
//! without a page load. Markers from the previous conversation are
//! meaningless afterwards, so a changed location means a full reset.

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionChange {
    /// First observation; nothing to reset.
    First,
    Unchanged,
    Changed { from: String, to: String },
}

#[derive(Debug)]
pub struct SessionWatch {
    last_location: Option<String>,
    last_change_at: Option<f64>,
    grace_ms: f64,
}

impl SessionWatch {
    pub fn new(grace_ms: f64) -> Self {
        Self {
            last_location: None,
            last_change_at: None,
            grace_ms,
        }
    }

    /// Location key for a URL: fragments don't change the conversation.
    pub fn normalize(href: &str) -> &str {
        href.split('#').next().unwrap_or(href)
    }

    pub fn observe(&mut self, href: &str, now: f64) -> SessionChange {
        let current = Self::normalize(href).to_string();
        match self.last_location.replace(current.clone()) {
            None => SessionChange::First,
            Some(prev) if prev == current => SessionChange::Unchanged,
            Some(prev) => {
                self.last_change_at = Some(now);
                SessionChange::Changed {
                    from: prev,
                    to: current,
                }
            }
        }
    }

    /// Mark a navigation signal (history hook, popstate) without comparing.
    pub fn note_navigation(&mut self, now: f64) {
        self.last_change_at = Some(now);
    }

    /// Within the grace window after the last change.
    pub fn recently_changed(&self, now: f64) -> bool {
        self.last_change_at
            .map(|t| now - t < self.grace_ms)
            .unwrap_or(false)
    }

    pub fn last_location(&self) -> Option<&str> {
        self.last_location.as_deref()
    }
}
