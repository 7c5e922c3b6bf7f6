// witq-core/src/config.rs
//
// Tunables for the content script. Everything timing- or geometry-related
// lives here so tests can shrink or stretch it without touching the engine.

use serde::{Deserialize, Serialize};

use crate::error::{RailError, Result};

/// How a message id is anchored besides its text prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum IdScheme {
    /// `<prefix>-<rounded position in px>`; matches already persisted favorites.
    #[default]
    ContentPosition,
    /// `<prefix>-<ordinal index>`; survives layout shifts, breaks on inserts.
    ContentIndex,
}

/// Ids, classes and tags for everything we inject into the host page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InjectedNames {
    pub rail_id: String,
    pub marker_class: String,
    pub tooltip_class: String,
    pub star_class: String,
    pub favorite_class: String,
    pub question_class: String,
    pub visible_class: String,
    /// Attribute carrying the derived id on each marker.
    pub id_attribute: String,
}

impl Default for InjectedNames {
    fn default() -> Self {
        Self {
            rail_id: "question-scrollbar-container".to_string(),
            marker_class: "question-marker".to_string(),
            tooltip_class: "question-marker-tooltip".to_string(),
            star_class: "question-favorite-star".to_string(),
            favorite_class: "favorite".to_string(),
            question_class: "is-question".to_string(),
            visible_class: "visible".to_string(),
            id_attribute: "data-question-id".to_string(),
        }
    }
}

/// Content script configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RailConfig {
    // Scheduling (milliseconds)
    pub resize_debounce_ms: f64,
    pub mutation_debounce_ms: f64,
    /// Mutation debounce right after a navigation, while the host is still rendering.
    pub mutation_debounce_after_nav_ms: f64,
    /// How long after a navigation the shorter mutation debounce applies.
    pub nav_grace_ms: f64,
    pub min_interval_ms: f64,
    pub rerun_delay_ms: f64,
    pub initial_delay_ms: f64,
    /// Forced follow-up passes after a session change.
    pub warmup_delays_ms: Vec<f64>,

    // Scroll container
    pub container_cache_ttl_ms: f64,
    pub scrollable_epsilon_px: f64,
    pub window_margin_px: f64,
    pub element_margin_px: f64,

    // Tooltip
    pub tooltip_hide_delay_ms: f64,
    pub tooltip_edge_margin_px: f64,

    // Identity
    pub id_scheme: IdScheme,
    pub id_prefix_len: usize,
    pub jitter_threshold_px: f64,

    /// Character cap for the cached (fast) text; tooltips fetch the full text.
    pub fast_text_max_chars: usize,

    pub log_level: String,
    pub names: InjectedNames,
}

impl Default for RailConfig {
    fn default() -> Self {
        Self {
            resize_debounce_ms: 300.0,
            mutation_debounce_ms: 1200.0,
            mutation_debounce_after_nav_ms: 400.0,
            nav_grace_ms: 5000.0,
            min_interval_ms: 180.0,
            rerun_delay_ms: 50.0,
            initial_delay_ms: 1000.0,
            warmup_delays_ms: vec![150.0, 600.0, 1500.0],
            container_cache_ttl_ms: 500.0,
            scrollable_epsilon_px: 10.0,
            window_margin_px: 12.0,
            element_margin_px: 12.0,
            tooltip_hide_delay_ms: 200.0,
            tooltip_edge_margin_px: 8.0,
            id_scheme: IdScheme::ContentPosition,
            id_prefix_len: 20,
            jitter_threshold_px: 1.0,
            fast_text_max_chars: 280,
            log_level: "info".to_string(),
            names: InjectedNames::default(),
        }
    }
}

impl RailConfig {
    /// Reject values that would break scheduling or identity derivation.
    pub fn validate(&self) -> Result<()> {
        if self.id_prefix_len == 0 {
            return Err(RailError::Config("idPrefixLen must be > 0".into()));
        }
        if self.fast_text_max_chars == 0 {
            return Err(RailError::Config("fastTextMaxChars must be > 0".into()));
        }
        let timings = [
            ("resizeDebounceMs", self.resize_debounce_ms),
            ("mutationDebounceMs", self.mutation_debounce_ms),
            ("mutationDebounceAfterNavMs", self.mutation_debounce_after_nav_ms),
            ("navGraceMs", self.nav_grace_ms),
            ("minIntervalMs", self.min_interval_ms),
            ("rerunDelayMs", self.rerun_delay_ms),
            ("initialDelayMs", self.initial_delay_ms),
            ("containerCacheTtlMs", self.container_cache_ttl_ms),
            ("tooltipHideDelayMs", self.tooltip_hide_delay_ms),
        ];
        for (name, value) in timings {
            if !value.is_finite() || value < 0.0 {
                return Err(RailConfig::bad_timing(name, value));
            }
        }
        if self.warmup_delays_ms.iter().any(|d| !d.is_finite() || *d < 0.0) {
            return Err(RailError::Config("warmupDelaysMs must be non-negative".into()));
        }
        if self.jitter_threshold_px < 0.0 {
            return Err(RailError::Config("jitterThresholdPx must be >= 0".into()));
        }
        Ok(())
    }

    pub fn log_level_filter(&self) -> log::Level {
        match self.log_level.to_ascii_lowercase().as_str() {
            "trace" => log::Level::Trace,
            "debug" => log::Level::Debug,
            "warn" => log::Level::Warn,
            "error" => log::Level::Error,
            _ => log::Level::Info,
        }
    }

    fn bad_timing(name: &str, value: f64) -> RailError {
        RailError::Config(format!("{} must be a non-negative number, got {}", name, value))
    }
}
