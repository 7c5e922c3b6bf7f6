//! MessagingBridge: wire types for the extension message channel.
//!
//! The channel itself is opaque. Outbound traffic is fire-and-forget; a
//! missing receiver (popup closed) or a dead extension context is normal.

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// One discovered message as reported to the popup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSummary {
    pub id: String,
    pub text: String,
    pub position: f64,
    pub is_question: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "questionList")]
    QuestionList { questions: Vec<QuestionSummary> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundRequest {
    #[serde(rename = "scrollToQuestion")]
    ScrollToQuestion { position: f64 },
    #[serde(rename = "getQuestions")]
    GetQuestions,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundResponse {
    pub status: String,
}

impl InboundResponse {
    pub fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
        }
    }
}

/// Outbound half of the extension channel.
pub trait MessageChannel {
    fn send(&self, message: &OutboundMessage) -> Result<()>;
}

/// Send and swallow the expected failure kinds.
pub fn send_best_effort<C: MessageChannel>(channel: &C, message: &OutboundMessage) {
    if let Err(e) = channel.send(message) {
        if e.is_silent() {
            log::debug!("[Bridge] dropped outbound message: {}", e);
        } else {
            log::warn!("[Bridge] outbound message failed: {}", e);
        }
    }
}
