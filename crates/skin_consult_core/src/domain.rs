//! crates/skin_consult_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any transport or storage concern, but they
//! derive `Serialize`/`Deserialize` because the whole session collection is
//! persisted as a single JSON blob and replayed at startup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The default title a session carries until its first user message names it.
pub const DEFAULT_SESSION_TITLE: &str = "New Consultation";

/// Title used when the first message of a session carries an image but no text.
pub const IMAGE_ONLY_TITLE: &str = "Image Analysis";

/// Maximum number of characters of the first user message kept as the title.
pub const TITLE_MAX_CHARS: usize = 30;

/// Clinical severity of a classified skin condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Mild,
    Moderate,
    Severe,
}

/// The structured diagnostic result returned by the image-analysis path.
/// Produced exactly once per analysis call and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkinAnalysisResult {
    pub condition_name: String,
    /// Model confidence in the classification, 0-100.
    pub confidence_score: f32,
    pub severity: Severity,
    pub description: String,
    pub symptoms_observed: Vec<String>,
    pub recommendations: Vec<String>,
    pub treatment_options: Vec<String>,
}

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// An encoded image attached to a user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImagePayload {
    /// MIME type of the original bytes, e.g. `image/jpeg`.
    pub mime_type: String,
    /// Base64 encoding of the raw image bytes.
    pub data: String,
}

/// A single chat message. Immutable once appended to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub role: Role,
    /// May be empty only when an image is attached.
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<ImagePayload>,
    /// Only ever present on an assistant message produced by the
    /// image-analysis path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis: Option<SkinAnalysisResult>,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Builds a user message carrying text and/or an attached image.
    pub fn user(content: impl Into<String>, image: Option<ImagePayload>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::User,
            content: content.into(),
            image,
            analysis: None,
            timestamp: Utc::now(),
        }
    }

    /// Builds a plain assistant reply.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: content.into(),
            image: None,
            analysis: None,
            timestamp: Utc::now(),
        }
    }

    /// Builds the assistant reply produced by the image-analysis path:
    /// a fixed caption with the structured result attached.
    pub fn assistant_analysis(content: impl Into<String>, analysis: SkinAnalysisResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            role: Role::Assistant,
            content: content.into(),
            image: None,
            analysis: Some(analysis),
            timestamp: Utc::now(),
        }
    }
}

/// One consultation: an ordered, append-only message history plus a label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: Uuid,
    pub title: String,
    /// Chronological insertion order, never reordered.
    pub messages: Vec<Message>,
    pub last_updated: DateTime<Utc>,
}

impl ChatSession {
    /// Creates an empty session with the default title.
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            title: DEFAULT_SESSION_TITLE.to_string(),
            messages: Vec::new(),
            last_updated: Utc::now(),
        }
    }
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Derives a session title from the first user message of a session.
///
/// The leading text wins, truncated to [`TITLE_MAX_CHARS`]; a message that
/// carries only an image falls back to [`IMAGE_ONLY_TITLE`].
pub fn derive_title(first_message_text: &str) -> String {
    let trimmed = first_message_text.trim();
    if trimmed.is_empty() {
        IMAGE_ONLY_TITLE.to_string()
    } else {
        trimmed.chars().take(TITLE_MAX_CHARS).collect()
    }
}

/// A nearby specialist returned by the lookup. All fields are display
/// strings exactly as received; the list order is preserved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dermatologist {
    pub name: String,
    pub clinic_name: String,
    pub address: String,
    pub phone: String,
    pub rating: String,
    pub distance: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derive_title_truncates_to_thirty_chars() {
        let text = "a very long first message that keeps going well past the limit";
        let title = derive_title(text);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS);
        assert!(text.starts_with(&title));
    }

    #[test]
    fn derive_title_falls_back_for_image_only_messages() {
        assert_eq!(derive_title(""), IMAGE_ONLY_TITLE);
        assert_eq!(derive_title("   "), IMAGE_ONLY_TITLE);
    }

    #[test]
    fn severity_serializes_as_display_strings() {
        assert_eq!(
            serde_json::to_string(&Severity::Moderate).unwrap(),
            "\"Moderate\""
        );
        let parsed: Severity = serde_json::from_str("\"Severe\"").unwrap();
        assert_eq!(parsed, Severity::Severe);
    }
}
