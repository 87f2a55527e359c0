//! crates/skin_consult_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like the inference
//! service or the durable history slot.

use crate::domain::{Dermatologist, ImagePayload, Message, SkinAnalysisResult};
use async_trait::async_trait;
use uuid::Uuid;

//=========================================================================================
// Port Error and Result Types
//=========================================================================================

/// The error taxonomy shared by all port operations. Every variant is
/// terminal for the triggering operation only and never corrupts session
/// state; callers surface the message and return to a ready state.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),
    #[error("A turn is already in flight for this consultation")]
    TurnInFlight,
    #[error("Image analysis failed: {0}")]
    Analysis(String),
    #[error("Chat completion failed: {0}")]
    Chat(String),
    #[error("Specialist lookup failed: {0}")]
    Location(String),
    #[error("History store error: {0}")]
    Storage(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

/// The one durable slot the session collection is persisted to: written
/// after every mutation, read once at startup. Narrow by design so tests
/// can swap in an in-memory fake.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Returns the stored blob, or `None` if nothing has been saved yet.
    async fn load(&self) -> PortResult<Option<Vec<u8>>>;
    /// Overwrites the slot with the given blob.
    async fn save(&self, bytes: &[u8]) -> PortResult<()>;
}

#[async_trait]
pub trait ImageAnalysisService: Send + Sync {
    /// Classifies a skin-condition image into a structured diagnostic result.
    async fn analyze_image(&self, image: &ImagePayload) -> PortResult<SkinAnalysisResult>;
}

#[async_trait]
pub trait ChatCompletionService: Send + Sync {
    /// Continues a consultation: the prior turns plus the new user text,
    /// returning the assistant's reply text.
    async fn continue_chat(&self, history: &[Message], prompt: &str) -> PortResult<String>;
}

#[async_trait]
pub trait SpecialistFinderService: Send + Sync {
    /// Looks up dermatologists near the given coordinates. The returned
    /// order is the order received from the lookup, not re-sorted.
    async fn find_specialists(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> PortResult<Vec<Dermatologist>>;
}
