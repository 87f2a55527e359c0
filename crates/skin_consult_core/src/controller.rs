//! crates/skin_consult_core/src/controller.rs
//!
//! Orchestrates one user turn as an explicit two-phase commit: phase 1
//! appends the user's message synchronously and always succeeds, phase 2
//! appends the assistant's reply or records the failure. The fallible
//! gateway dispatch between the phases holds no reference to the store, so
//! callers can release their lock on it while the network call is pending.

use crate::domain::{derive_title, ImagePayload, Message};
use crate::ports::{ChatCompletionService, ImageAnalysisService, PortError, PortResult};
use crate::store::SessionStore;
use tracing::{error, warn};
use uuid::Uuid;

/// The fixed caption carried by every assistant reply on the image-analysis
/// path; the structured result rides alongside it.
pub const ANALYSIS_REPLY_CAPTION: &str =
    "I've analyzed the image. Here are the detailed findings.";

/// Where the controller is in the life of a turn. At most one turn may be
/// in flight; the send affordance is rejected while `Sending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Sending,
}

/// What `begin_turn` hands back for the gateway dispatch: the user message
/// just appended, plus a snapshot of the history as it was *before* it.
#[derive(Debug, Clone)]
pub struct PendingTurn {
    pub user_message: Message,
    pub history: Vec<Message>,
}

/// How a completed turn ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The assistant reply was appended.
    Completed,
    /// The gateway call failed; the user's message stays unanswered and
    /// the description is surfaced inline. Retry is manual.
    Failed(String),
    /// The session was deleted while the call was in flight, so the reply
    /// was dropped rather than applied elsewhere.
    Discarded,
}

/// Per-turn state machine: `Idle -> Sending -> Idle`.
pub struct ConversationController {
    turn: TurnState,
    last_error: Option<String>,
}

impl ConversationController {
    pub fn new() -> Self {
        Self {
            turn: TurnState::Idle,
            last_error: None,
        }
    }

    pub fn turn_state(&self) -> TurnState {
        self.turn
    }

    /// The most recent turn failure, cleared when the next turn begins.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Phase 1: validates the input, optimistically appends the user
    /// message and enters `Sending`.
    ///
    /// Returns `Ok(None)` when the text is blank and no image is attached;
    /// nothing is appended and no gateway call should be made. A turn
    /// already in flight is rejected with [`PortError::TurnInFlight`].
    /// The session's title is derived from this message iff it is the
    /// session's first.
    pub async fn begin_turn(
        &mut self,
        store: &mut SessionStore,
        session_id: Uuid,
        text: &str,
        image: Option<ImagePayload>,
    ) -> PortResult<Option<PendingTurn>> {
        if self.turn == TurnState::Sending {
            return Err(PortError::TurnInFlight);
        }
        if text.trim().is_empty() && image.is_none() {
            return Ok(None);
        }

        let session = store
            .session(session_id)
            .ok_or(PortError::SessionNotFound(session_id))?;
        let history = session.messages.clone();
        let title_override = history.is_empty().then(|| derive_title(text));

        let user_message = Message::user(text, image);
        let mut updated = history.clone();
        updated.push(user_message.clone());
        store
            .append_messages(session_id, updated, title_override)
            .await?;

        self.last_error = None;
        self.turn = TurnState::Sending;
        Ok(Some(PendingTurn {
            user_message,
            history,
        }))
    }

    /// Gateway dispatch: image attached means the analysis path, otherwise
    /// the chat path with the history *excluding* the new user message.
    ///
    /// Holds no store reference so it can run with all locks released.
    pub async fn resolve_reply(
        analysis: &dyn ImageAnalysisService,
        chat: &dyn ChatCompletionService,
        pending: &PendingTurn,
    ) -> PortResult<Message> {
        match &pending.user_message.image {
            Some(image) => {
                let result = analysis.analyze_image(image).await?;
                Ok(Message::assistant_analysis(ANALYSIS_REPLY_CAPTION, result))
            }
            None => {
                let reply = chat
                    .continue_chat(&pending.history, &pending.user_message.content)
                    .await?;
                Ok(Message::assistant(reply))
            }
        }
    }

    /// Phase 2: appends the assistant reply, or records the failure and
    /// leaves the user's message unanswered. Either way the controller
    /// returns to `Idle`.
    ///
    /// A reply whose session no longer exists is discarded, never applied
    /// to a different session.
    pub async fn complete_turn(
        &mut self,
        store: &mut SessionStore,
        session_id: Uuid,
        reply: PortResult<Message>,
    ) -> PortResult<TurnOutcome> {
        self.turn = TurnState::Idle;

        match reply {
            Ok(message) => {
                let Some(session) = store.session(session_id) else {
                    warn!("Discarding assistant reply for deleted session {session_id}");
                    return Ok(TurnOutcome::Discarded);
                };
                let mut messages = session.messages.clone();
                messages.push(message);
                store.append_messages(session_id, messages, None).await?;
                Ok(TurnOutcome::Completed)
            }
            Err(e) => {
                let description = e.to_string();
                error!("Turn failed: {description}");
                self.last_error = Some(description.clone());
                Ok(TurnOutcome::Failed(description))
            }
        }
    }
}

impl Default for ConversationController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Severity, SkinAnalysisResult};
    use crate::ports::HistoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct MemoryHistory {
        blob: Mutex<Option<Vec<u8>>>,
    }

    #[async_trait]
    impl HistoryStore for MemoryHistory {
        async fn load(&self) -> PortResult<Option<Vec<u8>>> {
            Ok(self.blob.lock().unwrap().clone())
        }

        async fn save(&self, bytes: &[u8]) -> PortResult<()> {
            *self.blob.lock().unwrap() = Some(bytes.to_vec());
            Ok(())
        }
    }

    struct FakeAnalysis {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl ImageAnalysisService for FakeAnalysis {
        async fn analyze_image(&self, _image: &ImagePayload) -> PortResult<SkinAnalysisResult> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PortError::Analysis("inference service unavailable".into()));
            }
            Ok(sample_analysis())
        }
    }

    struct FakeChat {
        reply: String,
        /// (history length, prompt) per call.
        calls: Mutex<Vec<(usize, String)>>,
    }

    #[async_trait]
    impl ChatCompletionService for FakeChat {
        async fn continue_chat(&self, history: &[Message], prompt: &str) -> PortResult<String> {
            self.calls
                .lock()
                .unwrap()
                .push((history.len(), prompt.to_string()));
            Ok(self.reply.clone())
        }
    }

    fn sample_analysis() -> SkinAnalysisResult {
        SkinAnalysisResult {
            condition_name: "Eczema".into(),
            confidence_score: 82.0,
            severity: Severity::Moderate,
            description: "Dry, inflamed patches consistent with atopic dermatitis.".into(),
            symptoms_observed: vec!["redness".into(), "scaling".into()],
            recommendations: vec!["avoid hot showers".into()],
            treatment_options: vec!["topical moisturizer".into()],
        }
    }

    fn sample_image() -> ImagePayload {
        ImagePayload {
            mime_type: "image/jpeg".into(),
            data: "aGVsbG8=".into(),
        }
    }

    async fn fresh_store() -> SessionStore {
        let history = Arc::new(MemoryHistory {
            blob: Mutex::new(None),
        });
        SessionStore::load(history).await.unwrap()
    }

    fn fakes() -> (FakeAnalysis, FakeChat) {
        (
            FakeAnalysis {
                calls: AtomicUsize::new(0),
                fail: false,
            },
            FakeChat {
                reply: "That is consistent with mild irritation.".into(),
                calls: Mutex::new(Vec::new()),
            },
        )
    }

    #[tokio::test]
    async fn blank_turn_is_a_noop() {
        let mut store = fresh_store().await;
        let session_id = store.current_id().unwrap();
        let mut controller = ConversationController::new();

        let pending = controller
            .begin_turn(&mut store, session_id, "   ", None)
            .await
            .unwrap();

        assert!(pending.is_none());
        assert!(store.session(session_id).unwrap().messages.is_empty());
        assert_eq!(controller.turn_state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn image_turn_appends_user_and_analysis_messages() {
        let mut store = fresh_store().await;
        let session_id = store.current_id().unwrap();
        let mut controller = ConversationController::new();
        let (analysis, chat) = fakes();

        let pending = controller
            .begin_turn(&mut store, session_id, "itchy red patch", Some(sample_image()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(controller.turn_state(), TurnState::Sending);

        let reply = ConversationController::resolve_reply(&analysis, &chat, &pending).await;
        let outcome = controller
            .complete_turn(&mut store, session_id, reply)
            .await
            .unwrap();

        assert_eq!(outcome, TurnOutcome::Completed);
        let session = store.session(session_id).unwrap();
        assert_eq!(session.title, "itchy red patch");
        assert_eq!(session.messages.len(), 2);
        assert!(session.messages[0].image.is_some());
        let analysis_result = session.messages[1].analysis.as_ref().unwrap();
        assert_eq!(analysis_result.condition_name, "Eczema");
        assert_eq!(controller.turn_state(), TurnState::Idle);
        assert!(controller.last_error().is_none());
        assert_eq!(chat.calls.lock().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn failed_analysis_leaves_the_user_message_unanswered() {
        let mut store = fresh_store().await;
        let session_id = store.current_id().unwrap();
        let mut controller = ConversationController::new();
        let analysis = FakeAnalysis {
            calls: AtomicUsize::new(0),
            fail: true,
        };
        let (_, chat) = fakes();

        let pending = controller
            .begin_turn(&mut store, session_id, "", Some(sample_image()))
            .await
            .unwrap()
            .unwrap();
        let reply = ConversationController::resolve_reply(&analysis, &chat, &pending).await;
        let outcome = controller
            .complete_turn(&mut store, session_id, reply)
            .await
            .unwrap();

        assert!(matches!(outcome, TurnOutcome::Failed(ref msg) if !msg.is_empty()));
        let session = store.session(session_id).unwrap();
        assert_eq!(session.messages.len(), 1);
        assert_eq!(session.title, "Image Analysis");
        assert_eq!(controller.turn_state(), TurnState::Idle);
        assert!(controller.last_error().is_some());
    }

    #[tokio::test]
    async fn text_turn_sends_prior_history_and_keeps_the_title() {
        let mut store = fresh_store().await;
        let session_id = store.current_id().unwrap();
        let mut controller = ConversationController::new();
        let (analysis, chat) = fakes();

        // First exchange.
        let pending = controller
            .begin_turn(&mut store, session_id, "itchy red patch", Some(sample_image()))
            .await
            .unwrap()
            .unwrap();
        let reply = ConversationController::resolve_reply(&analysis, &chat, &pending).await;
        controller
            .complete_turn(&mut store, session_id, reply)
            .await
            .unwrap();

        // Follow-up, text only.
        let pending = controller
            .begin_turn(&mut store, session_id, "Is it contagious?", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(pending.history.len(), 2);
        let reply = ConversationController::resolve_reply(&analysis, &chat, &pending).await;
        controller
            .complete_turn(&mut store, session_id, reply)
            .await
            .unwrap();

        let calls = chat.calls.lock().unwrap();
        assert_eq!(calls.as_slice(), &[(2, "Is it contagious?".to_string())]);
        let session = store.session(session_id).unwrap();
        assert_eq!(session.title, "itchy red patch");
        assert_eq!(session.messages.len(), 4);
        assert_eq!(analysis.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_second_turn_is_rejected_while_one_is_in_flight() {
        let mut store = fresh_store().await;
        let session_id = store.current_id().unwrap();
        let mut controller = ConversationController::new();

        controller
            .begin_turn(&mut store, session_id, "first", None)
            .await
            .unwrap()
            .unwrap();

        let err = controller
            .begin_turn(&mut store, session_id, "second", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::TurnInFlight));
    }

    #[tokio::test]
    async fn reply_for_a_deleted_session_is_discarded() {
        let mut store = fresh_store().await;
        let session_id = store.current_id().unwrap();
        let mut controller = ConversationController::new();

        controller
            .begin_turn(&mut store, session_id, "hello", None)
            .await
            .unwrap()
            .unwrap();

        // The session disappears while the call is in flight.
        store.delete_session(session_id).await.unwrap();

        let outcome = controller
            .complete_turn(
                &mut store,
                session_id,
                Ok(Message::assistant("too late")),
            )
            .await
            .unwrap();

        assert_eq!(outcome, TurnOutcome::Discarded);
        assert!(store
            .sessions()
            .iter()
            .all(|s| s.messages.is_empty()));
        assert_eq!(controller.turn_state(), TurnState::Idle);
    }
}
