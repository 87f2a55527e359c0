//! crates/skin_consult_core/src/store.rs
//!
//! The in-memory collection of chat sessions and its persistence contract.
//! Every mutating operation rewrites the whole collection through the
//! `HistoryStore` port; the blob is read back exactly once at startup.

use crate::domain::{ChatSession, Message};
use crate::ports::{HistoryStore, PortError, PortResult};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Owns the session collection and the current-session selection.
///
/// Sessions are kept most-recently-created first. Whenever at least one
/// session exists, exactly one of them is selected as current; the
/// operations below maintain that invariant on every path.
pub struct SessionStore {
    sessions: Vec<ChatSession>,
    current_id: Option<Uuid>,
    history: Arc<dyn HistoryStore>,
}

impl SessionStore {
    /// Restores the store from the persisted blob.
    ///
    /// An absent or empty blob yields a single fresh session. A blob that
    /// fails to parse is treated the same way: the corrupt contents are
    /// abandoned with a warning rather than propagated, so a damaged slot
    /// can never wedge startup.
    pub async fn load(history: Arc<dyn HistoryStore>) -> PortResult<Self> {
        let sessions = match history.load().await? {
            Some(bytes) if !bytes.is_empty() => {
                match serde_json::from_slice::<Vec<ChatSession>>(&bytes) {
                    Ok(sessions) => sessions,
                    Err(e) => {
                        warn!("Persisted session history is malformed, starting fresh: {e}");
                        Vec::new()
                    }
                }
            }
            _ => Vec::new(),
        };

        let mut store = Self {
            current_id: sessions.first().map(|s| s.id),
            sessions,
            history,
        };

        if store.sessions.is_empty() {
            store.create_session().await?;
        }

        Ok(store)
    }

    /// All sessions, most-recently-created first.
    pub fn sessions(&self) -> &[ChatSession] {
        &self.sessions
    }

    pub fn current_id(&self) -> Option<Uuid> {
        self.current_id
    }

    /// The currently selected session, if any exist.
    pub fn current(&self) -> Option<&ChatSession> {
        self.current_id.and_then(|id| self.session(id))
    }

    pub fn session(&self, id: Uuid) -> Option<&ChatSession> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Creates a fresh empty session at the front of the list and selects it.
    pub async fn create_session(&mut self) -> PortResult<ChatSession> {
        let session = ChatSession::new();
        info!("Created new consultation session {}", session.id);
        self.sessions.insert(0, session.clone());
        self.current_id = Some(session.id);
        self.persist().await?;
        Ok(session)
    }

    /// Selects the session with the given id as current.
    ///
    /// The source of this behavior silently ignored unknown ids; here an
    /// unknown id is an explicit error so callers can surface it.
    pub fn select_session(&mut self, id: Uuid) -> PortResult<()> {
        if self.session(id).is_none() {
            return Err(PortError::SessionNotFound(id));
        }
        self.current_id = Some(id);
        Ok(())
    }

    /// Deletes a session. If it was current, the new front of the list is
    /// selected; if the deletion emptied the list, a brand-new empty
    /// session is synthesized and selected, so the collection is never
    /// left empty by a delete.
    pub async fn delete_session(&mut self, id: Uuid) -> PortResult<()> {
        let before = self.sessions.len();
        self.sessions.retain(|s| s.id != id);
        if self.sessions.len() == before {
            return Err(PortError::SessionNotFound(id));
        }
        info!("Deleted consultation session {id}");

        if self.current_id == Some(id) {
            match self.sessions.first() {
                Some(front) => self.current_id = Some(front.id),
                None => {
                    let replacement = ChatSession::new();
                    self.current_id = Some(replacement.id);
                    self.sessions.push(replacement);
                }
            }
        }

        self.persist().await
    }

    /// Replaces a session's message list and bumps its `last_updated`.
    ///
    /// Callers always pass the full prior list plus the new tail, never a
    /// delta. The title override is applied only when provided and
    /// non-empty, which in practice happens exactly once: on a session's
    /// first message.
    pub async fn append_messages(
        &mut self,
        id: Uuid,
        messages: Vec<Message>,
        title_override: Option<String>,
    ) -> PortResult<()> {
        let session = self
            .sessions
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or(PortError::SessionNotFound(id))?;

        session.messages = messages;
        if let Some(title) = title_override.filter(|t| !t.is_empty()) {
            session.title = title;
        }
        session.last_updated = chrono::Utc::now();

        self.persist().await
    }

    /// Serializes the whole collection into the single durable slot.
    async fn persist(&self) -> PortResult<()> {
        let bytes = serde_json::to_vec(&self.sessions)
            .map_err(|e| PortError::Storage(e.to_string()))?;
        self.history.save(&bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DEFAULT_SESSION_TITLE;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// An in-memory stand-in for the durable slot.
    struct MemoryHistory {
        blob: Mutex<Option<Vec<u8>>>,
    }

    impl MemoryHistory {
        fn empty() -> Arc<Self> {
            Arc::new(Self {
                blob: Mutex::new(None),
            })
        }

        fn seeded(bytes: &[u8]) -> Arc<Self> {
            Arc::new(Self {
                blob: Mutex::new(Some(bytes.to_vec())),
            })
        }
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

    #[tokio::test]
    async fn load_without_history_creates_one_selected_session() {
        let store = SessionStore::load(MemoryHistory::empty()).await.unwrap();
        assert_eq!(store.sessions().len(), 1);
        assert_eq!(store.current().unwrap().title, DEFAULT_SESSION_TITLE);
        assert_eq!(store.current_id(), Some(store.sessions()[0].id));
    }

    #[tokio::test]
    async fn load_with_corrupt_history_starts_fresh() {
        let store = SessionStore::load(MemoryHistory::seeded(b"{not json"))
            .await
            .unwrap();
        assert_eq!(store.sessions().len(), 1);
        assert!(store.current().is_some());
    }

    #[tokio::test]
    async fn created_sessions_are_listed_most_recent_first() {
        let mut store = SessionStore::load(MemoryHistory::empty()).await.unwrap();
        let second = store.create_session().await.unwrap();
        let third = store.create_session().await.unwrap();
        assert_eq!(store.sessions().len(), 3);
        assert_eq!(store.sessions()[0].id, third.id);
        assert_eq!(store.sessions()[1].id, second.id);
        assert_eq!(store.current_id(), Some(third.id));
    }

    #[tokio::test]
    async fn select_unknown_session_is_an_error() {
        let mut store = SessionStore::load(MemoryHistory::empty()).await.unwrap();
        let err = store.select_session(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, PortError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn deleting_the_current_session_selects_the_new_front() {
        let mut store = SessionStore::load(MemoryHistory::empty()).await.unwrap();
        let kept = store.sessions()[0].id;
        let newest = store.create_session().await.unwrap();

        store.delete_session(newest.id).await.unwrap();
        assert_eq!(store.sessions().len(), 1);
        assert_eq!(store.current_id(), Some(kept));
    }

    #[tokio::test]
    async fn deleting_the_last_session_synthesizes_a_replacement() {
        let mut store = SessionStore::load(MemoryHistory::empty()).await.unwrap();
        let only = store.sessions()[0].id;

        store.delete_session(only).await.unwrap();
        assert_eq!(store.sessions().len(), 1);
        let replacement = store.current().unwrap();
        assert_ne!(replacement.id, only);
        assert!(replacement.messages.is_empty());
    }

    #[tokio::test]
    async fn append_sets_title_only_when_an_override_is_given() {
        let mut store = SessionStore::load(MemoryHistory::empty()).await.unwrap();
        let id = store.current_id().unwrap();

        let first = Message::user("itchy red patch on my arm", None);
        store
            .append_messages(id, vec![first.clone()], Some("itchy red patch on my arm".into()))
            .await
            .unwrap();
        assert_eq!(store.session(id).unwrap().title, "itchy red patch on my arm");

        let mut messages = store.session(id).unwrap().messages.clone();
        messages.push(Message::assistant("It sounds like mild eczema."));
        store.append_messages(id, messages, None).await.unwrap();

        let session = store.session(id).unwrap();
        assert_eq!(session.title, "itchy red patch on my arm");
        assert_eq!(session.messages.len(), 2);
        assert_eq!(session.messages[0].id, first.id);
    }

    #[tokio::test]
    async fn persisted_collection_round_trips_identically() {
        let history = MemoryHistory::empty();
        let mut store = SessionStore::load(history.clone()).await.unwrap();
        let id = store.current_id().unwrap();
        store
            .append_messages(
                id,
                vec![Message::user("hello", None), Message::assistant("hi!")],
                Some("hello".into()),
            )
            .await
            .unwrap();
        store.create_session().await.unwrap();
        let saved = store.sessions().to_vec();

        let reloaded = SessionStore::load(history).await.unwrap();
        assert_eq!(reloaded.sessions(), saved.as_slice());
        assert_eq!(reloaded.current_id(), Some(saved[0].id));
    }
}
