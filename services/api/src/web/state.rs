//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use skin_consult_core::controller::ConversationController;
use skin_consult_core::ports::{
    ChatCompletionService, ImageAnalysisService, SpecialistFinderService,
};
use skin_consult_core::store::SessionStore;
use std::sync::Arc;
use tokio::sync::Mutex;

//=========================================================================================
// ConsultationState (the session store + turn state machine)
//=========================================================================================

/// The mutable heart of the application: the session collection and the
/// per-turn state machine. Both live behind one lock; the gateway call of a
/// turn runs with the lock released so unrelated requests stay responsive.
pub struct ConsultationState {
    pub store: SessionStore,
    pub controller: ConversationController,
}

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub consultation: Arc<Mutex<ConsultationState>>,
    pub analysis_adapter: Arc<dyn ImageAnalysisService>,
    pub chat_adapter: Arc<dyn ChatCompletionService>,
    pub specialist_adapter: Arc<dyn SpecialistFinderService>,
    pub config: Arc<Config>,
}
