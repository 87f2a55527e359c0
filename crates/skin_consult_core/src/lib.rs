pub mod controller;
pub mod domain;
pub mod ports;
pub mod store;

pub use controller::{ConversationController, PendingTurn, TurnOutcome, TurnState};
pub use domain::{
    ChatSession, Dermatologist, ImagePayload, Message, Role, Severity, SkinAnalysisResult,
};
pub use ports::{
    ChatCompletionService, HistoryStore, ImageAnalysisService, PortError, PortResult,
    SpecialistFinderService,
};
pub use store::SessionStore;
