pub mod analysis_llm;
pub mod chat_llm;
pub mod history;
pub mod specialists_llm;

pub use analysis_llm::OpenAiAnalysisAdapter;
pub use chat_llm::OpenAiChatAdapter;
pub use history::FileHistoryStore;
pub use specialists_llm::OpenAiSpecialistAdapter;
