pub mod answer_matching;
pub mod api;
pub mod config;
pub mod errors;
pub mod history;
pub mod llm_client;
pub mod models;
pub mod session_store;
pub mod study_service;

pub use config::Config;
pub use errors::ApiError;
pub use history::HistoryStore;
pub use llm_client::{LlmError, OpenRouterClient};
pub use models::*;
pub use session_store::McqSessionStore;
pub use study_service::StudyService;
