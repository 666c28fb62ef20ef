pub mod analysis_llm;
pub mod chat_llm;
pub mod db;
pub mod export;
pub mod identity;

pub use analysis_llm::OpenAiAnalysisAdapter;
pub use chat_llm::OpenAiChatAdapter;
pub use db::DbAdapter;
pub use export::MarkdownExporter;
pub use identity::AccountIdentityProvider;
