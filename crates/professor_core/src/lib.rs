pub mod analysis;
pub mod app;
pub mod auth;
pub mod chat;
pub mod domain;
pub mod history;
pub mod memory;
pub mod ports;
pub mod router;

#[cfg(test)]
pub(crate) mod test_support;

pub use analysis::{AnalysisError, AnalysisErrorKind, AnalysisPipeline};
pub use app::{AnalysisTicket, AppState, StudyApp};
pub use auth::{AuthGate, GuestIdentityProvider, IdentityFeed, IdentitySubscription, LoginNotice,
    SignInError, SignInErrorKind, SignInRequest};
pub use chat::{ChatEngine, ChatState, CloseOutcome, StreamEvent};
pub use domain::{AnalysisResult, AnalysisSession, AuthSession, Chapter, ChatMessage, ChatSession,
    Sender, Topic, User, UserCredentials};
pub use history::HistoryStore;
pub use memory::MemoryStorage;
pub use ports::{AccountRepository, ChatContext, ChatService, ChunkStream, Clock,
    ContentAnalysisService, DocumentExporter, IdentityProvider, KeyValueStorage, PortError,
    PortResult, SystemClock};
pub use router::{MainView, ResultsView, Screen, ViewRouter};
