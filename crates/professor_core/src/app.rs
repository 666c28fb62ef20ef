//! crates/professor_core/src/app.rs
//!
//! `StudyApp` is the explicit application-state object: it owns the router,
//! the history store, the chat engine, the analysis pipeline and the auth
//! gate, and exposes every user action as one method. Front-ends hold one
//! `StudyApp` and render `router()`; nothing here is global.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::analysis::{AnalysisError, AnalysisPipeline};
use crate::auth::{AuthGate, SignInRequest, SIGN_OUT_ERROR};
use crate::chat::ChatEngine;
use crate::domain::{AnalysisResult, User};
use crate::history::HistoryStore;
use crate::ports::{
    ChatService, Clock, ContentAnalysisService, DocumentExporter, IdentityProvider,
    KeyValueStorage,
};
use crate::router::{MainView, ViewRouter};

pub const EXPORT_ERROR: &str = "An unexpected error occurred while exporting the study guide.";

//=========================================================================================
// AppState (the service adapters, created once at startup)
//=========================================================================================

#[derive(Clone)]
pub struct AppState {
    pub analysis: Arc<dyn ContentAnalysisService>,
    pub chat: Arc<dyn ChatService>,
    pub storage: Arc<dyn KeyValueStorage>,
    pub identity: Arc<dyn IdentityProvider>,
    pub exporter: Arc<dyn DocumentExporter>,
    pub clock: Arc<dyn Clock>,
}

/// Identifies one analysis request. A ticket outlived by a reset is stale and
/// its result is dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisTicket {
    generation: u64,
    pub content_text: String,
}

//=========================================================================================
// StudyApp
//=========================================================================================

pub struct StudyApp {
    router: ViewRouter,
    history: HistoryStore,
    chat: ChatEngine,
    pipeline: Arc<AnalysisPipeline>,
    auth: AuthGate,
    exporter: Arc<dyn DocumentExporter>,
    clock: Arc<dyn Clock>,
    user: Option<User>,
    content_text: String,
    generation: u64,
    splash_min: Duration,
}

impl StudyApp {
    pub fn new(state: AppState, splash_min: Duration) -> Self {
        Self {
            router: ViewRouter::new(),
            history: HistoryStore::new(state.storage),
            chat: ChatEngine::new(state.chat),
            pipeline: Arc::new(AnalysisPipeline::new(state.analysis, state.clock.clone())),
            auth: AuthGate::new(state.identity),
            exporter: state.exporter,
            clock: state.clock,
            user: None,
            content_text: String::new(),
            generation: 0,
            splash_min,
        }
    }

    // --- Accessors ---

    pub fn router(&self) -> &ViewRouter {
        &self.router
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn chat(&self) -> &ChatEngine {
        &self.chat
    }

    /// The chat engine, for submitting and pumping the live stream.
    pub fn chat_mut(&mut self) -> &mut ChatEngine {
        &mut self.chat
    }

    pub fn user(&self) -> Option<&User> {
        self.user.as_ref()
    }

    pub fn content_text(&self) -> &str {
        &self.content_text
    }

    pub fn set_content_text(&mut self, text: impl Into<String>) {
        self.content_text = text.into();
    }

    pub fn pipeline(&self) -> Arc<AnalysisPipeline> {
        self.pipeline.clone()
    }

    pub fn allows_sign_out(&self) -> bool {
        self.auth.allows_sign_out()
    }

    // --- Startup and identity ---

    /// Shows the splash screen for at least the minimum duration while the
    /// identity is resolved, then moves on once both are done.
    pub async fn start(&mut self) {
        let splash = tokio::time::sleep(self.splash_min);
        let (_, restored) = tokio::join!(splash, self.auth.resolve());
        self.router.splash_elapsed();
        self.apply_identity(restored).await;
    }

    /// Applies every identity change the provider has already published.
    pub async fn sync_identity(&mut self) {
        while let Some(change) = self.auth.pending_change() {
            self.apply_identity(change).await;
        }
    }

    /// Waits for the provider to publish an identity change. Safe to cancel, so
    /// front-ends can race it against input; hand the change to `apply_identity`.
    /// Returns `None` once the provider has gone away.
    pub async fn next_identity_change(&mut self) -> Option<Option<User>> {
        self.auth.next_change().await
    }

    /// Makes `user` the active identity. Re-applying the current user is a no-op.
    pub async fn apply_identity(&mut self, user: Option<User>) {
        let same_user = match (&self.user, &user) {
            (Some(current), Some(next)) => current.uid == next.uid,
            (None, None) => self.router.screen() != &crate::router::Screen::Splash,
            _ => false,
        };
        if same_user {
            self.router.identity_changed(user.is_some());
            return;
        }

        // The open conversation belongs to whoever was signed in until now.
        self.close_chat().await;

        match user {
            Some(user) => {
                info!("Active user is now {}", user.uid);
                self.reset();
                self.history.load(&user.uid).await;
                self.user = Some(user);
                self.router.identity_changed(true);
            }
            None => {
                info!("Signed out; clearing user data.");
                self.reset();
                self.history.unload();
                self.user = None;
                self.router.identity_changed(false);
            }
        }
    }

    pub async fn sign_in(&mut self, request: SignInRequest) {
        self.router.set_login_notice(None);
        match self.auth.sign_in(request).await {
            Ok(user) => {
                self.apply_identity(Some(user)).await;
                self.sync_identity().await;
            }
            Err(e) => self.router.set_login_notice(e.notice()),
        }
    }

    pub async fn sign_out(&mut self) {
        if !self.auth.allows_sign_out() {
            return;
        }
        match self.auth.sign_out().await {
            Ok(()) => {
                self.apply_identity(None).await;
                self.sync_identity().await;
            }
            Err(_) => self.router.show_error(SIGN_OUT_ERROR),
        }
    }

    // --- Analysis ---

    /// Moves the main screen to Loading and hands out a ticket for the request.
    /// Returns `None` (after showing why, for blank input) when no request may start.
    pub fn begin_analysis(&mut self) -> Option<AnalysisTicket> {
        if self.content_text.trim().is_empty() {
            if self.router.main_view() == &MainView::Input {
                self.router.show_error(AnalysisError::EmptyInput.user_message());
            }
            return None;
        }
        if !self.router.begin_analysis() {
            debug!("Analysis refused: one is already running or the input is not showing.");
            return None;
        }
        self.generation += 1;
        Some(AnalysisTicket {
            generation: self.generation,
            content_text: self.content_text.clone(),
        })
    }

    /// Applies the outcome of a request. Results of stale tickets are dropped.
    pub async fn complete_analysis(
        &mut self,
        ticket: AnalysisTicket,
        outcome: Result<AnalysisResult, AnalysisError>,
    ) {
        if ticket.generation != self.generation || !self.router.is_loading() {
            debug!("Discarding result of a superseded analysis request.");
            return;
        }
        match outcome {
            Ok(result) => {
                self.pipeline
                    .record(&ticket.content_text, result.clone(), &mut self.history)
                    .await;
                self.router.analysis_succeeded(result);
            }
            Err(e) => {
                error!("Analysis failed: {}", e);
                self.router.analysis_failed(e.user_message());
            }
        }
    }

    /// Runs a whole analysis of the current content.
    pub async fn analyze(&mut self) {
        let Some(ticket) = self.begin_analysis() else {
            return;
        };
        let outcome = self.pipeline.analyze(&ticket.content_text).await;
        self.complete_analysis(ticket, outcome).await;
    }

    /// Back to an empty input. Any request still running becomes stale.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.content_text.clear();
        self.router.reset();
    }

    pub fn toggle_chapter(&mut self, index: usize) -> Option<bool> {
        self.router.results_mut()?.toggle_chapter(index)
    }

    /// Exports the result on screen. Returns where it was written.
    pub async fn export_result(&mut self) -> Option<String> {
        let MainView::Results(view) = self.router.main_view() else {
            return None;
        };
        match self.exporter.export(view.result()).await {
            Ok(location) => {
                info!("Study guide exported to {}", location);
                Some(location)
            }
            Err(e) => {
                error!("Error exporting study guide: {}", e);
                self.router.show_error(EXPORT_ERROR);
                None
            }
        }
    }

    // --- History ---

    pub fn show_history(&mut self) -> bool {
        self.router.show_history()
    }

    pub fn show_main(&mut self) -> bool {
        self.router.show_main()
    }

    /// Re-opens a past analysis together with its original text.
    pub fn select_history_item(&mut self, timestamp: i64) -> bool {
        let Some(session) = self.history.find_analysis(timestamp).cloned() else {
            return false;
        };
        self.generation += 1;
        self.content_text = session.content_text;
        self.router.show_results(session.analysis_result);
        true
    }

    pub async fn delete_history_item(&mut self, timestamp: i64) -> usize {
        self.history.remove_analysis(timestamp).await
    }

    pub async fn clear_history(&mut self) {
        self.history.clear_analyses().await;
    }

    pub async fn delete_chat_session(&mut self, timestamp: i64) -> usize {
        self.history.remove_chat(timestamp).await
    }

    // --- Chat ---

    pub async fn open_chat(&mut self) {
        self.chat.open().await;
    }

    /// Opens the chat with a question about text selected in the results.
    pub async fn ask_about(&mut self, selection: &str) -> bool {
        self.chat.ask_about(selection).await
    }

    /// Closes the chat, archiving a non-empty conversation.
    pub async fn close_chat(&mut self) {
        if let Some(session) = self.chat.close(self.clock.now_millis()) {
            self.history.append_chat(session).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{GuestIdentityProvider, IdentityFeed, IdentitySubscription, SignInError, GUEST_UID};
    use crate::memory::MemoryStorage;
    use crate::ports::{PortResult, IdentityProvider};
    use crate::router::Screen;
    use crate::test_support::{
        FixedClock, RecordingExporter, Reply, ScriptedAnalysis, ScriptedChat, NEWTON_JSON,
    };
    use async_trait::async_trait;

    /// A provider with two known accounts and no persisted session.
    #[derive(Default)]
    struct TwoUsers {
        feed: IdentityFeed,
    }

    fn user(uid: &str) -> User {
        User { uid: uid.to_string(), name: None, email: Some(format!("{}@example.com", uid)) }
    }

    #[async_trait]
    impl IdentityProvider for TwoUsers {
        async fn restore(&self) -> PortResult<Option<User>> {
            Ok(None)
        }

        async fn sign_in(&self, request: SignInRequest) -> Result<User, SignInError> {
            match request {
                SignInRequest::Password { email, .. } if email.is_empty() => Err(SignInError::canceled()),
                SignInRequest::Password { email, .. } => {
                    let user = user(email.trim_end_matches("@example.com"));
                    self.feed.publish(Some(user.clone()));
                    Ok(user)
                }
                _ => Err(SignInError::disabled("Phone")),
            }
        }

        async fn sign_out(&self) -> PortResult<()> {
            self.feed.publish(None);
            Ok(())
        }

        fn subscribe(&self) -> IdentitySubscription {
            self.feed.subscribe()
        }
    }

    struct Harness {
        app: StudyApp,
        analysis: Arc<ScriptedAnalysis>,
        clock: Arc<FixedClock>,
        exporter: Arc<RecordingExporter>,
    }

    fn harness(
        analysis: ScriptedAnalysis,
        identity: Arc<dyn IdentityProvider>,
        replies: Vec<Reply>,
        export_fails: bool,
    ) -> Harness {
        let analysis = Arc::new(analysis);
        let clock = Arc::new(FixedClock::new(1_000));
        let exporter = Arc::new(RecordingExporter::new(export_fails));
        let state = AppState {
            analysis: analysis.clone(),
            chat: Arc::new(ScriptedChat::new(replies)),
            storage: Arc::new(MemoryStorage::new()),
            identity,
            exporter: exporter.clone(),
            clock: clock.clone(),
        };
        Harness {
            app: StudyApp::new(state, Duration::from_millis(0)),
            analysis,
            clock,
            exporter,
        }
    }

    async fn guest_app(analysis: ScriptedAnalysis) -> Harness {
        let mut h = harness(analysis, Arc::new(GuestIdentityProvider::new()), vec![], false);
        h.app.start().await;
        h
    }

    #[tokio::test]
    async fn guest_mode_lands_on_main() {
        let h = guest_app(ScriptedAnalysis::responding(NEWTON_JSON)).await;
        assert_eq!(h.app.router().screen(), &Screen::Main);
        assert_eq!(h.app.user().unwrap().uid, GUEST_UID);
        assert_eq!(h.app.history().active_uid(), Some(GUEST_UID));
    }

    #[tokio::test(start_paused = true)]
    async fn splash_lasts_at_least_the_minimum() {
        let mut h = harness(
            ScriptedAnalysis::responding(NEWTON_JSON),
            Arc::new(GuestIdentityProvider::new()),
            vec![],
            false,
        );
        h.app.splash_min = Duration::from_millis(2500);
        let started = tokio::time::Instant::now();
        h.app.start().await;
        assert!(started.elapsed() >= Duration::from_millis(2500));
        assert_eq!(h.app.router().screen(), &Screen::Main);
    }

    #[tokio::test]
    async fn newton_scenario_expands_three_topics() {
        let mut h = guest_app(ScriptedAnalysis::responding(NEWTON_JSON)).await;
        h.app.set_content_text("Newton's laws...");
        h.app.analyze().await;

        assert_eq!(h.app.toggle_chapter(0), Some(true));
        let MainView::Results(view) = h.app.router().main_view() else {
            panic!("expected results");
        };
        assert_eq!(view.result().chapters.len(), 1);
        assert_eq!(view.visible_topics(0), vec!["First Law", "Second Law", "Third Law"]);

        let history = h.app.history().analyses();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content_text, "Newton's laws...");
        assert_eq!(history[0].timestamp, 1_000);
    }

    #[tokio::test]
    async fn quota_failure_shows_specific_message() {
        let mut h = guest_app(ScriptedAnalysis::failing("429 Too Many Requests: quota exceeded")).await;
        h.app.set_content_text("Some chapter");
        h.app.analyze().await;

        assert_eq!(
            h.app.router().main_view(),
            &MainView::Error(
                "The application has exceeded its API quota. Please try again later.".to_string()
            )
        );
        assert!(h.app.history().analyses().is_empty());

        h.app.reset();
        assert_eq!(h.app.router().main_view(), &MainView::Input);
        assert!(h.app.content_text().is_empty());
    }

    #[tokio::test]
    async fn blank_content_never_reaches_the_backend() {
        let mut h = guest_app(ScriptedAnalysis::responding(NEWTON_JSON)).await;
        h.app.set_content_text("   ");
        h.app.analyze().await;

        assert_eq!(h.analysis.calls(), 0);
        assert_eq!(
            h.app.router().main_view(),
            &MainView::Error("Please paste your content first.".to_string())
        );
    }

    #[tokio::test]
    async fn second_request_while_loading_is_refused() {
        let mut h = guest_app(ScriptedAnalysis::responding(NEWTON_JSON)).await;
        h.app.set_content_text("text");

        let first = h.app.begin_analysis().unwrap();
        assert!(h.app.begin_analysis().is_none());

        let outcome = h.app.pipeline().analyze(&first.content_text).await;
        h.app.complete_analysis(first, outcome).await;
        assert!(matches!(h.app.router().main_view(), MainView::Results(_)));
    }

    #[tokio::test]
    async fn result_arriving_after_reset_is_discarded() {
        let mut h = guest_app(ScriptedAnalysis::responding(NEWTON_JSON)).await;
        h.app.set_content_text("text");
        let ticket = h.app.begin_analysis().unwrap();
        let outcome = h.app.pipeline().analyze(&ticket.content_text).await;

        h.app.reset();
        h.app.complete_analysis(ticket, outcome).await;

        assert_eq!(h.app.router().main_view(), &MainView::Input);
        assert!(h.app.history().analyses().is_empty());
    }

    #[tokio::test]
    async fn history_selection_restores_text_and_result() {
        let mut h = guest_app(ScriptedAnalysis::responding(NEWTON_JSON)).await;
        h.app.set_content_text("Newton's laws...");
        h.app.analyze().await;
        h.app.reset();

        assert!(h.app.show_history());
        assert!(h.app.select_history_item(1_000));
        assert_eq!(h.app.router().screen(), &Screen::Main);
        assert_eq!(h.app.content_text(), "Newton's laws...");
        assert!(matches!(h.app.router().main_view(), MainView::Results(_)));

        assert!(!h.app.select_history_item(999));
        assert_eq!(h.app.delete_history_item(1_000).await, 1);
        assert!(h.app.history().analyses().is_empty());
    }

    #[tokio::test]
    async fn chat_is_archived_on_close_only_when_non_empty() {
        let mut h = harness(
            ScriptedAnalysis::responding(NEWTON_JSON),
            Arc::new(GuestIdentityProvider::new()),
            vec![Reply::Chunks(vec!["Gravity ", "is a force..."])],
            false,
        );
        h.app.start().await;

        h.app.open_chat().await;
        h.app.close_chat().await;
        assert!(h.app.history().chats().is_empty());

        h.app.open_chat().await;
        h.app.chat_mut().send("explain gravity").await;
        assert_eq!(h.app.chat().transcript().last().unwrap().text, "Gravity is a force...");

        h.clock.set(7_777);
        h.app.close_chat().await;
        let chats = h.app.history().chats();
        assert_eq!(chats.len(), 1);
        assert_eq!(chats[0].timestamp, 7_777);
    }

    #[tokio::test]
    async fn selecting_text_in_results_seeds_the_chat() {
        let mut h = guest_app(ScriptedAnalysis::responding(NEWTON_JSON)).await;
        assert!(h.app.ask_about("equal and opposite").await);
        assert!(h.app.chat().is_open());
        assert!(h.app.chat().input().contains("\"equal and opposite\""));
    }

    #[tokio::test]
    async fn export_reports_pass_and_fail() {
        let mut h = guest_app(ScriptedAnalysis::responding(NEWTON_JSON)).await;
        assert!(h.app.export_result().await.is_none());

        h.app.set_content_text("Newton");
        h.app.analyze().await;
        assert_eq!(h.app.export_result().await.as_deref(), Some("professor-ai-analysis.md"));
        assert_eq!(h.exporter.exported.lock().unwrap().len(), 1);

        let mut failing = harness(
            ScriptedAnalysis::responding(NEWTON_JSON),
            Arc::new(GuestIdentityProvider::new()),
            vec![],
            true,
        );
        failing.app.start().await;
        failing.app.set_content_text("Newton");
        failing.app.analyze().await;
        assert!(failing.app.export_result().await.is_none());
        assert_eq!(failing.app.router().main_view(), &MainView::Error(EXPORT_ERROR.to_string()));
    }

    #[tokio::test]
    async fn switching_users_keeps_histories_apart() {
        let mut h = harness(
            ScriptedAnalysis::responding(NEWTON_JSON),
            Arc::new(TwoUsers::default()),
            vec![],
            false,
        );
        h.app.start().await;
        assert_eq!(h.app.router().screen(), &Screen::Login);

        h.app
            .sign_in(SignInRequest::Password { email: "alice@example.com".into(), password: "pw".into() })
            .await;
        assert_eq!(h.app.router().screen(), &Screen::Main);
        h.app.set_content_text("Alice's physics notes");
        h.app.analyze().await;
        h.app.open_chat().await;
        h.app.chat_mut().send("hi").await;

        h.app.sign_out().await;
        assert_eq!(h.app.router().screen(), &Screen::Login);
        assert!(h.app.history().analyses().is_empty());

        h.app
            .sign_in(SignInRequest::Password { email: "bob@example.com".into(), password: "pw".into() })
            .await;
        assert_eq!(h.app.user().unwrap().uid, "bob");
        assert!(h.app.history().analyses().is_empty());
        assert!(h.app.history().chats().is_empty());

        h.app.sign_out().await;
        h.app
            .sign_in(SignInRequest::Password { email: "alice@example.com".into(), password: "pw".into() })
            .await;
        assert_eq!(h.app.history().analyses()[0].content_text, "Alice's physics notes");
        assert_eq!(h.app.history().chats().len(), 1);
    }

    #[tokio::test]
    async fn sign_in_failures_become_login_notices() {
        let mut h = harness(
            ScriptedAnalysis::responding(NEWTON_JSON),
            Arc::new(TwoUsers::default()),
            vec![],
            false,
        );
        h.app.start().await;

        h.app
            .sign_in(SignInRequest::Password { email: String::new(), password: String::new() })
            .await;
        assert!(h.app.router().login_notice().is_none());

        h.app
            .sign_in(SignInRequest::PhoneOtp { phone: "+15550100".into(), code: "123456".into() })
            .await;
        let notice = h.app.router().login_notice().unwrap();
        assert!(notice.blocking);
        assert_eq!(h.app.router().screen(), &Screen::Login);
    }

    #[tokio::test]
    async fn guest_cannot_sign_out() {
        let mut h = guest_app(ScriptedAnalysis::responding(NEWTON_JSON)).await;
        h.app.sign_out().await;
        assert_eq!(h.app.router().screen(), &Screen::Main);
        assert!(h.app.user().is_some());
    }
}
