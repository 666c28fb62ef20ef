//! crates/professor_core/src/router.rs
//!
//! The view router: which screen is showing, and what the main screen is doing.

use std::time::Duration;
use tracing::debug;

use crate::auth::LoginNotice;
use crate::domain::AnalysisResult;

/// The splash screen stays up at least this long, however fast sign-in resolves.
pub const SPLASH_MIN_DURATION: Duration = Duration::from_millis(2500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Splash,
    Login,
    Main,
    History,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MainView {
    Input,
    Loading,
    Results(ResultsView),
    Error(String),
}

//=========================================================================================
// ResultsView (chapter accordion)
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsView {
    result: AnalysisResult,
    expanded: Vec<bool>,
}

impl ResultsView {
    /// All chapters start collapsed.
    pub fn new(result: AnalysisResult) -> Self {
        let expanded = vec![false; result.chapters.len()];
        Self { result, expanded }
    }

    pub fn result(&self) -> &AnalysisResult {
        &self.result
    }

    /// Expands or collapses a chapter. Returns its new state, or `None` for a bad index.
    pub fn toggle_chapter(&mut self, index: usize) -> Option<bool> {
        let open = self.expanded.get_mut(index)?;
        *open = !*open;
        Some(*open)
    }

    pub fn is_expanded(&self, index: usize) -> bool {
        self.expanded.get(index).copied().unwrap_or(false)
    }

    /// Topic titles of an expanded chapter; empty while collapsed.
    pub fn visible_topics(&self, index: usize) -> Vec<&str> {
        if !self.is_expanded(index) {
            return Vec::new();
        }
        self.result.chapters[index]
            .topics
            .iter()
            .map(|t| t.title.as_str())
            .collect()
    }
}

//=========================================================================================
// ViewRouter
//=========================================================================================

#[derive(Debug)]
pub struct ViewRouter {
    screen: Screen,
    main: MainView,
    login_notice: Option<LoginNotice>,
    splash_elapsed: bool,
    // None until the identity provider has answered at least once.
    signed_in: Option<bool>,
}

impl Default for ViewRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ViewRouter {
    pub fn new() -> Self {
        Self {
            screen: Screen::Splash,
            main: MainView::Input,
            login_notice: None,
            splash_elapsed: false,
            signed_in: None,
        }
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    pub fn main_view(&self) -> &MainView {
        &self.main
    }

    pub fn results_mut(&mut self) -> Option<&mut ResultsView> {
        match &mut self.main {
            MainView::Results(view) => Some(view),
            _ => None,
        }
    }

    pub fn login_notice(&self) -> Option<&LoginNotice> {
        self.login_notice.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.main == MainView::Loading
    }

    // --- Splash and identity ---

    pub fn splash_elapsed(&mut self) {
        self.splash_elapsed = true;
        self.leave_splash_if_ready();
    }

    /// Records the outcome of identity resolution or a later identity change.
    pub fn identity_changed(&mut self, signed_in: bool) {
        self.signed_in = Some(signed_in);
        match self.screen {
            Screen::Splash => self.leave_splash_if_ready(),
            Screen::Login if signed_in => {
                self.login_notice = None;
                self.go(Screen::Main);
            }
            Screen::Main | Screen::History if !signed_in => {
                self.main = MainView::Input;
                self.go(Screen::Login);
            }
            _ => {}
        }
    }

    fn leave_splash_if_ready(&mut self) {
        if self.screen != Screen::Splash || !self.splash_elapsed {
            return;
        }
        match self.signed_in {
            Some(true) => self.go(Screen::Main),
            Some(false) => self.go(Screen::Login),
            None => {}
        }
    }

    pub fn set_login_notice(&mut self, notice: Option<LoginNotice>) {
        self.login_notice = notice;
    }

    // --- Main <-> History ---

    pub fn show_history(&mut self) -> bool {
        if self.screen != Screen::Main {
            return false;
        }
        self.go(Screen::History);
        true
    }

    pub fn show_main(&mut self) -> bool {
        if self.screen != Screen::History {
            return false;
        }
        self.go(Screen::Main);
        true
    }

    // --- Inside Main ---

    /// Moves Input to Loading. Refused anywhere else, which is what keeps at
    /// most one analysis in flight.
    pub fn begin_analysis(&mut self) -> bool {
        if self.screen != Screen::Main || self.main != MainView::Input {
            return false;
        }
        self.main = MainView::Loading;
        true
    }

    pub fn analysis_succeeded(&mut self, result: AnalysisResult) {
        if self.main == MainView::Loading {
            self.main = MainView::Results(ResultsView::new(result));
        }
    }

    pub fn analysis_failed(&mut self, message: impl Into<String>) {
        if self.main == MainView::Loading {
            self.main = MainView::Error(message.into());
        }
    }

    /// Shows an error on the main screen regardless of its current view.
    pub fn show_error(&mut self, message: impl Into<String>) {
        self.main = MainView::Error(message.into());
        if self.screen == Screen::History {
            self.go(Screen::Main);
        }
    }

    /// Opens a past result (from history) on the main screen.
    pub fn show_results(&mut self, result: AnalysisResult) {
        self.main = MainView::Results(ResultsView::new(result));
        if self.screen == Screen::History {
            self.go(Screen::Main);
        }
    }

    /// Back to an empty input from any state.
    pub fn reset(&mut self) {
        self.main = MainView::Input;
        if self.screen == Screen::History {
            self.go(Screen::Main);
        }
    }

    fn go(&mut self, screen: Screen) {
        debug!("Screen {:?} -> {:?}", self.screen, screen);
        self.screen = screen;
    }
}
