//! crates/professor_core/src/auth.rs
//!
//! The auth/session gate. It turns whatever identity provider is configured
//! into "who is the active user", publishes identity changes to subscribers,
//! and sorts sign-in failures into the fixed set of notices the login screen
//! knows how to show.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::domain::User;
use crate::ports::{IdentityProvider, PortResult};

//=========================================================================================
// Identity change feed
//=========================================================================================

const FEED_CAPACITY: usize = 16;

/// Publishes identity changes (`Some(user)` on sign-in, `None` on sign-out).
#[derive(Debug, Clone)]
pub struct IdentityFeed {
    sender: broadcast::Sender<Option<User>>,
}

impl Default for IdentityFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl IdentityFeed {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(FEED_CAPACITY);
        Self { sender }
    }

    pub fn publish(&self, user: Option<User>) {
        // No subscribers is fine; nobody is waiting for the change.
        let _ = self.sender.send(user);
    }

    pub fn subscribe(&self) -> IdentitySubscription {
        IdentitySubscription { receiver: self.sender.subscribe() }
    }
}

/// A live subscription. Dropping it unsubscribes.
#[derive(Debug)]
pub struct IdentitySubscription {
    receiver: broadcast::Receiver<Option<User>>,
}

impl IdentitySubscription {
    /// Waits for the next change. Returns `None` once the feed is gone.
    pub async fn next(&mut self) -> Option<Option<User>> {
        loop {
            match self.receiver.recv().await {
                Ok(change) => return Some(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Identity subscriber lagged; skipped {} changes.", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Returns a change that is already waiting, if any.
    pub fn try_next(&mut self) -> Option<Option<User>> {
        loop {
            match self.receiver.try_recv() {
                Ok(change) => return Some(change),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    warn!("Identity subscriber lagged; skipped {} changes.", skipped);
                }
                Err(_) => return None,
            }
        }
    }
}

//=========================================================================================
// Sign-in requests and failures
//=========================================================================================

/// Every way a user can sign in. All of them end in the same identity change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignInRequest {
    /// The provider's primary interactive method.
    Password { email: String, password: String },
    /// Creates an account, then signs in with it.
    SignUp { name: Option<String>, email: String, password: String },
    /// Completes a sign-in link previously mailed to `email`.
    EmailLink { email: String, link: String },
    /// Completes a one-time-code challenge sent to `phone`.
    PhoneOtp { phone: String, code: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignInErrorKind {
    /// The user backed out. Never shown.
    UserCanceled,
    /// The method is switched off; retrying cannot help.
    ProviderDisabled,
    EnvironmentUnsupported,
    PopupBlocked,
    Unknown,
}

impl SignInErrorKind {
    /// Maps a provider error code onto the taxonomy.
    pub fn from_provider_code(code: &str) -> Self {
        match code {
            "auth/popup-closed-by-user" | "auth/cancelled-popup-request" => Self::UserCanceled,
            "auth/operation-not-allowed" => Self::ProviderDisabled,
            "auth/operation-not-supported-in-this-environment" => Self::EnvironmentUnsupported,
            "auth/popup-blocked" => Self::PopupBlocked,
            _ => Self::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Sign-in failed ({kind:?}): {detail}")]
pub struct SignInError {
    pub kind: SignInErrorKind,
    /// Safe to show the user. Empty when there is nothing useful to add.
    pub detail: String,
}

impl SignInError {
    pub fn new(kind: SignInErrorKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }

    pub fn canceled() -> Self {
        Self::new(SignInErrorKind::UserCanceled, "")
    }

    pub fn disabled(method: &str) -> Self {
        Self::new(
            SignInErrorKind::ProviderDisabled,
            format!("{} sign-in is not enabled", method),
        )
    }

    /// What the login screen shows, or `None` for a silent cancel.
    pub fn notice(&self) -> Option<LoginNotice> {
        let (message, blocking) = match self.kind {
            SignInErrorKind::UserCanceled => return None,
            SignInErrorKind::ProviderDisabled => (
                format!(
                    "{}. The site owner needs to enable it in the identity provider settings.",
                    if self.detail.is_empty() {
                        "This sign-in method is not enabled"
                    } else {
                        self.detail.as_str()
                    }
                ),
                true,
            ),
            SignInErrorKind::EnvironmentUnsupported => (
                "Authentication is not supported in this environment. Please try again from an interactive session.".to_string(),
                false,
            ),
            SignInErrorKind::PopupBlocked => (
                "The sign-in popup was blocked. Please allow popups for this site.".to_string(),
                false,
            ),
            SignInErrorKind::Unknown if !self.detail.is_empty() => {
                (format!("Sign-in failed: {}", self.detail), false)
            }
            SignInErrorKind::Unknown => {
                ("An unexpected error occurred during sign-in.".to_string(), false)
            }
        };
        Some(LoginNotice { message, blocking })
    }
}

/// A message on the login screen. A blocking notice disables further attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginNotice {
    pub message: String,
    pub blocking: bool,
}

pub const SIGN_OUT_ERROR: &str = "An error occurred during sign-out.";

//=========================================================================================
// AuthGate
//=========================================================================================

pub struct AuthGate {
    provider: Arc<dyn IdentityProvider>,
    subscription: IdentitySubscription,
}

impl AuthGate {
    pub fn new(provider: Arc<dyn IdentityProvider>) -> Self {
        let subscription = provider.subscribe();
        Self { provider, subscription }
    }

    /// Resolves the identity present at startup. Failures count as signed out.
    pub async fn resolve(&self) -> Option<User> {
        match self.provider.restore().await {
            Ok(user) => {
                info!("Identity resolved: {}", user.as_ref().map_or("signed out", |u| u.uid.as_str()));
                user
            }
            Err(e) => {
                error!("Failed to restore identity: {}", e);
                None
            }
        }
    }

    pub async fn sign_in(&self, request: SignInRequest) -> Result<User, SignInError> {
        self.provider.sign_in(request).await.map_err(|e| {
            match e.kind {
                SignInErrorKind::UserCanceled => info!("Sign-in canceled by user."),
                _ => error!("Sign-in failed: {}", e),
            }
            e
        })
    }

    pub async fn sign_out(&self) -> PortResult<()> {
        self.provider.sign_out().await.map_err(|e| {
            error!("Sign-out failed: {}", e);
            e
        })
    }

    pub fn allows_sign_out(&self) -> bool {
        self.provider.allows_sign_out()
    }

    /// A change the provider already published, if any.
    pub fn pending_change(&mut self) -> Option<Option<User>> {
        self.subscription.try_next()
    }

    /// Waits for the provider to publish a change.
    pub async fn next_change(&mut self) -> Option<Option<User>> {
        self.subscription.next().await
    }
}

//=========================================================================================
// Guest provider
//=========================================================================================

pub const GUEST_UID: &str = "local_guest_user";
pub const GUEST_NAME: &str = "Guest User";

/// The fallback when no real identity provider is configured: one local guest
/// who is always signed in.
#[derive(Debug, Clone, Default)]
pub struct GuestIdentityProvider {
    feed: IdentityFeed,
}

impl GuestIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guest() -> User {
        User {
            uid: GUEST_UID.to_string(),
            name: Some(GUEST_NAME.to_string()),
            email: None,
        }
    }
}

#[async_trait]
impl IdentityProvider for GuestIdentityProvider {
    async fn restore(&self) -> PortResult<Option<User>> {
        info!("No identity provider configured. Running in local guest mode.");
        Ok(Some(Self::guest()))
    }

    async fn sign_in(&self, _request: SignInRequest) -> Result<User, SignInError> {
        let guest = Self::guest();
        self.feed.publish(Some(guest.clone()));
        Ok(guest)
    }

    async fn sign_out(&self) -> PortResult<()> {
        Ok(())
    }

    fn subscribe(&self) -> IdentitySubscription {
        self.feed.subscribe()
    }

    fn allows_sign_out(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(uid: &str) -> User {
        User { uid: uid.to_string(), name: None, email: None }
    }

    #[test]
    fn provider_codes_map_onto_taxonomy() {
        use SignInErrorKind::*;
        assert_eq!(SignInErrorKind::from_provider_code("auth/popup-closed-by-user"), UserCanceled);
        assert_eq!(SignInErrorKind::from_provider_code("auth/cancelled-popup-request"), UserCanceled);
        assert_eq!(SignInErrorKind::from_provider_code("auth/operation-not-allowed"), ProviderDisabled);
        assert_eq!(
            SignInErrorKind::from_provider_code("auth/operation-not-supported-in-this-environment"),
            EnvironmentUnsupported
        );
        assert_eq!(SignInErrorKind::from_provider_code("auth/popup-blocked"), PopupBlocked);
        assert_eq!(SignInErrorKind::from_provider_code("auth/network-request-failed"), Unknown);
    }

    #[test]
    fn only_cancel_is_silent() {
        assert!(SignInError::canceled().notice().is_none());

        let kinds = [
            SignInErrorKind::ProviderDisabled,
            SignInErrorKind::EnvironmentUnsupported,
            SignInErrorKind::PopupBlocked,
            SignInErrorKind::Unknown,
        ];
        let messages: Vec<String> = kinds
            .iter()
            .map(|k| SignInError::new(*k, "").notice().unwrap().message)
            .collect();
        for (i, a) in messages.iter().enumerate() {
            for b in &messages[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn disabled_provider_blocks_retry() {
        let notice = SignInError::disabled("Email link").notice().unwrap();
        assert!(notice.blocking);
        assert!(notice.message.starts_with("Email link sign-in is not enabled."));
        assert!(!SignInError::new(SignInErrorKind::PopupBlocked, "").notice().unwrap().blocking);
    }

    #[tokio::test]
    async fn subscribers_see_changes_in_order() {
        let feed = IdentityFeed::new();
        let mut sub = feed.subscribe();

        feed.publish(Some(user("a")));
        feed.publish(None);

        assert_eq!(sub.next().await, Some(Some(user("a"))));
        assert_eq!(sub.try_next(), Some(None));
        assert_eq!(sub.try_next(), None);
    }

    #[tokio::test]
    async fn dropped_subscription_stops_receiving() {
        let feed = IdentityFeed::new();
        let sub = feed.subscribe();
        drop(sub);
        feed.publish(Some(user("a")));

        let mut late = feed.subscribe();
        assert_eq!(late.try_next(), None);
    }

    #[tokio::test]
    async fn guest_provider_always_resolves_the_guest() {
        let gate = AuthGate::new(Arc::new(GuestIdentityProvider::new()));
        let user = gate.resolve().await.unwrap();

        assert_eq!(user.uid, GUEST_UID);
        assert_eq!(user.name.as_deref(), Some(GUEST_NAME));
        assert!(!gate.allows_sign_out());
    }
}
