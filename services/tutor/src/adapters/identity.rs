//! services/tutor/src/adapters/identity.rs
//!
//! Local email/password accounts. Implements the `IdentityProvider` port on top of
//! the `AccountRepository` (accounts plus 30-day auth sessions) and remembers the
//! current auth session in `KeyValueStorage`, so a restart signs the user back in.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::Duration;
use professor_core::auth::{IdentityFeed, IdentitySubscription, SignInError, SignInErrorKind, SignInRequest};
use professor_core::domain::{AuthSession, User};
use professor_core::ports::{AccountRepository, Clock, IdentityProvider, KeyValueStorage, PortError, PortResult};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Storage key holding the id of the signed-in auth session.
pub const AUTH_SESSION_KEY: &str = "auth:current";
pub const SESSION_TTL_DAYS: i64 = 30;
pub const MIN_PASSWORD_CHARS: usize = 6;

const INVALID_CREDENTIALS: &str = "Invalid email or password.";

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

pub struct AccountIdentityProvider {
    accounts: Arc<dyn AccountRepository>,
    storage: Arc<dyn KeyValueStorage>,
    clock: Arc<dyn Clock>,
    feed: IdentityFeed,
}

impl AccountIdentityProvider {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        storage: Arc<dyn KeyValueStorage>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { accounts, storage, clock, feed: IdentityFeed::new() }
    }

    async fn current_session_id(&self) -> PortResult<Option<String>> {
        Ok(self
            .storage
            .get(AUTH_SESSION_KEY)
            .await?
            .filter(|id| !id.is_empty()))
    }

    /// Creates an auth session for `user`, remembers it and announces the sign-in.
    async fn start_session(&self, user: User) -> Result<User, SignInError> {
        let expires_at =
            self.clock.now_millis() + Duration::days(SESSION_TTL_DAYS).num_milliseconds();
        let session = AuthSession {
            id: Uuid::new_v4().to_string(),
            uid: user.uid.clone(),
            expires_at,
        };

        self.accounts
            .create_auth_session(&session)
            .await
            .map_err(|e| {
                error!("Failed to create auth session: {:?}", e);
                SignInError::new(SignInErrorKind::Unknown, "Failed to create session.")
            })?;
        self.storage
            .set(AUTH_SESSION_KEY, &session.id)
            .await
            .map_err(|e| {
                error!("Failed to remember auth session: {:?}", e);
                SignInError::new(SignInErrorKind::Unknown, "Failed to create session.")
            })?;

        info!("User {} signed in.", user.uid);
        self.feed.publish(Some(user.clone()));
        Ok(user)
    }

    async fn log_in(&self, email: &str, password: &str) -> Result<User, SignInError> {
        let creds = self
            .accounts
            .get_credentials_by_email(email)
            .await
            .map_err(|e| {
                match e {
                    PortError::NotFound(_) => info!("Sign-in attempt for unknown account."),
                    _ => error!("Failed to get account: {:?}", e),
                }
                SignInError::new(SignInErrorKind::Unknown, INVALID_CREDENTIALS)
            })?;

        let parsed_hash = PasswordHash::new(&creds.hashed_password).map_err(|e| {
            error!("Failed to parse password hash: {:?}", e);
            SignInError::new(SignInErrorKind::Unknown, "Authentication error.")
        })?;
        let valid = Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok();
        if !valid {
            return Err(SignInError::new(SignInErrorKind::Unknown, INVALID_CREDENTIALS));
        }

        self.start_session(creds.to_user()).await
    }

    async fn sign_up(&self, name: Option<&str>, email: &str, password: &str) -> Result<User, SignInError> {
        if password.chars().count() < MIN_PASSWORD_CHARS {
            return Err(SignInError::new(
                SignInErrorKind::Unknown,
                format!("Password must be at least {} characters.", MIN_PASSWORD_CHARS),
            ));
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| {
                error!("Failed to hash password: {:?}", e);
                SignInError::new(SignInErrorKind::Unknown, "Failed to hash password.")
            })?
            .to_string();

        let name = name.map(str::trim).filter(|n| !n.is_empty());
        let user = self
            .accounts
            .create_account(name, email, &password_hash)
            .await
            .map_err(|e| {
                error!("Failed to create account: {:?}", e);
                let detail = match e {
                    PortError::Unexpected(msg) if msg.contains("already exists") => {
                        "An account with this email already exists."
                    }
                    _ => "Failed to create account.",
                };
                SignInError::new(SignInErrorKind::Unknown, detail)
            })?;

        self.start_session(user).await
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

//=========================================================================================
// `IdentityProvider` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityProvider for AccountIdentityProvider {
    async fn restore(&self) -> PortResult<Option<User>> {
        let Some(session_id) = self.current_session_id().await? else {
            return Ok(None);
        };

        match self
            .accounts
            .validate_auth_session(&session_id, self.clock.now_millis())
            .await
        {
            Ok(uid) => Ok(Some(self.accounts.get_user_by_id(&uid).await?)),
            Err(PortError::Unauthorized) => {
                warn!("Stored auth session is no longer valid; signing out.");
                self.storage.set(AUTH_SESSION_KEY, "").await?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn sign_in(&self, request: SignInRequest) -> Result<User, SignInError> {
        match request {
            SignInRequest::Password { email, password } => {
                let email = normalize_email(&email);
                if email.is_empty() {
                    return Err(SignInError::canceled());
                }
                self.log_in(&email, &password).await
            }
            SignInRequest::SignUp { name, email, password } => {
                let email = normalize_email(&email);
                if email.is_empty() {
                    return Err(SignInError::canceled());
                }
                self.sign_up(name.as_deref(), &email, &password).await
            }
            SignInRequest::EmailLink { .. } => Err(SignInError::disabled("Email link")),
            SignInRequest::PhoneOtp { .. } => Err(SignInError::disabled("Phone number")),
        }
    }

    async fn sign_out(&self) -> PortResult<()> {
        if let Some(session_id) = self.current_session_id().await? {
            self.accounts.delete_auth_session(&session_id).await?;
        }
        self.storage.set(AUTH_SESSION_KEY, "").await?;
        info!("Signed out.");
        self.feed.publish(None);
        Ok(())
    }

    fn subscribe(&self) -> IdentitySubscription {
        self.feed.subscribe()
    }
}
