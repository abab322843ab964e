//! Session provider.
//!
//! Wraps the auth half of the backend, keeps the current session and fans out
//! session transitions. Everything that needs to know who is acting receives a
//! [`SessionContext`] resolved from here.

use std::{
    borrow::Cow,
    sync::{Arc, Mutex, MutexGuard},
};

use email_address::EmailAddress;
use serde_json::json;
use tokio::sync::broadcast;

use crate::{
    backend::{AuthBackend, DataBackend, Table},
    errors::{FeedError, ValidationError, ValidationIssue, require_text},
    types::{Identity, Profile, Session},
};

const EVENT_CAPACITY: usize = 32;

/// Who is acting, resolved once and passed explicitly to repositories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionContext {
    session: Option<Session>,
}

impl SessionContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(session: Session) -> Self {
        Self { session: Some(session) }
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.session.as_ref().map(|session| &session.user)
    }

    pub fn user_id(&self) -> Option<&str> {
        self.identity().map(|identity| identity.id.as_str())
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// The session, or an authorization error naming `action`.
    pub fn require(&self, action: impl Into<Cow<'static, str>>) -> Result<&Session, FeedError> {
        self.session.as_ref().ok_or_else(|| FeedError::unauthorized(action))
    }
}

/// Session transition delivered to watchers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    SignedIn(Session),
    SignedOut,
    TokenRefreshed(Session),
    UserUpdated(Profile),
}

/// Cancellable subscription to [`AuthEvent`]s.
#[derive(Debug)]
pub struct SessionWatch {
    receiver: Option<broadcast::Receiver<AuthEvent>>,
}

impl SessionWatch {
    /// Next transition; `None` after unsubscribing or once the provider is gone.
    pub async fn next(&mut self) -> Option<AuthEvent> {
        let receiver = self.receiver.as_mut()?;
        loop {
            match receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("session watcher lagged, skipped {skipped} transitions");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn unsubscribe(&mut self) {
        self.receiver = None;
    }

    pub fn is_active(&self) -> bool {
        self.receiver.is_some()
    }
}

/// Sign-up form as entered by the user.
#[derive(Debug, Clone, Default)]
pub struct SignUpForm {
    pub email: String,
    pub password: String,
    pub password_confirmation: String,
    pub user_name: String,
}

impl SignUpForm {
    /// Collects every field problem at once; returns the trimmed email and display name.
    pub fn validate(&self) -> Result<(String, String), ValidationError> {
        let mut issues = Vec::new();

        let email = self.email.trim();
        if !EmailAddress::is_valid(email) {
            issues.push(ValidationIssue::new("email", "validation.email", "invalid email address"));
        }
        if self.password.is_empty() {
            issues.push(ValidationIssue::new(
                "password",
                "validation.required",
                "password must not be empty",
            ));
        } else if self.password != self.password_confirmation {
            issues.push(ValidationIssue::new(
                "password_confirmation",
                "validation.mismatch",
                "passwords do not match",
            ));
        }
        let user_name = match require_text("user_name", &self.user_name) {
            Ok(name) => name,
            Err(err) => {
                issues.extend(err.issues);
                String::new()
            }
        };

        if issues.is_empty() {
            Ok((email.to_string(), user_name))
        } else {
            Err(ValidationError::new(issues))
        }
    }
}

pub struct SessionProvider<B> {
    backend: Arc<B>,
    current: Mutex<Option<Session>>,
    events: broadcast::Sender<AuthEvent>,
}

impl<B> SessionProvider<B>
where
    B: AuthBackend + DataBackend,
{
    pub fn new(backend: Arc<B>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            backend,
            current: Mutex::new(None),
            events,
        }
    }

    /// Restores a previously issued session; it is checked on the next [`resolve`](Self::resolve).
    pub fn with_session(backend: Arc<B>, session: Session) -> Self {
        let provider = Self::new(backend);
        *provider.lock() = Some(session);
        provider
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: AuthEvent) {
        // No watchers is fine.
        let _ = self.events.send(event);
    }

    /// Current context without asking the backend.
    pub fn context(&self) -> SessionContext {
        SessionContext {
            session: self.lock().clone(),
        }
    }

    /// Checks the held token with the auth service.
    ///
    /// Unknown tokens and failed checks both resolve to anonymous.
    pub async fn resolve(&self) -> SessionContext {
        let Some(session) = self.lock().clone() else {
            return SessionContext::anonymous();
        };
        match self.backend.get_user(&session.access_token).await {
            Ok(Some(identity)) => {
                let session = Session {
                    access_token: session.access_token,
                    user: identity,
                };
                *self.lock() = Some(session.clone());
                SessionContext::authenticated(session)
            }
            Ok(None) => {
                log::debug!("stored session is no longer valid");
                *self.lock() = None;
                SessionContext::anonymous()
            }
            Err(err) => {
                log::warn!("error checking user session: {err}");
                *self.lock() = None;
                SessionContext::anonymous()
            }
        }
    }

    pub async fn current_user(&self) -> Option<Identity> {
        self.resolve().await.identity().cloned()
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SessionContext, FeedError> {
        let session = self.backend.sign_in(email, password).await?;
        log::info!("signed in as {}", session.user.email);
        *self.lock() = Some(session.clone());
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(SessionContext::authenticated(session))
    }

    /// Creates the auth identity, then the profile row owned by it.
    pub async fn sign_up(&self, form: &SignUpForm) -> Result<SessionContext, FeedError> {
        let (email, user_name) = form.validate()?;
        let session = self.backend.sign_up(&email, &form.password).await?;
        let profile = json!({
            "id": session.user.id,
            "email": session.user.email,
            "user_name": user_name,
        });
        self.backend.insert(Some(&session), Table::Users, profile).await?;
        log::info!("registered {}", session.user.email);

        *self.lock() = Some(session.clone());
        self.emit(AuthEvent::SignedIn(session.clone()));
        Ok(SessionContext::authenticated(session))
    }

    pub async fn refresh(&self) -> Result<SessionContext, FeedError> {
        let current = self.context();
        let session = current.require("refresh session")?;
        let refreshed = self.backend.refresh(&session.access_token).await?;
        *self.lock() = Some(refreshed.clone());
        self.emit(AuthEvent::TokenRefreshed(refreshed.clone()));
        Ok(SessionContext::authenticated(refreshed))
    }

    /// Ends the session locally even when the auth service call fails.
    pub async fn sign_out(&self) {
        let Some(session) = self.lock().take() else {
            return;
        };
        if let Err(err) = self.backend.sign_out(&session.access_token).await {
            log::warn!("error signing out: {err}");
        }
        log::info!("signed out {}", session.user.email);
        self.emit(AuthEvent::SignedOut);
    }

    /// Announces a changed profile to watchers.
    pub fn notify_user_updated(&self, profile: Profile) {
        self.emit(AuthEvent::UserUpdated(profile));
    }

    pub fn subscribe(&self) -> SessionWatch {
        SessionWatch {
            receiver: Some(self.events.subscribe()),
        }
    }
}
