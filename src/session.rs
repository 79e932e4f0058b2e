// Operator session: credentials with an explicit init / teardown lifecycle
//
// Teardown is global. It clears credentials and announces itself on a watch
// channel so the rendering layer can redirect to sign-in, independent of
// whichever row triggered it.

use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    SignedOut,
    Active,
    /// Torn down after an auth failure; the view should send the operator to sign-in
    Expired { reason: String },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("credential token is empty")]
    EmptyToken,
}

/// Session collaborator as seen by the transport and the executor
#[async_trait]
pub trait SessionContext: Send + Sync {
    /// Bearer token for outgoing requests, if signed in
    fn bearer_token(&self) -> Option<String>;

    /// Clear credentials and announce expiry
    async fn teardown(&self, reason: &str);
}

/// In-memory credential store
#[derive(Debug)]
pub struct CredentialSession {
    token: RwLock<Option<String>>,
    state: watch::Sender<SessionState>,
}

impl Default for CredentialSession {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialSession {
    pub fn new() -> Self {
        let (state, _) = watch::channel(SessionState::SignedOut);
        Self {
            token: RwLock::new(None),
            state,
        }
    }

    /// Start a session with `token`
    pub fn init(&self, token: impl Into<String>) -> Result<(), SessionError> {
        let token = token.into();
        if token.trim().is_empty() {
            return Err(SessionError::EmptyToken);
        }
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
        self.state.send_replace(SessionState::Active);
        info!("Operator session initialized");
        Ok(())
    }

    pub fn with_token(token: impl Into<String>) -> Result<Self, SessionError> {
        let session = Self::new();
        session.init(token)?;
        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn is_active(&self) -> bool {
        matches!(*self.state.borrow(), SessionState::Active)
    }

    /// Watch for expiry or sign-in changes
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Operator-initiated sign-out
    pub fn sign_out(&self) {
        self.token.write().unwrap_or_else(PoisonError::into_inner).take();
        self.state.send_replace(SessionState::SignedOut);
        info!("Operator signed out");
    }
}

#[async_trait]
impl SessionContext for CredentialSession {
    fn bearer_token(&self) -> Option<String> {
        self.token
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn teardown(&self, reason: &str) {
        let had_token = self
            .token
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        self.state.send_replace(SessionState::Expired {
            reason: reason.to_string(),
        });
        warn!(had_token, reason, "Session torn down, credentials cleared");
    }
}
