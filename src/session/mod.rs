//! Messaging session abstraction.
//!
//! A [`SessionConnector`] establishes an authenticated [`MessagingSession`]
//! for one campaign. [`ScopedSession`] owns that session for the duration of
//! the campaign and guarantees it is released, including when the campaign
//! future is dropped mid-run.

pub mod http;

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tracing::{debug, warn};

use crate::error::SessionError;

pub use http::HttpSessionConnector;

/// Account identifier and access key for a messaging session.
#[derive(Debug, Clone)]
pub struct SessionCredentials {
    pub session_name: String,
    pub api_key: SecretString,
}

impl SessionCredentials {
    pub fn new(session_name: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            session_name: session_name.into(),
            api_key: SecretString::from(api_key.into()),
        }
    }
}

/// An established messaging session.
#[async_trait]
pub trait MessagingSession: Send + Sync {
    /// Whether the provider accepted the credentials.
    fn is_authenticated(&self) -> bool;

    /// Send one message. `Ok(false)` means the provider rejected it.
    async fn send_message(&self, phone: &str, text: &str) -> Result<bool, SessionError>;

    /// Release the session.
    async fn close(&self) -> Result<(), SessionError>;
}

/// Opens messaging sessions.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn connect(
        &self,
        credentials: &SessionCredentials,
    ) -> Result<Arc<dyn MessagingSession>, SessionError>;
}

/// A session that is closed exactly once when the campaign ends.
///
/// Call [`release`](Self::release) on every normal exit path. If the guard is
/// dropped without it, the close is spawned onto the current runtime.
pub struct ScopedSession {
    session: Arc<dyn MessagingSession>,
    session_name: String,
    released: bool,
}

impl ScopedSession {
    /// Acquire a session from `connector`.
    pub async fn acquire(
        connector: &dyn SessionConnector,
        credentials: &SessionCredentials,
    ) -> Result<Self, SessionError> {
        let session = connector.connect(credentials).await?;
        debug!(session = %credentials.session_name, "Messaging session acquired");
        Ok(Self {
            session,
            session_name: credentials.session_name.clone(),
            released: false,
        })
    }

    pub fn session(&self) -> &dyn MessagingSession {
        self.session.as_ref()
    }

    /// Close the session. Close failures are logged, never returned.
    pub async fn release(mut self) {
        self.released = true;
        match self.session.close().await {
            Ok(()) => debug!(session = %self.session_name, "Messaging session released"),
            Err(e) => warn!(
                session = %self.session_name,
                error = %e,
                "Failed to release messaging session"
            ),
        }
    }
}

impl Drop for ScopedSession {
    fn drop(&mut self) {
        if self.released {
            return;
        }

        let session = Arc::clone(&self.session);
        let session_name = self.session_name.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = session.close().await {
                        warn!(session = %session_name, error = %e, "Failed to release abandoned session");
                    }
                });
            }
            Err(_) => {
                warn!(session = %session_name, "Session dropped outside a runtime; not released");
            }
        }
    }
}
