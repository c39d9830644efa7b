use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use derivative::Derivative;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::error::{Error, SessionErrorKind};
use crate::session::{self, Session};

/// The CRUD contract of the session store. The store is a remote service; the
/// library only consumes this interface and ships [`MemoryStore`] for tests
/// and local runs.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Persists a fresh session. Fails with `CodeTakenError` when another
    /// active session already holds the same code, and with
    /// `StorageUnavailableError` when the backing store cannot be reached.
    async fn insert(&self, session: Session) -> Result<(), Error>;

    /// Looks up a session matching both the code and `is_active == true`.
    /// Expiry is not filtered here; the caller compares timestamps.
    async fn find_active_by_code(&self, code: &str) -> Result<Option<Session>, Error>;

    /// Flips `is_active` off. Idempotent; deactivating an already-inactive
    /// session is not an error. Sessions are never deleted or reactivated.
    async fn deactivate(&self, id: &str) -> Result<(), Error>;
}

/// Client-side policy around a [`SessionStore`]: code minting with collision
/// retry on create, and expiry enforcement on lookup.
#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct Registry {
    #[derivative(Debug = "ignore")]
    store: Arc<dyn SessionStore>,
    config: RegistryConfig,
}

impl Registry {
    pub fn new(store: Arc<dyn SessionStore>, config: RegistryConfig) -> Self {
        Self { store, config }
    }

    /// Mints a new active session with a fresh code and id. A new share always
    /// creates a new session; there is no reactivation path.
    pub async fn create(&self, device_label: &str) -> Result<Session, Error> {
        for attempt in 1..=self.config.create_attempts {
            let candidate = Session {
                id: Uuid::new_v4().to_string(),
                code: session::generate_code(),
                device_label: device_label.to_owned(),
                is_active: true,
                expires_at: Utc::now() + self.config.session_ttl,
            };
            match self.store.insert(candidate.clone()).await {
                Ok(()) => {
                    tracing::debug!(
                        "session {} created with code {}",
                        candidate.id,
                        candidate.code
                    );
                    return Ok(candidate);
                }
                Err(err) if err.session_kind() == Some(SessionErrorKind::CodeTakenError) => {
                    tracing::debug!("code collision on attempt {}, retrying", attempt);
                }
                Err(err) => return Err(err),
            }
        }
        Err(Error::new_session(
            format!(
                "could not allocate a unique code in {} attempts",
                self.config.create_attempts
            ),
            SessionErrorKind::CodeTakenError,
        ))
    }

    /// Resolves a code to a connectable session. A matching session past its
    /// `expires_at` is reported as `ExpiredError`, distinctly from
    /// `NotFoundError`, so the viewer knows a new code is needed.
    pub async fn find_connectable(&self, code: &str) -> Result<Session, Error> {
        let code = session::normalize_code(code);
        if !session::is_valid_code(&code) {
            return Err(Error::new_session(
                format!("{} is not a well-formed session code", code),
                SessionErrorKind::NotFoundError,
            ));
        }
        let found = self.store.find_active_by_code(&code).await?;
        let Some(found) = found else {
            return Err(Error::new_session(
                format!("no active session for code {}", code),
                SessionErrorKind::NotFoundError,
            ));
        };
        if !found.is_connectable_at(Utc::now()) {
            return Err(Error::new_session(
                format!("session {} has expired", found.id),
                SessionErrorKind::ExpiredError,
            ));
        }
        Ok(found)
    }

    pub async fn deactivate(&self, id: &str) -> Result<(), Error> {
        self.store.deactivate(id).await
    }
}

/// In-process [`SessionStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: Mutex<HashMap<String, Session>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert(&self, session: Session) -> Result<(), Error> {
        let mut sessions = self.sessions.lock().await;
        let taken = sessions
            .values()
            .any(|existing| existing.is_active && existing.code == session.code);
        if taken {
            return Err(Error::new_session(
                format!("code {} is already active", session.code),
                SessionErrorKind::CodeTakenError,
            ));
        }
        sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn find_active_by_code(&self, code: &str) -> Result<Option<Session>, Error> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .values()
            .find(|session| session.is_active && session.code == code)
            .cloned())
    }

    async fn deactivate(&self, id: &str) -> Result<(), Error> {
        let mut sessions = self.sessions.lock().await;
        if let Some(session) = sessions.get_mut(id) {
            session.is_active = false;
        }
        Ok(())
    }
}
