use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::{Mutex, broadcast};
use uuid::Uuid;

use crate::{
    error::SessionError,
    models::{SessionEvent, StoredSession},
};

// Change notifications are tiny; a slow consumer that falls this far behind re-resolves.
const EVENT_CAPACITY: usize = 64;

/// Claims
///
/// The subset of the access token payload this service relies on.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (sub): the user's UUID, primary key of `public.profiles`.
    pub sub: Uuid,
    /// Expiration time (exp), seconds since the epoch.
    pub exp: usize,
    /// Issued at (iat).
    pub iat: usize,
}

/// SessionClient
///
/// The backend session black box. Exposes the current session, change notification, and
/// the two mutations performed on behalf of the user.
#[async_trait]
pub trait SessionClient: Send + Sync {
    /// The currently persisted session, or `None` when there is no usable one. An expired
    /// session counts as no session.
    async fn get_current_session(&self) -> Result<Option<StoredSession>, SessionError>;

    /// Registers interest in session changes. Dropping the receiver releases it.
    fn on_session_change(&self) -> broadcast::Receiver<SessionEvent>;

    /// Validates and persists a session issued by the external auth provider.
    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: Option<String>,
    ) -> Result<StoredSession, SessionError>;

    async fn sign_out(&self) -> Result<(), SessionError>;
}

/// SessionClientState
pub type SessionClientState = Arc<dyn SessionClient>;

/// SupabaseSessionClient
///
/// Persists the session as JSON on disk so a restart resumes the previous login, and
/// validates access tokens locally with the project's JWT secret.
pub struct SupabaseSessionClient {
    path: PathBuf,
    jwt_secret: String,
    events: broadcast::Sender<SessionEvent>,
    // Serializes writes so the file and the broadcast order never disagree.
    write_lock: Mutex<()>,
}

impl SupabaseSessionClient {
    pub fn new(path: impl Into<PathBuf>, jwt_secret: &str) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            path: path.into(),
            jwt_secret: jwt_secret.to_string(),
            events,
            write_lock: Mutex::new(()),
        }
    }

    fn validate(&self, token: &str) -> Result<Claims, SessionError> {
        let key = DecodingKey::from_secret(self.jwt_secret.as_bytes());
        let mut validation = Validation::default();
        validation.validate_exp = true;
        // Supabase stamps `aud: authenticated`; the audience is not part of our contract.
        validation.validate_aud = false;

        Ok(decode::<Claims>(token, &key, &validation)?.claims)
    }

    async fn read_stored(&self) -> Result<Option<StoredSession>, SessionError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SessionClient for SupabaseSessionClient {
    async fn get_current_session(&self) -> Result<Option<StoredSession>, SessionError> {
        let Some(stored) = self.read_stored().await? else {
            return Ok(None);
        };

        if stored.is_expired(Utc::now()) {
            tracing::debug!(user_id = %stored.user_id, "persisted session has expired");
            return Ok(None);
        }

        match self.validate(&stored.access_token) {
            Ok(_) => Ok(Some(stored)),
            Err(SessionError::InvalidToken(e)) if matches!(e.kind(), ErrorKind::ExpiredSignature) => {
                tracing::debug!(user_id = %stored.user_id, "persisted session has expired");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn on_session_change(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: Option<String>,
    ) -> Result<StoredSession, SessionError> {
        let claims = self.validate(access_token)?;
        let session = StoredSession {
            access_token: access_token.to_string(),
            refresh_token,
            user_id: claims.sub,
            expires_at: expiry(claims.exp),
        };

        let _guard = self.write_lock.lock().await;
        let previous = self.read_stored().await.ok().flatten();
        tokio::fs::write(&self.path, serde_json::to_vec(&session)?).await?;

        let event = match previous {
            Some(prev) if prev.user_id == session.user_id => SessionEvent::TokenRefreshed(session.clone()),
            _ => SessionEvent::SignedIn(session.clone()),
        };
        // No receivers is fine: nobody is watching yet.
        let _ = self.events.send(event);

        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let _ = self.events.send(SessionEvent::SignedOut);
        Ok(())
    }
}

fn expiry(exp: usize) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(exp as i64, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// MockSessionClient
///
/// In-memory session client for tests. Access tokens are plain user UUIDs.
pub struct MockSessionClient {
    current: Mutex<Option<StoredSession>>,
    events: broadcast::Sender<SessionEvent>,
    /// When true, `get_current_session` fails as if the backend were unreachable.
    pub should_fail: bool,
}

impl MockSessionClient {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            current: Mutex::new(None),
            events,
            should_fail: false,
        }
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::new()
        }
    }

    /// Starts with a persisted session for `user_id`, as if restored from a previous run.
    pub fn with_session(user_id: Uuid) -> Self {
        Self {
            current: Mutex::new(Some(mock_session(user_id))),
            ..Self::new()
        }
    }
}

impl Default for MockSessionClient {
    fn default() -> Self {
        Self::new()
    }
}

fn mock_session(user_id: Uuid) -> StoredSession {
    StoredSession {
        access_token: user_id.to_string(),
        refresh_token: None,
        user_id,
        expires_at: Utc::now() + Duration::hours(1),
    }
}

#[async_trait]
impl SessionClient for MockSessionClient {
    async fn get_current_session(&self) -> Result<Option<StoredSession>, SessionError> {
        if self.should_fail {
            return Err(SessionError::UnexpectedStatus(503));
        }
        Ok(self.current.lock().await.clone())
    }

    fn on_session_change(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    async fn set_session(
        &self,
        access_token: &str,
        refresh_token: Option<String>,
    ) -> Result<StoredSession, SessionError> {
        let user_id = Uuid::parse_str(access_token)
            .map_err(|_| SessionError::InvalidToken(ErrorKind::InvalidToken.into()))?;
        let session = StoredSession {
            refresh_token,
            ..mock_session(user_id)
        };

        let mut current = self.current.lock().await;
        let event = match current.as_ref() {
            Some(prev) if prev.user_id == user_id => SessionEvent::TokenRefreshed(session.clone()),
            _ => SessionEvent::SignedIn(session.clone()),
        };
        *current = Some(session.clone());
        let _ = self.events.send(event);

        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), SessionError> {
        *self.current.lock().await = None;
        let _ = self.events.send(SessionEvent::SignedOut);
        Ok(())
    }
}
