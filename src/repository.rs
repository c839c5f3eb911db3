use crate::{error::SessionError, models::Profile};
use async_trait::async_trait;
use sqlx::PgPool;
use std::{collections::HashMap, sync::Arc};
use uuid::Uuid;

/// ProfileRepository
///
/// The user-record lookup that maps a session's user id to its profile row. The identity
/// source only depends on this trait, so the Postgres and REST gateways are interchangeable.
///
/// Returns `Ok(None)` when the user has no profile; transport and database failures are
/// errors so the provider can log them before settling to `Unauthenticated`.
#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn get_profile(&self, id: Uuid, access_token: &str) -> Result<Option<Profile>, SessionError>;
}

/// ProfileRepositoryState
///
/// The concrete type used to share the profile lookup across the application.
pub type ProfileRepositoryState = Arc<dyn ProfileRepository>;

/// PostgresProfileRepository
///
/// Reads `public.profiles` directly. Used when `DATABASE_URL` is configured.
pub struct PostgresProfileRepository {
    pool: PgPool,
}

impl PostgresProfileRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ProfileRepository for PostgresProfileRepository {
    /// The access token is not needed here: the pool connects with service credentials.
    async fn get_profile(&self, id: Uuid, _access_token: &str) -> Result<Option<Profile>, SessionError> {
        let profile = sqlx::query_as::<_, Profile>(
            "SELECT id, email, role, full_name FROM profiles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(profile)
    }
}

/// RestProfileRepository
///
/// Reads the profile through the Supabase PostgREST gateway with the user's own access
/// token, so row-level security applies exactly as it would for the browser client.
#[derive(Clone)]
pub struct RestProfileRepository {
    client: reqwest::Client,
    base_url: String,
    anon_key: String,
}

impl RestProfileRepository {
    pub fn new(base_url: &str, anon_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.to_string(),
        }
    }
}

#[async_trait]
impl ProfileRepository for RestProfileRepository {
    async fn get_profile(&self, id: Uuid, access_token: &str) -> Result<Option<Profile>, SessionError> {
        let url = format!(
            "{}/rest/v1/profiles?id=eq.{}&select=id,email,role,full_name",
            self.base_url, id
        );

        let response = self
            .client
            .get(url)
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SessionError::UnexpectedStatus(response.status().as_u16()));
        }

        // PostgREST always answers with an array, even for a primary-key filter.
        let mut rows = response.json::<Vec<Profile>>().await?;
        Ok(rows.pop())
    }
}

/// MockProfileRepository
///
/// In-memory profile table used by the test suite.
#[derive(Clone, Default)]
pub struct MockProfileRepository {
    pub profiles: HashMap<Uuid, Profile>,
    /// When true, every lookup fails as if the backend were unreachable.
    pub should_fail: bool,
}

impl MockProfileRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    pub fn with_profile(mut self, profile: Profile) -> Self {
        self.profiles.insert(profile.id, profile);
        self
    }
}

#[async_trait]
impl ProfileRepository for MockProfileRepository {
    async fn get_profile(&self, id: Uuid, _access_token: &str) -> Result<Option<Profile>, SessionError> {
        if self.should_fail {
            return Err(SessionError::UnexpectedStatus(503));
        }
        Ok(self.profiles.get(&id).cloned())
    }
}
