use thiserror::Error;

/// SessionError
///
/// Everything that can go wrong while turning a backend session into an `Identity`.
/// None of these ever reach a route guard: the `IdentityProvider` collapses all of them
/// into `SessionStatus::Unauthenticated`.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The Supabase REST gateway could not be reached or answered with garbage.
    #[error("backend transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("profile database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Bad signature, expired `exp`, or an unparseable access token.
    #[error("invalid access token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),

    /// Reading or writing the persisted session file failed.
    #[error("session storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("session decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// The backend returned a user record whose role is outside the closed set.
    #[error("malformed identity: {0}")]
    MalformedIdentity(String),

    /// A valid session whose user has no profile row.
    #[error("no profile found for user {0}")]
    ProfileMissing(uuid::Uuid),

    #[error("backend responded with status {0}")]
    UnexpectedStatus(u16),
}

/// ConfigError
///
/// Raised by `AppConfig::load` when the environment cannot produce a usable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set in production")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    /// Production refuses to run on the demo identity source.
    #[error("SUPABASE_URL and SUPABASE_ANON_KEY must point at a real backend in production")]
    BackendRequired,
}
