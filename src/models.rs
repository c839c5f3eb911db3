use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::{fmt, str::FromStr};
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::SessionError;

// --- Roles & Identities ---

/// Role
///
/// The closed set of roles a principal can hold. Every route requirement and every
/// `home_for_role` arm is matched exhaustively against this enum, so adding a role is a
/// compile-time change everywhere it matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum Role {
    Admin,
    Customer,
}

impl Role {
    pub const ALL: [Role; 2] = [Role::Admin, Role::Customer];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Customer => "customer",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raised when a backend role string is outside the closed set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown role '{0}'")]
pub struct UnknownRole(pub String);

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "customer" => Ok(Role::Customer),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// Identity
///
/// An authenticated principal. Holds exactly one `Role`; the only decision-relevant
/// fields are `id` and `role`, the rest is display metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Identity {
    pub id: Uuid,
    pub role: Role,
    pub email: String,
    pub full_name: Option<String>,
}

/// Profile
///
/// The raw user record as stored in `public.profiles`. The role column is untrusted text
/// until it passes through `Identity::try_from`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, Default)]
pub struct Profile {
    // Primary Key, mirrors auth.users.id.
    pub id: Uuid,
    pub email: String,
    pub role: String,
    pub full_name: Option<String>,
}

impl TryFrom<Profile> for Identity {
    type Error = SessionError;

    /// A profile with an unrecognised role never becomes an `Identity`.
    fn try_from(profile: Profile) -> Result<Self, Self::Error> {
        let role = profile
            .role
            .parse::<Role>()
            .map_err(|e| SessionError::MalformedIdentity(format!("{} ({})", e, profile.id)))?;

        Ok(Identity {
            id: profile.id,
            role,
            email: profile.email,
            full_name: profile.full_name,
        })
    }
}

// --- Provider & Guard State ---

/// SessionStatus
///
/// The Identity Provider's knowledge state. Always exactly one of the three variants, and
/// `Authenticated` always carries a complete `Identity`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
#[ts(export)]
pub enum SessionStatus {
    Resolving,
    Unauthenticated,
    Authenticated(Identity),
}

impl SessionStatus {
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            SessionStatus::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_resolving(&self) -> bool {
        matches!(self, SessionStatus::Resolving)
    }
}

impl From<Option<Identity>> for SessionStatus {
    fn from(identity: Option<Identity>) -> Self {
        match identity {
            Some(identity) => SessionStatus::Authenticated(identity),
            None => SessionStatus::Unauthenticated,
        }
    }
}

/// Transition
///
/// One emitted status, stamped with its revision. Revision 0 is the initial `Resolving`
/// state; every emitted change increments it by one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct Transition {
    pub revision: u64,
    pub status: SessionStatus,
}

/// GuardDecision
///
/// The four-valued output that steers the navigation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[serde(tag = "decision", rename_all = "snake_case")]
#[ts(export)]
pub enum GuardDecision {
    ShowLoading,
    RedirectToLogin,
    RedirectToRoleHome { role: Role },
    RenderContent,
}

// --- Backend Session ---

/// StoredSession
///
/// The persisted backend session: the bearer token plus the claims the provider needs
/// without re-decoding it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// SessionEvent
///
/// Change notifications broadcast by a `SessionClient`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    SignedIn(StoredSession),
    TokenRefreshed(StoredSession),
    SignedOut,
}

// --- Request Payloads ---

/// SignInRequest
///
/// Input payload for `POST /session`. The tokens were issued by the external auth provider;
/// this service only validates and persists them.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignInRequest {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

/// GuardQuery
///
/// Query parameters for `GET /guard/{role}`. When `after` is given the request waits for a
/// decision newer than that revision.
#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct GuardQuery {
    pub after: Option<u64>,
}

// --- Responses ---

/// DecisionResponse
///
/// What the navigation layer receives for a route evaluation. `redirect` is set for the two
/// redirect decisions and must be followed with a history-replacing navigation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct DecisionResponse {
    pub revision: u64,
    pub required: Role,
    pub decision: GuardDecision,
    pub redirect: Option<String>,
    pub replace: bool,
}

/// ProtectedPage
///
/// Body rendered by the role-gated areas once the guard allows it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct ProtectedPage {
    pub area: String,
    pub identity: Identity,
}

/// LoginPage
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct LoginPage {
    pub sign_in: String,
    pub demo_mode: bool,
}
