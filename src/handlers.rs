use crate::{
    AppState,
    error::SessionError,
    guard::{RecordingNavigator, RouteGuard},
    models::{
        DecisionResponse, GuardQuery, Identity, LoginPage, ProtectedPage, Role, SignInRequest,
        Transition,
    },
};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use std::{sync::Arc, time::Duration};

// Upper bound for a long-poll on `GET /guard/{role}`; clients simply ask again.
const LONG_POLL: Duration = Duration::from_secs(25);

// --- Public Handlers ---

/// login_page
///
/// [Public Route] Landing point for `RedirectToLogin`.
#[utoipa::path(
    get,
    path = "/login",
    responses((status = 200, description = "Login page", body = LoginPage))
)]
pub async fn login_page(State(state): State<AppState>) -> Json<LoginPage> {
    Json(LoginPage {
        sign_in: "POST /session".to_string(),
        demo_mode: state.sessions.is_none(),
    })
}

/// get_session
///
/// [Public Route] Current session status and its revision.
#[utoipa::path(
    get,
    path = "/session",
    responses((status = 200, description = "Current status", body = Transition))
)]
pub async fn get_session(State(state): State<AppState>) -> Json<Transition> {
    Json(state.provider.transition())
}

/// sign_in
///
/// [Public Route] Hands a token pair issued by the external auth provider to the session
/// client. The provider picks the change up asynchronously; clients watch `/guard/{role}`.
#[utoipa::path(
    post,
    path = "/session",
    request_body = SignInRequest,
    responses(
        (status = 202, description = "Session stored, resolution pending"),
        (status = 401, description = "Invalid or expired token"),
        (status = 409, description = "Running on the demo identity")
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    Json(payload): Json<SignInRequest>,
) -> Result<StatusCode, StatusCode> {
    let sessions = state.sessions.as_ref().ok_or(StatusCode::CONFLICT)?;

    match sessions
        .set_session(&payload.access_token, payload.refresh_token)
        .await
    {
        Ok(session) => {
            tracing::info!(user_id = %session.user_id, "session stored");
            Ok(StatusCode::ACCEPTED)
        }
        Err(SessionError::InvalidToken(e)) => {
            tracing::debug!(error = %e, "rejected access token");
            Err(StatusCode::UNAUTHORIZED)
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to store session");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

/// sign_out
///
/// [Public Route] Ends the current session.
#[utoipa::path(
    delete,
    path = "/session",
    responses(
        (status = 204, description = "Signed out"),
        (status = 409, description = "Running on the demo identity")
    )
)]
pub async fn sign_out(State(state): State<AppState>) -> Result<StatusCode, StatusCode> {
    let sessions = state.sessions.as_ref().ok_or(StatusCode::CONFLICT)?;

    sessions.sign_out().await.map_err(|e| {
        tracing::error!(error = %e, "failed to clear session");
        StatusCode::INTERNAL_SERVER_ERROR
    })?;

    Ok(StatusCode::NO_CONTENT)
}

/// reverify_session
///
/// [Public Route] Puts the provider back into `Resolving` and resolves the session again.
#[utoipa::path(
    post,
    path = "/session/reverify",
    responses(
        (status = 202, description = "Re-verification started"),
        (status = 503, description = "Provider is not active")
    )
)]
pub async fn reverify_session(State(state): State<AppState>) -> StatusCode {
    if state.provider.reverify() {
        StatusCode::ACCEPTED
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

/// get_guard_decision
///
/// [Public Route] Evaluates the guard for `role`. With `?after=N` the request is held until
/// a transition newer than revision `N` arrives (or the long-poll expires), which lets a
/// loading placeholder wait for resolution without polling.
#[utoipa::path(
    get,
    path = "/guard/{role}",
    params(
        ("role" = Role, Path, description = "Required role"),
        GuardQuery
    ),
    responses(
        (status = 200, description = "Decision", body = DecisionResponse),
        (status = 400, description = "Unknown role")
    )
)]
pub async fn get_guard_decision(
    State(state): State<AppState>,
    Path(role): Path<Role>,
    Query(query): Query<GuardQuery>,
) -> Json<DecisionResponse> {
    let navigator = Arc::new(RecordingNavigator::default());
    let mut guard = RouteGuard::mount(&state.provider, role, navigator.clone());

    if query.after.is_some_and(|after| guard.revision() <= after) {
        // Timing out or a provider shutdown both leave the mounted decision in place.
        let _ = tokio::time::timeout(LONG_POLL, guard.next_decision()).await;
    }

    let decision = guard.decision();
    let response = DecisionResponse {
        revision: guard.revision(),
        required: role,
        decision,
        redirect: decision.redirect_target().map(str::to_string),
        replace: decision.is_redirect(),
    };
    guard.unmount();
    tracing::debug!(required = %role, replaced = ?navigator.history(), "guard evaluated");

    Json(response)
}

// --- Protected Handlers ---

/// admin_home
///
/// [Admin Route] Canonical home for the `admin` role.
#[utoipa::path(
    get,
    path = "/admin",
    responses(
        (status = 200, description = "Admin home", body = ProtectedPage),
        (status = 303, description = "Redirect to login or the visitor's own home"),
        (status = 503, description = "Session still resolving", body = DecisionResponse)
    )
)]
pub async fn admin_home(Extension(identity): Extension<Identity>) -> Json<ProtectedPage> {
    Json(ProtectedPage {
        area: "admin".to_string(),
        identity,
    })
}

/// admin_overview
///
/// [Admin Route]
#[utoipa::path(
    get,
    path = "/admin/overview",
    responses((status = 200, description = "Admin overview", body = ProtectedPage))
)]
pub async fn admin_overview(Extension(identity): Extension<Identity>) -> Json<ProtectedPage> {
    Json(ProtectedPage {
        area: "admin/overview".to_string(),
        identity,
    })
}

/// account_home
///
/// [Customer Route] Canonical home for the `customer` role.
#[utoipa::path(
    get,
    path = "/account",
    responses(
        (status = 200, description = "Account home", body = ProtectedPage),
        (status = 303, description = "Redirect to login or the visitor's own home"),
        (status = 503, description = "Session still resolving", body = DecisionResponse)
    )
)]
pub async fn account_home(Extension(identity): Extension<Identity>) -> Json<ProtectedPage> {
    Json(ProtectedPage {
        area: "account".to_string(),
        identity,
    })
}

/// account_profile
///
/// [Customer Route] The signed-in customer's own profile.
#[utoipa::path(
    get,
    path = "/account/profile",
    responses((status = 200, description = "Profile", body = Identity))
)]
pub async fn account_profile(Extension(identity): Extension<Identity>) -> Json<Identity> {
    Json(identity)
}
