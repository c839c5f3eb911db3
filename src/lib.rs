use axum::{Router, http::HeaderName};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

pub mod auth;
pub mod config;
pub mod error;
pub mod guard;
pub mod handlers;
pub mod identity;
pub mod models;
pub mod repository;
pub mod session;

// Routing segregated by required role (public, admin, customer).
pub mod routes;
use routes::{account, admin, public};

// --- Public Re-exports ---

pub use config::AppConfig;
pub use guard::{decide, home_for_role};
pub use identity::{IdentityProvider, IdentitySource};
pub use session::SessionClientState;

/// ApiDoc
///
/// Aggregates every documented path and schema. Served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login_page, handlers::get_session, handlers::sign_in, handlers::sign_out,
        handlers::reverify_session, handlers::get_guard_decision, handlers::admin_home,
        handlers::admin_overview, handlers::account_home, handlers::account_profile
    ),
    components(
        schemas(
            models::Role, models::Identity, models::SessionStatus, models::Transition,
            models::GuardDecision, models::DecisionResponse, models::SignInRequest,
            models::ProtectedPage, models::LoginPage,
        )
    ),
    tags(
        (name = "session-gate", description = "Role-gated navigation API")
    )
)]
struct ApiDoc;

/// AppState
///
/// Shared by every request. Holds the one `IdentityProvider` of the process; the session
/// client is `None` when the demo identity source is active.
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<IdentityProvider>,
    pub sessions: Option<SessionClientState>,
    pub config: AppConfig,
}

/// create_router
///
/// Assembles the routing structure, the role gates, and the observability layers.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        // Each protected tree carries its own RoleGate; the requirement is fixed here.
        .merge(admin::admin_routes(&state))
        .merge(account::account_routes(&state))
        .with_state(state);

    base_router
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Span for `TraceLayer` that carries the `x-request-id`, so every log line of one request
/// correlates.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
