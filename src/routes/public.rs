use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session. Redirect decisions land here (`/login`), and the
/// navigation layer uses `/session` and `/guard/{role}` to follow the provider's state.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        .route("/health", get(|| async { "ok" }))
        // GET /login
        // Target of every RedirectToLogin decision.
        .route("/login", get(handlers::login_page))
        // GET/POST/DELETE /session
        // Read the current status, hand over a token pair, or sign out.
        .route(
            "/session",
            get(handlers::get_session)
                .post(handlers::sign_in)
                .delete(handlers::sign_out),
        )
        // POST /session/reverify
        .route("/session/reverify", post(handlers::reverify_session))
        // GET /guard/{role}?after=N
        // Decision for a route requiring `role`; long-polls when `after` is current.
        .route("/guard/{role}", get(handlers::get_guard_decision))
}
