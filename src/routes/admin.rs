use crate::{
    AppState,
    auth::{RoleGate, role_gate},
    handlers,
    models::Role,
};
use axum::{Router, middleware, routing::get};

/// Admin Router Module
///
/// Everything under `/admin` requires `Role::Admin`. `/admin` itself is the admin role's
/// home, so wrong-role visitors elsewhere are redirected here.
pub fn admin_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/admin", get(handlers::admin_home))
        .route("/admin/overview", get(handlers::admin_overview))
        // route_layer: unmatched paths still 404 instead of being redirected.
        .route_layer(middleware::from_fn_with_state(
            RoleGate::new(state.provider.clone(), Role::Admin),
            role_gate,
        ))
}
