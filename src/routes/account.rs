use crate::{
    AppState,
    auth::{RoleGate, role_gate},
    handlers,
    models::Role,
};
use axum::{Router, middleware, routing::get};

/// Account Router Module
///
/// The customer area. Requires `Role::Customer`; `/account` is the customer role's home.
pub fn account_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/account", get(handlers::account_home))
        .route("/account/profile", get(handlers::account_profile))
        .route_layer(middleware::from_fn_with_state(
            RoleGate::new(state.provider.clone(), Role::Customer),
            role_gate,
        ))
}
