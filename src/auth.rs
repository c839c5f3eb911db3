use axum::{
    Json,
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use std::sync::Arc;

use crate::{
    guard::{LOGIN_PATH, decide},
    identity::IdentityProvider,
    models::{DecisionResponse, GuardDecision, Role, SessionStatus},
};

/// RoleGate
///
/// Middleware state for one protected route tree: the shared provider plus the role the
/// tree requires. The requirement is fixed when the router is built.
#[derive(Clone)]
pub struct RoleGate {
    provider: Arc<IdentityProvider>,
    required: Role,
}

impl RoleGate {
    pub fn new(provider: Arc<IdentityProvider>, required: Role) -> Self {
        Self { provider, required }
    }
}

/// role_gate
///
/// Applies the route guard decision to every request entering a protected tree.
///
/// * `ShowLoading`: 503 with `Retry-After` and a loading placeholder body; nothing protected
///   is rendered while the session is still resolving.
/// * Redirects: `303 See Other`. Browsers do not keep the redirecting URL in history, so this
///   is the HTTP form of a replacing navigation.
/// * `RenderContent`: the resolved `Identity` is attached as a request extension, so the
///   handler sees exactly the identity that was authorized.
pub async fn role_gate(State(gate): State<RoleGate>, mut request: Request, next: Next) -> Response {
    let transition = gate.provider.transition();
    let decision = decide(&transition.status, gate.required);

    match (decision, transition.status) {
        (GuardDecision::RenderContent, SessionStatus::Authenticated(identity)) => {
            request.extensions_mut().insert(identity);
            next.run(request).await
        }
        (GuardDecision::ShowLoading, _) => (
            StatusCode::SERVICE_UNAVAILABLE,
            [(header::RETRY_AFTER, "1")],
            Json(DecisionResponse {
                revision: transition.revision,
                required: gate.required,
                decision,
                redirect: None,
                replace: false,
            }),
        )
            .into_response(),
        (decision, _) => {
            let target = decision.redirect_target().unwrap_or(LOGIN_PATH);
            tracing::debug!(
                uri = %request.uri(),
                required = %gate.required,
                target,
                "access denied, redirecting"
            );
            Redirect::to(target).into_response()
        }
    }
}
