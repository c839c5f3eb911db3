use std::sync::{Arc, Mutex, PoisonError};

use crate::{
    identity::{IdentityProvider, Subscription},
    models::{GuardDecision, Role, SessionStatus},
};

/// Where anonymous visitors are sent.
pub const LOGIN_PATH: &str = "/login";

/// home_for_role
///
/// Canonical landing destination for each role. Total over `Role`.
pub fn home_for_role(role: Role) -> &'static str {
    match role {
        Role::Admin => "/admin",
        Role::Customer => "/account",
    }
}

/// decide
///
/// Pure decision function for one route evaluation.
///
/// An authenticated visitor with the wrong role goes to their own role's home, not to login:
/// they are not anonymous, and their home can never bounce them back here.
pub fn decide(status: &SessionStatus, required: Role) -> GuardDecision {
    match status {
        SessionStatus::Resolving => GuardDecision::ShowLoading,
        SessionStatus::Unauthenticated => GuardDecision::RedirectToLogin,
        SessionStatus::Authenticated(identity) if identity.role == required => {
            GuardDecision::RenderContent
        }
        SessionStatus::Authenticated(identity) => GuardDecision::RedirectToRoleHome {
            role: identity.role,
        },
    }
}

impl GuardDecision {
    /// Destination of a redirect decision. Callers must navigate there by replacing the
    /// current history entry, never by pushing.
    pub fn redirect_target(&self) -> Option<&'static str> {
        match self {
            GuardDecision::RedirectToLogin => Some(LOGIN_PATH),
            GuardDecision::RedirectToRoleHome { role } => Some(home_for_role(*role)),
            GuardDecision::ShowLoading | GuardDecision::RenderContent => None,
        }
    }

    pub fn is_redirect(&self) -> bool {
        self.redirect_target().is_some()
    }
}

/// Navigator
///
/// The navigation layer's side of a redirect. `replace` must not leave the denied route in
/// back-history.
pub trait Navigator: Send + Sync {
    fn replace(&self, target: &str);
}

/// RecordingNavigator
///
/// Keeps every replacing navigation it was asked to perform.
#[derive(Debug, Default)]
pub struct RecordingNavigator {
    replaced: Mutex<Vec<String>>,
}

impl RecordingNavigator {
    pub fn history(&self) -> Vec<String> {
        self.replaced.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn last(&self) -> Option<String> {
        self.replaced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl Navigator for RecordingNavigator {
    fn replace(&self, target: &str) {
        self.replaced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(target.to_string());
    }
}

/// RouteGuard
///
/// One mounted guard for a protected route. It decides once on mount and again on every
/// provider transition until it is unmounted or the provider shuts down.
///
/// Transitions are applied strictly by revision, so a replayed or out-of-order delivery can
/// never move the decision backwards.
pub struct RouteGuard {
    required: Role,
    subscription: Subscription,
    revision: u64,
    decision: GuardDecision,
    navigator: Arc<dyn Navigator>,
}

impl RouteGuard {
    pub fn mount(provider: &IdentityProvider, required: Role, navigator: Arc<dyn Navigator>) -> Self {
        let subscription = provider.subscribe();
        let initial = subscription.initial().clone();

        let guard = Self {
            required,
            subscription,
            revision: initial.revision,
            decision: decide(&initial.status, required),
            navigator,
        };
        guard.navigate();
        guard
    }

    pub fn required(&self) -> Role {
        self.required
    }

    pub fn decision(&self) -> GuardDecision {
        self.decision
    }

    /// Revision of the provider transition the current decision was made from.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// next_decision
    ///
    /// Waits for the next provider transition and re-evaluates. Navigates only when the
    /// decision actually changed. Returns `None` once the provider has shut down.
    pub async fn next_decision(&mut self) -> Option<GuardDecision> {
        loop {
            let transition = self.subscription.recv().await?;
            if transition.revision <= self.revision {
                tracing::debug!(
                    revision = transition.revision,
                    applied = self.revision,
                    "ignoring stale transition"
                );
                continue;
            }

            self.revision = transition.revision;
            let decision = decide(&transition.status, self.required);
            if decision != self.decision {
                self.decision = decision;
                self.navigate();
            }
            return Some(decision);
        }
    }

    /// Releases the subscription. Later transitions have no effect on this guard.
    pub fn unmount(self) {
        tracing::debug!(required = %self.required, "route guard unmounted");
    }

    fn navigate(&self) {
        if let Some(target) = self.decision.redirect_target() {
            tracing::debug!(required = %self.required, target, "guard redirecting");
            self.navigator.replace(target);
        }
    }
}
