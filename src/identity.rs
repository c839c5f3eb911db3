use async_trait::async_trait;
use std::{
    collections::HashMap,
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError, Weak},
    time::Duration,
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use uuid::Uuid;

use crate::{
    config::DemoIdentity,
    error::SessionError,
    models::{Identity, Role, SessionEvent, SessionStatus, StoredSession, Transition},
    repository::ProfileRepositoryState,
    session::SessionClientState,
};

// --- Identity Sources ---

/// IdentitySource
///
/// The capability an `IdentityProvider` is constructed with. The provider's state machine
/// is identical whichever source is active; only the identities it yields differ.
#[async_trait]
pub trait IdentitySource: Send + Sync {
    /// Resolves the existing (e.g. persisted) session, if any.
    async fn current_identity(&self) -> Result<Option<Identity>, SessionError>;

    /// Resolves the identity behind a session delivered by a change notification.
    async fn identity_for(&self, session: &StoredSession) -> Result<Option<Identity>, SessionError>;

    /// Session change stream. `None` for sources that never change.
    fn changes(&self) -> Option<broadcast::Receiver<SessionEvent>>;

    fn name(&self) -> &'static str;
}

pub type IdentitySourceState = Arc<dyn IdentitySource>;

/// BackendIdentitySource
///
/// The real source: a session client for discovery and change notification, and a profile
/// repository that maps the session's user to a role.
pub struct BackendIdentitySource {
    sessions: SessionClientState,
    profiles: ProfileRepositoryState,
}

impl BackendIdentitySource {
    pub fn new(sessions: SessionClientState, profiles: ProfileRepositoryState) -> Self {
        Self { sessions, profiles }
    }
}

#[async_trait]
impl IdentitySource for BackendIdentitySource {
    async fn current_identity(&self) -> Result<Option<Identity>, SessionError> {
        match self.sessions.get_current_session().await? {
            Some(session) => self.identity_for(&session).await,
            None => Ok(None),
        }
    }

    async fn identity_for(&self, session: &StoredSession) -> Result<Option<Identity>, SessionError> {
        let profile = self
            .profiles
            .get_profile(session.user_id, &session.access_token)
            .await?
            .ok_or(SessionError::ProfileMissing(session.user_id))?;

        Identity::try_from(profile).map(Some)
    }

    fn changes(&self) -> Option<broadcast::Receiver<SessionEvent>> {
        Some(self.sessions.on_session_change())
    }

    fn name(&self) -> &'static str {
        "backend"
    }
}

/// DemoIdentitySource
///
/// Offline fallback used when the backend is not configured. Always yields the same
/// fixture and never touches the network.
#[derive(Clone, Debug)]
pub struct DemoIdentitySource {
    identity: Option<Identity>,
}

pub const DEMO_CUSTOMER_ID: Uuid = Uuid::from_u128(0x00000000_0000_4000_8000_00000000c001);
pub const DEMO_ADMIN_ID: Uuid = Uuid::from_u128(0x00000000_0000_4000_8000_00000000a001);

impl DemoIdentitySource {
    pub fn new(fixture: DemoIdentity) -> Self {
        let identity = fixture.role().map(|role| match role {
            Role::Customer => Identity {
                id: DEMO_CUSTOMER_ID,
                role,
                email: "demo.customer@example.com".to_string(),
                full_name: Some("Demo Customer".to_string()),
            },
            Role::Admin => Identity {
                id: DEMO_ADMIN_ID,
                role,
                email: "demo.admin@example.com".to_string(),
                full_name: Some("Demo Admin".to_string()),
            },
        });
        Self { identity }
    }
}

#[async_trait]
impl IdentitySource for DemoIdentitySource {
    async fn current_identity(&self) -> Result<Option<Identity>, SessionError> {
        Ok(self.identity.clone())
    }

    async fn identity_for(&self, _session: &StoredSession) -> Result<Option<Identity>, SessionError> {
        Ok(self.identity.clone())
    }

    fn changes(&self) -> Option<broadcast::Receiver<SessionEvent>> {
        None
    }

    fn name(&self) -> &'static str {
        "demo"
    }
}

// --- Provider ---

struct Registry {
    current: Transition,
    next_id: u64,
    subscribers: HashMap<u64, mpsc::UnboundedSender<Transition>>,
}

type SharedRegistry = Arc<Mutex<Registry>>;

fn lock(registry: &Mutex<Registry>) -> MutexGuard<'_, Registry> {
    // Nothing panics while holding the lock, but a poisoned registry is still consistent.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

enum Command {
    Reverify,
}

struct Worker {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

/// IdentityProvider
///
/// Single source of truth for `SessionStatus`. One instance is created at startup and
/// handed to every consumer through `AppState`; only its resolution task writes the status.
///
/// Consumers either read the current value with `status()` or `subscribe()` to receive
/// every transition, in emission order, over their own channel.
pub struct IdentityProvider {
    source: IdentitySourceState,
    resolution_timeout: Duration,
    registry: SharedRegistry,
    worker: Mutex<Option<Worker>>,
}

impl IdentityProvider {
    pub fn new(source: IdentitySourceState, resolution_timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            source,
            resolution_timeout,
            registry: Arc::new(Mutex::new(Registry {
                current: Transition {
                    revision: 0,
                    status: SessionStatus::Resolving,
                },
                next_id: 0,
                subscribers: HashMap::new(),
            })),
            worker: Mutex::new(None),
        })
    }

    pub fn status(&self) -> SessionStatus {
        lock(&self.registry).current.status.clone()
    }

    /// The current status together with its revision.
    pub fn transition(&self) -> Transition {
        lock(&self.registry).current.clone()
    }

    /// subscribe
    ///
    /// Registers a consumer. The snapshot in `Subscription::initial` is taken under the same
    /// lock as the registration, so the first transition received is always the one right
    /// after the snapshot.
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut registry = lock(&self.registry);
        let id = registry.next_id;
        registry.next_id += 1;
        registry.subscribers.insert(id, tx);

        Subscription {
            id,
            initial: registry.current.clone(),
            receiver: rx,
            registry: Arc::downgrade(&self.registry),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).subscribers.len()
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    pub fn is_active(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|worker| !worker.task.is_finished())
    }

    /// activate
    ///
    /// Starts session discovery. Status stays `Resolving` until the first attempt finishes,
    /// successfully or not. Calling it again while active does nothing.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn activate(&self) {
        let mut worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        if worker.as_ref().is_some_and(|w| !w.task.is_finished()) {
            return;
        }

        let (commands, command_rx) = mpsc::unbounded_channel();
        let resolver = Resolver {
            source: self.source.clone(),
            registry: self.registry.clone(),
            timeout: self.resolution_timeout,
        };

        tracing::info!(source = self.source.name(), "activating identity provider");
        let task = tokio::spawn(resolver.run(command_rx));
        *worker = Some(Worker { commands, task });
    }

    /// reverify
    ///
    /// Re-enters `Resolving` and resolves the current session again. Returns false when the
    /// provider is not active.
    pub fn reverify(&self) -> bool {
        let worker = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        match worker.as_ref() {
            Some(worker) if !worker.task.is_finished() => worker.commands.send(Command::Reverify).is_ok(),
            _ => false,
        }
    }

    /// shutdown
    ///
    /// Stops the resolution task and releases every subscriber. Pending `Subscription::recv`
    /// calls return `None`.
    pub fn shutdown(&self) {
        if let Some(worker) = self.worker.lock().unwrap_or_else(PoisonError::into_inner).take() {
            worker.task.abort();
        }
        lock(&self.registry).subscribers.clear();
        tracing::info!("identity provider shut down");
    }
}

impl Drop for IdentityProvider {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.get_mut().unwrap_or_else(PoisonError::into_inner).take() {
            worker.task.abort();
        }
    }
}

/// Subscription
///
/// A consumer's registration with the provider. Dropping it unregisters the consumer, after
/// which no transition is delivered to it.
pub struct Subscription {
    id: u64,
    initial: Transition,
    receiver: mpsc::UnboundedReceiver<Transition>,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn initial(&self) -> &Transition {
        &self.initial
    }

    /// Next transition after the snapshot, or `None` once the provider has shut down.
    pub async fn recv(&mut self) -> Option<Transition> {
        self.receiver.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            lock(&registry).subscribers.remove(&self.id);
        }
    }
}

// --- Resolution Task ---

struct Resolver {
    source: IdentitySourceState,
    registry: SharedRegistry,
    timeout: Duration,
}

impl Resolver {
    async fn run(self, mut commands: mpsc::UnboundedReceiver<Command>) {
        // Subscribe before the first lookup so a sign-in racing with startup is not lost.
        let mut changes = self.source.changes();

        let status = self.settle(self.source.current_identity()).await;
        self.publish(status);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Reverify) => {
                        self.publish(SessionStatus::Resolving);
                        let status = self.settle(self.source.current_identity()).await;
                        self.publish(status);
                    }
                    None => break,
                },
                event = next_event(&mut changes) => match event {
                    Ok(SessionEvent::SignedOut) => self.publish(SessionStatus::Unauthenticated),
                    Ok(SessionEvent::SignedIn(session)) | Ok(SessionEvent::TokenRefreshed(session)) => {
                        let status = self.settle(self.source.identity_for(&session)).await;
                        self.publish(status);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "missed session changes, resolving from scratch");
                        let status = self.settle(self.source.current_identity()).await;
                        self.publish(status);
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::debug!("session change stream closed");
                        changes = None;
                    }
                },
            }
        }
    }

    /// Runs one resolution attempt and maps every failure mode to `Unauthenticated`.
    async fn settle<F>(&self, attempt: F) -> SessionStatus
    where
        F: Future<Output = Result<Option<Identity>, SessionError>>,
    {
        match tokio::time::timeout(self.timeout, attempt).await {
            Ok(Ok(identity)) => identity.into(),
            Ok(Err(error)) => {
                tracing::warn!(%error, source = self.source.name(), "session resolution failed");
                SessionStatus::Unauthenticated
            }
            Err(_) => {
                tracing::warn!(
                    timeout_ms = self.timeout.as_millis() as u64,
                    source = self.source.name(),
                    "session resolution timed out"
                );
                SessionStatus::Unauthenticated
            }
        }
    }

    fn publish(&self, status: SessionStatus) {
        let mut registry = lock(&self.registry);
        if registry.current.status == status {
            tracing::debug!(revision = registry.current.revision, "status unchanged, not emitting");
            return;
        }

        let transition = Transition {
            revision: registry.current.revision + 1,
            status,
        };
        tracing::info!(
            revision = transition.revision,
            state = state_name(&transition.status),
            user_id = ?transition.status.identity().map(|i| i.id),
            "session status changed"
        );

        registry.current = transition.clone();
        // Delivery happens under the lock: every subscriber sees the same order.
        registry
            .subscribers
            .retain(|_, tx| tx.send(transition.clone()).is_ok());
    }
}

async fn next_event(
    changes: &mut Option<broadcast::Receiver<SessionEvent>>,
) -> Result<SessionEvent, broadcast::error::RecvError> {
    match changes {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn state_name(status: &SessionStatus) -> &'static str {
    match status {
        SessionStatus::Resolving => "resolving",
        SessionStatus::Unauthenticated => "unauthenticated",
        SessionStatus::Authenticated(_) => "authenticated",
    }
}
