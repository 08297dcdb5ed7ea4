//! Session lifecycle guard.
//!
//! Ends the session when the token expires, after an idle period, when the
//! API answers 401, or when another console signs out. Every path funnels
//! into [`SessionGuard::terminate`], which clears the token and identity and
//! navigates to the login view exactly once per session.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::claims::{decode_claims, DecodeError};
use super::session::{SessionStore, TOKEN_KEY, USER_KEY};
use crate::api::{ApiClient, HookId, UnauthorizedHook};
use crate::config::GuardConfig;
use crate::storage::{SessionStorage, StorageEvent};

/// Where the guard sends the user once the session is over
pub trait Navigator: Send + Sync {
    fn navigate(&self, path: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    /// Not started, or stopped
    Stopped,
    /// Timers armed
    Authenticated,
    /// Timers disarmed, redirected to login
    LoggedOut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutReason {
    TokenExpired,
    UndecodableToken(DecodeError),
    Idle,
    Unauthorized,
    CrossTab,
}

impl LogoutReason {
    /// i18n key for the notice shown after logout
    pub fn message_key(&self) -> &'static str {
        match self {
            Self::TokenExpired => "session.expired",
            Self::UndecodableToken(_) => "session.invalidToken",
            Self::Idle => "session.idle",
            Self::Unauthorized => "session.unauthorized",
            Self::CrossTab => "session.crossTab",
        }
    }
}

/// User input that counts as activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActivityKind {
    PointerDown,
    KeyDown,
    Scroll,
    TouchStart,
    Click,
}

pub const TRACKED_ACTIVITY: [ActivityKind; 5] = [
    ActivityKind::PointerDown,
    ActivityKind::KeyDown,
    ActivityKind::Scroll,
    ActivityKind::TouchStart,
    ActivityKind::Click,
];

/// Outcome of [`SessionGuard::schedule_expiry_logout`]
#[derive(Debug, Clone, PartialEq)]
pub enum ExpirySchedule {
    /// Guard is not in the authenticated state; nothing armed
    Inactive,
    /// No token stored; nothing armed
    NoToken,
    /// Logout timer armed
    Armed { fires_in: Duration },
    /// Token was expired or unreadable and the session was ended on the spot
    Terminated(LogoutReason),
}

#[derive(Default)]
struct Tasks {
    expiry: Option<JoinHandle<()>>,
    idle: Option<JoinHandle<()>>,
    listener: Option<JoinHandle<()>>,
}

struct Inner {
    session: SessionStore,
    navigator: Arc<dyn Navigator>,
    config: GuardConfig,
    state: Mutex<GuardState>,
    tasks: Mutex<Tasks>,
    hook: Mutex<Option<(ApiClient, HookId)>>,
    logouts: watch::Sender<Option<LogoutReason>>,
}

/// Watches one console's session. Clone is cheap; clones share state.
#[derive(Clone)]
pub struct SessionGuard {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn replace_task(slot: &mut Option<JoinHandle<()>>, task: Option<JoinHandle<()>>) {
    if let Some(previous) = std::mem::replace(slot, task) {
        previous.abort();
    }
}

impl SessionGuard {
    pub fn new(storage: Arc<dyn SessionStorage>, navigator: Arc<dyn Navigator>, config: GuardConfig) -> Self {
        let (logouts, _) = watch::channel(None);
        Self {
            inner: Arc::new(Inner {
                session: SessionStore::new(storage),
                navigator,
                config,
                state: Mutex::new(GuardState::Stopped),
                tasks: Mutex::new(Tasks::default()),
                hook: Mutex::new(None),
                logouts,
            }),
        }
    }

    /// Begin guarding the stored session. Must run inside a tokio runtime.
    /// Calling it again (after a fresh login) re-initializes the guard.
    pub fn start(&self) {
        let inner = &self.inner;
        inner.abort_tasks();
        *lock(&inner.state) = GuardState::Authenticated;
        inner.logouts.send_replace(None);

        let events = inner.session.storage().subscribe();
        let listener = tokio::spawn(listen(Arc::downgrade(inner), events));
        replace_task(&mut lock(&inner.tasks).listener, Some(listener));

        let expiry = inner.schedule_expiry();
        let idle_armed = inner.arm_idle();
        info!(?expiry, idle_armed, "Session guard started");
    }

    /// Stop guarding: disarm timers, drop the storage subscription and
    /// remove the unauthorized hook if this guard installed it.
    pub fn stop(&self) {
        self.inner.abort_tasks();
        self.inner.remove_hook();
        *lock(&self.inner.state) = GuardState::Stopped;
        debug!("Session guard stopped");
    }

    pub fn state(&self) -> GuardState {
        *lock(&self.inner.state)
    }

    pub fn config(&self) -> &GuardConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &SessionStore {
        &self.inner.session
    }

    /// Latest logout reason; `None` while the session is alive
    pub fn subscribe_logouts(&self) -> watch::Receiver<Option<LogoutReason>> {
        self.inner.logouts.subscribe()
    }

    /// Re-read the token and arm the expiry timer for it
    pub fn schedule_expiry_logout(&self) -> ExpirySchedule {
        self.inner.schedule_expiry()
    }

    /// Restart the idle countdown. Returns false when not authenticated.
    pub fn arm_idle_timer(&self) -> bool {
        self.inner.arm_idle()
    }

    pub fn record_activity(&self, kind: ActivityKind) -> bool {
        let armed = self.inner.arm_idle();
        if armed {
            debug!(?kind, "Activity recorded");
        }
        armed
    }

    /// Route the client's 401 responses to this guard.
    /// Returns false when some hook is already installed on the client.
    pub fn intercept_unauthorized(&self, client: &ApiClient) -> bool {
        let weak = Arc::downgrade(&self.inner);
        let hook: UnauthorizedHook = Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                inner.terminate(LogoutReason::Unauthorized);
            }
        });

        match client.install_unauthorized_hook(hook) {
            Some(id) => {
                let previous = lock(&self.inner.hook).replace((client.clone(), id));
                if let Some((old_client, old_id)) = previous {
                    old_client.remove_unauthorized_hook(old_id);
                }
                true
            }
            None => {
                debug!("Unauthorized hook already installed");
                false
            }
        }
    }

    pub fn on_storage_change(&self, event: &StorageEvent) {
        self.inner.on_storage_change(event);
    }

    /// End the session. Returns true only for the call that actually
    /// performed the logout.
    pub fn terminate(&self, reason: LogoutReason) -> bool {
        self.inner.terminate(reason)
    }
}

impl Inner {
    fn schedule_expiry(self: &Arc<Self>) -> ExpirySchedule {
        replace_task(&mut lock(&self.tasks).expiry, None);

        if *lock(&self.state) != GuardState::Authenticated {
            return ExpirySchedule::Inactive;
        }

        let Some(token) = self.session.token() else {
            debug!("No token stored; expiry timer not armed");
            return ExpirySchedule::NoToken;
        };

        let claims = match decode_claims(&token) {
            Ok(claims) => claims,
            Err(e) => {
                warn!(error = %e, "Stored token is unreadable; ending session");
                let reason = LogoutReason::UndecodableToken(e);
                self.terminate(reason.clone());
                return ExpirySchedule::Terminated(reason);
            }
        };

        let remaining = match claims.time_to_live(Utc::now()).to_std() {
            Ok(remaining) if !remaining.is_zero() => remaining,
            _ => {
                info!(expired_at = %claims.expires_at, "Token already expired");
                self.terminate(LogoutReason::TokenExpired);
                return ExpirySchedule::Terminated(LogoutReason::TokenExpired);
            }
        };

        let fires_in = remaining + self.config.expiry_buffer();
        let state = lock(&self.state);
        if *state != GuardState::Authenticated {
            return ExpirySchedule::Inactive;
        }
        let weak = Arc::downgrade(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(fires_in).await;
            if let Some(inner) = weak.upgrade() {
                inner.terminate(LogoutReason::TokenExpired);
            }
        });
        replace_task(&mut lock(&self.tasks).expiry, Some(timer));
        drop(state);

        debug!(expires_at = %claims.expires_at, fires_in_ms = fires_in.as_millis() as u64, "Expiry timer armed");
        ExpirySchedule::Armed { fires_in }
    }

    fn arm_idle(self: &Arc<Self>) -> bool {
        // Held while arming so a concurrent terminate cannot miss this timer
        let state = lock(&self.state);
        if *state != GuardState::Authenticated {
            return false;
        }
        let budget = self.config.idle_timeout();
        let weak = Arc::downgrade(self);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            if let Some(inner) = weak.upgrade() {
                info!(idle_secs = budget.as_secs(), "No activity; ending session");
                inner.terminate(LogoutReason::Idle);
            }
        });
        replace_task(&mut lock(&self.tasks).idle, Some(timer));
        true
    }

    fn on_storage_change(self: &Arc<Self>, event: &StorageEvent) {
        match event.key.as_deref() {
            Some(TOKEN_KEY) => {
                if *lock(&self.state) == GuardState::Authenticated {
                    debug!(present = event.new_value.is_some(), "Token changed in another console");
                    self.schedule_expiry();
                }
            }
            Some(USER_KEY) if event.new_value.is_none() => {
                info!("Signed out in another console");
                self.terminate(LogoutReason::CrossTab);
            }
            other => debug!(key = ?other, "Ignoring storage change"),
        }
    }

    /// Catch up after missed notifications
    fn resync(self: &Arc<Self>) {
        if self.session.user().is_none() {
            self.terminate(LogoutReason::CrossTab);
        } else {
            self.schedule_expiry();
        }
    }

    fn terminate(&self, reason: LogoutReason) -> bool {
        {
            let mut state = lock(&self.state);
            if *state != GuardState::Authenticated {
                debug!(?reason, state = ?*state, "Session already ended");
                return false;
            }
            *state = GuardState::LoggedOut;
        }

        {
            let mut tasks = lock(&self.tasks);
            replace_task(&mut tasks.expiry, None);
            replace_task(&mut tasks.idle, None);
        }

        info!(?reason, "Terminating session");
        if let Err(e) = self.session.terminate() {
            warn!(error = %e, "Failed to clear session storage");
        }
        self.navigator.navigate(&self.config.login_path);
        self.logouts.send_replace(Some(reason));
        true
    }

    fn abort_tasks(&self) {
        let mut tasks = lock(&self.tasks);
        replace_task(&mut tasks.expiry, None);
        replace_task(&mut tasks.idle, None);
        replace_task(&mut tasks.listener, None);
    }

    fn remove_hook(&self) {
        if let Some((client, id)) = lock(&self.hook).take() {
            client.remove_unauthorized_hook(id);
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.abort_tasks();
        self.remove_hook();
    }
}

async fn listen(weak: Weak<Inner>, mut events: broadcast::Receiver<StorageEvent>) {
    loop {
        let event = events.recv().await;
        let Some(inner) = weak.upgrade() else {
            break;
        };
        match event {
            Ok(event) => inner.on_storage_change(&event),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!(skipped, "Missed storage notifications; resyncing");
                inner.resync();
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
