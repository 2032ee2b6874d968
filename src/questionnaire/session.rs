//! Questionnaire sessions: state ownership, submission and fan-out.
//!
//! A `QuestionnaireSession` owns one `WizardState` and publishes a
//! [`WizardUpdate`] on every transition. Collaborators (identity, store, LLM
//! requester) are injected; nothing here reaches for globals.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{DatabaseError, QuestionnaireError};
use crate::identity::{AuthUser, IdentityProvider};
use crate::store::{Database, StoredItinerary};

use super::model::FinalizedPreferences;
use super::requester::RecommendationRequester;
use super::state::{RecommendationView, WizardEvent, WizardState};

/// Broadcast channel capacity per session.
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// A state transition, as seen by subscribers.
#[derive(Debug, Clone, Serialize)]
pub struct WizardUpdate {
    /// Kind of the event that produced this state.
    pub event: &'static str,
    pub state: WizardState,
}

/// Collaborators shared by every session.
#[derive(Clone)]
pub struct SessionDeps {
    pub identity: Arc<dyn IdentityProvider>,
    pub db: Arc<dyn Database>,
    pub requester: Arc<RecommendationRequester>,
}

/// Bounds on session lifetime and on the calls a submission makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionLimits {
    /// Applies separately to the identity lookup and the preferences insert.
    pub call_timeout: Duration,
    /// Sessions untouched for this long are dropped.
    pub idle_timeout: Duration,
    /// Least recently used sessions are dropped beyond this count.
    pub max_sessions: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(30 * 60),
            max_sessions: 10_000,
        }
    }
}

pub struct QuestionnaireSession {
    id: Uuid,
    state: RwLock<WizardState>,
    /// Set once the submission has been persisted.
    record: RwLock<Option<FinalizedPreferences>>,
    tx: broadcast::Sender<WizardUpdate>,
    deps: SessionDeps,
    call_timeout: Duration,
    created: Instant,
    /// Milliseconds after `created` of the last access.
    touched_ms: AtomicU64,
}

impl QuestionnaireSession {
    pub fn new(deps: SessionDeps, call_timeout: Duration) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Arc::new(Self {
            id: Uuid::new_v4(),
            state: RwLock::new(WizardState::new()),
            record: RwLock::new(None),
            tx,
            deps,
            call_timeout,
            created: Instant::now(),
            touched_ms: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn touch(&self) {
        let ms = u64::try_from(self.created.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.touched_ms.store(ms, Ordering::Relaxed);
    }

    /// Time since the session was last looked up or changed.
    pub fn idle_for(&self) -> Duration {
        let touched = Duration::from_millis(self.touched_ms.load(Ordering::Relaxed));
        self.created.elapsed().saturating_sub(touched)
    }

    /// A submission is running, or the state is locked right now.
    fn is_busy(&self) -> bool {
        self.state.try_read().map(|s| s.submitting).unwrap_or(true)
    }

    /// Subscribe to state transitions. Each WebSocket client calls this.
    pub fn subscribe(&self) -> broadcast::Receiver<WizardUpdate> {
        self.tx.subscribe()
    }

    pub async fn snapshot(&self) -> WizardState {
        self.state.read().await.clone()
    }

    /// The persisted record, once submission got that far.
    pub async fn submitted_record(&self) -> Option<FinalizedPreferences> {
        self.record.read().await.clone()
    }

    /// Apply one event and return the resulting state.
    pub async fn dispatch(&self, event: WizardEvent) -> WizardState {
        let kind = event.kind();
        self.mutate(kind, |state| state.apply(event)).await.1
    }

    /// Run `f` under the write lock and publish if the state changed.
    async fn mutate<R>(
        &self,
        kind: &'static str,
        f: impl FnOnce(&mut WizardState) -> R,
    ) -> (R, WizardState) {
        self.touch();
        let mut state = self.state.write().await;
        let before = (*state).clone();
        let result = f(&mut *state);
        let after = (*state).clone();
        drop(state);

        if after != before {
            debug!(session_id = %self.id, event = kind, step = after.step.index(), "Questionnaire updated");
            // Ok if no receivers are listening
            let _ = self.tx.send(WizardUpdate {
                event: kind,
                state: after.clone(),
            });
        }
        (result, after)
    }

    /// Submit the questionnaire on behalf of whoever `access_token` identifies.
    ///
    /// Persists the finalized record, then makes exactly one generation call.
    /// A call made while another submission is in flight (or after one
    /// succeeded) returns immediately without side effects. Generation
    /// failures are not errors here: they come back as a failed view.
    pub async fn submit(
        &self,
        access_token: Option<&str>,
    ) -> Result<RecommendationView, QuestionnaireError> {
        let (started, state) = self.mutate("submit", WizardState::begin_submit).await;
        if let Err(e) = started {
            debug!(session_id = %self.id, error = %e, "Submit rejected");
            return Err(e);
        }

        let user = match self.resolve_user(access_token).await {
            Some(user) => user,
            None => return Err(self.fail_submit(QuestionnaireError::NotAuthenticated).await),
        };

        let record = match FinalizedPreferences::from_draft(
            &state.draft,
            state.custom_day_count,
            &state.custom_destinations,
            user.id,
        ) {
            Ok(record) => record,
            Err(e) => return Err(self.fail_submit(e).await),
        };

        let saved = tokio::time::timeout(self.call_timeout, self.deps.db.insert_preferences(&record))
            .await
            .unwrap_or_else(|_| {
                Err(DatabaseError::Query(format!(
                    "store did not answer within {:?}",
                    self.call_timeout
                )))
            });
        if let Err(e) = saved {
            warn!(session_id = %self.id, error = %e, "Failed to save travel preferences");
            return Err(self
                .fail_submit(QuestionnaireError::PersistenceFailure(e.to_string()))
                .await);
        }
        info!(session_id = %self.id, record_id = %record.id, user_id = %record.user_id, "Travel preferences saved");

        *self.record.write().await = Some(record.clone());
        self.dispatch(WizardEvent::Persisted {
            record_id: record.id,
        })
        .await;

        let recommendation = self.deps.requester.request(&record).await;
        if let Some(itinerary) = &recommendation.itinerary {
            let stored = StoredItinerary {
                preferences_id: record.id,
                model: self.deps.requester.model_name().to_string(),
                content: itinerary.raw.clone(),
                created_at: Utc::now(),
            };
            if let Err(e) = self.deps.db.save_itinerary(&stored).await {
                warn!(record_id = %record.id, error = %e, "Failed to save itinerary");
            }
        }

        let state = self.dispatch(recommendation.into_event()).await;
        Ok(state.results.unwrap_or_default())
    }

    /// Lookup failures and timeouts count as signed out.
    async fn resolve_user(&self, access_token: Option<&str>) -> Option<AuthUser> {
        let lookup = self.deps.identity.current_user(access_token);
        match tokio::time::timeout(self.call_timeout, lookup).await {
            Ok(Ok(user)) => user,
            Ok(Err(e)) => {
                warn!(session_id = %self.id, error = %e, "Identity lookup failed");
                None
            }
            Err(_) => {
                warn!(session_id = %self.id, timeout = ?self.call_timeout, "Identity lookup timed out");
                None
            }
        }
    }

    async fn fail_submit(&self, error: QuestionnaireError) -> QuestionnaireError {
        self.dispatch(WizardEvent::SubmitFailed {
            message: error.to_string(),
        })
        .await;
        error
    }
}

/// In-memory map of live sessions.
///
/// Sessions idle past [`SessionLimits::idle_timeout`] are dropped on the next
/// `create` or `sweep`, and the least recently used go first once
/// `max_sessions` is reached. A session with a submission in flight is never
/// dropped.
pub struct SessionRegistry {
    deps: SessionDeps,
    limits: SessionLimits,
    sessions: RwLock<HashMap<Uuid, Arc<QuestionnaireSession>>>,
}

impl SessionRegistry {
    pub fn new(deps: SessionDeps, limits: SessionLimits) -> Arc<Self> {
        Arc::new(Self {
            deps,
            limits,
            sessions: RwLock::new(HashMap::new()),
        })
    }

    pub fn deps(&self) -> &SessionDeps {
        &self.deps
    }

    pub async fn create(&self) -> Arc<QuestionnaireSession> {
        let session = QuestionnaireSession::new(self.deps.clone(), self.limits.call_timeout);
        let mut sessions = self.sessions.write().await;
        let evicted = evict(&mut *sessions, &self.limits, 1);
        sessions.insert(session.id(), session.clone());
        drop(sessions);

        if evicted > 0 {
            debug!(evicted, "Dropped idle questionnaire sessions");
        }
        info!(session_id = %session.id(), "Questionnaire session started");
        session
    }

    pub async fn get(&self, id: Uuid) -> Option<Arc<QuestionnaireSession>> {
        let session = self.sessions.read().await.get(&id).cloned()?;
        session.touch();
        Some(session)
    }

    pub async fn remove(&self, id: Uuid) -> bool {
        let removed = self.sessions.write().await.remove(&id).is_some();
        if removed {
            info!(session_id = %id, "Questionnaire session closed");
        }
        removed
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Drop expired sessions. Returns how many went.
    pub async fn sweep(&self) -> usize {
        let evicted = evict(&mut *self.sessions.write().await, &self.limits, 0);
        if evicted > 0 {
            info!(evicted, "Dropped idle questionnaire sessions");
        }
        evicted
    }
}

/// Sweep `registry` once a minute.
pub fn spawn_sweep_task(registry: Arc<SessionRegistry>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        loop {
            interval.tick().await;
            registry.sweep().await;
        }
    })
}

/// Remove idle sessions, then the least recently used until `room` more fit.
fn evict(
    sessions: &mut HashMap<Uuid, Arc<QuestionnaireSession>>,
    limits: &SessionLimits,
    room: usize,
) -> usize {
    let before = sessions.len();
    sessions.retain(|_, s| s.is_busy() || s.idle_for() < limits.idle_timeout);

    let cap = limits.max_sessions.saturating_sub(room);
    if sessions.len() > cap {
        let mut idle: Vec<(Uuid, Duration)> = sessions
            .iter()
            .filter(|(_, s)| !s.is_busy())
            .map(|(id, s)| (*id, s.idle_for()))
            .collect();
        idle.sort_by(|a, b| b.1.cmp(&a.1));
        let excess = sessions.len() - cap;
        for (id, _) in idle.into_iter().take(excess) {
            sessions.remove(&id);
        }
    }
    before - sessions.len()
}
