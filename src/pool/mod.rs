//! Browser Pool Manager (spec §4.4). A single actor: every mutation of the
//! registry/queue happens while holding one `tokio::sync::Mutex`, which is
//! exactly what makes the admission algorithm's check-then-act atomic (spec
//! §5 "the check-then-act at §4.4 step 2/3 is a critical section").

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Instant;

use chrono::Utc;
use rand::Rng;
use sqlx::PgPool;
use tokio::sync::{Mutex, oneshot};
use tracing::{info, warn};
use uuid::Uuid;

use crate::browser::{BrowserBackend, BrowserWorker};
use crate::config::Settings;
use crate::database::pool_registry;
use crate::errors::pool::PoolError;
use crate::models::worker::{WorkerRecord, WorkerStatus, looks_like_opaque_default};

type AcquireResult = Result<(String, String), PoolError>;

struct WaitingRequest {
    id: Uuid,
    #[allow(dead_code)]
    enqueued_at: Instant,
    resolver: oneshot::Sender<AcquireResult>,
}

#[derive(Default)]
struct PoolState {
    registry: HashMap<String, WorkerRecord>,
    workers: HashMap<String, Arc<BrowserWorker>>,
    queue: VecDeque<WaitingRequest>,
}

pub struct PoolManager {
    self_ref: Weak<PoolManager>,
    state: Mutex<PoolState>,
    backend: Arc<dyn BrowserBackend>,
    settings: Settings,
    db: PgPool,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    pub idle: usize,
    pub busy: usize,
    pub error: usize,
    pub closed: usize,
    pub queue_depth: usize,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct BatchResult {
    pub requested: usize,
    pub created: usize,
    pub skipped: usize,
    pub details: Vec<String>,
}

fn new_worker_id() -> String {
    let mut rng = rand::rng();
    let suffix: u32 = rng.random();
    format!("browser-{}-{:08x}", Utc::now().timestamp_millis(), suffix)
}

impl PoolManager {
    pub fn new(backend: Arc<dyn BrowserBackend>, settings: Settings, db: PgPool) -> Arc<Self> {
        Arc::new_cyclic(|weak| PoolManager {
            self_ref: weak.clone(),
            state: Mutex::new(PoolState::default()),
            backend,
            settings,
            db,
        })
    }

    /// Load the durable registry at startup. Live browser sessions do not
    /// survive a process restart, so every previously-persisted record is
    /// dropped rather than advertised as usable -- a fresh worker will be
    /// created on demand by the next `Acquire`. See DESIGN.md for the
    /// tradeoff against reconnecting to orphaned provider sessions.
    pub async fn bootstrap(&self) {
        match pool_registry::load_all(&self.db).await {
            Ok(rows) if !rows.is_empty() => {
                warn!(count = rows.len(), "discarding stale pool registry rows from a prior process");
                let _ = pool_registry::remove_all(&self.db).await;
            }
            Ok(_) => {}
            Err(err) => warn!(error = %err, "failed to load pool registry at startup"),
        }
    }

    /// `Acquire()` -- spec §4.4.
    pub async fn acquire(&self) -> AcquireResult {
        enum Decision {
            UseIdle(String, String),
            CreateNew(String),
            Enqueue,
        }

        let decision = {
            let mut state = self.state.lock().await;
            if let Some((id, record)) = state
                .registry
                .iter_mut()
                .find(|(_, r)| r.status == WorkerStatus::Idle)
            {
                record.status = WorkerStatus::Busy;
                record.last_activity = Utc::now();
                Decision::UseIdle(id.clone(), record.session_id.clone().unwrap_or_default())
            } else if state.registry.len() < self.settings.max_workers {
                Decision::CreateNew(new_worker_id())
            } else {
                Decision::Enqueue
            }
        };

        match decision {
            Decision::UseIdle(id, session_id) => {
                self.persist(&id).await;
                Ok((id, session_id))
            }
            Decision::CreateNew(id) => self.create_and_assign(id).await,
            Decision::Enqueue => self.enqueue_waiter().await,
        }
    }

    async fn create_and_assign(&self, id: String) -> AcquireResult {
        let worker = BrowserWorker::spawn(
            id.clone(),
            self.backend.clone(),
            self.self_ref.clone(),
            self.settings.clone(),
        );
        let session_id = worker.generate_session_id(&id).await;

        match session_id {
            Some(sid) => {
                {
                    let mut state = self.state.lock().await;
                    state.workers.insert(id.clone(), worker);
                    state
                        .registry
                        .insert(id.clone(), busy_record(id.clone(), sid.clone()));
                }
                self.persist(&id).await;
                Ok((id, sid))
            }
            None => Err(PoolError::LaunchFailed),
        }
    }

    async fn enqueue_waiter(&self) -> AcquireResult {
        let (tx, rx) = oneshot::channel();
        let waiting_id = Uuid::new_v4();
        {
            let mut state = self.state.lock().await;
            state.queue.push_back(WaitingRequest {
                id: waiting_id,
                enqueued_at: Instant::now(),
                resolver: tx,
            });
        }

        match tokio::time::timeout(self.settings.queue_max_wait, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(PoolError::PoolExhausted),
            Err(_) => {
                let mut state = self.state.lock().await;
                state.queue.retain(|w| w.id != waiting_id);
                Err(PoolError::PoolExhausted)
            }
        }
    }

    /// `ReportStatus(workerId, status, errorMessage?)` -- spec §4.4.
    pub async fn report_status(&self, id: &str, status: WorkerStatus, error_message: Option<String>) {
        let fulfillment = {
            let mut state = self.state.lock().await;

            if !state.registry.contains_key(id) {
                let admit = !looks_like_opaque_default(id) && state.registry.len() < self.settings.max_workers;
                if !admit {
                    return;
                }
                state.registry.insert(
                    id.to_string(),
                    WorkerRecord {
                        id: id.to_string(),
                        status,
                        session_id: None,
                        last_activity: Utc::now(),
                        created: Utc::now(),
                        error_message: error_message.clone(),
                        error_count: if status == WorkerStatus::Error { 1 } else { 0 },
                    },
                );
            } else if let Some(record) = state.registry.get_mut(id) {
                record.status = status;
                record.last_activity = Utc::now();
                record.error_message = error_message.clone();
                if status == WorkerStatus::Error {
                    record.error_count += 1;
                }
            }

            fulfill_if_idle(&mut state, id, status)
        };

        if let Some((waiter, wid, sid)) = fulfillment {
            let _ = waiter.resolver.send(Ok((wid, sid)));
        }

        self.persist(id).await;

        if status == WorkerStatus::Error {
            self.schedule_recovery(id.to_string());
        }
    }

    fn schedule_recovery(self: &Self, id: String) {
        let Some(me) = self.self_ref.upgrade() else {
            return;
        };
        tokio::spawn(async move { me.attempt_recovery(&id).await });
    }

    /// `AttemptRecovery(record)` -- spec §4.4.
    async fn attempt_recovery(&self, id: &str) {
        let worker = {
            let state = self.state.lock().await;
            state.workers.get(id).cloned()
        };
        let Some(worker) = worker else { return };

        let Some(session_id) = worker.generate_session_id(id).await else {
            warn!(worker = id, "recovery failed");
            return;
        };

        let fulfillment = {
            let mut state = self.state.lock().await;
            if let Some(record) = state.registry.get_mut(id) {
                record.status = WorkerStatus::Idle;
                record.session_id = Some(session_id.clone());
                record.error_message = None;
                record.last_activity = Utc::now();
            }
            fulfill_if_idle(&mut state, id, WorkerStatus::Idle)
        };

        if let Some((waiter, wid, sid)) = fulfillment {
            let _ = waiter.resolver.send(Ok((wid, sid)));
        } else {
            self.persist(id).await;
        }
        info!(worker = id, "recovered");
    }

    /// `CreateBatch(n)` -- spec §4.4: staggered by `BROWSER_CREATION_DELAY`.
    pub async fn create_batch(self: &Arc<Self>, n: usize) -> BatchResult {
        let current = self.state.lock().await.registry.len();
        let allowed = self.settings.max_workers.saturating_sub(current).min(n);
        let skipped = n - allowed;

        let mut details = Vec::with_capacity(allowed);
        for i in 0..allowed {
            if i > 0 {
                tokio::time::sleep(self.settings.browser_creation_delay).await;
            }
            let id = new_worker_id();
            let worker = BrowserWorker::spawn(
                id.clone(),
                self.backend.clone(),
                self.self_ref.clone(),
                self.settings.clone(),
            );
            match worker.generate_session_id(&id).await {
                Some(sid) => {
                    {
                        let mut state = self.state.lock().await;
                        state.workers.insert(id.clone(), worker);
                        state.registry.insert(id.clone(), idle_record(id.clone(), sid));
                    }
                    self.persist(&id).await;
                    details.push(format!("{id}: created"));
                }
                None => details.push(format!("{id}: launch failed")),
            }
        }

        BatchResult {
            requested: n,
            created: details.iter().filter(|d| d.ends_with("created")).count(),
            skipped,
            details,
        }
    }

    /// `RemoveWorker(id)` -- spec §4.4.
    pub async fn remove_worker(&self, id: &str) {
        let worker = {
            let mut state = self.state.lock().await;
            state.registry.remove(id);
            state.workers.remove(id)
        };
        if let Some(worker) = worker {
            let _ = worker.commands().send(crate::browser::worker::WorkerCommand::Cleanup).await;
        }
        if let Err(err) = pool_registry::remove(&self.db, id).await {
            warn!(error = %err, id, "failed to remove worker from durable registry");
        }
    }

    /// `DeleteAll()` -- spec §4.4.
    pub async fn delete_all(&self) {
        let workers = {
            let mut state = self.state.lock().await;
            state.registry.clear();
            std::mem::take(&mut state.workers)
        };
        for (_, worker) in workers {
            let _ = worker.commands().send(crate::browser::worker::WorkerCommand::Cleanup).await;
        }
        if let Err(err) = pool_registry::remove_all(&self.db).await {
            warn!(error = %err, "failed to clear durable registry");
        }
    }

    /// `GetStats` -- spec §4.4.
    pub async fn get_stats(&self) -> PoolStats {
        let state = self.state.lock().await;
        let mut stats = PoolStats {
            idle: 0,
            busy: 0,
            error: 0,
            closed: 0,
            queue_depth: state.queue.len(),
        };
        for record in state.registry.values() {
            match record.status {
                WorkerStatus::Idle => stats.idle += 1,
                WorkerStatus::Busy => stats.busy += 1,
                WorkerStatus::Error => stats.error += 1,
                WorkerStatus::Closed => stats.closed += 1,
            }
        }
        stats
    }

    /// `GetDetailedStatus` -- spec §4.4.
    pub async fn get_detailed_status(&self) -> Vec<WorkerRecord> {
        self.state.lock().await.registry.values().cloned().collect()
    }

    pub async fn status_of(&self, id: &str) -> Option<WorkerStatus> {
        self.state.lock().await.registry.get(id).map(|r| r.status)
    }

    /// Open a fresh page on the session assigned to `worker_id` by a prior
    /// `Acquire`. Used by the request pipeline (spec §4.6).
    pub async fn open_page(
        &self,
        worker_id: &str,
    ) -> Result<Box<dyn crate::browser::Page>, crate::browser::BackendError> {
        let worker = self.state.lock().await.workers.get(worker_id).cloned();
        match worker {
            Some(worker) => worker.open_page().await,
            None => Err(crate::browser::BackendError::PageFailed(format!(
                "unknown worker {worker_id}"
            ))),
        }
    }

    /// Called by a worker's polite-cleanup task once the old session is
    /// fully drained -- the registry entry is now eligible for full removal.
    pub async fn finalize_closed(&self, id: &str) {
        {
            let mut state = self.state.lock().await;
            state.registry.remove(id);
            state.workers.remove(id);
        }
        if let Err(err) = pool_registry::remove(&self.db, id).await {
            warn!(error = %err, id, "failed to remove closed worker from durable registry");
        }
    }

    async fn persist(&self, id: &str) {
        let record = self.state.lock().await.registry.get(id).cloned();
        if let Some(record) = record {
            if let Err(err) = pool_registry::upsert(&self.db, &record).await {
                warn!(error = %err, id, "failed to persist pool registry row");
            }
        }
    }
}

fn idle_record(id: String, session_id: String) -> WorkerRecord {
    WorkerRecord::new_idle(id, Some(session_id))
}

fn busy_record(id: String, session_id: String) -> WorkerRecord {
    let mut record = WorkerRecord::new_idle(id, Some(session_id));
    record.status = WorkerStatus::Busy;
    record
}

fn fulfill_if_idle(
    state: &mut PoolState,
    id: &str,
    status: WorkerStatus,
) -> Option<(WaitingRequest, String, String)> {
    if status != WorkerStatus::Idle {
        return None;
    }
    let waiter = state.queue.pop_front()?;
    let record = state.registry.get_mut(id)?;
    record.status = WorkerStatus::Busy;
    record.last_activity = Utc::now();
    let session_id = record.session_id.clone().unwrap_or_default();
    Some((waiter, id.to_string(), session_id))
}
