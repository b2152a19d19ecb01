//! Browser Worker (spec §4.3): owns at most one live browser session at a
//! time, self-refreshes blue/green, and exposes a health alarm driven by the
//! same sleep/select shape as the teacher's subscription manager loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, mpsc};
use tokio::time::sleep;
use tokio_retry2::Retry;
use tracing::{info, warn};

use crate::config::Settings;
use crate::models::worker::WorkerStatus;
use crate::pool::PoolManager;

use super::backend::{BackendError, BrowserBackend};

/// Commands the worker's own RPC surface accepts (spec §4.3 `Cleanup`).
pub enum WorkerCommand {
    Cleanup,
    Shutdown,
}

#[derive(Debug, Default)]
struct WorkerState {
    session_id: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

pub struct BrowserWorker {
    pub id: String,
    backend: Arc<dyn BrowserBackend>,
    manager: std::sync::Weak<PoolManager>,
    settings: Settings,
    state: Mutex<WorkerState>,
    cmd_tx: mpsc::Sender<WorkerCommand>,
}

impl BrowserWorker {
    /// Spawn a worker actor and its background health-alarm loop. Mirrors
    /// the teacher's `subs::new_sub_manager` shape: a `tokio::spawn`ed loop
    /// that sleeps until its next timer, racing against an inbound command
    /// channel, fully drained on wakeup.
    pub fn spawn(
        id: String,
        backend: Arc<dyn BrowserBackend>,
        manager: std::sync::Weak<PoolManager>,
        settings: Settings,
    ) -> Arc<Self> {
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let worker = Arc::new(Self {
            id,
            backend,
            manager,
            settings,
            state: Mutex::new(WorkerState::default()),
            cmd_tx,
        });

        let loop_worker = worker.clone();
        tokio::spawn(async move { loop_worker.health_loop(cmd_rx).await });

        worker
    }

    pub fn commands(&self) -> mpsc::Sender<WorkerCommand> {
        self.cmd_tx.clone()
    }

    pub async fn current_session_id(&self) -> Option<String> {
        self.state.lock().await.session_id.clone()
    }

    /// `GenerateSessionId(expectedId)` -- spec §4.3. Up to 3 attempts with
    /// 1s/2s/3s delays.
    pub async fn generate_session_id(&self, expected_id: &str) -> Option<String> {
        if expected_id != self.id {
            warn!(worker = %self.id, expected_id, "GenerateSessionId called with mismatched id");
        }

        let backend = self.backend.clone();
        let delays = [
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(3),
        ];
        let action = || {
            let backend = backend.clone();
            async move {
                backend
                    .launch_session()
                    .await
                    .map_err(tokio_retry2::RetryError::transient)
            }
        };

        let result = Retry::spawn(delays, action).await;

        match result {
            Ok(handle) => {
                let mut st = self.state.lock().await;
                st.session_id = Some(handle.session_id.clone());
                st.created_at = Some(Utc::now());
                info!(worker = %self.id, session = %handle.session_id, "session launched");
                Some(handle.session_id)
            }
            Err(err) => {
                warn!(worker = %self.id, error = %err, "session launch exhausted retries");
                None
            }
        }
    }

    async fn health_loop(self: Arc<Self>, mut cmd_rx: mpsc::Receiver<WorkerCommand>) {
        loop {
            tokio::select! {
                _ = sleep(self.settings.health_check_interval) => {
                    if self.should_refresh().await {
                        self.close_and_notify().await;
                    }
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(WorkerCommand::Cleanup) => self.cleanup().await,
                        Some(WorkerCommand::Shutdown) | None => break,
                    }
                }
            }
        }
    }

    async fn should_refresh(&self) -> bool {
        let st = self.state.lock().await;
        let Some(session_id) = st.session_id.clone() else {
            return false;
        };
        let age_exceeded = st
            .created_at
            .map(|created| Utc::now().signed_duration_since(created) > chrono::Duration::from_std(self.settings.refresh_threshold).unwrap_or_default())
            .unwrap_or(false);
        drop(st);

        if age_exceeded {
            return true;
        }
        !self.backend.probe_session(&session_id).await
    }

    /// `CloseAndNotify` -- spec §4.3.
    async fn close_and_notify(self: &Arc<Self>) {
        let old_session_id = {
            let mut st = self.state.lock().await;
            st.session_id.take()
        };
        info!(worker = %self.id, "marking closed, scheduling polite cleanup");
        if let Some(manager) = self.manager.upgrade() {
            manager.report_status(&self.id, WorkerStatus::Closed, None).await;
        }
        let this = self.clone();
        tokio::spawn(async move { this.polite_cleanup(old_session_id).await });
    }

    /// `PoliteCleanup` -- spec §4.3.
    async fn polite_cleanup(self: Arc<Self>, old_session_id: Option<String>) {
        let Some(session_id) = old_session_id else {
            return;
        };

        let deadline = tokio::time::Instant::now() + self.settings.polite_cleanup_timeout;
        loop {
            let observed = match self.manager.upgrade() {
                Some(manager) => manager.status_of(&self.id).await,
                None => None,
            };
            let quiesced = matches!(
                observed,
                None | Some(WorkerStatus::Idle) | Some(WorkerStatus::Closed) | Some(WorkerStatus::Error)
            );
            if quiesced || tokio::time::Instant::now() >= deadline {
                break;
            }
            sleep(Duration::from_secs(5)).await;
        }

        self.backend.close_session(&session_id).await;
        if let Some(manager) = self.manager.upgrade() {
            manager.finalize_closed(&self.id).await;
        }
    }

    /// `Cleanup(expectedId)` RPC -- spec §4.3: close current session if
    /// present, drop stored session state.
    async fn cleanup(&self) {
        let session_id = {
            let mut st = self.state.lock().await;
            st.session_id.take()
        };
        if let Some(session_id) = session_id {
            self.backend.close_session(&session_id).await;
        }
    }

    pub async fn open_page(&self) -> Result<Box<dyn super::backend::Page>, BackendError> {
        let session_id = self
            .current_session_id()
            .await
            .ok_or_else(|| BackendError::PageFailed("no live session".into()))?;
        self.backend.open_page(&session_id).await
    }
}
