//! Deterministic in-memory [`BrowserBackend`] used by tests, standing in for
//! the real rendering engine collaborator (spec §1 Non-goals: "No
//! rendering-engine implementation").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};

use super::backend::{
    BackendError, BrowserBackend, NavOutcome, NavStrategy, Page, RawLink, SessionHandle, Viewport,
};

#[derive(Debug, Clone)]
pub struct FakePageFixture {
    pub html: String,
    pub links: Vec<RawLink>,
}

impl Default for FakePageFixture {
    fn default() -> Self {
        Self {
            html: "<html><body>ok</body></html>".to_string(),
            links: Vec::new(),
        }
    }
}

pub struct FakeBrowserBackend {
    counter: AtomicU64,
    pub fixture: Mutex<HashMap<String, FakePageFixture>>,
    pub fail_launch: Mutex<bool>,
    pub fail_probe: Mutex<bool>,
    pub closed_sessions: Mutex<Vec<String>>,
}

impl Default for FakeBrowserBackend {
    fn default() -> Self {
        Self {
            counter: AtomicU64::new(0),
            fixture: Mutex::new(HashMap::new()),
            fail_launch: Mutex::new(false),
            fail_probe: Mutex::new(false),
            closed_sessions: Mutex::new(Vec::new()),
        }
    }
}

impl FakeBrowserBackend {
    pub fn set_fixture(&self, url: &str, fixture: FakePageFixture) {
        self.fixture.lock().unwrap().insert(url.to_string(), fixture);
    }

    pub fn was_closed(&self, session_id: &str) -> bool {
        self.closed_sessions.lock().unwrap().iter().any(|s| s == session_id)
    }
}

#[async_trait]
impl BrowserBackend for FakeBrowserBackend {
    async fn launch_session(&self) -> Result<SessionHandle, BackendError> {
        if *self.fail_launch.lock().unwrap() {
            return Err(BackendError::LaunchFailed("injected failure".into()));
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        Ok(SessionHandle {
            session_id: format!("fake-session-{n}"),
        })
    }

    async fn probe_session(&self, _session_id: &str) -> bool {
        !*self.fail_probe.lock().unwrap()
    }

    async fn close_session(&self, session_id: &str) {
        self.closed_sessions.lock().unwrap().push(session_id.to_string());
    }

    async fn open_page(&self, _session_id: &str) -> Result<Box<dyn Page>, BackendError> {
        Ok(Box::new(FakePage {
            fixtures: self.fixture.lock().unwrap().clone(),
            last_url: Mutex::new(None),
        }))
    }
}

struct FakePage {
    fixtures: HashMap<String, FakePageFixture>,
    last_url: Mutex<Option<String>>,
}

#[async_trait]
impl Page for FakePage {
    async fn harden(&self) -> Result<(), BackendError> {
        Ok(())
    }

    async fn set_viewport(&self, _viewport: Viewport) -> Result<(), BackendError> {
        Ok(())
    }

    async fn block_resources(&self, _kinds: &[&str]) -> Result<(), BackendError> {
        Ok(())
    }

    async fn navigate(
        &self,
        url: &str,
        _strategy: NavStrategy,
        _timeout: Duration,
    ) -> Result<NavOutcome, BackendError> {
        *self.last_url.lock().unwrap() = Some(url.to_string());
        Ok(NavOutcome {
            final_url: url.to_string(),
            status_code: Some(200),
        })
    }

    async fn wait(&self, _extra: Duration) {}

    async fn screenshot(
        &self,
        _format: &str,
        _quality: Option<u8>,
        _selector: Option<&str>,
    ) -> Result<Vec<u8>, BackendError> {
        Ok(b"fake-png-bytes".to_vec())
    }

    async fn content_html(&self) -> Result<String, BackendError> {
        let url = self.last_url.lock().unwrap().clone().unwrap_or_default();
        Ok(self
            .fixtures
            .get(&url)
            .map(|f| f.html.clone())
            .unwrap_or_else(|| "<html><body>ok</body></html>".to_string()))
    }

    async fn extract_links(&self) -> Result<Vec<RawLink>, BackendError> {
        let url = self.last_url.lock().unwrap().clone().unwrap_or_default();
        Ok(self
            .fixtures
            .get(&url)
            .map(|f| f.links.clone())
            .unwrap_or_default())
    }

    async fn pdf(&self, _format: &str) -> Result<Vec<u8>, BackendError> {
        Ok(b"%PDF-1.4 fake".to_vec())
    }

    async fn query_elements(&self, selector: &str, attributes: &[String]) -> Result<JsonValue, BackendError> {
        Ok(json!([{ "selector": selector, "attributes": attributes, "text": "fake" }]))
    }
}
