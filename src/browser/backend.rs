//! The "browser backend" seam (spec §1: "treated as an opaque browser
//! backend capable of launching/connecting to a session, navigating, and
//! producing an artifact"). Production wiring would point this at a real
//! CDP-speaking remote-browser provider; tests and the in-repo fake exercise
//! the pool/pipeline logic without one.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("session launch failed: {0}")]
    LaunchFailed(String),
    #[error("navigation exceeded budget")]
    NavTimeout,
    #[error("page operation failed: {0}")]
    PageFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavStrategy {
    Commit,
    DomContentLoaded,
}

#[derive(Debug, Clone)]
pub struct NavOutcome {
    pub final_url: String,
    pub status_code: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Viewport {
    pub const DEFAULT: Viewport = Viewport {
        width: 1920,
        height: 1080,
    };
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RawLink {
    pub href: String,
    pub text: String,
    pub visible: bool,
}

/// One opened tab/page within a session. Each pipeline operation (spec §4.6)
/// drives a freshly opened page.
#[async_trait]
pub trait Page: Send + Sync {
    async fn harden(&self) -> Result<(), BackendError>;
    async fn set_viewport(&self, viewport: Viewport) -> Result<(), BackendError>;
    async fn block_resources(&self, kinds: &[&str]) -> Result<(), BackendError>;
    async fn navigate(
        &self,
        url: &str,
        strategy: NavStrategy,
        timeout: Duration,
    ) -> Result<NavOutcome, BackendError>;
    async fn wait(&self, extra: Duration);
    async fn screenshot(&self, format: &str, quality: Option<u8>, selector: Option<&str>) -> Result<Vec<u8>, BackendError>;
    async fn content_html(&self) -> Result<String, BackendError>;
    async fn extract_links(&self) -> Result<Vec<RawLink>, BackendError>;
    async fn pdf(&self, format: &str) -> Result<Vec<u8>, BackendError>;
    async fn query_elements(&self, selector: &str, attributes: &[String]) -> Result<JsonValue, BackendError>;
}

/// A launched, live remote-browser session.
pub struct SessionHandle {
    pub session_id: String,
}

#[async_trait]
pub trait BrowserBackend: Send + Sync {
    /// Launch a brand-new session. Retried by the caller per spec §4.3
    /// (3 attempts, 1s/2s/3s delays) -- this trait only does one attempt.
    async fn launch_session(&self) -> Result<SessionHandle, BackendError>;

    /// Connect + version probe, used by the health alarm (spec §4.3).
    async fn probe_session(&self, session_id: &str) -> bool;

    /// Release the provider slot for a session.
    async fn close_session(&self, session_id: &str);

    /// Open a fresh page within a live session.
    async fn open_page(&self, session_id: &str) -> Result<Box<dyn Page>, BackendError>;
}
