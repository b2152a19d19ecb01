pub mod backend;
pub mod fake;
pub mod worker;

pub use backend::{BackendError, BrowserBackend, NavOutcome, NavStrategy, Page, RawLink, SessionHandle, Viewport};
pub use worker::BrowserWorker;
