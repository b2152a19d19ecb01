pub mod cache;
pub mod error_log;
pub mod monitoring;
pub mod pool_registry;

pub type Result<T> = std::result::Result<T, sqlx::Error>;
