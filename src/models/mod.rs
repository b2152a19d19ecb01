pub mod cache;
pub mod credit;
pub mod error_log;
pub mod monitoring;
pub mod subscription;
pub mod user;
pub mod worker;
