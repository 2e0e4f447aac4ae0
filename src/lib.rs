pub mod config;
pub mod dispatch;
pub mod error;
pub mod identity;
pub mod rate_limit;
pub mod server;
pub mod storage;
