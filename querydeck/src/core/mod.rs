//! Core infrastructure: configuration and shared constants

pub mod config;
pub mod constants;

pub use config::{DatabaseConfig, DatabaseFileConfig, PoolConfig, QuerySettings};
