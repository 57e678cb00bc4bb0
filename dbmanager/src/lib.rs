//! Connection pool, session lifecycle and queued logging around sqlx
//!
//! - [`config`]: typed settings, DSN assembly, environment defaults
//! - [`logging`]: named logger with a background listener thread
//! - [`service::db`]: the [`Database`] facade, sessions and the pool engine

pub mod config;
pub mod logging;
pub mod service;

pub use config::{Config, ConfigError, Dsn};
pub use logging::{LogLevel, Logger, LoggerConfig, LoggingError};
pub use service::db::{
    Database, DatabaseOptions, DbError, DbResult, IsolationLevel, Model, ModelMetadata, PoolStats, Session,
    SessionFactory, SessionGuard, Table,
};
