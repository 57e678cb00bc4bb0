//! Common type definitions for database service
//!
//! Shared error and statistics types used across database service modules

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ConfigError;
use crate::logging::LoggingError;

pub type DbResult<T> = Result<T, DbError>;

/// Database error types
#[derive(Error, Debug)]
pub enum DbError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("logger error: {0}")]
    Logging(#[from] LoggingError),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("driver error: {0}")]
    Driver(String),

    #[error("timed out waiting for a pooled connection")]
    PoolTimedOut,

    #[error("connection pool is closed")]
    PoolClosed,

    #[error("query failed: {0}")]
    Query(String),

    #[error("invalid session state: {0}")]
    SessionState(&'static str),
}

impl DbError {
    /// Unreachable host, refused or timed-out connection, closed pool
    pub fn is_connectivity(&self) -> bool {
        matches!(
            self,
            DbError::Connection(_) | DbError::Auth(_) | DbError::PoolTimedOut | DbError::PoolClosed
        )
    }
}

impl From<sqlx::Error> for DbError {
    fn from(error: sqlx::Error) -> Self {
        map_sqlx_error(error, "database")
    }
}

/// Classify a sqlx error, prefixing the message with `context`.
pub fn map_sqlx_error(error: sqlx::Error, context: &str) -> DbError {
    match error {
        sqlx::Error::Database(db_err) => {
            // SQLSTATE class 28: invalid authorization specification
            let is_auth = db_err.code().is_some_and(|code| code.starts_with("28"));
            if is_auth {
                warn!(context, error = %db_err, "database rejected credentials");
                DbError::Auth(format!("{context}: {db_err}"))
            } else {
                debug!(context, error = %db_err, "database error");
                DbError::Query(format!("{context}: {db_err}"))
            }
        }
        sqlx::Error::Io(io_err) => DbError::Connection(format!("{context}: {io_err}")),
        sqlx::Error::Tls(tls_err) => DbError::Connection(format!("{context}: {tls_err}")),
        sqlx::Error::Protocol(proto_err) => DbError::Connection(format!("{context}: {proto_err}")),
        sqlx::Error::Configuration(cfg_err) => DbError::Driver(format!("{context}: {cfg_err}")),
        sqlx::Error::PoolTimedOut => DbError::PoolTimedOut,
        sqlx::Error::PoolClosed => DbError::PoolClosed,
        sqlx::Error::RowNotFound => DbError::Query(format!("{context}: no rows returned")),
        sqlx::Error::ColumnNotFound(column) => {
            DbError::Query(format!("{context}: column '{column}' not found"))
        }
        other => DbError::Query(format!("{context}: {other}")),
    }
}

/// Pool statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Open connections, idle or checked out
    pub size: u32,
    /// Idle connections
    pub idle: u32,
    /// `pool_size + max_overflow`
    pub max_connections: u32,
}

impl PoolStats {
    pub fn checked_out(&self) -> u32 {
        self.size.saturating_sub(self.idle)
    }
}
