//! Configuration
//!
//! Typed connection, pool and logger settings consumed by
//! [`Database::from_config`](crate::service::db::Database::from_config).

pub mod db;
pub mod dsn;

pub use db::Config;
pub use dsn::Dsn;

use thiserror::Error;

/// Configuration errors, raised synchronously at construction time
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing attributes: [{}]", .0.join(", "))]
    MissingAttributes(Vec<&'static str>),

    #[error("unsupported configuration option `{0}`")]
    UnsupportedOption(String),

    #[error("invalid value `{value}` for `{key}`")]
    InvalidValue { key: String, value: String },

    #[error("invalid DSN: {0}")]
    InvalidDsn(String),

    #[error("invalid configuration document: {0}")]
    Document(String),
}
