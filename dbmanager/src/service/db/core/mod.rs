//! Core database service modules
//!
//! Pool engine, sessions and transactions, declared model metadata and the
//! shared error types.

pub mod connection;
pub mod metadata;
pub mod transaction;
pub mod types;

pub use connection::{Engine, PoolSettings};
pub use metadata::{Column, Model, ModelMetadata, Table};
pub use transaction::{
    run_in_session, IsolationLevel, Session, SessionFactory, SessionGuard, SessionSource, TransactionalSession,
};
pub use types::*;
