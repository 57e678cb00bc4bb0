//! Database service module
//!
//! The [`Database`] facade and the core pieces it is assembled from.

pub mod core;
pub mod database;

pub use self::core::{
    // connection management
    connection::{Engine, PoolSettings},
    // declared tables
    metadata::{Column, Model, ModelMetadata, Table},
    // sessions and transactions
    transaction::{
        run_in_session, IsolationLevel, Session, SessionFactory, SessionGuard, SessionSource, TransactionalSession,
    },
    // shared types
    types::{map_sqlx_error, DbError, DbResult, PoolStats},
};
pub use database::{Database, DatabaseOptions};
