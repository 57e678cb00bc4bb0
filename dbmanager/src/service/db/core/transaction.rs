//! Transaction management module
//!
//! Sessions wrap one pooled connection with an open transaction. A unit of
//! work run through [`run_in_session`] commits on success, rolls back on
//! error and always closes the session afterwards; that commit is the only
//! commit point.

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::Deserialize;
use sqlx::any::AnyRow;
use sqlx::{Any, AnyConnection, AnyPool, Transaction};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::logging::Logger;
use crate::service::db::core::types::{map_sqlx_error, DbError, DbResult};

/// A session that supports a single terminal action followed by close
#[async_trait]
pub trait TransactionalSession: Send {
    async fn commit(&mut self) -> DbResult<()>;

    async fn rollback(&mut self) -> DbResult<()>;

    /// Release the session; an unfinished transaction is rolled back.
    async fn close(&mut self) -> DbResult<()>;
}

/// Mints new sessions
#[async_trait]
pub trait SessionSource: Send + Sync {
    type Session: TransactionalSession;

    async fn open_session(&self) -> DbResult<Self::Session>;
}

/// Open a session from `source`, run `work` in it and apply the
/// commit / rollback / close contract.
///
/// The error returned by `work` comes back unchanged after the rollback and
/// a DEBUG record on `logger`. The future `work` returns is tied to the
/// session borrow only, so captured state must be moved in or owned.
pub async fn run_in_session<S, F, T, E>(source: &S, logger: &Logger, work: F) -> Result<T, E>
where
    S: SessionSource + ?Sized,
    F: for<'s> FnOnce(&'s mut S::Session) -> BoxFuture<'s, Result<T, E>>,
    E: From<DbError> + fmt::Display,
{
    let mut session = match source.open_session().await {
        Ok(session) => session,
        Err(e) => {
            logger.debug(format!("Session error: {e}"));
            return Err(E::from(e));
        }
    };

    let outcome = work(&mut session).await;
    finish_session(&mut session, logger, outcome).await
}

async fn finish_session<S, T, E>(session: &mut S, logger: &Logger, outcome: Result<T, E>) -> Result<T, E>
where
    S: TransactionalSession + ?Sized,
    E: From<DbError> + fmt::Display,
{
    let outcome = match outcome {
        Ok(value) => session.commit().await.map(|()| value).map_err(E::from),
        Err(err) => Err(err),
    };

    let outcome = match outcome {
        Ok(value) => Ok(value),
        Err(err) => {
            if let Err(rollback_err) = session.rollback().await {
                warn!(error = %rollback_err, "session rollback failed");
            }
            logger.debug(format!("Session error: {err}"));
            Err(err)
        }
    };

    match session.close().await {
        Ok(()) => outcome,
        Err(close_err) => {
            warn!(error = %close_err, "session close failed");
            match outcome {
                Ok(_) => Err(E::from(close_err)),
                Err(err) => Err(err),
            }
        }
    }
}

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(try_from = "String")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }

    /// Statement that applies this level to every transaction of a new
    /// connection, keyed by the sqlx backend name.
    pub fn session_statement(&self, backend: &str) -> Option<String> {
        match backend.to_lowercase().as_str() {
            "postgresql" | "postgres" => Some(format!(
                "SET SESSION CHARACTERISTICS AS TRANSACTION ISOLATION LEVEL {}",
                self.as_str()
            )),
            "mysql" | "mariadb" => Some(format!("SET SESSION TRANSACTION ISOLATION LEVEL {}", self.as_str())),
            // SQLite is serializable unless shared-cache dirty reads are enabled
            "sqlite" => (*self == IsolationLevel::ReadUncommitted).then(|| "PRAGMA read_uncommitted = 1".to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace(['_', '-'], " ");
        match normalized.as_str() {
            "READ UNCOMMITTED" => Ok(IsolationLevel::ReadUncommitted),
            "READ COMMITTED" => Ok(IsolationLevel::ReadCommitted),
            "REPEATABLE READ" => Ok(IsolationLevel::RepeatableRead),
            "SERIALIZABLE" => Ok(IsolationLevel::Serializable),
            _ => Err(format!("unknown isolation level `{s}`")),
        }
    }
}

impl TryFrom<String> for IsolationLevel {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

enum SessionState {
    Active(Transaction<'static, Any>),
    Committed,
    RolledBack,
    /// Commit failed; the driver already discarded the transaction
    Aborted,
    Closed,
}

impl SessionState {
    fn describe(&self) -> &'static str {
        match self {
            SessionState::Active(_) => "session is active",
            SessionState::Committed => "session already committed",
            SessionState::RolledBack => "session already rolled back",
            SessionState::Aborted => "session commit failed",
            SessionState::Closed => "session is closed",
        }
    }
}

/// One unit of work: a pooled connection inside an open transaction
///
/// Dropping an active session rolls the transaction back and returns the
/// connection to the pool.
pub struct Session {
    state: SessionState,
}

impl Session {
    fn new(transaction: Transaction<'static, Any>) -> Self {
        Self {
            state: SessionState::Active(transaction),
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.state, SessionState::Active(_))
    }

    /// Connection to run statements on, e.g.
    /// `sqlx::query(sql).bind(id).execute(session.connection()?)`.
    pub fn connection(&mut self) -> DbResult<&mut AnyConnection> {
        match &mut self.state {
            SessionState::Active(transaction) => Ok(&mut **transaction),
            other => Err(DbError::SessionState(other.describe())),
        }
    }

    /// Execute a statement, returning the affected row count.
    pub async fn execute(&mut self, sql: &str) -> DbResult<u64> {
        let result = sqlx::query(sql)
            .execute(self.connection()?)
            .await
            .map_err(|e| map_sqlx_error(e, "execute"))?;
        Ok(result.rows_affected())
    }

    pub async fn fetch_all(&mut self, sql: &str) -> DbResult<Vec<AnyRow>> {
        sqlx::query(sql)
            .fetch_all(self.connection()?)
            .await
            .map_err(|e| map_sqlx_error(e, "fetch"))
    }

    pub async fn fetch_one(&mut self, sql: &str) -> DbResult<AnyRow> {
        sqlx::query(sql)
            .fetch_one(self.connection()?)
            .await
            .map_err(|e| map_sqlx_error(e, "fetch"))
    }
}

#[async_trait]
impl TransactionalSession for Session {
    async fn commit(&mut self) -> DbResult<()> {
        match std::mem::replace(&mut self.state, SessionState::Aborted) {
            SessionState::Active(transaction) => {
                transaction.commit().await.map_err(|e| map_sqlx_error(e, "commit"))?;
                self.state = SessionState::Committed;
                debug!("session committed");
                Ok(())
            }
            other => {
                let reason = other.describe();
                self.state = other;
                Err(DbError::SessionState(reason))
            }
        }
    }

    async fn rollback(&mut self) -> DbResult<()> {
        match std::mem::replace(&mut self.state, SessionState::RolledBack) {
            SessionState::Active(transaction) => {
                transaction.rollback().await.map_err(|e| map_sqlx_error(e, "rollback"))?;
                debug!("session rolled back");
                Ok(())
            }
            SessionState::Aborted => Ok(()),
            other => {
                let reason = other.describe();
                self.state = other;
                Err(DbError::SessionState(reason))
            }
        }
    }

    async fn close(&mut self) -> DbResult<()> {
        match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Active(transaction) => transaction
                .rollback()
                .await
                .map_err(|e| map_sqlx_error(e, "close")),
            _ => Ok(()),
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state.describe())
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_active() {
            debug!("session dropped with an open transaction, rolling back");
        }
    }
}

/// Session factory bound to the database's pool
pub struct SessionFactory {
    pool: AnyPool,
}

impl SessionFactory {
    pub(crate) fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Check a connection out of the pool and begin a transaction on it.
    pub async fn open(&self) -> DbResult<Session> {
        if self.pool.is_closed() {
            return Err(DbError::PoolClosed);
        }
        let transaction = self.pool.begin().await.map_err(|e| map_sqlx_error(e, "begin session"))?;
        Ok(Session::new(transaction))
    }
}

#[async_trait]
impl SessionSource for SessionFactory {
    type Session = Session;

    async fn open_session(&self) -> DbResult<Session> {
        self.open().await
    }
}

impl fmt::Debug for SessionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionFactory")
            .field("closed", &self.pool.is_closed())
            .finish()
    }
}

/// Single-use session handle for per-request injection
///
/// [`finish`](Self::finish) applies the same contract as
/// [`run_in_session`]. A guard dropped without `finish` counts as an
/// exceptional exit: the session's transaction is rolled back on drop.
pub struct SessionGuard<'a, S: TransactionalSession = Session> {
    session: S,
    logger: &'a Logger,
}

impl<'a, S: TransactionalSession> SessionGuard<'a, S> {
    pub fn new(session: S, logger: &'a Logger) -> Self {
        Self { session, logger }
    }

    /// Commit on `Ok`, roll back and log on `Err`, then close.
    pub async fn finish<T, E>(mut self, outcome: Result<T, E>) -> Result<T, E>
    where
        E: From<DbError> + fmt::Display,
    {
        finish_session(&mut self.session, self.logger, outcome).await
    }
}

impl<S: TransactionalSession> Deref for SessionGuard<'_, S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.session
    }
}

impl<S: TransactionalSession> DerefMut for SessionGuard<'_, S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.session
    }
}
