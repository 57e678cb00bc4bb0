//! Connection management module
//!
//! The engine owns the sqlx pool. Pools are built lazily: nothing connects
//! until the first acquisition, so an unreachable server or an unknown
//! driver only shows up when a connection is actually needed.

use sqlx::any::{AnyConnectOptions, AnyPoolOptions};
use sqlx::pool::PoolConnection;
use sqlx::{Any, AnyPool, ConnectOptions, Executor};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use crate::config::Dsn;
use crate::service::db::core::transaction::IsolationLevel;
use crate::service::db::core::types::{map_sqlx_error, DbError, DbResult, PoolStats};

/// Extra time a health probe gets on top of the acquire timeout, so the
/// pool's own classified error wins over the outer deadline.
const PING_GRACE: Duration = Duration::from_secs(1);

/// Pool construction settings
#[derive(Debug, Clone)]
pub struct PoolSettings {
    /// `pool_size + max_overflow`
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub max_lifetime: Option<Duration>,
    pub test_before_acquire: bool,
    pub isolation_level: IsolationLevel,
    /// Keep sqlx statement logging on
    pub echo: bool,
}

/// Lazily connecting pool plus its disposal state
pub struct Engine {
    pool: AnyPool,
    max_connections: u32,
    acquire_timeout: Duration,
    disposed: AtomicBool,
}

impl Engine {
    /// Build the pool without connecting. Needs a running tokio runtime.
    pub fn connect_lazy(dsn: &Dsn, settings: &PoolSettings) -> DbResult<Self> {
        sqlx::any::install_default_drivers();

        let mut options = AnyConnectOptions::from_str(&dsn.connect_url())
            .map_err(|e| map_sqlx_error(e, "connect options"))?;
        if !settings.echo {
            options = options.disable_statement_logging();
        }

        let isolation_level = settings.isolation_level;
        let pool = AnyPoolOptions::new()
            .max_connections(settings.max_connections)
            .min_connections(0)
            .acquire_timeout(settings.acquire_timeout)
            .max_lifetime(settings.max_lifetime)
            .test_before_acquire(settings.test_before_acquire)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    if let Some(statement) = isolation_level.session_statement(conn.backend_name()) {
                        debug!(backend = conn.backend_name(), %statement, "applying isolation level");
                        conn.execute(statement.as_str()).await?;
                    }
                    Ok(())
                })
            })
            .connect_lazy_with(options);

        debug!(
            dsn = %dsn,
            max_connections = settings.max_connections,
            isolation_level = %settings.isolation_level,
            "connection pool created"
        );

        Ok(Self {
            pool,
            max_connections: settings.max_connections,
            acquire_timeout: settings.acquire_timeout,
            disposed: AtomicBool::new(false),
        })
    }

    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    pub fn is_closed(&self) -> bool {
        self.pool.is_closed()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Check a connection out of the pool.
    pub async fn acquire(&self) -> DbResult<PoolConnection<Any>> {
        if self.is_closed() {
            return Err(DbError::PoolClosed);
        }
        self.pool.acquire().await.map_err(|e| map_sqlx_error(e, "acquire"))
    }

    /// Run `SELECT 1` on a pooled connection, returning the round trip.
    pub async fn ping(&self) -> DbResult<Duration> {
        let started = Instant::now();
        let probe = async {
            let mut conn = self.acquire().await?;
            sqlx::query("SELECT 1")
                .fetch_one(&mut *conn)
                .await
                .map_err(|e| map_sqlx_error(e, "health check"))?;
            Ok::<_, DbError>(())
        };

        match tokio::time::timeout(self.acquire_timeout + PING_GRACE, probe).await {
            Ok(result) => result.map(|()| started.elapsed()),
            Err(_) => {
                debug!(timeout = ?self.acquire_timeout, "health check timed out");
                Err(DbError::PoolTimedOut)
            }
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle() as u32,
            max_connections: self.max_connections,
        }
    }

    /// Close every pooled connection. Later calls do nothing.
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PoolSettings {
        PoolSettings {
            max_connections: 2,
            acquire_timeout: Duration::from_secs(1),
            max_lifetime: None,
            test_before_acquire: false,
            isolation_level: IsolationLevel::RepeatableRead,
            echo: false,
        }
    }

    #[tokio::test]
    async fn test_lazy_pool_does_not_connect() {
        let dsn = Dsn::parse("postgresql+asyncpg://u:p@127.0.0.1:1/d").unwrap();
        let engine = Engine::connect_lazy(&dsn, &settings()).unwrap();

        let stats = engine.stats();
        assert_eq!(stats.size, 0);
        assert_eq!(stats.max_connections, 2);
        assert!(!engine.is_closed());
    }

    #[tokio::test]
    async fn test_dispose_is_idempotent() {
        let dsn = Dsn::parse("sqlite::memory:").unwrap();
        let engine = Engine::connect_lazy(&dsn, &settings()).unwrap();

        engine.dispose().await;
        engine.dispose().await;

        assert!(engine.is_disposed());
        assert!(engine.is_closed());
        assert!(matches!(engine.acquire().await, Err(DbError::PoolClosed)));
    }
}
