//! Database facade against a live SQLite file
//!
//! SQLite goes through the same `Any` driver as the server backends, so the
//! pool, session and schema paths are exercised end to end.

use dbmanager::config::ConfigError;
use dbmanager::logging::{LogLevel, Logger, LoggerConfig, MemorySink};
use dbmanager::{Config, Database, DbError, ModelMetadata, Table};
use sqlx::Row;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn items_table() -> Table {
    Table::new("items")
        .column("id", "INTEGER PRIMARY KEY")
        .column("name", "TEXT NOT NULL")
}

fn sqlite_config(dir: &TempDir) -> Config {
    let path = dir.path().join("app.db");
    Config::default()
        .with_url(format!("sqlite://{}?mode=rwc", path.display()))
        .with_pool(2, 1)
        .with_base(Arc::new(ModelMetadata::new().with_table(items_table())))
}

fn memory_logger() -> (Logger, MemorySink) {
    let sink = MemorySink::new(LogLevel::Debug);
    let logger = Logger::builder(LoggerConfig {
        logger_name: "db".to_string(),
        logging_level: LogLevel::Debug,
        ..LoggerConfig::default()
    })
    .without_console()
    .with_sink(sink.clone())
    .build()
    .unwrap();
    (logger, sink)
}

async fn open(dir: &TempDir) -> (Database, MemorySink) {
    let (logger, sink) = memory_logger();
    let db = Database::from_config_with_logger(sqlite_config(dir), logger).unwrap();
    db.create_all_tables().await.unwrap();
    (db, sink)
}

async fn count_items(db: &Database) -> i64 {
    db.connection(|conn| {
        Box::pin(async move {
            let row = sqlx::query("SELECT COUNT(*) FROM items").fetch_one(&mut *conn).await?;
            Ok::<_, DbError>(row.try_get::<i64, _>(0)?)
        })
    })
    .await
    .unwrap()
}

#[tokio::test]
async fn test_select_one_in_scope() {
    let dir = TempDir::new().unwrap();
    let (db, sink) = open(&dir).await;

    let value = db
        .session_scope(|session| {
            Box::pin(async move {
                let row = session.fetch_one("SELECT 1").await?;
                Ok::<_, DbError>(row.try_get::<i64, _>(0)?)
            })
        })
        .await
        .unwrap();

    assert_eq!(value, 1);
    db.close().await;
    assert!(sink.lines().iter().all(|line| !line.contains("Session error")));
}

#[tokio::test]
async fn test_scope_commits_and_rolls_back() {
    let dir = TempDir::new().unwrap();
    let (db, sink) = open(&dir).await;

    db.session_scope(|session| {
        Box::pin(async move {
            session.execute("INSERT INTO items (id, name) VALUES (1, 'kept')").await?;
            Ok::<_, DbError>(())
        })
    })
    .await
    .unwrap();

    let err = db
        .session_scope(|session| {
            Box::pin(async move {
                session.execute("INSERT INTO items (id, name) VALUES (2, 'discarded')").await?;
                Err::<(), _>(DbError::Query("validation failed".to_string()))
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Query(ref msg) if msg == "validation failed"));
    assert_eq!(count_items(&db).await, 1);

    db.close().await;
    assert!(sink
        .lines()
        .iter()
        .any(|line| line.ends_with(" - db - DEBUG - Session error: query failed: validation failed")));
}

#[tokio::test]
async fn test_statement_error_rolls_back() {
    let dir = TempDir::new().unwrap();
    let (db, _sink) = open(&dir).await;

    let err = db
        .session_scope(|session| {
            Box::pin(async move {
                session.execute("INSERT INTO items (id, name) VALUES (1, 'first')").await?;
                session.execute("INSERT INTO items (id, name) VALUES (1, 'duplicate')").await?;
                Ok::<_, DbError>(())
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Query(_)));
    assert_eq!(count_items(&db).await, 0);
    db.close().await;
}

#[tokio::test]
async fn test_session_guard() {
    let dir = TempDir::new().unwrap();
    let (db, _sink) = open(&dir).await;

    let mut guard = db.session().await.unwrap();
    assert!(guard.is_active());
    let inserted = guard
        .execute("INSERT INTO items (id, name) VALUES (1, 'guarded')")
        .await
        .unwrap();
    assert_eq!(inserted, 1);
    guard.finish(Ok::<_, DbError>(())).await.unwrap();
    assert_eq!(count_items(&db).await, 1);

    let mut guard = db.session().await.unwrap();
    guard
        .execute("INSERT INTO items (id, name) VALUES (2, 'abandoned')")
        .await
        .unwrap();
    let err = guard
        .finish(Err::<(), _>(DbError::Query("request cancelled".to_string())))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Query(_)));
    assert_eq!(count_items(&db).await, 1);

    db.close().await;
}

#[tokio::test]
async fn test_scope_with_owned_state() {
    let dir = TempDir::new().unwrap();
    let (db, _sink) = open(&dir).await;

    let names = vec!["alpha".to_string(), "beta".to_string()];
    let inserted = db
        .session_scope({
            let names = names.clone();
            move |session| {
                Box::pin(async move {
                    let mut total = 0;
                    for (id, name) in names.iter().enumerate() {
                        let sql = format!("INSERT INTO items (id, name) VALUES ({id}, '{name}')");
                        total += session.execute(&sql).await?;
                    }
                    Ok::<_, DbError>(total)
                })
            }
        })
        .await
        .unwrap();

    assert_eq!(inserted, names.len() as u64);
    assert_eq!(count_items(&db).await, 2);
    db.close().await;
}

#[tokio::test]
async fn test_cancelled_scope_rolls_back() {
    let dir = TempDir::new().unwrap();
    let (db, _sink) = open(&dir).await;

    let scope = db.session_scope(|session| {
        Box::pin(async move {
            session.execute("INSERT INTO items (id, name) VALUES (1, 'in flight')").await?;
            std::future::pending::<()>().await;
            Ok::<_, DbError>(())
        })
    });
    let timed_out = tokio::time::timeout(Duration::from_millis(200), scope).await;
    assert!(timed_out.is_err());

    assert_eq!(count_items(&db).await, 0);

    // the write lock went away with the rolled back transaction
    db.session_scope(|session| {
        Box::pin(async move {
            session.execute("INSERT INTO items (id, name) VALUES (1, 'after cancel')").await?;
            Ok::<_, DbError>(())
        })
    })
    .await
    .unwrap();
    assert_eq!(count_items(&db).await, 1);

    db.close().await;
}

#[tokio::test]
async fn test_unfinished_guard_rolls_back_on_drop() {
    let dir = TempDir::new().unwrap();
    let (db, _sink) = open(&dir).await;

    let mut guard = db.session().await.unwrap();
    guard
        .execute("INSERT INTO items (id, name) VALUES (1, 'never finished')")
        .await
        .unwrap();
    drop(guard);

    assert_eq!(count_items(&db).await, 0);

    let mut guard = db.session().await.unwrap();
    guard
        .execute("INSERT INTO items (id, name) VALUES (1, 'finished')")
        .await
        .unwrap();
    guard.finish(Ok::<_, DbError>(())).await.unwrap();
    assert_eq!(count_items(&db).await, 1);

    db.close().await;
}

#[tokio::test]
async fn test_session_terminal_actions() {
    use dbmanager::service::db::TransactionalSession;

    let dir = TempDir::new().unwrap();
    let (db, _sink) = open(&dir).await;

    let mut session = db.session_factory().open().await.unwrap();
    session.commit().await.unwrap();
    assert!(matches!(session.rollback().await, Err(DbError::SessionState(_))));
    assert!(matches!(session.commit().await, Err(DbError::SessionState(_))));
    assert!(matches!(session.connection(), Err(DbError::SessionState(_))));
    session.close().await.unwrap();
    session.close().await.unwrap();

    db.close().await;
}

#[tokio::test]
async fn test_connection_errors_are_logged() {
    let dir = TempDir::new().unwrap();
    let (db, sink) = open(&dir).await;

    let err = db
        .connection(|conn| {
            Box::pin(async move {
                sqlx::query("SELECT * FROM missing_table").fetch_all(&mut *conn).await?;
                Ok::<_, DbError>(())
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, DbError::Query(_)));

    assert_eq!(db.pool_stats().max_connections, 3);

    db.close().await;
    assert!(sink
        .lines()
        .iter()
        .any(|line| line.contains(" - DEBUG - Error during connection context operations: ")));
}

#[tokio::test]
async fn test_acquire_returns_connection_to_pool() {
    let dir = TempDir::new().unwrap();
    let (db, _sink) = open(&dir).await;

    {
        let mut conn = db.acquire().await.unwrap();
        sqlx::query("INSERT INTO items (id, name) VALUES (9, 'raw')")
            .execute(&mut *conn)
            .await
            .unwrap();
    }

    assert_eq!(count_items(&db).await, 1);
    db.close().await;
}

#[tokio::test]
async fn test_schema_create_and_drop() {
    let dir = TempDir::new().unwrap();
    let (db, _sink) = open(&dir).await;

    assert_eq!(db.metadata().tables().len(), 1);
    assert!(db.metadata().table("items").is_some());

    // creating twice is harmless
    db.create_all_tables().await.unwrap();
    db.drop_all_tables().await.unwrap();

    let err = db
        .session_scope(|session| {
            Box::pin(async move {
                session.fetch_all("SELECT * FROM items").await?;
                Ok::<_, DbError>(())
            })
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Query(_)));

    db.close().await;
}

#[tokio::test]
async fn test_dispose_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let (db, _sink) = open(&dir).await;

    assert!(db.check_connection().await);
    db.dispose().await;
    db.dispose().await;

    assert!(db.is_disposed());
    assert!(!db.check_connection().await);
    assert!(matches!(db.session().await, Err(DbError::PoolClosed)));
    assert!(matches!(db.acquire().await, Err(DbError::PoolClosed)));

    db.close().await;
    assert!(db.logger().is_shutdown());
}

#[tokio::test]
async fn test_scoped_database_closes() {
    let dir = TempDir::new().unwrap();
    let config = sqlite_config(&dir).apply_overrides([("logging_level", "WARNING")]).unwrap();

    let healthy = Database::scoped(config, |db| Box::pin(async move { db.check_connection().await }))
        .await
        .unwrap();

    assert!(healthy);
}

#[tokio::test]
async fn test_unreachable_host_is_unhealthy() {
    let config = Config::default()
        .with_url("postgresql://u:p@127.0.0.1:1/d")
        .apply_overrides([("pool_timeout", "1")])
        .unwrap();
    let db = Database::from_config(config).unwrap();

    assert!(!db.check_connection().await);
    let err = db.ping().await.unwrap_err();
    assert!(err.is_connectivity());

    db.close().await;
}

#[tokio::test]
async fn test_unknown_driver_fails_lazily() {
    let db = Database::from_config(Config::default().with_url("oracle://u:p@localhost/d")).unwrap();

    assert!(!db.check_connection().await);
    assert!(db.ping().await.is_err());
    db.close().await;
}

#[tokio::test]
async fn test_missing_components_are_named() {
    let config = Config {
        user: Some("u".to_string()),
        database: Some("d".to_string()),
        ..Config::default()
    };

    let err = Database::from_config(config).unwrap_err();
    assert!(matches!(
        err,
        DbError::Config(ConfigError::MissingAttributes(ref missing)) if missing == &vec!["password", "host"]
    ));
}

#[tokio::test]
async fn test_components_build_the_dsn() {
    let config = Config {
        driver: Some("postgresql+asyncpg".to_string()),
        user: Some("u".to_string()),
        password: Some("p".to_string()),
        host: Some("h".to_string()),
        port: Some(5433),
        database: Some("d".to_string()),
        ..Config::default()
    };

    let db = Database::from_config(config).unwrap();
    let dsn = db.url();
    assert_eq!(dsn.as_str(), "postgresql+asyncpg://u:p@h:5433/d");
    assert_eq!(dsn.connect_url(), "postgresql://u:p@h:5433/d");
    assert_eq!(db.base_name(), Some("d"));
    assert!(!format!("{db:?}").contains(":p@"));

    db.close().await;
}
