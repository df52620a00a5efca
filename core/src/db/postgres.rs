// Travel listings
// Copyright 2023 Julio Merino
//
// Licensed under the Apache License, Version 2.0 (the "License"); you may not
// use this file except in compliance with the License.  You may obtain a copy
// of the License at:
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS, WITHOUT
// WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.  See the
// License for the specific language governing permissions and limitations
// under the License.

//! Common utilities to interact with a PostgreSQL database.

use crate::db::{Db, DbError, DbResult, Executor, TxExecutor};
use crate::env::{get_optional_var, get_required_var};
use async_trait::async_trait;
use derivative::Derivative;
use futures::Future;
use log::warn;
use sqlx::Transaction;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{
    PgConnectOptions, PgConnection, PgDatabaseError, PgPool, PgPoolOptions, Postgres,
};
use std::time::Duration;

/// Default value for the `max_retries` configuration property.
const DEFAULT_MAX_RETRIES: u16 = 60;

/// Takes a raw SQLx error `e` and converts it to our generic error type.
pub fn map_sqlx_error(e: sqlx::Error) -> DbError {
    match e {
        sqlx::Error::ColumnDecode { source, .. } => DbError::DataIntegrityError(source.to_string()),
        sqlx::Error::Database(e) => match e.try_downcast_ref::<PgDatabaseError>() {
            Some(pg) => match pg.code() {
                "23503" /* foreign_key_violation */ => DbError::NotFound,
                "23505" /* unique_violation */ => DbError::AlreadyExists,
                "40001" /* serialization_failure */ => DbError::Unavailable,
                "40P01" /* deadlock_detected */ => DbError::Unavailable,
                "53300" /* too_many_connections */ => DbError::Unavailable,
                number => DbError::BackendError(format!("pgsql error {}: {}", number, pg)),
            },
            None => DbError::BackendError(e.to_string()),
        },
        sqlx::Error::PoolTimedOut => DbError::Unavailable,
        sqlx::Error::RowNotFound => DbError::NotFound,
        e => DbError::BackendError(e.to_string()),
    }
}

/// Options to establish a connection to a PostgreSQL database.
#[derive(Derivative)]
#[derivative(Debug)]
#[cfg_attr(test, derivative(PartialEq))]
pub struct PostgresOptions {
    /// Host to connect to.
    pub host: String,

    /// Port to connect to (typically 5432).
    pub port: u16,

    /// Database name to connect to.
    pub database: String,

    /// Username to establish the connection with.
    pub username: String,

    /// Password to establish the connection with.
    #[derivative(Debug = "ignore")]
    pub password: String,

    /// Minimum number of connections to keep open against the database.
    pub min_connections: Option<u32>,

    /// Maximum number of connections to allow against the database.
    pub max_connections: Option<u32>,

    /// Maximum number of attempts to retry a connection operation when the database does not seem
    /// to be available.
    pub max_retries: u16,
}

impl PostgresOptions {
    /// Initializes a set of options from environment variables whose name is prefixed with the
    /// given `prefix`.
    ///
    /// This will use variables such as `<prefix>_HOST`, `<prefix>_PORT`, `<prefix>_DATABASE`,
    /// `<prefix>_USERNAME`, `<prefix>_PASSWORD`, `<prefix>_MIN_CONNECTIONS`,
    /// `<prefix>_MAX_CONNECTIONS` and `<prefix>_MAX_RETRIES`.
    pub fn from_env(prefix: &str) -> Result<PostgresOptions, String> {
        Ok(PostgresOptions {
            host: get_required_var::<String>(prefix, "HOST")?,
            port: get_required_var::<u16>(prefix, "PORT")?,
            database: get_required_var::<String>(prefix, "DATABASE")?,
            username: get_required_var::<String>(prefix, "USERNAME")?,
            password: get_required_var::<String>(prefix, "PASSWORD")?,
            min_connections: get_optional_var::<u32>(prefix, "MIN_CONNECTIONS")?,
            max_connections: get_optional_var::<u32>(prefix, "MAX_CONNECTIONS")?,
            max_retries: get_optional_var::<u16>(prefix, "MAX_RETRIES")?
                .unwrap_or(DEFAULT_MAX_RETRIES),
        })
    }
}

/// A generic database executor implementation for PostgreSQL.
#[derive(Debug)]
pub enum PostgresExecutor {
    /// An executor backed by a pooled connection.
    PoolExec(PoolConnection<Postgres>),

    /// An executor backed by a transaction.
    TxExec(Transaction<'static, Postgres>),
}

impl PostgresExecutor {
    /// Returns the connection on which to issue queries.
    pub fn conn(&mut self) -> &mut PgConnection {
        match self {
            PostgresExecutor::PoolExec(conn) => &mut **conn,
            PostgresExecutor::TxExec(tx) => &mut **tx,
        }
    }

    /// Commits the transaction if this executor is backed by one.
    ///
    /// Calling this on a non-transaction-based executor results in a panic.
    pub(super) async fn commit(self) -> DbResult<()> {
        match self {
            PostgresExecutor::PoolExec(_) => unreachable!("Do not call commit on direct executors"),
            PostgresExecutor::TxExec(tx) => tx.commit().await.map_err(map_sqlx_error),
        }
    }
}

/// Delay after which the backoff between connection attempts stops growing.
const MAX_BACKOFF: Duration = Duration::from_secs(5);

/// Returns a random amount of milliseconds in `[0, range)` to spread out reconnection attempts.
fn jitter_ms(range: u16) -> u64 {
    u64::from(rand::random::<u16>() % range)
}

/// Computes the delay to wait before the attempt that follows one delayed by `delay`.
fn next_backoff(delay: Duration) -> Duration {
    if delay < MAX_BACKOFF { delay + Duration::from_millis(jitter_ms(1000)) } else { delay }
}

/// Retries a database operation up to `retries` times while the database is unavailable.
async fn retry<Op, OpFut, T>(op: Op, retries: u16) -> DbResult<T>
where
    Op: Fn() -> OpFut,
    OpFut: Future<Output = Result<T, sqlx::Error>>,
    T: Send + Sync,
{
    let mut delay = Duration::from_millis(100 + jitter_ms(900));
    for left in (0..=retries).rev() {
        match op().await.map_err(map_sqlx_error) {
            Err(DbError::Unavailable) if left > 0 => {
                warn!(
                    "Database is unavailable; waiting {}ms before retrying with {} attempts left",
                    delay.as_millis(),
                    left - 1
                );
                tokio::time::sleep(delay).await;
                delay = next_backoff(delay);
            }
            result => return result,
        }
    }
    Err(DbError::Unavailable)
}

/// Shareable connection across transactions.
pub struct PostgresDb {
    /// Shared PostgreSQL connection pool.  This is a cloneable type that all concurrent
    /// transactions can use concurrently.
    pool: PgPool,

    /// Maximum number of attempts to retry a connection operation when the database does not seem
    /// to be available.
    max_retries: u16,
}

impl Drop for PostgresDb {
    fn drop(&mut self) {
        if !self.pool.is_closed() {
            warn!("Dropping connection without having called close() first");
        }
    }
}

impl PostgresDb {
    /// Creates a new connection pool based on a set of options.
    ///
    /// Note that this does *not* establish any connection yet.
    pub fn connect(opts: PostgresOptions) -> DbResult<Self> {
        let mut pool_options = PgPoolOptions::new();
        if let Some(min_connections) = opts.min_connections {
            pool_options = pool_options.min_connections(min_connections);
        }
        if let Some(max_connections) = opts.max_connections {
            pool_options = pool_options.max_connections(max_connections);
        }
        pool_options = pool_options.acquire_timeout(Duration::from_secs(2));

        let options = PgConnectOptions::new()
            .host(&opts.host)
            .port(opts.port)
            .database(&opts.database)
            .username(&opts.username)
            .password(&opts.password);

        let pool = pool_options.connect_lazy_with(options);
        Ok(Self { pool, max_retries: opts.max_retries })
    }

    /// Returns an executor of the specific type used by this database.
    pub async fn typed_ex(&self) -> DbResult<PostgresExecutor> {
        let conn = retry(|| self.pool.acquire(), self.max_retries).await?;
        Ok(PostgresExecutor::PoolExec(conn))
    }
}

#[async_trait]
impl Db for PostgresDb {
    async fn ex(&self) -> DbResult<Executor> {
        Ok(Executor::Postgres(self.typed_ex().await?))
    }

    async fn begin(&self) -> DbResult<TxExecutor> {
        let tx = retry(|| self.pool.begin(), self.max_retries).await?;
        Ok(TxExecutor(Executor::Postgres(PostgresExecutor::TxExec(tx))))
    }

    async fn begin_serializable(&self) -> DbResult<TxExecutor> {
        let mut tx = retry(|| self.pool.begin(), self.max_retries).await?;
        // Must be the first statement of the transaction to take effect.
        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;
        Ok(TxExecutor(Executor::Postgres(PostgresExecutor::TxExec(tx))))
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Applies all the statements in `schema` to the database.
pub async fn run_schema(e: &mut PostgresExecutor, schema: &str) -> DbResult<()> {
    sqlx::raw_sql(schema).execute(e.conn()).await.map_err(map_sqlx_error)?;
    Ok(())
}

/// Test utilities for the PostgreSQL connection.
#[cfg(any(feature = "testutils", test))]
pub mod testutils {
    use super::*;

    /// Creates a new connection to the test database configured via `PGSQL_TEST_*`.
    ///
    /// The connection uses the `pg_temp` schema by default so that any tables created during the
    /// test are deleted at disconnection time.  For this to work, the pool must maintain a single
    /// connection open at all times, but not more.
    ///
    /// Given that this is for testing purposes only, any errors will panic.
    pub async fn setup() -> PostgresDb {
        let _can_fail = env_logger::builder().is_test(true).try_init();

        let mut opts = PostgresOptions::from_env("PGSQL_TEST").unwrap();
        opts.min_connections = Some(1);
        opts.max_connections = Some(1);
        let db = PostgresDb::connect(opts).unwrap();

        let mut ex = db.typed_ex().await.unwrap();
        sqlx::query("SET search_path TO pg_temp").execute(ex.conn()).await.unwrap();
        db
    }
}

#[cfg(test)]
mod tests {
    use super::testutils::*;
    use super::*;
    use crate::db::testutils::generate_tests;

    generate_tests!(
        #[ignore = "Requires environment configuration and is expensive"],
        Box::new(setup().await),
        crate::db::tests,
        test_direct_execution,
        test_tx_commit,
        test_tx_rollback_on_drop,
        test_serializable_tx_commit
    );

    #[test]
    fn test_next_backoff_is_bounded() {
        let mut delay = Duration::from_millis(100);
        for _ in 0..1000 {
            let next = next_backoff(delay);
            assert!(next >= delay);
            delay = next;
        }
        assert!(delay < MAX_BACKOFF + Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_retries() {
        let attempts = std::sync::atomic::AtomicU16::new(0);
        let result: DbResult<()> = retry(
            || {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Err(sqlx::Error::PoolTimedOut) }
            },
            0,
        )
        .await;
        assert_eq!(Err(DbError::Unavailable), result);
        assert_eq!(1, attempts.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_retry_does_not_retry_other_errors() {
        let attempts = std::sync::atomic::AtomicU16::new(0);
        let result: DbResult<()> = retry(
            || {
                attempts.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                async { Err(sqlx::Error::RowNotFound) }
            },
            5,
        )
        .await;
        assert_eq!(Err(DbError::NotFound), result);
        assert_eq!(1, attempts.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_postgres_options_from_env_all_required_present() {
        let overrides = [
            ("PGSQL_HOST", Some("the-host")),
            ("PGSQL_PORT", Some("1234")),
            ("PGSQL_DATABASE", Some("the-database")),
            ("PGSQL_USERNAME", Some("the-username")),
            ("PGSQL_PASSWORD", Some("the-password")),
            ("PGSQL_MIN_CONNECTIONS", None),
            ("PGSQL_MAX_CONNECTIONS", None),
            ("PGSQL_MAX_RETRIES", None),
        ];
        temp_env::with_vars(overrides, || {
            let opts = PostgresOptions::from_env("PGSQL").unwrap();
            assert_eq!(
                PostgresOptions {
                    host: "the-host".to_owned(),
                    port: 1234,
                    database: "the-database".to_owned(),
                    username: "the-username".to_owned(),
                    password: "the-password".to_owned(),
                    min_connections: None,
                    max_connections: None,
                    max_retries: DEFAULT_MAX_RETRIES,
                },
                opts
            );
        });
    }

    #[test]
    fn test_postgres_options_from_env_all_optional_present() {
        let overrides = [
            ("PGSQL_HOST", Some("the-host")),
            ("PGSQL_PORT", Some("1234")),
            ("PGSQL_DATABASE", Some("the-database")),
            ("PGSQL_USERNAME", Some("the-username")),
            ("PGSQL_PASSWORD", Some("the-password")),
            ("PGSQL_MIN_CONNECTIONS", Some("2")),
            ("PGSQL_MAX_CONNECTIONS", Some("8")),
            ("PGSQL_MAX_RETRIES", Some("5")),
        ];
        temp_env::with_vars(overrides, || {
            let opts = PostgresOptions::from_env("PGSQL").unwrap();
            assert_eq!(Some(2), opts.min_connections);
            assert_eq!(Some(8), opts.max_connections);
            assert_eq!(5, opts.max_retries);
        });
    }

    #[test]
    fn test_postgres_options_from_env_missing() {
        let overrides = [
            ("MISSING_HOST", Some("the-host")),
            ("MISSING_PORT", Some("1234")),
            ("MISSING_DATABASE", None),
            ("MISSING_USERNAME", Some("the-username")),
            ("MISSING_PASSWORD", Some("the-password")),
        ];
        temp_env::with_vars(overrides, || {
            let err = PostgresOptions::from_env("MISSING").unwrap_err();
            assert!(err.contains("MISSING_DATABASE"));
        });
    }

    #[test]
    fn test_postgres_options_debug_hides_password() {
        let opts = PostgresOptions {
            host: "h".to_owned(),
            port: 5432,
            database: "d".to_owned(),
            username: "u".to_owned(),
            password: "super-secret".to_owned(),
            min_connections: None,
            max_connections: None,
            max_retries: 0,
        };
        assert!(!format!("{:?}", opts).contains("super-secret"));
    }
}
