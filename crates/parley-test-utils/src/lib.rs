//! Shared test utilities for parley integration tests.
//!
//! Provides one PostgreSQL server per test binary; every [`TestDb`] is a
//! freshly migrated database inside it.
//!
//! - **`PARLEY_TEST_PG_URL`** set: use that server directly (CI starts it).
//! - Otherwise a container is started through testcontainers on first use
//!   and kept alive in a `OnceCell` until the binary exits.

use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use testcontainers::ContainerAsync;
use testcontainers::ImageExt;
use testcontainers::runners::AsyncRunner;
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;
use uuid::Uuid;

use parley_db::pool;

struct SharedServer {
    base_url: String,
    /// `None` when the server came from `PARLEY_TEST_PG_URL`.
    _container: Option<ContainerAsync<Postgres>>,
}

static SHARED_SERVER: OnceCell<SharedServer> = OnceCell::const_new();

async fn start_server() -> SharedServer {
    if let Ok(url) = std::env::var("PARLEY_TEST_PG_URL") {
        return SharedServer {
            base_url: url.trim_end_matches('/').to_string(),
            _container: None,
        };
    }

    let container = Postgres::default()
        .with_tag("17")
        .start()
        .await
        .expect("failed to start PostgreSQL container");
    let host = container.get_host().await.expect("failed to get host");
    let port = container
        .get_host_port_ipv4(5432)
        .await
        .expect("failed to get mapped port");

    SharedServer {
        base_url: format!("postgresql://postgres:postgres@{host}:{port}"),
        _container: Some(container),
    }
}

/// Server root URL (no database name).
pub async fn server_url() -> &'static str {
    &SHARED_SERVER.get_or_init(start_server).await.base_url
}

async fn maintenance_pool() -> PgPool {
    let url = format!("{}/postgres", server_url().await);
    PgPoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(30))
        .connect(&url)
        .await
        .expect("failed to connect to the maintenance database")
}

/// A uniquely named, migrated database. Call [`TestDb::teardown`] when done.
pub struct TestDb {
    pub pool: PgPool,
    pub name: String,
}

impl TestDb {
    /// Create the database and apply every embedded migration.
    pub async fn create() -> Self {
        let name = format!("parley_test_{}", Uuid::new_v4().simple());

        let maint = maintenance_pool().await;
        maint
            .execute(format!("CREATE DATABASE {name}").as_str())
            .await
            .unwrap_or_else(|e| panic!("failed to create test database {name}: {e}"));
        maint.close().await;

        let url = format!("{}/{name}", server_url().await);
        let db_pool = PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&url)
            .await
            .unwrap_or_else(|e| panic!("failed to connect to test database {name}: {e}"));

        pool::migrate(&db_pool)
            .await
            .expect("migrations should succeed");

        Self {
            pool: db_pool,
            name,
        }
    }

    /// Connection URL of this database, for code that builds its own pool.
    pub async fn url(&self) -> String {
        format!("{}/{}", server_url().await, self.name)
    }

    /// Close the pool and drop the database, terminating stray sessions.
    pub async fn teardown(self) {
        self.pool.close().await;

        let maint = maintenance_pool().await;
        let terminate = format!(
            "SELECT pg_terminate_backend(pid) FROM pg_stat_activity \
             WHERE datname = '{}' AND pid <> pg_backend_pid()",
            self.name
        );
        let _ = maint.execute(terminate.as_str()).await;
        let _ = maint
            .execute(format!("DROP DATABASE IF EXISTS {}", self.name).as_str())
            .await;
        maint.close().await;
    }
}
