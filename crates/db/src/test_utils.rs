//! Test utilities for database operations.
//!
//! Provides an in-memory SQLite database with the ledger schema applied, so
//! repository and service tests run without an external server.

use std::sync::Arc;

use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbErr, Statement};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::migrations::Migrator;

/// Test database configuration.
#[derive(Debug, Clone)]
pub struct TestDbConfig {
    /// Database URL.
    pub url: String,
}

impl Default for TestDbConfig {
    fn default() -> Self {
        Self {
            url: std::env::var("TEST_DB_URL").unwrap_or_else(|_| "sqlite::memory:".to_string()),
        }
    }
}

impl TestDbConfig {
    /// Whether the configured database lives only in memory.
    #[must_use]
    pub fn is_memory(&self) -> bool {
        self.url.contains(":memory:")
    }
}

/// A test database context that owns a migrated connection.
pub struct TestDatabase {
    /// Database connection, shareable with services under test.
    pub conn: Arc<DatabaseConnection>,
    /// Database configuration.
    pub config: TestDbConfig,
}

impl TestDatabase {
    /// Create a fresh, migrated test database.
    pub async fn new() -> Result<Self, DbErr> {
        Self::with_config(TestDbConfig::default()).await
    }

    /// Create a migrated test database with custom configuration.
    pub async fn with_config(config: TestDbConfig) -> Result<Self, DbErr> {
        let mut opt = ConnectOptions::new(&config.url);
        if config.is_memory() {
            // Every pooled connection would otherwise see its own empty database.
            opt.max_connections(1).min_connections(1);
        }
        opt.sqlx_logging(false);

        let conn = Database::connect(opt).await?;
        Migrator::up(&conn, None).await?;

        info!(url = %config.url, "Connected to test database");

        Ok(Self {
            conn: Arc::new(conn),
            config,
        })
    }

    /// Get the database connection.
    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        self.conn.as_ref()
    }

    /// Remove every row from the ledger tables.
    pub async fn cleanup(&self) -> Result<(), DbErr> {
        let backend = self.conn.get_database_backend();
        for table in [
            "active_mute",
            "active_softban",
            "active_warning",
            "punishment_history",
        ] {
            self.conn
                .execute(Statement::from_string(
                    backend,
                    format!("DELETE FROM {table}"),
                ))
                .await?;
        }

        info!("Cleaned up test database");
        Ok(())
    }
}
