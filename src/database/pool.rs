use crate::config::DatabaseConfig;
use crate::error::{CollectorError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;
use url::Url;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Create a new database connection pool
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let (host, database) = describe_url(&config.url);
        info!(
            host = %host,
            database = %database,
            table = %config.table,
            "Connecting to database"
        );

        let pool = PgPoolOptions::new()
            .min_connections(config.min_connections)
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .idle_timeout(Duration::from_secs(30 * 60)) // 30 minutes
            .max_lifetime(Duration::from_secs(60 * 60)) // 1 hour
            .connect(&config.url)
            .await
            .map_err(|e| CollectorError::DatabaseConnection(e.to_string()))?;

        info!("Database connection pool established");

        Ok(Database { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Round-trip latency of a trivial query
    pub async fn health_check(&self) -> Result<Duration> {
        let start = std::time::Instant::now();

        sqlx::query("SELECT 1").execute(&self.pool).await?;

        Ok(start.elapsed())
    }

    /// Run database migrations for the profiles table
    pub async fn run_migrations(&self, table: &str) -> Result<()> {
        info!(table = %table, "Running database migrations");

        super::migrations::run_migrations(&self.pool, table).await?;

        info!("Database migrations completed");
        Ok(())
    }

    /// Close the connection pool
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }
}

/// Host and database name of a connection string, without credentials
fn describe_url(url: &str) -> (String, String) {
    match Url::parse(url) {
        Ok(parsed) => {
            let host = match (parsed.host_str(), parsed.port()) {
                (Some(host), Some(port)) => format!("{}:{}", host, port),
                (Some(host), None) => host.to_string(),
                (None, _) => "unknown".to_string(),
            };
            let database = parsed.path().trim_start_matches('/').to_string();
            (host, database)
        }
        Err(_) => ("unknown".to_string(), "unknown".to_string()),
    }
}
