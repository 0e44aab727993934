use crate::error::Result;
use sqlx::PgPool;
use tracing::info;

/// A schema step for one profiles table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    pub version: i32,
    pub name: &'static str,
    pub sql: String,
}

/// Run all migrations for `table` that are not yet recorded
pub async fn run_migrations(pool: &PgPool, table: &str) -> Result<()> {
    create_migrations_table(pool).await?;

    for migration in get_migrations(table) {
        if is_migration_applied(pool, table, migration.version).await? {
            continue;
        }

        info!(
            version = migration.version,
            name = migration.name,
            table = %table,
            "Applying migration"
        );

        let mut tx = pool.begin().await?;
        sqlx::query(&migration.sql).execute(&mut *tx).await?;
        sqlx::query(
            "INSERT INTO collector_migrations (target, version, name) VALUES ($1, $2, $3)",
        )
        .bind(table)
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        info!(version = migration.version, "Migration applied successfully");
    }

    Ok(())
}

/// Create the migrations tracking table
async fn create_migrations_table(pool: &PgPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS collector_migrations (
            target VARCHAR(63) NOT NULL,
            version INTEGER NOT NULL,
            name VARCHAR(255) NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
            PRIMARY KEY (target, version)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn is_migration_applied(pool: &PgPool, table: &str, version: i32) -> Result<bool> {
    let count = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM collector_migrations WHERE target = $1 AND version = $2",
    )
    .bind(table)
    .bind(version)
    .fetch_one(pool)
    .await?;

    Ok(count > 0)
}

/// All migrations for `table`, in order
///
/// `table` must already be validated as a plain SQL identifier.
pub fn get_migrations(table: &str) -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            name: "create_profiles_table",
            sql: format!(
                r#"
                CREATE TABLE IF NOT EXISTS {table} (
                    username TEXT PRIMARY KEY,
                    status VARCHAR(20) NOT NULL DEFAULT 'not_collected'
                        CHECK (status IN ('not_collected', 'collected', 'error')),
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    updated_at TIMESTAMPTZ
                )
                "#
            ),
        },
        Migration {
            version: 2,
            name: "create_profiles_status_index",
            sql: format!("CREATE INDEX IF NOT EXISTS idx_{table}_status ON {table} (status)"),
        },
    ]
}
