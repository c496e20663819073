//! Database layer for AutoLabel.
//!
//! Provides SQLite connection pooling and query modules
//! for projects and images.

mod images;
mod pool;
mod projects;

pub use images::*;
pub use pool::{create_pool_with_config, get_pool_stats, health_check, PoolConfig, PoolStats};
pub use projects::*;

use crate::Result;
use tracing::info;

/// Type alias for the SQLite connection pool.
pub type DbPool = sqlx::SqlitePool;

/// Initialize the database connection pool.
///
/// Creates parent directories if needed and configures SQLite with
/// WAL journaling and foreign keys enabled.
pub async fn init_pool(path: &str) -> Result<DbPool> {
    let pool = create_pool_with_config(path, PoolConfig::for_path(path)).await?;

    info!("Database pool initialized: {}", path);

    Ok(pool)
}

/// Initialize the database schema.
///
/// Applies the complete schema from schema.sql. Uses IF NOT EXISTS
/// clauses so it's safe to run multiple times.
pub async fn initialize_schema(pool: &DbPool) -> Result<()> {
    let schema = include_str!("../../schema.sql");

    info!("Initializing database schema");

    for statement in schema_statements(schema) {
        sqlx::query(&statement).execute(pool).await?;
    }

    info!("Database schema initialized successfully");

    Ok(())
}

/// Split a schema script into statements.
///
/// Comment lines are stripped before splitting on `;` so comments may
/// contain semicolons.
fn schema_statements(schema: &str) -> Vec<String> {
    let without_comments: String = schema
        .lines()
        .filter(|line| !line.trim().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_pool_in_memory() {
        let pool = init_pool(":memory:").await.unwrap();
        assert!(pool.size() > 0);
    }

    #[test]
    fn test_schema_statements_ignore_comment_semicolons() {
        let statements = schema_statements(
            "-- header; with a semicolon\nCREATE TABLE a (id TEXT);\n\n-- note\nCREATE INDEX i ON a(id);\n",
        );
        assert_eq!(
            statements,
            vec!["CREATE TABLE a (id TEXT)", "CREATE INDEX i ON a(id)"]
        );
    }

    #[test]
    fn test_bundled_schema_has_no_comment_fragments() {
        for statement in schema_statements(include_str!("../../schema.sql")) {
            assert!(
                statement.starts_with("CREATE") || statement.starts_with("PRAGMA"),
                "unexpected statement: {}",
                statement
            );
        }
    }

    #[tokio::test]
    async fn test_schema_initialization_is_idempotent() {
        let pool = init_pool(":memory:").await.unwrap();
        initialize_schema(&pool).await.unwrap();
        initialize_schema(&pool).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        let table_names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();
        assert_eq!(table_names, vec!["images", "projects"]);
    }
}
