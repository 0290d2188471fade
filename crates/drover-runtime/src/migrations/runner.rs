//! Schema migrations, applied by one process at a time.
//!
//! Every process calls [`MigrationRunner::run`] at startup; a PostgreSQL
//! advisory lock serializes them and the `drover_migrations` table makes the
//! second and later callers no-ops.

use std::collections::HashSet;

use drover_core::error::{DroverError, Result};
use sqlx::PgPool;
use tracing::{debug, info, warn};

/// Advisory lock key ("DROVR" in ASCII).
const MIGRATION_LOCK_ID: i64 = 0x44524F5652;

/// A named block of SQL.
#[derive(Debug, Clone)]
pub struct Migration {
    /// Unique name, ordered lexically (e.g. "0000_drover_internal").
    pub name: String,
    /// SQL to execute.
    pub sql: String,
}

impl Migration {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
        }
    }
}

/// Applies built-in migrations under an advisory lock.
pub struct MigrationRunner {
    pool: PgPool,
}

impl MigrationRunner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply every migration not yet recorded. Returns the names applied.
    pub async fn run(&self) -> Result<Vec<String>> {
        self.acquire_lock().await?;

        let result = self.run_inner().await;

        if let Err(e) = self.release_lock().await {
            warn!("Failed to release migration lock: {}", e);
        }

        result
    }

    async fn run_inner(&self) -> Result<Vec<String>> {
        self.ensure_migrations_table().await?;

        let applied = self.applied_migrations().await?;
        debug!(count = applied.len(), "Already applied migrations");

        let mut newly_applied = Vec::new();
        for migration in super::builtin::builtin_migrations() {
            if !applied.contains(&migration.name) {
                self.apply(&migration).await?;
                newly_applied.push(migration.name);
            }
        }

        Ok(newly_applied)
    }

    async fn acquire_lock(&self) -> Result<()> {
        debug!("Acquiring migration lock...");
        sqlx::query("SELECT pg_advisory_lock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                DroverError::StoreUnavailable(format!("Failed to acquire migration lock: {}", e))
            })?;
        debug!("Migration lock acquired");
        Ok(())
    }

    async fn release_lock(&self) -> Result<()> {
        sqlx::query("SELECT pg_advisory_unlock($1)")
            .bind(MIGRATION_LOCK_ID)
            .execute(&self.pool)
            .await?;
        debug!("Migration lock released");
        Ok(())
    }

    async fn ensure_migrations_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS drover_migrations (
                id SERIAL PRIMARY KEY,
                name VARCHAR(255) UNIQUE NOT NULL,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn applied_migrations(&self) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM drover_migrations")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }

    async fn apply(&self, migration: &Migration) -> Result<()> {
        info!(migration = %migration.name, "Applying migration");

        let mut tx = self.pool.begin().await?;
        for statement in split_sql_statements(&migration.sql) {
            if is_comment_only(&statement) {
                continue;
            }

            sqlx::query(&statement)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    DroverError::Internal(format!(
                        "Failed to apply migration '{}': {}",
                        migration.name, e
                    ))
                })?;
        }

        sqlx::query("INSERT INTO drover_migrations (name) VALUES ($1)")
            .bind(&migration.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        info!(migration = %migration.name, "Migration applied");
        Ok(())
    }
}

fn is_comment_only(statement: &str) -> bool {
    statement.lines().all(|l| {
        let l = l.trim();
        l.is_empty() || l.starts_with("--")
    })
}

/// Split SQL into statements, keeping `$tag$ ... $tag$` bodies intact.
fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut dollar_tag: Option<String> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        current.push(c);

        if c == '$' {
            let mut tag = String::from("$");
            while let Some(&next) = chars.peek() {
                if next == '$' || next.is_alphanumeric() || next == '_' {
                    chars.next();
                    tag.push(next);
                    current.push(next);
                    if next == '$' {
                        break;
                    }
                } else {
                    break;
                }
            }

            if tag.len() >= 2 && tag.ends_with('$') {
                match &dollar_tag {
                    Some(open) if *open == tag => dollar_tag = None,
                    None => dollar_tag = Some(tag),
                    Some(_) => {}
                }
            }
        }

        if c == ';' && dollar_tag.is_none() {
            let stmt = current.trim().trim_end_matches(';').trim();
            if !stmt.is_empty() {
                statements.push(stmt.to_string());
            }
            current.clear();
        }
    }

    let stmt = current.trim().trim_end_matches(';').trim();
    if !stmt.is_empty() {
        statements.push(stmt.to_string());
    }

    statements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_simple_statements() {
        let statements = split_sql_statements("CREATE TABLE a (id INT);\nCREATE TABLE b (id INT);");
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "CREATE TABLE a (id INT)");
    }

    #[test]
    fn test_split_keeps_dollar_quoted_body() {
        let sql = r#"
            CREATE FUNCTION f() RETURNS void AS $$
            BEGIN
                PERFORM 1;
            END;
            $$ LANGUAGE plpgsql;
            SELECT 1;
        "#;

        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].contains("PERFORM 1;"));
        assert_eq!(statements[1], "SELECT 1");
    }

    #[test]
    fn test_split_builtin_schema() {
        let migration = &super::super::builtin::builtin_migrations()[0];
        let statements: Vec<String> = split_sql_statements(&migration.sql)
            .into_iter()
            .filter(|s| !is_comment_only(s))
            .collect();

        assert!(statements
            .iter()
            .any(|s| s.contains("CREATE TABLE IF NOT EXISTS drover_jobs")));
        assert!(statements.iter().all(|s| !s.ends_with(';')));
    }

    #[test]
    fn test_comment_only() {
        assert!(is_comment_only("-- nothing here\n\n"));
        assert!(!is_comment_only("-- header\nSELECT 1"));
    }
}
