//! Database pool setup and schema migrations.

use anyhow::{Context, Result};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::info;

use crate::config::Config;

/// Current schema version - increment when adding migrations
const SCHEMA_VERSION: i64 = 1;

/// Open the SQLite pool and bring the schema up to date.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or migrated.
pub async fn connect(config: &Config) -> Result<SqlitePool> {
    info!("Connecting to database: {}", config.database.path);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .min_connections(1)
        .connect(&config.database_url())
        .await
        .with_context(|| format!("Failed to connect to database: {}", config.database_url()))?;

    run_migrations(&pool).await?;

    // Set pragmas for performance
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA synchronous = NORMAL")
        .execute(&pool)
        .await?;
    sqlx::query("PRAGMA foreign_keys = ON")
        .execute(&pool)
        .await?;

    info!("Database initialized");

    Ok(pool)
}

/// Run schema migrations, guarded by a `schema_version` table.
pub(crate) async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL DEFAULT (unixepoch()),
            description TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    let current_version: i64 =
        sqlx::query_scalar("SELECT COALESCE(MAX(version), 0) FROM schema_version")
            .fetch_one(pool)
            .await
            .unwrap_or(0);

    if current_version > SCHEMA_VERSION {
        anyhow::bail!(
            "Database schema version {} is newer than supported version {}. Please upgrade the application.",
            current_version,
            SCHEMA_VERSION
        );
    }

    if current_version == SCHEMA_VERSION {
        info!("Database schema up to date (version {})", current_version);
        return Ok(());
    }

    if current_version < 1 {
        info!("Applying migration 1: initial schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                password TEXT NOT NULL,
                role TEXT NOT NULL DEFAULT 'user',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channels (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS channel_members (
                user_id TEXT NOT NULL REFERENCES users(id),
                channel_id TEXT NOT NULL REFERENCES channels(id),
                joined_at TEXT NOT NULL,
                PRIMARY KEY (user_id, channel_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                channel_id TEXT REFERENCES channels(id),
                sender_id TEXT NOT NULL REFERENCES users(id),
                receiver_id TEXT REFERENCES users(id),
                content TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'not_received',
                is_deleted INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_channel ON messages(channel_id, created_at)")
            .execute(pool)
            .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_peers ON messages(sender_id, receiver_id, created_at)")
            .execute(pool)
            .await?;

        sqlx::query("INSERT INTO schema_version (version, description) VALUES (1, 'initial schema')")
            .execute(pool)
            .await?;
    }

    Ok(())
}
