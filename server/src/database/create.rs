use sqlx::SqlitePool;
use tracing::info;

/// Current schema version, stored in `PRAGMA user_version`.
const SCHEMA_VERSION: i64 = 1;

/// Create the user and authority tables if they do not exist yet.
pub async fn create_tables(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    let current: i64 = sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?;

    if current >= SCHEMA_VERSION {
        return Ok(());
    }

    info!(
        "Database schema at version {}; creating version {}",
        current, SCHEMA_VERSION
    );

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS sys_users (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            uuid          TEXT    NOT NULL UNIQUE,
            username      TEXT    NOT NULL UNIQUE,
            password_hash TEXT    NOT NULL,
            nick_name     TEXT    NOT NULL DEFAULT '',
            authority_id  TEXT    NOT NULL,
            created_at    INTEGER NOT NULL,
            updated_at    INTEGER NOT NULL
        )",
    )
    .execute(pool)
    .await?;

    // Every authority a user may switch to; the current one is always listed.
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS sys_user_authority (
            user_id      INTEGER NOT NULL,
            authority_id TEXT    NOT NULL,
            PRIMARY KEY (user_id, authority_id),
            FOREIGN KEY (user_id) REFERENCES sys_users(id) ON DELETE CASCADE
        )",
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_sys_users_username ON sys_users(username)")
        .execute(pool)
        .await?;

    sqlx::query(&format!("PRAGMA user_version = {}", SCHEMA_VERSION))
        .execute(pool)
        .await?;

    Ok(())
}
