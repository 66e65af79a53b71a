use sqlx::SqlitePool;

use crate::db::models::TaskRow;
use crate::error::StoreError;

const TASK_COLUMNS: &str = "id, origin, dest, reply, server, active, LangFrom, LangTo";

/// Insert or overwrite the task keyed by (origin, dest, lang_from, lang_to).
pub async fn upsert_task(
    pool: &SqlitePool,
    origin: &str,
    dest: &str,
    reply: &str,
    server: &str,
    lang_from: &str,
    lang_to: &str,
) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO tasks (origin, dest, reply, server, active, LangFrom, LangTo) \
         VALUES (?, ?, ?, ?, 1, ?, ?) \
         ON CONFLICT (origin, dest, LangTo, LangFrom) DO UPDATE SET \
         reply = excluded.reply, server = excluded.server, active = excluded.active",
    )
    .bind(origin)
    .bind(dest)
    .bind(reply)
    .bind(server)
    .bind(lang_from)
    .bind(lang_to)
    .execute(pool)
    .await
    .map_err(|e| StoreError::from_write(e, &format!("{origin} -> {dest}")))?;
    Ok(())
}

/// Active tasks leaving `origin`.
pub async fn list_active_for_origin(
    pool: &SqlitePool,
    origin: &str,
) -> Result<Vec<TaskRow>, sqlx::Error> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE origin = ? AND active = 1 ORDER BY id");
    sqlx::query_as::<_, TaskRow>(&sql)
        .bind(origin)
        .fetch_all(pool)
        .await
}

/// All tasks leaving `origin`, active or not.
pub async fn list_for_origin(pool: &SqlitePool, origin: &str) -> Result<Vec<TaskRow>, sqlx::Error> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE origin = ? ORDER BY id");
    sqlx::query_as::<_, TaskRow>(&sql)
        .bind(origin)
        .fetch_all(pool)
        .await
}

/// Tasks for the exact directed pair.
pub async fn list_for_pair(
    pool: &SqlitePool,
    origin: &str,
    dest: &str,
) -> Result<Vec<TaskRow>, sqlx::Error> {
    let sql = format!("SELECT {TASK_COLUMNS} FROM tasks WHERE origin = ? AND dest = ? ORDER BY id");
    sqlx::query_as::<_, TaskRow>(&sql)
        .bind(origin)
        .bind(dest)
        .fetch_all(pool)
        .await
}

/// Delete every task touching `endpoint` on either side. Returns rows removed.
pub async fn delete_for_endpoint(pool: &SqlitePool, endpoint: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query("DELETE FROM tasks WHERE origin = ? OR dest = ?")
        .bind(endpoint)
        .bind(endpoint)
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}

/// Delete tasks between `a` and `b` in either direction. Returns rows removed.
pub async fn delete_between(pool: &SqlitePool, a: &str, b: &str) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "DELETE FROM tasks WHERE (origin = ? AND dest = ?) OR (origin = ? AND dest = ?)",
    )
    .bind(a)
    .bind(b)
    .bind(b)
    .bind(a)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

pub async fn count_for_origin(pool: &SqlitePool, origin: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE origin = ?")
        .bind(origin)
        .fetch_one(pool)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;
    use crate::db::pool::create_pool;

    async fn setup_db() -> SqlitePool {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        pool
    }

    #[tokio::test]
    async fn test_upsert_overwrites_same_key() {
        let pool = setup_db().await;
        upsert_task(&pool, "C1", "C2", "C1", "G1", "en", "fr").await.unwrap();
        upsert_task(&pool, "C1", "C2", "C9", "G2", "en", "fr").await.unwrap();

        let rows = list_for_origin(&pool, "C1").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reply, "C9");
        assert_eq!(rows[0].server, "G2");
    }

    #[tokio::test]
    async fn test_upsert_reactivates_disabled_task() {
        let pool = setup_db().await;
        upsert_task(&pool, "C1", "C2", "C1", "G1", "en", "fr").await.unwrap();
        sqlx::query("UPDATE tasks SET active = 0")
            .execute(&pool)
            .await
            .unwrap();
        assert!(list_active_for_origin(&pool, "C1").await.unwrap().is_empty());

        upsert_task(&pool, "C1", "C2", "C1", "G1", "en", "fr").await.unwrap();
        assert_eq!(list_active_for_origin(&pool, "C1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_language_pair_is_part_of_key() {
        let pool = setup_db().await;
        upsert_task(&pool, "C1", "C2", "C1", "G1", "en", "fr").await.unwrap();
        upsert_task(&pool, "C1", "C2", "C1", "G1", "en", "de").await.unwrap();
        upsert_task(&pool, "C1", "C2", "C1", "G1", "fr", "en").await.unwrap();

        assert_eq!(count_for_origin(&pool, "C1").await.unwrap(), 3);
        assert_eq!(list_for_pair(&pool, "C1", "C2").await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_between_either_direction() {
        let pool = setup_db().await;
        upsert_task(&pool, "A", "B", "A", "G1", "en", "fr").await.unwrap();
        upsert_task(&pool, "B", "A", "B", "G1", "fr", "en").await.unwrap();
        upsert_task(&pool, "A", "C", "A", "G1", "en", "fr").await.unwrap();

        assert_eq!(delete_between(&pool, "B", "A").await.unwrap(), 2);
        let left = list_for_origin(&pool, "A").await.unwrap();
        assert_eq!(left.len(), 1);
        assert_eq!(left[0].dest, "C");
    }

    #[tokio::test]
    async fn test_delete_for_endpoint_matches_both_sides() {
        let pool = setup_db().await;
        upsert_task(&pool, "A", "B", "A", "G1", "en", "fr").await.unwrap();
        upsert_task(&pool, "C", "A", "C", "G1", "en", "fr").await.unwrap();
        upsert_task(&pool, "C", "D", "C", "G1", "en", "fr").await.unwrap();

        assert_eq!(delete_for_endpoint(&pool, "A").await.unwrap(), 2);
        assert_eq!(count_for_origin(&pool, "C").await.unwrap(), 1);
    }
}
