use sqlx::SqlitePool;

use crate::db::models::ServerRow;
use crate::error::StoreError;

const SERVER_COLUMNS: &str = "id, prefix, lang, count, active, embedstyle, bot2botstyle, \
                              webhookid, webhooktoken, webhookactive";

/// Insert a new server record. A duplicate id is reported as `DuplicateKey`.
pub async fn create_server(pool: &SqlitePool, row: &ServerRow) -> Result<(), StoreError> {
    sqlx::query(
        "INSERT INTO servers (id, prefix, lang, count, active, embedstyle, bot2botstyle, \
         webhookid, webhooktoken, webhookactive) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&row.id)
    .bind(&row.prefix)
    .bind(&row.lang)
    .bind(row.count)
    .bind(row.active)
    .bind(row.embedstyle)
    .bind(row.bot2botstyle)
    .bind(&row.webhookid)
    .bind(&row.webhooktoken)
    .bind(row.webhookactive)
    .execute(pool)
    .await
    .map_err(|e| StoreError::from_write(e, &row.id))?;
    Ok(())
}

/// Get a server by ID.
pub async fn get_server(
    pool: &SqlitePool,
    server_id: &str,
) -> Result<Option<ServerRow>, sqlx::Error> {
    let sql = format!("SELECT {SERVER_COLUMNS} FROM servers WHERE id = ?");
    sqlx::query_as::<_, ServerRow>(&sql)
        .bind(server_id)
        .fetch_optional(pool)
        .await
}

/// List every stored server, the reserved bot row included.
pub async fn list_all_servers(pool: &SqlitePool) -> Result<Vec<ServerRow>, sqlx::Error> {
    let sql = format!("SELECT {SERVER_COLUMNS} FROM servers ORDER BY id");
    sqlx::query_as::<_, ServerRow>(&sql).fetch_all(pool).await
}

/// Persist the configuration columns of a server. `count` is left alone; it is
/// only ever changed by `increment_count`.
pub async fn save_server(pool: &SqlitePool, row: &ServerRow) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE servers SET prefix = ?, lang = ?, active = ?, embedstyle = ?, bot2botstyle = ?, \
         webhookid = ?, webhooktoken = ?, webhookactive = ? WHERE id = ?",
    )
    .bind(&row.prefix)
    .bind(&row.lang)
    .bind(row.active)
    .bind(row.embedstyle)
    .bind(row.bot2botstyle)
    .bind(&row.webhookid)
    .bind(&row.webhooktoken)
    .bind(row.webhookactive)
    .bind(&row.id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Atomically bump the usage counter. Returns whether a row was updated.
pub async fn increment_count(pool: &SqlitePool, server_id: &str) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE servers SET count = count + 1 WHERE id = ?")
        .bind(server_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
