use sqlx::SqlitePool;
use tracing::error;

use crate::db::models::{BotStats, ServerInfo};
use crate::error::StoreError;

const BOT_STATS_QUERY: &str = "SELECT \
    (SELECT COALESCE(SUM(count), 0) FROM servers) AS total_count, \
    (SELECT COUNT(*) FROM servers WHERE id != 'bot') AS total_servers, \
    (SELECT COUNT(*) FROM servers WHERE id != 'bot' AND active = 1) AS active_servers, \
    (SELECT lang FROM servers WHERE id = 'bot') AS bot_lang, \
    (SELECT COUNT(DISTINCT origin) FROM tasks WHERE active = 1) AS active_tasks, \
    (SELECT COUNT(DISTINCT origin) FROM tasks WHERE active = 1 AND origin LIKE '@%') \
        AS active_user_tasks";

const SERVER_INFO_QUERY: &str = "SELECT s.count, s.lang, \
    (SELECT COUNT(DISTINCT origin) FROM tasks WHERE server = s.id AND active = 1) \
        AS active_tasks, \
    (SELECT COUNT(DISTINCT origin) FROM tasks \
        WHERE server = s.id AND active = 1 AND origin LIKE '@%') AS active_user_tasks, \
    s.embedstyle, s.bot2botstyle, s.webhookactive, s.webhookid, s.webhooktoken, s.prefix \
    FROM servers s WHERE s.id = ?";

fn query_failed(query: &str, source: sqlx::Error) -> StoreError {
    error!(error = %source, %query, "stats query failed");
    StoreError::Query {
        query: query.to_string(),
        source,
    }
}

/// Global totals. Server counts exclude the reserved bot row.
pub async fn bot_stats(pool: &SqlitePool) -> Result<BotStats, StoreError> {
    sqlx::query_as::<_, BotStats>(BOT_STATS_QUERY)
        .fetch_one(pool)
        .await
        .map_err(|e| query_failed(BOT_STATS_QUERY, e))
}

/// Settings and task totals for one server. `None` if the server is not stored.
pub async fn server_info(
    pool: &SqlitePool,
    server_id: &str,
) -> Result<Option<ServerInfo>, StoreError> {
    sqlx::query_as::<_, ServerInfo>(SERVER_INFO_QUERY)
        .bind(server_id)
        .fetch_optional(pool)
        .await
        .map_err(|e| query_failed(SERVER_INFO_QUERY, e))
}
