use chrono::Utc;
use sqlx::SqlitePool;
use tracing::{debug, error, info};

use super::routing::{InboundMessage, RoutedMessage, TranslationSink};
use crate::db::models::{TaskRow, UpsertTaskParams};
use crate::db::queries::tasks;
use crate::error::StoreError;

/// Destination keyword matching every task of an origin.
pub const ALL_DESTINATIONS: &str = "all";

/// Destination keyword for tasks that deliver back to the requesting user.
pub const SELF_DESTINATION: &str = "me";

/// Outcome of upserting one destination of a task.
#[derive(Debug)]
pub struct DestinationResult {
    pub dest: String,
    pub result: Result<(), StoreError>,
}

/// Operations over translation tasks.
#[derive(Clone)]
pub struct TaskRegistry {
    db: SqlitePool,
}

impl TaskRegistry {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    /// Upsert one task per destination. Every destination is attempted even if an
    /// earlier one fails, and all writes have completed when this returns.
    pub async fn upsert_tasks(&self, params: &UpsertTaskParams<'_>) -> Vec<DestinationResult> {
        let mut results = Vec::with_capacity(params.dest.len());
        for dest in &params.dest {
            let result = tasks::upsert_task(
                &self.db,
                params.origin,
                dest,
                params.reply,
                params.server,
                params.lang_from,
                params.lang_to,
            )
            .await;

            match &result {
                Ok(()) => debug!(origin = %params.origin, %dest, "task added"),
                Err(e) => error!(
                    origin = %params.origin,
                    %dest,
                    server = %params.server,
                    error = %e,
                    "failed to add task"
                ),
            }
            results.push(DestinationResult {
                dest: dest.clone(),
                result,
            });
        }
        results
    }

    /// Tasks of `origin`. With `filter_dest == "me"` only self-delivery tasks are
    /// returned; otherwise every active task.
    pub async fn find_tasks_for_origin(
        &self,
        origin: &str,
        filter_dest: &str,
    ) -> Result<Vec<TaskRow>, StoreError> {
        let rows = if filter_dest == SELF_DESTINATION {
            tasks::list_for_pair(&self.db, origin, SELF_DESTINATION).await?
        } else {
            tasks::list_active_for_origin(&self.db, origin).await?
        };
        Ok(rows)
    }

    /// Existing tasks from `origin` to `dest`, or every task of `origin` for `"all"`.
    pub async fn has_task(&self, origin: &str, dest: &str) -> Result<Vec<TaskRow>, StoreError> {
        let rows = if dest == ALL_DESTINATIONS {
            tasks::list_for_origin(&self.db, origin).await?
        } else {
            tasks::list_for_pair(&self.db, origin, dest).await?
        };
        Ok(rows)
    }

    /// Remove tasks between `origin` and `dest` in either direction. With `"all"`,
    /// removes every task where `origin` is either endpoint. Returns rows removed.
    pub async fn remove_task(&self, origin: &str, dest: &str) -> Result<u64, StoreError> {
        let removed = if dest == ALL_DESTINATIONS {
            tasks::delete_for_endpoint(&self.db, origin).await?
        } else {
            tasks::delete_between(&self.db, origin, dest).await?
        };
        info!(%origin, %dest, removed, "tasks removed");
        Ok(removed)
    }

    pub async fn count_tasks_for_origin(&self, origin: &str) -> Result<i64, StoreError> {
        Ok(tasks::count_for_origin(&self.db, origin).await?)
    }

    /// Resolve the active tasks for an inbound message and hand the result to the
    /// translation sink. A lookup failure travels with the message instead of
    /// being returned.
    pub async fn route_message<S: TranslationSink + ?Sized>(
        &self,
        message: InboundMessage,
        sink: &S,
    ) {
        let origin = message.origin_key();
        let (tasks, error) = match tasks::list_active_for_origin(&self.db, &origin).await {
            Ok(rows) => (rows, None),
            Err(e) => {
                error!(%origin, error = %e, "task lookup failed");
                (Vec::new(), Some(StoreError::from(e)))
            }
        };

        sink.hand_off(RoutedMessage {
            message,
            origin,
            tasks,
            error,
            routed_at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations::run_migrations;
    use crate::db::pool::create_pool;
    use crate::engine::routing::ChannelKind;
    use tokio::sync::mpsc;

    async fn setup_registry() -> (TaskRegistry, SqlitePool) {
        let pool = create_pool("sqlite::memory:").await.unwrap();
        run_migrations(&pool).await.unwrap();
        (TaskRegistry::new(pool.clone()), pool)
    }

    fn params<'a>(
        origin: &'a str,
        dest: &[&str],
        from: &'a str,
        to: &'a str,
    ) -> UpsertTaskParams<'a> {
        UpsertTaskParams {
            origin,
            dest: dest.iter().map(|d| d.to_string()).collect(),
            reply: origin,
            server: "G1",
            lang_from: from,
            lang_to: to,
        }
    }

    fn message(channel_id: &str, kind: ChannelKind, author_id: &str) -> InboundMessage {
        InboundMessage {
            channel_id: channel_id.into(),
            channel_kind: kind,
            author_id: author_id.into(),
            guild_id: Some("G1".into()),
            content: "bonjour".into(),
        }
    }

    #[tokio::test]
    async fn test_upsert_one_row_per_destination() {
        let (registry, _pool) = setup_registry().await;
        let results = registry
            .upsert_tasks(&params("C1", &["C2", "C3"], "en", "fr"))
            .await;
        assert!(results.iter().all(|r| r.result.is_ok()));

        let rows = registry.find_tasks_for_origin("C1", "").await.unwrap();
        let mut dests: Vec<&str> = rows.iter().map(|r| r.dest.as_str()).collect();
        dests.sort();
        assert_eq!(dests, vec!["C2", "C3"]);
    }

    #[tokio::test]
    async fn test_upsert_twice_keeps_latest_values() {
        let (registry, _pool) = setup_registry().await;
        registry.upsert_tasks(&params("C1", &["C2"], "en", "fr")).await;
        let mut again = params("C1", &["C2"], "en", "fr");
        again.reply = "C7";
        again.server = "G2";
        registry.upsert_tasks(&again).await;

        let rows = registry.has_task("C1", "C2").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].reply, "C7");
        assert_eq!(rows[0].server, "G2");
    }

    #[tokio::test]
    async fn test_failed_destination_does_not_abort_siblings() {
        let (registry, pool) = setup_registry().await;
        sqlx::query(
            "CREATE TRIGGER reject_bad BEFORE INSERT ON tasks WHEN NEW.dest = 'BAD' \
             BEGIN SELECT RAISE(ABORT, 'rejected'); END",
        )
        .execute(&pool)
        .await
        .unwrap();

        let results = registry
            .upsert_tasks(&params("C1", &["C2", "BAD", "C3"], "en", "fr"))
            .await;

        let failed: Vec<&str> = results
            .iter()
            .filter(|r| r.result.is_err())
            .map(|r| r.dest.as_str())
            .collect();
        assert_eq!(failed, vec!["BAD"]);
        assert_eq!(registry.count_tasks_for_origin("C1").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_find_with_me_filter() {
        let (registry, _pool) = setup_registry().await;
        registry
            .upsert_tasks(&params("C1", &["me", "C2"], "en", "fr"))
            .await;

        let mine = registry.find_tasks_for_origin("C1", "me").await.unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].dest, "me");
    }

    #[tokio::test]
    async fn test_find_skips_inactive_tasks() {
        let (registry, pool) = setup_registry().await;
        registry
            .upsert_tasks(&params("C1", &["C2", "C3"], "en", "fr"))
            .await;
        sqlx::query("UPDATE tasks SET active = 0 WHERE dest = 'C3'")
            .execute(&pool)
            .await
            .unwrap();

        let rows = registry.find_tasks_for_origin("C1", "C2").await.unwrap();
        assert_eq!(rows.len(), 1);
        // Existence checks see inactive rows too.
        assert_eq!(registry.has_task("C1", "all").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_find_ignores_filter_other_than_me() {
        let (registry, pool) = setup_registry().await;
        registry
            .upsert_tasks(&params("C1", &["C2", "C3", "me"], "en", "fr"))
            .await;
        registry.upsert_tasks(&params("C9", &["C2"], "en", "fr")).await;
        sqlx::query("UPDATE tasks SET active = 0 WHERE origin = 'C1' AND dest = 'C2'")
            .execute(&pool)
            .await
            .unwrap();

        for filter in ["", "all", "C2", "C404"] {
            let rows = registry.find_tasks_for_origin("C1", filter).await.unwrap();
            let mut dests: Vec<&str> = rows.iter().map(|r| r.dest.as_str()).collect();
            dests.sort();
            assert_eq!(dests, vec!["C3", "me"], "filter {filter:?}");
            assert!(rows.iter().all(|r| r.active && r.origin == "C1"));
        }
    }

    #[tokio::test]
    async fn test_remove_all_clears_both_sides() {
        let (registry, _pool) = setup_registry().await;
        registry.upsert_tasks(&params("C1", &["C2", "C3"], "en", "fr")).await;
        registry.upsert_tasks(&params("C4", &["C1"], "fr", "en")).await;
        registry.upsert_tasks(&params("C4", &["C5"], "fr", "en")).await;

        assert_eq!(registry.remove_task("C1", "all").await.unwrap(), 3);
        assert!(registry.has_task("C1", "all").await.unwrap().is_empty());
        assert!(registry.has_task("C4", "C1").await.unwrap().is_empty());
        assert_eq!(registry.count_tasks_for_origin("C4").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_remove_is_symmetric() {
        for (first, second) in [("A", "B"), ("B", "A")] {
            let (registry, _pool) = setup_registry().await;
            registry.upsert_tasks(&params("A", &["B"], "en", "fr")).await;

            assert_eq!(registry.remove_task(first, second).await.unwrap(), 1);
            assert!(registry.has_task("A", "B").await.unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_route_channel_message() {
        let (registry, _pool) = setup_registry().await;
        registry.upsert_tasks(&params("C1", &["C2"], "en", "fr")).await;
        let (tx, mut rx) = mpsc::unbounded_channel::<RoutedMessage>();

        registry
            .route_message(message("C1", ChannelKind::Guild, "U1"), &tx)
            .await;

        let routed = rx.try_recv().unwrap();
        assert_eq!(routed.origin, "C1");
        assert_eq!(routed.tasks.len(), 1);
        assert!(routed.error.is_none());
    }

    #[tokio::test]
    async fn test_route_direct_message_uses_sender_key() {
        let (registry, _pool) = setup_registry().await;
        registry.upsert_tasks(&params("@U1", &["@U1"], "en", "de")).await;
        let (tx, mut rx) = mpsc::unbounded_channel::<RoutedMessage>();

        registry
            .route_message(message("DM-CHANNEL", ChannelKind::Direct, "U1"), &tx)
            .await;

        let routed = rx.try_recv().unwrap();
        assert_eq!(routed.origin, "@U1");
        assert_eq!(routed.tasks[0].lang_to, "de");
    }

    #[tokio::test]
    async fn test_route_failure_is_forwarded() {
        // No schema: the lookup fails with "no such table".
        let pool = create_pool("sqlite::memory:").await.unwrap();
        let registry = TaskRegistry::new(pool);
        let (tx, mut rx) = mpsc::unbounded_channel::<RoutedMessage>();

        registry
            .route_message(message("C1", ChannelKind::Guild, "U1"), &tx)
            .await;

        let routed = rx.try_recv().unwrap();
        assert!(routed.tasks.is_empty());
        assert!(routed.error.is_some());
    }
}
