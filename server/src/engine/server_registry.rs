use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use super::server::{GuildInfo, ServerDefaults};
use super::server_cache::ServerCache;
use super::validation;
use crate::db::models::{BOT_SERVER_ID, ServerRow, Toggle};
use crate::db::queries::servers;
use crate::error::StoreError;

/// Read/update access to server configuration, writing through the cache to the store.
pub struct ServerRegistry {
    db: SqlitePool,
    cache: ServerCache,
    defaults: ServerDefaults,
}

impl ServerRegistry {
    pub fn new(db: SqlitePool, cache: ServerCache, defaults: ServerDefaults) -> Self {
        Self {
            db,
            cache,
            defaults,
        }
    }

    pub fn cache(&self) -> &ServerCache {
        &self.cache
    }

    // ── Membership ──────────────────────────────────────────────────

    /// Register a server on first contact. Returns true if a record was created.
    ///
    /// Already-cached ids and the reserved bot id are a no-op. Losing a create race
    /// against another writer counts as already existing.
    pub async fn add_server(&self, id: &str, lang: &str) -> Result<bool, StoreError> {
        if id == BOT_SERVER_ID || self.cache.contains(id) {
            return Ok(false);
        }
        validation::validate_lang(lang).map_err(StoreError::InvalidInput)?;

        let row = ServerRow::new(id, lang, &self.defaults.prefix);
        match servers::create_server(&self.db, &row).await {
            Ok(()) => {
                info!(server_id = %id, %lang, "server added");
                Ok(self.cache.insert(row, None))
            }
            Err(e) if e.is_duplicate_key() => {
                warn!(server_id = %id, "server already exists, create suppressed");
                if let Some(existing) = servers::get_server(&self.db, id).await? {
                    self.cache.insert(existing, None);
                }
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Soft-delete a server. The record and its tasks are retained.
    pub async fn deactivate(&self, id: &str) -> Result<(), StoreError> {
        self.update(id, |row| row.active = false).await?;
        info!(server_id = %id, "server deactivated");
        Ok(())
    }

    // ── Configuration ───────────────────────────────────────────────

    pub async fn update_lang(&self, id: &str, lang: &str) -> Result<(), StoreError> {
        validation::validate_lang(lang).map_err(StoreError::InvalidInput)?;
        self.update(id, |row| row.lang = lang.to_string()).await?;
        Ok(())
    }

    pub async fn update_embed_style(&self, id: &str, style: Toggle) -> Result<(), StoreError> {
        self.update(id, |row| row.embedstyle = style).await?;
        Ok(())
    }

    pub async fn update_bot2bot_style(&self, id: &str, style: Toggle) -> Result<(), StoreError> {
        self.update(id, |row| row.bot2botstyle = style).await?;
        Ok(())
    }

    /// Set webhook id, token and active flag together. `None` clears the stored value.
    pub async fn update_webhook(
        &self,
        id: &str,
        webhook_id: Option<&str>,
        webhook_token: Option<&str>,
        active: bool,
    ) -> Result<(), StoreError> {
        self.update(id, |row| {
            row.webhookid = webhook_id.map(str::to_string);
            row.webhooktoken = webhook_token.map(str::to_string);
            row.webhookactive = active;
        })
        .await?;
        Ok(())
    }

    /// Turn the webhook off. Stored credentials are kept.
    pub async fn remove_webhook(&self, id: &str) -> Result<(), StoreError> {
        self.update(id, |row| row.webhookactive = false).await?;
        Ok(())
    }

    pub async fn update_prefix(&self, id: &str, prefix: &str) -> Result<(), StoreError> {
        validation::validate_prefix(prefix).map_err(StoreError::InvalidInput)?;
        self.update(id, |row| row.prefix = prefix.to_string()).await?;
        Ok(())
    }

    /// Apply `change` to a copy of the cached record, persist it, and commit the
    /// copy to the cache once the write succeeded. The entry stays locked throughout.
    async fn update<F>(&self, id: &str, change: F) -> Result<ServerRow, StoreError>
    where
        F: FnOnce(&mut ServerRow),
    {
        let entry = self
            .cache
            .get(id)
            .ok_or_else(|| StoreError::UnknownServer(id.to_string()))?;

        let mut record = entry.record.lock().await;
        let mut updated = record.clone();
        change(&mut updated);
        servers::save_server(&self.db, &updated).await?;
        *record = updated.clone();
        debug!(server_id = %id, "server record saved");
        Ok(updated)
    }

    // ── Counters and lookups ────────────────────────────────────────

    /// Bump the persisted usage counter. The cached record is not refreshed.
    pub async fn increment_count(&self, id: &str) -> Result<(), StoreError> {
        if !servers::increment_count(&self.db, id).await? {
            debug!(server_id = %id, "usage count for unknown server ignored");
        }
        Ok(())
    }

    /// Number of cached servers, the reserved bot row excluded.
    pub fn server_count(&self) -> usize {
        self.cache.len()
    }

    pub fn is_cached(&self, id: &str) -> bool {
        self.cache.contains(id)
    }

    /// Snapshot of the cached record.
    pub async fn get(&self, id: &str) -> Option<ServerRow> {
        let entry = self.cache.get(id)?;
        Some(entry.snapshot().await)
    }

    pub fn guild_info(&self, id: &str) -> Option<GuildInfo> {
        self.cache.get(id).and_then(|entry| entry.guild.clone())
    }

    pub fn total_members(&self) -> u64 {
        self.cache.total_members()
    }
}
