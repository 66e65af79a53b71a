use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::server::{GuildInfo, ServerEntry};
use crate::db::models::{BOT_SERVER_ID, ServerRow};

/// Process-wide cache of server records keyed by community id.
///
/// Built by the reconciler at startup and never persisted. The reserved bot row is
/// never cached.
#[derive(Debug, Default)]
pub struct ServerCache {
    servers: DashMap<String, Arc<ServerEntry>>,
    total_members: AtomicU64,
}

impl ServerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache a record. Returns false if the id is reserved or already cached,
    /// in which case the existing entry is kept.
    pub fn insert(&self, row: ServerRow, guild: Option<GuildInfo>) -> bool {
        if row.id == BOT_SERVER_ID {
            return false;
        }
        match self.servers.entry(row.id.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                let entry = ServerEntry::new(row, guild);
                self.total_members
                    .fetch_add(entry.member_count(), Ordering::Relaxed);
                slot.insert(Arc::new(entry));
                true
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<Arc<ServerEntry>> {
        self.servers.get(id).map(|e| Arc::clone(e.value()))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.servers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.servers.is_empty()
    }

    /// Sum of member counts over every cached roster entry.
    pub fn total_members(&self) -> u64 {
        self.total_members.load(Ordering::Relaxed)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.servers.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::DEFAULT_PREFIX;

    fn guild(name: &str, members: u64) -> Option<GuildInfo> {
        Some(GuildInfo {
            name: name.into(),
            member_count: members,
        })
    }

    #[test]
    fn test_insert_skips_bot_row() {
        let cache = ServerCache::new();
        assert!(!cache.insert(ServerRow::new("bot", "en", DEFAULT_PREFIX), None));
        assert!(cache.is_empty());
    }

    #[test]
    fn test_insert_keeps_first_entry() {
        let cache = ServerCache::new();
        assert!(cache.insert(ServerRow::new("G1", "en", DEFAULT_PREFIX), guild("one", 10)));
        assert!(!cache.insert(ServerRow::new("G1", "fr", DEFAULT_PREFIX), guild("two", 99)));

        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_members(), 10);
        assert_eq!(cache.get("G1").unwrap().guild.as_ref().unwrap().name, "one");
    }

    #[test]
    fn test_total_members_counts_roster_entries_only() {
        let cache = ServerCache::new();
        cache.insert(ServerRow::new("G1", "en", DEFAULT_PREFIX), guild("one", 10));
        cache.insert(ServerRow::new("G2", "en", DEFAULT_PREFIX), guild("two", 5));
        cache.insert(ServerRow::new("@U1", "en", DEFAULT_PREFIX), None);

        assert_eq!(cache.total_members(), 15);
        assert_eq!(cache.ids(), vec!["@U1", "G1", "G2"]);
    }

    #[tokio::test]
    async fn test_snapshot_reflects_record() {
        let cache = ServerCache::new();
        cache.insert(ServerRow::new("G1", "en", DEFAULT_PREFIX), None);
        let entry = cache.get("G1").unwrap();
        entry.record.lock().await.prefix = "?tr".into();
        assert_eq!(entry.snapshot().await.prefix, "?tr");
    }
}
