use serde::Deserialize;
use tokio::sync::Mutex;

use crate::db::models::{DEFAULT_LANG, DEFAULT_PREFIX, ServerRow};

/// Values given to server records created by the relay itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDefaults {
    pub lang: String,
    pub prefix: String,
}

impl Default for ServerDefaults {
    fn default() -> Self {
        Self {
            lang: DEFAULT_LANG.into(),
            prefix: DEFAULT_PREFIX.into(),
        }
    }
}

/// Live metadata the chat platform reports for a connected community.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GuildInfo {
    pub name: String,
    #[serde(rename = "memberCount")]
    pub member_count: u64,
}

/// In-memory state for a cached server.
///
/// The record sits behind an async mutex so a config update holds it across the
/// database write and two updates to the same id never interleave.
#[derive(Debug)]
pub struct ServerEntry {
    pub id: String,
    pub record: Mutex<ServerRow>,
    /// Present when the server was in the roster at reconciliation time.
    pub guild: Option<GuildInfo>,
}

impl ServerEntry {
    pub fn new(row: ServerRow, guild: Option<GuildInfo>) -> Self {
        Self {
            id: row.id.clone(),
            record: Mutex::new(row),
            guild,
        }
    }

    /// Clone of the cached record.
    pub async fn snapshot(&self) -> ServerRow {
        self.record.lock().await.clone()
    }

    pub fn member_count(&self) -> u64 {
        self.guild.as_ref().map(|g| g.member_count).unwrap_or(0)
    }
}
