use std::collections::{HashMap, HashSet};

use sqlx::SqlitePool;
use tracing::{debug, info, warn};

use super::roster::{Roster, RosterEntry};
use super::server::{GuildInfo, ServerDefaults};
use super::server_cache::ServerCache;
use crate::db::models::{BOT_SERVER_ID, ServerRow};
use crate::db::queries::servers;
use crate::error::StoreError;

/// Result of a startup reconciliation pass.
#[derive(Debug)]
pub struct Reconciliation {
    pub cache: ServerCache,
    /// Roster ids that had no stored record and were created.
    pub created: Vec<String>,
    /// Roster ids whose record could not be created; retried on next startup.
    pub skipped: Vec<String>,
}

/// Make sure the reserved bot row exists. Returns true if it had to be created.
async fn ensure_bot_row(pool: &SqlitePool, defaults: &ServerDefaults) -> Result<bool, StoreError> {
    if servers::get_server(pool, BOT_SERVER_ID).await?.is_some() {
        return Ok(false);
    }
    info!("creating reserved bot server row");
    let row = ServerRow::new(BOT_SERVER_ID, &defaults.lang, &defaults.prefix);
    match servers::create_server(pool, &row).await {
        Ok(()) => Ok(true),
        Err(e) if e.is_duplicate_key() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Create a record for a roster entry the store does not know yet.
/// Returns `None` if it could not be created.
async fn create_missing(
    pool: &SqlitePool,
    id: &str,
    defaults: &ServerDefaults,
) -> Option<ServerRow> {
    let row = ServerRow::new(id, &defaults.lang, &defaults.prefix);
    match servers::create_server(pool, &row).await {
        Ok(()) => Some(row),
        Err(e) if e.is_duplicate_key() => match servers::get_server(pool, id).await {
            Ok(existing) => existing,
            Err(err) => {
                warn!(server_id = %id, error = %err, "failed to reload existing server");
                None
            }
        },
        Err(e) => {
            warn!(server_id = %id, error = %e, "failed to create server record, skipping");
            None
        }
    }
}

/// Merge stored server records with the live roster and build the server cache.
///
/// Must run after migrations and before any registry call. Failing to read the
/// store is fatal; failing to create a single missing record is not.
pub async fn initialize<R: Roster + ?Sized>(
    pool: &SqlitePool,
    roster: &R,
    defaults: &ServerDefaults,
) -> Result<Reconciliation, StoreError> {
    ensure_bot_row(pool, defaults).await?;

    let mut records: HashMap<String, ServerRow> = servers::list_all_servers(pool)
        .await?
        .into_iter()
        .filter(|row| row.id != BOT_SERVER_ID)
        .map(|row| (row.id.clone(), row))
        .collect();
    debug!(count = records.len(), "loaded stored servers");

    // A community listed twice only counts once.
    let mut seen = HashSet::new();
    let roster: Vec<RosterEntry> = roster
        .snapshot()
        .into_iter()
        .filter(|entry| entry.id != BOT_SERVER_ID && seen.insert(entry.id.clone()))
        .collect();

    let mut created = Vec::new();
    let mut skipped = Vec::new();
    for entry in &roster {
        if records.contains_key(&entry.id) {
            continue;
        }
        info!(server_id = %entry.id, name = %entry.guild.name, "adding server missing from store");
        match create_missing(pool, &entry.id, defaults).await {
            Some(row) => {
                records.insert(entry.id.clone(), row);
                created.push(entry.id.clone());
            }
            None => skipped.push(entry.id.clone()),
        }
    }

    let mut guilds: HashMap<String, GuildInfo> = roster
        .into_iter()
        .map(|entry| (entry.id, entry.guild))
        .collect();

    let cache = ServerCache::new();
    for (id, row) in records {
        let guild = guilds.remove(&id);
        cache.insert(row, guild);
    }

    info!(
        servers = cache.len(),
        created = created.len(),
        skipped = skipped.len(),
        total_members = cache.total_members(),
        "server cache initialized"
    );

    Ok(Reconciliation {
        cache,
        created,
        skipped,
    })
}
