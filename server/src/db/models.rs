use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Reserved server id holding the global/default configuration.
pub const BOT_SERVER_ID: &str = "bot";

/// Prefix marking a direct-message sender used as a task endpoint or server id.
pub const DM_PREFIX: &str = "@";

pub const DEFAULT_PREFIX: &str = "!tr";
pub const DEFAULT_LANG: &str = "en";

/// An on/off display toggle (`embedstyle`, `bot2botstyle`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn as_str(self) -> &'static str {
        match self {
            Toggle::On => "on",
            Toggle::Off => "off",
        }
    }
}

impl fmt::Display for Toggle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Toggle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on" => Ok(Toggle::On),
            "off" => Ok(Toggle::Off),
            other => Err(format!("expected 'on' or 'off', got '{other}'")),
        }
    }
}

/// A stored server (community or direct-message sender) configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ServerRow {
    pub id: String,
    pub prefix: String,
    pub lang: String,
    pub count: i64,
    pub active: bool,
    pub embedstyle: Toggle,
    pub bot2botstyle: Toggle,
    pub webhookid: Option<String>,
    pub webhooktoken: Option<String>,
    pub webhookactive: bool,
}

impl ServerRow {
    /// A fresh record with the column defaults.
    pub fn new(id: &str, lang: &str, prefix: &str) -> Self {
        Self {
            id: id.to_string(),
            prefix: prefix.to_string(),
            lang: lang.to_string(),
            count: 0,
            active: true,
            embedstyle: Toggle::On,
            bot2botstyle: Toggle::Off,
            webhookid: None,
            webhooktoken: None,
            webhookactive: false,
        }
    }
}

/// A directed translation route between two endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct TaskRow {
    pub id: i64,
    pub origin: String,
    pub dest: String,
    pub reply: String,
    pub server: String,
    pub active: bool,
    #[sqlx(rename = "LangFrom")]
    pub lang_from: String,
    #[sqlx(rename = "LangTo")]
    pub lang_to: String,
}

/// Parameters for upserting a task to one or more destinations.
#[derive(Debug, Clone)]
pub struct UpsertTaskParams<'a> {
    pub origin: &'a str,
    pub dest: Vec<String>,
    pub reply: &'a str,
    pub server: &'a str,
    pub lang_from: &'a str,
    pub lang_to: &'a str,
}

/// One row of `pragma_table_info`.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct ColumnInfo {
    pub cid: i64,
    pub name: String,
    pub col_type: String,
    pub notnull: i64,
    pub dflt_value: Option<String>,
    pub pk: i64,
}

/// Global usage figures.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct BotStats {
    pub total_count: i64,
    pub total_servers: i64,
    pub active_servers: i64,
    pub bot_lang: Option<String>,
    pub active_tasks: i64,
    pub active_user_tasks: i64,
}

/// Per-server usage figures and settings.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ServerInfo {
    pub count: i64,
    pub lang: String,
    pub active_tasks: i64,
    pub active_user_tasks: i64,
    pub embedstyle: Toggle,
    pub bot2botstyle: Toggle,
    pub webhookactive: bool,
    pub webhookid: Option<String>,
    pub webhooktoken: Option<String>,
    pub prefix: String,
}
