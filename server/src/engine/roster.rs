use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use super::server::GuildInfo;

/// One connected community as reported by the chat platform.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RosterEntry {
    pub id: String,
    #[serde(flatten)]
    pub guild: GuildInfo,
}

impl RosterEntry {
    pub fn new(id: &str, name: &str, member_count: u64) -> Self {
        Self {
            id: id.to_string(),
            guild: GuildInfo {
                name: name.to_string(),
                member_count,
            },
        }
    }
}

/// Source of the live community roster. Read once per reconciliation.
pub trait Roster {
    fn snapshot(&self) -> Vec<RosterEntry>;
}

impl Roster for [RosterEntry] {
    fn snapshot(&self) -> Vec<RosterEntry> {
        self.to_vec()
    }
}

impl Roster for Vec<RosterEntry> {
    fn snapshot(&self) -> Vec<RosterEntry> {
        self.clone()
    }
}

/// Roster snapshot exported to a JSON file: `[{"id", "name", "memberCount"}]`.
#[derive(Debug, Clone, Default)]
pub struct FileRoster {
    entries: Vec<RosterEntry>,
}

impl FileRoster {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read roster file {}", path.display()))?;
        Self::parse(&contents)
            .with_context(|| format!("failed to parse roster file {}", path.display()))
    }

    pub fn parse(json: &str) -> anyhow::Result<Self> {
        let entries: Vec<RosterEntry> = serde_json::from_str(json)?;
        Ok(Self { entries })
    }
}

impl Roster for FileRoster {
    fn snapshot(&self) -> Vec<RosterEntry> {
        self.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_roster_json() {
        let roster = FileRoster::parse(
            r#"[{"id": "G1", "name": "Polyglots", "memberCount": 10},
                {"id": "G2", "name": "Lurkers", "memberCount": 3}]"#,
        )
        .unwrap();
        assert_eq!(
            roster.snapshot(),
            vec![
                RosterEntry::new("G1", "Polyglots", 10),
                RosterEntry::new("G2", "Lurkers", 3),
            ]
        );
    }

    #[test]
    fn test_parse_rejects_missing_member_count() {
        assert!(FileRoster::parse(r#"[{"id": "G1", "name": "x"}]"#).is_err());
    }

    #[test]
    fn test_load_missing_file_names_path() {
        let err = FileRoster::load(Path::new("/nonexistent/roster.json")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/roster.json"));
    }
}
