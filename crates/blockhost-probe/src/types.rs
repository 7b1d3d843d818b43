//! Probe results.

use std::collections::BTreeMap;

use serde::Serialize;

/// What a server reports to a list ping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PingResult {
    /// Protocol number; legacy servers do not report one.
    pub protocol: Option<i32>,
    /// Engine version string; empty for legacy servers.
    pub server_version: String,
    /// Message of the day.
    pub motd: String,
    /// Players currently connected.
    pub players_online: i64,
    /// Player slots.
    pub players_max: i64,
}

/// The full statistics block of a query session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FullStat {
    /// Key/value section (`hostname`, `version`, `numplayers`, ...).
    pub fields: BTreeMap<String, String>,
    /// Names of connected players.
    pub players: Vec<String>,
}

impl FullStat {
    /// Look up one field.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }
}
