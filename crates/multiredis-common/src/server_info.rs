use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Snapshot of a backend's `INFO` output.
///
/// The fan-out client treats it as opaque and only copies it from the first
/// connected child.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    fields: BTreeMap<String, String>,
}

impl ServerInfo {
    /// Parses the `INFO` text format.
    ///
    /// Section headers (`# Server`) and blank lines are skipped; every other
    /// line is split on its first `:`.
    pub fn parse(info: &str) -> Self {
        let fields = info
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter_map(|line| line.split_once(':'))
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn redis_version(&self) -> Option<&str> {
        self.get("redis_version")
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn fields(&self) -> &BTreeMap<String, String> {
        &self.fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info_sections() {
        let info = "# Server\r\nredis_version:7.2.4\r\nredis_mode:standalone\r\n\r\n# Replication\r\nrole:master\r\n";
        let parsed = ServerInfo::parse(info);
        assert_eq!(parsed.redis_version(), Some("7.2.4"));
        assert_eq!(parsed.get("role"), Some("master"));
        assert_eq!(parsed.fields().len(), 3);
    }

    #[test]
    fn test_parse_keeps_colons_in_values() {
        let parsed = ServerInfo::parse("executable:/usr/bin/redis-server\ndb0:keys=1,expires=0\n");
        assert_eq!(parsed.get("db0"), Some("keys=1,expires=0"));
        assert_eq!(parsed.get("executable"), Some("/usr/bin/redis-server"));
    }

    #[test]
    fn test_parse_empty() {
        assert!(ServerInfo::parse("").is_empty());
    }
}
