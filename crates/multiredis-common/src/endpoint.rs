use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// Default port of a key-value backend.
pub const DEFAULT_PORT: u16 = 6379;

/// Address of one backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Drops endpoints that repeat an earlier `(host, port)` pair.
///
/// The first occurrence of each pair is kept and the relative order of the
/// survivors is preserved.
///
/// # Example
///
/// ```
/// use multiredis_common::{unique_endpoints, Endpoint};
///
/// let endpoints = vec![
///     Endpoint::new("h1", 1),
///     Endpoint::new("h2", 2),
///     Endpoint::new("h2", 2),
///     Endpoint::new("h1", 1),
/// ];
/// assert_eq!(
///     unique_endpoints(endpoints),
///     vec![Endpoint::new("h1", 1), Endpoint::new("h2", 2)]
/// );
/// ```
pub fn unique_endpoints(endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    let mut seen = HashSet::new();
    endpoints
        .into_iter()
        .filter(|endpoint| seen.insert((endpoint.host.clone(), endpoint.port)))
        .collect()
}
