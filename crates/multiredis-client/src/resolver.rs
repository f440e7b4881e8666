use multiredis_common::{unique_endpoints, Endpoint, FanoutError, Result};
use std::sync::Arc;
use tracing::debug;

use crate::config::FanoutConfig;
use crate::connection::{ChildConnection, Connector};

/// What a fan-out client is built from.
///
/// A bare connection or endpoint converts into a one-element list.
pub enum Target {
    /// Pre-built connections, used as given
    Connections(Vec<Arc<dyn ChildConnection>>),
    /// Backend addresses; one connection is created per (deduplicated) endpoint
    Endpoints(Vec<Endpoint>),
}

impl Target {
    pub fn len(&self) -> usize {
        match self {
            Target::Connections(connections) => connections.len(),
            Target::Endpoints(endpoints) => endpoints.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<Arc<dyn ChildConnection>> for Target {
    fn from(connection: Arc<dyn ChildConnection>) -> Self {
        Target::Connections(vec![connection])
    }
}

impl From<Vec<Arc<dyn ChildConnection>>> for Target {
    fn from(connections: Vec<Arc<dyn ChildConnection>>) -> Self {
        Target::Connections(connections)
    }
}

impl From<Endpoint> for Target {
    fn from(endpoint: Endpoint) -> Self {
        Target::Endpoints(vec![endpoint])
    }
}

impl From<Vec<Endpoint>> for Target {
    fn from(endpoints: Vec<Endpoint>) -> Self {
        Target::Endpoints(endpoints)
    }
}

/// Turns a [`Target`] into the final ordered list of child connections.
///
/// # Errors
///
/// - `NoTargets` if the target holds no connection or endpoint
/// - Any error returned by the connector for an endpoint
pub fn resolve(
    target: Target,
    config: &FanoutConfig,
    connector: Option<&dyn Connector>,
) -> Result<Vec<Arc<dyn ChildConnection>>> {
    if target.is_empty() {
        return Err(FanoutError::NoTargets);
    }

    match target {
        Target::Connections(connections) => Ok(connections),
        Target::Endpoints(endpoints) => {
            let connector = connector.ok_or_else(|| {
                FanoutError::InvalidConfig(
                    "endpoint descriptors require a connector".to_string(),
                )
            })?;

            let requested = endpoints.len();
            let endpoints = if config.merge_duplicate_endpoints {
                unique_endpoints(endpoints)
            } else {
                endpoints
            };
            if endpoints.len() < requested {
                debug!(
                    "Merged {} duplicate endpoints, creating {} connections",
                    requested - endpoints.len(),
                    endpoints.len()
                );
            }

            let options = config.child_connection_options();
            endpoints
                .iter()
                .map(|endpoint| connector.connect(endpoint, &options))
                .collect()
        }
    }
}
