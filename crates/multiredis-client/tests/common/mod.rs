//! Shared helpers for the fan-out client integration tests.

#![allow(dead_code)]

use multiredis_client::{ChildConnection, FanoutClient, FanoutConfig, MemoryConnection, Reply};
use multiredis_common::Value;
use std::sync::{Arc, Once};

static TRACING: Once = Once::new();

/// Installs a fmt subscriber filtered by `RUST_LOG` (default `info`).
pub fn init_tracing() {
    TRACING.call_once(|| {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_test_writer()
            .try_init();
    });
}

/// Child whose every command gets `reply`.
pub fn replying(name: &str, reply: Reply) -> Arc<MemoryConnection> {
    Arc::new(MemoryConnection::scripted(name, move |_, _| reply.clone()))
}

pub fn as_children(children: &[Arc<MemoryConnection>]) -> Vec<Arc<dyn ChildConnection>> {
    children
        .iter()
        .map(|child| child.clone() as Arc<dyn ChildConnection>)
        .collect()
}

pub fn client(children: &[Arc<MemoryConnection>], config: FanoutConfig) -> FanoutClient {
    init_tracing();
    FanoutClient::new(as_children(children), config).expect("Failed to create fan-out client")
}

pub fn with_timeout(child_timeout_ms: i64) -> FanoutConfig {
    FanoutConfig {
        child_timeout_ms,
        ..Default::default()
    }
}

pub fn parallel(child_timeout_ms: i64) -> FanoutConfig {
    FanoutConfig {
        child_timeout_ms,
        force_parallel: true,
        ..Default::default()
    }
}

pub fn ok() -> Reply {
    Reply::Value(Value::ok())
}
