use async_trait::async_trait;
use multiredis_common::{Endpoint, Result, ServerInfo, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::config::ConnectionOptions;

/// Names of the child events re-emitted on the fan-out client.
pub const PROXIED_EVENTS: &[&str] = &[
    "ready",
    "connect",
    "reconnecting",
    "error",
    "end",
    "warning",
    "message",
    "pmessage",
    "message_buffer",
    "pmessage_buffer",
    "subscribe",
    "psubscribe",
    "unsubscribe",
    "punsubscribe",
];

/// Lifecycle and data-path notification published by a child connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Connected and done loading; commands will be served
    Ready,
    /// Socket established
    Connect,
    /// Reconnect attempt scheduled
    Reconnecting { attempt: u32, delay: Duration },
    Error(String),
    /// Connection closed
    End,
    Warning(String),
    Message { channel: String, payload: String },
    PMessage { pattern: String, channel: String, payload: String },
    MessageBuffer { channel: Vec<u8>, payload: Vec<u8> },
    PMessageBuffer { pattern: Vec<u8>, channel: Vec<u8>, payload: Vec<u8> },
    Subscribe { channel: String, count: i64 },
    PSubscribe { pattern: String, count: i64 },
    Unsubscribe { channel: String, count: i64 },
    PUnsubscribe { pattern: String, count: i64 },
}

impl ConnectionEvent {
    /// Event name as listed in [`PROXIED_EVENTS`].
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionEvent::Ready => "ready",
            ConnectionEvent::Connect => "connect",
            ConnectionEvent::Reconnecting { .. } => "reconnecting",
            ConnectionEvent::Error(_) => "error",
            ConnectionEvent::End => "end",
            ConnectionEvent::Warning(_) => "warning",
            ConnectionEvent::Message { .. } => "message",
            ConnectionEvent::PMessage { .. } => "pmessage",
            ConnectionEvent::MessageBuffer { .. } => "message_buffer",
            ConnectionEvent::PMessageBuffer { .. } => "pmessage_buffer",
            ConnectionEvent::Subscribe { .. } => "subscribe",
            ConnectionEvent::PSubscribe { .. } => "psubscribe",
            ConnectionEvent::Unsubscribe { .. } => "unsubscribe",
            ConnectionEvent::PUnsubscribe { .. } => "punsubscribe",
        }
    }

    /// How the event affects the aggregate connection state.
    pub fn state_trigger(&self) -> StateTrigger {
        match self {
            ConnectionEvent::Ready => StateTrigger::Ready,
            ConnectionEvent::Connect | ConnectionEvent::Error(_) | ConnectionEvent::End => {
                StateTrigger::Recompute
            }
            _ => StateTrigger::None,
        }
    }
}

/// What a child event asks of the aggregate state tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateTrigger {
    /// Recompute and check for the all-ready transition
    Ready,
    /// Recompute only
    Recompute,
    None,
}

/// One backend connection wrapped by the fan-out client.
///
/// The connection owns its socket, wire protocol and reconnect logic. The
/// fan-out client only sends commands through it, reads its `connected` /
/// `ready` flags and listens to its events.
#[async_trait]
pub trait ChildConnection: Send + Sync {
    /// Human-readable identifier used in logs (usually `host:port`).
    fn name(&self) -> String;

    /// Sends one command and waits for its reply.
    async fn send_command(&self, command: &str, args: &[Value]) -> Result<Value>;

    fn is_connected(&self) -> bool;

    /// True once the backend is connected and finished loading.
    fn is_ready(&self) -> bool;

    fn server_info(&self) -> Option<ServerInfo>;

    /// Subscribes to this connection's events.
    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent>;
}

/// Creates child connections for the endpoint-descriptor construction path.
///
/// Connections are expected to connect in the background; `connect` only
/// fails for invalid input.
pub trait Connector: Send + Sync {
    fn connect(
        &self,
        endpoint: &Endpoint,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn ChildConnection>>;
}

impl<F> Connector for F
where
    F: Fn(&Endpoint, &ConnectionOptions) -> Result<Arc<dyn ChildConnection>> + Send + Sync,
{
    fn connect(
        &self,
        endpoint: &Endpoint,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn ChildConnection>> {
        self(endpoint, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_event_name_is_proxied() {
        let events = [
            ConnectionEvent::Ready,
            ConnectionEvent::Connect,
            ConnectionEvent::Reconnecting { attempt: 1, delay: Duration::from_millis(100) },
            ConnectionEvent::Error("boom".to_string()),
            ConnectionEvent::End,
            ConnectionEvent::Warning("slow".to_string()),
            ConnectionEvent::Message { channel: "c".to_string(), payload: "p".to_string() },
            ConnectionEvent::PMessage {
                pattern: "c*".to_string(),
                channel: "c1".to_string(),
                payload: "p".to_string(),
            },
            ConnectionEvent::MessageBuffer { channel: b"c".to_vec(), payload: b"p".to_vec() },
            ConnectionEvent::PMessageBuffer {
                pattern: b"c*".to_vec(),
                channel: b"c1".to_vec(),
                payload: b"p".to_vec(),
            },
            ConnectionEvent::Subscribe { channel: "c".to_string(), count: 1 },
            ConnectionEvent::PSubscribe { pattern: "c*".to_string(), count: 2 },
            ConnectionEvent::Unsubscribe { channel: "c".to_string(), count: 1 },
            ConnectionEvent::PUnsubscribe { pattern: "c*".to_string(), count: 0 },
        ];

        let names: Vec<&str> = events.iter().map(ConnectionEvent::name).collect();
        assert_eq!(names, PROXIED_EVENTS);
    }

    #[test]
    fn test_state_triggers() {
        assert_eq!(ConnectionEvent::Ready.state_trigger(), StateTrigger::Ready);
        assert_eq!(ConnectionEvent::Connect.state_trigger(), StateTrigger::Recompute);
        assert_eq!(ConnectionEvent::End.state_trigger(), StateTrigger::Recompute);
        assert_eq!(
            ConnectionEvent::Error("x".to_string()).state_trigger(),
            StateTrigger::Recompute
        );
        assert_eq!(
            ConnectionEvent::Warning("x".to_string()).state_trigger(),
            StateTrigger::None
        );
    }
}
