//! In-process child connection.
//!
//! [`MemoryConnection`] implements [`ChildConnection`] without a network.
//! By default it serves a handful of string commands from a private map; a
//! scripted handler can instead decide every reply, including delays,
//! errors, hangs and panics. Its `connected` / `ready` flags and events are
//! driven by hand, which makes it the building block for tests and
//! benchmarks of the fan-out client.

use async_trait::async_trait;
use multiredis_common::{Endpoint, FanoutError, Result, ServerInfo, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;

use crate::config::ConnectionOptions;
use crate::connection::{ChildConnection, ConnectionEvent, Connector};

const EVENT_CAPACITY: usize = 64;

/// Scripted reply of a [`MemoryConnection`].
#[derive(Debug, Clone)]
pub enum Reply {
    Value(Value),
    /// Backend error reply
    Error(String),
    /// Waits, then answers with the inner reply
    After(Duration, Box<Reply>),
    /// Never answers
    Hang,
    /// Panics while the command is being sent
    Panic(String),
}

impl Reply {
    pub fn value(value: impl Into<Value>) -> Self {
        Reply::Value(value.into())
    }

    pub fn error(message: impl Into<String>) -> Self {
        Reply::Error(message.into())
    }

    pub fn after(delay: Duration, reply: Reply) -> Self {
        Reply::After(delay, Box::new(reply))
    }
}

type Handler = dyn Fn(&str, &[Value]) -> Reply + Send + Sync;

/// Child connection backed by process memory.
pub struct MemoryConnection {
    name: String,
    connected: AtomicBool,
    ready: AtomicBool,
    server_info: Mutex<Option<ServerInfo>>,
    events: broadcast::Sender<ConnectionEvent>,
    handler: Option<Box<Handler>>,
    store: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    calls: AtomicUsize,
    log: Mutex<Vec<(String, Vec<Value>)>>,
}

impl MemoryConnection {
    /// Connected, ready connection serving commands from its own map.
    pub fn new(name: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            name: name.into(),
            connected: AtomicBool::new(true),
            ready: AtomicBool::new(true),
            server_info: Mutex::new(None),
            events,
            handler: None,
            store: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
            log: Mutex::new(Vec::new()),
        }
    }

    /// Connected, ready connection whose replies come from `handler`.
    pub fn scripted<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&str, &[Value]) -> Reply + Send + Sync + 'static,
    {
        Self {
            handler: Some(Box::new(handler)),
            ..Self::new(name)
        }
    }

    /// Number of commands sent to this connection.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Commands sent to this connection, in order.
    pub fn commands(&self) -> Vec<(String, Vec<Value>)> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    pub fn set_server_info(&self, info: Option<ServerInfo>) {
        *self.server_info.lock().unwrap_or_else(PoisonError::into_inner) = info;
    }

    /// Publishes an event without touching the flags.
    pub fn emit(&self, event: ConnectionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Marks the connection connected and emits `connect`.
    pub fn connect(&self) {
        self.set_connected(true);
        self.emit(ConnectionEvent::Connect);
    }

    /// Marks the connection connected and ready and emits `ready`.
    pub fn make_ready(&self) {
        self.set_connected(true);
        self.set_ready(true);
        self.emit(ConnectionEvent::Ready);
    }

    /// Marks the connection closed and emits `end`.
    pub fn disconnect(&self) {
        self.set_connected(false);
        self.set_ready(false);
        self.emit(ConnectionEvent::End);
    }

    fn serve(&self, command: &str, args: &[Value]) -> Reply {
        let mut store = self.store.lock().unwrap_or_else(PoisonError::into_inner);
        let key = || args.first().map(value_bytes);
        let value = || args.get(1).map(value_bytes);

        match command.to_ascii_lowercase().as_str() {
            "ping" => Reply::Value(Value::Status("PONG".to_string())),
            "get" => match key() {
                Some(k) => Reply::Value(store.get(&k).cloned().into()),
                None => wrong_arity(command),
            },
            "set" => match (key(), value()) {
                (Some(k), Some(v)) => {
                    store.insert(k, v);
                    Reply::Value(Value::ok())
                }
                _ => wrong_arity(command),
            },
            "setnx" => match (key(), value()) {
                (Some(k), Some(v)) => {
                    if store.contains_key(&k) {
                        Reply::Value(Value::Int(0))
                    } else {
                        store.insert(k, v);
                        Reply::Value(Value::Int(1))
                    }
                }
                _ => wrong_arity(command),
            },
            "getset" => match (key(), value()) {
                (Some(k), Some(v)) => Reply::Value(store.insert(k, v).into()),
                _ => wrong_arity(command),
            },
            "del" => {
                let removed = args
                    .iter()
                    .filter(|k| store.remove(&value_bytes(k)).is_some())
                    .count();
                Reply::Value(Value::Int(removed as i64))
            }
            "exists" => {
                let found = args
                    .iter()
                    .filter(|k| store.contains_key(&value_bytes(k)))
                    .count();
                Reply::Value(Value::Int(found as i64))
            }
            "mget" => Reply::Value(Value::Array(
                args.iter()
                    .map(|k| store.get(&value_bytes(k)).cloned().into())
                    .collect(),
            )),
            "incr" => match key() {
                Some(k) => {
                    let current = match store.get(&k) {
                        Some(bytes) => match std::str::from_utf8(bytes).ok().and_then(|s| s.parse::<i64>().ok()) {
                            Some(n) => n,
                            None => {
                                return Reply::error("ERR value is not an integer or out of range")
                            }
                        },
                        None => 0,
                    };
                    store.insert(k, (current + 1).to_string().into_bytes());
                    Reply::Value(Value::Int(current + 1))
                }
                None => wrong_arity(command),
            },
            "flushall" | "flushdb" => {
                store.clear();
                Reply::Value(Value::ok())
            }
            "publish" => Reply::Value(Value::Int(0)),
            _ => Reply::error(format!("ERR unknown command '{}'", command)),
        }
    }
}

fn wrong_arity(command: &str) -> Reply {
    Reply::error(format!("ERR wrong number of arguments for '{}' command", command))
}

fn value_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::Bulk(bytes) => bytes.clone(),
        other => match other.as_str() {
            Some(s) => s.as_bytes().to_vec(),
            None => other.to_string().into_bytes(),
        },
    }
}

#[async_trait]
impl ChildConnection for MemoryConnection {
    fn name(&self) -> String {
        self.name.clone()
    }

    async fn send_command(&self, command: &str, args: &[Value]) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((command.to_string(), args.to_vec()));

        if !self.is_connected() {
            return Err(FanoutError::Connection(format!(
                "{} is closed, command {} not sent",
                self.name, command
            )));
        }

        let mut reply = match &self.handler {
            Some(handler) => handler(command, args),
            None => self.serve(command, args),
        };

        loop {
            match reply {
                Reply::Value(value) => return Ok(value),
                Reply::Error(message) => return Err(FanoutError::Backend(message)),
                Reply::After(delay, next) => {
                    tokio::time::sleep(delay).await;
                    reply = *next;
                }
                Reply::Hang => futures::future::pending::<()>().await,
                Reply::Panic(message) => panic!("{}", message),
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    fn server_info(&self) -> Option<ServerInfo> {
        self.server_info
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }
}

/// Connector creating one [`MemoryConnection`] per endpoint.
///
/// Keeps every connection it created, together with the options it was
/// given, so callers can drive and inspect them.
#[derive(Default)]
pub struct MemoryConnector {
    created: Mutex<Vec<(Arc<MemoryConnection>, ConnectionOptions)>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connections(&self) -> Vec<Arc<MemoryConnection>> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(connection, _)| connection.clone())
            .collect()
    }

    /// Options handed to each created connection, in creation order.
    pub fn options(&self) -> Vec<ConnectionOptions> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, options)| options.clone())
            .collect()
    }
}

impl Connector for MemoryConnector {
    fn connect(
        &self,
        endpoint: &Endpoint,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn ChildConnection>> {
        let connection = Arc::new(MemoryConnection::new(endpoint.to_string()));
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((connection.clone(), options.clone()));
        Ok(connection)
    }
}
