//! The fan-out client: one command surface over many child connections.
//!
//! Commands go through the [`Dispatcher`](crate::dispatcher::Dispatcher);
//! child lifecycle events are re-emitted as [`FanoutEvent`]s and keep the
//! aggregate state current.

use multiredis_common::{CommandTable, FanoutError, Result, ServerInfo, Value};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::runtime::Handle;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::FanoutConfig;
use crate::connection::{ChildConnection, ConnectionEvent, Connector, StateTrigger};
use crate::dispatcher::Dispatcher;
use crate::resolver::{resolve, Target};
use crate::state::{ConnectionState, StateTracker};

const EVENT_CAPACITY: usize = 256;

/// Event published on the fan-out client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanoutEvent {
    /// An event re-emitted from the child at `index`
    Child { index: usize, event: ConnectionEvent },
    /// Every child is connected and ready
    AllReady,
}

impl FanoutEvent {
    pub fn name(&self) -> &'static str {
        match self {
            FanoutEvent::Child { event, .. } => event.name(),
            FanoutEvent::AllReady => "all-ready",
        }
    }
}

struct Inner {
    children: Vec<Arc<dyn ChildConnection>>,
    config: FanoutConfig,
    dispatcher: Dispatcher,
    state: Arc<StateTracker>,
    events: broadcast::Sender<FanoutEvent>,
    runtime: Handle,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        for forwarder in self
            .forwarders
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            forwarder.abort();
        }
    }
}

/// One logical client over a fixed set of backend connections.
///
/// Cloning is cheap; clones share the children, the state and the event
/// channel. The event fan-in tasks stop when the last clone is dropped.
///
/// # Example
///
/// ```rust
/// use multiredis_client::{FanoutClient, FanoutConfig, MemoryConnector};
/// use multiredis_common::{Endpoint, Value};
///
/// # #[tokio::main]
/// # async fn main() -> multiredis_common::Result<()> {
/// let connector = MemoryConnector::new();
/// let client = FanoutClient::with_connector(
///     vec![Endpoint::new("10.0.0.1", 6379), Endpoint::new("10.0.0.2", 6379)],
///     FanoutConfig::default(),
///     &connector,
/// )?;
///
/// client.set("key", "value").await?;
/// assert_eq!(client.get("key").await?, Value::from("value"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct FanoutClient {
    inner: Arc<Inner>,
}

impl FanoutClient {
    /// Creates a client over pre-built connections.
    ///
    /// # Errors
    ///
    /// - `NoTargets` for an empty target
    /// - `InvalidConfig` for endpoint descriptors, which need [`Self::with_connector`]
    /// - `NoRuntime` when called outside a tokio runtime
    pub fn new(target: impl Into<Target>, config: FanoutConfig) -> Result<Self> {
        Self::build(target.into(), config, None, CommandTable::builtin())
    }

    /// Creates a client, building one connection per endpoint with `connector`.
    pub fn with_connector(
        target: impl Into<Target>,
        config: FanoutConfig,
        connector: &dyn Connector,
    ) -> Result<Self> {
        Self::build(target.into(), config, Some(connector), CommandTable::builtin())
    }

    /// Creates a client over pre-built connections that exposes `table`
    /// instead of the built-in command list.
    pub fn with_command_table(
        target: impl Into<Target>,
        config: FanoutConfig,
        table: CommandTable,
    ) -> Result<Self> {
        Self::build(target.into(), config, None, table)
    }

    fn build(
        target: Target,
        config: FanoutConfig,
        connector: Option<&dyn Connector>,
        table: CommandTable,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| FanoutError::NoRuntime)?;
        let children = resolve(target, &config, connector)?;

        let state = Arc::new(StateTracker::new(children.clone()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        // Subscribe before spawning so no event emitted after construction is missed.
        let forwarders = children
            .iter()
            .enumerate()
            .map(|(index, child)| {
                runtime.spawn(forward_events(
                    index,
                    child.subscribe(),
                    Arc::clone(&state),
                    events.clone(),
                ))
            })
            .collect();

        let dispatcher = Dispatcher::new(
            children.clone(),
            table,
            config.child_timeout(),
            config.force_parallel,
        );

        info!(
            "Fan-out client over {} children (timeout {:?}, force_parallel {})",
            children.len(),
            config.child_timeout(),
            config.force_parallel
        );

        Ok(Self {
            inner: Arc::new(Inner {
                children,
                config,
                dispatcher,
                state,
                events,
                runtime,
                forwarders: Mutex::new(forwarders),
            }),
        })
    }

    /// Runs `command` on the children and returns the merged result.
    ///
    /// # Errors
    ///
    /// - `UnknownCommand` if the command is not supported
    /// - The last child error (including a timeout) when no child produced
    ///   a qualifying value
    pub async fn command<I, V>(&self, command: &str, args: I) -> Result<Value>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let args = args.into_iter().map(Into::into).collect();
        self.inner.dispatcher.dispatch(command, args).await
    }

    /// Runs `command` in the background and hands the result to `callback`.
    ///
    /// The callback runs exactly once, also for unknown commands.
    pub fn command_with_callback<I, V, F>(&self, command: &str, args: I, callback: F) -> JoinHandle<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
        F: FnOnce(Result<Value>) + Send + 'static,
    {
        let client = self.clone();
        let command = command.to_string();
        let args: Vec<Value> = args.into_iter().map(Into::into).collect();
        self.inner.runtime.spawn(async move {
            let result = client.inner.dispatcher.dispatch(&command, args).await;
            callback(result);
        })
    }

    /// Runs `command` in the background and drops the result.
    pub fn command_detached<I, V>(&self, command: &str, args: I) -> JoinHandle<()>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.command_with_callback(command, args, {
            let command = command.to_string();
            move |result| {
                if let Err(e) = result {
                    debug!("Detached {} failed: {}", command, e);
                }
            }
        })
    }

    async fn call(&self, command: &str, args: Vec<Value>) -> Result<Value> {
        self.inner.dispatcher.dispatch(command, args).await
    }

    pub async fn get(&self, key: impl Into<Value>) -> Result<Value> {
        self.call("get", vec![key.into()]).await
    }

    pub async fn set(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<Value> {
        self.call("set", vec![key.into(), value.into()]).await
    }

    /// Sets `key` on every child where it is absent.
    ///
    /// The first child's reply is the result, so `0` means the key already
    /// existed on the first child.
    pub async fn setnx(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<Value> {
        self.call("setnx", vec![key.into(), value.into()]).await
    }

    pub async fn getset(&self, key: impl Into<Value>, value: impl Into<Value>) -> Result<Value> {
        self.call("getset", vec![key.into(), value.into()]).await
    }

    pub async fn del<I, V>(&self, keys: I) -> Result<Value>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.command("del", keys).await
    }

    pub async fn exists<I, V>(&self, keys: I) -> Result<Value>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.command("exists", keys).await
    }

    pub async fn incr(&self, key: impl Into<Value>) -> Result<Value> {
        self.call("incr", vec![key.into()]).await
    }

    pub async fn expire(&self, key: impl Into<Value>, seconds: i64) -> Result<Value> {
        self.call("expire", vec![key.into(), Value::Int(seconds)]).await
    }

    pub async fn mget<I, V>(&self, keys: I) -> Result<Value>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.command("mget", keys).await
    }

    pub async fn hget(&self, key: impl Into<Value>, field: impl Into<Value>) -> Result<Value> {
        self.call("hget", vec![key.into(), field.into()]).await
    }

    pub async fn hset(
        &self,
        key: impl Into<Value>,
        field: impl Into<Value>,
        value: impl Into<Value>,
    ) -> Result<Value> {
        self.call("hset", vec![key.into(), field.into(), value.into()]).await
    }

    pub async fn publish(&self, channel: impl Into<Value>, message: impl Into<Value>) -> Result<Value> {
        self.call("publish", vec![channel.into(), message.into()]).await
    }

    pub async fn ping(&self) -> Result<Value> {
        self.call("ping", Vec::new()).await
    }

    /// Supported command names, sorted.
    pub fn commands(&self) -> Vec<String> {
        self.inner.dispatcher.table().names()
    }

    /// The fixed child list, in dispatch order.
    pub fn children(&self) -> &[Arc<dyn ChildConnection>] {
        &self.inner.children
    }

    pub fn config(&self) -> &FanoutConfig {
        &self.inner.config
    }

    /// True if at least one child is connected.
    pub fn connected(&self) -> bool {
        self.inner.state.connected()
    }

    /// True if every child is connected.
    pub fn all_connected(&self) -> bool {
        self.inner.state.all_connected()
    }

    /// Server info of the first connected child at the last recompute.
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.inner.state.server_info()
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.state.state()
    }

    /// Watches the aggregate connection state.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Subscribes to child events and `all-ready`.
    pub fn subscribe(&self) -> broadcast::Receiver<FanoutEvent> {
        self.inner.events.subscribe()
    }

    /// Recomputes the aggregate state from the children's current flags.
    ///
    /// With `ready_event` set this behaves like a child `ready` event and
    /// may publish [`FanoutEvent::AllReady`].
    pub fn recompute_state(&self, ready_event: bool) {
        if self.inner.state.recompute(ready_event) {
            let _ = self.inner.events.send(FanoutEvent::AllReady);
        }
    }

    /// Waits until every child is connected.
    ///
    /// Returns immediately when that is already the case.
    pub async fn wait_all_connected(&self) {
        let mut changes = self.state_changes();
        // The sender lives as long as this client.
        let _ = changes.wait_for(|state| state.all_connected).await;
    }

    /// Waits for the next [`FanoutEvent::AllReady`].
    ///
    /// Returns immediately when every child is already connected and ready.
    pub async fn wait_all_ready(&self) {
        let mut events = self.subscribe();
        if self
            .inner
            .children
            .iter()
            .all(|child| child.is_connected() && child.is_ready())
        {
            return;
        }
        loop {
            match events.recv().await {
                Ok(FanoutEvent::AllReady) => return,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return,
            }
        }
    }
}

/// Re-emits one child's events on the client and keeps the state current.
async fn forward_events(
    index: usize,
    mut child_events: broadcast::Receiver<ConnectionEvent>,
    state: Arc<StateTracker>,
    events: broadcast::Sender<FanoutEvent>,
) {
    loop {
        match child_events.recv().await {
            Ok(event) => {
                let all_ready = match event.state_trigger() {
                    StateTrigger::Ready => state.recompute(true),
                    StateTrigger::Recompute => state.recompute(false),
                    StateTrigger::None => false,
                };

                // Nobody listening is fine.
                let _ = events.send(FanoutEvent::Child { index, event });
                if all_ready {
                    let _ = events.send(FanoutEvent::AllReady);
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Missed {} events from child {}", skipped, index);
                state.recompute(false);
            }
            Err(RecvError::Closed) => {
                debug!("Event stream of child {} closed", index);
                break;
            }
        }
    }
}
