//! multiredis Fan-out Client
//!
//! Presents a fixed set of backend key-value connections as one client.
//! Every command is sent to the children and the replies are merged into
//! one result:
//!
//! - **Reads** (`get`-like commands) settle on the first non-empty reply; a
//!   backend with no data never blocks the others
//! - **Writes** reach every child; the first successful reply is the result
//! - A child that errors, panics or does not answer within the configured
//!   timeout only matters when no other child produced a usable reply
//!
//! The client also folds the children's lifecycle events into an aggregate
//! `connected` / `all_connected` state and re-emits them, together with an
//! `all-ready` event once every child is connected and ready.
//!
//! # Components
//!
//! - [`connection`] - the [`ChildConnection`] seam and its events
//! - [`resolver`] - turns connections or endpoints into the child list
//! - [`state`] - aggregate connection state
//! - [`dispatcher`] - scheduling and merging of one command call
//! - [`invocation`] - per-child timeout and single-delivery guard
//! - [`memory`] - in-process children for tests and benchmarks

pub mod client;
pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod invocation;
pub mod memory;
pub mod resolver;
pub mod state;

pub use client::{FanoutClient, FanoutEvent};
pub use config::{ConnectionOptions, FanoutConfig, DEFAULT_CHILD_TIMEOUT_MS};
pub use connection::{ChildConnection, ConnectionEvent, Connector, StateTrigger, PROXIED_EVENTS};
pub use dispatcher::{Dispatcher, Plan, Schedule};
pub use invocation::{ChildOutcome, Execution, Invocation};
pub use memory::{MemoryConnection, MemoryConnector, Reply};
pub use resolver::{resolve, Target};
pub use state::{ConnectionPhase, ConnectionState, StateTracker};
