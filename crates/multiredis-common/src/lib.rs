//! multiredis Common Types
//!
//! Shared definitions for the multiredis fan-out client:
//!
//! - [`protocol`] - reply [`Value`]s, the [`CommandTable`] with its read/write
//!   classification, and the [`FanoutError`] taxonomy
//! - [`endpoint`] - backend [`Endpoint`] descriptors and their deduplication
//! - [`server_info`] - the opaque [`ServerInfo`] snapshot copied from backends
//!
//! # Example
//!
//! ```
//! use multiredis_common::{CommandKind, CommandTable, Value};
//!
//! let table = CommandTable::builtin();
//! assert_eq!(table.kind("hget"), Some(CommandKind::Read));
//! assert_eq!(table.kind("SET"), Some(CommandKind::Write));
//!
//! let reply = Value::from("my value");
//! assert!(!reply.is_empty());
//! ```

pub mod endpoint;
pub mod protocol;
pub mod server_info;

pub use endpoint::{unique_endpoints, Endpoint, DEFAULT_PORT};
pub use protocol::*;
pub use server_info::ServerInfo;
