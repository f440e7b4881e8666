pub mod commands;
pub mod error;
pub mod value;


pub use commands::{CommandKind, CommandTable, COMMANDS, READ_MODIFY_COMMANDS};
pub use error::{FanoutError, Result};
pub use value::Value;
