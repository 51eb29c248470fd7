//! Command dispatch
//!
//! [`CommandDispatcher`] turns a `(name, arguments)` pair into one exchange
//! over the file channel, expanding `execute_macro` into a run of exchanges.
//! [`DispatcherHandle`] puts a queue in front of it so concurrent callers are
//! served strictly one at a time.

mod config;
mod dispatcher;
mod error;
mod handle;
mod macros;
mod result;

pub use config::DispatcherConfig;
pub use dispatcher::{CommandDispatcher, DispatchPhase};
pub use error::{DispatchError, ErrorKind};
pub use handle::{DispatchRequest, DispatchResponse, DispatcherHandle, ToolInvoker};
pub use macros::{MACRO_TOOL, MacroCommand, MacroGuard, MacroStep};
pub use result::{DispatchResult, render_remote_error};
