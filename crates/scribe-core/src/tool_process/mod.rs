//! Auxiliary tool processes: launch specs, owned handles, stdio transport.

pub mod error;
pub mod handle;
pub mod spec;
pub mod stdio;

pub use error::{ToolProcessError, ToolResult};
pub use handle::{ToolChannel, ToolLauncher, ToolProcessHandle, ToolSet, ToolStatus, ToolSummary};
pub use spec::{ToolKind, ToolProcessSpec};
pub use stdio::{StdioChannel, StdioLauncher};
