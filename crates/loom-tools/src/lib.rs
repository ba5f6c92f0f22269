//! # loom-tools
//!
//! The tool interface and result contract the turn loop executes against.
//!
//! Concrete tools (file edit, search, shell, browser, HTTP) are external
//! collaborators and not implemented here — only the [`LoomTool`] trait,
//! the [`ToolRegistry`] the runtime dispatches through, and the
//! subagent-spawning contract [`SubagentSpawner`] that `SpawnSubagent`-style
//! tools and the orchestrator's subagent tracker share.

#![deny(unsafe_code)]

pub mod errors;
pub mod registry;
pub mod traits;

pub use errors::ToolError;
pub use registry::ToolRegistry;
pub use traits::{
    LoomTool, SubagentConfig, SubagentHandle, SubagentMode, SubagentResult, SubagentSpawner,
    ToolContext, WaitMode,
};
