//! Tool contract and catalog for Taskweave.
//!
//! This crate defines the interface every callable capability implements and
//! the registry that maps tool names to implementations plus metadata.  The
//! registry is built once at process start and read by the planner (to prime
//! plan generation) and the executor (to invoke steps).
//!
//! ## Modules
//!
//! - [`traits`] -- the [`Tool`] trait, invocation context, and outcome types.
//! - [`registry`] -- the concurrent tool catalog and its lookup helpers.
//! - [`error`] -- tool error types.

pub mod error;
pub mod registry;
pub mod traits;

// Re-export the most commonly used types at the crate root.
pub use error::{Result, ToolError};
pub use registry::{ToolFilter, ToolRegistry};
pub use traits::{
    ActionKind, Scope, Tool, ToolCategory, ToolContext, ToolMetadata, ToolOutcome,
};
