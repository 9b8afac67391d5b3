//! Workflow runtime: turn-taking between agents, tool dispatch and hand-off.

pub mod executor;
pub mod schema;

pub use executor::{Workflow, WorkflowHandler, DEFAULT_MAX_STEPS};
pub use schema::*;
