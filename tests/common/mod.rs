//! Common test utilities and helpers
//!
//! - Scripted in-process backend (`ScriptedRemote`)
//! - `AppContext` builders wired to the scripted backend
//! - Status waiting helpers

pub mod fixtures;

pub use fixtures::*;
pub use scripted_remote::*;
