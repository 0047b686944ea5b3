//! Integration tests against the scripted backend

pub mod auth_test;
pub mod sync_cycle_test;
