// ABOUTME: Library root for relevo - exposes public types for testing.
// ABOUTME: The main binary is in main.rs.

pub mod commands;
pub mod config;
pub mod diagnostics;
pub mod docker;
pub mod election;
pub mod entity;
pub mod error;
pub mod exec;
pub mod invocation;
pub mod options;
pub mod output;
pub mod ssh;
pub mod types;
