// ABOUTME: SSH transport for remote command execution.
// ABOUTME: Session management and command execution over russh.

mod client;
mod error;

pub use client::{CommandOutput, Session, SessionConfig};
pub use error::{Error, Result};
