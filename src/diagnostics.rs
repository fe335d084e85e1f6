// ABOUTME: Diagnostics accumulator for non-fatal warnings during deployment.
// ABOUTME: Collects warnings that shouldn't fail a deployment but should be shown to users.

use parking_lot::Mutex;
use std::sync::Arc;

/// Collects non-fatal warnings during deployment operations.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Shared warning collector handed to every layer working on one host.
/// Clones record into the same report.
#[derive(Clone, Default)]
pub struct DiagnosticsSink(Arc<Mutex<Diagnostics>>);

impl DiagnosticsSink {
    pub fn warn(&self, warning: Warning) {
        self.0.lock().warn(warning);
    }

    /// Drain everything collected so far.
    pub fn take(&self) -> Diagnostics {
        std::mem::take(&mut *self.0.lock())
    }
}

/// A non-fatal warning collected during deployment.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// Create a cleanup warning (leftover backup or image removal failed).
    pub fn cleanup(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::Cleanup,
            message: message.into(),
        }
    }

    /// Create an SSH disconnect warning.
    pub fn ssh_disconnect(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::SshDisconnect,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Failed to remove a superseded backup or image.
    Cleanup,
    /// Failed to cleanly disconnect SSH session.
    SshDisconnect,
}
