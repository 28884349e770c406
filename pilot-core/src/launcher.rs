//! Interactive launcher capability
//!
//! Edit and status views need a real terminal. Which terminal, and how it is
//! started, is platform policy that lives outside the engine.

use async_trait::async_trait;

use crate::command::InteractiveRequest;
use crate::error::LauncherError;

#[async_trait]
pub trait InteractiveLauncher: Send + Sync {
    /// Start `request` in an interactive session. Returns once the session
    /// has been spawned, not when it ends.
    async fn launch(&self, request: &InteractiveRequest) -> Result<(), LauncherError>;
}

/// Launcher for environments without any terminal (headless tests, CI)
#[derive(Clone, Debug, Default)]
pub struct NoLauncher;

#[async_trait]
impl InteractiveLauncher for NoLauncher {
    async fn launch(&self, _request: &InteractiveRequest) -> Result<(), LauncherError> {
        Err(LauncherError::NoTerminal { tried: Vec::new() })
    }
}
