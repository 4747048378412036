//! Browser driver seam
//!
//! The harness manages resource lifecycle on top of opaque handles; the
//! concrete automation backend lives behind these traits so the lifecycle
//! layer works the same against the shipped Playwright driver or an
//! in-process fake.

use async_trait::async_trait;
use thiserror::Error;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// Errors surfaced by a browser driver.
///
/// The lifecycle layer keys its tolerated-teardown decisions off the
/// variants here: `ConnectionClosed` is tolerated when closing sessions and
/// contexts, `Page` when closing pages. Everything else is reportable.
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("browser process failed to spawn: {0}")]
    Spawn(String),

    #[error("connection to the browser is closed")]
    ConnectionClosed,

    #[error("page error: {0}")]
    Page(String),

    #[error("driver protocol error: {0}")]
    Protocol(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Browser engine family selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EngineFamily {
    #[default]
    Chromium,
    Firefox,
}

impl EngineFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineFamily::Chromium => "chromium",
            EngineFamily::Firefox => "firefox",
        }
    }
}

/// Launch configuration for the shared browser process.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub engine: EngineFamily,
    pub args: Vec<String>,
    pub headless: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            engine: EngineFamily::default(),
            // Sandboxing is disabled so the shared browser launches inside
            // containers and CI runners.
            args: vec!["--no-sandbox".to_string()],
            headless: true,
        }
    }
}

/// Launches browser processes.
#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(&self, options: &LaunchOptions) -> DriverResult<Box<dyn BrowserHandle>>;
}

/// A launched browser process.
#[async_trait]
pub trait BrowserHandle: Send {
    /// Create a browsing context with storage and cookies isolated from
    /// every other context under this browser.
    async fn new_context(&mut self) -> DriverResult<Box<dyn ContextHandle>>;

    async fn close(&mut self) -> DriverResult<()>;
}

/// An isolated browsing context.
#[async_trait]
pub trait ContextHandle: Send {
    async fn new_page(&mut self) -> DriverResult<Box<dyn PageHandle>>;

    async fn close(&mut self) -> DriverResult<()>;
}

/// A single page/tab.
#[async_trait]
pub trait PageHandle: Send {
    async fn goto(&mut self, url: &str) -> DriverResult<()>;

    async fn content(&mut self) -> DriverResult<String>;

    async fn close(&mut self) -> DriverResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_launch_options_disable_sandbox() {
        let options = LaunchOptions::default();
        assert_eq!(options.engine, EngineFamily::Chromium);
        assert!(options.args.iter().any(|a| a == "--no-sandbox"));
        assert!(options.headless);
    }
}
