//! Shared browser session and per-test isolated contexts and pages
//!
//! One [`BrowserSession`] lives for the whole test session; each test gets
//! a fresh [`IsolatedContext`] and [`IsolatedPage`] and tears them down
//! immediately after, regardless of outcome. Close is best-effort: each
//! component tolerates the one error kind expected during ordinary
//! interleaved shutdown and reports everything else.

use std::fmt;

use tracing::debug;

use crate::driver::{
    BrowserDriver, BrowserHandle, ContextHandle, DriverError, LaunchOptions, PageHandle,
};
use crate::error::{CloseOutcome, HarnessError, HarnessResult};

/// Handle to the single long-lived browser process of a test session.
pub struct BrowserSession {
    handle: Box<dyn BrowserHandle>,
    closed: bool,
}

impl fmt::Debug for BrowserSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrowserSession")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl BrowserSession {
    /// Launch the shared browser process. A process that cannot be spawned
    /// is fatal for the session.
    pub async fn launch(
        driver: &dyn BrowserDriver,
        options: &LaunchOptions,
    ) -> HarnessResult<Self> {
        let handle = driver.launch(options).await.map_err(|e| match e {
            DriverError::Spawn(msg) => HarnessError::Launch(msg),
            other => HarnessError::Driver(other),
        })?;
        Ok(Self {
            handle,
            closed: false,
        })
    }

    /// Create a browsing context isolated from every other context under
    /// this session. Requires the session to still be running.
    pub async fn create_context(&mut self) -> HarnessResult<IsolatedContext> {
        self.ensure_open("browser session")?;
        let handle = self.handle.new_context().await?;
        Ok(IsolatedContext {
            handle,
            closed: false,
        })
    }

    /// Best-effort close. A control channel that was already severed (the
    /// session may simply be exiting) is tolerated; the transition to
    /// closed completes either way.
    pub async fn close(&mut self) -> HarnessResult<CloseOutcome> {
        self.ensure_open("browser session")?;
        self.closed = true;
        match self.handle.close().await {
            Ok(()) => Ok(CloseOutcome::Clean),
            Err(e @ DriverError::ConnectionClosed) => {
                debug!("browser connection already dropped during close");
                Ok(CloseOutcome::Tolerated(e))
            }
            Err(e) => Err(HarnessError::Teardown {
                resource: "browser session",
                source: e,
            }),
        }
    }

    fn ensure_open(&self, what: &'static str) -> HarnessResult<()> {
        if self.closed {
            Err(HarnessError::InvalidState(what))
        } else {
            Ok(())
        }
    }
}

/// A sandboxed browsing context scoped to one test.
pub struct IsolatedContext {
    handle: Box<dyn ContextHandle>,
    closed: bool,
}

impl fmt::Debug for IsolatedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolatedContext")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl IsolatedContext {
    /// Open a page in this context. Requires the context to be active.
    pub async fn create_page(&mut self) -> HarnessResult<IsolatedPage> {
        if self.closed {
            return Err(HarnessError::InvalidState("isolated context"));
        }
        let handle = self.handle.new_page().await?;
        Ok(IsolatedPage {
            handle,
            closed: false,
        })
    }

    /// Best-effort close; tolerates a connection the session already
    /// dropped.
    pub async fn close(&mut self) -> HarnessResult<CloseOutcome> {
        if self.closed {
            return Err(HarnessError::InvalidState("isolated context"));
        }
        self.closed = true;
        match self.handle.close().await {
            Ok(()) => Ok(CloseOutcome::Clean),
            Err(e @ DriverError::ConnectionClosed) => {
                debug!("context connection already dropped during close");
                Ok(CloseOutcome::Tolerated(e))
            }
            Err(e) => Err(HarnessError::Teardown {
                resource: "isolated context",
                source: e,
            }),
        }
    }
}

/// A single page/tab scoped to one test.
pub struct IsolatedPage {
    handle: Box<dyn PageHandle>,
    closed: bool,
}

impl fmt::Debug for IsolatedPage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IsolatedPage")
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}

impl IsolatedPage {
    pub async fn goto(&mut self, url: &str) -> HarnessResult<()> {
        self.ensure_open()?;
        Ok(self.handle.goto(url).await?)
    }

    pub async fn content(&mut self) -> HarnessResult<String> {
        self.ensure_open()?;
        Ok(self.handle.content().await?)
    }

    /// Best-effort close; tolerates page-level errors only. A severed
    /// browser connection is still reportable here.
    pub async fn close(&mut self) -> HarnessResult<CloseOutcome> {
        self.ensure_open()?;
        self.closed = true;
        match self.handle.close().await {
            Ok(()) => Ok(CloseOutcome::Clean),
            Err(e @ DriverError::Page(_)) => {
                debug!("page-level error during close");
                Ok(CloseOutcome::Tolerated(e))
            }
            Err(e) => Err(HarnessError::Teardown {
                resource: "isolated page",
                source: e,
            }),
        }
    }

    fn ensure_open(&self) -> HarnessResult<()> {
        if self.closed {
            Err(HarnessError::InvalidState("isolated page"))
        } else {
            Ok(())
        }
    }
}
