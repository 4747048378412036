//! Session-scoped composition and synchronous wrappers
//!
//! Test-framework fixture setup and teardown is synchronous, so the
//! session owns the single current-thread runtime and every wrapper here
//! blocks the caller until the wrapped async operation fully settles. The
//! runtime is only driven while a wrapper call is in flight, which is when
//! the variant listeners and the browser driver do their work.
//!
//! [`TestSession`] is constructed once per test session and passed by
//! reference into every per-test setup routine; nothing here relies on
//! ambient global state.

use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};

use axum::Router;
use tokio::runtime::Runtime;
use tracing::{info, warn};

use crate::browser::{BrowserSession, IsolatedContext, IsolatedPage};
use crate::driver::{BrowserDriver, LaunchOptions};
use crate::error::{CloseOutcome, HarnessError, HarnessResult};
use crate::golden::GoldenDirs;
use crate::playwright::PlaywrightDriver;
use crate::server::{ServerVariants, TlsMaterial, VariantOptions};

/// Session construction inputs.
pub struct SessionConfig {
    /// Port for the plain variant; `None` asks the OS for a free port at
    /// session start.
    pub base_port: Option<u16>,
    pub tls: TlsMaterial,
    pub launch: LaunchOptions,
    pub golden: GoldenDirs,
    pub driver: Box<dyn BrowserDriver>,
}

impl SessionConfig {
    pub fn new(tls: TlsMaterial, golden: GoldenDirs) -> Self {
        Self {
            base_port: None,
            tls,
            launch: LaunchOptions::default(),
            golden,
            driver: Box::new(PlaywrightDriver::new()),
        }
    }
}

/// Everything a test session shares: the variant server tree, the golden
/// directories, and the lazily launched browser.
pub struct TestSession {
    runtime: Runtime,
    server: ServerVariants,
    golden: GoldenDirs,
    launch: LaunchOptions,
    driver: Box<dyn BrowserDriver>,
    browser: Option<BrowserSession>,
}

impl TestSession {
    /// Bring up the variant tree; listeners are bound and serving when this
    /// returns. The browser launches lazily on first use.
    pub fn bootstrap(app: Router, config: SessionConfig) -> HarnessResult<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;

        let base_port = match config.base_port {
            Some(port) => port,
            None => free_port()?,
        };
        let opts = VariantOptions::new(base_port, config.tls);
        let server = runtime.block_on(ServerVariants::bind(app, opts))?;

        Ok(Self {
            runtime,
            server,
            golden: config.golden,
            launch: config.launch,
            driver: config.driver,
            browser: None,
        })
    }

    pub fn server(&self) -> &ServerVariants {
        &self.server
    }

    pub fn golden(&self) -> &GoldenDirs {
        &self.golden
    }

    /// The shared browser session, launched on first use.
    pub fn browser(&mut self) -> HarnessResult<&mut BrowserSession> {
        self.ensure_browser()?;
        self.browser
            .as_mut()
            .ok_or(HarnessError::InvalidState("browser session"))
    }

    /// Whether the shared browser has been launched yet.
    pub fn browser_launched(&self) -> bool {
        self.browser.is_some()
    }

    fn ensure_browser(&mut self) -> HarnessResult<()> {
        if self.browser.is_some() {
            return Ok(());
        }
        info!("launching shared {} browser", self.launch.engine.as_str());
        let session = self
            .runtime
            .block_on(BrowserSession::launch(self.driver.as_ref(), &self.launch))?;
        self.browser = Some(session);
        Ok(())
    }

    /// Blocking wrapper: create a per-test isolated context.
    pub fn create_context(&mut self) -> HarnessResult<IsolatedContext> {
        self.ensure_browser()?;
        let Self {
            runtime, browser, ..
        } = self;
        let browser = browser
            .as_mut()
            .ok_or(HarnessError::InvalidState("browser session"))?;
        runtime.block_on(browser.create_context())
    }

    /// Blocking wrapper: open a page in `context`.
    pub fn create_page(&self, context: &mut IsolatedContext) -> HarnessResult<IsolatedPage> {
        self.runtime.block_on(context.create_page())
    }

    /// Blocking wrapper: close a context.
    pub fn close_context(&self, context: &mut IsolatedContext) -> HarnessResult<CloseOutcome> {
        self.runtime.block_on(context.close())
    }

    /// Blocking wrapper: close a page.
    pub fn close_page(&self, page: &mut IsolatedPage) -> HarnessResult<CloseOutcome> {
        self.runtime.block_on(page.close())
    }

    /// Blocking wrapper: navigate a page.
    pub fn goto(&self, page: &mut IsolatedPage, url: &str) -> HarnessResult<()> {
        self.runtime.block_on(page.goto(url))
    }

    /// Scoped acquisition: create a context, run `body`, release the
    /// context on every exit path including a panic in the body. Tolerated
    /// close errors are logged and swallowed; reportable ones surface as a
    /// teardown failure distinct from the body's own outcome. The body
    /// receives the session back by shared reference for URL computation
    /// and the blocking page wrappers.
    pub fn with_context<T>(
        &mut self,
        body: impl FnOnce(&TestSession, &mut IsolatedContext) -> T,
    ) -> HarnessResult<T> {
        let mut context = self.create_context()?;
        let outcome = {
            let session: &TestSession = self;
            catch_unwind(AssertUnwindSafe(|| body(session, &mut context)))
        };
        let closed = self.runtime.block_on(context.close());

        match outcome {
            Ok(value) => {
                surface(closed, "isolated context")?;
                Ok(value)
            }
            Err(panic) => {
                // the body's own failure takes precedence over teardown noise
                log_close(closed, "isolated context");
                resume_unwind(panic)
            }
        }
    }

    /// Scoped acquisition of a context and a page. The page is created only
    /// after its context is active and torn down before it, on every exit
    /// path.
    pub fn with_page<T>(
        &mut self,
        body: impl FnOnce(&TestSession, &mut IsolatedPage) -> T,
    ) -> HarnessResult<T> {
        let mut context = self.create_context()?;
        let mut page = match self.runtime.block_on(context.create_page()) {
            Ok(page) => page,
            Err(e) => {
                log_close(self.runtime.block_on(context.close()), "isolated context");
                return Err(e);
            }
        };

        let outcome = {
            let session: &TestSession = self;
            catch_unwind(AssertUnwindSafe(|| body(session, &mut page)))
        };

        let page_closed = self.runtime.block_on(page.close());
        let context_closed = self.runtime.block_on(context.close());

        match outcome {
            Ok(value) => {
                surface(page_closed, "isolated page")?;
                surface(context_closed, "isolated context")?;
                Ok(value)
            }
            Err(panic) => {
                log_close(page_closed, "isolated page");
                log_close(context_closed, "isolated context");
                resume_unwind(panic)
            }
        }
    }

    /// Tear the session down: best-effort browser close, then the variant
    /// tree, children's listeners first. Servers stop even when the browser
    /// close was reportable.
    pub fn shutdown(mut self) -> HarnessResult<()> {
        let mut first_error = None;
        if let Some(mut browser) = self.browser.take() {
            match self.runtime.block_on(browser.close()) {
                Ok(CloseOutcome::Clean) => {}
                Ok(CloseOutcome::Tolerated(e)) => {
                    warn!("browser close tolerated: {}", e);
                }
                Err(e) => first_error = Some(e),
            }
        }
        self.runtime.block_on(self.server.stop_all());
        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }
}

fn surface(closed: HarnessResult<CloseOutcome>, what: &'static str) -> HarnessResult<()> {
    match closed {
        Ok(CloseOutcome::Clean) => Ok(()),
        Ok(CloseOutcome::Tolerated(e)) => {
            warn!("{} close tolerated: {}", what, e);
            Ok(())
        }
        Err(e) => Err(e),
    }
}

fn log_close(closed: HarnessResult<CloseOutcome>, what: &'static str) {
    match closed {
        Ok(CloseOutcome::Clean) => {}
        Ok(CloseOutcome::Tolerated(e)) => warn!("{} close tolerated: {}", what, e),
        Err(e) => warn!("{} close failed during unwinding: {}", what, e),
    }
}

/// Ask the OS for a free port at session start.
fn free_port() -> HarnessResult<u16> {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0))?;
    Ok(listener.local_addr()?.port())
}
