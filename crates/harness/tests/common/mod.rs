//! Shared fixtures for the integration tests: a fake in-process browser
//! driver, a tiny backing application with observable state, self-signed
//! certificate material, and port helpers.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Html;
use axum::routing::get;
use axum::Router;

use webstage_harness::driver::{
    BrowserDriver, BrowserHandle, ContextHandle, DriverError, DriverResult, LaunchOptions,
    PageHandle,
};
use webstage_harness::TlsMaterial;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_test_writer()
        .try_init();
}

/// A backing application with a shared hit counter, so tests can observe
/// that every variant serves the identical application state.
pub fn test_app() -> (Router, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let app = Router::new()
        .route("/", get(|| async { "ok" }))
        .route(
            "/empty.html",
            get(|| async { Html("<!DOCTYPE html><html><head></head><body></body></html>") }),
        )
        .route(
            "/hits",
            get(move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    n.to_string()
                }
            }),
        );
    (app, hits)
}

/// Find a base port whose successor is also free, since the https variant
/// listens on `base + 1`.
pub fn free_port_pair() -> u16 {
    for _ in 0..32 {
        let probe = std::net::TcpListener::bind(("127.0.0.1", 0)).expect("bind port probe");
        let port = probe.local_addr().expect("probe addr").port();
        if port >= u16::MAX - 1 {
            continue;
        }
        if std::net::TcpListener::bind(("127.0.0.1", port + 1)).is_ok() {
            return port;
        }
    }
    panic!("no adjacent free port pair found");
}

/// Self-signed certificate material written into a tempdir that lives as
/// long as the returned guard.
pub struct TestTls {
    pub material: TlsMaterial,
    _dir: tempfile::TempDir,
}

pub fn self_signed_tls() -> TestTls {
    let dir = tempfile::tempdir().expect("tempdir");
    let certified =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string(), "127.0.0.1".to_string()])
            .expect("generate self-signed certificate");

    let cert_path = dir.path().join("cert.pem");
    let key_path = dir.path().join("key.pem");
    std::fs::write(&cert_path, certified.cert.pem()).expect("write cert");
    std::fs::write(&key_path, certified.key_pair.serialize_pem()).expect("write key");

    TestTls {
        material: TlsMaterial::new(cert_path, key_path),
        _dir: dir,
    }
}

/// How a fake handle behaves when closed.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub enum CloseBehavior {
    #[default]
    Clean,
    ConnectionClosed,
    PageError,
    Fail,
}

fn close_result(behavior: CloseBehavior) -> DriverResult<()> {
    match behavior {
        CloseBehavior::Clean => Ok(()),
        CloseBehavior::ConnectionClosed => Err(DriverError::ConnectionClosed),
        CloseBehavior::PageError => Err(DriverError::Page("page crashed during close".into())),
        CloseBehavior::Fail => Err(DriverError::Protocol("close rejected".into())),
    }
}

/// Counters observable from the outside of the harness.
#[derive(Default)]
pub struct DriverStats {
    pub launches: AtomicUsize,
    pub contexts_created: AtomicUsize,
    pub pages_created: AtomicUsize,
    pub contexts_open: AtomicUsize,
    pub pages_open: AtomicUsize,
    pub close_order: Mutex<Vec<&'static str>>,
    pub navigations: Mutex<Vec<String>>,
}

/// In-process driver: hands out fake handles and records lifecycle events.
#[derive(Default)]
pub struct FakeDriver {
    pub fail_launch: bool,
    pub browser_close: CloseBehavior,
    pub context_close: CloseBehavior,
    pub page_close: CloseBehavior,
    pub stats: Arc<DriverStats>,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> Arc<DriverStats> {
        self.stats.clone()
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn launch(&self, _options: &LaunchOptions) -> DriverResult<Box<dyn BrowserHandle>> {
        if self.fail_launch {
            return Err(DriverError::Spawn("no usable browser executable".into()));
        }
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeBrowser {
            stats: self.stats.clone(),
            browser_close: self.browser_close,
            context_close: self.context_close,
            page_close: self.page_close,
        }))
    }
}

struct FakeBrowser {
    stats: Arc<DriverStats>,
    browser_close: CloseBehavior,
    context_close: CloseBehavior,
    page_close: CloseBehavior,
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    async fn new_context(&mut self) -> DriverResult<Box<dyn ContextHandle>> {
        self.stats.contexts_created.fetch_add(1, Ordering::SeqCst);
        self.stats.contexts_open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeContext {
            stats: self.stats.clone(),
            context_close: self.context_close,
            page_close: self.page_close,
        }))
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.stats.close_order.lock().unwrap().push("browser");
        close_result(self.browser_close)
    }
}

struct FakeContext {
    stats: Arc<DriverStats>,
    context_close: CloseBehavior,
    page_close: CloseBehavior,
}

#[async_trait]
impl ContextHandle for FakeContext {
    async fn new_page(&mut self) -> DriverResult<Box<dyn PageHandle>> {
        self.stats.pages_created.fetch_add(1, Ordering::SeqCst);
        self.stats.pages_open.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            stats: self.stats.clone(),
            page_close: self.page_close,
        }))
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.stats.contexts_open.fetch_sub(1, Ordering::SeqCst);
        self.stats.close_order.lock().unwrap().push("context");
        close_result(self.context_close)
    }
}

struct FakePage {
    stats: Arc<DriverStats>,
    page_close: CloseBehavior,
}

#[async_trait]
impl PageHandle for FakePage {
    async fn goto(&mut self, url: &str) -> DriverResult<()> {
        self.stats.navigations.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn content(&mut self) -> DriverResult<String> {
        Ok("<html><head></head><body></body></html>".to_string())
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.stats.pages_open.fetch_sub(1, Ordering::SeqCst);
        self.stats.close_order.lock().unwrap().push("page");
        close_result(self.page_close)
    }
}
