//! WebStage test harness
//!
//! Provisions a deterministic matrix of local HTTP/HTTPS test servers under
//! different network-identity variants and manages the lifecycle of a
//! shared browser process plus per-test isolated browsing contexts and
//! pages.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │                   TestSession (sync facade)                │
//! ├────────────────────────────────────────────────────────────┤
//! │  ServerVariants (one backing application)                  │
//! │    ├── root          http://localhost:P       (listener)   │
//! │    ├── https         https://localhost:P+1    (listener)   │
//! │    └── cross-origin  http://127.0.0.1:P       (shared)     │
//! ├────────────────────────────────────────────────────────────┤
//! │  BrowserSession (one per session, launched lazily)         │
//! │    └── IsolatedContext (fresh per test)                    │
//! │          └── IsolatedPage (fresh per test)                 │
//! ├────────────────────────────────────────────────────────────┤
//! │  GoldenDirs (fail-fast lookup, comparison delegated)       │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! The application under test is an opaque [`axum::Router`]; the browser
//! automation backend is an opaque [`driver::BrowserDriver`]. Neither is
//! inspected by the harness.

pub mod address;
pub mod browser;
pub mod driver;
pub mod error;
pub mod golden;
pub mod playwright;
pub mod server;
pub mod session;

pub use address::{Scheme, ServerAddress, CROSS_ORIGIN_HOST, LOOPBACK_HOST};
pub use browser::{BrowserSession, IsolatedContext, IsolatedPage};
pub use driver::{BrowserDriver, DriverError, EngineFamily, LaunchOptions};
pub use error::{CloseOutcome, HarnessError, HarnessResult};
pub use golden::GoldenDirs;
pub use playwright::PlaywrightDriver;
pub use server::{ServerVariants, TlsMaterial, VariantOptions};
pub use session::{SessionConfig, TestSession};
