//! Server endpoint identity and URL composition
//!
//! A [`ServerAddress`] describes one reachable endpoint (host, port,
//! scheme) and offers base-URL + relative-reference joining. It performs no
//! network I/O; listeners are owned by the variant tree in
//! [`crate::server`].

use rand::distributions::Alphanumeric;
use rand::Rng;
use url::Url;

use crate::error::HarnessResult;

/// Fixed loopback alias used for same-origin variants.
pub const LOOPBACK_HOST: &str = "localhost";

/// Externally-routable loopback alias advertised by cross-origin variants.
/// Resolves to the same interface as [`LOOPBACK_HOST`], so a sibling's
/// listener serves it, but browsers treat it as a distinct origin.
pub const CROSS_ORIGIN_HOST: &str = "127.0.0.1";

/// Length of the random path token produced by [`ServerAddress::unique_url`].
const UNIQUE_TOKEN_LEN: usize = 12;

/// URL scheme served by a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// A single reachable endpoint with URL-join semantics.
#[derive(Debug, Clone)]
pub struct ServerAddress {
    host: String,
    port: u16,
    scheme: Scheme,
    base: Url,
    empty_page: String,
}

impl ServerAddress {
    /// Build the address for `scheme://host:port/` and eagerly compute the
    /// well-known empty-page URL.
    pub fn new(host: &str, port: u16, scheme: Scheme) -> HarnessResult<Self> {
        let base = Url::parse(&format!("{}://{}:{}/", scheme.as_str(), host, port))?;
        let empty_page = base.join("empty.html")?.into();
        Ok(Self {
            host: host.to_string(),
            port,
            scheme,
            base,
            empty_page,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// The base URL string, always with a trailing slash.
    pub fn base(&self) -> &str {
        self.base.as_str()
    }

    /// The cached `join("empty.html")` URL.
    pub fn empty_page(&self) -> &str {
        &self.empty_page
    }

    /// Resolve `path` against the base URL (RFC 3986 joining): an empty
    /// path yields the base itself, an absolute reference overrides the
    /// base entirely. Pure string composition, no I/O.
    pub fn join(&self, path: &str) -> HarnessResult<String> {
        Ok(self.base.join(path)?.into())
    }

    /// A freshly randomized path resolved against the base. Tokens are
    /// fixed-length alphanumeric, so two draws collide with negligible
    /// probability across a test run; used to defeat caching and route
    /// collisions between tests.
    pub fn unique_url(&self) -> HarnessResult<String> {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(UNIQUE_TOKEN_LEN)
            .map(char::from)
            .collect();
        self.join(&token)
    }
}
