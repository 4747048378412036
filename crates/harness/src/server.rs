//! Multi-variant test server provisioning
//!
//! Stands one backing application up behind up to three reachable
//! identities (plain, secure-transport, alternate-host) sharing a port
//! family, so tests can assert cross-origin and mixed-content behavior
//! deterministically. The tree is explicitly acyclic: the root constructs
//! at most two child variants by value, and children never construct
//! children of their own.

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::path::PathBuf;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::address::{Scheme, ServerAddress, CROSS_ORIGIN_HOST, LOOPBACK_HOST};
use crate::error::{HarnessError, HarnessResult};

/// Certificate/key PEM pair for the https listener branch.
///
/// The material itself comes from an external collaborator; a missing or
/// mismatched pair is a fatal configuration error when the https branch is
/// constructed.
#[derive(Debug, Clone)]
pub struct TlsMaterial {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl TlsMaterial {
    pub fn new(cert_path: impl Into<PathBuf>, key_path: impl Into<PathBuf>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
        }
    }

    async fn load(&self) -> HarnessResult<RustlsConfig> {
        RustlsConfig::from_pem_file(&self.cert_path, &self.key_path)
            .await
            .map_err(|e| {
                HarnessError::Certificate(format!(
                    "{} / {}: {}",
                    self.cert_path.display(),
                    self.key_path.display(),
                    e
                ))
            })
    }
}

/// Construction inputs for a variant tree.
#[derive(Debug, Clone)]
pub struct VariantOptions {
    /// Port of the plain variant; the https variant listens on `base_port + 1`.
    pub base_port: u16,
    /// Build the root as the secure-transport identity.
    pub https: bool,
    /// Build the root as the alternate-host identity.
    pub cross_origin: bool,
    pub tls: TlsMaterial,
}

impl VariantOptions {
    pub fn new(base_port: u16, tls: TlsMaterial) -> Self {
        Self {
            base_port,
            https: false,
            cross_origin: false,
            tls,
        }
    }
}

/// One bound-and-serving listener plus its shutdown handle.
#[derive(Debug)]
struct Listener {
    handle: Handle,
    task: JoinHandle<std::io::Result<()>>,
}

impl Listener {
    /// Bind eagerly and start serving `app`. An occupied port surfaces here,
    /// at construction, as a fatal error with no retry.
    async fn bind(addr: SocketAddr, app: Router, tls: Option<RustlsConfig>) -> HarnessResult<Self> {
        let socket = StdTcpListener::bind(addr).map_err(|e| match e.kind() {
            std::io::ErrorKind::AddrInUse => HarnessError::AddressInUse { addr },
            _ => HarnessError::Io(e),
        })?;
        socket.set_nonblocking(true)?;

        let handle = Handle::new();
        let task = match tls {
            Some(config) => tokio::spawn(
                axum_server::from_tcp_rustls(socket, config)
                    .handle(handle.clone())
                    .serve(app.into_make_service()),
            ),
            None => tokio::spawn(
                axum_server::from_tcp(socket)
                    .handle(handle.clone())
                    .serve(app.into_make_service()),
            ),
        };

        Ok(Self { handle, task })
    }

    /// Stop accepting and resolve once the serve task has exited, so no
    /// accepted-but-unserved connection remains after this returns.
    async fn shutdown(mut self) {
        self.handle.shutdown();
        let _ = (&mut self.task).await;
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        // covers the construction error path, where a sibling bound first
        // and the tree never finished assembling
        self.handle.shutdown();
    }
}

/// A tree of related endpoints backed by one application.
///
/// The root owns a listener; the https child owns its own listener on
/// `port + 1`; the cross-origin child advertises an alternate host but
/// shares the sibling listener bound on the same port. All variants serve
/// clones of the same [`Router`], so handler state is shared by reference
/// across the whole tree.
#[derive(Debug)]
pub struct ServerVariants {
    address: ServerAddress,
    app: Router,
    listener: Option<Listener>,
    https: Option<Box<ServerVariants>>,
    cross_origin: Option<Box<ServerVariants>>,
    child_instance: bool,
}

impl ServerVariants {
    /// Bind the root of a variant tree and eagerly construct its children.
    ///
    /// Every owned listener is bound and serving before this returns.
    /// Children are terminal: they are built with the recursion guard set
    /// and never spawn further variants, so the tree has depth <= 2.
    pub async fn bind(app: Router, opts: VariantOptions) -> HarnessResult<Self> {
        let mut root = Self::leaf(&app, &opts, opts.https, opts.cross_origin, false).await?;
        if !opts.https {
            root.https = Some(Box::new(
                Self::leaf(&app, &opts, true, opts.cross_origin, true).await?,
            ));
        }
        if !opts.cross_origin {
            root.cross_origin = Some(Box::new(
                Self::leaf(&app, &opts, opts.https, true, true).await?,
            ));
        }
        info!("variant tree ready at {}", root.address.base());
        Ok(root)
    }

    /// Build a single node. No recursion happens here; the depth guard is
    /// structural.
    async fn leaf(
        app: &Router,
        opts: &VariantOptions,
        https: bool,
        cross_origin: bool,
        child_instance: bool,
    ) -> HarnessResult<Self> {
        let port = opts.base_port + u16::from(https);
        let scheme = if https { Scheme::Https } else { Scheme::Http };
        let host = if cross_origin {
            CROSS_ORIGIN_HOST
        } else {
            LOOPBACK_HOST
        };
        let address = ServerAddress::new(host, port, scheme)?;

        // Cross-origin variants advertise a different host but reach the
        // sibling listener bound on the same port, so they never bind one
        // themselves.
        let listener = if cross_origin {
            None
        } else {
            let tls = if https {
                Some(opts.tls.load().await?)
            } else {
                None
            };
            let bind_addr = SocketAddr::from(([127, 0, 0, 1], port));
            debug!("binding {} listener on {}", scheme.as_str(), bind_addr);
            Some(Listener::bind(bind_addr, app.clone(), tls).await?)
        };

        Ok(Self {
            address,
            app: app.clone(),
            listener,
            https: None,
            cross_origin: None,
            child_instance,
        })
    }

    pub fn address(&self) -> &ServerAddress {
        &self.address
    }

    /// The secure-transport child variant, if this node has one.
    pub fn https_variant(&self) -> Option<&ServerVariants> {
        self.https.as_deref()
    }

    /// The alternate-host child variant, if this node has one.
    pub fn cross_origin_variant(&self) -> Option<&ServerVariants> {
        self.cross_origin.as_deref()
    }

    /// The shared application handle; clones of it back every variant.
    pub fn application(&self) -> &Router {
        &self.app
    }

    pub fn owns_listener(&self) -> bool {
        self.listener.is_some()
    }

    pub fn is_child_instance(&self) -> bool {
        self.child_instance
    }

    pub fn host(&self) -> &str {
        self.address.host()
    }

    pub fn port(&self) -> u16 {
        self.address.port()
    }

    pub fn base(&self) -> &str {
        self.address.base()
    }

    pub fn empty_page(&self) -> &str {
        self.address.empty_page()
    }

    pub fn join(&self, path: &str) -> HarnessResult<String> {
        self.address.join(path)
    }

    pub fn unique_url(&self) -> HarnessResult<String> {
        self.address.unique_url()
    }

    /// Stop the https child's listener first, then this node's own.
    ///
    /// Invoked exactly once during session teardown; the cross-origin child
    /// has no listener of its own to stop.
    pub async fn stop_all(&mut self) {
        if let Some(https) = self.https.as_mut() {
            https.stop().await;
        }
        self.stop().await;
    }

    /// Stop this node's listener. No-op for nodes that never owned one.
    pub async fn stop(&mut self) {
        if let Some(listener) = self.listener.take() {
            debug!("stopping listener for {}", self.address.base());
            listener.shutdown().await;
        }
    }
}
