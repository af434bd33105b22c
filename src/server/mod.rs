//! HTTP server module
//!
//! Accepts connections and serves each one on its own tokio task. Requests
//! share nothing but an immutable [`AppState`].
//!
//! # Example
//!
//! ```no_run
//! use fileferry::config::Config;
//! use fileferry::server::Server;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = Config::default();
//! config.server.port = 0;
//! let server = Server::new(config).await?;
//! println!("Server bound to: {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::download::DownloadService;
use crate::mirror::MirrorService;
use crate::upload::UploadService;

pub mod body;
pub mod handler;

pub use handler::handle_request;

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),
}

/// Services shared by all requests, fixed at startup
#[derive(Debug, Clone)]
pub struct AppState {
    pub uploads: UploadService,
    pub downloads: DownloadService,
    pub mirrors: Option<MirrorService>,
}

impl AppState {
    pub fn from_config(config: &Config) -> Self {
        let storage = &config.storage;
        Self {
            uploads: UploadService::new(&storage.upload_dir),
            downloads: DownloadService::new(&storage.download_dir),
            mirrors: storage
                .mirrors
                .then(|| MirrorService::new(&storage.download_dir, &storage.upload_dir)),
        }
    }
}

/// HTTP Server
pub struct Server {
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Bind to the configured address.
    ///
    /// Port 0 lets the OS pick a port; see [`Server::local_addr`].
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        let address = config.server.address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", address, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Server bound to {}", local_addr);
        info!(
            upload_dir = %config.storage.upload_dir.display(),
            download_dir = %config.storage.download_dir.display(),
            mirrors = config.storage.mirrors,
            "Storage roots configured"
        );
        if !config.storage.download_dir.is_dir() {
            warn!(
                download_dir = %config.storage.download_dir.display(),
                "Download root does not exist yet; downloads will answer 404"
            );
        }

        Ok(Self {
            state: Arc::new(AppState::from_config(&config)),
            listener,
            local_addr,
        })
    }

    /// Get the local address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        };
        self.run_until(ctrl_c).await
    }

    /// Run until `shutdown` resolves.
    ///
    /// Stops accepting new connections on shutdown; connections already being
    /// served finish on their own tasks. Accept errors are logged and never
    /// stop the loop.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()>,
    {
        info!("Starting server on {}", self.local_addr);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutting down server");
                    return Ok(());
                }
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                            continue;
                        }
                    };

                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        let io = TokioIo::new(stream);
                        let service = service_fn(move |req| {
                            let state = Arc::clone(&state);
                            async move { handle_request(req, &state).await }
                        });

                        if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                            error!("Error serving connection from {}: {}", peer_addr, e);
                        }
                    });
                }
            }
        }
    }
}
