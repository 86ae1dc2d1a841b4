//! TCP server for exact line lookups.
//!
//! Accepts connections (optionally wrapped in TLS), spawns a handler task per
//! connection, and answers each request frame against the dataset.

use crate::config::Config;
use crate::dataset::Dataset;
use crate::protocol::{self, Response, MAX_FRAME_SIZE};
use crate::tls::{self, TlsError};
use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_rustls::server::TlsStream;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// How long a client may take to complete the TLS handshake
const TLS_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Server startup errors
#[derive(Debug)]
pub enum ServerError {
    /// The listen address could not be bound
    Bind(String, io::Error),
    /// TLS material could not be loaded
    Tls(TlsError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServerError::Bind(addr, e) => write!(f, "Failed to bind '{addr}': {e}"),
            ServerError::Tls(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ServerError {}

impl From<TlsError> for ServerError {
    fn from(e: TlsError) -> Self {
        ServerError::Tls(e)
    }
}

/// Server instance
pub struct Server {
    listen: String,
    dataset: Arc<Dataset>,
    tls: Option<TlsAcceptor>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server. Loads TLS material when configured.
    pub fn new(config: &Config, dataset: Dataset) -> Result<Self, ServerError> {
        let tls = match &config.tls {
            Some(files) => Some(tls::load_acceptor(&files.cert_file, &files.key_file)?),
            None => None,
        };

        Ok(Server {
            listen: config.listen_addr(),
            dataset: Arc::new(dataset),
            tls,
            connection_limit: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Bind the configured listen address
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        TcpListener::bind(&self.listen)
            .await
            .map_err(|e| ServerError::Bind(self.listen.clone(), e))
    }

    /// Bind and serve until Ctrl-C
    pub async fn run(&self) -> Result<(), ServerError> {
        let listener = self.bind().await?;
        self.serve(listener, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("Shutdown requested");
        })
        .await;
        Ok(())
    }

    /// Accept connections on `listener` until `shutdown` completes.
    ///
    /// On shutdown no new connections are accepted; open connections finish
    /// the request they are serving and are then closed.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(
                address = %addr,
                mode = self.dataset.mode(),
                tls = self.tls.is_some(),
                "Server listening"
            );
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut handlers = JoinSet::new();
        tokio::pin!(shutdown);

        loop {
            // Wait for a connection slot
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = Arc::clone(&self.connection_limit).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let accepted = tokio::select! {
                _ = &mut shutdown => break,
                accepted = listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "New connection");

                    let dataset = Arc::clone(&self.dataset);
                    let tls = self.tls.clone();
                    let mut stop = stop_rx.clone();
                    let span = info_span!("conn", peer = %peer);

                    handlers.spawn(
                        async move {
                            let result = match tls {
                                Some(acceptor) => {
                                    let limit = TLS_HANDSHAKE_TIMEOUT;
                                    match tls_handshake(&acceptor, stream, &mut stop, limit).await {
                                        Some(tls) => handle_connection(tls, dataset, stop).await,
                                        None => Ok(()),
                                    }
                                }
                                None => handle_connection(stream, dataset, stop).await,
                            };
                            if let Err(e) = result {
                                debug!(error = %e, "Connection error");
                            }
                            drop(permit);
                        }
                        .instrument(span),
                    );
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }

            // Reap finished handlers
            while let Some(finished) = handlers.try_join_next() {
                log_join(finished);
            }
        }

        drop(listener);
        info!(open = handlers.len(), "Stopped accepting connections");

        let _ = stop_tx.send(true);
        while let Some(finished) = handlers.join_next().await {
            log_join(finished);
        }
        info!("All connections closed");
    }

    #[cfg(test)]
    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }
}

fn log_join(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!(error = %e, "Connection task failed");
    }
}

/// Complete the TLS handshake on `stream`.
///
/// Gives up when `limit` elapses or shutdown is signalled, so a silent peer
/// cannot hold a connection slot or stall shutdown.
async fn tls_handshake<S>(
    acceptor: &TlsAcceptor,
    stream: S,
    stop: &mut watch::Receiver<bool>,
    limit: Duration,
) -> Option<TlsStream<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    tokio::select! {
        biased;
        _ = stop.changed() => {
            debug!("Abandoning TLS handshake for shutdown");
            None
        }
        accepted = timeout(limit, acceptor.accept(stream)) => match accepted {
            Ok(Ok(stream)) => Some(stream),
            Ok(Err(e)) => {
                warn!(error = %e, "TLS handshake failed");
                None
            }
            Err(_) => {
                warn!(limit = ?limit, "TLS handshake timed out");
                None
            }
        },
    }
}

/// Handle a single client connection.
///
/// The stream is shut down on every exit path.
pub async fn handle_connection<S>(
    mut stream: S,
    dataset: Arc<Dataset>,
    mut stop: watch::Receiver<bool>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let result = serve_requests(&mut stream, &dataset, &mut stop).await;

    if let Err(e) = stream.shutdown().await {
        trace!(error = %e, "Shutdown after close");
    }
    debug!("Connection closed");
    result
}

/// Request/response loop. One read is one request frame.
async fn serve_requests<S>(
    stream: &mut S,
    dataset: &Dataset,
    stop: &mut watch::Receiver<bool>,
) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut frame = [0u8; MAX_FRAME_SIZE];

    loop {
        let n = tokio::select! {
            biased;
            _ = stop.changed() => {
                debug!("Closing connection for shutdown");
                return Ok(());
            }
            n = stream.read(&mut frame) => n?,
        };

        if n == 0 {
            trace!("Connection closed by client");
            return Ok(());
        }

        let response = match protocol::decode_query(&frame[..n]) {
            Ok(query) => lookup(dataset, query).await,
            Err(e) => {
                warn!(error = %e, "Malformed request frame");
                Response::Error
            }
        };

        stream.write_all(response.as_bytes()).await?;
        stream.flush().await?;
    }
}

/// Resolve one query. Lookup failures become `Response::Error`.
async fn lookup(dataset: &Dataset, query: &str) -> Response {
    match dataset.contains(query).await {
        Ok(found) => {
            let response = Response::from(found);
            debug!(query, ?response, "Query answered");
            response
        }
        Err(e) => {
            error!(query, error = %e, "Lookup failed");
            Response::Error
        }
    }
}
