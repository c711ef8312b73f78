//! WebSocket server hosting the echo relay.
//!
//! Accepts TCP connections, performs the HTTP upgrade for the single
//! configured URL path, and runs one relay per connection. Server-level
//! errors stop the accept loop; per-connection errors never escape their
//! connection.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::connection;
use crate::transport::ws::WsTransport;
use crate::transport::FrameTransport;

/// Maximum number of concurrent connections
const MAX_CONNECTIONS: usize = 10000;

/// Server instance
pub struct Server {
    config: Arc<Config>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        Server {
            config: Arc::new(config),
            connection_limit: Arc::new(Semaphore::new(MAX_CONNECTIONS)),
        }
    }

    /// Accept connections until a shutdown signal arrives.
    pub async fn run(&self) -> Result<(), Box<dyn std::error::Error>> {
        let addr: SocketAddr = self.config.listen.parse()?;
        let listener = bind_listener(addr, self.config.tcp_fastopen)?;
        let listener = TcpListener::from_std(listener)?;
        info!(address = %addr, path = %self.config.path, "Server listening");

        loop {
            // Wait for a connection slot
            let permit = self.connection_limit.clone().acquire_owned().await?;

            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        debug!(peer = %peer, "New connection");
                        let config = Arc::clone(&self.config);

                        tokio::spawn(async move {
                            handle_client(stream, peer, config).await;
                            drop(permit);
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "Failed to accept connection");
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received, stopping accept loop");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Upgrade one accepted socket and relay until it closes.
async fn handle_client(stream: TcpStream, peer: SocketAddr, config: Arc<Config>) {
    let path = config.path.clone();
    let check_path = move |req: &Request, response: Response| {
        if req.uri().path() == path {
            Ok(response)
        } else {
            let mut not_found = ErrorResponse::new(Some("not found".to_string()));
            *not_found.status_mut() = StatusCode::NOT_FOUND;
            Err(not_found)
        }
    };

    // The header-read timeout brackets the whole HTTP upgrade.
    let handshake = timeout(
        config.timeouts.header_read,
        accept_hdr_async(stream, check_path),
    );
    let ws = match handshake.await {
        Ok(Ok(ws)) => ws,
        Ok(Err(e)) => {
            debug!(peer = %peer, error = %e, "WebSocket handshake failed");
            return;
        }
        Err(_) => {
            debug!(peer = %peer, "WebSocket handshake timed out");
            return;
        }
    };

    let mut transport = WsTransport::new(ws, config.buffer_size);
    match connection::run(&mut transport, config.buffer_size, &config.timeouts).await {
        Ok(()) => debug!(peer = %peer, "Connection closed"),
        Err(e) => warn!(peer = %peer, error = %e, "Connection error"),
    }

    match timeout(config.timeouts.close, transport.close()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => debug!(peer = %peer, error = %e, "Close handshake failed"),
        Err(_) => debug!(peer = %peer, "Close handshake timed out"),
    }
}

/// Build the listening socket with reuse-address and optional fast-open.
fn bind_listener(addr: SocketAddr, tcp_fastopen: bool) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    if tcp_fastopen {
        enable_tcp_fastopen(&socket)?;
    }
    socket.bind(&addr.into())?;
    socket.listen(1024)?;

    Ok(socket.into())
}

#[cfg(target_os = "linux")]
fn enable_tcp_fastopen(socket: &socket2::Socket) -> io::Result<()> {
    use std::os::unix::io::AsRawFd;

    let qlen: libc::c_int = 16;
    let ret = unsafe {
        libc::setsockopt(
            socket.as_raw_fd(),
            libc::IPPROTO_TCP,
            libc::TCP_FASTOPEN,
            std::ptr::addr_of!(qlen).cast(),
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if ret != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn enable_tcp_fastopen(_socket: &socket2::Socket) -> io::Result<()> {
    warn!("TCP fast-open requested but not supported on this platform");
    Ok(())
}
