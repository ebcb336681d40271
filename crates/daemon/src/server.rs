//! The TCP accept loop.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use crate::handler::Daemon;
use crate::DaemonError;

/// A listening daemon; one thread per accepted connection.
#[derive(Debug)]
pub struct Server {
    daemon: Arc<Daemon>,
}

/// Handle used to stop a running [`Server::serve`] loop.
///
/// Triggering sets the stop flag and pokes the listener with a loopback
/// connection so a blocked `accept` wakes up.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl ShutdownHandle {
    /// Requests shutdown of the associated serve loop.
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Relaxed);
        // Unblock accept(); an immediately-dropped connection is harmless.
        let _ = TcpStream::connect(self.addr);
    }

    fn is_set(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

impl Server {
    /// Wraps a validated daemon for serving.
    #[must_use]
    pub fn new(daemon: Daemon) -> Self {
        Self {
            daemon: Arc::new(daemon),
        }
    }

    /// Creates a shutdown handle for a listener this server will run on.
    pub fn shutdown_handle(listener: &TcpListener) -> io::Result<ShutdownHandle> {
        Ok(ShutdownHandle {
            flag: Arc::new(AtomicBool::new(false)),
            addr: listener.local_addr()?,
        })
    }

    /// Accepts connections until the shutdown handle fires.
    ///
    /// Each connection runs on its own thread; in-flight transfers run to
    /// completion even after shutdown is requested.
    pub fn serve(&self, listener: &TcpListener, shutdown: &ShutdownHandle) -> Result<(), DaemonError> {
        tracing::info!(addr = %listener.local_addr()?, "rsync daemon listening");

        for stream in listener.incoming() {
            if shutdown.is_set() {
                tracing::info!("daemon shutting down");
                return Ok(());
            }
            let stream = match stream {
                Ok(stream) => stream,
                Err(error) => {
                    tracing::warn!(%error, "accept failed");
                    continue;
                }
            };

            let peer = stream.peer_addr().ok();
            tracing::info!(?peer, "connection accepted");
            let daemon = Arc::clone(&self.daemon);
            thread::Builder::new()
                .name("rsyncd-conn".to_owned())
                .spawn(move || {
                    let read_half = match stream.try_clone() {
                        Ok(clone) => clone,
                        Err(error) => {
                            tracing::warn!(%error, "failed to split connection");
                            return;
                        }
                    };
                    if let Err(error) =
                        daemon.handle_daemon_conn(read_half, stream, peer.map(|addr| addr.ip()))
                    {
                        tracing::warn!(?peer, %error, "connection failed");
                    }
                })?;
        }
        Ok(())
    }
}
