//! Transport used to reach upstream hosts.
//!
//! The dispatcher only needs "connect to host:port within a deadline"; what
//! the connection is (plain TCP, a pooled socket, a test double) is up to the
//! connector.

use std::future::Future;
use std::io;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

/// Opens connections to upstream hosts.
pub trait Connector: Send + Sync + 'static {
    /// Established connection handed back to the caller.
    type Conn: Send + 'static;

    /// Connect to `host:port`, failing once `timeout` elapses.
    fn connect(
        &self,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> impl Future<Output = io::Result<Self::Conn>> + Send;
}

/// Plain TCP connector.
#[derive(Debug, Clone, Copy)]
pub struct TcpConnector {
    nodelay: bool,
}

impl TcpConnector {
    pub fn new() -> Self {
        Self { nodelay: true }
    }

    /// Set `TCP_NODELAY` on established streams.
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl Connector for TcpConnector {
    type Conn = TcpStream;

    async fn connect(&self, host: &str, port: u16, deadline: Duration) -> io::Result<TcpStream> {
        let stream = match timeout(deadline, TcpStream::connect((host, port))).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect to {host}:{port} timed out after {deadline:?}"),
                ))
            }
        };
        stream.set_nodelay(self.nodelay)?;
        Ok(stream)
    }
}
