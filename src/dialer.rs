use crate::peer::Transport;
use async_trait::async_trait;
use std::io;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};

/// Opens outbound connections to origin servers.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn dial(&self, host: &str, port: u16) -> io::Result<Transport>;
}

/// Plain TCP dialer. Without a connect timeout a hung connect holds the
/// calling loop until the OS gives up.
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    connect_timeout: Option<Duration>,
}

impl TcpDialer {
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, host: &str, port: u16) -> io::Result<Transport> {
        // Bracketed IPv6 literals come straight from the Host header.
        let host = host.trim_start_matches('[').trim_end_matches(']');
        let connect = TcpStream::connect((host, port));

        let stream = match self.connect_timeout {
            Some(limit) => timeout(limit, connect).await.map_err(|_| {
                io::Error::new(io::ErrorKind::TimedOut, format!("connect to {}:{} timed out", host, port))
            })??,
            None => connect.await?,
        };

        log::debug!("Connected to {}:{}", host, port);
        Ok(Transport::from_tcp(stream))
    }
}
