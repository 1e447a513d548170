//! One end of a relayed TCP stream.
//!
//! A `Peer` owns only the write half of its transport; the read half is owned
//! by the handling loop that drives it. Pairing is never stored on the peer
//! itself; see [`crate::registry::PeerRegistry`].

use crate::error::ProxyError;
use std::hash::{Hash, Hasher};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Both halves of a freshly accepted or dialed stream.
pub struct Transport {
    pub reader: BoxedReader,
    pub writer: BoxedWriter,
}

impl Transport {
    pub fn new(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self { reader, writer }
    }

    pub fn from_tcp(stream: TcpStream) -> Self {
        let (reader, writer) = stream.into_split();
        Self::new(Box::new(reader), Box::new(writer))
    }

    /// Splits any bidirectional stream, e.g. an in-memory `tokio::io::duplex` end.
    pub fn split<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::new(Box::new(reader), Box::new(writer))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerId(u64);

impl PeerId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// Accepted from a listening socket.
    Client,
    /// Dialed by the proxy on behalf of a client.
    Origin,
}

pub struct Peer {
    id: PeerId,
    label: String,
    role: PeerRole,
    writer: Mutex<Option<BoxedWriter>>,
    closed: CancellationToken,
}

impl Peer {
    pub fn new(id: PeerId, label: impl Into<String>, role: PeerRole, writer: BoxedWriter) -> Self {
        Self {
            id,
            label: label.into(),
            role,
            writer: Mutex::new(Some(writer)),
            closed: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> PeerId {
        self.id
    }

    /// `ClientN` for accepted peers, the dialed `host:port` for origins.
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once [`Peer::close`] has been called.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }

    /// Writes `bytes` verbatim. Fails with `PeerClosed` once the peer is
    /// closed, including while a write is blocked on a slow reader.
    pub async fn send(&self, bytes: &[u8]) -> Result<(), ProxyError> {
        let mut guard = tokio::select! {
            guard = self.writer.lock() => guard,
            _ = self.closed.cancelled() => return Err(ProxyError::PeerClosed(self.label.clone())),
        };
        let writer = guard
            .as_mut()
            .ok_or_else(|| ProxyError::PeerClosed(self.label.clone()))?;

        tokio::select! {
            result = async {
                writer.write_all(bytes).await?;
                writer.flush().await
            } => result.map_err(ProxyError::from),
            _ = self.closed.cancelled() => Err(ProxyError::PeerClosed(self.label.clone())),
        }
    }

    /// Half-closes and releases the write half, then wakes the owning loop.
    /// Returns true only for the call that took the write half.
    pub async fn close(&self) -> bool {
        // Cancel first so an in-flight send releases the writer lock.
        self.closed.cancel();

        let Some(mut writer) = self.writer.lock().await.take() else {
            return false;
        };
        if let Err(e) = writer.shutdown().await {
            log::debug!("Shutdown of {} failed: {}", self.label, e);
        }
        true
    }
}

// Identity only: a peer never compares through its partner.
impl PartialEq for Peer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && self.label == other.label
    }
}

impl Eq for Peer {}

impl Hash for Peer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.label.hash(state);
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("role", &self.role)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncReadExt};

    fn peer_over_duplex(id: u64, label: &str) -> (Peer, tokio::io::DuplexStream) {
        let (near, far) = duplex(1024);
        let transport = Transport::split(near);
        (Peer::new(PeerId::new(id), label, PeerRole::Client, transport.writer), far)
    }

    #[tokio::test]
    async fn test_send_writes_verbatim() {
        let (peer, mut far) = peer_over_duplex(1, "Client1");
        peer.send(b"\x16\x03\x01hello").await.unwrap();

        let mut buf = [0u8; 16];
        let n = far.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"\x16\x03\x01hello");
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (peer, mut far) = peer_over_duplex(2, "Client2");
        assert!(peer.close().await);
        assert!(!peer.close().await);
        assert!(peer.is_closed());

        let mut buf = [0u8; 4];
        assert_eq!(far.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_close_reports_once() {
        let (near, _far) = duplex(1024);
        let transport = Transport::split(near);
        let peer = std::sync::Arc::new(Peer::new(PeerId::new(5), "Client5", PeerRole::Client, transport.writer));

        let closers: Vec<_> = (0..8)
            .map(|_| {
                let peer = peer.clone();
                tokio::spawn(async move { peer.close().await })
            })
            .collect();

        let mut closed = 0;
        for closer in closers {
            if closer.await.unwrap() {
                closed += 1;
            }
        }
        assert_eq!(closed, 1);
        assert!(peer.is_closed());
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (peer, _far) = peer_over_duplex(3, "Client3");
        peer.close().await;
        let err = peer.send(b"late").await.unwrap_err();
        assert!(matches!(err, ProxyError::PeerClosed(label) if label == "Client3"));
    }

    #[tokio::test]
    async fn test_close_unblocks_pending_send() {
        let (near, _far) = duplex(4);
        let transport = Transport::split(near);
        let peer = std::sync::Arc::new(Peer::new(PeerId::new(4), "Client4", PeerRole::Client, transport.writer));

        let sender = {
            let peer = peer.clone();
            tokio::spawn(async move { peer.send(&[0u8; 64]).await })
        };
        tokio::task::yield_now().await;
        peer.close().await;

        let result = tokio::time::timeout(std::time::Duration::from_secs(1), sender)
            .await
            .expect("send should be released by close")
            .unwrap();
        assert!(matches!(result, Err(ProxyError::PeerClosed(_))));
    }

    #[test]
    fn test_equality_uses_identity_only() {
        let (a, _fa) = peer_over_duplex(7, "Client7");
        let (b, _fb) = peer_over_duplex(7, "Client7");
        let (c, _fc) = peer_over_duplex(8, "Client7");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
