use crate::acceptor::ConnectionAcceptor;
use crate::audit::{FileAuditLog, LogRecorder, MessageRecorder};
use crate::config::Config;
use crate::dialer::{Dialer, TcpDialer};
use crate::error::ProxyError;
use crate::peer::PeerId;
use crate::registry::PeerRegistry;
use crate::tunnel::PortPolicy;
use log::{debug, info};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

pub const DEFAULT_BUFFER_SIZE: usize = 8192;

/// State shared by every handling loop of one proxy instance.
pub struct ProxyContext {
    registry: PeerRegistry,
    dialer: Arc<dyn Dialer>,
    recorder: Arc<dyn MessageRecorder>,
    port_policy: PortPolicy,
    buffer_size: usize,
    next_peer_id: AtomicU64,
    accepted: AtomicU64,
}

impl ProxyContext {
    pub fn new(dialer: Arc<dyn Dialer>, recorder: Arc<dyn MessageRecorder>) -> Self {
        Self {
            registry: PeerRegistry::new(),
            dialer,
            recorder,
            port_policy: PortPolicy::default(),
            buffer_size: DEFAULT_BUFFER_SIZE,
            next_peer_id: AtomicU64::new(1),
            accepted: AtomicU64::new(0),
        }
    }

    pub fn with_port_policy(mut self, port_policy: PortPolicy) -> Self {
        self.port_policy = port_policy;
        self
    }

    pub fn with_buffer_size(mut self, buffer_size: usize) -> Self {
        self.buffer_size = buffer_size;
        self
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn dialer(&self) -> &dyn Dialer {
        self.dialer.as_ref()
    }

    pub fn recorder(&self) -> &dyn MessageRecorder {
        self.recorder.as_ref()
    }

    pub fn port_policy(&self) -> &PortPolicy {
        &self.port_policy
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    pub fn next_peer_id(&self) -> PeerId {
        PeerId::new(self.next_peer_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Next `ClientN` label; numbering starts at 1 and never repeats.
    pub fn next_client_label(&self) -> String {
        format!("Client{}", self.accepted.fetch_add(1, Ordering::Relaxed) + 1)
    }

    pub fn accepted_total(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }
}

pub struct ForwardProxy {
    ctx: Arc<ProxyContext>,
    acceptor: ConnectionAcceptor,
}

impl ForwardProxy {
    pub fn from_config(config: Config) -> Result<Self, ProxyError> {
        config.validate()?;

        let recorder: Arc<dyn MessageRecorder> = match &config.audit_log {
            Some(path) => {
                info!("Recording exchanged messages to {}", path.display());
                Arc::new(FileAuditLog::open(path)?)
            }
            None => Arc::new(LogRecorder),
        };
        let dialer = TcpDialer::new(config.connect_timeout_secs.map(Duration::from_secs));
        debug!(
            "Forward proxy configuration - buffer_size: {}, allowed_ports: {:?}, connect_timeout: {:?}",
            config.buffer_size, config.allowed_ports, config.connect_timeout_secs
        );

        let ctx = ProxyContext::new(Arc::new(dialer), recorder)
            .with_port_policy(PortPolicy::new(config.allowed_ports.clone()))
            .with_buffer_size(config.buffer_size);

        let ctx = Arc::new(ctx);
        let acceptor = ConnectionAcceptor::new(config.listen_addr, config.backlog, ctx.clone());
        Ok(Self { ctx, acceptor })
    }

    pub fn context(&self) -> Arc<ProxyContext> {
        self.ctx.clone()
    }

    pub fn acceptor(&self) -> &ConnectionAcceptor {
        &self.acceptor
    }

    /// Listening address once bound; resolves an ephemeral port 0.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.acceptor.local_addr()
    }

    pub fn subscribe_local_addr(&self) -> watch::Receiver<Option<SocketAddr>> {
        self.acceptor.subscribe_local_addr()
    }

    /// Accepts clients until a fatal listener error.
    pub async fn run(&self) -> Result<(), ProxyError> {
        self.acceptor.run().await
    }
}
