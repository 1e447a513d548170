//! Listening socket and the accept loop.

use crate::error::{accept_action, AcceptAction, ProxyError};
use crate::peer::{Peer, PeerRole, Transport};
use crate::proxy::ProxyContext;
use crate::relay::spawn_peer_loop;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::watch;

pub const DEFAULT_BACKLOG: u32 = 100;

/// How `run` proceeds once `serve` has returned.
#[derive(Debug)]
enum ListenerExit {
    Rebind,
    Stop(Result<(), ProxyError>),
}

pub struct ConnectionAcceptor {
    addr: SocketAddr,
    backlog: u32,
    ctx: Arc<ProxyContext>,
    bound: watch::Sender<Option<SocketAddr>>,
}

impl ConnectionAcceptor {
    pub fn new(addr: SocketAddr, backlog: u32, ctx: Arc<ProxyContext>) -> Self {
        let (bound, _) = watch::channel(None);
        Self { addr, backlog, ctx, bound }
    }

    /// Address of the current listener; `None` until the first bind succeeds.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.bound.borrow()
    }

    /// Follows `local_addr` across rebinds.
    pub fn subscribe_local_addr(&self) -> watch::Receiver<Option<SocketAddr>> {
        self.bound.subscribe()
    }

    pub fn bind(&self) -> Result<TcpListener, ProxyError> {
        let socket = if self.addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(self.addr)?;
        Ok(socket.listen(self.backlog)?)
    }

    /// Binds, then accepts until a fatal error. An interrupted listener is
    /// dropped and the whole bind-and-listen cycle runs again.
    pub async fn run(&self) -> Result<(), ProxyError> {
        loop {
            let listener = self.bind()?;
            let local_addr = listener.local_addr()?;
            self.bound.send_replace(Some(local_addr));
            info!("Forward proxy listening on {}", local_addr);

            match self.after_serve(self.serve(listener).await) {
                ListenerExit::Rebind => continue,
                ListenerExit::Stop(result) => return result,
            }
        }
    }

    fn after_serve(&self, result: Result<(), ProxyError>) -> ListenerExit {
        match result {
            Err(e) if e.accept_action() == AcceptAction::Rebind => {
                warn!("Accept interrupted ({}), rebinding {}", e, self.addr);
                ListenerExit::Rebind
            }
            Err(e) => {
                error!("Accept failed on {}: {}", self.addr, e);
                ListenerExit::Stop(Err(e))
            }
            Ok(()) => ListenerExit::Stop(Ok(())),
        }
    }

    /// Accepts on an already bound listener. A failure confined to one
    /// pending connection is skipped; any other accept error is returned.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), ProxyError> {
        loop {
            let (stream, remote_addr) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) if accept_action(e.kind()) == AcceptAction::Continue => {
                    debug!("Dropped a pending connection: {}", e);
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            let client = admit(&self.ctx, Transport::from_tcp(stream));
            info!("{} connected from {}", client.label(), remote_addr);
        }
    }
}

/// Registers a new client connection unpaired and starts its handling loop
/// without waiting for it.
pub fn admit(ctx: &Arc<ProxyContext>, transport: Transport) -> Arc<Peer> {
    let client = Arc::new(Peer::new(
        ctx.next_peer_id(),
        ctx.next_client_label(),
        PeerRole::Client,
        transport.writer,
    ));
    ctx.registry().register(client.clone());
    debug!("Registered {} ({} peer(s) total)", client.label(), ctx.registry().count());

    spawn_peer_loop(ctx.clone(), client.clone(), transport.reader);
    client
}
