//! Routing of plaintext HTTP requests: reuse an existing pairing, or dial the
//! origin, pair it with the client and answer CONNECT with a status line.

use crate::classifier::is_connect_request;
use crate::error::ProxyError;
use crate::peer::{Peer, PeerRole};
use crate::proxy::ProxyContext;
use crate::relay::{relay, spawn_peer_loop};
use crate::resolver::{resolve, Destination};
use crate::response::StatusReply;
use crate::shutdown::graceful_shutdown;
use log::{debug, info, warn};
use std::sync::Arc;

/// Destination ports the proxy will dial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortPolicy {
    allowed: Vec<u16>,
}

impl PortPolicy {
    pub fn new(allowed: Vec<u16>) -> Self {
        Self { allowed }
    }

    pub fn allows(&self, port: u16) -> bool {
        self.allowed.contains(&port)
    }

    pub fn check(&self, port: u16) -> Result<(), ProxyError> {
        if self.allows(port) {
            Ok(())
        } else {
            Err(ProxyError::ForbiddenPort(port))
        }
    }
}

impl Default for PortPolicy {
    fn default() -> Self {
        Self::new(vec![80, 443])
    }
}

/// Handles one HTTP request read from `client`.
///
/// Routing failures that have a status line (403/502) are answered here and
/// return `Ok`; any other error is returned for the caller's loop to act on.
pub async fn route_http(
    ctx: &Arc<ProxyContext>,
    client: &Arc<Peer>,
    payload: &[u8],
    text: &str,
) -> Result<(), ProxyError> {
    let connect = is_connect_request(text);

    let destination = match resolve(text) {
        Ok(destination) => destination,
        Err(e) => return answer_failure(client, e).await,
    };

    if let Some(partner) = ctx
        .registry()
        .lookup_partner(client)
        .filter(|partner| partner.label() == destination.host_port)
    {
        if connect {
            debug!("{} already tunnelled to {}, confirming", client.label(), partner.label());
            return reply(client, StatusReply::Ok).await;
        }
        return relay(client, &partner, payload).await;
    }

    let request = if connect { None } else { Some(payload) };
    match open_tunnel(ctx, client, &destination, request).await {
        Ok(_) if connect => reply(client, StatusReply::Ok).await,
        Ok(_) => Ok(()),
        Err(e) => answer_failure(client, e).await,
    }
}

/// Dials `destination`, pairs the new origin with `client`, forwards
/// `request` (plain HTTP) and starts the origin's read loop.
pub async fn open_tunnel(
    ctx: &Arc<ProxyContext>,
    client: &Arc<Peer>,
    destination: &Destination,
    request: Option<&[u8]>,
) -> Result<Arc<Peer>, ProxyError> {
    ctx.port_policy().check(destination.port)?;

    let registry = ctx.registry();
    if !registry.begin_dial(client) {
        return Err(ProxyError::PeerClosed(client.label().to_string()));
    }

    let transport = match ctx.dialer().dial(&destination.host, destination.port).await {
        Ok(transport) => transport,
        Err(source) => {
            registry.abort_dial(client);
            return Err(ProxyError::Dial {
                host_port: destination.host_port.clone(),
                source,
            });
        }
    };

    let origin = Arc::new(Peer::new(
        ctx.next_peer_id(),
        destination.host_port.clone(),
        PeerRole::Origin,
        transport.writer,
    ));

    // The client may have been torn down by its old partner while we dialed.
    let displaced = match registry.pair(client, &origin) {
        Ok(displaced) => displaced,
        Err(e) => {
            origin.close().await;
            return Err(e);
        }
    };
    info!("Paired {} with {}", client.label(), origin.label());

    for old in displaced {
        debug!("{} replaced {} for {}", origin.label(), old.label(), client.label());
        graceful_shutdown(registry, &old).await;
    }

    spawn_peer_loop(ctx.clone(), origin.clone(), transport.reader);

    if let Some(request) = request {
        relay(client, &origin, request).await?;
    }

    Ok(origin)
}

async fn answer_failure(client: &Peer, error: ProxyError) -> Result<(), ProxyError> {
    match error.status_reply() {
        Some(status) => {
            warn!("Replying {} to {}: {}", status, client.label(), error);
            reply(client, status).await
        }
        None => Err(error),
    }
}

async fn reply(client: &Peer, status: StatusReply) -> Result<(), ProxyError> {
    client.send(status.as_bytes()).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_allows_web_ports_only() {
        let policy = PortPolicy::default();
        assert!(policy.allows(80));
        assert!(policy.allows(443));
        assert!(!policy.allows(8080));
        assert!(matches!(policy.check(22), Err(ProxyError::ForbiddenPort(22))));
    }

    #[test]
    fn test_custom_policy() {
        let policy = PortPolicy::new(vec![8443]);
        assert!(policy.check(8443).is_ok());
        assert!(policy.check(443).is_err());
    }
}
