//! Byte relay and the per-peer read loop.
//!
//! Every peer, client or origin, gets exactly one loop task. The loop owns the
//! read half of the peer's transport, so the transport is fully closed when the
//! loop returns. Reads for one peer are strictly sequential.

use crate::audit::format_event;
use crate::classifier::is_http_request;
use crate::error::ProxyError;
use crate::peer::{BoxedReader, Peer, PeerRole};
use crate::proxy::ProxyContext;
use crate::shutdown::graceful_shutdown;
use crate::tunnel::route_http;
use bytes::Bytes;
use log::{debug, info, trace, warn};
use std::sync::Arc;
use tokio::io::AsyncReadExt;
use tokio::task::JoinHandle;

/// Result of a single receive.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    Data(Bytes),
    /// Zero-length read: the remote end closed its side.
    Closed,
    /// The peer was shut down by someone else while we waited.
    Cancelled,
}

/// Sends `payload` verbatim to `destination`.
pub async fn relay(source: &Peer, destination: &Peer, payload: &[u8]) -> Result<(), ProxyError> {
    destination.send(payload).await?;
    trace!("Relayed {} bytes {} -> {}", payload.len(), source.label(), destination.label());
    Ok(())
}

pub async fn read_once(peer: &Peer, reader: &mut BoxedReader, buffer: &mut [u8]) -> Result<ReadOutcome, ProxyError> {
    let received = tokio::select! {
        result = reader.read(buffer) => result?,
        _ = peer.closed() => return Ok(ReadOutcome::Cancelled),
    };

    match received {
        0 => Ok(ReadOutcome::Closed),
        n => Ok(ReadOutcome::Data(Bytes::copy_from_slice(&buffer[..n]))),
    }
}

pub fn spawn_peer_loop(ctx: Arc<ProxyContext>, peer: Arc<Peer>, reader: BoxedReader) -> JoinHandle<()> {
    tokio::spawn(run_peer_loop(ctx, peer, reader))
}

pub async fn run_peer_loop(ctx: Arc<ProxyContext>, peer: Arc<Peer>, mut reader: BoxedReader) {
    let mut buffer = vec![0u8; ctx.buffer_size()];
    let registry = ctx.registry();

    loop {
        if !registry.contains(&peer) {
            debug!("{} is no longer registered, stopping", peer.label());
            peer.close().await;
            break;
        }

        match read_once(&peer, &mut reader, &mut buffer).await {
            Ok(ReadOutcome::Data(payload)) => match route(&ctx, &peer, payload).await {
                Ok(()) => {}
                Err(ProxyError::PeerClosed(label)) => {
                    debug!("{} stopping, {} is already closed", peer.label(), label);
                    peer.close().await;
                    break;
                }
                Err(e) => {
                    warn!("Tearing down {}: {}", peer.label(), e);
                    graceful_shutdown(registry, &peer).await;
                    break;
                }
            },
            Ok(ReadOutcome::Closed) => {
                info!("{} disconnected", peer.label());
                graceful_shutdown(registry, &peer).await;
                break;
            }
            Ok(ReadOutcome::Cancelled) => {
                debug!("{} was shut down", peer.label());
                registry.remove(&peer);
                break;
            }
            Err(e) => {
                warn!("Read from {} failed: {}", peer.label(), e);
                graceful_shutdown(registry, &peer).await;
                break;
            }
        }
    }

    debug!("Loop for {} finished, {} peer(s) registered", peer.label(), registry.count());
}

/// Dispatches one received payload. Only client payloads are classified; bytes
/// coming back from an origin always go to its client untouched.
async fn route(ctx: &Arc<ProxyContext>, peer: &Arc<Peer>, payload: Bytes) -> Result<(), ProxyError> {
    let text = String::from_utf8_lossy(&payload);
    let partner = ctx.registry().lookup_partner(peer);
    ctx.recorder()
        .record(&format_event(peer.label(), partner.as_ref().map(|p| p.label()), &text));

    if peer.role() == PeerRole::Client && is_http_request(&payload) {
        return route_http(ctx, peer, &payload, &text).await;
    }

    let partner = partner.ok_or_else(|| ProxyError::UnroutablePayload(peer.label().to_string()))?;
    relay(peer, &partner, &payload).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::{PeerId, Transport};
    use tokio::io::{duplex, AsyncWriteExt};

    #[tokio::test]
    async fn test_read_once_outcomes() {
        let (near, mut far) = duplex(64);
        let transport = Transport::split(near);
        let peer = Peer::new(PeerId::new(1), "Client1", PeerRole::Client, transport.writer);
        let mut reader = transport.reader;
        let mut buffer = [0u8; 8];

        far.write_all(b"abc").await.unwrap();
        assert_eq!(
            read_once(&peer, &mut reader, &mut buffer).await.unwrap(),
            ReadOutcome::Data(Bytes::from_static(b"abc"))
        );

        drop(far);
        assert_eq!(read_once(&peer, &mut reader, &mut buffer).await.unwrap(), ReadOutcome::Closed);
    }

    #[tokio::test]
    async fn test_read_once_wakes_on_close() {
        let (near, _far) = duplex(64);
        let transport = Transport::split(near);
        let peer = Peer::new(PeerId::new(1), "Client1", PeerRole::Client, transport.writer);
        let mut reader = transport.reader;
        let mut buffer = [0u8; 8];

        peer.close().await;
        assert_eq!(read_once(&peer, &mut reader, &mut buffer).await.unwrap(), ReadOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_read_is_bounded_by_buffer() {
        let (near, mut far) = duplex(64);
        let transport = Transport::split(near);
        let peer = Peer::new(PeerId::new(1), "Client1", PeerRole::Client, transport.writer);
        let mut reader = transport.reader;
        let mut buffer = [0u8; 4];

        far.write_all(b"0123456789").await.unwrap();
        match read_once(&peer, &mut reader, &mut buffer).await.unwrap() {
            ReadOutcome::Data(bytes) => assert!(bytes.len() <= 4),
            other => panic!("unexpected {:?}", other),
        }
    }
}
