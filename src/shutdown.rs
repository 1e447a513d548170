use crate::peer::Peer;
use crate::registry::PeerRegistry;
use log::debug;
use std::sync::Arc;

/// Tears down `peer` and, if still paired, its partner.
///
/// The pairing is taken out of the registry first so a concurrent re-pair
/// can never hand us a partner that has already moved on. Closing an already
/// closed transport is a no-op. Returns how many transports this call closed.
pub async fn graceful_shutdown(registry: &PeerRegistry, peer: &Arc<Peer>) -> usize {
    let removed = registry.remove(peer);

    let mut closed = 0;
    if peer.close().await {
        closed += 1;
    }
    for other in removed.iter().filter(|other| other.id() != peer.id()) {
        if other.close().await {
            closed += 1;
        }
    }

    debug!(
        "Shut down {} ({} transport(s) closed, {} peer(s) still registered)",
        peer.label(),
        closed,
        registry.count()
    );
    closed
}
