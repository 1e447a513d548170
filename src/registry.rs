//! Concurrency-safe pairing table between client and origin peers.
//!
//! The association is held here by `PeerId`, symmetric in both directions,
//! so either side finds its partner with one map lookup. All mutations take
//! the single write lock, which makes `pair` and `remove` atomic for readers.
//! The registry never closes a transport; it only drops bookkeeping.

use crate::error::ProxyError;
use crate::peer::{Peer, PeerId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Per-client tunnel lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Unpaired,
    Dialing,
    Paired,
    Closed,
}

struct Entry {
    peer: Arc<Peer>,
    partner: Option<PeerId>,
    dialing: bool,
}

impl Entry {
    fn new(peer: Arc<Peer>) -> Self {
        Self { peer, partner: None, dialing: false }
    }
}

#[derive(Default)]
pub struct PeerRegistry {
    entries: RwLock<HashMap<PeerId, Entry>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<PeerId, Entry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<PeerId, Entry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `peer` unpaired. Returns false if it was already registered.
    pub fn register(&self, peer: Arc<Peer>) -> bool {
        let mut entries = self.write();
        if entries.contains_key(&peer.id()) {
            return false;
        }
        entries.insert(peer.id(), Entry::new(peer));
        true
    }

    /// Pairs `a` with `b`, registering `b` if needed. `a` must already be
    /// registered. Any previous partner of either side is unlinked and
    /// returned so the caller can tear it down. Pairing the same two peers
    /// again is a no-op.
    pub fn pair(&self, a: &Arc<Peer>, b: &Arc<Peer>) -> Result<Vec<Arc<Peer>>, ProxyError> {
        if a.id() == b.id() {
            return Err(ProxyError::SelfPairing(a.label().to_string()));
        }

        let mut entries = self.write();
        if !entries.contains_key(&a.id()) {
            return Err(ProxyError::PeerClosed(a.label().to_string()));
        }
        entries.entry(b.id()).or_insert_with(|| Entry::new(b.clone()));

        let mut displaced = Vec::new();
        for (side, other) in [(a.id(), b.id()), (b.id(), a.id())] {
            let previous = entries.get(&side).and_then(|entry| entry.partner);
            if let Some(previous) = previous.filter(|previous| *previous != other) {
                if let Some(old) = entries.get_mut(&previous) {
                    old.partner = None;
                    displaced.push(old.peer.clone());
                }
            }
            if let Some(entry) = entries.get_mut(&side) {
                entry.partner = Some(other);
                entry.dialing = false;
            }
        }

        Ok(displaced)
    }

    pub fn lookup_partner(&self, peer: &Peer) -> Option<Arc<Peer>> {
        let entries = self.read();
        let partner = entries.get(&peer.id())?.partner?;
        entries.get(&partner).map(|entry| entry.peer.clone())
    }

    /// Removes `peer` and its partner in one step. Returns what was removed;
    /// a second call for the same peer returns nothing.
    pub fn remove(&self, peer: &Peer) -> Vec<Arc<Peer>> {
        let mut entries = self.write();
        let Some(entry) = entries.remove(&peer.id()) else {
            return Vec::new();
        };

        let mut removed = vec![entry.peer];
        if let Some(partner) = entry.partner.and_then(|id| entries.remove(&id)) {
            removed.push(partner.peer);
        }
        removed
    }

    pub fn count(&self) -> usize {
        self.read().len()
    }

    pub fn contains(&self, peer: &Peer) -> bool {
        self.read().contains_key(&peer.id())
    }

    pub fn state(&self, peer: &Peer) -> TunnelState {
        match self.read().get(&peer.id()) {
            None => TunnelState::Closed,
            Some(entry) if entry.dialing => TunnelState::Dialing,
            Some(entry) if entry.partner.is_some() => TunnelState::Paired,
            Some(_) => TunnelState::Unpaired,
        }
    }

    /// Marks an outbound dial in progress. False if the peer is gone.
    pub fn begin_dial(&self, peer: &Peer) -> bool {
        match self.write().get_mut(&peer.id()) {
            Some(entry) => {
                entry.dialing = true;
                true
            }
            None => false,
        }
    }

    /// Clears the dialing mark after a failed dial; an existing pairing is kept.
    pub fn abort_dial(&self, peer: &Peer) {
        if let Some(entry) = self.write().get_mut(&peer.id()) {
            entry.dialing = false;
        }
    }

    /// `(label, partner label)` for every registered peer, ordered by id.
    pub fn snapshot(&self) -> Vec<(String, Option<String>)> {
        let entries = self.read();
        let mut rows: Vec<_> = entries
            .iter()
            .map(|(id, entry)| {
                let partner = entry
                    .partner
                    .and_then(|partner| entries.get(&partner))
                    .map(|partner| partner.peer.label().to_string());
                (*id, entry.peer.label().to_string(), partner)
            })
            .collect();
        rows.sort_by_key(|(id, _, _)| *id);
        rows.into_iter().map(|(_, label, partner)| (label, partner)).collect()
    }
}
