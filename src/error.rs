use crate::response::StatusReply;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Bad port in Host header: {0}")]
    BadPort(String),

    #[error("Could not resolve a destination host")]
    UnresolvedHost,

    #[error("Port {0} is not allowed")]
    ForbiddenPort(u16),

    #[error("Failed to connect to {host_port}: {source}")]
    Dial {
        host_port: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Opaque payload from {0} has no paired peer")]
    UnroutablePayload(String),

    #[error("Peer {0} is already closed")]
    PeerClosed(String),

    #[error("Peer {0} cannot be paired with itself")]
    SelfPairing(String),
}

/// What the accept loop does after `accept` fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcceptAction {
    /// One pending connection failed; keep accepting on the same listener.
    Continue,
    /// The listener itself was interrupted; bind and listen again.
    Rebind,
    Fatal,
}

impl ProxyError {
    /// The status line a client sees for this failure, if any.
    pub fn status_reply(&self) -> Option<StatusReply> {
        match self {
            ProxyError::ForbiddenPort(_) | ProxyError::UnresolvedHost => Some(StatusReply::Forbidden),
            ProxyError::BadPort(_) | ProxyError::Dial { .. } => Some(StatusReply::BadGateway),
            _ => None,
        }
    }

    pub fn accept_action(&self) -> AcceptAction {
        match self {
            ProxyError::Io(e) => accept_action(e.kind()),
            _ => AcceptAction::Fatal,
        }
    }

    /// Accept failures where the listening socket was interrupted rather than destroyed.
    pub fn is_transient_accept(&self) -> bool {
        self.accept_action() == AcceptAction::Rebind
    }
}

pub fn accept_action(kind: io::ErrorKind) -> AcceptAction {
    match kind {
        io::ErrorKind::Interrupted => AcceptAction::Rebind,
        io::ErrorKind::ConnectionAborted | io::ErrorKind::ConnectionReset | io::ErrorKind::WouldBlock => {
            AcceptAction::Continue
        }
        _ => AcceptAction::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_failures_map_to_status_lines() {
        assert_eq!(ProxyError::ForbiddenPort(8443).status_reply(), Some(StatusReply::Forbidden));
        assert_eq!(ProxyError::UnresolvedHost.status_reply(), Some(StatusReply::Forbidden));
        assert_eq!(
            ProxyError::BadPort("abc".to_string()).status_reply(),
            Some(StatusReply::BadGateway)
        );
        let dial = ProxyError::Dial {
            host_port: "example.com:80".to_string(),
            source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(dial.status_reply(), Some(StatusReply::BadGateway));
        assert_eq!(ProxyError::UnroutablePayload("Client1".to_string()).status_reply(), None);
        assert_eq!(ProxyError::SelfPairing("Client1".to_string()).status_reply(), None);
    }

    #[test]
    fn test_accept_error_classification() {
        let interrupted = ProxyError::Io(io::Error::from(io::ErrorKind::Interrupted));
        assert!(interrupted.is_transient_accept());
        assert_eq!(interrupted.accept_action(), AcceptAction::Rebind);

        // A connection that died in the backlog must not cost the listener.
        let aborted = ProxyError::Io(io::Error::from(io::ErrorKind::ConnectionAborted));
        assert_eq!(aborted.accept_action(), AcceptAction::Continue);
        assert!(!aborted.is_transient_accept());
        assert_eq!(accept_action(io::ErrorKind::ConnectionReset), AcceptAction::Continue);

        let denied = ProxyError::Io(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(!denied.is_transient_accept());
        assert_eq!(denied.accept_action(), AcceptAction::Fatal);

        assert_eq!(ProxyError::Config("bad".to_string()).accept_action(), AcceptAction::Fatal);
    }
}
