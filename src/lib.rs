pub mod acceptor;
pub mod audit;
pub mod classifier;
pub mod config;
pub mod dialer;
pub mod error;
pub mod logging;
pub mod peer;
pub mod proxy;
pub mod registry;
pub mod relay;
pub mod resolver;
pub mod response;
pub mod shutdown;
pub mod tunnel;

pub use config::Config;
pub use error::ProxyError;
pub use proxy::{ForwardProxy, ProxyContext};
pub use registry::{PeerRegistry, TunnelState};
