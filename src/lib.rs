//! Distance-vector (RIP-style) routing engine.
//!
//! A router keeps a [`RoutingTable`] built from neighbor advertisements,
//! ages out routes its neighbors stop announcing, and re-advertises its
//! table periodically and whenever a route changes. [`RipNode`] drives all
//! of it from a single-threaded event loop over a pluggable [`Transport`].

pub mod aging;
pub mod config;
pub mod error;
pub mod event;
pub mod neighbor;
pub mod node;
pub mod packet;
pub mod routing;
pub mod scheduler;
pub mod transport;
pub mod update;

pub use config::{NeighborConfig, ProtocolTimers, RouterConfig, SplitHorizon};
pub use error::{ConfigError, DecodeError, RejectReason};
pub use event::Event;
pub use neighbor::{NeighborInfo, NeighborTable};
pub use node::{PollReport, RipNode, RouterContext};
pub use packet::{Advertisement, RouteAdvert};
pub use routing::{INFINITY, Metric, RouteEntry, RouterId, RoutingTable};
pub use scheduler::{Jitter, RandomJitter, Scheduler};
pub use transport::{Transport, UdpTransport};
