//! Multicast heartbeat protocol for detecting duplicate clonefinder
//! instances.
//!
//! Every running instance announces its presence to a multicast group once
//! per second and listens for the announcements of others. Peers are
//! identified purely by their UDP source endpoint; an endpoint that stops
//! announcing is evicted from the membership table and reported as offline.

mod config;
mod finder;
mod membership;
mod transport;

pub use config::{HeartbeatConfig, BUF_SIZE, RECV_PORT};
pub use finder::{CloneFinder, FinderError, PeerEvent};
pub use membership::Membership;
pub use transport::{MulticastGroup, Transport, TransportError};
