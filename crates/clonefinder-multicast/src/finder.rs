//! The heartbeat announce and listen loops.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, info, trace};

use crate::config::{HeartbeatConfig, BUF_SIZE};
use crate::membership::Membership;
use crate::transport::{MulticastGroup, Transport, TransportError};

/// Event emitted when the set of live clones changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    /// A previously unknown endpoint sent its first heartbeat.
    Joined(SocketAddr),
    /// An endpoint stopped sending heartbeats and was evicted.
    Left(SocketAddr),
}

/// Errors that can occur when starting the finder.
#[derive(Debug, thiserror::Error)]
pub enum FinderError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("clone detection already started")]
    AlreadyStarted,
}

/// Clone detection module.
///
/// Announces our own presence to the multicast group once per interval and
/// tracks every endpoint doing the same, reporting joins and evictions over
/// the event channel.
pub struct CloneFinder {
    /// Configuration.
    config: HeartbeatConfig,
    /// Running state, shared by both loops.
    running: AtomicBool,
    /// Channel for membership change events.
    event_tx: mpsc::UnboundedSender<PeerEvent>,
}

/// Per-datagram bookkeeping for the listen loop: the membership table plus
/// the datagram-gated sweep cadence.
struct ListenerState {
    membership: Membership,
    check_interval_ms: u64,
    last_sweep: u64,
}

impl ListenerState {
    fn new(config: &HeartbeatConfig) -> Self {
        Self {
            membership: Membership::new(config.offline_timeout),
            check_interval_ms: config.check_interval.as_millis() as u64,
            last_sweep: 0,
        }
    }

    /// Process one heartbeat from `peer` at `now_ms`, returning the
    /// resulting membership events.
    ///
    /// The expiry sweep runs here, and only here: eviction is gated on
    /// datagram arrival, so with no traffic at all stale entries stay until
    /// the next heartbeat from anyone.
    fn on_heartbeat(&mut self, peer: SocketAddr, now_ms: u64) -> Vec<PeerEvent> {
        let mut events = Vec::new();

        if self.membership.observe(peer, now_ms) {
            events.push(PeerEvent::Joined(peer));
        }

        if now_ms - self.last_sweep >= self.check_interval_ms {
            events.extend(
                self.membership
                    .sweep(now_ms)
                    .into_iter()
                    .map(PeerEvent::Left),
            );
            self.last_sweep = now_ms;
        }

        events
    }
}

impl CloneFinder {
    /// Create a new finder. Returns the finder and the receiving end of the
    /// event channel.
    pub fn new(config: HeartbeatConfig) -> (Self, mpsc::UnboundedReceiver<PeerEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        (
            Self {
                config,
                running: AtomicBool::new(false),
                event_tx,
            },
            event_rx,
        )
    }

    /// Start the announce and listen loops.
    ///
    /// Fails if the group address is invalid or the sockets cannot be set
    /// up; both are unrecoverable for the caller.
    pub async fn start(self: Arc<Self>) -> Result<(), FinderError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(FinderError::AlreadyStarted);
        }

        let group = MulticastGroup::parse(&self.config.group_addr)?;
        let Transport { recv, send, dest } = Transport::open(group, self.config.port)?;

        info!(group = %dest, family = group.family(), "starting clone detection");

        let self_clone = self.clone();
        tokio::spawn(async move {
            self_clone.listen_loop(recv).await;
        });

        let self_clone = self.clone();
        tokio::spawn(async move {
            self_clone.announce_loop(send, dest).await;
        });

        Ok(())
    }

    /// Stop both loops. Each loop notices within about a second.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        info!("stopped clone detection");
    }

    /// Check if the finder is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Announce our presence with a fixed-size heartbeat once per interval.
    async fn announce_loop(self: Arc<Self>, socket: UdpSocket, dest: SocketAddr) {
        let payload = [0u8; BUF_SIZE];

        while self.is_running() {
            // Best effort: a failed send is indistinguishable from a lost
            // packet, and the next scheduled attempt is the retry.
            if let Err(e) = socket.send_to(&payload, dest).await {
                trace!("failed to send heartbeat: {}", e);
            }

            tokio::time::sleep(self.config.announce_interval).await;
        }

        debug!("announce loop stopped");
    }

    /// Receive heartbeats and maintain the membership table.
    async fn listen_loop(self: Arc<Self>, socket: UdpSocket) {
        let mut buf = [0u8; 64];
        let mut state = ListenerState::new(&self.config);
        let started = Instant::now();

        while self.is_running() {
            // Wait for incoming heartbeats with a timeout so the running
            // flag is re-checked even when the segment is quiet. The timeout
            // deliberately does not run a sweep; see ListenerState.
            let recv_result =
                tokio::time::timeout(Duration::from_secs(1), socket.recv_from(&mut buf)).await;

            let peer = match recv_result {
                Ok(Ok((_, from))) => from,
                Ok(Err(e)) => {
                    trace!("receive error: {}", e);
                    continue;
                }
                Err(_) => continue,
            };

            let now = started.elapsed().as_millis() as u64;

            for event in state.on_heartbeat(peer, now) {
                match event {
                    PeerEvent::Joined(peer) => debug!(%peer, "new clone detected"),
                    PeerEvent::Left(peer) => debug!(%peer, "clone went offline"),
                }
                let _ = self.event_tx.send(event);
            }
        }

        debug!("listen loop stopped");
    }
}

impl Drop for CloneFinder {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
