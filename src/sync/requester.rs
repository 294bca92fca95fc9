//! Sync requests
//!
//! After connecting, the watch asks every reachable companion node to push the
//! current weather. Requests are fire and forget: a failed send is logged and
//! the next connection tries again.

use embassy_sync::{blocking_mutex::raw::RawMutex, signal::Signal};
use heapless::Vec;

use super::protocol::REQUEST_SYNC_PATH;

pub type NodeId = u16;

pub const MAX_NODES: usize = 4;

pub type NodeList = Vec<NodeId, MAX_NODES>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError {
    /// Not connected to the node
    Disconnected,
    /// Outgoing queue is full
    Busy,
    /// Payload or path does not fit into a message
    TooLarge,
}

/// Messaging channel to the companion nodes.
#[allow(async_fn_in_trait)]
pub trait CompanionLink {
    /// Nodes currently reachable.
    async fn connected_nodes(&mut self) -> Result<NodeList, LinkError>;

    /// Send one message to `path` on `node`.
    async fn send_message(&mut self, node: NodeId, path: &str, payload: &[u8])
        -> Result<(), LinkError>;
}

/// Outcome of one broadcast.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BroadcastReport {
    pub sent: usize,
    pub failed: usize,
}

/// Send an empty sync request to every connected node.
pub async fn broadcast_sync_request<L: CompanionLink>(link: &mut L) -> BroadcastReport {
    let mut report = BroadcastReport::default();

    let nodes = match link.connected_nodes().await {
        Ok(nodes) => nodes,
        Err(e) => {
            warn!("Failed to list companion nodes: {:?}", e);
            return report;
        }
    };

    for node in nodes {
        match link.send_message(node, REQUEST_SYNC_PATH, &[]).await {
            Ok(()) => {
                debug!("Sync request sent to node {}", node);
                report.sent += 1;
            }
            Err(e) => {
                warn!("Sync request to node {} failed: {:?}", node, e);
                report.failed += 1;
            }
        }
    }

    report
}

/// Worker broadcasting a sync request each time it is woken.
pub struct SyncRequester<L> {
    link: L,
}

impl<L: CompanionLink> SyncRequester<L> {
    pub fn new(link: L) -> Self {
        Self { link }
    }

    /// Broadcast once per wake-up of `requests`.
    pub async fn serve<M: RawMutex>(&mut self, requests: &Signal<M, ()>) -> ! {
        loop {
            requests.wait().await;
            let report = self.run_once().await;
            info!(
                "Sync request broadcast: {} sent, {} failed",
                report.sent, report.failed
            );
        }
    }

    pub async fn run_once(&mut self) -> BroadcastReport {
        broadcast_sync_request(&mut self.link).await
    }
}
