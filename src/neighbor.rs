// src/neighbor.rs
//! Configured neighbors of this router.
//!
//! Neighbors are static: they come from the configuration and never change
//! while the router runs. Reachability lives in the routing table; this
//! module only records addressing, link cost and when we last heard from
//! each neighbor.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::time::Instant;

use crate::config::{LOCAL_HOST, RouterConfig};
use crate::routing::{Metric, RouterId};

/// One configured neighbor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborInfo {
    pub id: RouterId,
    /// Local address advertisements to this neighbor are sent from.
    pub local_addr: SocketAddr,
    /// Where advertisements to this neighbor are sent.
    pub remote_addr: SocketAddr,
    /// Cost charged for reaching this neighbor, at least 1.
    pub link_cost: Metric,
    /// Time of the last accepted message from this neighbor.
    pub last_heard: Option<Instant>,
}

/// Table of all configured neighbors, ordered by id.
#[derive(Debug, Default, Clone)]
pub struct NeighborTable {
    neighbors: BTreeMap<RouterId, NeighborInfo>,
}

impl NeighborTable {
    pub fn new() -> Self {
        NeighborTable {
            neighbors: BTreeMap::new(),
        }
    }

    /// Build from a validated config. Every neighbor is sent to from the
    /// first input port.
    pub fn from_config(config: &RouterConfig) -> Self {
        let send_port = config.input_ports.first().copied().unwrap_or_default();
        let local_addr = SocketAddr::from((LOCAL_HOST, send_port));

        let mut table = NeighborTable::new();
        for n in &config.neighbors {
            table.insert(NeighborInfo {
                id: n.id,
                local_addr,
                remote_addr: n.remote_addr(),
                link_cost: n.link_cost,
                last_heard: None,
            });
        }
        table
    }

    pub fn insert(&mut self, info: NeighborInfo) {
        self.neighbors.insert(info.id, info);
    }

    pub fn all(&self) -> impl Iterator<Item = &NeighborInfo> {
        self.neighbors.values()
    }

    pub fn get(&self, id: RouterId) -> Option<&NeighborInfo> {
        self.neighbors.get(&id)
    }

    pub fn contains(&self, id: RouterId) -> bool {
        self.neighbors.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.neighbors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.neighbors.is_empty()
    }

    /// Note that a message from `id` was accepted at `now`.
    pub fn note_heard(&mut self, id: RouterId, now: Instant) {
        if let Some(n) = self.neighbors.get_mut(&id) {
            n.last_heard = Some(now);
        }
    }
}
