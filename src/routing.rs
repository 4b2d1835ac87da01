// src/routing.rs
//! Routing table for the distance-vector engine.
//!
//! One row per known destination, keyed by router id:
//! - metric in 0..=16, 16 meaning unreachable
//! - the neighbor the route was learned through
//! - a change flag consumed by triggered advertisements
//! - timeout and garbage-collection timers advanced by the aging sweep

use std::collections::BTreeMap;
use std::time::Duration;

/// Router identifier, 1..=64000.
pub type RouterId = u16;

/// Hop-count style metric.
pub type Metric = u8;

/// Metric denoting an unreachable destination.
pub const INFINITY: Metric = 16;

/// One route entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    pub destination: RouterId,
    pub metric: Metric,
    pub next_hop: RouterId,
    /// Set when metric or next hop changed since the last triggered advertisement.
    pub changed: bool,
    /// Time since the owning neighbor last refreshed this route.
    pub timeout: Duration,
    /// Time since the route became unreachable.
    pub garbage: Duration,
}

impl RouteEntry {
    pub fn new(destination: RouterId, metric: Metric, next_hop: RouterId) -> Self {
        RouteEntry {
            destination,
            metric: metric.min(INFINITY),
            next_hop,
            changed: false,
            timeout: Duration::ZERO,
            garbage: Duration::ZERO,
        }
    }

    pub fn is_reachable(&self) -> bool {
        self.metric < INFINITY
    }

    /// A route to a neighbor over the direct link to it.
    pub fn is_direct(&self) -> bool {
        self.destination == self.next_hop
    }

    fn reset_timers(&mut self) {
        self.timeout = Duration::ZERO;
        self.garbage = Duration::ZERO;
    }

    /// Flip to unreachable and start garbage collection.
    pub(crate) fn poison(&mut self, expire_interval: Duration) {
        self.metric = INFINITY;
        self.changed = true;
        self.timeout = self.timeout.max(expire_interval);
        self.garbage = Duration::ZERO;
    }
}

/// What a relaxation step did to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relaxation {
    /// No metric or next-hop change (timers may have been refreshed).
    Unchanged,
    /// A new destination was installed.
    Installed,
    /// Same next hop, different finite metric.
    MetricChanged,
    /// Moved to a strictly better next hop.
    Switched,
    /// The owning neighbor now advertises the destination as unreachable.
    Unreachable,
}

impl Relaxation {
    pub fn is_change(self) -> bool {
        self != Relaxation::Unchanged
    }
}

/// In-memory routing table, ordered by destination.
#[derive(Debug, Default, Clone)]
pub struct RoutingTable {
    routes: BTreeMap<RouterId, RouteEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        RoutingTable {
            routes: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn get(&self, destination: RouterId) -> Option<&RouteEntry> {
        self.routes.get(&destination)
    }

    /// Iterate routes in destination order.
    pub fn iter(&self) -> impl Iterator<Item = &RouteEntry> {
        self.routes.values()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut RouteEntry> {
        self.routes.values_mut()
    }

    pub(crate) fn remove(&mut self, destination: RouterId) -> Option<RouteEntry> {
        self.routes.remove(&destination)
    }

    /// Install the direct route to a configured neighbor at startup.
    pub fn seed_direct(&mut self, neighbor: RouterId, link_cost: Metric) {
        self.routes
            .insert(neighbor, RouteEntry::new(neighbor, link_cost, neighbor));
    }

    /// Record that a message was just received from `neighbor`.
    ///
    /// The direct route to the neighbor gets its timers reset and its metric
    /// set to `link_cost`. A route to the neighbor learned through someone
    /// else is only replaced when the direct link is strictly cheaper.
    /// Returns true when the metric or next hop changed.
    pub fn upsert_neighbor_reachability(&mut self, neighbor: RouterId, link_cost: Metric) -> bool {
        let link_cost = link_cost.min(INFINITY);
        match self.routes.get_mut(&neighbor) {
            None => {
                let mut entry = RouteEntry::new(neighbor, link_cost, neighbor);
                entry.changed = true;
                self.routes.insert(neighbor, entry);
                true
            }
            Some(entry) if entry.next_hop == neighbor => {
                entry.reset_timers();
                if entry.metric == link_cost {
                    false
                } else {
                    entry.metric = link_cost;
                    entry.changed = true;
                    true
                }
            }
            Some(entry) if link_cost < entry.metric => {
                entry.next_hop = neighbor;
                entry.metric = link_cost;
                entry.changed = true;
                entry.reset_timers();
                true
            }
            Some(_) => false,
        }
    }

    /// Distance-vector relaxation for one advertised destination.
    ///
    /// `candidate` already includes the link cost to `via`. A destination
    /// that is itself a configured neighbor is `protected`: it is never moved
    /// to a different next hop by a learned path.
    pub fn apply_learned_route(
        &mut self,
        destination: RouterId,
        candidate: Metric,
        via: RouterId,
        protected: bool,
        expire_interval: Duration,
    ) -> Relaxation {
        let candidate = candidate.min(INFINITY);
        match self.routes.get_mut(&destination) {
            None => {
                if candidate >= INFINITY {
                    return Relaxation::Unchanged;
                }
                let mut entry = RouteEntry::new(destination, candidate, via);
                entry.changed = true;
                self.routes.insert(destination, entry);
                Relaxation::Installed
            }
            Some(entry) if entry.next_hop == via => {
                entry.timeout = Duration::ZERO;
                if entry.metric == candidate {
                    return Relaxation::Unchanged;
                }
                if candidate >= INFINITY {
                    entry.poison(expire_interval);
                    Relaxation::Unreachable
                } else {
                    entry.metric = candidate;
                    entry.changed = true;
                    entry.garbage = Duration::ZERO;
                    Relaxation::MetricChanged
                }
            }
            Some(entry) if !protected && candidate < entry.metric => {
                entry.next_hop = via;
                entry.metric = candidate;
                entry.changed = true;
                entry.reset_timers();
                Relaxation::Switched
            }
            Some(_) => Relaxation::Unchanged,
        }
    }

    /// Poison every reachable route whose next hop is `neighbor`.
    /// Returns the affected destinations.
    pub fn mark_all_unreachable_for_neighbor(
        &mut self,
        neighbor: RouterId,
        expire_interval: Duration,
    ) -> Vec<RouterId> {
        let mut poisoned = Vec::new();
        for entry in self.routes.values_mut() {
            if entry.next_hop == neighbor && entry.is_reachable() {
                entry.poison(expire_interval);
                poisoned.push(entry.destination);
            }
        }
        poisoned
    }

    /// Copy of every route, in destination order. For diagnostics only.
    pub fn snapshot(&self) -> Vec<RouteEntry> {
        self.routes.values().cloned().collect()
    }

    /// Collect the routes flagged as changed and clear their flags.
    pub(crate) fn take_changed(&mut self) -> Vec<RouteEntry> {
        let mut out = Vec::new();
        for entry in self.routes.values_mut().filter(|e| e.changed) {
            out.push(entry.clone());
            entry.changed = false;
        }
        out
    }

    pub fn has_changes(&self) -> bool {
        self.routes.values().any(|e| e.changed)
    }
}
