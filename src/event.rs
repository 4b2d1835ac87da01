// src/event.rs
//! Diagnostics emitted by the routing engine.
//!
//! The engine never formats text; applications drain these events and
//! decide how to log or display them.

use crate::error::RejectReason;
use crate::routing::{RouteEntry, RouterId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A route was installed, or its metric or next hop changed.
    RouteChanged(RouteEntry),

    /// A route timed out or was poisoned and is now unreachable.
    RouteExpired(RouteEntry),

    /// An unreachable route was garbage-collected.
    RouteRemoved(RouterId),

    /// The direct route to a neighbor timed out.
    NeighborUnreachable(RouterId),

    /// An inbound message was dropped.
    MessageRejected { reason: RejectReason },
}
