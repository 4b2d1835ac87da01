// src/aging.rs
//! Aging sweep: advances route timers, expires silent routes and
//! garbage-collects unreachable ones.
//!
//! Two timers per route:
//! - `timeout` counts silence from the owning neighbor; reaching the expire
//!   interval makes the route unreachable
//! - `garbage` counts time spent unreachable; exceeding the garbage interval
//!   deletes the route, giving neighbors time to hear about it first

use std::time::Duration;

use crate::event::Event;
use crate::node::RouterContext;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepOutcome {
    pub events: Vec<Event>,
    /// Some route became unreachable.
    pub trigger: bool,
    /// The table is non-empty and a full advertisement should follow.
    pub periodic: bool,
}

/// Advance every route by `elapsed` and apply expiry and deletion.
pub fn sweep(ctx: &mut RouterContext, elapsed: Duration) -> SweepOutcome {
    let expire = ctx.timers.expire_interval;
    let garbage = ctx.timers.garbage_interval;

    let mut outcome = SweepOutcome::default();
    let mut doomed = Vec::new();
    let mut lost = Vec::new();

    for entry in ctx.routes.iter_mut() {
        entry.timeout = entry.timeout.saturating_add(elapsed);

        if entry.is_reachable() {
            if entry.timeout >= expire {
                entry.poison(expire);
                outcome.trigger = true;
                outcome.events.push(Event::RouteExpired(entry.clone()));
                if entry.is_direct() && ctx.neighbors.contains(entry.destination) {
                    lost.push(entry.destination);
                }
            }
        } else {
            entry.garbage = entry.garbage.saturating_add(elapsed);
            if entry.garbage > garbage {
                doomed.push(entry.destination);
            }
        }
    }

    for destination in doomed {
        if ctx.routes.remove(destination).is_some() {
            outcome.events.push(Event::RouteRemoved(destination));
        }
    }

    for neighbor in lost {
        outcome.events.push(Event::NeighborUnreachable(neighbor));
        for destination in ctx.routes.mark_all_unreachable_for_neighbor(neighbor, expire) {
            if let Some(entry) = ctx.routes.get(destination) {
                outcome.events.push(Event::RouteExpired(entry.clone()));
            }
        }
    }

    outcome.periodic = !ctx.routes.is_empty();
    outcome
}
