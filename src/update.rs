// src/update.rs
//! Update processor: applies a received advertisement to the routing table.

use crate::error::RejectReason;
use crate::event::Event;
use crate::node::RouterContext;
use crate::packet::Advertisement;
use crate::routing::{INFINITY, Relaxation};

/// Result of processing one accepted advertisement.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub events: Vec<Event>,
    /// At least one route changed and should go out in a triggered update.
    pub trigger: bool,
    /// Pairs skipped: bad destination, out-of-range metric, our own id, or
    /// the sender's id.
    pub skipped: usize,
}

/// Apply `adv` to the context's routing table.
///
/// Messages from unknown senders (or carrying our own id) are rejected
/// without touching the table.
pub fn process(ctx: &mut RouterContext, adv: &Advertisement) -> Result<UpdateOutcome, RejectReason> {
    if adv.sender == ctx.router_id {
        return Err(RejectReason::OwnMessage);
    }
    let link_cost = match ctx.neighbors.get(adv.sender) {
        Some(n) => n.link_cost,
        None => return Err(RejectReason::UnknownSender(adv.sender)),
    };

    let mut outcome = UpdateOutcome {
        skipped: adv.invalid_destinations,
        ..UpdateOutcome::default()
    };

    if ctx.routes.upsert_neighbor_reachability(adv.sender, link_cost) {
        outcome.trigger = true;
        if let Some(entry) = ctx.routes.get(adv.sender) {
            outcome.events.push(Event::RouteChanged(entry.clone()));
        }
    }

    let expire = ctx.timers.expire_interval;
    for pair in &adv.entries {
        // the sender's own reachability comes from the link, not from its table
        if pair.metric > INFINITY || pair.destination == ctx.router_id || pair.destination == adv.sender {
            outcome.skipped += 1;
            continue;
        }

        let candidate = pair.metric.saturating_add(link_cost).min(INFINITY);
        let protected = ctx.neighbors.contains(pair.destination);
        let relaxation =
            ctx.routes
                .apply_learned_route(pair.destination, candidate, adv.sender, protected, expire);

        if !relaxation.is_change() {
            continue;
        }
        outcome.trigger = true;
        if let Some(entry) = ctx.routes.get(pair.destination) {
            let event = match relaxation {
                Relaxation::Unreachable => Event::RouteExpired(entry.clone()),
                _ => Event::RouteChanged(entry.clone()),
            };
            outcome.events.push(event);
        }
    }

    Ok(outcome)
}
