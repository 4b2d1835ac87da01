// src/scheduler.rs
//! Advertisement scheduler.
//!
//! Builds outbound advertisements and keeps them in a FIFO queue that the
//! event loop drains one datagram per cycle:
//! - periodic: the whole table to every neighbor after each aging sweep
//! - triggered: only changed routes, rate limited by a randomized holddown
//!   and suppressed while earlier datagrams are still queued
//!
//! Tables larger than [`MAX_ENTRIES`] are split into several messages.

use std::collections::VecDeque;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SplitHorizon;
use crate::neighbor::NeighborInfo;
use crate::node::RouterContext;
use crate::packet::{Advertisement, MAX_ENTRIES, RouteAdvert};
use crate::routing::{INFINITY, RouteEntry, RouterId};

/// Source of randomized intervals.
pub trait Jitter {
    /// Holddown before the next triggered update may go out, in `min..=max`.
    fn holddown(&mut self, min: Duration, max: Duration) -> Duration;

    /// Startup offset for the update interval, in whole seconds within -1..=1.
    fn update_offset(&mut self) -> i64;
}

/// [`Jitter`] backed by a seedable PRNG.
#[derive(Debug, Clone)]
pub struct RandomJitter {
    rng: StdRng,
}

impl RandomJitter {
    /// Deterministic sequence for a given seed.
    pub fn seeded(seed: u64) -> Self {
        RandomJitter {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn from_os_rng() -> Self {
        RandomJitter {
            rng: StdRng::from_os_rng(),
        }
    }
}

impl Jitter for RandomJitter {
    fn holddown(&mut self, min: Duration, max: Duration) -> Duration {
        if max <= min {
            return min;
        }
        let ms = self.rng.random_range(min.as_millis() as u64..=max.as_millis() as u64);
        Duration::from_millis(ms)
    }

    fn update_offset(&mut self) -> i64 {
        self.rng.random_range(-1..=1)
    }
}

/// One datagram waiting to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub neighbor: RouterId,
    pub local_addr: SocketAddr,
    pub remote_addr: SocketAddr,
    pub advertisement: Advertisement,
}

/// Which routes one neighbor gets to see, and at what metric.
fn entries_for(routes: &[&RouteEntry], neighbor: RouterId, mode: SplitHorizon) -> Vec<RouteAdvert> {
    routes
        .iter()
        .filter_map(|r| {
            let learned_from_neighbor = r.next_hop == neighbor;
            let metric = match mode {
                SplitHorizon::Simple if learned_from_neighbor => return None,
                SplitHorizon::PoisonedReverse if learned_from_neighbor => INFINITY,
                _ => r.metric,
            };
            Some(RouteAdvert {
                destination: r.destination,
                metric,
            })
        })
        .collect()
}

/// Split `entries` into advertisements of at most [`MAX_ENTRIES`] entries.
pub fn segment(sender: RouterId, entries: Vec<RouteAdvert>) -> Vec<Advertisement> {
    entries
        .chunks(MAX_ENTRIES)
        .map(|chunk| Advertisement::with_entries(sender, chunk.to_vec()))
        .collect()
}

/// Outbound queue plus triggered-update state.
pub struct Scheduler<J: Jitter> {
    queue: VecDeque<OutboundMessage>,
    trigger_pending: bool,
    holddown_until: Option<Instant>,
    jitter: J,
}

impl<J: Jitter> Scheduler<J> {
    pub fn new(jitter: J) -> Self {
        Scheduler {
            queue: VecDeque::new(),
            trigger_pending: false,
            holddown_until: None,
            jitter,
        }
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn front(&self) -> Option<&OutboundMessage> {
        self.queue.front()
    }

    pub fn pop(&mut self) -> Option<OutboundMessage> {
        self.queue.pop_front()
    }

    pub fn trigger_pending(&self) -> bool {
        self.trigger_pending
    }

    pub fn holddown_until(&self) -> Option<Instant> {
        self.holddown_until
    }

    /// With `keepalive`, a neighbor whose filtered list is empty still gets
    /// a header-only message: it only learns we are alive from our datagrams.
    fn enqueue_for(
        &mut self,
        ctx: &RouterContext,
        routes: &[&RouteEntry],
        neighbor: &NeighborInfo,
        keepalive: bool,
    ) -> usize {
        let entries = entries_for(routes, neighbor.id, ctx.split_horizon);
        let segments = if entries.is_empty() {
            if !keepalive {
                return 0;
            }
            vec![Advertisement::new(ctx.router_id)]
        } else {
            segment(ctx.router_id, entries)
        };
        let count = segments.len();
        for advertisement in segments {
            self.queue.push_back(OutboundMessage {
                neighbor: neighbor.id,
                local_addr: neighbor.local_addr,
                remote_addr: neighbor.remote_addr,
                advertisement,
            });
        }
        count
    }

    /// Queue the full table for every neighbor. Returns the number of
    /// datagrams added.
    pub fn enqueue_periodic(&mut self, ctx: &RouterContext) -> usize {
        let routes: Vec<&RouteEntry> = ctx.routes.iter().collect();
        ctx.neighbors
            .all()
            .map(|n| self.enqueue_for(ctx, &routes, n, true))
            .sum()
    }

    /// Queue the full table for one neighbor.
    pub fn enqueue_full_to(&mut self, ctx: &RouterContext, neighbor: RouterId) -> usize {
        let Some(info) = ctx.neighbors.get(neighbor) else {
            return 0;
        };
        let routes: Vec<&RouteEntry> = ctx.routes.iter().collect();
        self.enqueue_for(ctx, &routes, info, true)
    }

    /// Ask for a triggered update at the next opportunity.
    pub fn request_triggered(&mut self) {
        self.trigger_pending = true;
    }

    /// Send changed routes if a trigger is pending, the holddown has passed
    /// and nothing else is queued. Clears the change flags of everything it
    /// packages. Returns the number of datagrams added.
    pub fn check_triggered(&mut self, ctx: &mut RouterContext, now: Instant) -> usize {
        if !self.trigger_pending || !self.queue.is_empty() {
            return 0;
        }
        if self.holddown_until.is_some_and(|until| now < until) {
            return 0;
        }

        self.trigger_pending = false;
        let changed = ctx.routes.take_changed();
        if changed.is_empty() {
            return 0;
        }

        let routes: Vec<&RouteEntry> = changed.iter().collect();
        let mut added = 0;
        for neighbor in ctx.neighbors.all() {
            added += self.enqueue_for(ctx, &routes, neighbor, false);
        }

        let timers = &ctx.timers;
        let holddown = self.jitter.holddown(timers.holddown_min, timers.holddown_max);
        self.holddown_until = Some(now + holddown);
        added
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RouterConfig;
    use crate::packet::Advertisement as Adv;
    use crate::update;

    /// Jitter with a fixed holddown.
    struct FixedJitter(Duration);

    impl Jitter for FixedJitter {
        fn holddown(&mut self, _min: Duration, _max: Duration) -> Duration {
            self.0
        }

        fn update_offset(&mut self) -> i64 {
            0
        }
    }

    fn ctx(outputs: &str) -> RouterContext {
        let cfg = RouterConfig::parse(&format!("router-id 1\ninput-ports 6001\noutputs {outputs}")).unwrap();
        RouterContext::new(&cfg)
    }

    fn learn(ctx: &mut RouterContext, sender: u16, pairs: &[(u16, u8)]) {
        let mut adv = Adv::new(sender);
        for &(d, m) in pairs {
            adv.push(d, m);
        }
        update::process(ctx, &adv).unwrap();
    }

    fn drain<J: Jitter>(s: &mut Scheduler<J>) -> Vec<OutboundMessage> {
        std::iter::from_fn(|| s.pop()).collect()
    }

    #[test]
    fn sixty_routes_split_into_three_segments() {
        let mut ctx = ctx("5002-1-2");
        // 59 learned routes plus the direct route to 2
        let pairs: Vec<(u16, u8)> = (100..159).map(|d| (d, 1)).collect();
        learn(&mut ctx, 2, &pairs);
        assert_eq!(ctx.routes.len(), 60);

        let mut s = Scheduler::new(FixedJitter(Duration::from_secs(1)));
        assert_eq!(s.enqueue_periodic(&ctx), 3);

        let sizes: Vec<usize> = drain(&mut s).iter().map(|m| m.advertisement.len()).collect();
        assert_eq!(sizes, vec![25, 25, 10]);
    }

    #[test]
    fn periodic_goes_to_every_neighbor_with_stored_metrics() {
        let mut ctx = ctx("5002-1-2, 5003-2-3");
        learn(&mut ctx, 2, &[(5, 3)]);

        let mut s = Scheduler::new(FixedJitter(Duration::from_secs(1)));
        assert_eq!(s.enqueue_periodic(&ctx), 2);

        let msgs = drain(&mut s);
        assert_eq!(msgs[0].neighbor, 2);
        assert_eq!(msgs[0].remote_addr, "127.0.0.1:5002".parse().unwrap());
        assert_eq!(msgs[1].neighbor, 3);
        let entries = &msgs[1].advertisement.entries;
        assert!(entries.contains(&RouteAdvert {
            destination: 5,
            metric: 4
        }));
        assert_eq!(msgs[1].advertisement.sender, 1);
    }

    #[test]
    fn periodic_does_not_clear_change_flags() {
        let mut ctx = ctx("5002-1-2");
        learn(&mut ctx, 2, &[(5, 3)]);
        let mut s = Scheduler::new(FixedJitter(Duration::from_secs(1)));
        s.enqueue_periodic(&ctx);
        assert!(ctx.routes.get(5).unwrap().changed);
    }

    #[test]
    fn split_horizon_modes() {
        let mut ctx = ctx("5002-1-2, 5003-1-3");
        learn(&mut ctx, 2, &[(5, 3)]);
        let mut s = Scheduler::new(FixedJitter(Duration::from_secs(1)));

        ctx.split_horizon = SplitHorizon::Simple;
        s.enqueue_full_to(&ctx, 2);
        let to_two = s.pop().unwrap().advertisement;
        assert!(to_two.entries.iter().all(|e| e.destination != 5 && e.destination != 2));

        ctx.split_horizon = SplitHorizon::PoisonedReverse;
        s.enqueue_full_to(&ctx, 2);
        let to_two = s.pop().unwrap().advertisement;
        assert!(to_two.entries.contains(&RouteAdvert {
            destination: 5,
            metric: INFINITY
        }));

        ctx.split_horizon = SplitHorizon::None;
        s.enqueue_full_to(&ctx, 2);
        let to_two = s.pop().unwrap().advertisement;
        assert!(to_two.entries.contains(&RouteAdvert {
            destination: 5,
            metric: 4
        }));
    }

    #[test]
    fn simple_split_horizon_still_reaches_sole_neighbor() {
        let mut ctx = ctx("5002-1-2");
        ctx.split_horizon = SplitHorizon::Simple;
        learn(&mut ctx, 2, &[(5, 3)]);

        // every route goes through 2, so 2 gets an empty message
        let mut s = Scheduler::new(FixedJitter(Duration::from_secs(1)));
        assert_eq!(s.enqueue_periodic(&ctx), 1);
        let msg = s.pop().unwrap();
        assert_eq!(msg.neighbor, 2);
        assert!(msg.advertisement.is_empty());
        assert_eq!(msg.advertisement.sender, 1);

        // triggered updates carry no keepalive
        s.request_triggered();
        assert_eq!(s.check_triggered(&mut ctx, Instant::now()), 0);
        assert!(!ctx.routes.has_changes());
    }

    #[test]
    fn triggered_sends_only_changed_and_clears_flags() {
        let mut ctx = ctx("5002-1-2");
        learn(&mut ctx, 2, &[(5, 3)]);
        let mut s = Scheduler::new(FixedJitter(Duration::from_secs(3)));
        s.request_triggered();

        let now = Instant::now();
        assert_eq!(s.check_triggered(&mut ctx, now), 1);
        let msg = s.pop().unwrap();
        assert_eq!(
            msg.advertisement.entries,
            vec![RouteAdvert {
                destination: 5,
                metric: 4
            }]
        );
        assert!(!ctx.routes.has_changes());
        assert_eq!(s.holddown_until(), Some(now + Duration::from_secs(3)));
    }

    #[test]
    fn triggered_waits_for_queue_to_drain() {
        let mut ctx = ctx("5002-1-2");
        learn(&mut ctx, 2, &[(5, 3)]);
        let mut s = Scheduler::new(FixedJitter(Duration::from_secs(1)));
        s.enqueue_periodic(&ctx);
        s.request_triggered();

        let now = Instant::now();
        assert_eq!(s.check_triggered(&mut ctx, now), 0);
        assert!(s.trigger_pending());
        assert!(ctx.routes.has_changes());

        drain(&mut s);
        assert_eq!(s.check_triggered(&mut ctx, now), 1);
    }

    #[test]
    fn changes_within_holddown_coalesce_into_one_update() {
        let mut ctx = ctx("5002-1-2");
        let mut s = Scheduler::new(FixedJitter(Duration::from_secs(4)));
        let t0 = Instant::now();

        learn(&mut ctx, 2, &[(5, 3)]);
        s.request_triggered();
        assert_eq!(s.check_triggered(&mut ctx, t0), 1);
        drain(&mut s);

        learn(&mut ctx, 2, &[(5, 3), (6, 1)]);
        s.request_triggered();
        assert_eq!(s.check_triggered(&mut ctx, t0 + Duration::from_secs(1)), 0);

        learn(&mut ctx, 2, &[(5, 3), (6, 1), (7, 2)]);
        s.request_triggered();
        assert_eq!(s.check_triggered(&mut ctx, t0 + Duration::from_secs(2)), 0);

        assert_eq!(s.check_triggered(&mut ctx, t0 + Duration::from_secs(4)), 1);
        let msgs = drain(&mut s);
        assert_eq!(msgs.len(), 1);
        let dests: Vec<_> = msgs[0].advertisement.entries.iter().map(|e| e.destination).collect();
        assert_eq!(dests, vec![6, 7]);
    }

    #[test]
    fn trigger_without_changes_is_dropped() {
        let mut ctx = ctx("5002-1-2");
        let mut s = Scheduler::new(FixedJitter(Duration::from_secs(1)));
        s.request_triggered();
        assert_eq!(s.check_triggered(&mut ctx, Instant::now()), 0);
        assert!(!s.trigger_pending());
        assert!(s.holddown_until().is_none());
    }

    #[test]
    fn seeded_jitter_is_deterministic_and_bounded() {
        let min = Duration::from_secs(1);
        let max = Duration::from_secs(5);
        let mut a = RandomJitter::seeded(7);
        let mut b = RandomJitter::seeded(7);
        for _ in 0..50 {
            let h = a.holddown(min, max);
            assert_eq!(h, b.holddown(min, max));
            assert!(h >= min && h <= max);
            let o = a.update_offset();
            assert_eq!(o, b.update_offset());
            assert!((-1..=1).contains(&o));
        }
    }

    #[test]
    fn segment_keeps_order() {
        let entries: Vec<RouteAdvert> = (1..=30)
            .map(|d| RouteAdvert {
                destination: d,
                metric: 1,
            })
            .collect();
        let segs = segment(4, entries);
        assert_eq!(segs.len(), 2);
        assert_eq!(segs[0].entries[0].destination, 1);
        assert_eq!(segs[1].entries[0].destination, 26);
        assert!(segs.iter().all(|s| s.sender == 4));
    }
}
