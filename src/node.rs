// src/node.rs
//! Router node: owns the routing state and drives it from a single
//! cooperative event loop.
//!
//! Each cycle receives at most one datagram, sends at most one queued
//! datagram, then runs the time-based work (aging sweep, triggered update).
//! Time is passed in explicitly so the whole loop can be driven from tests.

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::aging;
use crate::config::{ProtocolTimers, RouterConfig, SplitHorizon};
use crate::error::RejectReason;
use crate::event::Event;
use crate::neighbor::NeighborTable;
use crate::packet::Advertisement;
use crate::routing::{RouterId, RoutingTable};
use crate::scheduler::{Jitter, Scheduler};
use crate::transport::Transport;
use crate::update;

/// Readiness wait after the transport refused a send.
const SEND_BACKOFF: Duration = Duration::from_millis(50);

/// All routing state of one router, passed explicitly to each component.
#[derive(Debug, Clone)]
pub struct RouterContext {
    pub router_id: RouterId,
    pub neighbors: NeighborTable,
    pub routes: RoutingTable,
    pub timers: ProtocolTimers,
    pub split_horizon: SplitHorizon,
}

impl RouterContext {
    /// Fresh state for `config`, with a direct route to every neighbor.
    pub fn new(config: &RouterConfig) -> Self {
        let neighbors = NeighborTable::from_config(config);
        let mut routes = RoutingTable::new();
        for n in neighbors.all() {
            routes.seed_direct(n.id, n.link_cost);
        }

        RouterContext {
            router_id: config.router_id,
            neighbors,
            routes,
            timers: config.timers.clone(),
            split_horizon: config.split_horizon,
        }
    }
}

/// What happened during one [`RipNode::poll_at`] cycle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub received: bool,
    pub sent: bool,
    /// The transport answered WouldBlock; the datagram is still queued.
    pub send_blocked: bool,
    pub swept: bool,
    pub triggered: usize,
}

pub struct RipNode<T: Transport, J: Jitter> {
    ctx: RouterContext,
    transport: T,
    scheduler: Scheduler<J>,
    last_sweep: Instant,
    events: Vec<Event>,
}

impl<T: Transport, J: Jitter> RipNode<T, J> {
    /// Build a node. The update interval gets a random startup offset from
    /// `jitter`; the first sweep is due one interval after `now`.
    pub fn new(config: &RouterConfig, transport: T, mut jitter: J, now: Instant) -> Self {
        let mut ctx = RouterContext::new(config);
        let offset = jitter.update_offset();
        ctx.timers = ctx.timers.clone().with_update_offset(offset);

        RipNode {
            ctx,
            transport,
            scheduler: Scheduler::new(jitter),
            last_sweep: now,
            events: Vec::new(),
        }
    }

    pub fn router_id(&self) -> RouterId {
        self.ctx.router_id
    }

    pub fn context(&self) -> &RouterContext {
        &self.ctx
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.ctx.routes
    }

    pub fn scheduler(&self) -> &Scheduler<J> {
        &self.scheduler
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Take and return all pending events since the last call.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    /// Decode and apply one datagram.
    pub fn handle_datagram(&mut self, bytes: &[u8], src: SocketAddr, now: Instant) {
        let adv = match Advertisement::from_bytes(bytes) {
            Ok(adv) => adv,
            Err(e) => {
                self.reject(RejectReason::Decode(e), src);
                return;
            }
        };
        self.handle_advertisement(&adv, src, now);
    }

    /// Apply an already decoded advertisement.
    pub fn handle_advertisement(&mut self, adv: &Advertisement, src: SocketAddr, now: Instant) {
        match update::process(&mut self.ctx, adv) {
            Ok(outcome) => {
                debug!(
                    "advertisement from {} ({src}): {} entries, {} changes",
                    adv.sender,
                    adv.len(),
                    outcome.events.len()
                );
                self.ctx.neighbors.note_heard(adv.sender, now);
                self.events.extend(outcome.events);
                if outcome.trigger {
                    self.scheduler.request_triggered();
                }
            }
            Err(reason) => self.reject(reason, src),
        }
    }

    fn reject(&mut self, reason: RejectReason, src: SocketAddr) {
        match &reason {
            // truncated, misaligned or oversized
            RejectReason::Decode(e) if !e.is_protocol_violation() => {
                debug!("dropping unframed datagram from {src}: {reason}")
            }
            _ => warn!("dropping message from {src}: {reason}"),
        }
        self.events.push(Event::MessageRejected { reason });
    }

    fn receive_one(&mut self, now: Instant) -> bool {
        match self.transport.receive_ready() {
            Ok(Some((bytes, src))) => {
                self.handle_datagram(&bytes, src, now);
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!("receive failed: {e}");
                false
            }
        }
    }

    fn send_one(&mut self, report: &mut PollReport) {
        let Some(msg) = self.scheduler.front() else {
            return;
        };
        let bytes = msg.advertisement.to_bytes();
        let (neighbor, from, to) = (msg.neighbor, msg.local_addr, msg.remote_addr);

        match self.transport.send_datagram(from, to, &bytes) {
            Ok(n) => {
                debug!("sent {n} bytes to neighbor {neighbor} at {to}");
                self.scheduler.pop();
                report.sent = true;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => report.send_blocked = true,
            Err(e) => {
                // dropped; the next periodic advertisement carries the same routes
                warn!("send to neighbor {neighbor} at {to} failed: {e}");
                self.scheduler.pop();
            }
        }
    }

    fn run_timers(&mut self, now: Instant, report: &mut PollReport) {
        let elapsed = now.saturating_duration_since(self.last_sweep);
        if elapsed >= self.ctx.timers.update_interval {
            self.last_sweep = now;
            let outcome = aging::sweep(&mut self.ctx, elapsed);
            for event in &outcome.events {
                if let Event::NeighborUnreachable(id) = event {
                    match self.ctx.neighbors.get(*id).and_then(|n| n.last_heard) {
                        Some(at) => info!(
                            "neighbor {id} unreachable, last heard {:.1}s ago",
                            now.saturating_duration_since(at).as_secs_f32()
                        ),
                        None => info!("neighbor {id} unreachable, never heard"),
                    }
                }
            }
            self.events.extend(outcome.events);
            if outcome.trigger {
                self.scheduler.request_triggered();
            }
            if outcome.periodic {
                let queued = self.scheduler.enqueue_periodic(&self.ctx);
                debug!("periodic update: {queued} datagrams queued");
            }
            report.swept = true;
        }

        report.triggered = self.scheduler.check_triggered(&mut self.ctx, now);
        if report.triggered > 0 {
            debug!("triggered update: {} datagrams queued", report.triggered);
        }
    }

    /// One cycle of the event loop at time `now`.
    pub fn poll_at(&mut self, now: Instant) -> PollReport {
        let mut report = PollReport {
            received: self.receive_one(now),
            ..PollReport::default()
        };
        self.send_one(&mut report);
        self.run_timers(now, &mut report);
        report
    }

    /// One cycle at the current time.
    pub fn poll(&mut self) -> PollReport {
        self.poll_at(Instant::now())
    }

    /// Run forever, calling `on_cycle` after every cycle.
    pub fn run_with<F>(&mut self, mut on_cycle: F) -> !
    where
        F: FnMut(&mut Self, PollReport),
    {
        info!(
            "router {} running with {} neighbors",
            self.ctx.router_id,
            self.ctx.neighbors.len()
        );

        let mut blocked = false;
        loop {
            // after WouldBlock, sleep briefly instead of spinning on the send
            let (timeout, want_send) = if blocked {
                (SEND_BACKOFF, false)
            } else {
                (self.ctx.timers.poll_timeout, !self.scheduler.is_idle())
            };
            if let Err(e) = self.transport.wait_ready(timeout, want_send) {
                warn!("wait failed: {e}");
            }
            let report = self.poll();
            blocked = report.send_blocked;
            on_cycle(self, report);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LOCAL_HOST;
    use crate::error::DecodeError;
    use crate::routing::INFINITY;
    use std::collections::VecDeque;

    #[derive(Default)]
    struct MemoryTransport {
        inbox: VecDeque<(Vec<u8>, SocketAddr)>,
        sent: Vec<(SocketAddr, SocketAddr, Vec<u8>)>,
        block: bool,
        fail: bool,
    }

    impl Transport for MemoryTransport {
        fn receive_ready(&mut self) -> io::Result<Option<(Vec<u8>, SocketAddr)>> {
            Ok(self.inbox.pop_front())
        }

        fn send_datagram(&mut self, from: SocketAddr, to: SocketAddr, bytes: &[u8]) -> io::Result<usize> {
            if self.block {
                return Err(io::ErrorKind::WouldBlock.into());
            }
            if self.fail {
                return Err(io::ErrorKind::ConnectionRefused.into());
            }
            self.sent.push((from, to, bytes.to_vec()));
            Ok(bytes.len())
        }

        fn wait_ready(&mut self, _timeout: Duration, _want_send: bool) -> io::Result<()> {
            Ok(())
        }
    }

    struct NoJitter;

    impl Jitter for NoJitter {
        fn holddown(&mut self, min: Duration, _max: Duration) -> Duration {
            min
        }

        fn update_offset(&mut self) -> i64 {
            0
        }
    }

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from((LOCAL_HOST, port))
    }

    fn node(now: Instant) -> RipNode<MemoryTransport, NoJitter> {
        let cfg = RouterConfig::parse("router-id 1\ninput-ports 6001\noutputs 5002-1-2, 5003-2-3").unwrap();
        RipNode::new(&cfg, MemoryTransport::default(), NoJitter, now)
    }

    fn datagram(sender: u16, pairs: &[(u16, u8)]) -> Vec<u8> {
        let mut adv = Advertisement::new(sender);
        for &(d, m) in pairs {
            adv.push(d, m);
        }
        adv.to_bytes()
    }

    #[test]
    fn context_seeds_direct_routes() {
        let n = node(Instant::now());
        let snap = n.routes().snapshot();
        assert_eq!(snap.len(), 2);
        assert_eq!((snap[1].destination, snap[1].metric, snap[1].next_hop), (3, 2, 3));
        assert!(snap.iter().all(|e| !e.changed));
    }

    #[test]
    fn receives_and_triggers_update() {
        let t0 = Instant::now();
        let mut n = node(t0);
        n.transport_mut().inbox.push_back((datagram(2, &[(5, 3)]), addr(6002)));

        let report = n.poll_at(t0);
        assert!(report.received);
        assert_eq!(report.triggered, 2);
        assert!(matches!(n.drain_events().as_slice(), [Event::RouteChanged(e)] if e.destination == 5));
        assert!(n.context().neighbors.get(2).unwrap().last_heard.is_some());

        // one datagram leaves per cycle
        let report = n.poll_at(t0);
        assert!(report.sent);
        n.poll_at(t0);
        let sent = &n.transport().sent;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, addr(6001));
        assert_eq!(sent[0].1, addr(5002));
        let adv = Advertisement::from_bytes(&sent[1].2).unwrap();
        assert_eq!(adv.sender, 1);
        assert_eq!((adv.entries[0].destination, adv.entries[0].metric), (5, 4));
    }

    #[test]
    fn malformed_datagram_is_rejected() {
        let t0 = Instant::now();
        let mut n = node(t0);
        let before = n.routes().snapshot();
        n.transport_mut().inbox.push_back((vec![2, 1, 0, 2], addr(6002)));
        n.poll_at(t0);

        let events = n.drain_events();
        assert!(matches!(
            events.as_slice(),
            [Event::MessageRejected {
                reason: RejectReason::Decode(_)
            }]
        ));
        assert_eq!(n.routes().snapshot(), before);
        assert!(n.scheduler().is_idle());

        // framing errors are rejected the same way, only logged quieter
        n.transport_mut().inbox.push_back((vec![2, 2], addr(6002)));
        n.poll_at(t0);
        assert_eq!(
            n.drain_events(),
            vec![Event::MessageRejected {
                reason: RejectReason::Decode(DecodeError::TooShort { min: 4, actual: 2 })
            }]
        );
    }

    #[test]
    fn bad_destination_drops_only_that_pair() {
        let t0 = Instant::now();
        let mut n = node(t0);
        let mut bytes = datagram(2, &[(5, 3), (6, 2)]);
        // second pair's destination becomes 0
        bytes[24 + 4..24 + 8].copy_from_slice(&[0, 0, 0, 0]);
        n.ctx.routes.iter_mut().for_each(|e| e.timeout = Duration::from_secs(20));
        n.transport_mut().inbox.push_back((bytes, addr(6002)));
        n.poll_at(t0);

        let events = n.drain_events();
        assert!(events.iter().all(|e| !matches!(e, Event::MessageRejected { .. })));
        assert_eq!(n.routes().get(5).map(|e| (e.metric, e.next_hop)), Some((4, 2)));
        assert!(n.routes().get(6).is_none());
        assert_eq!(n.routes().get(2).unwrap().timeout, Duration::ZERO);
    }

    #[test]
    fn unknown_sender_is_rejected() {
        let t0 = Instant::now();
        let mut n = node(t0);
        n.transport_mut().inbox.push_back((datagram(42, &[(5, 1)]), addr(6042)));
        n.poll_at(t0);
        assert_eq!(
            n.drain_events(),
            vec![Event::MessageRejected {
                reason: RejectReason::UnknownSender(42)
            }]
        );
        assert!(n.routes().get(5).is_none());
    }

    #[test]
    fn periodic_update_after_interval() {
        let t0 = Instant::now();
        let mut n = node(t0);

        assert!(!n.poll_at(t0 + Duration::from_secs(7)).swept);
        let report = n.poll_at(t0 + Duration::from_secs(8));
        assert!(report.swept);
        assert_eq!(n.scheduler().queued(), 2);
        assert_eq!(n.routes().get(2).unwrap().timeout, Duration::from_secs(8));
    }

    #[test]
    fn blocked_send_stays_queued_and_failed_send_is_dropped() {
        let t0 = Instant::now();
        let mut n = node(t0);
        n.poll_at(t0 + Duration::from_secs(8));
        assert_eq!(n.scheduler().queued(), 2);

        n.transport_mut().block = true;
        let report = n.poll_at(t0 + Duration::from_secs(9));
        assert!(!report.sent);
        assert!(report.send_blocked);
        assert_eq!(n.scheduler().queued(), 2);

        n.transport_mut().block = false;
        n.transport_mut().fail = true;
        let report = n.poll_at(t0 + Duration::from_secs(9));
        assert!(!report.sent && !report.send_blocked);
        assert_eq!(n.scheduler().queued(), 1);
    }

    #[test]
    fn silent_neighbors_expire_then_disappear() {
        let t0 = Instant::now();
        let mut n = node(t0);
        let mut t = t0;
        for _ in 0..6 {
            t += Duration::from_secs(8);
            n.poll_at(t);
        }
        assert!(n.routes().iter().all(|e| e.metric == INFINITY));
        let events = n.drain_events();
        assert!(events.contains(&Event::NeighborUnreachable(2)));
        assert!(events.contains(&Event::NeighborUnreachable(3)));

        for _ in 0..5 {
            t += Duration::from_secs(8);
            n.poll_at(t);
        }
        assert!(n.routes().is_empty());
    }

    #[test]
    fn clock_going_backwards_is_ignored() {
        let t0 = Instant::now() + Duration::from_secs(100);
        let mut n = node(t0);
        let report = n.poll_at(t0 - Duration::from_secs(50));
        assert!(!report.swept);
        assert_eq!(n.routes().get(2).unwrap().timeout, Duration::ZERO);
    }
}
