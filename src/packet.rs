// src/packet.rs
//! Advertisement messages and their RIPv2-style wire format.
//!
//! Layout (big endian):
//! - header: command(1) = 2, version(1) = 2, sender router id(2)
//! - up to 25 entries of 20 bytes:
//!   address family(2) = 2, route tag(2), destination(4), mask(4),
//!   next hop(4), metric(4)
//!
//! Decoding validates every field once; code downstream of
//! [`Advertisement::from_bytes`] never re-checks the message shape. A pair
//! whose destination is not a valid router id is dropped on its own and
//! counted; every other bad field rejects the whole message.

use std::io::Cursor;

use byteorder::{BigEndian, ByteOrder, ReadBytesExt};

use crate::config::{MAX_ROUTER_ID, MIN_ROUTER_ID};
use crate::error::DecodeError;
use crate::routing::{INFINITY, Metric, RouterId};

pub const COMMAND_RESPONSE: u8 = 2;
pub const RIP_VERSION: u8 = 2;
pub const AF_INET: u16 = 2;

pub const HEADER_LEN: usize = 4;
pub const ENTRY_LEN: usize = 20;
/// Most entries carried by one message.
pub const MAX_ENTRIES: usize = 25;

/// One (destination, metric) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteAdvert {
    pub destination: RouterId,
    pub metric: Metric,
}

/// A received or outgoing advertisement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Advertisement {
    pub sender: RouterId,
    pub entries: Vec<RouteAdvert>,
    /// Pairs dropped while decoding because the destination was out of range.
    pub invalid_destinations: usize,
}

impl Advertisement {
    pub fn new(sender: RouterId) -> Self {
        Advertisement::with_entries(sender, Vec::new())
    }

    pub fn with_entries(sender: RouterId, entries: Vec<RouteAdvert>) -> Self {
        Advertisement {
            sender,
            entries,
            invalid_destinations: 0,
        }
    }

    pub fn push(&mut self, destination: RouterId, metric: Metric) {
        self.entries.push(RouteAdvert {
            destination,
            metric,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Encode to wire bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = vec![0u8; HEADER_LEN + ENTRY_LEN * self.entries.len()];
        buf[0] = COMMAND_RESPONSE;
        buf[1] = RIP_VERSION;
        BigEndian::write_u16(&mut buf[2..4], self.sender);

        for (entry, chunk) in self
            .entries
            .iter()
            .zip(buf[HEADER_LEN..].chunks_exact_mut(ENTRY_LEN))
        {
            BigEndian::write_u16(&mut chunk[0..2], AF_INET);
            // route tag, mask and next hop stay zero
            BigEndian::write_u32(&mut chunk[4..8], u32::from(entry.destination));
            BigEndian::write_u32(&mut chunk[16..20], u32::from(entry.metric));
        }

        buf
    }

    /// Decode and validate wire bytes.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_LEN {
            return Err(DecodeError::TooShort {
                min: HEADER_LEN,
                actual: buf.len(),
            });
        }

        let mut cur = Cursor::new(buf);
        let command = read_u8(&mut cur)?;
        if command != COMMAND_RESPONSE {
            return Err(DecodeError::Command(command));
        }
        let version = read_u8(&mut cur)?;
        if version != RIP_VERSION {
            return Err(DecodeError::Version(version));
        }
        let sender = router_id(u32::from(read_u16(&mut cur)?))?;

        let body = buf.len() - HEADER_LEN;
        if body % ENTRY_LEN != 0 {
            return Err(DecodeError::Misaligned(body));
        }
        let count = body / ENTRY_LEN;
        if count > MAX_ENTRIES {
            return Err(DecodeError::TooManyEntries(count));
        }

        let mut adv = Advertisement::with_entries(sender, Vec::with_capacity(count));
        for _ in 0..count {
            let family = read_u16(&mut cur)?;
            if family != AF_INET {
                return Err(DecodeError::AddressFamily(family));
            }
            let _tag = read_u16(&mut cur)?;
            let destination = read_u32(&mut cur)?;
            let _mask = read_u32(&mut cur)?;
            let _next_hop = read_u32(&mut cur)?;
            let metric = read_u32(&mut cur)?;

            if metric > u32::from(INFINITY) {
                return Err(DecodeError::Metric {
                    destination,
                    metric,
                });
            }
            match router_id(destination) {
                Ok(destination) => adv.push(destination, metric as Metric),
                Err(_) => adv.invalid_destinations += 1,
            }
        }

        Ok(adv)
    }
}

fn router_id(raw: u32) -> Result<RouterId, DecodeError> {
    if (MIN_ROUTER_ID..=MAX_ROUTER_ID).contains(&raw) {
        Ok(raw as RouterId)
    } else {
        Err(DecodeError::RouterId(raw))
    }
}

fn too_short(cur: &Cursor<&[u8]>) -> DecodeError {
    DecodeError::TooShort {
        min: cur.position() as usize + 1,
        actual: cur.get_ref().len(),
    }
}

fn read_u8(cur: &mut Cursor<&[u8]>) -> Result<u8, DecodeError> {
    cur.read_u8().map_err(|_| too_short(cur))
}

fn read_u16(cur: &mut Cursor<&[u8]>) -> Result<u16, DecodeError> {
    cur.read_u16::<BigEndian>().map_err(|_| too_short(cur))
}

fn read_u32(cur: &mut Cursor<&[u8]>) -> Result<u32, DecodeError> {
    cur.read_u32::<BigEndian>().map_err(|_| too_short(cur))
}
