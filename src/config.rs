// src/config.rs
//! Router configuration: identity, local ports, neighbors and protocol timers.
//!
//! The file format is line oriented; `#` starts a comment:
//!
//! ```text
//! router-id 1
//! input-ports 6110, 6201, 7345
//! outputs 5000-1-2, 5002-5-6
//! ```
//!
//! Each output is `port-cost-id` for one neighbor.

use std::collections::HashSet;
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::routing::{INFINITY, Metric, RouterId};

pub const MIN_ROUTER_ID: u32 = 1;
pub const MAX_ROUTER_ID: u32 = 64000;
pub const MIN_PORT: u32 = 1024;
pub const MAX_PORT: u32 = 64000;

/// Host every router runs on.
pub const LOCAL_HOST: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// One configured neighbor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborConfig {
    pub id: RouterId,
    /// Input port of the neighbor, where our advertisements go.
    pub port: u16,
    pub link_cost: Metric,
}

impl NeighborConfig {
    pub fn remote_addr(&self) -> SocketAddr {
        SocketAddr::from((LOCAL_HOST, self.port))
    }
}

/// Whether routes are advertised back toward the neighbor they came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplitHorizon {
    /// Advertise the full table to every neighbor.
    #[default]
    None,
    /// Omit routes learned from the receiving neighbor.
    Simple,
    /// Advertise routes learned from the receiving neighbor as unreachable.
    PoisonedReverse,
}

impl FromStr for SplitHorizon {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(SplitHorizon::None),
            "simple" => Ok(SplitHorizon::Simple),
            "poisoned-reverse" => Ok(SplitHorizon::PoisonedReverse),
            other => Err(format!("unknown split-horizon mode '{other}'")),
        }
    }
}

/// Fixed protocol intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolTimers {
    /// Aging sweep and periodic advertisement interval.
    pub update_interval: Duration,
    /// Silence after which a route becomes unreachable.
    pub expire_interval: Duration,
    /// Time an unreachable route is kept before deletion.
    pub garbage_interval: Duration,
    /// Bounds of the randomized holddown between triggered updates.
    pub holddown_min: Duration,
    pub holddown_max: Duration,
    /// Upper bound on one readiness wait in the event loop.
    pub poll_timeout: Duration,
}

impl Default for ProtocolTimers {
    fn default() -> Self {
        ProtocolTimers {
            update_interval: Duration::from_secs(8),
            expire_interval: Duration::from_secs(48),
            garbage_interval: Duration::from_secs(32),
            holddown_min: Duration::from_secs(1),
            holddown_max: Duration::from_secs(5),
            poll_timeout: Duration::from_secs(1),
        }
    }
}

impl ProtocolTimers {
    /// Shift the update interval by `offset_secs` (may be negative),
    /// never below one second.
    pub fn with_update_offset(mut self, offset_secs: i64) -> Self {
        let base = self.update_interval.as_secs() as i64;
        self.update_interval = Duration::from_secs((base + offset_secs).max(1) as u64);
        self
    }
}

/// Validated router configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    pub router_id: RouterId,
    pub input_ports: Vec<u16>,
    pub neighbors: Vec<NeighborConfig>,
    pub timers: ProtocolTimers,
    pub split_horizon: SplitHorizon,
}

impl RouterConfig {
    /// Read, parse and validate a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate config text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let mut router_id = None;
        let mut input_ports = Vec::new();
        let mut outputs = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.split('#').next().unwrap_or("").trim();
            if line.is_empty() {
                continue;
            }

            let (key, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
            let values: Vec<&str> = rest
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|v| !v.is_empty())
                .collect();

            match key {
                "router-id" => {
                    let [value] = values.as_slice() else {
                        return Err(parse_error(line_no, "router-id takes exactly one value"));
                    };
                    router_id = Some(parse_number(value, line_no)?);
                }
                "input-ports" => {
                    for value in values {
                        input_ports.push(parse_number(value, line_no)?);
                    }
                }
                "outputs" => {
                    for value in values {
                        outputs.push(parse_output(value, line_no)?);
                    }
                }
                other => {
                    return Err(parse_error(line_no, &format!("unknown directive '{other}'")));
                }
            }
        }

        let router_id = router_id.ok_or(ConfigError::Missing("router-id"))?;
        Self::from_raw(router_id, &input_ports, &outputs)
    }

    /// Build from raw numeric values, checking every range.
    pub fn from_raw(
        router_id: u32,
        input_ports: &[u32],
        outputs: &[(u32, u32, u32)],
    ) -> Result<Self, ConfigError> {
        if !(MIN_ROUTER_ID..=MAX_ROUTER_ID).contains(&router_id) {
            return Err(ConfigError::RouterIdOutOfRange(router_id));
        }

        let mut ports = Vec::with_capacity(input_ports.len());
        for &port in input_ports {
            ports.push(check_port(port)?);
        }

        let mut neighbors = Vec::with_capacity(outputs.len());
        for &(port, cost, id) in outputs {
            let port = check_port(port)?;
            if !(MIN_ROUTER_ID..=MAX_ROUTER_ID).contains(&id) {
                return Err(ConfigError::NeighborIdOutOfRange(id));
            }
            let id = id as RouterId;
            if cost < 1 || cost >= u32::from(INFINITY) {
                return Err(ConfigError::CostOutOfRange { id, cost });
            }
            neighbors.push(NeighborConfig {
                id,
                port,
                link_cost: cost as Metric,
            });
        }

        let config = RouterConfig {
            router_id: router_id as RouterId,
            input_ports: ports,
            neighbors,
            timers: ProtocolTimers::default(),
            split_horizon: SplitHorizon::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Cross-field checks: duplicates, self-neighbors, empty lists.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_ROUTER_ID..=MAX_ROUTER_ID).contains(&u32::from(self.router_id)) {
            return Err(ConfigError::RouterIdOutOfRange(u32::from(self.router_id)));
        }
        if self.input_ports.is_empty() {
            return Err(ConfigError::NoInputPorts);
        }
        if self.neighbors.is_empty() {
            return Err(ConfigError::NoNeighbors);
        }

        let mut ports = HashSet::new();
        let all_ports = self
            .input_ports
            .iter()
            .copied()
            .chain(self.neighbors.iter().map(|n| n.port));
        for port in all_ports {
            check_port(u32::from(port))?;
            if !ports.insert(port) {
                return Err(ConfigError::DuplicatePort(port));
            }
        }

        let mut ids = HashSet::new();
        for n in &self.neighbors {
            if !(MIN_ROUTER_ID..=MAX_ROUTER_ID).contains(&u32::from(n.id)) {
                return Err(ConfigError::NeighborIdOutOfRange(u32::from(n.id)));
            }
            if n.id == self.router_id {
                return Err(ConfigError::NeighborIsSelf(n.id));
            }
            if !ids.insert(n.id) {
                return Err(ConfigError::DuplicateNeighbor(n.id));
            }
            if n.link_cost < 1 || n.link_cost >= INFINITY {
                return Err(ConfigError::CostOutOfRange {
                    id: n.id,
                    cost: u32::from(n.link_cost),
                });
            }
        }

        Ok(())
    }

    pub fn with_split_horizon(mut self, mode: SplitHorizon) -> Self {
        self.split_horizon = mode;
        self
    }
}

fn parse_error(line: usize, message: &str) -> ConfigError {
    ConfigError::Parse {
        line,
        message: message.to_string(),
    }
}

fn parse_number(value: &str, line: usize) -> Result<u32, ConfigError> {
    value
        .parse()
        .map_err(|_| parse_error(line, &format!("'{value}' is not a number")))
}

fn parse_output(value: &str, line: usize) -> Result<(u32, u32, u32), ConfigError> {
    let parts: Vec<&str> = value.split('-').collect();
    let [port, cost, id] = parts.as_slice() else {
        return Err(parse_error(line, &format!("output '{value}' is not port-cost-id")));
    };
    Ok((
        parse_number(port, line)?,
        parse_number(cost, line)?,
        parse_number(id, line)?,
    ))
}

fn check_port(port: u32) -> Result<u16, ConfigError> {
    if (MIN_PORT..=MAX_PORT).contains(&port) {
        Ok(port as u16)
    } else {
        Err(ConfigError::PortOutOfRange(port))
    }
}
