// src/main.rs
// ripd: run one router from a config file.

use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use rip_rs::{Event, RandomJitter, RipNode, RouteEntry, RouterConfig, SplitHorizon, UdpTransport};

#[derive(Parser)]
#[command(name = "ripd", about = "Distance-vector routing daemon")]
struct Cli {
    /// Router configuration file.
    config: PathBuf,

    /// none, simple or poisoned-reverse.
    #[arg(long, default_value = "none")]
    split_horizon: SplitHorizon,

    /// Seed for timer jitter; random when omitted.
    #[arg(long)]
    seed: Option<u64>,
}

fn print_table(router_id: u16, routes: &[RouteEntry]) {
    println!("Routing table of router {router_id}");
    println!("+--------+------+----------+---------+---------+---------+");
    println!("|  Dest  | Cost | Next Hop | Changed | Timeout | Garbage |");
    println!("+--------+------+----------+---------+---------+---------+");
    for r in routes {
        println!(
            "| {:>6} | {:>4} | {:>8} | {:>7} | {:>7.1} | {:>7.1} |",
            r.destination,
            r.metric,
            r.next_hop,
            r.changed,
            r.timeout.as_secs_f32(),
            r.garbage.as_secs_f32()
        );
    }
    println!("+--------+------+----------+---------+---------+---------+");
}

fn log_event(event: &Event) {
    match event {
        Event::RouteChanged(r) => info!("route to {} now metric {} via {}", r.destination, r.metric, r.next_hop),
        Event::RouteExpired(r) => info!("route to {} via {} unreachable", r.destination, r.next_hop),
        Event::RouteRemoved(dest) => info!("route to {dest} removed"),
        Event::NeighborUnreachable(_) => {}
        Event::MessageRejected { reason } => warn!("rejected message: {reason}"),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let config = RouterConfig::load(&cli.config)
        .with_context(|| format!("invalid config {}", cli.config.display()))?
        .with_split_horizon(cli.split_horizon);

    let transport = UdpTransport::bind(&config.input_ports).context("failed to bind input ports")?;
    let jitter = match cli.seed {
        Some(seed) => RandomJitter::seeded(seed),
        None => RandomJitter::from_os_rng(),
    };

    let mut node = RipNode::new(&config, transport, jitter, Instant::now());
    print_table(node.router_id(), &node.routes().snapshot());

    node.run_with(|node, report| {
        for event in node.drain_events() {
            log_event(&event);
        }
        if report.swept {
            print_table(node.router_id(), &node.routes().snapshot());
        }
    })
}
