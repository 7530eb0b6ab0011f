//! Standalone relay binary.
//!
//! Usage:
//!   cargo run -p level_relay -- [--addr 127.0.0.1:40100] [--config level.json]
//!
//! Hosts a single two-peer room. The first peer to connect owns the room.

use std::env;
use std::fs;
use std::net::SocketAddr;

use anyhow::Context;
use level_relay::RelayServer;
use level_shared::config::LevelConfig;
use tracing::info;

fn parse_args() -> anyhow::Result<LevelConfig> {
    let args: Vec<String> = env::args().collect();
    let mut cfg = LevelConfig::default();
    let mut addr = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                let raw = fs::read_to_string(&args[i + 1])
                    .with_context(|| format!("read config {}", args[i + 1]))?;
                cfg = LevelConfig::from_json_str(&raw).context("parse config")?;
                i += 2;
            }
            "--addr" if i + 1 < args.len() => {
                addr = Some(args[i + 1].clone());
                i += 2;
            }
            _ => i += 1,
        }
    }
    if let Some(addr) = addr {
        cfg.relay_addr = addr;
    }
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cfg = parse_args()?;
    let addr: SocketAddr = cfg.relay_addr.parse().context("parse relay_addr")?;

    let relay = RelayServer::bind(addr).await.context("create relay")?;
    let local = relay.local_addr()?;
    info!(%local, "Relay listening");

    relay.run().await
}
