//! Standalone peer binary.
//!
//! Usage:
//!   cargo run -p level_peer -- [--solo] [--addr 127.0.0.1:40100] [--tick-hz 60]
//!                              [--config level.json] [--save highscore.json]
//!
//! Without `--solo` the peer joins the relay's room and plays online.
//!
//! Console commands:
//!   pause   - Toggle the pause panel
//!   status  - Show session status
//!   quit    - Exit

use std::env;
use std::fs;
use std::io::BufRead;
use std::net::SocketAddr;

use anyhow::Context;
use level_peer::{PeerClient, PeerDriver};
use level_shared::{config::LevelConfig, level::Level, persistence::JsonScoreStore};
use rand::{rngs::StdRng, SeedableRng};
use tokio::sync::mpsc;
use tracing::info;

struct Args {
    config: LevelConfig,
    solo: bool,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().collect();
    let mut config = LevelConfig::default();
    let mut solo = false;
    let mut addr = None;
    let mut save = None;
    let mut tick_hz = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" if i + 1 < args.len() => {
                let raw = fs::read_to_string(&args[i + 1])
                    .with_context(|| format!("read config {}", args[i + 1]))?;
                config = LevelConfig::from_json_str(&raw).context("parse config")?;
                i += 2;
            }
            "--addr" if i + 1 < args.len() => {
                addr = Some(args[i + 1].clone());
                i += 2;
            }
            "--save" if i + 1 < args.len() => {
                save = Some(args[i + 1].clone());
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                tick_hz = Some(args[i + 1].parse::<u32>().context("parse --tick-hz")?);
                i += 2;
            }
            "--solo" => {
                solo = true;
                i += 1;
            }
            _ => i += 1,
        }
    }
    if let Some(addr) = addr {
        config.relay_addr = addr;
    }
    if let Some(save) = save {
        config.save_path = save;
    }
    if let Some(hz) = tick_hz {
        config.tick_hz = hz;
    }
    Ok(Args { config, solo })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let Args { config, solo } = parse_args()?;
    let tick = config.tick_interval();
    let store = JsonScoreStore::new(&config.save_path);
    let relay_addr = config.relay_addr.clone();
    let level = Level::new(config, Box::new(store), StdRng::from_entropy()).context("load level")?;

    let mut driver = if solo {
        info!("Starting solo game");
        PeerDriver::<PeerClient>::offline(level)
    } else {
        let addr: SocketAddr = relay_addr.parse().context("parse relay_addr")?;
        let client = PeerClient::connect(addr).await.context("join room")?;
        let room = client.room.clone();
        PeerDriver::online(level, client, &room)
    };

    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    let mut next_tick = tokio::time::Instant::now();
    loop {
        while let Ok(line) = console_rx.try_recv() {
            match line.as_str() {
                "pause" => driver.level_mut().toggle_pause(),
                "status" => {
                    let level = driver.level();
                    println!(
                        "state={:?} ordinal={:?} scores={:?} high={} paused={}",
                        level.session().state(),
                        level.session().ordinal(),
                        level.scores(),
                        level.high_score(),
                        level.is_paused(),
                    );
                }
                "quit" => return Ok(()),
                other => println!("Unknown command: {other}"),
            }
        }

        driver.step(tick).await?;
        if driver.is_finished() {
            info!("Session finished");
            return Ok(());
        }

        next_tick += tick;
        tokio::time::sleep_until(next_tick).await;
    }
}
