//! Harness shared by the socket integration tests: peers joined to a live
//! relay and stepped with a simulated clock.

use std::{net::SocketAddr, time::Duration};

use level_peer::{PeerClient, PeerDriver};
use level_shared::{config::LevelConfig, level::Level, persistence::MemoryScoreStore};
use rand::{rngs::StdRng, SeedableRng};
use tokio::time::Instant;

/// Simulated time per step.
pub const STEP: Duration = Duration::from_millis(100);

/// Wall-clock budget for [`settle`] and [`settle_one`].
pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

/// Connects to the relay and enters its room with a fresh level.
pub async fn join(addr: SocketAddr, seed: u64) -> anyhow::Result<PeerDriver> {
    let client = PeerClient::connect(addr).await?;
    let room = client.room.clone();
    let level = Level::new(
        LevelConfig::default(),
        Box::new(MemoryScoreStore::new()),
        StdRng::seed_from_u64(seed),
    )?;
    tracing::debug!(ordinal = ?room.ordinal, seed, "Test peer joined");
    Ok(PeerDriver::online(level, client, &room))
}

/// Steps both peers until `done` holds.
pub async fn settle(
    a: &mut PeerDriver,
    b: &mut PeerDriver,
    done: impl Fn(&PeerDriver, &PeerDriver) -> bool,
) -> anyhow::Result<()> {
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    while !done(a, b) {
        anyhow::ensure!(Instant::now() < deadline, "peers did not settle");
        a.step(STEP).await?;
        b.step(STEP).await?;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}

pub async fn settle_one(
    peer: &mut PeerDriver,
    done: impl Fn(&PeerDriver) -> bool,
) -> anyhow::Result<()> {
    let deadline = Instant::now() + SETTLE_TIMEOUT;
    while !done(peer) {
        anyhow::ensure!(Instant::now() < deadline, "peer did not settle");
        peer.step(STEP).await?;
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}
