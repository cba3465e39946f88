use std::str::FromStr;

use anyhow::Context;
use tracing::{info, Level};

use synod::{Cluster, ClusterConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let level = match std::env::var("SYNOD_LOG") {
        Ok(raw) => Level::from_str(&raw)
            .with_context(|| format!("SYNOD_LOG has an invalid value {:?}", raw))?,
        Err(_) => Level::INFO,
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = ClusterConfig::from_env()?;
    info!(?config, "starting election");

    let mut cluster = Cluster::start(config)?;
    let decided = cluster.wait_for_leader().await?;
    for (actor, prn) in &decided {
        info!(actor = %actor, prn = %prn, leader = %prn.proposer(), "decision");
    }

    // Actors keep answering peers until the process is killed.
    cluster.join().await
}
