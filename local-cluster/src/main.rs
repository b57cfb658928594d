use tracing_subscriber::{filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use quorum_local_cluster::local_cluster_tester::LocalClusterRunner;

/// Runs a five-participant cluster, kills the elected leader, and
/// watches the survivors elect a replacement.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let fmt_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(console_subscriber::spawn())
        .with(tracing_subscriber::fmt::layer().with_filter(fmt_filter))
        .init();

    let mut runner = LocalClusterRunner::new(5);

    let leader = runner.check_one_leader().await?;
    println!(
        "participant {} leads term {}",
        leader.id, leader.participant.term
    );

    runner.kill(leader.id).await;
    println!("killed participant {}", leader.id);

    let new_leader = runner.check_one_leader().await?;
    println!(
        "participant {} leads term {} after failover",
        new_leader.id, new_leader.participant.term
    );

    Ok(())
}
