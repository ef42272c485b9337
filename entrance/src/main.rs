use clap::Parser;

use entrance::config::Config;
use entrance::engine::Engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    simple_logger::init_with_level(config.log_level.as_level())?;

    let (transport, info) = relay_transport::Transport::join(
        config.rendezvous.clone(),
        config.channel.clone(),
        config.token,
    )
    .await?;
    log::info!("entrance: joined channel {} on port {}", info.channel, info.port);

    let engine = Engine::bind(transport, info.port).await?;
    log::info!("entrance: listening on 0.0.0.0:{}", info.port);
    engine.run().await?;

    Ok(())
}
