use clap::Parser;

use exposer::config::Config;
use exposer::engine::Engine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    simple_logger::init_with_level(config.log_level.as_level())?;

    let (transport, info) =
        relay_transport::Transport::create(config.rendezvous.clone(), config.target.port, config.token)
            .await?;
    println!("{}", info.channel);
    log::info!(
        "exposer: registered channel {} targeting {}",
        info.channel,
        config.target
    );

    let engine = Engine::new(transport, config.target);
    engine.run().await?;

    Ok(())
}
