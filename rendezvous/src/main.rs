use std::time::Duration;

use clap::Parser;

use rendezvous::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    simple_logger::init_with_level(config.log_level.as_level())?;

    let (router, registry) = rendezvous::build_router(
        config.queue_capacity,
        Duration::from_secs(config.heartbeat_interval_secs),
    );

    let idle_timeout = Duration::from_secs(config.idle_timeout_secs);
    let sweep_interval = (idle_timeout / 3).max(Duration::from_secs(10));
    tokio::spawn(rendezvous::reap_task(registry, sweep_interval, idle_timeout));

    log::info!("rendezvous server listening on {}", config.listen);
    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}
