//! hass-agent - host telemetry for Home Assistant
//!
//! Loads the configuration, connects to the broker, then drives every
//! configured agent from a single tick loop (or once with `--once`).

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use hass_agent::agents::build_agents;
use hass_agent::cli::Args;
use hass_agent::config::AgentConfig;
use hass_agent::mqtt::{DryRunChannel, MqttChannel, PublishChannel};
use hass_agent::network;
use hass_agent::scheduler::{self, Scheduler, WARM_UP};

fn init_logging(verbose: bool) {
    let default_level = if verbose { "hass_agent=debug,info" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    info!("hass-agent {} starting", env!("CARGO_PKG_VERSION"));

    let config_path = AgentConfig::resolve_path(&args.config);
    let config = AgentConfig::load(&config_path)
        .await
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    let client_id = format!("hass-agent-{}", network::hostname());
    let channel = Arc::new(
        MqttChannel::connect(&config.homeassistant, &client_id)
            .await
            .context("Failed to connect to MQTT broker")?,
    );

    let publish_channel: Arc<dyn PublishChannel> = if args.dry_run {
        info!("Dry run: nothing will be published");
        Arc::new(DryRunChannel::new(channel.clone()))
    } else {
        channel.clone()
    };
    let mut agents = build_agents(&config.agents, &config.homeassistant, publish_channel);
    scheduler::start_all(&mut agents).await;

    let scheduler = Scheduler::new(std::time::Duration::from_secs(config.homeassistant.update_s));

    if args.once {
        let outcome = scheduler.run_once(&mut agents, WARM_UP).await;
        channel.disconnect().await;
        outcome.context("Collection cycle failed")?;
        info!("Single run complete");
        return Ok(());
    }

    tokio::select! {
        _ = scheduler.run_forever(&mut agents) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }
    channel.disconnect().await;

    Ok(())
}
