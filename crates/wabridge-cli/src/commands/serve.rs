//! Serve command.

use clap::Args;
use tracing::info;
use wabridge_core::config::BindMode;
use wabridge_core::Config;
use wabridge_gateway::Gateway;

use crate::runtime;

/// Serve command arguments.
#[derive(Args)]
pub struct ServeArgs {
    /// Bind mode (loopback, lan)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Port number
    #[arg(short, long)]
    pub port: Option<u16>,
}

fn parse_bind(bind: &str) -> anyhow::Result<BindMode> {
    match bind {
        "loopback" => Ok(BindMode::Loopback),
        "lan" => Ok(BindMode::Lan),
        _ => anyhow::bail!("Invalid bind mode: {}", bind),
    }
}

/// Run the gateway until Ctrl-C.
pub async fn run(args: ServeArgs, mut config: Config) -> anyhow::Result<()> {
    if let Some(bind) = args.bind.as_deref() {
        config.gateway.bind = parse_bind(bind)?;
    }
    if let Some(port) = args.port {
        config.gateway.port = port;
    }

    if config.sessions.is_empty() {
        tracing::warn!("No sessions configured; webhooks and inbound events will be rejected");
    }

    let engine = runtime::build_engine(&config).await?;
    let gateway = Gateway::new(&config, engine);

    gateway
        .run_until(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested");
            }
        })
        .await?;

    Ok(())
}
