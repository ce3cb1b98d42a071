use clap::Parser;
use sandgate_core::{create_token, GatewayResult};
use sandgate_server::config::ServerConfig;
use sandgate_server::directory::{InstanceRecord, StaticDirectory};
use sandgate_server::sandbox::LocalSandboxProvider;
use sandgate_server::server::Gateway;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sandgate-server")]
#[command(about = "Real-time session gateway for sandboxed compute instances")]
struct Cli {
    /// Path to the TOML config file
    #[arg(long, default_value = "~/.sandgate/config.toml")]
    config: String,

    /// Bind address (overrides config)
    #[arg(long)]
    bind: Option<String>,

    /// Listen port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Root directory for local sandboxes (overrides config)
    #[arg(long)]
    sandbox_root: Option<String>,

    /// Hex-encoded auth secret (overrides config)
    #[arg(long)]
    secret: Option<String>,

    /// Log filter, e.g. `info` or `sandgate_server=debug`
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Print a bearer token for the given user id and exit. Dev helper;
    /// production tokens come from the auth service.
    #[arg(long, value_name = "USER_ID")]
    mint_token: Option<String>,
}

#[tokio::main]
async fn main() -> GatewayResult<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = ServerConfig::load(
        Some(Path::new(&cli.config)),
        cli.bind.as_deref(),
        cli.port,
        cli.sandbox_root.as_deref(),
        cli.secret.as_deref(),
    )?;

    if let Some(user_id) = cli.mint_token {
        let token = create_token(&config.secret, &user_id, config.token_ttl);
        println!("{token}");
        return Ok(());
    }

    let directory = Arc::new(StaticDirectory::new());
    for seed in &config.instance_seeds {
        directory
            .insert(InstanceRecord {
                instance_id: seed.id.clone(),
                workspace_id: seed.workspace.clone(),
                member_ids: seed.members.clone(),
            })
            .await;
    }
    if !config.instance_seeds.is_empty() {
        info!(
            instances = config.instance_seeds.len(),
            "seeded instance directory"
        );
    }

    let provider = Arc::new(LocalSandboxProvider::new(config.sandbox_root.clone()));
    let addr = format!("{}:{}", config.bind, config.port);
    let listener = TcpListener::bind(&addr).await?;

    let gateway = Arc::new(Gateway::new(config, directory, provider));

    tokio::select! {
        _ = gateway.clone().run(listener) => {}
        _ = shutdown_signal() => {
            gateway.shutdown();
            // Give session tasks a moment to send their shutdown notices.
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
    }

    info!("gateway stopped");
    Ok(())
}

#[cfg(unix)]
async fn shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(_) => {
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
