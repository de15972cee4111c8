//! `ReefStore` gateway daemon entry point.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use reefstore_gateway::{
    BootstrapError, Bootstrapper, CtrlPlaneBroadcaster, CtrlPlaneMetaSyncer, EnvHint, Gateway,
    GatewayConfig, HttpJoiner, NetworkConfig, NetworkModule, TimeoutConfig,
};

/// Control-plane gateway node of a `ReefStore` cluster.
#[derive(Debug, Parser)]
#[command(name = "reefstore-gateway", version, about)]
struct Args {
    /// Unique node id within the cluster.
    #[arg(long)]
    node_id: String,

    /// Bind address for the control-plane listener.
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Listen port (0 = OS-assigned).
    #[arg(long, default_value_t = 8080)]
    port: u16,

    /// Advertised control URL, when it differs from host:port.
    #[arg(long)]
    public_url: Option<String>,

    /// Well-known primary control URL to join through.
    #[arg(long)]
    primary_url: Option<String>,

    /// Directory for the persisted cluster map.
    #[arg(long)]
    persist_dir: Option<PathBuf>,

    /// Number of targets to wait for during startup (0 = any).
    #[arg(long, default_value_t = 0)]
    ntargets: usize,

    /// Skip the registration window.
    #[arg(long)]
    skip_startup: bool,

    /// Overall startup timeout in seconds.
    #[arg(long, default_value_t = 60)]
    startup_timeout: u64,
}

impl Args {
    fn into_config(self) -> GatewayConfig {
        GatewayConfig {
            node_id: self.node_id,
            host: self.host,
            port: self.port,
            public_url: self.public_url,
            primary_url: self.primary_url,
            persist_dir: self.persist_dir,
            target_count: self.ntargets,
            skip_startup: self.skip_startup,
            timeouts: TimeoutConfig {
                startup: Duration::from_secs(self.startup_timeout),
                ..TimeoutConfig::default()
            },
            ..GatewayConfig::default()
        }
    }
}

enum RunError {
    Bootstrap(BootstrapError),
    Other(anyhow::Error),
}

impl From<anyhow::Error> for RunError {
    fn from(e: anyhow::Error) -> Self {
        Self::Other(e)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let node_id = args.node_id.clone();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(RunError::Bootstrap(e)) => {
            // one-line fatal diagnostic: error code, self id, competing maps
            error!(self_id = %node_id, "FATAL: {e}");
            match e {
                BootstrapError::Integrity(cie) => ExitCode::from(cie.code() as u8),
                _ => ExitCode::FAILURE,
            }
        }
        Err(RunError::Other(e)) => {
            error!(self_id = %node_id, "FATAL: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), RunError> {
    let mut config = args.into_config();

    // bind first: an OS-assigned port must be known before the gateway
    // advertises its control URL
    let mut module = NetworkModule::new(NetworkConfig::from(&config));
    let port = module.start().await.map_err(RunError::Other)?;
    config.port = port;

    let timeout = config.timeouts.cplane_operation;
    let gw = Arc::new(Gateway::new(config));
    info!(node = %gw.self_node(), url = %gw.self_node().ctrl_url, "gateway starting");

    let broadcaster = CtrlPlaneBroadcaster::new(timeout, gw.config().bcast_concurrency)
        .map_err(RunError::Other)?;
    let joiner = HttpJoiner::new(timeout).map_err(RunError::Other)?;
    let syncer = CtrlPlaneMetaSyncer::new(gw.self_node().id.clone(), timeout)
        .map_err(RunError::Other)?;

    let bootstrapper = Bootstrapper::new(
        Arc::clone(&gw),
        Arc::new(broadcaster),
        Arc::new(joiner),
        Arc::new(syncer),
    );
    let boot_task = tokio::spawn(async move { bootstrapper.run(EnvHint::from_env()).await });

    let serve_gw = Arc::clone(&gw);
    let serve_task = tokio::spawn(module.serve(serve_gw, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    }));

    match boot_task.await {
        Ok(Ok(())) => info!("bootstrap complete"),
        Ok(Err(e)) => return Err(RunError::Bootstrap(e)),
        Err(e) => return Err(RunError::Other(e.into())),
    }

    match serve_task.await {
        Ok(result) => result.map_err(RunError::Other),
        Err(e) => Err(RunError::Other(e.into())),
    }
}
