use clap::Parser;
use redeemer::{spawn_idle_sweep, BrokerConfig, DriverConfig, HttpBackend, SessionBroker};
use redeemer_agent::server::{serve, AppState};
use redeemer_agent::store::{AccountStore, InMemoryAccountStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "redeemer-agent",
    about = "Session broker and control API for remote coupon automation",
    version
)]
struct Args {
    /// Port the control API listens on
    #[arg(long, env = "REDEEMER_PORT", default_value_t = 8321)]
    port: u16,

    /// Host of the remote device-automation agent
    #[arg(long, env = "REDEEMER_DEVICE_HOST", default_value = "127.0.0.1")]
    device_host: String,

    /// Port of the remote device-automation agent
    #[arg(long, env = "REDEEMER_DEVICE_PORT", default_value_t = 7700)]
    device_port: u16,

    /// API key for the device agent, if it requires one
    #[arg(long, env = "REDEEMER_DEVICE_API_KEY")]
    device_api_key: Option<String>,

    /// Seconds of inactivity before the session is torn down
    #[arg(long, env = "REDEEMER_IDLE_SECS", default_value_t = 600)]
    idle_secs: u64,

    /// Reconnect attempts before reporting the driver unavailable
    #[arg(long, env = "REDEEMER_RECONNECT_ATTEMPTS", default_value_t = 3)]
    reconnect_attempts: u32,

    /// JSON file of account credentials
    #[arg(long, env = "REDEEMER_ACCOUNTS")]
    accounts: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let mut driver_config = DriverConfig::new(args.device_host.clone(), args.device_port);
    driver_config.api_key = args.device_api_key.clone();
    let backend = Arc::new(HttpBackend::new(driver_config)?);

    let config = BrokerConfig {
        idle_threshold: Duration::from_secs(args.idle_secs),
        reconnect_attempts: args.reconnect_attempts,
        ..BrokerConfig::default()
    };
    let broker = Arc::new(SessionBroker::new(backend, config));
    spawn_idle_sweep(broker.clone());

    let store = match &args.accounts {
        Some(path) => InMemoryAccountStore::from_json_file(path)?,
        None => InMemoryAccountStore::new(),
    };
    info!(
        accounts = store.len().await,
        device_host = %args.device_host,
        device_port = args.device_port,
        "broker ready"
    );
    let store: Arc<dyn AccountStore> = Arc::new(store);

    serve(AppState { broker, store }, args.port).await
}
