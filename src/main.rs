mod cli;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use homecam_relay::{shutdown_signal, Hub};

#[tokio::main]
async fn main() {
    // Initialize tracing with RUST_LOG support
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = cli::Cli::parse();
    info!(
        host = %cli.host,
        port = cli.port,
        camera = cli.background_capture,
        serial = cli.serial,
        auto_capture = cli.auto_capture,
        "homecam-relay starting"
    );

    let hub = match Hub::start(cli.into_config()).await {
        Ok(hub) => hub,
        Err(e) => {
            error!("Failed to start hub: {}", e);
            std::process::exit(1);
        }
    };

    hub.run_until(shutdown_signal()).await;
    info!("homecam-relay stopped");
}
