//! podbridge - bridge a deployment's pods onto local ports.
//!
//! Connects to the cluster, establishes one bridge per running pod of the
//! configured deployment, prints the pod→port table, and keeps forwarding
//! until interrupted. All configuration comes from `PODBRIDGE_*`
//! environment variables (see [`BridgeConfig::from_env`]).

use tokio::signal;
use tracing::info;

use podbridge::{BridgeConfig, KubeClusterClient, PodBridgeManager};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("podbridge=info".parse()?)
                .add_directive("kube=warn".parse()?),
        )
        .init();

    let config = BridgeConfig::from_env();
    info!(
        namespace = %config.namespace,
        deployment = %config.deployment,
        selector = %config.app_label_selector,
        debug_mode = config.debug_mode,
        "Starting podbridge"
    );

    let cluster = KubeClusterClient::connect().await?;
    info!("Connected to Kubernetes cluster");

    let mut manager = PodBridgeManager::connect(cluster, config).await?;
    for (pod, port) in manager.ports_by_pod() {
        info!(pod = %pod, port, "Bridge ready on 127.0.0.1");
    }

    shutdown_signal().await;
    info!("Received shutdown signal, destroying bridges");
    manager.destroy_all();

    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - without them the
/// process cannot tear bridges down gracefully. Using expect() here is
/// intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
