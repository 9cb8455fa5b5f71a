use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use unmixer_api_server::{start_server, ApiState, ServerConfig};
use unmixer_orchestrator::{Orchestrator, RetentionSweeper};
use unmixer_separation::{DemucsBackend, FilterFallback};
use unmixer_status::{ProgressNotifier, StatusStore, SubscriberRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "unmixer=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(ServerConfig::from_env()?);

    let store = Arc::new(StatusStore::new(config.outputs_dir()));
    let subscribers = Arc::new(SubscriberRegistry::new());
    let notifier = Arc::new(ProgressNotifier::new(
        Arc::clone(&store),
        Arc::clone(&subscribers),
    ));
    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&notifier),
        Arc::new(DemucsBackend::new()),
        Arc::new(FilterFallback::new()),
        Arc::new(RetentionSweeper::new(config.retention)),
    ));

    start_server(ApiState {
        config,
        notifier,
        subscribers,
        orchestrator,
    })
    .await?;
    Ok(())
}
