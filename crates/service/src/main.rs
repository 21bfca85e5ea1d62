use anyhow::Context;
use tokio_util::sync::CancellationToken;

use jobmatch_infra::ServiceConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    jobmatch_observability::init();

    let config = ServiceConfig::from_env().context("invalid configuration")?;

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("shutdown requested");
                signal.cancel();
            }
            Err(err) => tracing::warn!(error = %err, "cannot listen for ctrl-c"),
        }
    });

    let result = jobmatch_service::app::run(config, shutdown).await;
    if let Err(err) = &result {
        tracing::error!(error = %format!("{err:#}"), "matching service failed");
    }
    result
}
