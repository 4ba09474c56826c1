use anyhow::Result;

use crate::api::AppState;
use crate::context::AppContext;

/// Serve the HTTP API until Ctrl+C
pub async fn run_serve(ctx: AppContext, port: u16) -> Result<()> {
    tracing::info!("Starting Kubeforge API");
    tracing::info!("API port: {}", port);
    tracing::info!("State dir: {}", ctx.config.state_dir.display());
    if ctx.config.civo_mock {
        tracing::warn!("Civo calls are simulated (KUBEFORGE_CIVO_MOCK)");
    }

    let state = AppState::new(ctx);

    let api_handle = tokio::spawn(async move {
        if let Err(e) = crate::api::start_server(port, state).await {
            tracing::error!("API server error: {}", e);
        }
    });

    tracing::info!("✓ Kubeforge server ready");
    tracing::info!("  API: http://0.0.0.0:{}", port);
    tracing::info!("  Press Ctrl+C to stop");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutting down...");
    // In-flight operations stop with the process. Re-running them resumes
    // from the persisted state.
    api_handle.abort();

    Ok(())
}
