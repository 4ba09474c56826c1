use anyhow::Result;
use clap::Parser;
use kubeforge_models::{ClusterType, Metadata};
use kubeforge_orchestrations::ClusterFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod api;
mod bootstrap;
mod cli;
mod commands;
mod config;
mod context;

use cli::{Args, Mode};
use config::Config;
use context::AppContext;

/// Initialize tracing with two outputs:
/// 1. Console (stderr) so command output on stdout stays clean
/// 2. File (<state dir>/kubeforge.log) for every run, CLI or API
fn initialize_tracing(config: &Config) -> Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "info,\
         kubeforge_server=debug,\
         kubeforge_orchestrations=debug,\
         sqlx::query=warn"
            .into()
    });

    let log_dir = config.log_dir();
    std::fs::create_dir_all(&log_dir).ok();

    let file_appender = tracing_appender::rolling::never(&log_dir, "kubeforge.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    // Dropping the guard stops file logging
    std::mem::forget(guard);

    let file_layer = fmt::layer().with_writer(file_writer).with_ansi(false);
    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::debug!(file = %log_dir.join("kubeforge.log").display(), "tracing initialized");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let args = Args::parse();
    let config = Config::load()?;

    initialize_tracing(&config)?;

    let api_port = config.api_port;
    let ctx = AppContext::new(config).await?;

    match args.mode {
        Mode::CreateHa {
            name,
            cloud,
            region,
            control_planes,
            workers,
            data_stores,
            control_plane_size,
            worker_size,
            load_balancer_size,
            data_store_size,
            distro,
            version,
        } => {
            let mut metadata = Metadata::new(cloud, region, name, ClusterType::Ha);
            metadata.no_cp = control_planes;
            metadata.no_wp = workers;
            metadata.no_ds = data_stores;
            metadata.control_plane_node_type = control_plane_size;
            metadata.worker_plane_node_type = worker_size;
            metadata.load_balancer_node_type = load_balancer_size;
            metadata.data_store_node_type = data_store_size;
            metadata.k8s_distro = distro;
            metadata.k8s_version = version;
            commands::cluster::run_create_ha(&ctx, metadata).await
        }
        Mode::CreateManaged {
            name,
            cloud,
            region,
            nodes,
            node_size,
            version,
            cni,
            apps,
        } => {
            let mut metadata = Metadata::new(cloud, region, name, ClusterType::Managed);
            metadata.no_mp = nodes;
            metadata.managed_node_type = node_size;
            metadata.k8s_version = version;
            metadata.cni = cni;
            metadata.applications = apps;
            commands::cluster::run_create_managed(&ctx, metadata).await
        }
        Mode::Delete { target } => commands::cluster::run_delete(&ctx, target).await,
        Mode::ScaleUp {
            target,
            workers,
            worker_size,
        } => commands::cluster::run_scale_up(&ctx, target, workers, worker_size).await,
        Mode::ScaleDown { target, workers } => {
            commands::cluster::run_scale_down(&ctx, target, workers).await
        }
        Mode::Get { target, output } => commands::cluster::run_get(&ctx, target, output).await,
        Mode::Kubeconfig { target } => commands::cluster::run_kubeconfig(&ctx, target).await,
        Mode::List {
            cloud,
            cluster_type,
            output,
        } => {
            let filter = ClusterFilter {
                cloud,
                cluster_type,
            };
            commands::cluster::run_list(&ctx, filter, output).await
        }
        Mode::Serve { port } => {
            commands::server::run_serve(ctx, port.unwrap_or(api_port)).await
        }
    }
}
