use anyhow::{Context, Result};
use kubeforge_models::{Cloud, ClusterSummary, ClusterType, Metadata};
use kubeforge_orchestrations::provider::local::LOCAL_REGION;
use kubeforge_orchestrations::{list_clusters, phase, ClusterFilter};

use crate::cli::ClusterTarget;
use crate::context::AppContext;

pub async fn run_create_ha(ctx: &AppContext, metadata: Metadata) -> Result<()> {
    let name = metadata.cluster_name.clone();
    let manager = ctx.manager_for(&metadata)?;

    println!("Creating self-managed cluster '{}'...", name);
    let resources = manager
        .create_ha_cluster()
        .await
        .with_context(|| format!("Failed to create cluster '{}'", name))?;

    println!("✓ Cluster '{}' infrastructure is ready", name);
    println!("  Load balancer:  {}", resources.ipv4_load_balancer);
    println!("  Control planes: {}", resources.ipv4_control_planes.join(", "));
    println!("  Workers:        {}", resources.ipv4_worker_planes.join(", "));
    println!("  Data stores:    {}", resources.ipv4_data_stores.join(", "));
    Ok(())
}

pub async fn run_create_managed(ctx: &AppContext, metadata: Metadata) -> Result<()> {
    let name = metadata.cluster_name.clone();
    let manager = ctx.manager_for(&metadata)?;

    println!("Creating managed cluster '{}'...", name);
    let outcome = manager
        .create_managed_cluster()
        .await
        .with_context(|| format!("Failed to create cluster '{}'", name))?;

    println!("✓ Cluster '{}' is ready", name);
    if outcome.external_cni {
        println!("  ! CNI '{}' is not installed by the provider, deploy it before scheduling pods", metadata.cni);
    }
    println!("  Run `kubeforge kubeconfig {}` to fetch credentials", name);
    Ok(())
}

pub async fn run_delete(ctx: &AppContext, target: ClusterTarget) -> Result<()> {
    let manager = ctx.manager_for(&target.metadata())?;

    println!("Deleting cluster '{}'...", target.name);
    let result = match target.cluster_type {
        ClusterType::Ha => manager.delete_ha_cluster().await,
        ClusterType::Managed => manager.delete_managed_cluster().await,
    };
    result.with_context(|| format!("Failed to delete cluster '{}'", target.name))?;

    println!("✓ Cluster '{}' deleted", target.name);
    Ok(())
}

pub async fn run_scale_up(
    ctx: &AppContext,
    target: ClusterTarget,
    workers: usize,
    worker_size: String,
) -> Result<()> {
    let mut metadata = target.metadata();
    metadata.worker_plane_node_type = worker_size;
    let manager = ctx.manager_for(&metadata)?;

    let previous = manager
        .add_worker_nodes(workers)
        .await
        .with_context(|| format!("Failed to scale up '{}'", target.name))?;
    println!("✓ Workers scaled from {} to {}", previous, workers);
    Ok(())
}

pub async fn run_scale_down(ctx: &AppContext, target: ClusterTarget, workers: usize) -> Result<()> {
    let manager = ctx.manager_for(&target.metadata())?;

    let removed = manager
        .del_worker_nodes(workers)
        .await
        .with_context(|| format!("Failed to scale down '{}'", target.name))?;
    if removed.is_empty() {
        println!("Worker count already {}", workers);
    } else {
        println!("✓ Removed {} worker(s):", removed.len());
        for hostname in removed {
            println!("  - {}", hostname);
        }
    }
    Ok(())
}

pub async fn run_get(ctx: &AppContext, target: ClusterTarget, output: String) -> Result<()> {
    let mut identity = target.identity();
    if target.cloud == Cloud::Local {
        identity.region = LOCAL_REGION.to_string();
    }
    let doc = ctx
        .store
        .read(&identity)
        .await
        .with_context(|| format!("Cluster '{}' not found", target.name))?;
    let summary = phase::summarize(&doc);

    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Cluster: {}", summary.name);
    println!("{}", "=".repeat(60));
    println!();
    println!("Status:");
    println!("  Phase:              {}", summary.phase);
    println!("  Completed:          {}", summary.is_completed);
    println!("  Kubernetes Version: {}", or_dash(&summary.k8s_version));
    println!();
    println!("Identity:");
    println!("  Cloud:              {}", summary.cloud);
    println!("  Region:             {}", summary.region);
    println!("  Type:               {}", summary.cluster_type);
    println!();
    println!("Nodes:");
    match summary.cluster_type {
        ClusterType::Ha => {
            println!("  Control Planes:     {}", summary.no_cp);
            println!("  Workers:            {}", summary.no_wp);
            println!("  Data Stores:        {}", summary.no_ds);
        }
        ClusterType::Managed => {
            println!("  Nodes:              {}", summary.no_mp);
        }
    }
    println!();
    if let Some(updated) = summary.updated_at {
        println!("Updated: {}", updated.to_rfc3339());
    }
    Ok(())
}

pub async fn run_kubeconfig(ctx: &AppContext, target: ClusterTarget) -> Result<()> {
    let manager = ctx.manager_for(&target.metadata())?;
    let kubeconfig = manager
        .get_kubeconfig()
        .await
        .with_context(|| format!("No kubeconfig for '{}'", target.name))?;
    print!("{}", kubeconfig);
    Ok(())
}

pub async fn run_list(ctx: &AppContext, filter: ClusterFilter, output: String) -> Result<()> {
    let clusters = list_clusters(ctx.store.as_ref(), &filter)
        .await
        .context("Failed to list clusters")?;

    if output == "json" {
        println!("{}", serde_json::to_string_pretty(&clusters)?);
        return Ok(());
    }
    print_table(&clusters);
    Ok(())
}

fn print_table(clusters: &[ClusterSummary]) {
    println!(
        "{:<20} {:<6} {:<8} {:<8} {:<20} {:<6}",
        "NAME", "CLOUD", "TYPE", "REGION", "PHASE", "NODES"
    );
    println!("{}", "-".repeat(75));

    for c in clusters {
        let nodes = match c.cluster_type {
            ClusterType::Ha => format!("{}/{}/{}", c.no_cp, c.no_wp, c.no_ds),
            ClusterType::Managed => c.no_mp.to_string(),
        };
        println!(
            "{:<20} {:<6} {:<8} {:<8} {:<20} {}",
            c.name,
            c.cloud.as_str(),
            c.cluster_type.as_str(),
            c.region,
            c.phase,
            nodes
        );
    }

    println!();
    println!("{} cluster(s) found", clusters.len());
}

fn or_dash(s: &str) -> &str {
    if s.is_empty() {
        "-"
    } else {
        s
    }
}
