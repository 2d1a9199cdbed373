mod metrics;
mod util;

use std::sync::Arc;

use clap::Parser;
use kube::Client;
use tokio::sync::mpsc;

use util::controller_ctx::ControllerContext;
use util::ms_reconcile;
use util::pod_watcher;

/// The only gang scheduler this controller integrates with; any
/// `ModelServing.spec.schedulerName` value other than this is a spec
/// rejection (spec.md §3, §7).
const DEFAULT_SCHEDULER_NAME: &str = "modelserving-scheduler";

/// CLI flags the core reads (spec.md §6 "Process boundary"). `kubeconfig`
/// and `master` are accepted and logged for operational parity but fold
/// into `kube::Client::try_default()`'s normal discovery rather than being
/// threaded through by hand, exactly as SPEC_FULL.md's Configuration
/// section describes.
#[derive(Parser, Debug)]
#[command(name = "modelserving-controller")]
struct Cli {
    /// Path to a kubeconfig file. Accepted for operational parity; actual
    /// client construction goes through the standard in-cluster/kubeconfig
    /// discovery chain.
    #[arg(long, env = "KUBECONFIG")]
    kubeconfig: Option<String>,

    /// Kubernetes API server address override. Accepted for operational
    /// parity; see `kubeconfig` above.
    #[arg(long, env = "MASTER")]
    master: Option<String>,

    /// Number of parallel reconcile workers (spec.md §2 "Work Queue").
    #[arg(long, env = "WORKERS", default_value_t = 5)]
    workers: usize,

    /// Whether this process participates in leader election. Leader
    /// election itself is an external collaborator (spec.md §1 "Out of
    /// scope"); this core only gates whether it runs, deferring the
    /// implementation to that collaborator.
    #[arg(long, env = "LEADER_ELECT", default_value_t = false)]
    leader_elect: bool,

    /// The scheduler name `ModelServing.spec.schedulerName` must match; a
    /// `ModelServing` naming any other value is rejected by the reconciler.
    #[arg(long, env = "SCHEDULER_NAME", default_value = DEFAULT_SCHEDULER_NAME)]
    scheduler_name: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::try_init()?;
    let cli = Cli::parse();

    log::info!("modelserving-controller starting, workers={}", cli.workers);
    if let Some(kubeconfig) = &cli.kubeconfig {
        log::info!("kubeconfig flag set to {kubeconfig}, deferring to standard discovery");
    }
    if let Some(master) = &cli.master {
        log::info!("master flag set to {master}, deferring to standard discovery");
    }
    if cli.leader_elect {
        log::info!("leader-elect requested; this process does not itself implement election and assumes an external collaborator gates concurrent instances");
    }

    let client = Client::try_default().await.map_err(|e| {
        log::error!("unable to construct a Kubernetes client: {e}");
        e
    })?;

    let (requeue_tx, requeue_rx) = mpsc::channel(128);
    let ctx = Arc::new(ControllerContext::new(
        Arc::new(client),
        cli.scheduler_name,
        requeue_tx,
    ));

    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(async move {
        if let Err(e) = metrics::run_metrics_server().await {
            log::error!("metrics server exited: {e:?}");
        }
    }));

    tasks.push(tokio::spawn({
        let ctx = ctx.clone();
        async move {
            pod_watcher::run(ctx).await;
        }
    }));

    let workers = cli.workers;
    tasks.push(tokio::spawn({
        let ctx = ctx.clone();
        async move {
            ms_reconcile::start_controller(ctx, requeue_rx, workers).await;
        }
    }));

    futures::future::try_join_all(tasks).await?;

    log::info!("modelserving-controller shutting down");
    Ok(())
}
