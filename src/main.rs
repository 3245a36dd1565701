use std::sync::Arc;

use parking_lot::Mutex;

use batch_control_plane::callback::CallbackDispatcher;
use batch_control_plane::cluster::kube_client::KubeClusterApi;
use batch_control_plane::config::Config;
use batch_control_plane::http::{self, AppState};
use batch_control_plane::instance::generate_instance_id;
use batch_control_plane::job::JobService;
use batch_control_plane::logs::LogStore;
use batch_control_plane::registry::Registry;
use batch_control_plane::{reconciler, supervisor, watcher};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    batch_control_plane::logger::init();

    let config = Config::from_env();
    tracing::info!(refresh_interval_secs = config.refresh_interval.as_secs(), "REFRESH_INTERVAL_IN_SECONDS");

    let instance_id = generate_instance_id();
    tracing::info!(instance_id = %instance_id, "starting batch control plane");

    let logs = Arc::new(LogStore::new(config.log_dir.clone()));
    logs.ensure_dir()?;

    let cluster = Arc::new(KubeClusterApi::connect(config.use_kube_config).await.map_err(|e| anyhow::anyhow!(e.to_string()))?);

    let registry = Arc::new(Mutex::new(Registry::new()));
    let jobs = JobService::new(
        registry,
        cluster.clone(),
        logs,
        CallbackDispatcher::new(),
        config.namespace.clone(),
        instance_id,
    );

    {
        let jobs = jobs.clone();
        let cluster = cluster.clone();
        let namespace = config.namespace.clone();
        tokio::spawn(async move {
            supervisor::supervise("cluster-watcher", move || {
                let jobs = jobs.clone();
                let cluster = cluster.clone();
                let namespace = namespace.clone();
                Box::pin(watcher::run(jobs, cluster, namespace))
            })
            .await;
        });
    }

    {
        let jobs = jobs.clone();
        let cluster = cluster.clone();
        let namespace = config.namespace.clone();
        let refresh_interval = config.refresh_interval;
        tokio::spawn(async move {
            supervisor::supervise("periodic-reconciler", move || {
                let jobs = jobs.clone();
                let cluster = cluster.clone();
                let namespace = namespace.clone();
                Box::pin(reconciler::run(jobs, cluster, namespace, refresh_interval))
            })
            .await;
        });
    }

    let app = http::router(AppState { jobs });
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
