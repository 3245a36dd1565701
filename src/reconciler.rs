//! Periodic reconciler (C6, spec §4.3): the safety net against missed watch
//! events. Every `REFRESH_INTERVAL`, lists all pods carrying this
//! instance's label, reconciles every tracked job against the listing, and
//! treats any pod still in the registry but absent from the listing as
//! vanished.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::Pod;

use crate::cluster::ClusterApi;
use crate::job::JobService;

pub async fn run(
    jobs: JobService,
    cluster: Arc<dyn ClusterApi>,
    namespace: String,
    refresh_interval: Duration,
) -> anyhow::Result<()> {
    loop {
        tokio::time::sleep(refresh_interval).await;
        sweep_once(&jobs, cluster.as_ref(), &namespace).await?;
    }
}

async fn sweep_once(jobs: &JobService, cluster: &dyn ClusterApi, namespace: &str) -> anyhow::Result<()> {
    let selector = jobs.instance_label_selector();
    let pods = cluster
        .list_pods(namespace, &selector)
        .await
        .map_err(|err| anyhow::anyhow!(err.to_string()))?;

    let mut by_name: HashMap<String, Pod> = HashMap::new();
    for pod in pods {
        if let Some(name) = pod.metadata.name.clone() {
            by_name.insert(name, pod);
        }
    }

    // Reconcile every pod we just observed against its job.
    for (pod_name, pod) in &by_name {
        let job_id = {
            let reg = jobs.registry().lock();
            reg.job_id_for_pod(pod_name)
        };
        if let Some(job_id) = job_id {
            let non_terminal = jobs.registry().lock().job(job_id).map(|j| !j.state.is_terminal()).unwrap_or(false);
            if non_terminal {
                if let Err(err) = jobs.reconcile(job_id, Some(pod.clone())).await {
                    tracing::error!(job = job_id, pod = %pod_name, error = %err, "reconcile during sweep failed");
                }
            }
        }
    }

    // Snapshot the pod map before iterating (spec §9: the source mutates
    // this map mid-iteration via mark_unscheduled, which is a latent bug).
    let snapshot = jobs.registry().lock().pod_map_snapshot();
    for (pod_name, job_id) in snapshot {
        if by_name.contains_key(&pod_name) {
            continue;
        }
        let non_terminal = jobs.registry().lock().job(job_id).map(|j| !j.state.is_terminal()).unwrap_or(false);
        if non_terminal {
            if let Err(err) = jobs.reconcile(job_id, None).await {
                tracing::error!(job = job_id, pod = %pod_name, error = %err, "reconcile of vanished pod failed");
            }
        }
    }

    tracing::info!("periodic reconcile sweep complete");
    Ok(())
}
