//! Cluster watcher (C5, spec §4.3): a long-lived stream of pod events
//! filtered by this instance's label, funneled through `JobService::reconcile`.
//!
//! Event-type handling is deliberately uniform: every event, regardless of
//! ADDED/MODIFIED/DELETED, triggers a fresh read of the pod rather than
//! trusting the event payload (which may be stale across a watcher
//! restart). This removes any dependence on event ordering.

use futures::StreamExt;

use crate::cluster::ClusterApi;
use crate::job::JobService;

pub async fn run(jobs: JobService, cluster: std::sync::Arc<dyn ClusterApi>, namespace: String) -> anyhow::Result<()> {
    let selector = jobs.instance_label_selector();
    let mut events = cluster.watch_pods(&namespace, &selector);

    while let Some(event) = events.next().await {
        let event = event?;
        let pod_name = match event.pod.metadata.name.clone() {
            Some(name) => name,
            None => continue,
        };

        let job_id = {
            let reg = jobs.registry().lock();
            reg.job_id_for_pod(&pod_name)
        };
        let job_id = match job_id {
            Some(id) => id,
            None => continue, // not one of ours, or already untracked
        };

        let already_terminal = {
            let reg = jobs.registry().lock();
            reg.job(job_id).map(|j| j.state.is_terminal()).unwrap_or(true)
        };
        if already_terminal {
            continue;
        }

        // Event payloads can be stale across a watcher restart; always
        // re-fetch the pod before reconciling against it.
        let fresh = cluster
            .read_pod(&namespace, &pod_name)
            .await
            .map_err(|err| anyhow::anyhow!(err.to_string()))?;

        if let Err(err) = jobs.reconcile(job_id, fresh).await {
            tracing::error!(job = job_id, pod = %pod_name, error = %err, "reconcile from watch event failed");
        }
    }

    anyhow::bail!("pod event stream ended")
}
