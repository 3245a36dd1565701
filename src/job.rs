//! Per-job lifecycle (C3, spec §4.2): the Job state machine plus the
//! `JobService` that mediates every operation against the registry, the
//! cluster API, the log store, and the callback dispatcher under the
//! decide-under-lock / release / do-I/O / reacquire-and-apply discipline
//! spec §5 requires.

use std::collections::HashMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{ContainerStateTerminated, Pod};
use parking_lot::Mutex;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::callback::CallbackDispatcher;
use crate::cluster::{ClusterApi, ClusterError};
use crate::error::Error;
use crate::logs::LogStore;
use crate::registry::Registry;

const APP_LABEL: &str = "batch-job";

/// Closed tagged sum (spec §9 "Tagged state"): `Complete` carries its exit
/// code so the invariant "Complete ⇒ exit_code defined" (I1) is enforced by
/// the type rather than by convention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Created,
    Complete { exit_code: i32 },
    Cancelled,
}

impl JobState {
    /// Single predicate backing every terminal-state guard (I6, L2, L3).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Complete { .. } | JobState::Cancelled)
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: u64,
    pub batch_id: Option<u64>,
    pub attributes: HashMap<String, String>,
    pub callback: Option<String>,
    /// The template as supplied at construction time, pre-stamping of the
    /// per-creation uuid label; reused verbatim (with a fresh uuid) when
    /// `mark_unscheduled` recreates the pod.
    pub pod_template: Pod,
    pub pod_name: Option<String>,
    pub state: JobState,
}

impl Job {
    /// The public document returned by the HTTP surface and handed to the
    /// completion callback (spec §6.1 "Job JSON").
    pub fn to_json(&self, log: Option<&str>) -> Value {
        let mut doc = json!({
            "id": self.id,
            "state": state_label(&self.state),
        });
        if !self.attributes.is_empty() {
            doc["attributes"] = json!(self.attributes);
        }
        if let JobState::Complete { exit_code } = self.state {
            doc["exit_code"] = json!(exit_code);
        }
        if let Some(log) = log {
            doc["log"] = json!(log);
        }
        doc
    }
}

fn state_label(state: &JobState) -> &'static str {
    match state {
        JobState::Created => "Created",
        JobState::Complete { .. } => "Complete",
        JobState::Cancelled => "Cancelled",
    }
}

/// Stamps `generate_name` and the `app`/`instance`/`uuid` labels (spec §3,
/// §6.2 "Label conventions") onto a caller-supplied or previously-stored pod
/// template. Called both at job construction and whenever a replacement pod
/// is created by `mark_unscheduled`, each time with a fresh uuid label.
fn stamp_pod_template(mut pod: Pod, job_id: u64, instance_id: &str) -> Pod {
    let mut labels = pod.metadata.labels.clone().unwrap_or_default();
    labels.insert("app".to_string(), APP_LABEL.to_string());
    labels.insert("instance".to_string(), instance_id.to_string());
    labels.insert("uuid".to_string(), Uuid::new_v4().to_string());
    pod.metadata.generate_name = Some(format!("job-{job_id}-"));
    pod.metadata.name = None;
    pod.metadata.labels = Some(labels);
    pod
}

fn pod_name(pod: &Pod) -> Result<String, Error> {
    pod.metadata
        .name
        .clone()
        .ok_or_else(|| Error::Upstream("pod observation missing a name".to_string()))
}

/// Returns the single container's terminated state, if any. Panics if the
/// pod carries more than one container status, or if that container isn't
/// named `default`: the "single container per pod" assumption (spec §4.2
/// "Container assumption") is an Invariant-class error, not a recoverable
/// one, since only this service constructs these pods.
fn single_container_terminated(pod: &Pod) -> Option<ContainerStateTerminated> {
    let statuses = pod.status.as_ref()?.container_statuses.as_ref()?;
    assert_eq!(statuses.len(), 1, "job pods must have exactly one container");
    assert_eq!(statuses[0].name, "default", "job pod's container must be named 'default'");
    statuses[0].state.as_ref()?.terminated.clone()
}

/// Mediates every Job operation against the shared registry, cluster API,
/// log store, and callback dispatcher. Holds no mutable state of its own
/// beyond `Arc`s to those collaborators so it can be cloned freely across
/// the HTTP handlers, the watcher, and the reconciler.
#[derive(Clone)]
pub struct JobService {
    registry: Arc<Mutex<Registry>>,
    cluster: Arc<dyn ClusterApi>,
    logs: Arc<LogStore>,
    callbacks: CallbackDispatcher,
    namespace: String,
    instance_id: String,
}

impl JobService {
    pub fn new(
        registry: Arc<Mutex<Registry>>,
        cluster: Arc<dyn ClusterApi>,
        logs: Arc<LogStore>,
        callbacks: CallbackDispatcher,
        namespace: String,
        instance_id: String,
    ) -> Self {
        JobService { registry, cluster, logs, callbacks, namespace, instance_id }
    }

    pub fn registry(&self) -> &Arc<Mutex<Registry>> {
        &self.registry
    }

    pub fn instance_label_selector(&self) -> String {
        format!("app={APP_LABEL},instance={}", self.instance_id)
    }

    /// Log fetch semantics shared by the single-job read and the raw log
    /// endpoint (spec §6.1 "Log fetch semantics"): a `Created` job with a
    /// bound pod streams its current cluster log best-effort (swallowing
    /// transient fetch errors), a `Complete` job reads its persisted
    /// artifact, and a `Cancelled` job has no log.
    async fn fetch_log(&self, id: u64, state: &JobState, pod_name: Option<&str>) -> Option<String> {
        match state {
            JobState::Created => {
                let name = pod_name?;
                self.cluster.read_pod_log(&self.namespace, name).await.ok()
            }
            JobState::Complete { .. } => self.logs.read(id).await,
            JobState::Cancelled => None,
        }
    }

    /// The public document for a single job, including its log under the
    /// same rules as `fetch_log`. `None` if the job is unknown.
    pub async fn job_json(&self, id: u64) -> Option<Value> {
        let (state, pod_name) = {
            let reg = self.registry.lock();
            let job = reg.job(id)?;
            (job.state.clone(), job.pod_name.clone())
        };
        let log = self.fetch_log(id, &state, pod_name.as_deref()).await;
        let reg = self.registry.lock();
        reg.job(id).map(|job| job.to_json(log.as_deref()))
    }

    pub async fn list_jobs_json(&self) -> Vec<Value> {
        let ids: Vec<u64> = {
            let reg = self.registry.lock();
            reg.iter_jobs().map(|j| j.id).collect()
        };
        let mut docs = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(doc) = self.job_json(id).await {
                docs.push(doc);
            }
        }
        docs
    }

    /// The raw log endpoint's fallback: if the job still exists, apply the
    /// normal per-state rule; if it has been deleted, fall back to the
    /// persisted artifact for its id, if one exists (spec §6.1 "If the job
    /// has been deleted but an artifact exists for its id, return that
    /// artifact.").
    pub async fn log_for_id(&self, id: u64) -> Option<String> {
        let existing = {
            let reg = self.registry.lock();
            reg.job(id).map(|job| (job.state.clone(), job.pod_name.clone()))
        };
        match existing {
            Some((state, pod_name)) => self.fetch_log(id, &state, pod_name.as_deref()).await,
            None => self.logs.read(id).await,
        }
    }

    async fn delete_pod_tolerant(&self, name: &str) -> Result<(), Error> {
        match self.cluster.delete_pod(&self.namespace, name).await {
            Ok(()) => Ok(()),
            Err(ClusterError::NotFound) => Ok(()),
            Err(other) => Err(other.into()),
        }
    }

    /// **construct** (spec §4.2).
    pub async fn create_job(
        &self,
        pod_spec: Pod,
        batch_id: Option<u64>,
        attributes: HashMap<String, String>,
        callback: Option<String>,
    ) -> Result<u64, Error> {
        let id = {
            let mut reg = self.registry.lock();
            if let Some(batch_id) = batch_id {
                if !reg.batch_exists(batch_id) {
                    return Err(Error::BadRequest(format!("unknown batch_id {batch_id}")));
                }
            }
            reg.next_id()
        };

        let template = stamp_pod_template(pod_spec, id, &self.instance_id);

        let job = Job {
            id,
            batch_id,
            attributes,
            callback,
            pod_template: template.clone(),
            pod_name: None,
            state: JobState::Created,
        };
        self.registry.lock().insert_job(job);

        let created = self.cluster.create_pod(&self.namespace, template).await?;
        let name = pod_name(&created)?;
        self.registry.lock().rebind_pod(id, None, Some(name));

        Ok(id)
    }

    /// **cancel()** (spec §4.2). No-op if already terminal. Deletes the
    /// bound pod first and only then applies the `Cancelled` transition, so
    /// a delete failure leaves the job `Created` and retryable instead of
    /// `Cancelled` with a pod still bound (I2). A second concurrent caller
    /// finds the job already terminal at the apply step and no-ops (law L1,
    /// S6).
    pub async fn cancel_job(&self, id: u64) -> Result<(), Error> {
        let pod_name = {
            let reg = self.registry.lock();
            let job = reg.job(id).ok_or(Error::NotFound)?;
            if job.state.is_terminal() {
                return Ok(());
            }
            job.pod_name.clone()
        };

        // Delete before transitioning: if this fails with a non-404 error,
        // the job must stay `Created` (retryable on the next cancel call)
        // rather than be marked `Cancelled` with a pod that's still bound
        // and still running (I2).
        if let Some(ref name) = pod_name {
            self.delete_pod_tolerant(name).await?;
        }

        let mut reg = self.registry.lock();
        let still_pending = reg.job(id).map(|job| !job.state.is_terminal()).unwrap_or(false);
        if still_pending {
            reg.rebind_pod(id, pod_name.as_deref(), None);
            reg.job_mut(id).unwrap().state = JobState::Cancelled;
        }

        Ok(())
    }

    /// **delete()** (spec §4.2). `Registry::remove_job` already handles
    /// unbinding the pod map entry and the batch membership list.
    pub async fn delete_job(&self, id: u64) -> Result<(), Error> {
        let pod_name = {
            let mut reg = self.registry.lock();
            let job = reg.remove_job(id).ok_or(Error::NotFound)?;
            job.pod_name
        };

        if let Some(name) = pod_name {
            self.delete_pod_tolerant(&name).await?;
        }

        Ok(())
    }

    /// **mark_unscheduled()** (spec §4.2). Precondition: `state = Created`;
    /// treated as a no-op if a concurrent cancel/delete invalidated that by
    /// the time this runs, rather than asserting (only the single-container
    /// assumption is Invariant-class here).
    pub async fn mark_unscheduled(&self, id: u64) -> Result<(), Error> {
        let (old_pod_name, template) = {
            let reg = self.registry.lock();
            let job = match reg.job(id) {
                Some(job) => job,
                None => return Ok(()),
            };
            if job.state != JobState::Created {
                return Ok(());
            }
            (job.pod_name.clone(), job.pod_template.clone())
        };

        // Unbind first so a concurrent reconcile doesn't also try to recreate.
        self.registry.lock().rebind_pod(id, old_pod_name.as_deref(), None);

        let fresh = stamp_pod_template(template, id, &self.instance_id);
        let created = self.cluster.create_pod(&self.namespace, fresh).await?;
        let new_name = pod_name(&created)?;

        let mut reg = self.registry.lock();
        let still_created = reg.job(id).map(|job| job.state == JobState::Created).unwrap_or(false);
        if still_created {
            reg.rebind_pod(id, None, Some(new_name));
        } else {
            // The job went terminal while the replacement pod was being
            // created; don't leak it.
            drop(reg);
            let _ = self.cluster.delete_pod(&self.namespace, &new_name).await;
        }

        Ok(())
    }

    /// **mark_complete(pod_observation)** (spec §4.2). Idempotent: the
    /// cheap pre-check avoids redundant log-fetch I/O, and the authoritative
    /// recheck at apply time guarantees the state transition and callback
    /// dispatch happen exactly once even if two reconciliations race past
    /// the pre-check (law L2).
    pub async fn mark_complete(&self, id: u64, pod: &Pod) -> Result<(), Error> {
        {
            let reg = self.registry.lock();
            let job = reg.job(id).ok_or(Error::NotFound)?;
            if job.state.is_terminal() {
                return Ok(());
            }
        }

        let terminated = single_container_terminated(pod)
            .ok_or_else(|| Error::Upstream("mark_complete called on a non-terminated pod".to_string()))?;
        let exit_code = terminated.exit_code;
        let name = pod_name(pod)?;

        let log = self.cluster.read_pod_log(&self.namespace, &name).await.unwrap_or_default();
        self.logs.write(id, &log).await.map_err(|e| Error::Upstream(e.to_string()))?;

        let dispatch = {
            let mut reg = self.registry.lock();
            let still_pending = reg.job(id).map(|job| !job.state.is_terminal()).unwrap_or(false);
            if still_pending {
                let callback = reg.job(id).unwrap().callback.clone();
                reg.job_mut(id).unwrap().state = JobState::Complete { exit_code };
                reg.rebind_pod(id, Some(name.as_str()), None);
                let body = reg.job(id).unwrap().to_json(Some(&log));
                callback.map(|url| (url, body))
            } else {
                None
            }
        };

        if let Some((url, body)) = dispatch {
            self.callbacks.dispatch(url, body);
        }

        Ok(())
    }

    /// The single entry point shared by the watcher (C5) and the periodic
    /// reconciler (C6), per spec §4.3.
    pub async fn reconcile(&self, id: u64, pod: Option<Pod>) -> Result<(), Error> {
        let is_terminal = {
            let reg = self.registry.lock();
            match reg.job(id) {
                Some(job) => job.state.is_terminal(),
                None => return Ok(()),
            }
        };
        if is_terminal {
            return Ok(());
        }

        let pod = match pod {
            None => return self.mark_unscheduled(id).await,
            Some(pod) => pod,
        };

        let statuses = match pod.status.as_ref().and_then(|s| s.container_statuses.as_ref()) {
            None => return Ok(()),
            Some(cs) if cs.is_empty() => return Ok(()),
            Some(cs) => cs,
        };
        assert_eq!(statuses.len(), 1, "job pods must have exactly one container");
        assert_eq!(statuses[0].name, "default", "job pod's container must be named 'default'");

        if statuses[0].state.as_ref().and_then(|s| s.terminated.as_ref()).is_some() {
            self.mark_complete(id, &pod).await
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::fake::{pending_pod, terminated_pod, FakeClusterApi};

    fn service() -> JobService {
        JobService::new(
            Arc::new(Mutex::new(Registry::new())),
            Arc::new(FakeClusterApi::new()),
            Arc::new(LogStore::new(std::env::temp_dir().join("batch-control-plane-tests"))),
            CallbackDispatcher::new(),
            "default".to_string(),
            "test-instance".to_string(),
        )
    }

    fn pod_spec() -> Pod {
        use k8s_openapi::api::core::v1::{Container, PodSpec};
        Pod {
            spec: Some(PodSpec {
                containers: vec![Container { name: "default".to_string(), image: Some("busybox".to_string()), ..Default::default() }],
                restart_policy: Some("Never".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_registers_job_and_binds_pod() {
        let svc = service();
        let id = svc.create_job(pod_spec(), None, HashMap::new(), None).await.unwrap();
        let reg = svc.registry().lock();
        let job = reg.job(id).unwrap();
        assert_eq!(job.state, JobState::Created);
        assert!(job.pod_name.is_some());
        assert_eq!(reg.job_id_for_pod(job.pod_name.as_ref().unwrap()), Some(id));
    }

    #[tokio::test]
    async fn create_rejects_unknown_batch_id() {
        let svc = service();
        let err = svc.create_job(pod_spec(), Some(99), HashMap::new(), None).await.unwrap_err();
        assert!(matches!(err, Error::BadRequest(_)));
    }

    #[tokio::test]
    async fn cancel_deletes_pod_and_unbinds() {
        let svc = service();
        let id = svc.create_job(pod_spec(), None, HashMap::new(), None).await.unwrap();
        let pod_name = svc.registry().lock().job(id).unwrap().pod_name.clone().unwrap();

        svc.cancel_job(id).await.unwrap();

        let reg = svc.registry().lock();
        let job = reg.job(id).unwrap();
        assert_eq!(job.state, JobState::Cancelled);
        assert!(job.pod_name.is_none());
        assert_eq!(reg.job_id_for_pod(&pod_name), None);
    }

    #[tokio::test]
    async fn double_cancel_is_a_no_op() {
        let svc = service();
        let id = svc.create_job(pod_spec(), None, HashMap::new(), None).await.unwrap();
        svc.cancel_job(id).await.unwrap();
        svc.cancel_job(id).await.unwrap();
        assert_eq!(svc.registry().lock().job(id).unwrap().state, JobState::Cancelled);
    }

    #[tokio::test]
    async fn reconcile_on_terminated_pod_marks_complete_and_writes_log() {
        let log_dir = std::env::temp_dir().join("batch-control-plane-tests-complete");
        let fake = Arc::new(FakeClusterApi::new());
        let svc = JobService::new(
            Arc::new(Mutex::new(Registry::new())),
            fake.clone(),
            Arc::new(LogStore::new(log_dir)),
            CallbackDispatcher::new(),
            "default".to_string(),
            "test-instance".to_string(),
        );

        let id = svc.create_job(pod_spec(), None, HashMap::new(), None).await.unwrap();
        let pod_name = svc.registry().lock().job(id).unwrap().pod_name.clone().unwrap();
        fake.set_log(&pod_name, "hello\n");

        let pod = terminated_pod(&pod_name, 0);
        svc.reconcile(id, Some(pod)).await.unwrap();

        let reg = svc.registry().lock();
        assert_eq!(reg.job(id).unwrap().state, JobState::Complete { exit_code: 0 });
        assert!(reg.job(id).unwrap().pod_name.is_none());
        drop(reg);

        assert_eq!(svc.logs.read(id).await.unwrap(), "hello\n");
    }

    #[tokio::test]
    async fn reconcile_is_idempotent_on_repeat_observation() {
        let svc = service();
        let id = svc.create_job(pod_spec(), None, HashMap::new(), None).await.unwrap();
        let pod_name = svc.registry().lock().job(id).unwrap().pod_name.clone().unwrap();
        let pod = terminated_pod(&pod_name, 7);

        svc.reconcile(id, Some(pod.clone())).await.unwrap();
        svc.reconcile(id, Some(pod)).await.unwrap();

        assert_eq!(svc.registry().lock().job(id).unwrap().state, JobState::Complete { exit_code: 7 });
    }

    #[tokio::test]
    async fn reconcile_on_pending_pod_leaves_state_created() {
        let svc = service();
        let id = svc.create_job(pod_spec(), None, HashMap::new(), None).await.unwrap();
        let pod_name = svc.registry().lock().job(id).unwrap().pod_name.clone().unwrap();
        svc.reconcile(id, Some(pending_pod(&pod_name))).await.unwrap();
        assert_eq!(svc.registry().lock().job(id).unwrap().state, JobState::Created);
    }

    #[tokio::test]
    async fn reconcile_on_missing_pod_creates_replacement() {
        let svc = service();
        let id = svc.create_job(pod_spec(), None, HashMap::new(), None).await.unwrap();
        let original_pod_name = svc.registry().lock().job(id).unwrap().pod_name.clone().unwrap();

        svc.reconcile(id, None).await.unwrap();

        let reg = svc.registry().lock();
        let job = reg.job(id).unwrap();
        assert_eq!(job.state, JobState::Created);
        let new_pod_name = job.pod_name.clone().unwrap();
        assert_ne!(new_pod_name, original_pod_name);
        assert_eq!(reg.job_id_for_pod(&new_pod_name), Some(id));
    }
}
