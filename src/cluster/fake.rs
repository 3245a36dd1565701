//! In-memory `ClusterApi` stand-in used by tests, grounded on the teacher's
//! practice of exercising real component seams through a harness
//! (`tests/kube/jobs.rs`) rather than mocking individual function calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::{Pod, PodStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ClusterApi, ClusterError, PodEvent, PodEventType};

struct Inner {
    pods: HashMap<String, Pod>,
    logs: HashMap<String, String>,
}

/// A fake cluster: `create_pod` assigns a deterministic name, `delete_pod`
/// is 404-tolerant like the real one, and `push_event`/`remove_pod` let
/// tests simulate the cluster side of the world without a live API server.
/// `watch_pods` is backed by a single channel created at construction time;
/// tests drive it through [`FakeClusterApi::push_event`].
pub struct FakeClusterApi {
    inner: Mutex<Inner>,
    name_seq: AtomicU64,
    events_tx: mpsc::Sender<Result<PodEvent, ClusterError>>,
    events_rx: Mutex<Option<mpsc::Receiver<Result<PodEvent, ClusterError>>>>,
}

impl Default for FakeClusterApi {
    fn default() -> Self {
        let (tx, rx) = mpsc::channel(128);
        FakeClusterApi {
            inner: Mutex::new(Inner { pods: HashMap::new(), logs: HashMap::new() }),
            name_seq: AtomicU64::new(0),
            events_tx: tx,
            events_rx: Mutex::new(Some(rx)),
        }
    }
}

impl FakeClusterApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pushes a synthetic pod event onto the stream `watch_pods` returns.
    pub async fn push_event(&self, event: PodEvent) {
        let _ = self.events_tx.send(Ok(event)).await;
    }

    pub fn set_log(&self, pod_name: &str, content: &str) {
        self.inner.lock().logs.insert(pod_name.to_string(), content.to_string());
    }

    pub fn remove_pod(&self, pod_name: &str) {
        self.inner.lock().pods.remove(pod_name);
    }

    /// Overwrites (or inserts) a pod's cluster-observed state directly, for
    /// tests that need to simulate e.g. a container terminating between
    /// sweeps without going through `create_pod`.
    pub fn set_pod(&self, pod: Pod) {
        if let Some(name) = pod.metadata.name.clone() {
            self.inner.lock().pods.insert(name, pod);
        }
    }

    pub fn pod_names(&self) -> Vec<String> {
        self.inner.lock().pods.keys().cloned().collect()
    }
}

#[async_trait]
impl ClusterApi for FakeClusterApi {
    async fn create_pod(&self, _namespace: &str, mut pod: Pod) -> Result<Pod, ClusterError> {
        let seq = self.name_seq.fetch_add(1, Ordering::SeqCst);
        let generate_name = pod
            .metadata
            .generate_name
            .clone()
            .unwrap_or_else(|| "pod-".to_string());
        let name = format!("{generate_name}{seq:04x}");
        pod.metadata = ObjectMeta { name: Some(name.clone()), ..pod.metadata };
        pod.status = Some(PodStatus::default());
        self.inner.lock().pods.insert(name.clone(), pod.clone());
        Ok(pod)
    }

    async fn delete_pod(&self, _namespace: &str, name: &str) -> Result<(), ClusterError> {
        let mut inner = self.inner.lock();
        if inner.pods.remove(name).is_none() {
            return Err(ClusterError::NotFound);
        }
        Ok(())
    }

    async fn read_pod(&self, _namespace: &str, name: &str) -> Result<Option<Pod>, ClusterError> {
        Ok(self.inner.lock().pods.get(name).cloned())
    }

    async fn read_pod_log(&self, _namespace: &str, name: &str) -> Result<String, ClusterError> {
        self.inner.lock().logs.get(name).cloned().ok_or(ClusterError::NotFound)
    }

    async fn list_pods(&self, _namespace: &str, _label_selector: &str) -> Result<Vec<Pod>, ClusterError> {
        Ok(self.inner.lock().pods.values().cloned().collect())
    }

    fn watch_pods(&self, _namespace: &str, _label_selector: &str) -> BoxStream<'static, Result<PodEvent, ClusterError>> {
        match self.events_rx.lock().take() {
            Some(rx) => Box::pin(ReceiverStream::new(rx)),
            // A second concurrent watch in the same test: nothing to hand
            // back, so stay pending rather than erroring the test.
            None => Box::pin(futures::stream::pending()),
        }
    }
}

/// Helper for tests to synthesize a terminated-container pod observation.
pub fn terminated_pod(name: &str, exit_code: i32) -> Pod {
    use k8s_openapi::api::core::v1::{ContainerState, ContainerStateTerminated, ContainerStatus};

    Pod {
        metadata: ObjectMeta { name: Some(name.to_string()), ..Default::default() },
        status: Some(PodStatus {
            container_statuses: Some(vec![ContainerStatus {
                name: "default".to_string(),
                state: Some(ContainerState {
                    terminated: Some(ContainerStateTerminated { exit_code, ..Default::default() }),
                    ..Default::default()
                }),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn pending_pod(name: &str) -> Pod {
    Pod {
        metadata: ObjectMeta { name: Some(name.to_string()), ..Default::default() },
        status: Some(PodStatus { container_statuses: Some(vec![]), ..Default::default() }),
        ..Default::default()
    }
}
