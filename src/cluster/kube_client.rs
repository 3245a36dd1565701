use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, ListParams, LogParams, PostParams, WatchEvent, WatchParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use super::{ClusterApi, ClusterError, PodEvent, PodEventType};

/// Production `ClusterApi` backed by a real `kube::Client`, generalizing the
/// teacher's per-verb helpers in `kubers_utils.rs` behind the trait.
#[derive(Clone)]
pub struct KubeClusterApi {
    client: Client,
}

impl KubeClusterApi {
    /// Connects using either a local kubeconfig or in-cluster service
    /// account credentials, matching the original's
    /// `BATCH_USE_KUBE_CONFIG`-gated choice between
    /// `kube.config.load_kube_config()` and `kube.config.load_incluster_config()`.
    pub async fn connect(use_kube_config: bool) -> Result<Self, ClusterError> {
        let config = if use_kube_config {
            let kubeconfig = Kubeconfig::read().map_err(|e| ClusterError::Other(e.to_string()))?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| ClusterError::Other(e.to_string()))?
        } else {
            Config::incluster().map_err(|e| ClusterError::Other(e.to_string()))?
        };
        let client = Client::try_from(config).map_err(|e| ClusterError::Other(e.to_string()))?;
        Ok(KubeClusterApi { client })
    }

    fn pods(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn map_kube_err(err: kube::Error) -> ClusterError {
    if let kube::Error::Api(resp) = &err {
        if resp.code == 404 {
            return ClusterError::NotFound;
        }
    }
    ClusterError::Other(err.to_string())
}

#[async_trait]
impl ClusterApi for KubeClusterApi {
    async fn create_pod(&self, namespace: &str, pod: Pod) -> Result<Pod, ClusterError> {
        self.pods(namespace).create(&PostParams::default(), &pod).await.map_err(map_kube_err)
    }

    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.pods(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map_err(map_kube_err)?;
        Ok(())
    }

    async fn read_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ClusterError> {
        match self.pods(namespace).get(name).await {
            Ok(pod) => Ok(Some(pod)),
            Err(e) => match map_kube_err(e) {
                ClusterError::NotFound => Ok(None),
                other => Err(other),
            },
        }
    }

    async fn read_pod_log(&self, namespace: &str, name: &str) -> Result<String, ClusterError> {
        self.pods(namespace)
            .logs(name, &LogParams::default())
            .await
            .map_err(map_kube_err)
    }

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, ClusterError> {
        let list = self
            .pods(namespace)
            .list(&ListParams::default().labels(label_selector))
            .await
            .map_err(map_kube_err)?;
        Ok(list.items)
    }

    fn watch_pods(&self, namespace: &str, label_selector: &str) -> BoxStream<'static, Result<PodEvent, ClusterError>> {
        let client = self.client.clone();
        let namespace = namespace.to_string();
        let label_selector = label_selector.to_string();
        let (tx, rx) = mpsc::channel(128);

        tokio::spawn(async move {
            let api: Api<Pod> = Api::namespaced(client, &namespace);
            let wp = WatchParams::default().labels(&label_selector);
            // "0" starts the watch from the cluster's current resource
            // version rather than replaying history.
            let stream = match api.watch(&wp, "0").await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = tx.send(Err(map_kube_err(e))).await;
                    return;
                }
            };
            tokio::pin!(stream);
            while let Some(item) = stream.next().await {
                let mapped = match item {
                    Ok(WatchEvent::Added(pod)) => Ok(PodEvent { event_type: PodEventType::Added, pod }),
                    Ok(WatchEvent::Modified(pod)) => Ok(PodEvent { event_type: PodEventType::Modified, pod }),
                    Ok(WatchEvent::Deleted(pod)) => Ok(PodEvent { event_type: PodEventType::Deleted, pod }),
                    Ok(WatchEvent::Bookmark(_)) => continue,
                    Ok(WatchEvent::Error(status)) => Err(ClusterError::Other(status.to_string())),
                    Err(e) => Err(map_kube_err(e)),
                };
                let is_err = mapped.is_err();
                if tx.send(mapped).await.is_err() {
                    return;
                }
                if is_err {
                    return;
                }
            }
            // Stream ended naturally (410 Gone or server-side timeout): tell
            // the caller so the watcher loop can reconnect.
            let _ = tx.send(Err(ClusterError::Other("watch stream ended".to_string()))).await;
        });

        Box::pin(ReceiverStream::new(rx))
    }
}
