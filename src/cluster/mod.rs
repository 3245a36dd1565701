//! The container-orchestrator client, abstracted behind a trait (spec §6.2).
//!
//! Treated by spec.md §1 as an external collaborator assumed present; this
//! module defines the concrete seam so the reconciliation core (job.rs,
//! watcher.rs, reconciler.rs) can be built and tested without a live
//! cluster, generalizing the teacher's thin per-resource helpers in
//! `kubers_utils.rs` (`kube_create_from_resource`, `kube_get_resources_by_selector`,
//! ...) behind a single trait boundary instead of one free function per verb.

pub mod kube_client;

#[cfg(any(test, feature = "test-support"))]
pub mod fake;

use async_trait::async_trait;
use futures::stream::BoxStream;
use k8s_openapi::api::core::v1::Pod;
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum ClusterError {
    /// The target resource does not exist. Surfaced distinctly from other
    /// failures so callers can apply 404-tolerant policies themselves
    /// (spec §4.2's deletion policy, §4.3's "fetch yields pod = None").
    #[error("not found")]
    NotFound,
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodEventType {
    Added,
    Modified,
    Deleted,
}

#[derive(Debug, Clone)]
pub struct PodEvent {
    pub event_type: PodEventType,
    pub pod: Pod,
}

/// Required capabilities per spec §6.2.
#[async_trait]
pub trait ClusterApi: Send + Sync {
    async fn create_pod(&self, namespace: &str, pod: Pod) -> Result<Pod, ClusterError>;

    /// 404 is a capability of this verb, not tolerated here: callers (the
    /// job state machine's deletion policy, spec §4.2) decide what a
    /// `NotFound` means for them.
    async fn delete_pod(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;

    /// Returns `Ok(None)` on a 404, matching spec §4.3's "a 404 fetch
    /// yields pod = None".
    async fn read_pod(&self, namespace: &str, name: &str) -> Result<Option<Pod>, ClusterError>;

    async fn read_pod_log(&self, namespace: &str, name: &str) -> Result<String, ClusterError>;

    async fn list_pods(&self, namespace: &str, label_selector: &str) -> Result<Vec<Pod>, ClusterError>;

    /// A lazy, long-lived sequence of pod events filtered by label
    /// selector. The stream ends (with an `Err`) only on an unrecoverable
    /// failure; the watcher (C5) treats that as cause for the supervisor
    /// to restart it.
    fn watch_pods(&self, namespace: &str, label_selector: &str) -> BoxStream<'static, Result<PodEvent, ClusterError>>;
}
