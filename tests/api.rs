//! End-to-end coverage of the HTTP surface against the in-memory fake
//! cluster, exercising scenarios S1-S6 from the design notes. Run with
//! `--features test-support` to expose `cluster::fake`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use batch_control_plane::callback::CallbackDispatcher;
use batch_control_plane::cluster::fake::{terminated_pod, FakeClusterApi};
use batch_control_plane::cluster::{ClusterApi, PodEvent, PodEventType};
use batch_control_plane::http::{self, AppState};
use batch_control_plane::job::JobService;
use batch_control_plane::logs::LogStore;
use batch_control_plane::registry::Registry;
use parking_lot::Mutex;
use serde_json::{json, Value};

struct TestServer {
    base_url: String,
    fake: Arc<FakeClusterApi>,
}

impl TestServer {
    async fn spawn() -> Self {
        let fake = Arc::new(FakeClusterApi::new());
        let log_store = LogStore::new(std::env::temp_dir().join(format!(
            "batch-control-plane-it-{}-{}",
            std::process::id(),
            fastrand_id()
        )));
        log_store.ensure_dir().unwrap();

        let jobs = JobService::new(
            Arc::new(Mutex::new(Registry::new())),
            fake.clone(),
            Arc::new(log_store),
            CallbackDispatcher::new(),
            "default".to_string(),
            "test-instance".to_string(),
        );

        let watcher_jobs = jobs.clone();
        let watcher_cluster: Arc<dyn ClusterApi> = fake.clone();
        tokio::spawn(async move {
            let _ = batch_control_plane::watcher::run(watcher_jobs, watcher_cluster, "default".to_string()).await;
        });

        let app = http::router(AppState { jobs });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        TestServer { base_url: format!("http://{addr}"), fake }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn fastrand_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

async fn poll_until(mut check: impl FnMut(&Value) -> bool, fetch: impl Fn() -> reqwest::RequestBuilder) -> Value {
    for _ in 0..50 {
        let body: Value = fetch().send().await.unwrap().json().await.unwrap();
        if check(&body) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition never became true");
}

fn basic_job_spec() -> Value {
    json!({
        "containers": [{"name": "default", "image": "busybox", "command": ["true"]}],
        "restartPolicy": "Never",
    })
}

#[tokio::test]
async fn s1_create_job_registers_pod_binding() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let resp: Value = client
        .post(server.url("/jobs/create"))
        .json(&json!({ "spec": basic_job_spec() }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(resp["id"], 1);
    assert_eq!(resp["state"], "Created");
    assert_eq!(server.fake.pod_names().len(), 1);
}

#[tokio::test]
async fn s2_pod_termination_completes_job_with_log() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(server.url("/jobs/create"))
        .json(&json!({ "spec": basic_job_spec() }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_u64().unwrap();
    let pod_name = server.fake.pod_names().remove(0);

    server.fake.set_log(&pod_name, "hello\n");
    let pod = terminated_pod(&pod_name, 0);
    server.fake.push_event(PodEvent { event_type: PodEventType::Modified, pod }).await;

    let doc = poll_until(
        |v| v["state"] == "Complete",
        || client.get(server.url(&format!("/jobs/{id}"))),
    )
    .await;

    assert_eq!(doc["exit_code"], 0);
    assert_eq!(doc["log"], "hello\n");
}

#[tokio::test]
async fn s3_cancel_deletes_pod_and_stops_tracking_it() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(server.url("/jobs/create"))
        .json(&json!({ "spec": basic_job_spec() }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_u64().unwrap();

    let cancel_status = client.post(server.url(&format!("/jobs/{id}/cancel"))).send().await.unwrap().status();
    assert!(cancel_status.is_success());

    let doc: Value = client.get(server.url(&format!("/jobs/{id}"))).send().await.unwrap().json().await.unwrap();
    assert_eq!(doc["state"], "Cancelled");
    assert!(server.fake.pod_names().is_empty());
}

#[tokio::test]
async fn s4_vanished_pod_is_recreated_by_sweep() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(server.url("/jobs/create"))
        .json(&json!({ "spec": basic_job_spec() }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_u64().unwrap();
    let original_pod = server.fake.pod_names().remove(0);

    server.fake.remove_pod(&original_pod);
    let stale = terminated_pod(&original_pod, 0); // event payload is irrelevant; the watcher re-fetches
    server.fake.push_event(PodEvent { event_type: PodEventType::Deleted, pod: stale }).await;

    for _ in 0..50 {
        let names = server.fake.pod_names();
        if names.len() == 1 && names[0] != original_pod {
            let doc: Value = client.get(server.url(&format!("/jobs/{id}"))).send().await.unwrap().json().await.unwrap();
            assert_eq!(doc["state"], "Created");
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("pod was never recreated");
}

#[tokio::test]
async fn s5_batch_aggregate_counts_match_member_states() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let batch: Value = client
        .post(server.url("/batches/create"))
        .json(&json!({ "attributes": {"k": "v"} }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let batch_id = batch["id"].as_u64().unwrap();

    let job_a: Value = client
        .post(server.url("/jobs/create"))
        .json(&json!({ "spec": basic_job_spec(), "batch_id": batch_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let job_b: Value = client
        .post(server.url("/jobs/create"))
        .json(&json!({ "spec": basic_job_spec(), "batch_id": batch_id }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let id_a = job_a["id"].as_u64().unwrap();
    let _id_b = job_b["id"].as_u64().unwrap();

    client.post(server.url(&format!("/jobs/{id_a}/cancel"))).send().await.unwrap();

    let pod_b = server.fake.pod_names().into_iter().find(|_| true).unwrap();
    // after cancelling job A its pod is gone; whichever pod remains belongs to job B
    server.fake.push_event(PodEvent {
        event_type: PodEventType::Modified,
        pod: terminated_pod(&pod_b, 0),
    })
    .await;

    let doc = poll_until(
        |v| v["jobs"]["Complete"] == 1,
        || client.get(server.url(&format!("/batches/{batch_id}"))),
    )
    .await;

    assert_eq!(doc["jobs"]["Created"], 0);
    assert_eq!(doc["jobs"]["Complete"], 1);
    assert_eq!(doc["jobs"]["Cancelled"], 1);
    assert_eq!(doc["attributes"]["k"], "v");
}

#[tokio::test]
async fn s6_concurrent_cancels_converge_on_cancelled() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();

    let created: Value = client
        .post(server.url("/jobs/create"))
        .json(&json!({ "spec": basic_job_spec() }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let id = created["id"].as_u64().unwrap();

    let url = server.url(&format!("/jobs/{id}/cancel"));
    let (r1, r2) = tokio::join!(client.post(&url).send(), client.post(&url).send());
    assert!(r1.unwrap().status().is_success());
    assert!(r2.unwrap().status().is_success());

    let doc: Value = client.get(server.url(&format!("/jobs/{id}"))).send().await.unwrap().json().await.unwrap();
    assert_eq!(doc["state"], "Cancelled");
}

#[tokio::test]
async fn unknown_job_returns_404() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let status = client.get(server.url("/jobs/999")).send().await.unwrap().status();
    assert_eq!(status.as_u16(), 404);
}

#[tokio::test]
async fn create_with_unknown_batch_id_is_rejected() {
    let server = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let resp = client
        .post(server.url("/jobs/create"))
        .json(&json!({ "spec": basic_job_spec(), "batch_id": 999 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 400);
}
