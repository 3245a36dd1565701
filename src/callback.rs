//! Fire-and-forget completion callback dispatcher (C8, spec §4.5).
//!
//! Grounded on the teacher's pattern of detaching notification work from the
//! path that produced it (see `deployment_report`'s report senders, which
//! never block the reconciliation loop on delivery). A completion callback
//! is a single best-effort POST; failures are logged and swallowed, never
//! retried, and dispatch always runs on its own task so it cannot poison the
//! caller.

use std::time::Duration;

use serde_json::Value;

const CALLBACK_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone)]
pub struct CallbackDispatcher {
    client: reqwest::Client,
}

impl CallbackDispatcher {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(CALLBACK_TIMEOUT)
            .build()
            .expect("reqwest client builder with a timeout only, cannot fail");
        CallbackDispatcher { client }
    }

    /// Spawns a detached task that POSTs `body` to `url`. Never awaited by
    /// the caller: the request/reconcile path must not block on delivery.
    pub fn dispatch(&self, url: String, body: Value) {
        let client = self.client.clone();
        tokio::spawn(async move {
            let job_id = body.get("id").cloned();
            match client.post(&url).json(&body).send().await {
                Ok(resp) => {
                    tracing::info!(?job_id, url, status = %resp.status(), "dispatched completion callback");
                }
                Err(err) => {
                    tracing::warn!(?job_id, url, error = %err, "completion callback failed, not retrying");
                }
            }
        });
    }
}

impl Default for CallbackDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
