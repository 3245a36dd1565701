//! HTTP surface (C9, spec §4.7, §6.1). Out of scope per spec §1 is "the
//! HTTP framing itself"; this module is the concrete routing/dispatch this
//! service needs, since the teacher crate has no web framework of its own.
//! Axum was chosen as the framing layer (enrichment from the pack's
//! service-style repos, e.g. `eosin-platform-eosin`'s `*/src/server.rs`
//! binaries) because it composes cleanly with the `tokio`/`tower` stack the
//! teacher already depends on.

mod batches;
mod jobs;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::job::JobService;

#[derive(Clone)]
pub struct AppState {
    pub jobs: JobService,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/jobs/create", post(jobs::create_job))
        .route("/jobs", get(jobs::list_jobs))
        .route("/jobs/:id", get(jobs::get_job))
        .route("/jobs/:id/log", get(jobs::get_job_log))
        .route("/jobs/:id/cancel", post(jobs::cancel_job))
        .route("/jobs/:id/delete", delete(jobs::delete_job))
        .route("/batches/create", post(batches::create_batch))
        .route("/batches/:id", get(batches::get_batch))
        .route("/batches/:id/delete", delete(batches::delete_batch))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}
