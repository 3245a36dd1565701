use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use k8s_openapi::api::core::v1::{Pod, PodSpec};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::Error;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub spec: PodSpec,
    pub batch_id: Option<u64>,
    pub attributes: Option<HashMap<String, String>>,
    pub callback: Option<String>,
}

pub async fn create_job(State(state): State<AppState>, Json(req): Json<CreateJobRequest>) -> Result<Json<Value>, Error> {
    let pod = Pod { spec: Some(req.spec), ..Default::default() };
    let id = state
        .jobs
        .create_job(pod, req.batch_id, req.attributes.unwrap_or_default(), req.callback)
        .await?;
    let doc = state.jobs.job_json(id).await.ok_or(Error::NotFound)?;
    Ok(Json(doc))
}

pub async fn list_jobs(State(state): State<AppState>) -> Json<Value> {
    Json(Value::Array(state.jobs.list_jobs_json().await))
}

pub async fn get_job(State(state): State<AppState>, Path(id): Path<u64>) -> Result<Json<Value>, Error> {
    state.jobs.job_json(id).await.map(Json).ok_or(Error::NotFound)
}

pub async fn get_job_log(State(state): State<AppState>, Path(id): Path<u64>) -> Result<Response, Error> {
    match state.jobs.log_for_id(id).await {
        Some(text) => Ok((StatusCode::OK, [(header::CONTENT_TYPE, "text/plain; charset=utf-8")], text).into_response()),
        None => Err(Error::NotFound),
    }
}

pub async fn cancel_job(State(state): State<AppState>, Path(id): Path<u64>) -> Result<Json<Value>, Error> {
    state.jobs.cancel_job(id).await?;
    Ok(Json(json!({})))
}

pub async fn delete_job(State(state): State<AppState>, Path(id): Path<u64>) -> Result<Json<Value>, Error> {
    state.jobs.delete_job(id).await?;
    Ok(Json(json!({})))
}
