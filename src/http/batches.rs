use std::collections::HashMap;

use axum::extract::{Path, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::batch::Batch;
use crate::error::Error;

use super::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateBatchRequest {
    pub attributes: Option<HashMap<String, String>>,
}

pub async fn create_batch(State(state): State<AppState>, Json(req): Json<CreateBatchRequest>) -> Json<Value> {
    let mut reg = state.jobs.registry().lock();
    let id = reg.next_id();
    reg.insert_batch(Batch::new(id, req.attributes.unwrap_or_default()));
    let batch = reg.batch(id).unwrap().clone();
    Json(batch.to_json(&reg))
}

pub async fn get_batch(State(state): State<AppState>, Path(id): Path<u64>) -> Result<Json<Value>, Error> {
    let reg = state.jobs.registry().lock();
    let batch = reg.batch(id).ok_or(Error::NotFound)?.clone();
    Ok(Json(batch.to_json(&reg)))
}

pub async fn delete_batch(State(state): State<AppState>, Path(id): Path<u64>) -> Result<Json<Value>, Error> {
    let mut reg = state.jobs.registry().lock();
    reg.remove_batch(id).ok_or(Error::NotFound)?;
    Ok(Json(json!({})))
}
