use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::{delete, get, post},
};
use ::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    application::task_list::{ListView, TaskListManager},
    domain::{store::TaskStore, task::{Task, TaskId}},
    http::types::ApiError,
};

pub struct AppState<S: TaskStore> { pub manager: TaskListManager<S> }

impl<S: TaskStore> Clone for AppState<S> {
    fn clone(&self) -> Self { Self { manager: self.manager.clone() } }
}

pub fn router<S: TaskStore>(state: AppState<S>) -> Router {
    Router::new()
        .route("/tasks", get(list_tasks::<S>).post(insert_task::<S>))
        .route("/tasks/reload", post(reload_tasks::<S>))
        .route("/tasks/reorder", post(reorder_tasks::<S>))
        .route("/tasks/:id/toggle", post(toggle_task::<S>))
        .route("/tasks/:id", delete(delete_task::<S>))
        .with_state(state)
}

async fn list_tasks<S: TaskStore>(State(state): State<AppState<S>>) -> Json<ListView> {
    Json(state.manager.view().await)
}

async fn reload_tasks<S: TaskStore>(State(state): State<AppState<S>>) -> Result<Json<ListView>, ApiError> {
    state.manager.load().await?;
    Ok(Json(state.manager.view().await))
}

#[derive(Deserialize)]
struct InsertBody { label: String }

async fn insert_task<S: TaskStore>(State(state): State<AppState<S>>, Json(payload): Json<InsertBody>) -> Result<(StatusCode, Json<Task>), ApiError> {
    let task = state.manager.insert(&payload.label).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[derive(Serialize)]
struct Toggled { id: TaskId, completed: bool }

async fn toggle_task<S: TaskStore>(State(state): State<AppState<S>>, Path(id): Path<String>) -> Result<Json<Toggled>, ApiError> {
    let id = parse_id(&id)?;
    let completed = state.manager.toggle_completion(id).await?;
    Ok(Json(Toggled { id, completed }))
}

#[derive(Deserialize)]
struct ReorderBody { task_id: Uuid, from_index: usize, to_index: usize }

async fn reorder_tasks<S: TaskStore>(State(state): State<AppState<S>>, Json(payload): Json<ReorderBody>) -> Result<Json<Vec<Task>>, ApiError> {
    let tasks = state.manager.reorder(TaskId(payload.task_id), payload.from_index, payload.to_index).await?;
    Ok(Json(tasks))
}

#[derive(Deserialize)]
struct DeleteParams { #[serde(default)] confirm: bool }

async fn delete_task<S: TaskStore>(State(state): State<AppState<S>>, Path(id): Path<String>, Query(params): Query<DeleteParams>) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    let ticket = state.manager.request_removal(id).await?;
    if !params.confirm {
        return Err(ApiError::new(StatusCode::PRECONDITION_REQUIRED, format!("{} Repeat with ?confirm=true", ticket.prompt())));
    }
    state.manager.remove(ticket).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_id(s: &str) -> Result<TaskId, ApiError> {
    Uuid::parse_str(s).map(TaskId).map_err(|_| ApiError::new(StatusCode::BAD_REQUEST, "invalid id"))
}
