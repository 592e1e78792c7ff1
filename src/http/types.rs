use axum::response::{IntoResponse, Response};
use ::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::domain::error::TaskListError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: u16,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status: status.as_u16(), message: message.into() }
    }
}

impl From<TaskListError> for ApiError {
    fn from(err: TaskListError) -> Self {
        let status = match &err {
            TaskListError::Validation(_) | TaskListError::Ordering(_) => StatusCode::UNPROCESSABLE_ENTITY,
            TaskListError::NotFound(_) => StatusCode::NOT_FOUND,
            TaskListError::Stale { .. } | TaskListError::Busy(_) => StatusCode::CONFLICT,
            _ => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, axum::Json(self)).into_response()
    }
}
