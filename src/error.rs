use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Recurring expense not found")]
    NotFound,

    #[error("{}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Recurring expense is already paused")]
    AlreadyPaused,

    #[error("Recurring expense is already active")]
    AlreadyActive,

    #[error("Failed to generate expense from template {template_id}: {message}")]
    Generation { template_id: Uuid, message: String },

    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    /// Stable machine-checkable name for the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::NotFound => "not_found",
            AppError::Validation(_) => "validation_failed",
            AppError::AlreadyPaused => "already_paused",
            AppError::AlreadyActive => "already_active",
            AppError::Generation { .. } => "generation_failed",
            AppError::Database(_) => "database_error",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Validation(_) | AppError::AlreadyPaused | AppError::AlreadyActive => {
                StatusCode::BAD_REQUEST
            }
            AppError::Generation { .. } | AppError::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {:#?}", &self);
        } else {
            tracing::info!("Request rejected: {}", &self);
        }

        (
            status,
            Json(serde_json::json!({
                "message": self.to_string(),
                "kind": self.kind(),
            })),
        )
            .into_response()
    }
}
