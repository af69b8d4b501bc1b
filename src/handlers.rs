use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    AppState,
    domain::{Expense, NewTemplate, RecurringTemplate, TemplatePatch},
    error::AppError,
};

#[derive(Debug, Deserialize, Serialize)]
pub struct DataResponse<T> {
    pub data: T,
}

#[derive(Debug, Serialize)]
pub struct GeneratedResponse {
    pub expense: Expense,
    pub recurring: RecurringTemplate,
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub active: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct UpcomingParams {
    pub days: Option<i64>,
}

const DEFAULT_UPCOMING_DAYS: i64 = 30;

#[axum::debug_handler]
pub async fn create_recurring(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<NewTemplate>,
) -> Result<(StatusCode, Json<DataResponse<RecurringTemplate>>), AppError> {
    let template = state.service.create(user_id, payload).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: template })))
}

pub async fn list_recurring(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<ListParams>,
) -> Result<Json<DataResponse<Vec<RecurringTemplate>>>, AppError> {
    let templates = if params.active.unwrap_or(false) {
        state.service.list_active(user_id).await?
    } else {
        state.service.list(user_id).await?
    };
    Ok(Json(DataResponse { data: templates }))
}

pub async fn get_recurring(
    State(state): State<Arc<AppState>>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DataResponse<RecurringTemplate>>, AppError> {
    let template = state.service.get(user_id, id).await?;
    Ok(Json(DataResponse { data: template }))
}

pub async fn update_recurring(
    State(state): State<Arc<AppState>>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
    Json(patch): Json<TemplatePatch>,
) -> Result<Json<DataResponse<RecurringTemplate>>, AppError> {
    let template = state.service.update(user_id, id, patch).await?;
    Ok(Json(DataResponse { data: template }))
}

pub async fn delete_recurring(
    State(state): State<Arc<AppState>>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state.service.delete(user_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn pause_recurring(
    State(state): State<Arc<AppState>>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DataResponse<RecurringTemplate>>, AppError> {
    let template = state.service.pause(user_id, id).await?;
    Ok(Json(DataResponse { data: template }))
}

pub async fn resume_recurring(
    State(state): State<Arc<AppState>>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DataResponse<RecurringTemplate>>, AppError> {
    let template = state.service.resume(user_id, id).await?;
    Ok(Json(DataResponse { data: template }))
}

/// Ad hoc "log this recurring bill now". Bypasses the due check on purpose;
/// see `RecurringExpenseService::generate_now`.
#[axum::debug_handler]
pub async fn generate_recurring(
    State(state): State<Arc<AppState>>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> Result<(StatusCode, Json<DataResponse<GeneratedResponse>>), AppError> {
    let (expense, recurring) = state.service.generate_now(user_id, id).await?;
    Ok((
        StatusCode::CREATED,
        Json(DataResponse {
            data: GeneratedResponse { expense, recurring },
        }),
    ))
}

pub async fn recurring_history(
    State(state): State<Arc<AppState>>,
    Path((user_id, id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DataResponse<Vec<Expense>>>, AppError> {
    let expenses = state.service.history(user_id, id).await?;
    Ok(Json(DataResponse { data: expenses }))
}

pub async fn upcoming_recurring(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<UpcomingParams>,
) -> Result<Json<DataResponse<Vec<RecurringTemplate>>>, AppError> {
    let days = params.days.unwrap_or(DEFAULT_UPCOMING_DAYS);
    let templates = state.service.upcoming(user_id, days).await?;
    Ok(Json(DataResponse { data: templates }))
}
