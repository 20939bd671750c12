use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use axum_extra::TypedHeader;
use chrono::NaiveDate;
use headers::{authorization::Bearer, Authorization};
use serde::Deserialize;
use serde_json::{json, Value};

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CheckAvailabilityRequest, UpdateScheduleRequest};
use crate::services::availability::AvailabilityService;
use crate::services::schedule::ScheduleService;

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub date: NaiveDate,
}

// ==============================================================================
// PUBLIC HANDLERS (NO AUTHENTICATION REQUIRED)
// ==============================================================================

#[axum::debug_handler]
pub async fn get_doctor_availability(
    State(state): State<Arc<AppConfig>>,
    Path(doctor_id): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<Value>, AppError> {
    let availability_service = AvailabilityService::new(&state);

    let availability = availability_service
        .get_day_availability(&doctor_id, query.date, None)
        .await?;

    Ok(Json(json!(availability)))
}

#[axum::debug_handler]
pub async fn check_availability(
    State(state): State<Arc<AppConfig>>,
    Json(request): Json<CheckAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    let availability_service = AvailabilityService::new(&state);

    let result = availability_service
        .is_slot_available(&request, None)
        .await?;

    Ok(Json(json!(result)))
}

// ==============================================================================
// PROTECTED HANDLERS (DOCTOR SCOPED)
// ==============================================================================

#[axum::debug_handler]
pub async fn get_my_schedule(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
) -> Result<Json<Value>, AppError> {
    if !user.is_doctor() {
        return Err(AppError::Auth("Doctor role required".to_string()));
    }

    let schedule_service = ScheduleService::new(&state);

    let schedules = schedule_service
        .get_doctor_schedule(&user.id, Some(auth.token()))
        .await?;

    Ok(Json(json!({ "schedules": schedules })))
}

#[axum::debug_handler]
pub async fn update_schedule(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<User>,
    TypedHeader(auth): TypedHeader<Authorization<Bearer>>,
    Json(request): Json<UpdateScheduleRequest>,
) -> Result<Json<Value>, AppError> {
    if !user.is_doctor() {
        return Err(AppError::Auth("Doctor role required".to_string()));
    }

    let schedule_service = ScheduleService::new(&state);

    let stored = schedule_service
        .replace_schedule(&user.id, request.schedules, auth.token())
        .await?;

    Ok(Json(json!({ "schedules": stored })))
}
