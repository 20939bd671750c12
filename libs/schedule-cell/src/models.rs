use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_models::error::AppError;

/// A doctor's recurring working pattern for one day of the week, as stored.
/// Exactly one row exists per (doctor, day_of_week); updates replace the
/// doctor's full set of rows wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklySchedule {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub day_of_week: i32, // 0 = Sunday, 1 = Monday, etc.
    pub start_time: String, // "HH:MM"
    pub end_time: String,   // "HH:MM"
    pub is_available: bool,
    #[serde(default)]
    pub break_times: Vec<BreakTime>,
    pub slot_duration_minutes: i32,
    pub max_appointments: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One break interval inside a day's working window. Overlapping breaks are
/// tolerated; they just exclude the same minutes twice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakTime {
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Client-supplied schedule entry for the wholesale replace operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeeklyScheduleEntry {
    pub day_of_week: i32,
    pub start_time: String,
    pub end_time: String,
    #[serde(default = "default_is_available")]
    pub is_available: bool,
    #[serde(default)]
    pub break_times: Vec<BreakTime>,
    #[serde(default = "default_slot_duration")]
    pub slot_duration_minutes: i32,
    #[serde(default)]
    pub max_appointments: Option<i32>,
}

fn default_is_available() -> bool {
    true
}

fn default_slot_duration() -> i32 {
    30
}

/// A bookable slot. Only available slots are ever materialized; taken or
/// past slots are omitted from results entirely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AvailableSlot {
    pub time: String, // "HH:MM"
    pub start_date_time: NaiveDateTime,
    pub available: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateScheduleRequest {
    pub schedules: Vec<WeeklyScheduleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckAvailabilityRequest {
    pub doctor_id: Uuid,
    pub date: NaiveDate,
    pub time: String,
}

/// Answer to "is this doctor free at this date and time".
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotAvailability {
    pub is_available: bool,
    pub reason: Option<String>,
}

/// Summary of the day's working pattern returned alongside slots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSummary {
    pub start_time: String,
    pub end_time: String,
    pub slot_duration_minutes: i32,
    pub max_appointments: Option<i32>,
}

/// Full availability answer for one doctor and one date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DayAvailability {
    pub available_slots: Vec<AvailableSlot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub doctor_schedule: Option<ScheduleSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

// Error types specific to schedule operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum ScheduleError {
    #[error("Invalid time format: {0}")]
    InvalidTimeFormat(String),

    #[error("Invalid slot duration: {0}")]
    InvalidSlotDuration(i32),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Schedule not found")]
    NotFound,

    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<ScheduleError> for AppError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::InvalidTimeFormat(_)
            | ScheduleError::InvalidSlotDuration(_)
            | ScheduleError::ValidationError(_) => AppError::ValidationError(err.to_string()),
            ScheduleError::NotFound => AppError::NotFound(err.to_string()),
            ScheduleError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
