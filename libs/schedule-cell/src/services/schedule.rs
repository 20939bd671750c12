use std::collections::HashSet;

use chrono::Utc;
use reqwest::Method;
use serde_json::{json, Value};
use tracing::debug;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{ScheduleError, WeeklySchedule, WeeklyScheduleEntry};
use crate::services::timeslot::time_to_minutes;

pub struct ScheduleService {
    supabase: SupabaseClient,
}

impl ScheduleService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
        }
    }

    /// Fetch a doctor's full weekly schedule, ordered by day.
    pub async fn get_doctor_schedule(
        &self,
        doctor_id: &str,
        auth_token: Option<&str>,
    ) -> Result<Vec<WeeklySchedule>, ScheduleError> {
        debug!("Fetching weekly schedule for doctor: {}", doctor_id);

        let path = format!(
            "/rest/v1/doctor_weekly_schedules?doctor_id=eq.{}&order=day_of_week.asc",
            doctor_id
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row))
            .collect::<Result<Vec<WeeklySchedule>, _>>()
            .map_err(|e| ScheduleError::DatabaseError(format!("Failed to parse schedule: {}", e)))
    }

    /// Fetch the single entry for one day of the week, if the doctor works
    /// that day at all.
    pub async fn get_schedule_for_day(
        &self,
        doctor_id: &str,
        day_of_week: i32,
        auth_token: Option<&str>,
    ) -> Result<Option<WeeklySchedule>, ScheduleError> {
        let path = format!(
            "/rest/v1/doctor_weekly_schedules?doctor_id=eq.{}&day_of_week=eq.{}",
            doctor_id, day_of_week
        );
        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        match result.into_iter().next() {
            Some(row) => serde_json::from_value(row).map(Some).map_err(|e| {
                ScheduleError::DatabaseError(format!("Failed to parse schedule: {}", e))
            }),
            None => Ok(None),
        }
    }

    /// Replace the doctor's entire weekly schedule. All entries are validated
    /// up front; the stored rows are then deleted and the new set inserted as
    /// one batch, so a rejected entry never leaves a half-written week.
    pub async fn replace_schedule(
        &self,
        doctor_id: &str,
        entries: Vec<WeeklyScheduleEntry>,
        auth_token: &str,
    ) -> Result<Vec<WeeklySchedule>, ScheduleError> {
        debug!(
            "Replacing weekly schedule for doctor {} with {} entries",
            doctor_id,
            entries.len()
        );

        validate_entries(&entries)?;

        let delete_path = format!(
            "/rest/v1/doctor_weekly_schedules?doctor_id=eq.{}",
            doctor_id
        );
        let _: Vec<Value> = self
            .supabase
            .request(Method::DELETE, &delete_path, Some(auth_token), None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        if entries.is_empty() {
            return Ok(vec![]);
        }

        let now = Utc::now().to_rfc3339();
        let rows: Vec<Value> = entries
            .iter()
            .map(|entry| {
                json!({
                    "doctor_id": doctor_id,
                    "day_of_week": entry.day_of_week,
                    "start_time": entry.start_time,
                    "end_time": entry.end_time,
                    "is_available": entry.is_available,
                    "break_times": entry.break_times,
                    "slot_duration_minutes": entry.slot_duration_minutes,
                    "max_appointments": entry.max_appointments,
                    "created_at": now,
                    "updated_at": now
                })
            })
            .collect();

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/doctor_weekly_schedules",
                Some(auth_token),
                Some(Value::Array(rows)),
                Some(headers),
            )
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        let stored = result
            .into_iter()
            .map(|row| serde_json::from_value(row))
            .collect::<Result<Vec<WeeklySchedule>, _>>()
            .map_err(|e| {
                ScheduleError::DatabaseError(format!("Failed to parse stored schedule: {}", e))
            })?;

        debug!("Stored {} schedule entries", stored.len());
        Ok(stored)
    }
}

/// Validate a replacement schedule as a whole. Any bad entry rejects the
/// full request, naming the day and field at fault.
fn validate_entries(entries: &[WeeklyScheduleEntry]) -> Result<(), ScheduleError> {
    let mut seen_days = HashSet::new();

    for entry in entries {
        let day = entry.day_of_week;

        if !(0..=6).contains(&day) {
            return Err(ScheduleError::ValidationError(format!(
                "day {}: day_of_week must be between 0 (Sunday) and 6 (Saturday)",
                day
            )));
        }

        if !seen_days.insert(day) {
            return Err(ScheduleError::ValidationError(format!(
                "day {}: duplicate schedule entry",
                day
            )));
        }

        let start = time_to_minutes(&entry.start_time)
            .map_err(|_| field_error(day, "start_time", &entry.start_time))?;
        let end = time_to_minutes(&entry.end_time)
            .map_err(|_| field_error(day, "end_time", &entry.end_time))?;

        if start >= end {
            return Err(ScheduleError::ValidationError(format!(
                "day {}: start_time must be before end_time",
                day
            )));
        }

        if entry.slot_duration_minutes <= 0 {
            return Err(ScheduleError::ValidationError(format!(
                "day {}: slot_duration_minutes must be positive",
                day
            )));
        }

        // Breaks are validated individually; overlap between breaks is
        // tolerated since it only re-excludes the same minutes.
        for break_time in &entry.break_times {
            let break_start = time_to_minutes(&break_time.start_time)
                .map_err(|_| field_error(day, "break_times.start_time", &break_time.start_time))?;
            let break_end = time_to_minutes(&break_time.end_time)
                .map_err(|_| field_error(day, "break_times.end_time", &break_time.end_time))?;

            if break_start >= break_end {
                return Err(ScheduleError::ValidationError(format!(
                    "day {}: break start_time must be before break end_time",
                    day
                )));
            }
        }
    }

    Ok(())
}

fn field_error(day: i32, field: &str, value: &str) -> ScheduleError {
    ScheduleError::ValidationError(format!("day {}: {}: invalid time {:?}", day, field, value))
}
