use std::collections::HashSet;

use chrono::{Datelike, FixedOffset, NaiveDate, Utc, Weekday};
use reqwest::Method;
use serde_json::Value;
use tracing::debug;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::{
    AvailableSlot, CheckAvailabilityRequest, DayAvailability, ScheduleError, ScheduleSummary,
    SlotAvailability,
};
use crate::services::schedule::ScheduleService;
use crate::services::timeslot::{generate_slots, minutes_to_time, time_to_minutes};

pub struct AvailabilityService {
    supabase: SupabaseClient,
    schedules: ScheduleService,
    clinic_offset: FixedOffset,
}

/// 0 = Sunday through 6 = Saturday, matching the stored day keys.
pub fn day_of_week(date: NaiveDate) -> i32 {
    match date.weekday() {
        Weekday::Sun => 0,
        Weekday::Mon => 1,
        Weekday::Tue => 2,
        Weekday::Wed => 3,
        Weekday::Thu => 4,
        Weekday::Fri => 5,
        Weekday::Sat => 6,
    }
}

impl AvailabilityService {
    pub fn new(config: &AppConfig) -> Self {
        Self {
            supabase: SupabaseClient::new(config),
            schedules: ScheduleService::new(config),
            clinic_offset: config.clinic_time_offset(),
        }
    }

    /// Free slots for one doctor on one date. A doctor with no schedule for
    /// that day simply has no slots; that is not an error.
    pub async fn get_available_slots(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<Vec<AvailableSlot>, ScheduleError> {
        debug!("Calculating available slots for doctor {} on {}", doctor_id, date);

        let schedule = match self
            .schedules
            .get_schedule_for_day(doctor_id, day_of_week(date), auth_token)
            .await?
        {
            Some(schedule) => schedule,
            None => return Ok(vec![]),
        };

        let booked_times = self.get_booked_times(doctor_id, date, auth_token).await?;
        let now = Utc::now().with_timezone(&self.clinic_offset).naive_local();

        let slots = generate_slots(&schedule, date, &booked_times, now)?;
        debug!("Found {} available slots", slots.len());
        Ok(slots)
    }

    /// Slots plus the day's schedule summary, shaped for the availability
    /// endpoint.
    pub async fn get_day_availability(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<DayAvailability, ScheduleError> {
        let schedule = self
            .schedules
            .get_schedule_for_day(doctor_id, day_of_week(date), auth_token)
            .await?;

        let schedule = match schedule {
            Some(schedule) if schedule.is_available => schedule,
            _ => {
                return Ok(DayAvailability {
                    available_slots: vec![],
                    doctor_schedule: None,
                    message: Some("Doctor is not available on this day".to_string()),
                })
            }
        };

        let booked_times = self.get_booked_times(doctor_id, date, auth_token).await?;
        let now = Utc::now().with_timezone(&self.clinic_offset).naive_local();
        let available_slots = generate_slots(&schedule, date, &booked_times, now)?;

        Ok(DayAvailability {
            available_slots,
            doctor_schedule: Some(ScheduleSummary {
                start_time: schedule.start_time,
                end_time: schedule.end_time,
                slot_duration_minutes: schedule.slot_duration_minutes,
                max_appointments: schedule.max_appointments,
            }),
            message: None,
        })
    }

    /// Point query for a single (doctor, date, time). Checks are ordered so a
    /// booked slot is reported as booked even when a later schedule change
    /// moved it outside working hours.
    pub async fn is_slot_available(
        &self,
        request: &CheckAvailabilityRequest,
        auth_token: Option<&str>,
    ) -> Result<SlotAvailability, ScheduleError> {
        let minute = time_to_minutes(&request.time)?;
        let canonical_time = minutes_to_time(minute);
        let doctor_id = request.doctor_id.to_string();

        let booked_times = self
            .get_booked_times(&doctor_id, request.date, auth_token)
            .await?;
        if booked_times.contains(&canonical_time) {
            return Ok(SlotAvailability {
                is_available: false,
                reason: Some("Time slot already booked".to_string()),
            });
        }

        let schedule = self
            .schedules
            .get_schedule_for_day(&doctor_id, day_of_week(request.date), auth_token)
            .await?;
        let schedule = match schedule {
            Some(schedule) if schedule.is_available => schedule,
            _ => {
                return Ok(SlotAvailability {
                    is_available: false,
                    reason: Some("Doctor not available on this day".to_string()),
                })
            }
        };

        let start = time_to_minutes(&schedule.start_time)?;
        let end = time_to_minutes(&schedule.end_time)?;
        let mut in_break = false;
        for break_time in &schedule.break_times {
            let break_start = time_to_minutes(&break_time.start_time)?;
            let break_end = time_to_minutes(&break_time.end_time)?;
            if break_start <= minute && minute < break_end {
                in_break = true;
                break;
            }
        }

        if minute < start || minute >= end || in_break {
            return Ok(SlotAvailability {
                is_available: false,
                reason: Some("Time outside working hours".to_string()),
            });
        }

        Ok(SlotAvailability {
            is_available: true,
            reason: None,
        })
    }

    /// Start times of the doctor's non-cancelled appointments on a date.
    /// Cancelled and no-show rows do not hold their slot.
    async fn get_booked_times(
        &self,
        doctor_id: &str,
        date: NaiveDate,
        auth_token: Option<&str>,
    ) -> Result<HashSet<String>, ScheduleError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&date=eq.{}&status=not.in.(cancelled,no_show)&select=time",
            doctor_id, date
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| ScheduleError::DatabaseError(e.to_string()))?;

        Ok(result
            .into_iter()
            .filter_map(|row| row.get("time").and_then(Value::as_str).map(str::to_string))
            .collect())
    }
}
