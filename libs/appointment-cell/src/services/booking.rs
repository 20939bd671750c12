// libs/appointment-cell/src/services/booking.rs
use chrono::{NaiveDate, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use schedule_cell::services::timeslot::{minutes_to_time, time_to_minutes};
use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::User;

use crate::models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest,
    CancelAppointmentRequest,
};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::locks::SlotLockService;

const MAX_RESERVE_ATTEMPTS: u32 = 3;

/// The booking ledger. Writes go through the slot-lock protocol so that one
/// (doctor, date, time) key can never be held by two live appointments.
pub struct BookingService {
    supabase: Arc<SupabaseClient>,
    locks: SlotLockService,
    lifecycle: AppointmentLifecycleService,
}

impl BookingService {
    pub fn new(config: &AppConfig) -> Self {
        let supabase = Arc::new(SupabaseClient::new(config));
        let locks = SlotLockService::new(Arc::clone(&supabase));

        Self {
            supabase,
            locks,
            lifecycle: AppointmentLifecycleService::new(),
        }
    }

    /// True when a live appointment already holds this exact slot.
    /// Cancelled and no-show rows are ignored by design of the ledger.
    pub async fn has_conflict(
        &self,
        doctor_id: Uuid,
        date: NaiveDate,
        time: &str,
        auth_token: Option<&str>,
    ) -> Result<bool, AppointmentError> {
        let path = format!(
            "/rest/v1/appointments?doctor_id=eq.{}&date=eq.{}&time=eq.{}&status=not.in.(cancelled,no_show)&select=id",
            doctor_id, date, time
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, auth_token, None)
            .await
            .map_err(|e| AppointmentError::Unavailable(e.to_string()))?;

        Ok(!result.is_empty())
    }

    /// Reserve a slot for a patient. Exactly one of any set of concurrent
    /// reservations for the same key succeeds; the rest see `Conflict`.
    pub async fn reserve(
        &self,
        patient_id: Uuid,
        request: BookAppointmentRequest,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let minute = time_to_minutes(&request.time)
            .map_err(|e| AppointmentError::ValidationError(e.to_string()))?;
        let time = minutes_to_time(minute);

        info!(
            "Reserving slot {} {} for doctor {} (patient {})",
            request.date, time, request.doctor_id, patient_id
        );

        let lock_key = SlotLockService::lock_key(request.doctor_id, request.date, &time);

        for attempt in 1..=MAX_RESERVE_ATTEMPTS {
            debug!("Reservation attempt {} for {}", attempt, lock_key);

            if !self.locks.acquire(&lock_key, request.doctor_id).await? {
                // Another reservation holds the lock; back off briefly, it
                // either commits (we then conflict) or releases.
                if attempt < MAX_RESERVE_ATTEMPTS {
                    tokio::time::sleep(tokio::time::Duration::from_millis(100 * attempt as u64))
                        .await;
                    continue;
                }
                warn!("Could not acquire slot lock after {} attempts: {}", attempt, lock_key);
                return Err(AppointmentError::Conflict);
            }

            let result = self
                .reserve_under_lock(patient_id, &request, &time, auth_token)
                .await;

            if let Err(e) = self.locks.release(&lock_key).await {
                // The lock row expires on its own; the reservation outcome stands.
                warn!("Failed to release slot lock {}: {}", lock_key, e);
            }

            return result;
        }

        Err(AppointmentError::Conflict)
    }

    /// Cancel an appointment, recording who cancelled and why. The row is
    /// kept; its key becomes bookable again.
    pub async fn cancel(
        &self,
        appointment_id: Uuid,
        request: CancelAppointmentRequest,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.get_appointment(appointment_id, user, auth_token).await?;

        self.lifecycle
            .validate_status_transition(appointment.status, AppointmentStatus::Cancelled)?;

        let update_data = json!({
            "status": AppointmentStatus::Cancelled,
            "cancelled_by": request.cancelled_by,
            "cancellation_reason": request.reason,
            "cancelled_at": Utc::now().to_rfc3339(),
            "updated_at": Utc::now().to_rfc3339()
        });

        let updated = self
            .patch_appointment(appointment_id, update_data, auth_token)
            .await?;

        info!("Appointment {} cancelled", appointment_id);
        Ok(updated)
    }

    /// Move an appointment along its lifecycle. Cancellation must go through
    /// [`Self::cancel`] so the actor and reason are recorded.
    pub async fn update_status(
        &self,
        appointment_id: Uuid,
        new_status: AppointmentStatus,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if new_status == AppointmentStatus::Cancelled {
            return Err(AppointmentError::ValidationError(
                "use the cancel operation to cancel an appointment".to_string(),
            ));
        }

        let appointment = self.get_appointment(appointment_id, user, auth_token).await?;

        self.lifecycle
            .validate_status_transition(appointment.status, new_status)?;

        let update_data = json!({
            "status": new_status,
            "updated_at": Utc::now().to_rfc3339()
        });

        self.patch_appointment(appointment_id, update_data, auth_token)
            .await
    }

    /// Fetch one appointment, visible only to its participants.
    pub async fn get_appointment(
        &self,
        appointment_id: Uuid,
        user: &User,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Unavailable(e.to_string()))?;

        let row = result.into_iter().next().ok_or(AppointmentError::NotFound)?;
        let appointment: Appointment = serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))?;

        if !appointment.involves(&user.id) {
            return Err(AppointmentError::Unauthorized);
        }

        Ok(appointment)
    }

    /// All appointments the caller participates in, as patient or doctor.
    pub async fn list_appointments(
        &self,
        user: &User,
        auth_token: &str,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let column = if user.is_doctor() { "doctor_id" } else { "patient_id" };
        let path = format!(
            "/rest/v1/appointments?{}=eq.{}&order=date.asc,time.asc",
            column, user.id
        );

        let result: Vec<Value> = self
            .supabase
            .request(Method::GET, &path, Some(auth_token), None)
            .await
            .map_err(|e| AppointmentError::Unavailable(e.to_string()))?;

        result
            .into_iter()
            .map(|row| serde_json::from_value(row))
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointments: {}", e)))
    }

    // ==============================================================================
    // PRIVATE HELPER METHODS
    // ==============================================================================

    /// Conflict check plus insert, called with the slot lock held.
    async fn reserve_under_lock(
        &self,
        patient_id: Uuid,
        request: &BookAppointmentRequest,
        time: &str,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        if self
            .has_conflict(request.doctor_id, request.date, time, Some(auth_token))
            .await?
        {
            warn!(
                "Booking conflict for doctor {} at {} {}",
                request.doctor_id, request.date, time
            );
            return Err(AppointmentError::Conflict);
        }

        let now = Utc::now().to_rfc3339();
        let appointment_data = json!({
            "doctor_id": request.doctor_id,
            "patient_id": patient_id,
            "date": request.date,
            "time": time,
            "status": AppointmentStatus::Scheduled,
            "reason": request.reason,
            "notes": request.notes,
            "created_at": now,
            "updated_at": now
        });

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(auth_token),
                Some(appointment_data),
                Some(headers),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = result
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::DatabaseError("Appointment insert returned no row".to_string()))?;

        let appointment: Appointment = serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))?;

        info!("Appointment {} reserved", appointment.id);
        Ok(appointment)
    }

    async fn patch_appointment(
        &self,
        appointment_id: Uuid,
        update_data: Value,
        auth_token: &str,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", appointment_id);
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("return=representation"),
        );

        let result: Vec<Value> = self
            .supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(auth_token),
                Some(update_data),
                Some(headers),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        let row = result.into_iter().next().ok_or(AppointmentError::NotFound)?;
        serde_json::from_value(row)
            .map_err(|e| AppointmentError::DatabaseError(format!("Failed to parse appointment: {}", e)))
    }
}
