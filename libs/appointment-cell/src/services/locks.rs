// libs/appointment-cell/src/services/locks.rs
//
// Slot-lock protocol for the booking ledger. The store has no partial unique
// index, so mutual exclusion per (doctor, date, time) is provided by a lock
// row inserted before the conflict check and removed after the write.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::AppointmentError;

const LOCK_TIMEOUT_SECONDS: i64 = 30;

pub struct SlotLockService {
    supabase: Arc<SupabaseClient>,
}

impl SlotLockService {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    /// Lock key identifying one bookable slot.
    pub fn lock_key(doctor_id: Uuid, date: NaiveDate, time: &str) -> String {
        format!("slot_{}_{}_{}", doctor_id, date, time)
    }

    /// Try to take the lock for a slot. Returns false when another
    /// reservation currently holds it.
    pub async fn acquire(
        &self,
        lock_key: &str,
        doctor_id: Uuid,
    ) -> Result<bool, AppointmentError> {
        match self.try_acquire_once(lock_key, doctor_id).await {
            Ok(()) => {
                debug!("Slot lock acquired: {}", lock_key);
                Ok(true)
            }
            Err(_) => {
                // Lock row already exists; a crashed holder may have left it
                // behind, so check expiry before giving up.
                if self.cleanup_if_expired(lock_key).await? {
                    match self.try_acquire_once(lock_key, doctor_id).await {
                        Ok(()) => {
                            debug!("Slot lock acquired after cleanup: {}", lock_key);
                            Ok(true)
                        }
                        Err(_) => Ok(false),
                    }
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Release a held lock by key.
    pub async fn release(&self, lock_key: &str) -> Result<(), AppointmentError> {
        let _: Value = self
            .supabase
            .request::<Value>(
                reqwest::Method::DELETE,
                &format!("/rest/v1/booking_locks?lock_key=eq.{}", lock_key),
                None,
                None,
            )
            .await
            .map_err(|e| AppointmentError::Unavailable(format!("Lock release failed: {}", e)))?;

        debug!("Slot lock released: {}", lock_key);
        Ok(())
    }

    /// Delete all expired lock rows. Run periodically; bounds how long a
    /// crashed reservation can block a slot.
    pub async fn cleanup_expired_locks(&self) -> Result<u32, AppointmentError> {
        let now = Utc::now();

        let response: Value = self
            .supabase
            .request::<Value>(
                reqwest::Method::DELETE,
                &format!("/rest/v1/booking_locks?expires_at=lt.{}", now.to_rfc3339()),
                None,
                None,
            )
            .await
            .map_err(|e| AppointmentError::Unavailable(format!("Lock cleanup failed: {}", e)))?;

        let cleaned_count = response.as_array().map(|arr| arr.len() as u32).unwrap_or(0);

        if cleaned_count > 0 {
            info!("Cleaned up {} expired slot locks", cleaned_count);
        }

        Ok(cleaned_count)
    }

    async fn try_acquire_once(
        &self,
        lock_key: &str,
        doctor_id: Uuid,
    ) -> Result<(), AppointmentError> {
        let lock_data = json!({
            "lock_key": lock_key,
            "doctor_id": doctor_id,
            "acquired_at": Utc::now().to_rfc3339(),
            "expires_at": (Utc::now() + chrono::Duration::seconds(LOCK_TIMEOUT_SECONDS)).to_rfc3339(),
            "process_id": format!("booking_{}", Uuid::new_v4())
        });

        // The insert fails on the lock_key unique constraint when held.
        let _: Value = self
            .supabase
            .request::<Value>(
                reqwest::Method::POST,
                "/rest/v1/booking_locks",
                None,
                Some(lock_data),
            )
            .await
            .map_err(|e| AppointmentError::DatabaseError(e.to_string()))?;

        Ok(())
    }

    async fn cleanup_if_expired(&self, lock_key: &str) -> Result<bool, AppointmentError> {
        let response: Value = self
            .supabase
            .request::<Value>(
                reqwest::Method::GET,
                &format!("/rest/v1/booking_locks?lock_key=eq.{}&select=*", lock_key),
                None,
                None,
            )
            .await
            .map_err(|e| AppointmentError::Unavailable(format!("Lock check failed: {}", e)))?;

        if let Some(lock) = response.as_array().and_then(|locks| locks.first()) {
            if let Some(expires_at_str) = lock.get("expires_at").and_then(|v| v.as_str()) {
                if let Ok(expires_at) = DateTime::parse_from_rfc3339(expires_at_str) {
                    if expires_at.with_timezone(&Utc) < Utc::now() {
                        self.release(lock_key).await?;
                        return Ok(true);
                    }
                }
            }
        }

        Ok(false)
    }
}
