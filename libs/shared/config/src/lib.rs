use std::env;

use chrono::{FixedOffset, Offset, Utc};
use tracing::warn;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub supabase_jwt_secret: String,
    /// Offset of the clinic's wall clock from UTC, e.g. "+02:00".
    /// Governs what "today" means for same-day booking cutoffs.
    pub clinic_utc_offset: String,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let config = Self {
            supabase_url: env::var("SUPABASE_URL")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_URL not set, using empty value");
                    String::new()
                }),
            supabase_anon_key: env::var("SUPABASE_ANON_PUBLIC_KEY")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_ANON_PUBLIC_KEY not set, using empty value");
                    String::new()
                }),
            supabase_jwt_secret: env::var("SUPABASE_JWT_SECRET")
                .unwrap_or_else(|_| {
                    warn!("SUPABASE_JWT_SECRET not set, using empty value");
                    String::new()
                }),
            clinic_utc_offset: env::var("CLINIC_UTC_OFFSET")
                .unwrap_or_else(|_| {
                    warn!("CLINIC_UTC_OFFSET not set, defaulting to +00:00");
                    "+00:00".to_string()
                }),
        };

        if !config.is_configured() {
            warn!("Application not fully configured - missing environment variables");
        }

        config
    }

    pub fn is_configured(&self) -> bool {
        !self.supabase_url.is_empty()
            && !self.supabase_anon_key.is_empty()
            && !self.supabase_jwt_secret.is_empty()
    }

    /// Parsed clinic offset. Falls back to UTC on a malformed value rather
    /// than refusing to start.
    pub fn clinic_time_offset(&self) -> FixedOffset {
        parse_utc_offset(&self.clinic_utc_offset).unwrap_or_else(|| {
            warn!(
                "CLINIC_UTC_OFFSET {:?} is not a valid +HH:MM offset, falling back to UTC",
                self.clinic_utc_offset
            );
            Utc.fix()
        })
    }
}

fn parse_utc_offset(value: &str) -> Option<FixedOffset> {
    let (sign, rest) = match value.as_bytes().first()? {
        b'+' => (1i32, &value[1..]),
        b'-' => (-1i32, &value[1..]),
        _ => return None,
    };

    let (hours, minutes) = rest.split_once(':')?;
    let hours: i32 = hours.parse().ok()?;
    let minutes: i32 = minutes.parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
