use std::collections::HashSet;
use std::sync::LazyLock;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use regex::Regex;

use crate::models::{AvailableSlot, ScheduleError, WeeklySchedule};

/// Minimum lead time for same-day bookings. A fixed constant, deliberately
/// independent of the schedule's slot duration.
pub const SAME_DAY_LEAD_MINUTES: u32 = 30;

static TIME_FORMAT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-1]?[0-9]|2[0-3]):[0-5][0-9]$").expect("valid time regex"));

/// Parse an "HH:MM" 24-hour string into minute-of-day.
pub fn time_to_minutes(value: &str) -> Result<u32, ScheduleError> {
    if !TIME_FORMAT.is_match(value) {
        return Err(ScheduleError::InvalidTimeFormat(value.to_string()));
    }

    let (hours, minutes) = value
        .split_once(':')
        .ok_or_else(|| ScheduleError::InvalidTimeFormat(value.to_string()))?;
    let hours: u32 = hours
        .parse()
        .map_err(|_| ScheduleError::InvalidTimeFormat(value.to_string()))?;
    let minutes: u32 = minutes
        .parse()
        .map_err(|_| ScheduleError::InvalidTimeFormat(value.to_string()))?;

    Ok(hours * 60 + minutes)
}

/// Inverse of [`time_to_minutes`], zero-padded.
pub fn minutes_to_time(minutes: u32) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Generate the bookable slots for one schedule entry on a concrete date.
///
/// `booked_times` holds the "HH:MM" starts of non-cancelled appointments for
/// the same doctor and date. `now` is the clinic-local wall clock and only
/// matters when `date` is today: same-day slots within
/// [`SAME_DAY_LEAD_MINUTES`] of it are withheld.
pub fn generate_slots(
    schedule: &WeeklySchedule,
    date: NaiveDate,
    booked_times: &HashSet<String>,
    now: NaiveDateTime,
) -> Result<Vec<AvailableSlot>, ScheduleError> {
    if !schedule.is_available {
        return Ok(vec![]);
    }

    let start = time_to_minutes(&schedule.start_time)?;
    let end = time_to_minutes(&schedule.end_time)?;

    if schedule.slot_duration_minutes <= 0 {
        return Err(ScheduleError::InvalidSlotDuration(
            schedule.slot_duration_minutes,
        ));
    }
    let step = schedule.slot_duration_minutes as u32;

    let breaks = schedule
        .break_times
        .iter()
        .map(|b| Ok((time_to_minutes(&b.start_time)?, time_to_minutes(&b.end_time)?)))
        .collect::<Result<Vec<(u32, u32)>, ScheduleError>>()?;

    let same_day_cutoff = if date == now.date() {
        Some(now.hour() * 60 + now.minute() + SAME_DAY_LEAD_MINUTES)
    } else {
        None
    };

    let mut slots = Vec::new();
    let mut minute = start;

    // A trailing window shorter than one step yields no slot.
    while minute < end {
        let time = minutes_to_time(minute);

        let too_soon = same_day_cutoff.is_some_and(|cutoff| minute <= cutoff);
        let booked = booked_times.contains(&time);
        // Half-open break interval: a slot starting exactly at break end is fine.
        let in_break = breaks.iter().any(|&(bs, be)| bs <= minute && minute < be);

        if !too_soon && !booked && !in_break {
            let slot_time = NaiveTime::from_hms_opt(minute / 60, minute % 60, 0)
                .ok_or_else(|| ScheduleError::InvalidTimeFormat(time.clone()))?;
            slots.push(AvailableSlot {
                time,
                start_date_time: date.and_time(slot_time),
                available: true,
            });
        }

        minute += step;
    }

    Ok(slots)
}
