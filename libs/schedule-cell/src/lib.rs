pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    AvailableSlot, BreakTime, CheckAvailabilityRequest, DayAvailability, ScheduleError,
    SlotAvailability, UpdateScheduleRequest, WeeklySchedule, WeeklyScheduleEntry,
};
pub use services::timeslot::{generate_slots, minutes_to_time, time_to_minutes};
