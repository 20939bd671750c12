pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    Appointment, AppointmentError, AppointmentStatus, BookAppointmentRequest,
    CancelAppointmentRequest, CancelledBy, UpdateStatusRequest,
};
pub use services::booking::BookingService;
