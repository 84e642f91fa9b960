pub mod engine;
pub mod models;
pub mod pnr;

pub use engine::{BookingError, ReservationEngine};
pub use models::CreateBookingRequest;
