pub mod models;
pub mod pii;

pub use models::booking::{
    Allocation, BerthPreference, Booking, BookingStatus, ClassCode, ContactInfo, FareBreakdown,
    Gender, InventoryKey, Nationality, Passenger, PassengerRecord, Pnr,
};
pub use models::events::BookingEvent;
pub use pii::Masked;
