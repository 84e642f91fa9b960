use serde::{Deserialize, Serialize};

use super::booking::{Allocation, BookingStatus, ClassCode};

/// Domain events published by the reservation engine over a broadcast
/// channel. Timestamps are unix seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "type")]
pub enum BookingEvent {
    BookingCreated {
        pnr: String,
        train_number: String,
        class: ClassCode,
        status: BookingStatus,
        total_fare: i64,
        timestamp: i64,
    },
    BookingCancelled {
        pnr: String,
        timestamp: i64,
    },
    WaitlistPromoted {
        pnr: String,
        to: Allocation,
        timestamp: i64,
    },
}
