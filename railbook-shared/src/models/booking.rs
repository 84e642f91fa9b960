use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::pii::Masked;

/// Berths per coach, used when rendering `CNF/B3/15` style status codes.
const BERTHS_PER_COACH: u32 = 72;

/// Passenger Name Record: the 10-digit numeric identifier of one booking.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pnr(String);

impl Pnr {
    /// Accepts exactly ten decimal digits.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.len() == 10 && value.bytes().all(|b| b.is_ascii_digit()) {
            Some(Self(value))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Pnr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fare/comfort tier of travel, each with independent capacity counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClassCode {
    #[serde(rename = "1A")]
    FirstAc,
    #[serde(rename = "2A")]
    SecondAc,
    #[serde(rename = "3A")]
    ThirdAc,
    #[serde(rename = "SL")]
    Sleeper,
}

impl ClassCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClassCode::FirstAc => "1A",
            ClassCode::SecondAc => "2A",
            ClassCode::ThirdAc => "3A",
            ClassCode::Sleeper => "SL",
        }
    }
}

impl fmt::Display for ClassCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Gender {
    Male,
    Female,
    Transgender,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BerthPreference {
    NoPreference,
    Lower,
    Middle,
    Upper,
    SideLower,
    SideUpper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Nationality {
    Indian,
    Foreign,
}

/// One traveller within a booking request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passenger {
    pub name: String,
    pub age: u8,
    pub gender: Gender,
    pub berth_preference: BerthPreference,
    pub nationality: Nationality,
}

/// Contact details for the booking. Masked in Debug output so request
/// logging never leaks them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: Masked<String>,
    pub phone: Masked<String>,
}

impl ContactInfo {
    pub fn new(email: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            email: Masked::new(email.into()),
            phone: Masked::new(phone.into()),
        }
    }
}

/// Identifies one capacity pool: a class of one train on one journey date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InventoryKey {
    pub train_number: String,
    pub journey_date: NaiveDate,
    pub class: ClassCode,
}

impl fmt::Display for InventoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.train_number, self.journey_date, self.class)
    }
}

/// Where one passenger ended up: a berth, an RAC slot, or a waitlist
/// position. Individual per passenger because a group booking can span
/// tiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "tier")]
pub enum Allocation {
    Confirmed { berth: u32 },
    Rac { slot: u32 },
    Waitlisted { position: u32 },
}

impl Allocation {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Allocation::Confirmed { .. })
    }

    pub fn is_rac(&self) -> bool {
        matches!(self, Allocation::Rac { .. })
    }

    pub fn is_waitlisted(&self) -> bool {
        matches!(self, Allocation::Waitlisted { .. })
    }

    /// Chart code in the format passengers see: `CNF/B3/15`, `RAC/4`,
    /// `WL/45`.
    pub fn code(&self) -> String {
        match self {
            Allocation::Confirmed { berth } => {
                let coach = (berth - 1) / BERTHS_PER_COACH + 1;
                let seat = (berth - 1) % BERTHS_PER_COACH + 1;
                format!("CNF/B{}/{}", coach, seat)
            }
            Allocation::Rac { slot } => format!("RAC/{}", slot),
            Allocation::Waitlisted { position } => format!("WL/{}", position),
        }
    }
}

/// A passenger together with their current allocation outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassengerRecord {
    pub passenger: Passenger,
    pub allocation: Allocation,
}

/// Itemized charges for a booking. Derived data, captured once at
/// reservation time and immutable thereafter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FareBreakdown {
    pub base_fare_per_passenger: i64,
    pub passenger_count: u32,
    pub base_total: i64,
    pub reservation_fee: i64,
    pub service_tax: i64,
    pub total: i64,
}

/// Aggregate booking status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    PartiallyConfirmed,
    Waitlisted,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Cancelled | BookingStatus::Completed)
    }

    /// Legal-transition table. Pending resolves into one of the active
    /// statuses (or straight to Cancelled on a failed payment); active
    /// statuses move between each other as promotions land, and reach
    /// Cancelled or Completed exactly once. Terminal states never move.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        match (self, next) {
            (Pending, Confirmed | PartiallyConfirmed | Waitlisted | Cancelled) => true,
            (
                Confirmed | PartiallyConfirmed | Waitlisted,
                Confirmed | PartiallyConfirmed | Waitlisted,
            ) => true,
            (Confirmed | PartiallyConfirmed | Waitlisted, Cancelled | Completed) => true,
            _ => false,
        }
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::PartiallyConfirmed => "PARTIALLY_CONFIRMED",
            BookingStatus::Waitlisted => "WAITLISTED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        };
        f.write_str(s)
    }
}

/// The single source of truth for one reservation transaction. Owned by the
/// PNR registry once stored; the inventory waitlist references it by PNR
/// only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Booking {
    pub pnr: Pnr,
    pub user_id: String,
    pub train_number: String,
    pub origin: String,
    pub destination: String,
    pub journey_date: NaiveDate,
    pub class: ClassCode,
    pub passengers: Vec<PassengerRecord>,
    pub contact: ContactInfo,
    pub fare: FareBreakdown,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// The capacity pool this booking draws from.
    pub fn inventory_key(&self) -> InventoryKey {
        InventoryKey {
            train_number: self.train_number.clone(),
            journey_date: self.journey_date,
            class: self.class,
        }
    }

    pub fn set_status(&mut self, status: BookingStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Aggregate status implied by the current per-passenger allocations:
    /// all berths is Confirmed, all waitlist is Waitlisted, anything mixed
    /// (including RAC) is PartiallyConfirmed.
    pub fn aggregate_status(&self) -> BookingStatus {
        if self.passengers.iter().all(|p| p.allocation.is_confirmed()) {
            BookingStatus::Confirmed
        } else if self.passengers.iter().all(|p| p.allocation.is_waitlisted()) {
            BookingStatus::Waitlisted
        } else {
            BookingStatus::PartiallyConfirmed
        }
    }
}
