use chrono::NaiveDate;
use serde::Deserialize;

use railbook_shared::{ClassCode, ContactInfo, Passenger};

/// Inbound booking attempt from the gateway.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub user_id: String,
    pub train_number: String,
    pub origin: String,
    pub destination: String,
    pub journey_date: NaiveDate,
    pub class: ClassCode,
    pub passengers: Vec<Passenger>,
    pub contact: ContactInfo,
}

impl CreateBookingRequest {
    /// Shape validation. `today` is injected so the cutoff is testable.
    pub(crate) fn validate(&self, max_group_size: u32, today: NaiveDate) -> Result<(), String> {
        if self.user_id.trim().is_empty() {
            return Err("user id is required".to_string());
        }
        if self.train_number.trim().is_empty() {
            return Err("train number is required".to_string());
        }
        if self.origin.trim().is_empty() || self.destination.trim().is_empty() {
            return Err("origin and destination station codes are required".to_string());
        }
        if self.journey_date < today {
            return Err(format!("journey date {} is in the past", self.journey_date));
        }

        let count = self.passengers.len();
        if count == 0 || count > max_group_size as usize {
            return Err(format!(
                "passenger count must be 1..={}, got {}",
                max_group_size, count
            ));
        }
        for (index, passenger) in self.passengers.iter().enumerate() {
            if passenger.name.trim().is_empty() {
                return Err(format!("passenger {}: name is required", index + 1));
            }
            if passenger.age < 1 || passenger.age > 120 {
                return Err(format!(
                    "passenger {}: age must be 1..=120, got {}",
                    index + 1,
                    passenger.age
                ));
            }
        }

        if !self.contact.email.expose().contains('@') {
            return Err("a valid contact email is required".to_string());
        }
        if self.contact.phone.expose().trim().is_empty() {
            return Err("a contact phone number is required".to_string());
        }

        Ok(())
    }
}
