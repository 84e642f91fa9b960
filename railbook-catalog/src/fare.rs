use serde::{Deserialize, Serialize};

use railbook_shared::FareBreakdown;

/// Fare computation tunables. Amounts are whole currency units; the service
/// tax rate is expressed in basis points so rounding stays in integer math.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FareConfig {
    pub reservation_fee_per_passenger: i64,
    pub service_tax_bps: i64,
    pub max_group_size: u32,
}

impl Default for FareConfig {
    fn default() -> Self {
        Self {
            reservation_fee_per_passenger: 15,
            service_tax_bps: 500,
            max_group_size: 6,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FareError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Pure fare calculator: (base fare, passenger count) to itemized charges.
/// Stateless and safe to share across requests.
#[derive(Debug, Clone, Default)]
pub struct FareCalculator {
    config: FareConfig,
}

impl FareCalculator {
    pub fn new(config: FareConfig) -> Self {
        Self { config }
    }

    pub fn compute(
        &self,
        base_fare_per_passenger: i64,
        passenger_count: u32,
    ) -> Result<FareBreakdown, FareError> {
        if passenger_count == 0 || passenger_count > self.config.max_group_size {
            return Err(FareError::InvalidInput(format!(
                "passenger count must be 1..={}, got {}",
                self.config.max_group_size, passenger_count
            )));
        }
        if base_fare_per_passenger <= 0 {
            return Err(FareError::InvalidInput(format!(
                "base fare must be positive, got {}",
                base_fare_per_passenger
            )));
        }

        let count = i64::from(passenger_count);
        let base_total = base_fare_per_passenger * count;
        let reservation_fee = self.config.reservation_fee_per_passenger * count;
        // Round half up: 0.5 of a currency unit rounds away from zero.
        let service_tax = (base_total * self.config.service_tax_bps + 5_000) / 10_000;

        Ok(FareBreakdown {
            base_fare_per_passenger,
            passenger_count,
            base_total,
            reservation_fee,
            service_tax,
            total: base_total + reservation_fee + service_tax,
        })
    }
}
