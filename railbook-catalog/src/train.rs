use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use railbook_shared::ClassCode;

/// Static train metadata as supplied by the schedule catalog. Base fares are
/// whole currency units per passenger.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Train {
    pub number: String,
    pub name: String,
    pub origin: String,
    pub destination: String,
    pub departure: String,
    pub arrival: String,
    pub classes: HashMap<ClassCode, ClassFare>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ClassFare {
    pub base_fare: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Train not found: {0}")]
    UnknownTrain(String),

    #[error("Train {train} does not offer class {class}")]
    ClassNotOffered { train: String, class: ClassCode },
}

/// Read-only seam to the schedule/train catalog.
#[async_trait]
pub trait TrainCatalog: Send + Sync {
    async fn find_train(&self, number: &str) -> Result<Option<Train>, CatalogError>;

    /// Base fare per passenger for one class of one train.
    async fn base_fare(&self, number: &str, class: ClassCode) -> Result<i64, CatalogError>;
}

/// In-memory catalog backed by a map of trains.
pub struct InMemoryCatalog {
    trains: HashMap<String, Train>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            trains: HashMap::new(),
        }
    }

    pub fn insert(&mut self, train: Train) {
        self.trains.insert(train.number.clone(), train);
    }

    /// Catalog seeded with the demo timetable: three long-distance trains
    /// with per-class fares.
    pub fn with_sample_trains() -> Self {
        let mut catalog = Self::new();

        catalog.insert(Train {
            number: "12951".to_string(),
            name: "Mumbai Rajdhani".to_string(),
            origin: "NDLS".to_string(),
            destination: "BCT".to_string(),
            departure: "16:35".to_string(),
            arrival: "08:15".to_string(),
            classes: HashMap::from([
                (ClassCode::FirstAc, ClassFare { base_fare: 4565 }),
                (ClassCode::SecondAc, ClassFare { base_fare: 2890 }),
                (ClassCode::ThirdAc, ClassFare { base_fare: 2135 }),
                (ClassCode::Sleeper, ClassFare { base_fare: 675 }),
            ]),
        });

        catalog.insert(Train {
            number: "12301".to_string(),
            name: "Howrah Rajdhani".to_string(),
            origin: "NDLS".to_string(),
            destination: "HWH".to_string(),
            departure: "16:55".to_string(),
            arrival: "09:55".to_string(),
            classes: HashMap::from([
                (ClassCode::FirstAc, ClassFare { base_fare: 4125 }),
                (ClassCode::SecondAc, ClassFare { base_fare: 2650 }),
                (ClassCode::ThirdAc, ClassFare { base_fare: 1980 }),
                (ClassCode::Sleeper, ClassFare { base_fare: 625 }),
            ]),
        });

        catalog.insert(Train {
            number: "12259".to_string(),
            name: "Sealdah Duronto".to_string(),
            origin: "NDLS".to_string(),
            destination: "SDAH".to_string(),
            departure: "19:40".to_string(),
            arrival: "10:30".to_string(),
            classes: HashMap::from([
                (ClassCode::SecondAc, ClassFare { base_fare: 2320 }),
                (ClassCode::ThirdAc, ClassFare { base_fare: 1745 }),
                (ClassCode::Sleeper, ClassFare { base_fare: 520 }),
            ]),
        });

        catalog
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrainCatalog for InMemoryCatalog {
    async fn find_train(&self, number: &str) -> Result<Option<Train>, CatalogError> {
        Ok(self.trains.get(number).cloned())
    }

    async fn base_fare(&self, number: &str, class: ClassCode) -> Result<i64, CatalogError> {
        let train = self
            .trains
            .get(number)
            .ok_or_else(|| CatalogError::UnknownTrain(number.to_string()))?;

        train
            .classes
            .get(&class)
            .map(|c| c.base_fare)
            .ok_or_else(|| CatalogError::ClassNotOffered {
                train: number.to_string(),
                class,
            })
    }
}
