pub mod fare;
pub mod inventory;
pub mod train;

pub use fare::{FareCalculator, FareConfig, FareError};
pub use inventory::{
    InventoryError, InventorySnapshot, InventoryStore, Promotion, ReleaseOutcome,
    ReservationOutcome,
};
pub use train::{CatalogError, ClassFare, InMemoryCatalog, Train, TrainCatalog};
