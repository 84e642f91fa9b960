use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

use railbook_catalog::{
    CatalogError, FareCalculator, FareConfig, InventoryError, InventoryStore, ReleaseOutcome,
    TrainCatalog,
};
use railbook_core::{PaymentGateway, PaymentOutcome};
use railbook_shared::{
    Booking, BookingEvent, BookingStatus, InventoryKey, PassengerRecord, Pnr,
};
use railbook_store::{EngineRules, PnrRegistry, RegistryError};

use crate::models::CreateBookingRequest;
use crate::pnr;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("No capacity left: {0}")]
    InventoryUnavailable(String),

    #[error("Booking not found: {0}")]
    NotFound(String),

    #[error("Payment declined for PNR {0}")]
    PaymentDeclined(Pnr),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<RegistryError> for BookingError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(pnr) => BookingError::NotFound(pnr.to_string()),
            other => BookingError::Internal(other.to_string()),
        }
    }
}

impl From<InventoryError> for BookingError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::WaitlistFull { .. } => {
                BookingError::InventoryUnavailable(err.to_string())
            }
            InventoryError::UnknownClass(key) => {
                BookingError::Validation(format!("no bookable inventory for {}", key))
            }
            other => BookingError::Internal(other.to_string()),
        }
    }
}

impl From<CatalogError> for BookingError {
    fn from(err: CatalogError) -> Self {
        BookingError::Validation(err.to_string())
    }
}

/// Single entry point for the booking lifecycle: validates requests,
/// reserves capacity, captures the fare, orchestrates the opaque payment
/// call, and keeps registry and inventory consistent on every path.
///
/// Inventory locks are only taken inside `InventoryStore` calls, never
/// across the payment await, so one slow payment cannot stall other
/// bookings for the same train.
pub struct ReservationEngine {
    catalog: Arc<dyn TrainCatalog>,
    inventory: Arc<InventoryStore>,
    registry: Arc<PnrRegistry>,
    payment: Arc<dyn PaymentGateway>,
    fares: FareCalculator,
    rules: EngineRules,
    events: broadcast::Sender<BookingEvent>,
}

impl ReservationEngine {
    pub fn new(
        catalog: Arc<dyn TrainCatalog>,
        inventory: Arc<InventoryStore>,
        registry: Arc<PnrRegistry>,
        payment: Arc<dyn PaymentGateway>,
        rules: EngineRules,
    ) -> Self {
        let fares = FareCalculator::new(FareConfig {
            reservation_fee_per_passenger: rules.reservation_fee,
            service_tax_bps: rules.service_tax_bps,
            max_group_size: rules.max_group_size,
        });
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            catalog,
            inventory,
            registry,
            payment,
            fares,
            rules,
            events,
        }
    }

    /// Subscribe to booking lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<BookingEvent> {
        self.events.subscribe()
    }

    /// Run one booking attempt end to end. On any failure after capacity was
    /// reserved, the reservation is released before the error surfaces, so
    /// the caller either gets a complete Booking or sees no lasting effect.
    pub async fn create_booking(
        &self,
        request: CreateBookingRequest,
    ) -> Result<Booking, BookingError> {
        request
            .validate(self.rules.max_group_size, Utc::now().date_naive())
            .map_err(BookingError::Validation)?;

        // Fare captured now; later catalog changes never touch this booking.
        let base_fare = self
            .catalog
            .base_fare(&request.train_number, request.class)
            .await?;
        let passenger_count = request.passengers.len() as u32;
        let fare = self
            .fares
            .compute(base_fare, passenger_count)
            .map_err(|e| BookingError::Validation(e.to_string()))?;

        let pnr = pnr::generate_unique(self.rules.pnr_max_attempts, |candidate| {
            self.registry.contains(candidate).unwrap_or(true)
        })
        .ok_or_else(|| {
            BookingError::Internal(format!(
                "could not allocate a unique PNR in {} attempts",
                self.rules.pnr_max_attempts
            ))
        })?;

        let key = InventoryKey {
            train_number: request.train_number.clone(),
            journey_date: request.journey_date,
            class: request.class,
        };
        let outcome = self.inventory.try_reserve(&key, &pnr, passenger_count)?;

        let now = Utc::now();
        let booking = Booking {
            pnr: pnr.clone(),
            user_id: request.user_id,
            train_number: request.train_number,
            origin: request.origin,
            destination: request.destination,
            journey_date: request.journey_date,
            class: request.class,
            passengers: request
                .passengers
                .into_iter()
                .zip(outcome.allocations)
                .map(|(passenger, allocation)| PassengerRecord {
                    passenger,
                    allocation,
                })
                .collect(),
            contact: request.contact,
            fare,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        if let Err(err) = self.registry.store(booking) {
            self.compensate(&key, &pnr);
            return Err(err.into());
        }

        // Opaque upstream call; inventory locks are not held here.
        let reference = Uuid::new_v4();
        match self.payment.charge(reference, &pnr, fare.total).await {
            Ok(receipt) if receipt.outcome == PaymentOutcome::Confirmed => {}
            Ok(_) => {
                tracing::warn!(%pnr, "payment declined, releasing reservation");
                self.cancel_held(&key, &pnr)?;
                return Err(BookingError::PaymentDeclined(pnr));
            }
            Err(err) => {
                tracing::warn!(%pnr, error = %err, "payment failed, releasing reservation");
                self.cancel_held(&key, &pnr)?;
                return Err(BookingError::Internal(format!(
                    "payment gateway failure: {}",
                    err
                )));
            }
        }

        let booking = self.registry.finalize(&pnr)?;
        tracing::info!(
            %pnr,
            train = %booking.train_number,
            status = %booking.status,
            total = booking.fare.total,
            "booking created"
        );
        let _ = self.events.send(BookingEvent::BookingCreated {
            pnr: pnr.to_string(),
            train_number: booking.train_number.clone(),
            class: booking.class,
            status: booking.status,
            total_fare: booking.fare.total,
            timestamp: Utc::now().timestamp(),
        });
        Ok(booking)
    }

    /// Cancel a booking and release its inventory. Idempotent: cancelling an
    /// already-cancelled PNR succeeds without a second release.
    pub fn cancel_booking(&self, pnr: &Pnr) -> Result<(), BookingError> {
        let booking = self.registry.lookup(pnr)?;
        if booking.status == BookingStatus::Cancelled {
            return Ok(());
        }

        match self.registry.update_status(pnr, BookingStatus::Cancelled) {
            Ok(_) => {}
            Err(RegistryError::IllegalTransition { from, to }) => {
                tracing::error!(%pnr, %from, %to, "illegal cancellation transition");
                return Err(BookingError::Internal(format!(
                    "illegal transition from {} to {}",
                    from, to
                )));
            }
            Err(err) => return Err(err.into()),
        }

        let outcome = self.inventory.release(&booking.inventory_key(), pnr)?;
        self.apply_release(&outcome);
        tracing::info!(%pnr, "booking cancelled");
        let _ = self.events.send(BookingEvent::BookingCancelled {
            pnr: pnr.to_string(),
            timestamp: Utc::now().timestamp(),
        });
        Ok(())
    }

    pub fn get_booking_status(&self, pnr: &Pnr) -> Result<Booking, BookingError> {
        Ok(self.registry.lookup(pnr)?)
    }

    /// Read-only projection for the booking-history view.
    pub fn list_bookings_for_user(&self, user_id: &str) -> Result<Vec<Booking>, BookingError> {
        Ok(self.registry.list_for_user(user_id)?)
    }

    /// Hook for the journey scheduler: mark a booking's journey as run.
    pub fn mark_completed(&self, pnr: &Pnr) -> Result<(), BookingError> {
        self.registry.update_status(pnr, BookingStatus::Completed)?;
        Ok(())
    }

    /// Reconciliation sweep: cancel Pending bookings whose payment window
    /// expired and hand their capacity back. Returns how many were swept.
    pub fn release_stale_pending(&self) -> Result<usize, BookingError> {
        let cutoff = Utc::now() - Duration::seconds(self.rules.payment_window_seconds as i64);
        let stale = self.registry.pending_older_than(cutoff)?;

        let mut swept = 0;
        for pnr in stale {
            let booking = match self.registry.lookup(&pnr) {
                Ok(booking) => booking,
                Err(_) => continue,
            };
            if booking.status != BookingStatus::Pending {
                continue;
            }
            tracing::warn!(%pnr, "sweeping stale pending booking");
            self.cancel_held(&booking.inventory_key(), &pnr)?;
            swept += 1;
        }
        Ok(swept)
    }

    /// Cancel a booking the engine itself still holds (pending payment or
    /// swept): registry first, then inventory, then the cascade.
    fn cancel_held(&self, key: &InventoryKey, pnr: &Pnr) -> Result<(), BookingError> {
        self.registry.update_status(pnr, BookingStatus::Cancelled)?;
        let outcome = self.inventory.release(key, pnr)?;
        self.apply_release(&outcome);
        let _ = self.events.send(BookingEvent::BookingCancelled {
            pnr: pnr.to_string(),
            timestamp: Utc::now().timestamp(),
        });
        Ok(())
    }

    /// Compensating release for a reservation that never made it into the
    /// registry.
    fn compensate(&self, key: &InventoryKey, pnr: &Pnr) {
        match self.inventory.release(key, pnr) {
            Ok(outcome) => self.apply_release(&outcome),
            Err(err) => {
                tracing::error!(%pnr, error = %err, "compensating release failed");
            }
        }
    }

    /// Apply a release cascade to the affected bookings: upgraded
    /// allocations first, then the shifted waitlist positions.
    fn apply_release(&self, outcome: &ReleaseOutcome) {
        for promotion in &outcome.promotions {
            if let Err(err) = self.registry.promote_passenger(&promotion.pnr, promotion.to) {
                tracing::error!(pnr = %promotion.pnr, error = %err, "promotion not applied");
                continue;
            }
            let _ = self.events.send(BookingEvent::WaitlistPromoted {
                pnr: promotion.pnr.to_string(),
                to: promotion.to,
                timestamp: Utc::now().timestamp(),
            });
        }
        for (pnr, positions) in &outcome.waitlist_positions {
            if let Err(err) = self.registry.reindex_waitlist(pnr, positions) {
                tracing::error!(%pnr, error = %err, "waitlist reindex failed");
            }
        }
    }
}
