use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use railbook_shared::{Allocation, Booking, BookingStatus, Pnr};

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Duplicate PNR: {0}")]
    DuplicateKey(Pnr),

    #[error("PNR not found: {0}")]
    NotFound(Pnr),

    #[error("Illegal status transition from {from} to {to}")]
    IllegalTransition {
        from: BookingStatus,
        to: BookingStatus,
    },

    #[error("No promotable passenger on {0}")]
    NothingToPromote(Pnr),

    #[error("Registry lock poisoned")]
    Poisoned,
}

struct RegistryInner {
    bookings: HashMap<Pnr, Booking>,
    by_user: HashMap<String, Vec<Pnr>>,
}

/// Durable mapping PNR -> Booking, plus the per-user index backing booking
/// history. Sole owner of Booking records after creation; all mutation goes
/// through the legal-transition table.
pub struct PnrRegistry {
    inner: RwLock<RegistryInner>,
}

impl PnrRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                bookings: HashMap::new(),
                by_user: HashMap::new(),
            }),
        }
    }

    pub fn store(&self, booking: Booking) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().map_err(|_| RegistryError::Poisoned)?;
        if inner.bookings.contains_key(&booking.pnr) {
            return Err(RegistryError::DuplicateKey(booking.pnr.clone()));
        }
        inner
            .by_user
            .entry(booking.user_id.clone())
            .or_default()
            .push(booking.pnr.clone());
        inner.bookings.insert(booking.pnr.clone(), booking);
        Ok(())
    }

    pub fn contains(&self, pnr: &Pnr) -> Result<bool, RegistryError> {
        let inner = self.inner.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(inner.bookings.contains_key(pnr))
    }

    pub fn lookup(&self, pnr: &Pnr) -> Result<Booking, RegistryError> {
        let inner = self.inner.read().map_err(|_| RegistryError::Poisoned)?;
        inner
            .bookings
            .get(pnr)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(pnr.clone()))
    }

    /// Move a booking to `next`, enforcing the legal-transition table.
    /// Returns the updated record.
    pub fn update_status(&self, pnr: &Pnr, next: BookingStatus) -> Result<Booking, RegistryError> {
        let mut inner = self.inner.write().map_err(|_| RegistryError::Poisoned)?;
        let booking = inner
            .bookings
            .get_mut(pnr)
            .ok_or_else(|| RegistryError::NotFound(pnr.clone()))?;

        if !booking.status.can_transition_to(next) {
            return Err(RegistryError::IllegalTransition {
                from: booking.status,
                to: next,
            });
        }
        booking.set_status(next);
        Ok(booking.clone())
    }

    /// Resolve a Pending booking into the aggregate status implied by its
    /// passengers' live allocations.
    pub fn finalize(&self, pnr: &Pnr) -> Result<Booking, RegistryError> {
        let mut inner = self.inner.write().map_err(|_| RegistryError::Poisoned)?;
        let booking = inner
            .bookings
            .get_mut(pnr)
            .ok_or_else(|| RegistryError::NotFound(pnr.clone()))?;

        let next = booking.aggregate_status();
        if !booking.status.can_transition_to(next) {
            return Err(RegistryError::IllegalTransition {
                from: booking.status,
                to: next,
            });
        }
        booking.set_status(next);
        Ok(booking.clone())
    }

    /// Apply one promotion from a release cascade: upgrade the booking's
    /// next passenger in line (earliest RAC slot for a berth, earliest
    /// waitlist position otherwise) and refresh the aggregate status.
    pub fn promote_passenger(&self, pnr: &Pnr, to: Allocation) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().map_err(|_| RegistryError::Poisoned)?;
        let booking = inner
            .bookings
            .get_mut(pnr)
            .ok_or_else(|| RegistryError::NotFound(pnr.clone()))?;

        let rac_candidate = booking
            .passengers
            .iter()
            .enumerate()
            .filter_map(|(i, p)| match p.allocation {
                Allocation::Rac { slot } => Some((slot, i)),
                _ => None,
            })
            .min();
        let waitlist_candidate = booking
            .passengers
            .iter()
            .enumerate()
            .filter_map(|(i, p)| match p.allocation {
                Allocation::Waitlisted { position } => Some((position, i)),
                _ => None,
            })
            .min();

        let index = match to {
            Allocation::Confirmed { .. } => rac_candidate.or(waitlist_candidate),
            Allocation::Rac { .. } | Allocation::Waitlisted { .. } => waitlist_candidate,
        }
        .map(|(_, i)| i)
        .ok_or_else(|| RegistryError::NothingToPromote(pnr.clone()))?;

        booking.passengers[index].allocation = to;

        // Pending bookings keep their status; finalize picks up the new
        // allocation. Terminal bookings never reach this point because the
        // inventory no longer holds entries for them.
        if !booking.status.is_terminal() && booking.status != BookingStatus::Pending {
            let aggregate = booking.aggregate_status();
            if aggregate != booking.status {
                booking.set_status(aggregate);
            }
        } else {
            booking.updated_at = Utc::now();
        }
        Ok(())
    }

    /// Rewrite the waitlist positions of a booking's queued passengers after
    /// the queue moved. `positions` arrive in queue order.
    pub fn reindex_waitlist(&self, pnr: &Pnr, positions: &[u32]) -> Result<(), RegistryError> {
        let mut inner = self.inner.write().map_err(|_| RegistryError::Poisoned)?;
        let booking = inner
            .bookings
            .get_mut(pnr)
            .ok_or_else(|| RegistryError::NotFound(pnr.clone()))?;

        let mut queued: Vec<(u32, usize)> = booking
            .passengers
            .iter()
            .enumerate()
            .filter_map(|(i, p)| match p.allocation {
                Allocation::Waitlisted { position } => Some((position, i)),
                _ => None,
            })
            .collect();
        queued.sort_unstable();

        for ((_, index), position) in queued.into_iter().zip(positions.iter().copied()) {
            booking.passengers[index].allocation = Allocation::Waitlisted { position };
        }
        Ok(())
    }

    /// Read-only projection for the booking-history view.
    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Booking>, RegistryError> {
        let inner = self.inner.read().map_err(|_| RegistryError::Poisoned)?;
        let pnrs = match inner.by_user.get(user_id) {
            Some(pnrs) => pnrs,
            None => return Ok(Vec::new()),
        };
        Ok(pnrs
            .iter()
            .filter_map(|pnr| inner.bookings.get(pnr).cloned())
            .collect())
    }

    /// Pending bookings created before the cutoff, for the reconciliation
    /// sweep.
    pub fn pending_older_than(&self, cutoff: DateTime<Utc>) -> Result<Vec<Pnr>, RegistryError> {
        let inner = self.inner.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(inner
            .bookings
            .values()
            .filter(|b| b.status == BookingStatus::Pending && b.created_at < cutoff)
            .map(|b| b.pnr.clone())
            .collect())
    }
}

impl Default for PnrRegistry {
    fn default() -> Self {
        Self::new()
    }
}
