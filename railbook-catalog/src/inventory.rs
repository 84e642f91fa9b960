use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, RwLock};

use railbook_shared::{Allocation, InventoryKey, Pnr};

#[derive(Debug, thiserror::Error)]
pub enum InventoryError {
    #[error("No inventory opened for {0}")]
    UnknownClass(InventoryKey),

    #[error("Waitlist full: {requested} passengers over {headroom} slots of headroom")]
    WaitlistFull { requested: u32, headroom: u32 },

    #[error("No reservation held for PNR {0}")]
    UnknownPnr(Pnr),

    #[error("Inventory lock poisoned")]
    Poisoned,
}

/// Per-class availability counters, in the shape the search page displays.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct InventorySnapshot {
    pub total_seats: u32,
    pub available: u32,
    pub rac_capacity: u32,
    pub rac_free: u32,
    pub waitlisted: u32,
}

impl InventorySnapshot {
    /// Display status in the original chart format: `AVAILABLE`, `RAC/4`
    /// (next RAC slot), or `WL/45` (next waitlist position).
    pub fn display_status(&self) -> String {
        if self.available > 0 {
            "AVAILABLE".to_string()
        } else if self.rac_free > 0 {
            format!("RAC/{}", self.rac_capacity - self.rac_free + 1)
        } else {
            format!("WL/{}", self.waitlisted + 1)
        }
    }
}

/// Per-passenger outcome of one admission attempt.
#[derive(Debug, Clone)]
pub struct ReservationOutcome {
    pub allocations: Vec<Allocation>,
}

/// One passenger of one booking moving up a tier during a release cascade.
#[derive(Debug, Clone)]
pub struct Promotion {
    pub pnr: Pnr,
    pub to: Allocation,
}

/// Everything a release changed besides the released group itself: the
/// promotions that cascaded, and the waitlist positions left afterwards
/// (per queued group, front to back).
#[derive(Debug, Clone)]
pub struct ReleaseOutcome {
    pub promotions: Vec<Promotion>,
    pub waitlist_positions: Vec<(Pnr, Vec<u32>)>,
}

#[derive(Debug, Clone)]
struct WaitlistEntry {
    pnr: Pnr,
    passenger_count: u32,
    #[allow(dead_code)]
    enqueued_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct RacEntry {
    pnr: Pnr,
    passenger_count: u32,
}

/// Berths and RAC slots currently held by one PNR.
#[derive(Debug, Default)]
struct GroupHolding {
    berths: Vec<u32>,
    rac_slots: Vec<u32>,
}

impl GroupHolding {
    fn is_empty(&self) -> bool {
        self.berths.is_empty() && self.rac_slots.is_empty()
    }
}

/// Capacity state of one (train, date, class). All mutation goes through
/// `InventoryStore`, which serializes access per key.
///
/// Invariants: confirmed count never exceeds `total_seats`, RAC count never
/// exceeds `rac_capacity`, and a passenger appears in exactly one of
/// berths / RAC slots / waitlist.
#[derive(Debug)]
pub struct TrainClassInventory {
    total_seats: u32,
    rac_capacity: u32,
    waitlist_cap: u32,
    free_berths: BTreeSet<u32>,
    free_rac_slots: BTreeSet<u32>,
    /// RAC holders in admission order; promoted to berths first.
    rac_queue: VecDeque<RacEntry>,
    /// Queued groups in admission order.
    waitlist: VecDeque<WaitlistEntry>,
    holdings: HashMap<Pnr, GroupHolding>,
}

impl TrainClassInventory {
    fn new(total_seats: u32, rac_capacity: u32, waitlist_cap: u32) -> Self {
        Self {
            total_seats,
            rac_capacity,
            waitlist_cap,
            free_berths: (1..=total_seats).collect(),
            free_rac_slots: (1..=rac_capacity).collect(),
            rac_queue: VecDeque::new(),
            waitlist: VecDeque::new(),
            holdings: HashMap::new(),
        }
    }

    fn waitlisted_count(&self) -> u32 {
        self.waitlist.iter().map(|e| e.passenger_count).sum()
    }

    /// Fill-then-spill admission: berths first, then RAC slots, then one
    /// waitlist entry for whatever remains. Atomic per group: if the spill
    /// does not fit under the waitlist cap, nothing is allocated.
    fn admit(&mut self, pnr: &Pnr, passenger_count: u32) -> Result<Vec<Allocation>, InventoryError> {
        let confirm_take = passenger_count.min(self.free_berths.len() as u32);
        let rac_take = (passenger_count - confirm_take).min(self.free_rac_slots.len() as u32);
        let spill = passenger_count - confirm_take - rac_take;

        if spill > 0 {
            let headroom = self.waitlist_cap.saturating_sub(self.waitlisted_count());
            if spill > headroom {
                return Err(InventoryError::WaitlistFull {
                    requested: spill,
                    headroom,
                });
            }
        }

        let mut allocations = Vec::with_capacity(passenger_count as usize);
        let mut holding = GroupHolding::default();

        for _ in 0..confirm_take {
            if let Some(berth) = self.free_berths.pop_first() {
                holding.berths.push(berth);
                allocations.push(Allocation::Confirmed { berth });
            }
        }

        for _ in 0..rac_take {
            if let Some(slot) = self.free_rac_slots.pop_first() {
                holding.rac_slots.push(slot);
                allocations.push(Allocation::Rac { slot });
            }
        }
        if rac_take > 0 {
            self.rac_queue.push_back(RacEntry {
                pnr: pnr.clone(),
                passenger_count: rac_take,
            });
        }

        if spill > 0 {
            let base = self.waitlisted_count();
            for offset in 1..=spill {
                allocations.push(Allocation::Waitlisted {
                    position: base + offset,
                });
            }
            self.waitlist.push_back(WaitlistEntry {
                pnr: pnr.clone(),
                passenger_count: spill,
                enqueued_at: Utc::now(),
            });
        }

        if !holding.is_empty() {
            self.holdings.insert(pnr.clone(), holding);
        }

        Ok(allocations)
    }

    /// Reverse a prior admission and cascade freed capacity through the RAC
    /// queue and the waitlist in FIFO order.
    fn release(&mut self, pnr: &Pnr) -> Result<ReleaseOutcome, InventoryError> {
        let holding = self.holdings.remove(pnr);
        let queued = self.waitlist.iter().any(|e| &e.pnr == pnr);

        if holding.is_none() && !queued {
            return Err(InventoryError::UnknownPnr(pnr.clone()));
        }

        self.waitlist.retain(|e| &e.pnr != pnr);
        self.rac_queue.retain(|e| &e.pnr != pnr);

        if let Some(holding) = holding {
            self.free_berths.extend(holding.berths);
            self.free_rac_slots.extend(holding.rac_slots);
        }

        let promotions = self.cascade();
        Ok(ReleaseOutcome {
            promotions,
            waitlist_positions: self.current_positions(),
        })
    }

    /// Promote passengers into freed capacity, one at a time: RAC holders
    /// take berths first, then waitlisted passengers take berths or RAC
    /// slots, all in admission order.
    fn cascade(&mut self) -> Vec<Promotion> {
        let mut promotions = Vec::new();

        loop {
            let Some(front) = self.rac_queue.front_mut() else { break };
            let Some(berth) = self.free_berths.pop_first() else { break };
            let pnr = front.pnr.clone();

            let holding = self.holdings.entry(pnr.clone()).or_default();
            if !holding.rac_slots.is_empty() {
                let slot = holding.rac_slots.remove(0);
                self.free_rac_slots.insert(slot);
            }
            holding.berths.push(berth);

            front.passenger_count -= 1;
            if front.passenger_count == 0 {
                self.rac_queue.pop_front();
            }
            promotions.push(Promotion {
                pnr,
                to: Allocation::Confirmed { berth },
            });
        }

        loop {
            let Some(front) = self.waitlist.front_mut() else { break };
            let pnr = front.pnr.clone();

            let to = if let Some(berth) = self.free_berths.pop_first() {
                self.holdings.entry(pnr.clone()).or_default().berths.push(berth);
                Allocation::Confirmed { berth }
            } else if let Some(slot) = self.free_rac_slots.pop_first() {
                self.holdings
                    .entry(pnr.clone())
                    .or_default()
                    .rac_slots
                    .push(slot);
                match self.rac_queue.back_mut() {
                    Some(back) if back.pnr == pnr => back.passenger_count += 1,
                    _ => self.rac_queue.push_back(RacEntry {
                        pnr: pnr.clone(),
                        passenger_count: 1,
                    }),
                }
                Allocation::Rac { slot }
            } else {
                break;
            };

            front.passenger_count -= 1;
            if front.passenger_count == 0 {
                self.waitlist.pop_front();
            }
            promotions.push(Promotion { pnr, to });
        }

        promotions
    }

    /// Waitlist positions after any mutation, per queued group front to
    /// back, numbered per passenger.
    fn current_positions(&self) -> Vec<(Pnr, Vec<u32>)> {
        let mut positions = Vec::with_capacity(self.waitlist.len());
        let mut next = 1u32;
        for entry in &self.waitlist {
            positions.push((entry.pnr.clone(), (next..next + entry.passenger_count).collect()));
            next += entry.passenger_count;
        }
        positions
    }

    fn snapshot(&self) -> InventorySnapshot {
        InventorySnapshot {
            total_seats: self.total_seats,
            available: self.free_berths.len() as u32,
            rac_capacity: self.rac_capacity,
            rac_free: self.free_rac_slots.len() as u32,
            waitlisted: self.waitlisted_count(),
        }
    }
}

/// Single source of truth for seat/berth capacity. Each key gets its own
/// mutex, so concurrent reservations against the same class serialize while
/// different classes proceed in parallel. Operations are computation-only
/// and never hold a lock across an await point.
pub struct InventoryStore {
    classes: RwLock<HashMap<InventoryKey, Arc<Mutex<TrainClassInventory>>>>,
}

impl InventoryStore {
    pub fn new() -> Self {
        Self {
            classes: RwLock::new(HashMap::new()),
        }
    }

    /// Register a capacity pool. Called at schedule-load time, before any
    /// booking traffic for the key.
    pub fn open_class(
        &self,
        key: InventoryKey,
        total_seats: u32,
        rac_capacity: u32,
        waitlist_cap: u32,
    ) -> Result<(), InventoryError> {
        let mut classes = self.classes.write().map_err(|_| InventoryError::Poisoned)?;
        classes.insert(
            key,
            Arc::new(Mutex::new(TrainClassInventory::new(
                total_seats,
                rac_capacity,
                waitlist_cap,
            ))),
        );
        Ok(())
    }

    fn class_for(&self, key: &InventoryKey) -> Result<Arc<Mutex<TrainClassInventory>>, InventoryError> {
        let classes = self.classes.read().map_err(|_| InventoryError::Poisoned)?;
        classes
            .get(key)
            .cloned()
            .ok_or_else(|| InventoryError::UnknownClass(key.clone()))
    }

    /// Admit a group atomically against one inventory snapshot. Per-passenger
    /// outcomes follow the fill-then-spill policy.
    pub fn try_reserve(
        &self,
        key: &InventoryKey,
        pnr: &Pnr,
        passenger_count: u32,
    ) -> Result<ReservationOutcome, InventoryError> {
        let cell = self.class_for(key)?;
        let mut inventory = cell.lock().map_err(|_| InventoryError::Poisoned)?;
        let allocations = inventory.admit(pnr, passenger_count)?;
        tracing::debug!(%key, %pnr, passenger_count, "reservation admitted");
        Ok(ReservationOutcome { allocations })
    }

    /// Free everything a PNR holds and cascade promotions in one atomic
    /// step.
    pub fn release(&self, key: &InventoryKey, pnr: &Pnr) -> Result<ReleaseOutcome, InventoryError> {
        let cell = self.class_for(key)?;
        let mut inventory = cell.lock().map_err(|_| InventoryError::Poisoned)?;
        let outcome = inventory.release(pnr)?;
        tracing::debug!(
            %key,
            %pnr,
            promotions = outcome.promotions.len(),
            "reservation released"
        );
        Ok(outcome)
    }

    pub fn snapshot(&self, key: &InventoryKey) -> Result<InventorySnapshot, InventoryError> {
        let cell = self.class_for(key)?;
        let inventory = cell.lock().map_err(|_| InventoryError::Poisoned)?;
        Ok(inventory.snapshot())
    }
}

impl Default for InventoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use railbook_shared::ClassCode;

    fn key() -> InventoryKey {
        InventoryKey {
            train_number: "12951".to_string(),
            journey_date: NaiveDate::from_ymd_opt(2026, 9, 14).unwrap(),
            class: ClassCode::Sleeper,
        }
    }

    fn pnr(n: u64) -> Pnr {
        Pnr::new(format!("{:010}", n)).unwrap()
    }

    #[test]
    fn group_spills_across_tiers() {
        let store = InventoryStore::new();
        store.open_class(key(), 2, 1, 10).unwrap();

        let outcome = store.try_reserve(&key(), &pnr(1), 5).unwrap();
        assert_eq!(
            outcome.allocations,
            vec![
                Allocation::Confirmed { berth: 1 },
                Allocation::Confirmed { berth: 2 },
                Allocation::Rac { slot: 1 },
                Allocation::Waitlisted { position: 1 },
                Allocation::Waitlisted { position: 2 },
            ]
        );

        let snap = store.snapshot(&key()).unwrap();
        assert_eq!(snap.available, 0);
        assert_eq!(snap.rac_free, 0);
        assert_eq!(snap.waitlisted, 2);
        assert_eq!(snap.display_status(), "WL/3");
    }

    #[test]
    fn spill_beyond_waitlist_cap_mutates_nothing() {
        let store = InventoryStore::new();
        store.open_class(key(), 0, 0, 1).unwrap();

        let err = store.try_reserve(&key(), &pnr(1), 2).unwrap_err();
        assert!(matches!(
            err,
            InventoryError::WaitlistFull {
                requested: 2,
                headroom: 1
            }
        ));
        assert_eq!(store.snapshot(&key()).unwrap().waitlisted, 0);

        // A group that fits still gets in afterwards.
        store.try_reserve(&key(), &pnr(2), 1).unwrap();
        assert_eq!(store.snapshot(&key()).unwrap().waitlisted, 1);
    }

    #[test]
    fn release_cascades_in_fifo_order() {
        let store = InventoryStore::new();
        store.open_class(key(), 1, 1, 10).unwrap();

        assert_eq!(
            store.try_reserve(&key(), &pnr(1), 1).unwrap().allocations,
            vec![Allocation::Confirmed { berth: 1 }]
        );
        assert_eq!(
            store.try_reserve(&key(), &pnr(2), 1).unwrap().allocations,
            vec![Allocation::Rac { slot: 1 }]
        );
        assert_eq!(
            store.try_reserve(&key(), &pnr(3), 1).unwrap().allocations,
            vec![Allocation::Waitlisted { position: 1 }]
        );
        assert_eq!(
            store.try_reserve(&key(), &pnr(4), 1).unwrap().allocations,
            vec![Allocation::Waitlisted { position: 2 }]
        );

        let outcome = store.release(&key(), &pnr(1)).unwrap();

        // The RAC holder takes the berth; the first waitlisted passenger
        // takes the freed RAC slot; the second shifts to position 1.
        assert_eq!(outcome.promotions.len(), 2);
        assert_eq!(outcome.promotions[0].pnr, pnr(2));
        assert_eq!(outcome.promotions[0].to, Allocation::Confirmed { berth: 1 });
        assert_eq!(outcome.promotions[1].pnr, pnr(3));
        assert_eq!(outcome.promotions[1].to, Allocation::Rac { slot: 1 });
        assert_eq!(outcome.waitlist_positions, vec![(pnr(4), vec![1])]);
    }

    #[test]
    fn releasing_a_waitlisted_group_reindexes_the_queue() {
        let store = InventoryStore::new();
        store.open_class(key(), 0, 0, 45).unwrap();

        store.try_reserve(&key(), &pnr(1), 2).unwrap();
        store.try_reserve(&key(), &pnr(2), 3).unwrap();

        let outcome = store.release(&key(), &pnr(1)).unwrap();
        assert!(outcome.promotions.is_empty());
        assert_eq!(outcome.waitlist_positions, vec![(pnr(2), vec![1, 2, 3])]);
    }

    #[test]
    fn waitlist_only_class_caps_at_configured_limit() {
        let store = InventoryStore::new();
        store.open_class(key(), 0, 0, 45).unwrap();

        for n in 1..=45u64 {
            let outcome = store.try_reserve(&key(), &pnr(n), 1).unwrap();
            assert_eq!(
                outcome.allocations,
                vec![Allocation::Waitlisted { position: n as u32 }]
            );
        }

        let err = store.try_reserve(&key(), &pnr(46), 1).unwrap_err();
        assert!(matches!(err, InventoryError::WaitlistFull { .. }));
    }

    #[test]
    fn capacity_invariant_holds_through_churn() {
        let store = InventoryStore::new();
        store.open_class(key(), 3, 2, 10).unwrap();

        for n in 1..=6u64 {
            store.try_reserve(&key(), &pnr(n), 1).unwrap();
        }
        for n in [2u64, 4, 1] {
            store.release(&key(), &pnr(n)).unwrap();
            let snap = store.snapshot(&key()).unwrap();
            assert!(snap.available <= snap.total_seats);
            assert!(snap.rac_free <= snap.rac_capacity);
        }

        // 3 passengers left for 3 berths: everyone confirmed.
        let snap = store.snapshot(&key()).unwrap();
        assert_eq!(snap.available, 0);
        assert_eq!(snap.rac_free, 2);
        assert_eq!(snap.waitlisted, 0);
    }

    #[test]
    fn unknown_key_and_unknown_pnr_are_errors() {
        let store = InventoryStore::new();
        assert!(matches!(
            store.try_reserve(&key(), &pnr(1), 1),
            Err(InventoryError::UnknownClass(_))
        ));

        store.open_class(key(), 1, 0, 0).unwrap();
        assert!(matches!(
            store.release(&key(), &pnr(1)),
            Err(InventoryError::UnknownPnr(_))
        ));
    }
}
