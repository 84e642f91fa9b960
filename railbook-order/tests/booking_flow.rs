use chrono::{Duration, NaiveDate, Utc};
use std::sync::Arc;

use railbook_catalog::{InMemoryCatalog, InventoryStore};
use railbook_core::{MockPaymentGateway, PaymentGateway};
use railbook_order::{BookingError, CreateBookingRequest, ReservationEngine};
use railbook_shared::{
    Allocation, BerthPreference, Booking, BookingEvent, BookingStatus, ClassCode, ContactInfo,
    FareBreakdown, Gender, InventoryKey, Nationality, Passenger, PassengerRecord, Pnr,
};
use railbook_store::{EngineRules, PnrRegistry};

fn journey_date() -> NaiveDate {
    Utc::now().date_naive() + Duration::days(30)
}

fn sleeper_key() -> InventoryKey {
    InventoryKey {
        train_number: "12951".to_string(),
        journey_date: journey_date(),
        class: ClassCode::Sleeper,
    }
}

fn passenger(name: &str) -> Passenger {
    Passenger {
        name: name.to_string(),
        age: 34,
        gender: Gender::Female,
        berth_preference: BerthPreference::NoPreference,
        nationality: Nationality::Indian,
    }
}

fn request(user: &str, passengers: usize) -> CreateBookingRequest {
    CreateBookingRequest {
        user_id: user.to_string(),
        train_number: "12951".to_string(),
        origin: "NDLS".to_string(),
        destination: "BCT".to_string(),
        journey_date: journey_date(),
        class: ClassCode::Sleeper,
        passengers: (0..passengers)
            .map(|i| passenger(&format!("Passenger {}", i + 1)))
            .collect(),
        contact: ContactInfo::new(format!("{}@example.com", user), "9876543210"),
    }
}

struct Harness {
    engine: Arc<ReservationEngine>,
    inventory: Arc<InventoryStore>,
    registry: Arc<PnrRegistry>,
    payment: Arc<MockPaymentGateway>,
}

fn harness(total_seats: u32, rac_capacity: u32, waitlist_cap: u32) -> Harness {
    let catalog = Arc::new(InMemoryCatalog::with_sample_trains());
    let inventory = Arc::new(InventoryStore::new());
    let registry = Arc::new(PnrRegistry::new());
    let payment = Arc::new(MockPaymentGateway::new());

    inventory
        .open_class(sleeper_key(), total_seats, rac_capacity, waitlist_cap)
        .unwrap();

    let engine = Arc::new(ReservationEngine::new(
        catalog,
        Arc::clone(&inventory),
        Arc::clone(&registry),
        Arc::clone(&payment) as Arc<dyn PaymentGateway>,
        EngineRules::default(),
    ));

    Harness {
        engine,
        inventory,
        registry,
        payment,
    }
}

fn tally(bookings: &[Booking]) -> (usize, usize, usize) {
    let mut confirmed = 0;
    let mut rac = 0;
    let mut waitlisted = 0;
    for booking in bookings {
        for record in &booking.passengers {
            match record.allocation {
                Allocation::Confirmed { .. } => confirmed += 1,
                Allocation::Rac { .. } => rac += 1,
                Allocation::Waitlisted { .. } => waitlisted += 1,
            }
        }
    }
    (confirmed, rac, waitlisted)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn concurrent_demand_never_oversells() {
    let h = harness(10, 5, 100);

    let mut handles = Vec::new();
    for i in 0..30 {
        let engine = Arc::clone(&h.engine);
        handles.push(tokio::spawn(async move {
            engine.create_booking(request(&format!("user{}", i), 1)).await
        }));
    }

    let mut bookings = Vec::new();
    for handle in handles {
        bookings.push(handle.await.unwrap().unwrap());
    }

    let (confirmed, rac, waitlisted) = tally(&bookings);
    assert_eq!(confirmed, 10);
    assert_eq!(rac, 5);
    assert_eq!(waitlisted, 15);

    let snap = h.inventory.snapshot(&sleeper_key()).unwrap();
    assert_eq!(snap.available, 0);
    assert_eq!(snap.rac_free, 0);
    assert_eq!(snap.waitlisted, 15);

    // No two passengers share a berth or RAC slot.
    let mut berths: Vec<u32> = bookings
        .iter()
        .flat_map(|b| b.passengers.iter())
        .filter_map(|p| match p.allocation {
            Allocation::Confirmed { berth } => Some(berth),
            _ => None,
        })
        .collect();
    berths.sort_unstable();
    berths.dedup();
    assert_eq!(berths.len(), 10);
}

#[tokio::test]
async fn group_booking_spans_tiers_with_captured_fare() {
    let h = harness(2, 1, 10);

    let booking = h.engine.create_booking(request("family", 4)).await.unwrap();

    assert_eq!(booking.status, BookingStatus::PartiallyConfirmed);
    let (confirmed, rac, waitlisted) = tally(std::slice::from_ref(&booking));
    assert_eq!((confirmed, rac, waitlisted), (2, 1, 1));

    // 675 * 4 base, 15 * 4 fee, round(2700 * 5%) tax.
    assert_eq!(booking.fare.base_total, 2700);
    assert_eq!(booking.fare.reservation_fee, 60);
    assert_eq!(booking.fare.service_tax, 135);
    assert_eq!(booking.fare.total, 2895);
}

#[tokio::test]
async fn cancellation_promotes_in_fifo_order() {
    let h = harness(1, 1, 10);

    let a = h.engine.create_booking(request("a", 1)).await.unwrap();
    let b = h.engine.create_booking(request("b", 1)).await.unwrap();
    let c = h.engine.create_booking(request("c", 1)).await.unwrap();
    let d = h.engine.create_booking(request("d", 1)).await.unwrap();

    assert_eq!(a.status, BookingStatus::Confirmed);
    assert_eq!(b.status, BookingStatus::PartiallyConfirmed); // all-RAC
    assert_eq!(c.status, BookingStatus::Waitlisted);
    assert_eq!(d.status, BookingStatus::Waitlisted);

    h.engine.cancel_booking(&a.pnr).unwrap();

    let b = h.engine.get_booking_status(&b.pnr).unwrap();
    assert_eq!(b.status, BookingStatus::Confirmed);
    assert_eq!(b.passengers[0].allocation, Allocation::Confirmed { berth: 1 });

    let c = h.engine.get_booking_status(&c.pnr).unwrap();
    assert_eq!(c.passengers[0].allocation, Allocation::Rac { slot: 1 });

    // D shifts from WL/2 to WL/1.
    let d = h.engine.get_booking_status(&d.pnr).unwrap();
    assert_eq!(d.passengers[0].allocation, Allocation::Waitlisted { position: 1 });
}

#[tokio::test]
async fn cancellation_is_idempotent() {
    let h = harness(1, 0, 10);

    let booking = h.engine.create_booking(request("solo", 1)).await.unwrap();
    h.engine.cancel_booking(&booking.pnr).unwrap();
    // Second cancel is a no-op success, not a second release.
    h.engine.cancel_booking(&booking.pnr).unwrap();

    let snap = h.inventory.snapshot(&sleeper_key()).unwrap();
    assert_eq!(snap.available, 1);
    assert_eq!(
        h.engine.get_booking_status(&booking.pnr).unwrap().status,
        BookingStatus::Cancelled
    );
}

#[tokio::test]
async fn declined_payment_leaves_zero_net_inventory() {
    let h = harness(2, 0, 10);

    h.payment.decline_next();
    let err = h.engine.create_booking(request("declined", 2)).await.unwrap_err();
    let pnr = match err {
        BookingError::PaymentDeclined(pnr) => pnr,
        other => panic!("expected PaymentDeclined, got {:?}", other),
    };

    let snap = h.inventory.snapshot(&sleeper_key()).unwrap();
    assert_eq!(snap.available, 2);
    assert_eq!(
        h.engine.get_booking_status(&pnr).unwrap().status,
        BookingStatus::Cancelled
    );

    // The seats are immediately bookable again.
    let booking = h.engine.create_booking(request("next", 2)).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Confirmed);
}

#[tokio::test]
async fn gateway_failure_compensates_like_a_decline() {
    let h = harness(1, 0, 10);

    h.payment.fail_next();
    let err = h.engine.create_booking(request("broken", 1)).await.unwrap_err();
    assert!(matches!(err, BookingError::Internal(_)));
    assert_eq!(h.inventory.snapshot(&sleeper_key()).unwrap().available, 1);
}

#[tokio::test]
async fn waitlist_cap_bounds_sold_out_class() {
    let h = harness(0, 0, 45);

    for i in 1..=45 {
        let booking = h
            .engine
            .create_booking(request(&format!("wl{}", i), 1))
            .await
            .unwrap();
        assert_eq!(booking.status, BookingStatus::Waitlisted);
        assert_eq!(
            booking.passengers[0].allocation,
            Allocation::Waitlisted { position: i }
        );
    }

    let err = h.engine.create_booking(request("wl46", 1)).await.unwrap_err();
    assert!(matches!(err, BookingError::InventoryUnavailable(_)));
}

#[tokio::test]
async fn malformed_requests_are_rejected_before_any_reservation() {
    let h = harness(10, 0, 10);

    let mut past = request("late", 1);
    past.journey_date = Utc::now().date_naive() - Duration::days(1);
    assert!(matches!(
        h.engine.create_booking(past).await,
        Err(BookingError::Validation(_))
    ));

    assert!(matches!(
        h.engine.create_booking(request("crowd", 7)).await,
        Err(BookingError::Validation(_))
    ));

    let mut unknown = request("ghost", 1);
    unknown.train_number = "99999".to_string();
    assert!(matches!(
        h.engine.create_booking(unknown).await,
        Err(BookingError::Validation(_))
    ));

    assert_eq!(h.inventory.snapshot(&sleeper_key()).unwrap().available, 10);
}

#[tokio::test]
async fn booking_history_lists_a_users_bookings() {
    let h = harness(10, 0, 10);

    h.engine.create_booking(request("meera", 1)).await.unwrap();
    h.engine.create_booking(request("meera", 2)).await.unwrap();
    h.engine.create_booking(request("rahul", 1)).await.unwrap();

    let history = h.engine.list_bookings_for_user("meera").unwrap();
    assert_eq!(history.len(), 2);
    assert!(h.engine.list_bookings_for_user("nobody").unwrap().is_empty());
}

#[tokio::test]
async fn unknown_pnr_is_not_found() {
    let h = harness(1, 0, 10);
    let pnr = Pnr::new("0000000001").unwrap();
    assert!(matches!(
        h.engine.get_booking_status(&pnr),
        Err(BookingError::NotFound(_))
    ));
    assert!(matches!(
        h.engine.cancel_booking(&pnr),
        Err(BookingError::NotFound(_))
    ));
}

#[tokio::test]
async fn completed_bookings_are_terminal() {
    let h = harness(1, 0, 10);

    let booking = h.engine.create_booking(request("done", 1)).await.unwrap();
    h.engine.mark_completed(&booking.pnr).unwrap();

    assert!(matches!(
        h.engine.cancel_booking(&booking.pnr),
        Err(BookingError::Internal(_))
    ));
    assert!(matches!(
        h.engine.mark_completed(&booking.pnr),
        Err(BookingError::Internal(_))
    ));
}

#[tokio::test]
async fn lifecycle_events_are_broadcast() {
    let h = harness(1, 0, 10);
    let mut events = h.engine.subscribe();

    let booking = h.engine.create_booking(request("watcher", 1)).await.unwrap();
    h.engine.cancel_booking(&booking.pnr).unwrap();

    match events.try_recv().unwrap() {
        BookingEvent::BookingCreated { pnr, status, .. } => {
            assert_eq!(pnr, booking.pnr.to_string());
            assert_eq!(status, BookingStatus::Confirmed);
        }
        other => panic!("expected BookingCreated, got {:?}", other),
    }
    assert!(matches!(
        events.try_recv().unwrap(),
        BookingEvent::BookingCancelled { .. }
    ));
}

#[tokio::test]
async fn stale_pending_bookings_are_swept_back_into_inventory() {
    let h = harness(1, 0, 10);
    let key = sleeper_key();

    // A booking whose payment step never completed: reserved capacity and a
    // Pending registry record, created well outside the payment window.
    let pnr = Pnr::new("7770000001").unwrap();
    let outcome = h.inventory.try_reserve(&key, &pnr, 1).unwrap();
    let stale_at = Utc::now() - Duration::hours(2);
    h.registry
        .store(Booking {
            pnr: pnr.clone(),
            user_id: "ghost".to_string(),
            train_number: key.train_number.clone(),
            origin: "NDLS".to_string(),
            destination: "BCT".to_string(),
            journey_date: key.journey_date,
            class: key.class,
            passengers: vec![PassengerRecord {
                passenger: passenger("Ghost Rider"),
                allocation: outcome.allocations[0],
            }],
            contact: ContactInfo::new("ghost@example.com", "9876543210"),
            fare: FareBreakdown {
                base_fare_per_passenger: 675,
                passenger_count: 1,
                base_total: 675,
                reservation_fee: 15,
                service_tax: 34,
                total: 724,
            },
            status: BookingStatus::Pending,
            created_at: stale_at,
            updated_at: stale_at,
        })
        .unwrap();

    assert_eq!(h.engine.release_stale_pending().unwrap(), 1);
    assert_eq!(
        h.engine.get_booking_status(&pnr).unwrap().status,
        BookingStatus::Cancelled
    );
    assert_eq!(h.inventory.snapshot(&key).unwrap().available, 1);

    // Nothing left to sweep on the second pass.
    assert_eq!(h.engine.release_stale_pending().unwrap(), 0);
}
