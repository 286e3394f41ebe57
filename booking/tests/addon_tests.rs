//! Integration tests for add-on compatibility, pricing and application.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use medtour_booking::catalog::standard_definitions;
use medtour_booking::{BookingService, RetryPolicy, ServiceError};
use medtour_core::{
    AddOnCategory, AddOnDefinition, AddOnError, AddOnType, AddOnUnit, Booking, BookingStatus,
    BookingStore, Currency, ExclusionGroup, Money, SelectionRequest, SelectionStatus,
};
use medtour_testing::{
    BookingBuilder, InMemoryBookingStore, InMemoryCatalogStore, test_clock,
};
use std::sync::Arc;

// ============================================================================
// Test Fixtures
// ============================================================================

struct Harness {
    store: Arc<InMemoryBookingStore>,
    catalog: Arc<InMemoryCatalogStore>,
    service: BookingService,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(InMemoryBookingStore::new());
        let catalog = Arc::new(InMemoryCatalogStore::new(standard_definitions(&Currency::usd())));
        let service = BookingService::new(
            store.clone(),
            store.audit_sink(),
            catalog.clone(),
            Arc::new(test_clock()),
        )
        .with_retry_policy(RetryPolicy::no_retry());
        Self {
            store,
            catalog,
            service,
        }
    }

    async fn booking(&self, builder: BookingBuilder) -> Booking {
        self.store.insert(builder.build()).await.unwrap()
    }
}

/// A flat one-dollar-per-hour interpreter, for exact arithmetic.
fn one_dollar_interpreter() -> AddOnDefinition {
    AddOnDefinition {
        add_on_type: AddOnType::ServiceInterpreter,
        category: AddOnCategory::Service,
        unit: AddOnUnit::PerHour,
        base_price: Money::from_cents(100),
        price_range: None,
        multiplier: None,
        currency: Currency::usd(),
        exclusion_groups: Vec::new(),
        active: true,
    }
}

// ============================================================================
// Compatibility
// ============================================================================

#[test]
fn luxury_and_budget_conflict() {
    let h = Harness::new();
    let report = h
        .service
        .validate_add_on_selection(&[AddOnType::AccommodationLuxury, AddOnType::AccommodationBudget]);

    assert!(!report.valid);
    let conflict = report.conflicting.unwrap();
    assert_eq!(conflict.first, AddOnType::AccommodationLuxury);
    assert_eq!(conflict.second, AddOnType::AccommodationBudget);
    assert_eq!(conflict.group, ExclusionGroup::AccommodationTier);
}

#[test]
fn luxury_and_visa_assistance_combine() {
    let h = Harness::new();
    let report = h
        .service
        .validate_add_on_selection(&[AddOnType::AccommodationLuxury, AddOnType::VisaAssistance]);
    assert!(report.valid);
    assert!(report.conflicting.is_none());
}

#[test]
fn report_serializes_wire_names() {
    let h = Harness::new();
    let report = h
        .service
        .validate_add_on_selection(&[AddOnType::TravelerSelf, AddOnType::TravelerCompanion]);
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["valid"], false);
    assert_eq!(json["conflicting"]["first"], "traveler_self");
    assert_eq!(json["conflicting"]["second"], "traveler_companion");
}

// ============================================================================
// Pricing
// ============================================================================

#[tokio::test]
async fn discount_comes_off_the_line_total() {
    let h = Harness::new();
    h.catalog.upsert(one_dollar_interpreter());
    let booking = h.booking(BookingBuilder::new()).await;

    let quote = h
        .service
        .price_selection(
            booking.id,
            &[SelectionRequest::new(AddOnType::ServiceInterpreter, 3)
                .with_discount(Money::from_cents(50))],
        )
        .await
        .unwrap();

    let line = &quote.lines[0];
    assert_eq!(line.unit_price, Money::from_cents(100));
    assert_eq!(line.total_price, Money::from_cents(300));
    assert_eq!(line.final_price, Money::from_cents(250));
    assert_eq!(quote.subtotal, Money::from_cents(250));
    assert_eq!(quote.currency, Currency::usd());
}

#[tokio::test]
async fn oversized_discount_never_goes_negative() {
    let h = Harness::new();
    h.catalog.upsert(one_dollar_interpreter());
    let booking = h.booking(BookingBuilder::new()).await;

    let quote = h
        .service
        .price_selection(
            booking.id,
            &[SelectionRequest::new(AddOnType::ServiceInterpreter, 3)
                .with_discount(Money::from_cents(10_000))],
        )
        .await
        .unwrap();

    assert_eq!(quote.lines[0].final_price, Money::ZERO);
    assert_eq!(quote.subtotal, Money::ZERO);
}

#[tokio::test]
async fn price_range_clamps_unit_price() {
    let h = Harness::new();
    let mut luxury = standard_definitions(&Currency::usd())
        .into_iter()
        .find(|d| d.add_on_type == AddOnType::AccommodationLuxury)
        .unwrap();
    luxury.base_price = Money::from_cents(100_000);
    h.catalog.upsert(luxury);
    let booking = h.booking(BookingBuilder::new()).await;

    let quote = h
        .service
        .price_selection(booking.id, &[SelectionRequest::new(AddOnType::AccommodationLuxury, 2)])
        .await
        .unwrap();

    // Standard luxury range tops out at 600.00
    assert_eq!(quote.lines[0].unit_price, Money::from_cents(60_000));
    assert_eq!(quote.subtotal, Money::from_cents(120_000));
}

#[tokio::test]
async fn missing_and_inactive_definitions_fail() {
    let h = Harness::new();
    let booking = h.booking(BookingBuilder::new()).await;
    h.catalog.remove(AddOnType::VisaExpedited);
    let mut tour = standard_definitions(&Currency::usd())
        .into_iter()
        .find(|d| d.add_on_type == AddOnType::ServiceCityTour)
        .unwrap();
    tour.active = false;
    h.catalog.upsert(tour);

    let err = h
        .service
        .price_selection(booking.id, &[SelectionRequest::new(AddOnType::VisaExpedited, 1)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::AddOn(AddOnError::UnknownAddOnType(AddOnType::VisaExpedited))
    ));

    let err = h
        .service
        .price_selection(booking.id, &[SelectionRequest::new(AddOnType::ServiceCityTour, 2)])
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "inactive_add_on");
}

#[tokio::test]
async fn catalog_currency_must_match_booking() {
    let h = Harness::new();
    let eur = Currency::new("EUR").unwrap();
    let booking = h.booking(BookingBuilder::new().currency(eur.clone())).await;

    let err = h
        .service
        .price_selection(booking.id, &[SelectionRequest::new(AddOnType::ServiceLocalSim, 1)])
        .await
        .unwrap_err();

    match err {
        ServiceError::AddOn(AddOnError::CurrencyMismatch {
            add_on_type,
            expected,
            found,
        }) => {
            assert_eq!(add_on_type, AddOnType::ServiceLocalSim);
            assert_eq!(expected, eur);
            assert_eq!(found, Currency::usd());
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn quantity_above_a_year_is_rejected() {
    let h = Harness::new();
    let booking = h.booking(BookingBuilder::new()).await;

    let err = h
        .service
        .price_selection(
            booking.id,
            &[SelectionRequest::new(AddOnType::AccommodationBudget, 400)],
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "invalid_quantity");
}

// ============================================================================
// Applying selections
// ============================================================================

#[tokio::test]
async fn applied_lines_snapshot_prices() {
    let h = Harness::new();
    let booking = h.booking(BookingBuilder::new().status(BookingStatus::QuotationSent)).await;

    let updated = h
        .service
        .apply_add_ons(
            booking.id,
            &[
                SelectionRequest::new(AddOnType::TravelerSelf, 1),
                SelectionRequest::new(AddOnType::AccommodationStandard, 5),
            ],
        )
        .await
        .unwrap();
    assert_eq!(updated.version, 1);
    assert_eq!(updated.add_ons.len(), 2);
    assert!(updated.add_ons.iter().all(|s| s.status == SelectionStatus::Pending));

    // Later catalog changes do not touch stored lines
    let mut pricier = standard_definitions(&Currency::usd())
        .into_iter()
        .find(|d| d.add_on_type == AddOnType::AccommodationStandard)
        .unwrap();
    pricier.base_price = Money::from_cents(99_000);
    h.catalog.upsert(pricier);

    let stored = h.store.get(booking.id).unwrap();
    let stay = stored
        .add_ons
        .iter()
        .find(|s| s.add_on_type == AddOnType::AccommodationStandard)
        .unwrap();
    assert_eq!(stay.unit_price, Money::from_cents(9_000));
    assert_eq!(stay.final_price, Money::from_cents(45_000));
}

#[tokio::test]
async fn conflicting_selection_is_not_saved() {
    let h = Harness::new();
    let booking = h.booking(BookingBuilder::new()).await;

    let err = h
        .service
        .apply_add_ons(
            booking.id,
            &[
                SelectionRequest::new(AddOnType::TravelFlight, 1),
                SelectionRequest::new(AddOnType::TravelTrain, 1),
            ],
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ServiceError::AddOn(AddOnError::ConflictingAddOns {
            group: ExclusionGroup::TravelMode,
            ..
        })
    ));
    assert_eq!(h.store.save_count(), 0);
}

#[tokio::test]
async fn closed_bookings_reject_selections() {
    let h = Harness::new();
    for status in BookingStatus::ALL.into_iter().filter(|s| s.is_closed()) {
        let booking = h.booking(BookingBuilder::new().status(status)).await;
        let err = h
            .service
            .apply_add_ons(booking.id, &[SelectionRequest::new(AddOnType::ServiceLocalSim, 1)])
            .await
            .unwrap_err();
        assert!(
            matches!(err, ServiceError::AddOn(AddOnError::AddOnsLocked { status: s, .. }) if s == status),
            "{status}: {err:?}"
        );
    }
}

#[tokio::test]
async fn missing_booking_is_reported() {
    let h = Harness::new();
    let err = h
        .service
        .apply_add_ons(
            medtour_core::BookingId::new(),
            &[SelectionRequest::new(AddOnType::ServiceLocalSim, 1)],
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "not_found");
}

#[tokio::test]
async fn lost_race_surfaces_without_retry_budget() {
    let h = Harness::new();
    let booking = h.booking(BookingBuilder::new()).await;
    let on_arrival = [SelectionRequest::new(AddOnType::VisaOnArrival, 1)];
    let expedited = [SelectionRequest::new(AddOnType::VisaExpedited, 1)];
    h.store.hold_reads(2);

    let (first, second) = tokio::join!(
        h.service.apply_add_ons(booking.id, &on_arrival),
        h.service.apply_add_ons(booking.id, &expedited),
    );

    let results = [first, second];
    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    let lost = results.into_iter().find_map(Result::err).unwrap();
    assert!(lost.is_retryable());
    assert_eq!(lost.kind(), "concurrent_modification");
}
