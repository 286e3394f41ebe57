//! Booking lifecycle demo
//!
//! Walks one booking through review, acceptance, add-on selection and
//! payment, then runs a bulk rejection and prints statistics and the
//! Prometheus metrics the run produced.
//!
//! # Usage
//!
//! ```bash
//! # In-memory stores
//! cargo run -p medtour-booking --features demo --bin booking-demo
//!
//! # PostgreSQL
//! STORAGE_BACKEND=postgres DATABASE_URL=postgres://... \
//!     cargo run -p medtour-booking --features demo --bin booking-demo
//! ```

use medtour_booking::catalog::standard_definitions;
use medtour_booking::config::StorageBackend;
use medtour_booking::metrics::register_booking_metrics;
use medtour_booking::{BookingService, BulkTransitionRequest, ChangeContext, Config, TransitionRequest};
use medtour_core::environment::SystemClock;
use medtour_core::{
    Actor, AddOnType, AuditSink, BookingStatus, BookingStore, CatalogStore, ClientMetadata,
    CoordinatorId, HospitalId, PatientId, SelectionRequest, TreatmentId, UserId,
};
use medtour_postgres::{PostgresBookingStore, PostgresCatalogStore};
use medtour_testing::{InMemoryBookingStore, InMemoryCatalogStore};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

type Stores = (Arc<dyn BookingStore>, Arc<dyn AuditSink>, Arc<dyn CatalogStore>);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let prometheus = PrometheusBuilder::new().install_recorder()?;
    register_booking_metrics();

    info!(backend = ?config.backend, currency = %config.default_currency, "Configuration loaded");
    let (bookings, audit, catalog) = build_stores(&config).await?;
    let service = BookingService::from_config(
        bookings,
        audit,
        catalog,
        Arc::new(SystemClock),
        &config,
    )?;

    println!("\n== Medtour booking demo ==\n");

    let staff = Actor::staff(UserId::new());
    let hospital = HospitalId::new();
    let booking = service
        .create_booking(PatientId::new(), hospital, TreatmentId::new(), None)
        .await?;
    println!("1. Created booking {} ({})", booking.id, booking.status);

    for target in [BookingStatus::UnderReview, BookingStatus::Accepted] {
        let updated = service
            .transition(
                TransitionRequest::new(booking.id, target, staff).with_client(ClientMetadata {
                    ip_address: Some("127.0.0.1".to_string()),
                    user_agent: Some("booking-demo".to_string()),
                }),
            )
            .await?;
        println!("2. Moved to {}", updated.status);
    }

    let coordinator = CoordinatorId::new();
    service
        .assign_coordinator(
            booking.id,
            coordinator,
            ChangeContext {
                actor: staff,
                reason: None,
                notes: Some("Speaks Thai".to_string()),
                client: ClientMetadata::default(),
            },
        )
        .await?;
    println!("3. Assigned coordinator {coordinator}");

    let rejected = [AddOnType::AccommodationLuxury, AddOnType::AccommodationBudget];
    let report = service.validate_add_on_selection(&rejected);
    println!("4. Luxury + budget stay: {}", serde_json::to_string(&report)?);

    let selections = [
        SelectionRequest::new(AddOnType::TravelFlight, 1),
        SelectionRequest::new(AddOnType::AccommodationStandard, 7),
        SelectionRequest::new(AddOnType::TravelerCompanion, 1),
        SelectionRequest::new(AddOnType::ServiceInterpreter, 6),
    ];
    let quote = service.price_selection(booking.id, &selections).await?;
    println!("5. Quote: {} {}", quote.subtotal, quote.currency);
    for line in &quote.lines {
        println!(
            "   {:<24} x{:<3} {:>10}",
            line.add_on_type.as_str(),
            line.quantity,
            line.final_price.to_string()
        );
    }
    service.apply_add_ons(booking.id, &selections).await?;

    // Walk to payment so pending add-ons get confirmed
    for target in [
        BookingStatus::QuotationSent,
        BookingStatus::PaymentDetails,
        BookingStatus::ConfirmationSent,
        BookingStatus::PaymentReceived,
    ] {
        service
            .transition(TransitionRequest::new(booking.id, target, staff))
            .await?;
    }
    let valid = service.valid_transitions(booking.id).await?;
    println!(
        "6. Payment received; next: {}",
        serde_json::to_string(&valid.valid_transitions)?
    );

    let mut batch = vec![booking.id];
    for _ in 0..2 {
        let extra = service
            .create_booking(PatientId::new(), hospital, TreatmentId::new(), None)
            .await?;
        batch.push(extra.id);
    }
    let outcome = service
        .bulk_transition(
            &BulkTransitionRequest::new(batch, BookingStatus::Rejected, staff)
                .with_reason("Hospital capacity exhausted"),
        )
        .await?;
    println!(
        "7. Bulk reject: {} succeeded, {} failed",
        outcome.succeeded_count(),
        outcome.failed_count()
    );
    for failure in &outcome.failed {
        println!("   {} -> {}", failure.id, failure.reason);
    }

    let stats = service
        .statistics(medtour_booking::StatisticsFilter {
            hospital_id: Some(hospital),
            ..Default::default()
        })
        .await?;
    println!("8. Statistics: {}", serde_json::to_string_pretty(&stats)?);

    let history = service.history(booking.id).await?;
    println!("9. History of {} ({} entries, newest first):", booking.id, history.len());
    for entry in &history {
        println!(
            "   {} {} -> {} {}",
            entry.created_at.format("%H:%M:%S%.3f"),
            entry.from_status,
            entry.to_status,
            entry.reason.as_deref().unwrap_or("")
        );
    }

    println!("\n== Metrics ==\n{}", prometheus.render());
    Ok(())
}

async fn build_stores(config: &Config) -> Result<Stores, Box<dyn std::error::Error>> {
    let definitions = standard_definitions(&config.currency()?);
    match config.backend {
        StorageBackend::Memory => {
            info!("Using in-memory stores");
            let store = Arc::new(InMemoryBookingStore::new());
            let audit: Arc<dyn AuditSink> = store.audit_sink();
            let bookings: Arc<dyn BookingStore> = store;
            let catalog: Arc<dyn CatalogStore> = Arc::new(InMemoryCatalogStore::new(definitions));
            Ok((bookings, audit, catalog))
        }
        StorageBackend::Postgres => {
            info!("Connecting to PostgreSQL...");
            let store = Arc::new(PostgresBookingStore::connect(&config.pool_config()).await?);
            store.migrate().await?;
            let catalog = PostgresCatalogStore::from_pool(store.pool().clone());
            for definition in &definitions {
                catalog.upsert_add_on(definition).await?;
            }
            info!(add_ons = definitions.len(), "PostgreSQL ready, catalog seeded");
            let bookings: Arc<dyn BookingStore> = store.clone();
            let audit: Arc<dyn AuditSink> = store;
            let catalog: Arc<dyn CatalogStore> = Arc::new(catalog);
            Ok((bookings, audit, catalog))
        }
    }
}
