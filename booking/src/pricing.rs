//! Add-on pricing.
//!
//! A line is priced as:
//!
//! ```text
//! unit   = base_price                      (flat)
//!        | base_price * multiplier         (companion / extra person, half-up)
//!        then clamped into price_range, if any
//! total  = unit * max(quantity, 1)
//! final  = total - discount, never below zero
//! ```
//!
//! Every amount is integer cents; overflow is an error, never a wrap.

use crate::catalog::AddOnCatalog;
use crate::metrics;
use chrono::{DateTime, Utc};
use medtour_core::{
    AddOnDefinition, AddOnError, AddOnType, AddOnUnit, BookingAddOnSelection, Currency, Money,
    SelectionId, SelectionRequest, SelectionStatus,
};
use serde::{Deserialize, Serialize};

/// Largest quantity accepted on one line (a year of nights).
pub const MAX_QUANTITY: u32 = 365;

/// One priced selection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricedLine {
    /// Which add-on
    pub add_on_type: AddOnType,
    /// Quantity unit
    pub unit: AddOnUnit,
    /// Quantity charged (at least 1)
    pub quantity: u32,
    /// Unit price after multiplier and range
    pub unit_price: Money,
    /// `unit_price * quantity`
    pub total_price: Money,
    /// Requested discount
    pub discount: Money,
    /// `total_price - discount`, clamped at zero
    pub final_price: Money,
    /// Currency of the line
    pub currency: Currency,
}

impl PricedLine {
    /// Freeze the line into a pending selection.
    #[must_use]
    pub fn into_selection(self, selected_at: DateTime<Utc>) -> BookingAddOnSelection {
        BookingAddOnSelection {
            id: SelectionId::new(),
            add_on_type: self.add_on_type,
            quantity: self.quantity,
            unit_price: self.unit_price,
            total_price: self.total_price,
            discount: self.discount,
            final_price: self.final_price,
            currency: self.currency,
            status: SelectionStatus::Pending,
            selected_at,
        }
    }
}

/// Priced lines of one booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Lines in selection order
    pub lines: Vec<PricedLine>,
    /// Sum of `final_price` over all lines
    pub subtotal: Money,
    /// Currency shared by every line
    pub currency: Currency,
}

/// Prices a line against its definition.
///
/// # Errors
///
/// - [`AddOnError::InvalidQuantity`]: quantity above [`MAX_QUANTITY`]
/// - [`AddOnError::PriceOverflow`]: arithmetic overflow
pub fn price_line(
    definition: &AddOnDefinition,
    request: &SelectionRequest,
) -> Result<PricedLine, AddOnError> {
    let add_on_type = definition.add_on_type;
    if request.quantity > MAX_QUANTITY {
        return Err(AddOnError::InvalidQuantity {
            add_on_type,
            quantity: request.quantity,
            max: MAX_QUANTITY,
        });
    }

    let mut unit_price = match definition.multiplier {
        Some(multiplier) => definition
            .base_price
            .checked_apply_multiplier(multiplier)
            .ok_or(AddOnError::PriceOverflow(add_on_type))?,
        None => definition.base_price,
    };
    if let Some(range) = definition.price_range {
        unit_price = unit_price.clamp_to(range);
    }

    let quantity = request.quantity.max(1);
    let total_price = unit_price
        .checked_multiply(quantity)
        .ok_or(AddOnError::PriceOverflow(add_on_type))?;
    let discount = request.discount.unwrap_or(Money::ZERO);

    Ok(PricedLine {
        add_on_type,
        unit: definition.unit,
        quantity,
        unit_price,
        total_price,
        discount,
        final_price: total_price.saturating_sub(discount),
        currency: definition.currency.clone(),
    })
}

/// Sums lines that must all be in `currency`.
///
/// # Errors
///
/// - [`AddOnError::CurrencyMismatch`]: a line uses another currency
/// - [`AddOnError::PriceOverflow`]: the subtotal overflows
pub fn aggregate(currency: &Currency, lines: Vec<PricedLine>) -> Result<Quote, AddOnError> {
    let mut subtotal = Money::ZERO;
    for line in &lines {
        if line.currency != *currency {
            return Err(AddOnError::CurrencyMismatch {
                add_on_type: line.add_on_type,
                expected: currency.clone(),
                found: line.currency.clone(),
            });
        }
        subtotal = subtotal
            .checked_add(line.final_price)
            .ok_or(AddOnError::PriceOverflow(line.add_on_type))?;
    }
    Ok(Quote {
        lines,
        subtotal,
        currency: currency.clone(),
    })
}

/// Prices selections using definitions from an [`AddOnCatalog`].
#[derive(Clone)]
pub struct AddOnPricingEngine {
    catalog: AddOnCatalog,
}

impl AddOnPricingEngine {
    /// Create an engine reading from `catalog`.
    #[must_use]
    pub const fn new(catalog: AddOnCatalog) -> Self {
        Self { catalog }
    }

    /// The catalog prices come from.
    #[must_use]
    pub const fn catalog(&self) -> &AddOnCatalog {
        &self.catalog
    }

    /// Price a single selection.
    ///
    /// # Errors
    ///
    /// - [`AddOnError::UnknownAddOnType`], [`AddOnError::InactiveAddOn`]
    /// - [`AddOnError::InvalidQuantity`], [`AddOnError::PriceOverflow`]
    pub async fn price(&self, request: &SelectionRequest) -> Result<PricedLine, AddOnError> {
        let definition = self.catalog.definition(request.add_on_type).await?;
        price_line(&definition, request)
    }

    /// Price every selection and total them in `currency`.
    ///
    /// # Errors
    ///
    /// The first error of [`Self::price`] or [`aggregate`].
    pub async fn quote(
        &self,
        currency: &Currency,
        requests: &[SelectionRequest],
    ) -> Result<Quote, AddOnError> {
        let mut lines = Vec::with_capacity(requests.len());
        for request in requests {
            lines.push(self.price(request).await?);
        }
        let quote = aggregate(currency, lines)?;

        metrics::record_quote(quote.subtotal.cents());
        tracing::debug!(
            lines = quote.lines.len(),
            subtotal = %quote.subtotal,
            currency = %quote.currency,
            "Add-on quote computed"
        );
        Ok(quote)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::standard_definitions;
    use medtour_core::{AddOnCategory, Multiplier, PriceRange};
    use medtour_testing::InMemoryCatalogStore;
    use medtour_testing::properties::any_selection_request;
    use proptest::prelude::*;
    use std::sync::Arc;

    fn flat(add_on_type: AddOnType, cents: u64) -> AddOnDefinition {
        AddOnDefinition {
            add_on_type,
            category: add_on_type.category(),
            unit: AddOnUnit::PerNight,
            base_price: Money::from_cents(cents),
            price_range: None,
            multiplier: None,
            currency: Currency::usd(),
            exclusion_groups: Vec::new(),
            active: true,
        }
    }

    #[test]
    fn discount_comes_off_the_line_total() {
        let definition = flat(AddOnType::AccommodationStandard, 100);
        let line = price_line(
            &definition,
            &SelectionRequest::new(AddOnType::AccommodationStandard, 3)
                .with_discount(Money::from_cents(50)),
        )
        .unwrap();
        assert_eq!(line.total_price, Money::from_cents(300));
        assert_eq!(line.final_price, Money::from_cents(250));
    }

    #[test]
    fn oversized_discount_clamps_to_zero() {
        let definition = flat(AddOnType::AccommodationStandard, 100);
        let line = price_line(
            &definition,
            &SelectionRequest::new(AddOnType::AccommodationStandard, 1)
                .with_discount(Money::from_cents(1_000)),
        )
        .unwrap();
        assert_eq!(line.final_price, Money::ZERO);
    }

    #[test]
    fn zero_quantity_is_charged_once() {
        let definition = flat(AddOnType::ServiceLocalSim, 1_500);
        let line = price_line(&definition, &SelectionRequest::new(AddOnType::ServiceLocalSim, 0))
            .unwrap();
        assert_eq!(line.quantity, 1);
        assert_eq!(line.total_price, Money::from_cents(1_500));
    }

    #[test]
    fn quantity_above_a_year_is_rejected() {
        let definition = flat(AddOnType::AccommodationBudget, 4_000);
        let err = price_line(
            &definition,
            &SelectionRequest::new(AddOnType::AccommodationBudget, MAX_QUANTITY + 1),
        )
        .unwrap_err();
        assert!(matches!(err, AddOnError::InvalidQuantity { quantity: 366, .. }));
    }

    #[test]
    fn companion_price_applies_multiplier_then_range() {
        let mut definition = flat(AddOnType::TravelerCompanion, 333);
        definition.category = AddOnCategory::Traveler;
        definition.multiplier = Some(Multiplier::from_basis_points(15_000));
        let line = price_line(&definition, &SelectionRequest::new(AddOnType::TravelerCompanion, 2))
            .unwrap();
        // 333 * 1.5 = 499.5, rounded half-up
        assert_eq!(line.unit_price, Money::from_cents(500));
        assert_eq!(line.total_price, Money::from_cents(1_000));

        definition.price_range = Some(PriceRange::new(Money::from_cents(100), Money::from_cents(400)));
        let clamped = price_line(&definition, &SelectionRequest::new(AddOnType::TravelerCompanion, 1))
            .unwrap();
        assert_eq!(clamped.unit_price, Money::from_cents(400));
    }

    #[test]
    fn aggregate_rejects_mixed_currencies() {
        let usd = price_line(
            &flat(AddOnType::ServiceInterpreter, 2_500),
            &SelectionRequest::new(AddOnType::ServiceInterpreter, 2),
        )
        .unwrap();
        let mut eur_definition = flat(AddOnType::ServiceCityTour, 6_000);
        eur_definition.currency = Currency::new("EUR").unwrap();
        let eur = price_line(&eur_definition, &SelectionRequest::new(AddOnType::ServiceCityTour, 1))
            .unwrap();

        let err = aggregate(&Currency::usd(), vec![usd, eur]).unwrap_err();
        assert!(matches!(
            err,
            AddOnError::CurrencyMismatch {
                add_on_type: AddOnType::ServiceCityTour,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn quote_sums_final_prices() {
        let engine = AddOnPricingEngine::new(AddOnCatalog::new(Arc::new(
            InMemoryCatalogStore::new(standard_definitions(&Currency::usd())),
        )));
        let quote = engine
            .quote(
                &Currency::usd(),
                &[
                    SelectionRequest::new(AddOnType::AccommodationStandard, 4),
                    SelectionRequest::new(AddOnType::ServiceAirportPickup, 1)
                        .with_discount(Money::from_cents(1_000)),
                ],
            )
            .await
            .unwrap();

        assert_eq!(quote.lines.len(), 2);
        assert_eq!(quote.subtotal, Money::from_cents(4 * 9_000 + 3_000));
    }

    proptest! {
        #[test]
        fn final_price_never_exceeds_total(request in any_selection_request()) {
            let definitions = standard_definitions(&Currency::usd());
            let definition = definitions
                .iter()
                .find(|d| d.add_on_type == request.add_on_type)
                .unwrap();
            let line = price_line(definition, &request).unwrap();
            prop_assert!(line.final_price <= line.total_price);
            prop_assert!(line.quantity >= 1);
            prop_assert_eq!(
                line.final_price,
                line.total_price.saturating_sub(request.discount.unwrap_or(Money::ZERO))
            );
        }
    }
}
