//! Read-only access to add-on definitions, and the seeded default catalog.

use medtour_core::{
    AddOnDefinition, AddOnError, AddOnType, AddOnUnit, CatalogStore, Currency, ExclusionGroup,
    Money, Multiplier, PriceRange,
};
use std::sync::Arc;

/// Registry of selectable add-ons backed by a [`CatalogStore`].
#[derive(Clone)]
pub struct AddOnCatalog {
    store: Arc<dyn CatalogStore>,
}

impl AddOnCatalog {
    /// Create a catalog over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn CatalogStore>) -> Self {
        Self { store }
    }

    /// Definition of a selectable add-on.
    ///
    /// # Errors
    ///
    /// - [`AddOnError::UnknownAddOnType`]: no definition exists
    /// - [`AddOnError::InactiveAddOn`]: the definition is switched off
    /// - [`AddOnError::Store`]: catalog read failed
    pub async fn definition(&self, add_on_type: AddOnType) -> Result<AddOnDefinition, AddOnError> {
        let definition = self
            .store
            .find_add_on(add_on_type)
            .await?
            .ok_or(AddOnError::UnknownAddOnType(add_on_type))?;
        if !definition.active {
            return Err(AddOnError::InactiveAddOn(add_on_type));
        }
        Ok(definition)
    }

    /// Every active definition, ordered by type.
    ///
    /// # Errors
    ///
    /// Returns [`AddOnError::Store`] if the catalog read fails.
    pub async fn active_definitions(&self) -> Result<Vec<AddOnDefinition>, AddOnError> {
        let mut definitions = self.store.list_add_ons().await?;
        definitions.retain(|d| d.active);
        Ok(definitions)
    }
}

/// The standard catalog in `currency`.
///
/// Every type is present and active. Membership in the five exclusion groups
/// follows [`ExclusionGroup::standard_members`].
#[must_use]
pub fn standard_definitions(currency: &Currency) -> Vec<AddOnDefinition> {
    AddOnType::ALL
        .iter()
        .map(|&add_on_type| {
            let (unit, base_cents, multiplier, range) = standard_pricing(add_on_type);
            AddOnDefinition {
                add_on_type,
                category: add_on_type.category(),
                unit,
                base_price: Money::from_cents(base_cents),
                price_range: range.map(|(lo, hi)| {
                    PriceRange::new(Money::from_cents(lo), Money::from_cents(hi))
                }),
                multiplier: multiplier.map(Multiplier::from_basis_points),
                currency: currency.clone(),
                exclusion_groups: ExclusionGroup::ALL
                    .into_iter()
                    .filter(|g| g.standard_members().contains(&add_on_type))
                    .collect(),
                active: true,
            }
        })
        .collect()
}

type Pricing = (AddOnUnit, u64, Option<u32>, Option<(u64, u64)>);

const fn standard_pricing(add_on_type: AddOnType) -> Pricing {
    use AddOnType as T;
    use AddOnUnit as U;
    match add_on_type {
        T::TravelerSelf => (U::PerPerson, 50_000, None, None),
        // Companions pay 75% of the traveler price
        T::TravelerCompanion => (U::PerPerson, 50_000, Some(7_500), None),
        T::TravelTrain => (U::OneTime, 8_000, None, None),
        T::TravelFlight => (U::OneTime, 45_000, None, Some((30_000, 90_000))),
        T::TravelBus => (U::OneTime, 3_000, None, None),
        T::TravelPrivateCar => (U::PerDay, 6_000, None, None),
        T::AccommodationStandard => (U::PerNight, 9_000, None, None),
        T::AccommodationLuxury => (U::PerNight, 25_000, None, Some((20_000, 60_000))),
        T::AccommodationBudget => (U::PerNight, 4_000, None, None),
        T::VisaAssistance => (U::OneTime, 15_000, None, None),
        T::VisaOnArrival => (U::OneTime, 5_000, None, None),
        T::VisaExpedited => (U::OneTime, 30_000, None, None),
        T::InsuranceMedical => (U::OneTime, 20_000, None, None),
        T::InsuranceTravel => (U::OneTime, 8_000, None, None),
        T::InsuranceCombo => (U::OneTime, 25_000, None, None),
        T::ServiceAirportPickup => (U::OneTime, 4_000, None, None),
        T::ServiceInterpreter => (U::PerHour, 2_500, None, None),
        T::ServiceLocalSim => (U::OneTime, 1_500, None, None),
        T::ServiceCityTour => (U::PerPerson, 6_000, None, None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use medtour_core::AddOnCategory;
    use medtour_testing::InMemoryCatalogStore;

    #[test]
    fn standard_catalog_covers_every_type() {
        let definitions = standard_definitions(&Currency::usd());
        assert_eq!(definitions.len(), AddOnType::ALL.len());

        let luxury = definitions
            .iter()
            .find(|d| d.add_on_type == AddOnType::AccommodationLuxury)
            .unwrap();
        assert_eq!(luxury.exclusion_groups, vec![ExclusionGroup::AccommodationTier]);
        assert_eq!(luxury.category, AddOnCategory::Accommodation);

        let sim = definitions
            .iter()
            .find(|d| d.add_on_type == AddOnType::ServiceLocalSim)
            .unwrap();
        assert!(sim.exclusion_groups.is_empty());
    }

    #[tokio::test]
    async fn unknown_and_inactive_definitions_are_rejected() {
        let mut definitions = standard_definitions(&Currency::usd());
        definitions.retain(|d| d.add_on_type != AddOnType::VisaExpedited);
        for d in &mut definitions {
            if d.add_on_type == AddOnType::ServiceCityTour {
                d.active = false;
            }
        }
        let catalog = AddOnCatalog::new(Arc::new(InMemoryCatalogStore::new(definitions)));

        assert!(matches!(
            catalog.definition(AddOnType::VisaExpedited).await,
            Err(AddOnError::UnknownAddOnType(AddOnType::VisaExpedited))
        ));
        assert!(matches!(
            catalog.definition(AddOnType::ServiceCityTour).await,
            Err(AddOnError::InactiveAddOn(AddOnType::ServiceCityTour))
        ));
        assert_eq!(
            catalog.active_definitions().await.unwrap().len(),
            AddOnType::ALL.len() - 2
        );
    }
}
