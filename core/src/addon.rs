//! Add-on catalog entries and the selections attached to bookings.

use crate::types::{Currency, Money, Multiplier, PriceRange, SelectionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Broad family an add-on belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOnCategory {
    /// Who travels with the patient
    Traveler,
    /// How the patient gets there
    Travel,
    /// Where the patient stays
    Accommodation,
    /// Visa handling
    Visa,
    /// Insurance cover
    Insurance,
    /// Local services
    Service,
}

/// How an add-on's quantity is counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOnUnit {
    /// Charged once
    OneTime,
    /// Charged per night of stay
    PerNight,
    /// Charged per hour
    PerHour,
    /// Charged per day
    PerDay,
    /// Charged per traveler
    PerPerson,
}

/// Groups of add-ons of which at most one may be selected per booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionGroup {
    /// Self-only vs. with-companion
    TravelerCount,
    /// Train vs. flight vs. bus vs. private car
    TravelMode,
    /// Standard vs. luxury vs. budget
    AccommodationTier,
    /// Assistance vs. on-arrival vs. expedited
    VisaPath,
    /// Medical vs. travel vs. combo
    InsurancePlan,
}

impl ExclusionGroup {
    /// Every group
    pub const ALL: [Self; 5] = [
        Self::TravelerCount,
        Self::TravelMode,
        Self::AccommodationTier,
        Self::VisaPath,
        Self::InsurancePlan,
    ];

    /// The add-on types that make up this group in the standard catalog.
    #[must_use]
    pub const fn standard_members(self) -> &'static [AddOnType] {
        use AddOnType::{
            AccommodationBudget, AccommodationLuxury, AccommodationStandard, InsuranceCombo,
            InsuranceMedical, InsuranceTravel, TravelBus, TravelFlight, TravelPrivateCar,
            TravelTrain, TravelerCompanion, TravelerSelf, VisaAssistance, VisaExpedited,
            VisaOnArrival,
        };

        match self {
            Self::TravelerCount => &[TravelerSelf, TravelerCompanion],
            Self::TravelMode => &[TravelTrain, TravelFlight, TravelBus, TravelPrivateCar],
            Self::AccommodationTier => &[
                AccommodationStandard,
                AccommodationLuxury,
                AccommodationBudget,
            ],
            Self::VisaPath => &[VisaAssistance, VisaOnArrival, VisaExpedited],
            Self::InsurancePlan => &[InsuranceMedical, InsuranceTravel, InsuranceCombo],
        }
    }
}

impl fmt::Display for ExclusionGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::TravelerCount => "traveler_count",
            Self::TravelMode => "travel_mode",
            Self::AccommodationTier => "accommodation_tier",
            Self::VisaPath => "visa_path",
            Self::InsurancePlan => "insurance_plan",
        };
        f.write_str(name)
    }
}

/// Error returned when an add-on type name is not recognised.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown add-on type: {0}")]
pub struct UnknownAddOnName(pub String);

/// Every selectable add-on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddOnType {
    /// Patient travels alone
    TravelerSelf,
    /// Patient travels with a companion
    TravelerCompanion,
    /// Train tickets
    TravelTrain,
    /// Flight tickets
    TravelFlight,
    /// Bus tickets
    TravelBus,
    /// Private car transfer
    TravelPrivateCar,
    /// Standard hotel
    AccommodationStandard,
    /// Luxury hotel
    AccommodationLuxury,
    /// Budget stay
    AccommodationBudget,
    /// Visa application assistance
    VisaAssistance,
    /// Visa on arrival
    VisaOnArrival,
    /// Expedited visa processing
    VisaExpedited,
    /// Medical insurance
    InsuranceMedical,
    /// Travel insurance
    InsuranceTravel,
    /// Medical + travel insurance
    InsuranceCombo,
    /// Airport pickup and drop
    ServiceAirportPickup,
    /// Medical interpreter
    ServiceInterpreter,
    /// Local SIM card
    ServiceLocalSim,
    /// Guided city tour
    ServiceCityTour,
}

impl AddOnType {
    /// Every add-on type
    pub const ALL: [Self; 19] = [
        Self::TravelerSelf,
        Self::TravelerCompanion,
        Self::TravelTrain,
        Self::TravelFlight,
        Self::TravelBus,
        Self::TravelPrivateCar,
        Self::AccommodationStandard,
        Self::AccommodationLuxury,
        Self::AccommodationBudget,
        Self::VisaAssistance,
        Self::VisaOnArrival,
        Self::VisaExpedited,
        Self::InsuranceMedical,
        Self::InsuranceTravel,
        Self::InsuranceCombo,
        Self::ServiceAirportPickup,
        Self::ServiceInterpreter,
        Self::ServiceLocalSim,
        Self::ServiceCityTour,
    ];

    /// Category this type belongs to
    #[must_use]
    pub const fn category(self) -> AddOnCategory {
        match self {
            Self::TravelerSelf | Self::TravelerCompanion => AddOnCategory::Traveler,
            Self::TravelTrain | Self::TravelFlight | Self::TravelBus | Self::TravelPrivateCar => {
                AddOnCategory::Travel
            }
            Self::AccommodationStandard | Self::AccommodationLuxury | Self::AccommodationBudget => {
                AddOnCategory::Accommodation
            }
            Self::VisaAssistance | Self::VisaOnArrival | Self::VisaExpedited => AddOnCategory::Visa,
            Self::InsuranceMedical | Self::InsuranceTravel | Self::InsuranceCombo => {
                AddOnCategory::Insurance
            }
            Self::ServiceAirportPickup
            | Self::ServiceInterpreter
            | Self::ServiceLocalSim
            | Self::ServiceCityTour => AddOnCategory::Service,
        }
    }

    /// Wire name used in storage and APIs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TravelerSelf => "traveler_self",
            Self::TravelerCompanion => "traveler_companion",
            Self::TravelTrain => "travel_train",
            Self::TravelFlight => "travel_flight",
            Self::TravelBus => "travel_bus",
            Self::TravelPrivateCar => "travel_private_car",
            Self::AccommodationStandard => "accommodation_standard",
            Self::AccommodationLuxury => "accommodation_luxury",
            Self::AccommodationBudget => "accommodation_budget",
            Self::VisaAssistance => "visa_assistance",
            Self::VisaOnArrival => "visa_on_arrival",
            Self::VisaExpedited => "visa_expedited",
            Self::InsuranceMedical => "insurance_medical",
            Self::InsuranceTravel => "insurance_travel",
            Self::InsuranceCombo => "insurance_combo",
            Self::ServiceAirportPickup => "service_airport_pickup",
            Self::ServiceInterpreter => "service_interpreter",
            Self::ServiceLocalSim => "service_local_sim",
            Self::ServiceCityTour => "service_city_tour",
        }
    }
}

impl fmt::Display for AddOnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AddOnType {
    type Err = UnknownAddOnName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownAddOnName(s.to_string()))
    }
}

/// Catalog entry describing how an add-on is priced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddOnDefinition {
    /// Which add-on this defines
    pub add_on_type: AddOnType,
    /// Family (normally `add_on_type.category()`)
    pub category: AddOnCategory,
    /// Quantity unit
    pub unit: AddOnUnit,
    /// Flat unit price, or the base traveler price when `multiplier` is set
    pub base_price: Money,
    /// Bounds the computed unit price is clamped into
    pub price_range: Option<PriceRange>,
    /// Companion/extra-person multiplier applied to `base_price`
    pub multiplier: Option<Multiplier>,
    /// Currency the prices are in
    pub currency: Currency,
    /// Mutual-exclusion groups this add-on belongs to
    pub exclusion_groups: Vec<ExclusionGroup>,
    /// Whether the add-on can currently be selected
    pub active: bool,
}

/// Lifecycle of one selection on a booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionStatus {
    /// Selected, not yet paid
    Pending,
    /// Paid for
    Confirmed,
    /// Withdrawn
    Cancelled,
    /// Paid and returned
    Refunded,
}

/// A request to select an add-on.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionRequest {
    /// Which add-on
    pub add_on_type: AddOnType,
    /// Nights, hours, days or persons depending on the unit
    pub quantity: u32,
    /// Discount off the line total
    #[serde(default)]
    pub discount: Option<Money>,
}

impl SelectionRequest {
    /// A selection without discount
    #[must_use]
    pub const fn new(add_on_type: AddOnType, quantity: u32) -> Self {
        Self {
            add_on_type,
            quantity,
            discount: None,
        }
    }

    /// Adds a discount
    #[must_use]
    pub const fn with_discount(mut self, discount: Money) -> Self {
        self.discount = Some(discount);
        self
    }
}

/// An add-on attached to a booking, with its price frozen at selection time.
///
/// Invariant: `final_price == total_price - discount`, clamped at zero.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingAddOnSelection {
    /// Selection id
    pub id: SelectionId,
    /// Which add-on
    pub add_on_type: AddOnType,
    /// Quantity charged
    pub quantity: u32,
    /// Unit price snapshot
    pub unit_price: Money,
    /// `unit_price * quantity`
    pub total_price: Money,
    /// Discount applied
    pub discount: Money,
    /// Amount owed for this line
    pub final_price: Money,
    /// Currency of every amount above
    pub currency: Currency,
    /// Selection status
    pub status: SelectionStatus,
    /// When selected
    pub selected_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn every_grouped_type_belongs_to_exactly_one_standard_group() {
        let mut seen = HashSet::new();
        for group in ExclusionGroup::ALL {
            for member in group.standard_members() {
                assert!(seen.insert(*member), "{member} listed twice");
            }
        }
        for t in AddOnType::ALL {
            let grouped = seen.contains(&t);
            assert_eq!(grouped, t.category() != AddOnCategory::Service, "{t}");
        }
    }

    #[test]
    fn group_members_share_a_category() {
        for group in ExclusionGroup::ALL {
            let categories: HashSet<_> =
                group.standard_members().iter().map(|t| t.category()).collect();
            assert_eq!(categories.len(), 1, "{group}");
        }
    }

    #[test]
    fn names_parse_back() {
        for t in AddOnType::ALL {
            assert_eq!(t.as_str().parse::<AddOnType>(), Ok(t));
        }
        assert!("spa_day".parse::<AddOnType>().is_err());
    }
}
