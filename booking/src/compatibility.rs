//! Mutual-exclusion checks over add-on selections.
//!
//! Groups are keyed by [`ExclusionGroup`], so a misspelt group or type name is
//! a compile error rather than a silently ignored rule.

use crate::metrics;
use medtour_core::{AddOnDefinition, AddOnError, AddOnType, ExclusionGroup};
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::{BTreeMap, BTreeSet};

/// Two selections that may not be combined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conflict {
    /// Earlier selection
    pub first: AddOnType,
    /// Later selection
    pub second: AddOnType,
    /// Group both belong to
    pub group: ExclusionGroup,
}

impl From<Conflict> for AddOnError {
    fn from(c: Conflict) -> Self {
        Self::ConflictingAddOns {
            first: c.first,
            second: c.second,
            group: c.group,
        }
    }
}

/// Result of checking a selection without failing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompatibilityReport {
    /// Whether the selection may be applied
    pub valid: bool,
    /// The first conflict, in selection order
    pub conflicting: Option<Conflict>,
}

/// Validates selections against mutual-exclusion groups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AddOnCompatibilityChecker {
    groups: BTreeMap<ExclusionGroup, BTreeSet<AddOnType>>,
}

impl Default for AddOnCompatibilityChecker {
    fn default() -> Self {
        Self::standard()
    }
}

impl AddOnCompatibilityChecker {
    /// The five standard groups.
    #[must_use]
    pub fn standard() -> Self {
        let groups = ExclusionGroup::ALL
            .into_iter()
            .map(|g| (g, g.standard_members().iter().copied().collect()))
            .collect();
        Self { groups }
    }

    /// Groups taken from catalog definitions.
    #[must_use]
    pub fn from_definitions<'a>(definitions: impl IntoIterator<Item = &'a AddOnDefinition>) -> Self {
        let mut groups: BTreeMap<ExclusionGroup, BTreeSet<AddOnType>> = BTreeMap::new();
        for definition in definitions {
            for group in &definition.exclusion_groups {
                groups.entry(*group).or_default().insert(definition.add_on_type);
            }
        }
        Self { groups }
    }

    /// The first group containing both types, if any.
    ///
    /// Symmetric in `a` and `b`. A grouped type conflicts with itself.
    #[must_use]
    pub fn shared_group(&self, a: AddOnType, b: AddOnType) -> Option<ExclusionGroup> {
        self.groups
            .iter()
            .find(|(_, members)| members.contains(&a) && members.contains(&b))
            .map(|(group, _)| *group)
    }

    /// The first conflicting pair in selection order.
    ///
    /// Pairs are visited `(0,1), (0,2), ..., (1,2), ...`, so the reported pair
    /// is the one whose earlier member comes first.
    #[must_use]
    pub fn first_conflict(&self, selected: &[AddOnType]) -> Option<Conflict> {
        // Only grouped types can conflict
        let grouped: SmallVec<[AddOnType; 16]> = selected
            .iter()
            .copied()
            .filter(|t| self.groups.values().any(|m| m.contains(t)))
            .collect();

        for (i, &first) in grouped.iter().enumerate() {
            for &second in &grouped[i + 1..] {
                if let Some(group) = self.shared_group(first, second) {
                    return Some(Conflict {
                        first,
                        second,
                        group,
                    });
                }
            }
        }
        None
    }

    /// Fail on the first conflicting pair.
    ///
    /// # Errors
    ///
    /// Returns [`AddOnError::ConflictingAddOns`] naming both types.
    pub fn validate_selection(&self, selected: &[AddOnType]) -> Result<(), AddOnError> {
        match self.first_conflict(selected) {
            None => Ok(()),
            Some(conflict) => {
                metrics::record_addon_conflict();
                tracing::debug!(
                    first = %conflict.first,
                    second = %conflict.second,
                    group = %conflict.group,
                    "Incompatible add-on selection"
                );
                Err(conflict.into())
            }
        }
    }

    /// Check without failing.
    #[must_use]
    pub fn check(&self, selected: &[AddOnType]) -> CompatibilityReport {
        let conflicting = self.first_conflict(selected);
        CompatibilityReport {
            valid: conflicting.is_none(),
            conflicting,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::catalog::standard_definitions;
    use medtour_core::Currency;
    use medtour_testing::properties::any_add_on_type;
    use proptest::prelude::*;

    #[test]
    fn same_tier_accommodations_conflict() {
        let checker = AddOnCompatibilityChecker::standard();
        let err = checker
            .validate_selection(&[AddOnType::AccommodationLuxury, AddOnType::AccommodationBudget])
            .unwrap_err();
        assert!(matches!(
            err,
            AddOnError::ConflictingAddOns {
                first: AddOnType::AccommodationLuxury,
                second: AddOnType::AccommodationBudget,
                group: ExclusionGroup::AccommodationTier,
            }
        ));
    }

    #[test]
    fn different_groups_combine() {
        let checker = AddOnCompatibilityChecker::standard();
        assert!(
            checker
                .validate_selection(&[AddOnType::AccommodationLuxury, AddOnType::VisaAssistance])
                .is_ok()
        );
    }

    #[test]
    fn first_conflict_follows_selection_order() {
        let checker = AddOnCompatibilityChecker::standard();
        let report = checker.check(&[
            AddOnType::TravelFlight,
            AddOnType::InsuranceMedical,
            AddOnType::InsuranceCombo,
            AddOnType::TravelBus,
        ]);
        assert!(!report.valid);
        assert_eq!(
            report.conflicting,
            Some(Conflict {
                first: AddOnType::TravelFlight,
                second: AddOnType::TravelBus,
                group: ExclusionGroup::TravelMode,
            })
        );
    }

    #[test]
    fn duplicate_grouped_type_conflicts_but_services_repeat() {
        let checker = AddOnCompatibilityChecker::standard();
        assert!(!checker.check(&[AddOnType::VisaOnArrival, AddOnType::VisaOnArrival]).valid);
        assert!(checker.check(&[AddOnType::ServiceInterpreter, AddOnType::ServiceInterpreter]).valid);
        assert!(checker.check(&[]).valid);
    }

    #[test]
    fn catalog_groups_match_standard_groups() {
        let definitions = standard_definitions(&Currency::usd());
        assert_eq!(
            AddOnCompatibilityChecker::from_definitions(&definitions),
            AddOnCompatibilityChecker::standard()
        );
    }

    proptest! {
        #[test]
        fn shared_group_is_symmetric(a in any_add_on_type(), b in any_add_on_type()) {
            let checker = AddOnCompatibilityChecker::standard();
            prop_assert_eq!(checker.shared_group(a, b), checker.shared_group(b, a));
        }

        #[test]
        fn conflicts_iff_some_pair_shares_a_group(selected in prop::collection::vec(any_add_on_type(), 0..8)) {
            let checker = AddOnCompatibilityChecker::standard();
            let any_pair = selected.iter().enumerate().any(|(i, a)| {
                selected[i + 1..].iter().any(|b| checker.shared_group(*a, *b).is_some())
            });
            prop_assert_eq!(checker.check(&selected).valid, !any_pair);
        }
    }
}
