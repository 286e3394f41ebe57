//! Identifiers and value objects shared by the booking domain.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for a booking
    BookingId
);
uuid_id!(
    /// Unique identifier for a patient
    PatientId
);
uuid_id!(
    /// Unique identifier for a hospital
    HospitalId
);
uuid_id!(
    /// Unique identifier for a treatment
    TreatmentId
);
uuid_id!(
    /// Unique identifier for a staff member acting as coordinator
    CoordinatorId
);
uuid_id!(
    /// Unique identifier for any user that can act on a booking
    UserId
);
uuid_id!(
    /// Unique identifier for a status history entry
    HistoryEntryId
);
uuid_id!(
    /// Unique identifier for an add-on selection on a booking
    SelectionId
);

// ============================================================================
// Currency
// ============================================================================

/// Error returned for a malformed currency code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid currency code: {0:?} (expected three ASCII letters)")]
pub struct InvalidCurrency(pub String);

/// ISO-4217 style three-letter currency code, stored upper-case.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Currency(String);

impl Currency {
    /// Parses a currency code.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidCurrency`] unless the code is exactly three ASCII letters.
    pub fn new(code: &str) -> Result<Self, InvalidCurrency> {
        if code.len() == 3 && code.bytes().all(|b| b.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_uppercase()))
        } else {
            Err(InvalidCurrency(code.to_string()))
        }
    }

    /// US dollars
    #[must_use]
    pub fn usd() -> Self {
        Self("USD".to_string())
    }

    /// The upper-case code
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Currency {
    type Error = InvalidCurrency;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(&value)
    }
}

impl From<Currency> for String {
    fn from(value: Currency) -> Self {
        value.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Money Value Object (cents-based to avoid floating point errors)
// ============================================================================

/// An amount in minor units (cents). Never negative.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(u64);

impl Money {
    /// Zero
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Creates a `Money` value from whole units with overflow checking
    #[must_use]
    pub const fn checked_from_units(units: u64) -> Option<Self> {
        match units.checked_mul(100) {
            Some(cents) => Some(Self(cents)),
            None => None,
        }
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two money amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Subtracts, clamping at zero
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// Multiplies money by a quantity with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Scales by a multiplier, rounding half-up to the cent
    #[must_use]
    pub fn checked_apply_multiplier(self, multiplier: Multiplier) -> Option<Self> {
        let scaled = u128::from(self.0) * u128::from(multiplier.basis_points());
        let rounded = (scaled + u128::from(Multiplier::ONE_BP / 2)) / u128::from(Multiplier::ONE_BP);
        u64::try_from(rounded).ok().map(Self)
    }

    /// Clamps the amount into `[min, max]`
    #[must_use]
    pub fn clamp_to(self, range: PriceRange) -> Self {
        Self(self.0.clamp(range.min.0, range.max.0.max(range.min.0)))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Inclusive bounds a computed unit price is clamped into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    /// Lowest unit price
    pub min: Money,
    /// Highest unit price
    pub max: Money,
}

impl PriceRange {
    /// Creates a range, swapping the bounds if given in the wrong order
    #[must_use]
    pub fn new(a: Money, b: Money) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }
}

/// Price multiplier in basis points (`10_000` = 1.0x).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Multiplier(u32);

impl Multiplier {
    const ONE_BP: u32 = 10_000;

    /// 1.0x
    pub const IDENTITY: Self = Self(Self::ONE_BP);

    /// Creates a multiplier from basis points
    #[must_use]
    pub const fn from_basis_points(bp: u32) -> Self {
        Self(bp)
    }

    /// The multiplier in basis points
    #[must_use]
    pub const fn basis_points(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for Multiplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:04}x", self.0 / Self::ONE_BP, self.0 % Self::ONE_BP)
    }
}
