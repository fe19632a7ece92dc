//! Rate keys and per-category tariff tables
//!
//! Each raw category label gets its own tariff record, so two washer models
//! filed under different category labels are priced independently. The key
//! is a structured `(family, label)` pair. The textual form
//! (`washer_<label>`, `dryer_<label>`, `ironers_<label>`, or the bare label)
//! only appears at the edges: CLI arguments and JSON rate files.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::models::{Machine, MachineFamily, Tariff, UtilityKind};
use crate::numeric::clamp_rate;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RateKey {
    pub family: MachineFamily,
    pub label: String,
}

impl RateKey {
    pub fn for_category(category: &str) -> Self {
        RateKey {
            family: MachineFamily::classify(category),
            label: category.to_string(),
        }
    }

    pub fn for_machine(machine: &Machine) -> Self {
        RateKey {
            family: machine.family,
            label: machine.category.clone(),
        }
    }
}

impl fmt::Display for RateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.family.key_prefix(), self.label)
    }
}

impl FromStr for RateKey {
    type Err = StoreError;

    /// Parse the textual form. Only strings that `resolve_rate_key` could
    /// have produced are accepted, so parsing and printing round-trip.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        for family in [MachineFamily::Washer, MachineFamily::Dryer, MachineFamily::Ironer] {
            if let Some(label) = s.strip_prefix(family.key_prefix()) {
                if MachineFamily::classify(label) == family {
                    return Ok(RateKey {
                        family,
                        label: label.to_string(),
                    });
                }
            }
        }

        if MachineFamily::classify(s) == MachineFamily::Other {
            Ok(RateKey {
                family: MachineFamily::Other,
                label: s.to_string(),
            })
        } else {
            Err(StoreError::InvalidRateKey(s.to_string()))
        }
    }
}

impl TryFrom<String> for RateKey {
    type Error = StoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<RateKey> for String {
    fn from(key: RateKey) -> Self {
        key.to_string()
    }
}

/// Resolve the rate key for a raw category label
pub fn resolve_rate_key(category: &str) -> RateKey {
    RateKey::for_category(category)
}

/// Utilities a user is asked to price for a category. Unrecognized
/// categories get all four so nothing is silently dropped.
pub fn applicable_utilities(category: &str) -> BTreeSet<UtilityKind> {
    MachineFamily::classify(category)
        .applicable_utilities()
        .iter()
        .copied()
        .collect()
}

/// Tariff table for a cart, keyed by rate key
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CategoryRates {
    rates: HashMap<RateKey, Tariff>,
}

impl CategoryRates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tariff for a key, all zero when the key has no entry
    pub fn get(&self, key: &RateKey) -> Tariff {
        self.rates.get(key).copied().unwrap_or_default()
    }

    pub fn for_category(&self, category: &str) -> Tariff {
        self.get(&resolve_rate_key(category))
    }

    pub fn insert(&mut self, key: RateKey, tariff: Tariff) {
        self.rates.insert(key, tariff);
    }

    /// Set one utility rate, clamping negatives and non-finite input to 0
    pub fn set(&mut self, key: RateKey, utility: UtilityKind, value: f64) {
        self.rates.entry(key).or_default().set(utility, clamp_rate(value));
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Entries ordered by key, for stable display and storage
    pub fn entries(&self) -> Vec<(&RateKey, &Tariff)> {
        let mut entries: Vec<_> = self.rates.iter().collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }
}

impl FromIterator<(RateKey, Tariff)> for CategoryRates {
    fn from_iter<I: IntoIterator<Item = (RateKey, Tariff)>>(iter: I) -> Self {
        CategoryRates {
            rates: iter.into_iter().collect(),
        }
    }
}
