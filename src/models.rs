//! Data models for laundry machines, carts and utility usage

use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::numeric::lenient_f64;
use crate::rates::CategoryRates;

/// Machine family, classified once from the free-text category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineFamily {
    Washer,
    Dryer,
    Ironer,
    Other,
}

impl MachineFamily {
    /// Case-insensitive substring match, checked washer, dryer, ironer in order.
    /// "IRONER" also matches "IRONERS".
    pub fn classify(category: &str) -> Self {
        let upper = category.to_uppercase();
        if upper.contains("WASHER") {
            MachineFamily::Washer
        } else if upper.contains("DRYER") {
            MachineFamily::Dryer
        } else if upper.contains("IRONER") {
            MachineFamily::Ironer
        } else {
            MachineFamily::Other
        }
    }

    /// Prefix used by the textual rate key form
    pub fn key_prefix(self) -> &'static str {
        match self {
            MachineFamily::Washer => "washer_",
            MachineFamily::Dryer => "dryer_",
            MachineFamily::Ironer => "ironers_",
            MachineFamily::Other => "",
        }
    }

    /// Utilities a user can price for this family
    pub fn applicable_utilities(self) -> &'static [UtilityKind] {
        match self {
            MachineFamily::Washer => &[
                UtilityKind::Electricity,
                UtilityKind::WaterCold,
                UtilityKind::WaterHot,
            ],
            MachineFamily::Dryer | MachineFamily::Ironer => {
                &[UtilityKind::Electricity, UtilityKind::Gas]
            }
            MachineFamily::Other => &UtilityKind::ALL,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MachineFamily::Washer => "washer",
            MachineFamily::Dryer => "dryer",
            MachineFamily::Ironer => "ironer",
            MachineFamily::Other => "other",
        }
    }
}

impl fmt::Display for MachineFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MachineFamily {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "washer" | "washers" => Ok(MachineFamily::Washer),
            "dryer" | "dryers" => Ok(MachineFamily::Dryer),
            "ironer" | "ironers" => Ok(MachineFamily::Ironer),
            "other" => Ok(MachineFamily::Other),
            _ => Err(StoreError::InvalidFamily(s.to_string())),
        }
    }
}

/// A priced utility dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum UtilityKind {
    Electricity,
    WaterCold,
    WaterHot,
    Gas,
}

impl UtilityKind {
    pub const ALL: [UtilityKind; 4] = [
        UtilityKind::Electricity,
        UtilityKind::WaterCold,
        UtilityKind::WaterHot,
        UtilityKind::Gas,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UtilityKind::Electricity => "electricity",
            UtilityKind::WaterCold => "waterCold",
            UtilityKind::WaterHot => "waterHot",
            UtilityKind::Gas => "gas",
        }
    }

    /// Human label including the billing unit
    pub fn label(self) -> &'static str {
        match self {
            UtilityKind::Electricity => "Electricity (per kWh)",
            UtilityKind::WaterCold => "Cold Water (per m³)",
            UtilityKind::WaterHot => "Hot Water (per m³)",
            UtilityKind::Gas => "Gas (per kg)",
        }
    }
}

impl fmt::Display for UtilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UtilityKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "electricity" | "elec" => Ok(UtilityKind::Electricity),
            "watercold" | "coldwater" | "cold" => Ok(UtilityKind::WaterCold),
            "waterhot" | "hotwater" | "hot" => Ok(UtilityKind::WaterHot),
            "gas" => Ok(UtilityKind::Gas),
            _ => Err(StoreError::InvalidUtility(s.to_string())),
        }
    }
}

/// A catalog machine with the nameplate figures the calculator needs
#[derive(Debug, Clone, PartialEq)]
pub struct Machine {
    pub id: String,
    pub model: String,
    pub category: String,
    pub family: MachineFamily,
    pub capacity: Option<String>,
    pub total_load_kw: f64,
    pub gas_btu: f64,      // BTU/h
    pub cold_water_l: f64, // liters per load
    pub hot_water_l: f64,  // liters per load
    pub exhaust_m3h: f64,
}

impl Machine {
    pub fn new(id: impl Into<String>, model: impl Into<String>, category: impl Into<String>) -> Self {
        let category = category.into();
        Machine {
            id: id.into(),
            model: model.into(),
            family: MachineFamily::classify(&category),
            category,
            capacity: None,
            total_load_kw: 0.0,
            gas_btu: 0.0,
            cold_water_l: 0.0,
            hot_water_l: 0.0,
            exhaust_m3h: 0.0,
        }
    }

    pub fn with_load(mut self, kw: f64) -> Self {
        self.total_load_kw = kw;
        self
    }

    pub fn with_gas_btu(mut self, btu: f64) -> Self {
        self.gas_btu = btu;
        self
    }

    pub fn with_water(mut self, cold_l: f64, hot_l: f64) -> Self {
        self.cold_water_l = cold_l;
        self.hot_water_l = hot_l;
        self
    }

    pub fn with_exhaust(mut self, m3h: f64) -> Self {
        self.exhaust_m3h = m3h;
        self
    }

    pub fn with_capacity(mut self, capacity: impl Into<String>) -> Self {
        self.capacity = Some(capacity.into());
        self
    }

    /// Model name, or the category when the model is blank
    pub fn display_name(&self) -> &str {
        if self.model.trim().is_empty() {
            &self.category
        } else {
            &self.model
        }
    }
}

/// A machine placed in a cart
#[derive(Debug, Clone, PartialEq)]
pub struct CartItem {
    pub machine: Machine,
    pub quantity: u32,
}

impl CartItem {
    pub fn new(machine: Machine, quantity: u32) -> Self {
        CartItem { machine, quantity }
    }
}

/// A stored cart with everything needed to run an estimate
#[derive(Debug, Clone)]
pub struct Cart {
    pub id: i64,
    pub created_at: String,
    pub hours: f64,
    pub items: Vec<CartItem>,
    pub rates: CategoryRates,
    pub totals: Option<UsageResult>,
}

/// Tariffs for one rate key. Missing entries are 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tariff {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub electricity: f64, // per kWh
    #[serde(default, deserialize_with = "lenient_f64")]
    pub water_cold: f64, // per m³
    #[serde(default, deserialize_with = "lenient_f64")]
    pub water_hot: f64, // per m³
    #[serde(default, deserialize_with = "lenient_f64")]
    pub gas: f64, // per kg
}

impl Tariff {
    pub fn rate(&self, utility: UtilityKind) -> f64 {
        match utility {
            UtilityKind::Electricity => self.electricity,
            UtilityKind::WaterCold => self.water_cold,
            UtilityKind::WaterHot => self.water_hot,
            UtilityKind::Gas => self.gas,
        }
    }

    pub fn set(&mut self, utility: UtilityKind, value: f64) {
        let slot = match utility {
            UtilityKind::Electricity => &mut self.electricity,
            UtilityKind::WaterCold => &mut self.water_cold,
            UtilityKind::WaterHot => &mut self.water_hot,
            UtilityKind::Gas => &mut self.gas,
        };
        *slot = value;
    }
}

/// Usage and cost figures for one machine line or a whole cart.
///
/// Monetary fields are in the tariff currency. Raw fields are physical units:
/// kWh for electricity, m³ for water, kg for gas. The three raw gas fields are
/// disjoint by source so they can be summed without double counting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UsageResult {
    pub electricity: f64,
    pub water_cold: f64,
    pub water_hot: f64,
    pub gas: f64,
    pub raw_electricity: f64,
    pub raw_cold_water: f64,
    pub raw_hot_water: f64,
    pub raw_gas_hot_water: f64,
    pub raw_gas_dryer: f64,
    pub raw_gas_ironer: f64,
}

impl UsageResult {
    /// Sum of the four monetary fields
    pub fn grand_total(&self) -> f64 {
        self.electricity + self.water_cold + self.water_hot + self.gas
    }

    pub fn raw_gas_total(&self) -> f64 {
        self.raw_gas_hot_water + self.raw_gas_dryer + self.raw_gas_ironer
    }

    pub fn cost(&self, utility: UtilityKind) -> f64 {
        match utility {
            UtilityKind::Electricity => self.electricity,
            UtilityKind::WaterCold => self.water_cold,
            UtilityKind::WaterHot => self.water_hot,
            UtilityKind::Gas => self.gas,
        }
    }
}

impl AddAssign for UsageResult {
    fn add_assign(&mut self, rhs: Self) {
        self.electricity += rhs.electricity;
        self.water_cold += rhs.water_cold;
        self.water_hot += rhs.water_hot;
        self.gas += rhs.gas;
        self.raw_electricity += rhs.raw_electricity;
        self.raw_cold_water += rhs.raw_cold_water;
        self.raw_hot_water += rhs.raw_hot_water;
        self.raw_gas_hot_water += rhs.raw_gas_hot_water;
        self.raw_gas_dryer += rhs.raw_gas_dryer;
        self.raw_gas_ironer += rhs.raw_gas_ironer;
    }
}

impl Add for UsageResult {
    type Output = UsageResult;

    fn add(mut self, rhs: Self) -> Self::Output {
        self += rhs;
        self
    }
}

impl Sum for UsageResult {
    fn sum<I: Iterator<Item = UsageResult>>(iter: I) -> Self {
        iter.fold(UsageResult::default(), Add::add)
    }
}
