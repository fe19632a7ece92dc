//! Laundry utility calculator
//!
//! Estimates electricity, water and gas usage and cost for a cart of
//! industrial laundry machines (washers, dryers, ironers).

pub mod calculator;
pub mod db;
pub mod error;
pub mod export;
pub mod import;
pub mod models;
pub mod numeric;
pub mod rates;

pub use calculator::{aggregate, compute_usage, per_item, per_load};
pub use error::StoreError;
pub use models::{CartItem, Machine, MachineFamily, Tariff, UsageResult, UtilityKind};
pub use rates::{CategoryRates, RateKey, applicable_utilities, resolve_rate_key};
