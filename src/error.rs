//! Error types for the catalog and cart store

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cart {0} not found")]
    CartNotFound(i64),

    #[error("machine '{0}' not found in catalog")]
    MachineNotFound(String),

    #[error("machine '{machine}' is not in cart {cart}")]
    NotInCart { cart: i64, machine: String },

    #[error("invalid rate key '{0}'")]
    InvalidRateKey(String),

    #[error("unknown utility '{0}' (expected electricity, waterCold, waterHot or gas)")]
    InvalidUtility(String),

    #[error("unknown machine family '{0}' (expected washer, dryer, ironer or other)")]
    InvalidFamily(String),

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;
