//! Print-shop commerce backend
//!
//! Order, discount, store-credit and fulfillment service for a custom sticker
//! shop, with Stripe checkout and EasyPost shipping behind narrow gateway traits.
//!
//! ## Features
//! - Discount code management and eligibility checks
//! - Store credits ledger
//! - Cart checkout with partial-failure reporting
//! - Design proofs and order lifecycle
//! - Shipment rating, label purchase and tracking webhooks
//! - Sticker pricing calculator
//! - Product reviews

use thiserror::Error;

pub mod api;
pub mod bus;
pub mod checkout;
pub mod config;
pub mod credits;
pub mod discounts;
pub mod domain;
pub mod notify;
pub mod orders;
pub mod payments;
pub mod pricing;
pub mod reviews;
pub mod shipping;
pub mod store;

#[cfg(test)]
pub(crate) mod test_utils;

// =============================================================================
// Error Types
// =============================================================================

/// Single error channel for every service operation.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// A vendor client or secret is missing from the environment.
    #[error("{0} is not configured")]
    NotConfigured(&'static str),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    ValidationFailed(String),

    /// Database or vendor API failure.
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),
}

impl ServiceError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotConfigured(_) => "not_configured",
            Self::NotFound(_) => "not_found",
            Self::ValidationFailed(_) => "validation_failed",
            Self::UpstreamFailure(_) => "upstream_failure",
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::ValidationFailed(message.into())
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound("record".to_string()),
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                Self::ValidationFailed("duplicate record".to_string())
            }
            _ => Self::UpstreamFailure(format!("database: {err}")),
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        Self::UpstreamFailure(format!("http: {err}"))
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        Self::ValidationFailed(format!("invalid JSON: {err}"))
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        Self::ValidationFailed(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
