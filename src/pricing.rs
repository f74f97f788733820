//! Sticker pricing calculator.
//!
//! A quote is a two-level table lookup: a per-square-inch rate by size
//! (linearly interpolated by area for custom sizes) and a multiplier by
//! quantity tier, plus optional rush and vibrancy surcharges.

use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::Path;
use thiserror::Error;

use crate::domain::aggregates::CartItem;
use crate::domain::value_objects::round_cents;

/// Rush production surcharge, as a fraction of the base price.
pub const RUSH_SURCHARGE: Decimal = Decimal::from_parts(40, 0, 0, false, 2);
/// Vibrancy boost surcharge, as a fraction of the base price.
pub const VIBRANCY_SURCHARGE: Decimal = Decimal::from_parts(5, 0, 0, false, 2);

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeRate { pub label: String, pub width: Decimal, pub height: Decimal, pub price_per_sq_in: Decimal }

impl SizeRate {
    /// Saturates instead of overflowing so oversized entries fail validation.
    pub fn area(&self) -> Decimal { self.width.checked_mul(self.height).unwrap_or(Decimal::MAX) }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantityTier { pub min_quantity: u32, pub multiplier: Decimal }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceTable { pub sizes: Vec<SizeRate>, pub quantity_tiers: Vec<QuantityTier> }

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PricingError {
    #[error("Price table has no sizes")]
    NoSizes,
    #[error("Price table has no quantity tiers")]
    NoTiers,
    #[error("Price table entry '{0}' is invalid")]
    InvalidEntry(String),
    #[error("Width and height must be positive")]
    InvalidDimensions,
    #[error("Minimum order quantity is {minimum}")]
    QuantityBelowMinimum { minimum: u32 },
    #[error("Requested size and quantity are too large to price")]
    OutOfRange,
}

impl From<PricingError> for crate::ServiceError {
    fn from(err: PricingError) -> Self { crate::ServiceError::ValidationFailed(err.to_string()) }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteRequest {
    pub width: Decimal,
    pub height: Decimal,
    pub quantity: u32,
    #[serde(default)]
    pub rush: bool,
    #[serde(default)]
    pub vibrancy: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quote {
    pub width: Decimal,
    pub height: Decimal,
    pub quantity: u32,
    pub rush: bool,
    pub vibrancy: bool,
    pub area: Decimal,
    pub price_per_sq_in: Decimal,
    pub multiplier: Decimal,
    pub base_price: Decimal,
    pub rush_fee: Decimal,
    pub vibrancy_fee: Decimal,
    pub total: Decimal,
    pub unit_price: Decimal,
}

impl Quote {
    /// Cart line for this quote; the selections travel with the order item.
    pub fn to_cart_item(&self, product_id: impl Into<String>, product_name: impl Into<String>) -> CartItem {
        CartItem {
            product_id: product_id.into(),
            product_name: product_name.into(),
            quantity: self.quantity,
            unit_price: self.unit_price,
            calculator_selections: json!({
                "width": self.width,
                "height": self.height,
                "area": self.area,
                "quantity": self.quantity,
                "rush": self.rush,
                "vibrancy": self.vibrancy,
                "total": self.total,
            }),
            custom_files: vec![],
        }
    }
}

impl Default for PriceTable {
    fn default() -> Self {
        let size = |inches: i64, cents_per_sq_in: i64| SizeRate {
            label: format!("{inches}\" x {inches}\""),
            width: Decimal::from(inches),
            height: Decimal::from(inches),
            price_per_sq_in: Decimal::new(cents_per_sq_in, 2),
        };
        let tier = |min_quantity: u32, hundredths: i64| QuantityTier { min_quantity, multiplier: Decimal::new(hundredths, 2) };
        Self {
            sizes: vec![size(2, 30), size(3, 22), size(4, 17), size(5, 14), size(6, 12)],
            quantity_tiers: vec![tier(1, 100), tier(50, 85), tier(100, 70), tier(250, 60), tier(500, 50), tier(1000, 42)],
        }
    }
}

impl PriceTable {
    /// Loads a JSON table from disk.
    pub fn from_path(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading price table {}", path.display()))?;
        let table: Self = serde_json::from_str(&raw).with_context(|| format!("parsing price table {}", path.display()))?;
        table.validate().with_context(|| format!("checking price table {}", path.display()))?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<(), PricingError> {
        if self.sizes.is_empty() { return Err(PricingError::NoSizes); }
        if self.quantity_tiers.is_empty() { return Err(PricingError::NoTiers); }
        if let Some(bad) = self.sizes.iter().find(|s| s.area() <= Decimal::ZERO || s.area() == Decimal::MAX || s.price_per_sq_in.is_sign_negative()) {
            return Err(PricingError::InvalidEntry(bad.label.clone()));
        }
        if let Some(bad) = self.quantity_tiers.iter().find(|t| t.multiplier <= Decimal::ZERO) {
            return Err(PricingError::InvalidEntry(format!("{}+", bad.min_quantity)));
        }
        Ok(())
    }

    /// Rate for an area: exact match, else interpolated between the two
    /// nearest sizes, clamped to the smallest or largest size outside the table.
    pub fn rate_for_area(&self, area: Decimal) -> Result<Decimal, PricingError> {
        let mut sizes: Vec<(Decimal, Decimal)> = self.sizes.iter().map(|s| (s.area(), s.price_per_sq_in)).collect();
        sizes.sort_by(|a, b| a.0.cmp(&b.0));
        let (first, last) = match (sizes.first(), sizes.last()) {
            (Some(first), Some(last)) => (*first, *last),
            _ => return Err(PricingError::NoSizes),
        };
        if area <= first.0 { return Ok(first.1); }
        if area >= last.0 { return Ok(last.1); }
        for pair in sizes.windows(2) {
            let ((lo_area, lo_rate), (hi_area, hi_rate)) = (pair[0], pair[1]);
            if area == lo_area { return Ok(lo_rate); }
            if area > lo_area && area < hi_area {
                return Ok(lo_rate + (hi_rate - lo_rate) * (area - lo_area) / (hi_area - lo_area));
            }
        }
        Ok(last.1)
    }

    /// Multiplier of the largest tier not above `quantity`.
    pub fn multiplier_for(&self, quantity: u32) -> Result<Decimal, PricingError> {
        self.quantity_tiers.iter()
            .filter(|t| t.min_quantity <= quantity)
            .max_by_key(|t| t.min_quantity)
            .map(|t| t.multiplier)
            .ok_or_else(|| PricingError::QuantityBelowMinimum {
                minimum: self.quantity_tiers.iter().map(|t| t.min_quantity).min().unwrap_or(1),
            })
    }

    pub fn quote(&self, request: &QuoteRequest) -> Result<Quote, PricingError> {
        if request.width <= Decimal::ZERO || request.height <= Decimal::ZERO {
            return Err(PricingError::InvalidDimensions);
        }
        if request.quantity == 0 {
            return Err(PricingError::QuantityBelowMinimum { minimum: 1 });
        }
        let area = request.width.checked_mul(request.height).ok_or(PricingError::OutOfRange)?;
        let rate = self.rate_for_area(area)?;
        let multiplier = self.multiplier_for(request.quantity)?;
        let quantity = Decimal::from(request.quantity);

        let base_price = area.checked_mul(rate)
            .and_then(|p| p.checked_mul(quantity))
            .and_then(|p| p.checked_mul(multiplier))
            .map(round_cents)
            .ok_or(PricingError::OutOfRange)?;
        let surcharge = |enabled: bool, fraction: Decimal| -> Result<Decimal, PricingError> {
            if !enabled { return Ok(Decimal::ZERO); }
            base_price.checked_mul(fraction).map(round_cents).ok_or(PricingError::OutOfRange)
        };
        let rush_fee = surcharge(request.rush, RUSH_SURCHARGE)?;
        let vibrancy_fee = surcharge(request.vibrancy, VIBRANCY_SURCHARGE)?;
        let total = base_price.checked_add(rush_fee)
            .and_then(|t| t.checked_add(vibrancy_fee))
            .ok_or(PricingError::OutOfRange)?;

        Ok(Quote {
            width: request.width,
            height: request.height,
            quantity: request.quantity,
            rush: request.rush,
            vibrancy: request.vibrancy,
            area,
            price_per_sq_in: rate.round_dp(4),
            multiplier,
            base_price,
            rush_fee,
            vibrancy_fee,
            total,
            unit_price: round_cents(total / quantity),
        })
    }
}
