//! Cart Aggregate

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::value_objects::round_cents;

/// Submitted cart. Carts live in the browser; the server only prices them.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Cart {
    items: Vec<CartItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: String,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
    /// Size, finish and surcharge choices made in the pricing calculator.
    #[serde(default)]
    pub calculator_selections: serde_json::Value,
    #[serde(default)]
    pub custom_files: Vec<String>,
}

impl CartItem {
    pub fn line_total(&self) -> Result<Decimal, CartError> { line_amount(self.unit_price, self.quantity) }
}

fn line_amount(unit_price: Decimal, quantity: u32) -> Result<Decimal, CartError> {
    unit_price.checked_mul(Decimal::from(quantity)).map(round_cents).ok_or(CartError::TooLarge)
}

impl Cart {
    pub fn new() -> Self { Self::default() }

    pub fn from_items(items: Vec<CartItem>) -> Result<Self, CartError> {
        let mut cart = Self::new();
        for item in items { cart.add_item(item)?; }
        Ok(cart)
    }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }

    pub fn subtotal(&self) -> Result<Decimal, CartError> {
        self.items.iter().try_fold(Decimal::ZERO, |sum, item| sum.checked_add(item.line_total()?).ok_or(CartError::TooLarge))
    }

    /// Adds an item, merging with an identical configuration of the same product.
    pub fn add_item(&mut self, item: CartItem) -> Result<(), CartError> {
        if item.quantity == 0 { return Err(CartError::InvalidQuantity); }
        if item.unit_price.is_sign_negative() { return Err(CartError::NegativePrice); }
        self.subtotal()?.checked_add(item.line_total()?).ok_or(CartError::TooLarge)?;
        if let Some(existing) = self.items.iter_mut().find(|i| {
            i.product_id == item.product_id && i.calculator_selections == item.calculator_selections && i.unit_price == item.unit_price
        }) {
            let quantity = existing.quantity.checked_add(item.quantity).ok_or(CartError::TooLarge)?;
            line_amount(existing.unit_price, quantity)?;
            existing.quantity = quantity;
            existing.custom_files.extend(item.custom_files);
        } else {
            self.items.push(item);
        }
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: &str) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ItemNotFound, InvalidQuantity, NegativePrice, TooLarge }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ItemNotFound => write!(f, "Item not found"),
            Self::InvalidQuantity => write!(f, "Quantity must be at least 1"),
            Self::NegativePrice => write!(f, "Price must not be negative"),
            Self::TooLarge => write!(f, "Cart quantity or amount is too large"),
        }
    }
}

impl From<CartError> for crate::ServiceError {
    fn from(err: CartError) -> Self { crate::ServiceError::ValidationFailed(err.to_string()) }
}
