//! Value Objects for the print shop

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Declares a fieldless enum stored as text, with `as_str`, `FromStr` and
/// serde names all driven by the same literal.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self { $(Self::$variant => $text),+ }
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::domain::value_objects::UnknownVariant;
            fn from_str(s: &str) -> ::std::result::Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err($crate::domain::value_objects::UnknownVariant {
                        kind: stringify!($name),
                        value: other.to_string(),
                    }),
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}
pub(crate) use text_enum;

/// A stored status string that matches no known variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant { pub kind: &'static str, pub value: String }
impl std::error::Error for UnknownVariant {}
impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "unknown {} '{}'", self.kind, self.value) }
}

/// Discount code value object: trimmed, upper-cased, `[A-Z0-9_-]{1,32}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PromoCode(String);

impl PromoCode {
    pub fn new(value: impl AsRef<str>) -> Result<Self, PromoCodeError> {
        let value = value.as_ref().trim().to_uppercase();
        if value.is_empty() { return Err(PromoCodeError::Empty); }
        if value.len() > 32 { return Err(PromoCodeError::TooLong); }
        if !value.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(PromoCodeError::InvalidCharacter);
        }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
    pub fn into_inner(self) -> String { self.0 }
}

impl fmt::Display for PromoCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum PromoCodeError { Empty, TooLong, InvalidCharacter }
impl std::error::Error for PromoCodeError {}
impl fmt::Display for PromoCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => write!(f, "Discount code is empty"),
            Self::TooLong => write!(f, "Discount code is longer than 32 characters"),
            Self::InvalidCharacter => write!(f, "Discount code may only contain letters, digits, '-' and '_'"),
        }
    }
}

impl From<PromoCodeError> for crate::ServiceError {
    fn from(err: PromoCodeError) -> Self { crate::ServiceError::ValidationFailed(err.to_string()) }
}

/// Rounds a dollar amount to whole cents, half away from zero.
pub fn round_cents(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// Dollar amount to integer cents, as the payment processor expects.
pub fn to_cents(amount: Decimal) -> Option<i64> {
    (round_cents(amount) * Decimal::ONE_HUNDRED).to_i64()
}

/// Renders a dollar amount with two decimals.
pub fn format_dollars(amount: Decimal) -> String {
    let mut value = round_cents(amount);
    value.rescale(2);
    value.to_string()
}

/// Parses an admin-entered amount such as `"5"`, `"$5.50"` or `" 12.5 "`.
pub fn parse_amount(raw: &str) -> Result<Decimal, AmountError> {
    let cleaned = raw.trim().trim_start_matches('$').replace(',', "");
    let value = Decimal::from_str(&cleaned).map_err(|_| AmountError::NotANumber(raw.to_string()))?;
    if value.is_sign_negative() { return Err(AmountError::Negative); }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum AmountError { NotANumber(String), Negative }
impl std::error::Error for AmountError {}
impl fmt::Display for AmountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::NotANumber(v) => write!(f, "'{}' is not a number", v), Self::Negative => write!(f, "Amount must not be negative") }
    }
}

impl From<AmountError> for crate::ServiceError {
    fn from(err: AmountError) -> Self { crate::ServiceError::ValidationFailed(err.to_string()) }
}

/// Package dimensions in inches and weight in ounces.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parcel { pub length: f64, pub width: f64, pub height: f64, pub weight: f64 }

impl Parcel {
    pub const MIN_LENGTH: f64 = 8.0;
    pub const MIN_WIDTH: f64 = 6.0;
    pub const MIN_HEIGHT: f64 = 2.0;
    pub const MIN_WEIGHT_OZ: f64 = 16.0;

    pub fn new(length: f64, width: f64, height: f64, weight: f64) -> Self { Self { length, width, height, weight } }

    /// Raises every dimension to the smallest package carriers will rate.
    pub fn with_carrier_minimums(self) -> Self {
        Self {
            length: self.length.max(Self::MIN_LENGTH),
            width: self.width.max(Self::MIN_WIDTH),
            height: self.height.max(Self::MIN_HEIGHT),
            weight: self.weight.max(Self::MIN_WEIGHT_OZ),
        }
    }

    pub fn is_below_minimums(&self) -> bool { *self != self.with_carrier_minimums() }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn test_promo_code() { let code = PromoCode::new(" summer-10 ").unwrap(); assert_eq!(code.as_str(), "SUMMER-10"); }
    #[test]
    fn test_promo_code_rejects_spaces() { assert_eq!(PromoCode::new("TEN OFF"), Err(PromoCodeError::InvalidCharacter)); }
    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("$5.50").unwrap(), Decimal::new(550, 2));
        assert_eq!(parse_amount("1,000").unwrap(), Decimal::new(1000, 0));
        assert!(parse_amount("five").is_err());
        assert_eq!(parse_amount("-3"), Err(AmountError::Negative));
    }
    #[test]
    fn test_cents() {
        assert_eq!(to_cents(Decimal::new(30, 0)), Some(3000));
        assert_eq!(to_cents(Decimal::new(12345, 3)), Some(1235));
        assert_eq!(format_dollars(Decimal::new(5, 0)), "5.00");
    }
    #[test]
    fn test_parcel_minimums() {
        let parcel = Parcel::new(4.0, 3.0, 0.5, 3.0);
        assert!(parcel.is_below_minimums());
        assert_eq!(parcel.with_carrier_minimums(), Parcel::new(8.0, 6.0, 2.0, 16.0));
        let big = Parcel::new(12.0, 10.0, 4.0, 40.0);
        assert_eq!(big.with_carrier_minimums(), big);
    }
}
