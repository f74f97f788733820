//! Aggregates module
pub mod cart;
pub mod credit;
pub mod discount;
pub mod order;
pub mod proof;
pub mod review;

pub use cart::{Cart, CartError, CartItem};
pub use credit::{credits_to_apply, CreditKind, CreditTransaction};
pub use discount::{format_discount_display, DiscountCode, DiscountRejection, DiscountType, DiscountUsage};
pub use order::{Address, Customer, FinancialStatus, FulfillmentStatus, Order, OrderError, OrderItem, OrderProofStatus, OrderStatus, Pricing};
pub use proof::{Proof, ProofError, ProofState};
pub use review::{NewReview, Review};
