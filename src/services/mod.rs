//! Storefront services

pub mod carts;
pub mod coupons;
pub mod orders;
pub mod payments;
pub mod stock;

pub use carts::CartService;
pub use coupons::CouponService;
pub use orders::OrderService;
pub use payments::PaymentService;
