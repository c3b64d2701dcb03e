//! Stripe payments: checkout creation and webhook verification

pub mod event;
pub mod stripe;
pub mod webhook;

pub use stripe::StripeService;
