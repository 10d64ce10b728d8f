//! Mercato — multi-tenant e-commerce backend.
//!
//! ## Features
//! - Orders with cross-tenant line-item ownership and per-day numbering
//! - Gateway (Chapa) and cash-on-delivery payments with webhook-driven
//!   state and idempotent side effects
//! - Refund workflow layered over completed payments
//! - Purchase-gated product reviews
//! - Append-only activity log feeding analytics

pub mod auth;
pub mod config;
pub mod domain;
pub mod error;
pub mod gateway;
pub mod http;
pub mod services;
pub mod state;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
