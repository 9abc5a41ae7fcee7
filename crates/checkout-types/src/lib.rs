//! Common types module for the token-checkout system.
//!
//! This module defines the core data types and structures shared by the
//! checkout services. It provides a centralized location for the order
//! model, transfer and monitor requests, and amount conversion so that
//! every component agrees on the same wire and storage shapes.

/// Decimal amount to base-unit conversion.
pub mod amount;
/// Order model and status lifecycle.
pub mod order;
/// Transfer and monitor request payloads.
pub mod request;
/// Secure string type for private key material.
pub mod secret_string;
/// Transaction hash representation.
pub mod transaction;
/// Hex formatting and time helpers.
pub mod utils;

// Re-export all types for convenient access
pub use amount::{from_base_units, to_base_units, AmountError};
pub use order::{Order, OrderItem, OrderStatus};
pub use request::{AllowanceRequest, MonitorRequest, TransferRequest};
pub use secret_string::SecretString;
pub use transaction::TransactionHash;
pub use utils::{truncate_id, unix_now, with_0x_prefix, without_0x_prefix};
