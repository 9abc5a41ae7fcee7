//! Order model and payment status lifecycle.
//!
//! An order is identified by the pair (owner address, order id). Its amount
//! is fixed at creation time as the sum of the priced line items, and its
//! status advances monotonically through the payment lifecycle.

use crate::utils::unix_now;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of an order.
///
/// `Delivered`, `Cancelled` and `MonitorFailed` are terminal. An order is
/// payable only from `Created` or `PaidFailed`; a settlement attempt moves
/// it to `Pending`, and the reconciliation worker resolves `Pending` to
/// `Paid` or `MonitorFailed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
	Created,
	Pending,
	Paid,
	PaidFailed,
	Shipped,
	Delivered,
	Cancelled,
	MonitorFailed,
}

impl OrderStatus {
	/// Whether a settlement attempt may be started from this status.
	pub fn can_pay(&self) -> bool {
		matches!(self, OrderStatus::Created | OrderStatus::PaidFailed)
	}

	/// Whether this status admits no further transitions.
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::MonitorFailed
		)
	}

	/// Stable snake_case name, matching the serialized form.
	pub fn as_str(&self) -> &'static str {
		match self {
			OrderStatus::Created => "created",
			OrderStatus::Pending => "pending",
			OrderStatus::Paid => "paid",
			OrderStatus::PaidFailed => "paid_failed",
			OrderStatus::Shipped => "shipped",
			OrderStatus::Delivered => "delivered",
			OrderStatus::Cancelled => "cancelled",
			OrderStatus::MonitorFailed => "monitor_failed",
		}
	}
}

impl fmt::Display for OrderStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A single priced line item of an order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderItem {
	/// Product identifier.
	pub id: String,
	/// Unit price in human decimal token units.
	pub price: f64,
	/// Number of units ordered.
	pub quantity: u32,
}

/// A customer order awaiting on-chain settlement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
	/// Unique identifier for this order.
	pub id: String,
	/// Hex address of the owning account.
	pub owner: String,
	/// Priced line items.
	pub items: Vec<OrderItem>,
	/// Shipping destination.
	pub shipping_address: String,
	/// Total amount in human decimal token units. Equals the sum of the
	/// line items by construction.
	pub amount: f64,
	/// Current lifecycle status.
	pub status: OrderStatus,
	/// Transaction hash of the settlement attempt, set once and kept.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub payment_hash: Option<String>,
	/// `<status>#<unix>` composite used as a secondary sort value.
	pub status_changed_at: String,
	/// Timestamp when this order was created.
	pub created_at: u64,
	/// Timestamp when this order was last updated.
	pub updated_at: u64,
}

impl Order {
	/// Creates a new order in `Created` status.
	///
	/// The total amount is computed from the line items through decimal
	/// arithmetic, so the amount-equals-sum invariant holds by
	/// construction.
	pub fn new(owner: &str, items: Vec<OrderItem>, shipping_address: &str) -> Self {
		let total: Decimal = items
			.iter()
			.filter_map(|item| {
				Decimal::from_f64(item.price).map(|price| price * Decimal::from(item.quantity))
			})
			.sum();
		let now = unix_now();
		let status = OrderStatus::Created;

		Self {
			id: uuid::Uuid::new_v4().to_string(),
			owner: owner.to_string(),
			items,
			shipping_address: shipping_address.to_string(),
			amount: total.to_f64().unwrap_or(0.0),
			status,
			payment_hash: None,
			status_changed_at: format!("{}#{}", status, now),
			created_at: now,
			updated_at: now,
		}
	}
}
