//! Typed order store with conditional, field-masked updates.
//!
//! Orders are persisted as JSON under composite `USER#` / `ORDER#` keys.
//! Partial updates go through [`OrderUpdate`], which enumerates the
//! updatable fields at compile time instead of accepting arbitrary field
//! names at runtime. Updates require the record to exist, and can
//! additionally require a specific current status so that duplicate
//! reconciliation deliveries become no-ops.

use crate::{keys, StorageError, StorageInterface};
use checkout_types::{unix_now, Order, OrderStatus};
use std::sync::Arc;

/// Field mask for a partial order update.
///
/// Only the fields represented here can change; everything else on the
/// record is untouched. `updated_at` and `status_changed_at` are
/// maintained by the store itself.
#[derive(Debug, Default, Clone)]
pub struct OrderUpdate {
	status: Option<OrderStatus>,
	payment_hash: Option<String>,
	require_status: Option<OrderStatus>,
}

impl OrderUpdate {
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the order status.
	pub fn status(mut self, status: OrderStatus) -> Self {
		self.status = Some(status);
		self
	}

	/// Records the settlement transaction hash.
	pub fn payment_hash(mut self, hash: impl Into<String>) -> Self {
		self.payment_hash = Some(hash.into());
		self
	}

	/// Makes the update conditional on the current status.
	///
	/// When the stored order is in any other status the update fails with
	/// [`StorageError::Precondition`] and writes nothing.
	pub fn require_status(mut self, status: OrderStatus) -> Self {
		self.require_status = Some(status);
		self
	}
}

/// Order persistence over a raw storage backend.
pub struct OrderStore {
	backend: Arc<dyn StorageInterface>,
	table: String,
}

impl OrderStore {
	pub fn new(backend: Arc<dyn StorageInterface>, table: impl Into<String>) -> Self {
		Self {
			backend,
			table: table.into(),
		}
	}

	/// Name of the backing table this store writes to.
	pub fn table(&self) -> &str {
		&self.table
	}

	fn key(&self, owner: &str, order_id: &str) -> String {
		format!("{}:{}:{}", self.table, keys::user(owner), keys::order(order_id))
	}

	/// Loads an order by (owner, id).
	pub async fn get(&self, owner: &str, order_id: &str) -> Result<Order, StorageError> {
		let bytes = self.backend.get_bytes(&self.key(owner, order_id)).await?;
		serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))
	}

	/// Persists a new order, failing if one already exists under the key.
	pub async fn create(&self, order: &Order) -> Result<(), StorageError> {
		let bytes =
			serde_json::to_vec(order).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend
			.set_bytes_if_absent(&self.key(&order.owner, &order.id), bytes)
			.await
	}

	/// Applies a masked update to an existing order and returns the
	/// updated record.
	///
	/// Fails with [`StorageError::NotFound`] when the order is absent and
	/// [`StorageError::Precondition`] when a `require_status` condition
	/// does not hold.
	pub async fn update(
		&self,
		owner: &str,
		order_id: &str,
		update: OrderUpdate,
	) -> Result<Order, StorageError> {
		let key = self.key(owner, order_id);
		let bytes = self.backend.get_bytes(&key).await?;
		let mut order: Order =
			serde_json::from_slice(&bytes).map_err(|e| StorageError::Serialization(e.to_string()))?;

		if let Some(required) = update.require_status {
			if order.status != required {
				return Err(StorageError::Precondition(format!(
					"order {} is {}, expected {}",
					order_id, order.status, required
				)));
			}
		}

		let now = unix_now();
		if let Some(status) = update.status {
			order.status = status;
			order.status_changed_at = format!("{}#{}", status, now);
		}
		if let Some(hash) = update.payment_hash {
			order.payment_hash = Some(hash);
		}
		order.updated_at = now;

		let bytes =
			serde_json::to_vec(&order).map_err(|e| StorageError::Serialization(e.to_string()))?;
		self.backend.set_bytes(&key, bytes).await?;
		Ok(order)
	}
}
