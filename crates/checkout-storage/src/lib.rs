//! Storage module for the token-checkout system.
//!
//! This module provides the key-value abstraction the checkout services
//! persist through, backend implementations for it, and the typed order
//! store layered on top. Concurrency control lives in the store:
//! condition-not-exists puts and condition-exists updates fail loudly
//! instead of silently overwriting racing writers.

use async_trait::async_trait;
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

mod orders;

pub use orders::{OrderStore, OrderUpdate};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// The requested record does not exist.
	#[error("not found")]
	NotFound,
	/// A condition-not-exists put hit an existing record.
	#[error("already exists")]
	AlreadyExists,
	/// A conditional update found the record in an unexpected state.
	#[error("precondition failed: {0}")]
	Precondition(String),
	/// Serialization or deserialization of a stored value failed.
	#[error("serialization error: {0}")]
	Serialization(String),
	/// The storage backend itself failed.
	#[error("backend error: {0}")]
	Backend(String),
}

/// Trait defining the low-level interface for storage backends.
///
/// Backends provide raw byte storage keyed by composite strings; typed
/// layers such as [`OrderStore`] handle serialization and conditions
/// above it.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, creating or overwriting.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Stores raw bytes only if the key is absent.
	///
	/// Fails with [`StorageError::AlreadyExists`] when the key is present,
	/// so racing creates surface instead of overwriting each other.
	async fn set_bytes_if_absent(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Checks if a key exists in storage.
	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Deletes the value associated with the given key.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// Composite key helpers.
///
/// Records share one table; partition and sort keys are composite strings
/// in these fixed shapes.
pub mod keys {
	/// Partition key for everything owned by an account.
	pub fn user(address: &str) -> String {
		format!("USER#{address}")
	}

	/// Sort key of an order record.
	pub fn order(id: &str) -> String {
		format!("ORDER#{id}")
	}

	/// Partition key of a product record.
	pub fn product(id: &str) -> String {
		format!("PRODUCT#{id}")
	}

	/// Sort key of a profile record.
	pub fn profile(id: &str) -> String {
		format!("#PROFILE#{id}")
	}

}
