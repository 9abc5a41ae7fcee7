//! In-memory storage backend.
//!
//! Stores data in a HashMap behind a read-write lock. Useful for tests and
//! development; nothing survives a restart.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-memory storage implementation.
pub struct MemoryStorage {
	store: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self {
			store: RwLock::new(HashMap::new()),
		}
	}
}

impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let store = self.store.read().await;
		store.get(key).cloned().ok_or(StorageError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.insert(key.to_string(), value);
		Ok(())
	}

	async fn set_bytes_if_absent(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		// The write lock spans check and insert, so racing creates
		// serialize and the loser sees AlreadyExists.
		let mut store = self.store.write().await;
		if store.contains_key(key) {
			return Err(StorageError::AlreadyExists);
		}
		store.insert(key.to_string(), value);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let store = self.store.read().await;
		Ok(store.contains_key(key))
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		let mut store = self.store.write().await;
		store.remove(key);
		Ok(())
	}
}
