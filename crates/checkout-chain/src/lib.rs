//! Chain RPC access for the token-checkout system.
//!
//! This module defines the interface the checkout services use to talk to
//! an EVM chain, plus the Alloy-backed implementation of it. Keeping the
//! RPC surface behind a trait lets the token service, the log monitor,
//! and the settlement flow share one client and lets tests substitute a
//! mock chain.

use alloy::primitives::{Address, Bytes, B256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use async_trait::async_trait;
use std::sync::Mutex;
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors that can occur during chain RPC operations.
///
/// RPC failures are transient from this crate's point of view; whether a
/// retry is safe depends on what the caller already submitted.
#[derive(Debug, Error)]
pub enum ChainError {
	/// The RPC endpoint URL is malformed.
	#[error("invalid rpc endpoint: {0}")]
	Endpoint(String),
	/// An RPC call failed.
	#[error("rpc error: {0}")]
	Rpc(String),
}

/// Trait defining the chain operations the checkout services need.
#[async_trait]
pub trait ChainClient: Send + Sync {
	/// Returns the chain id of the connected network.
	async fn chain_id(&self) -> Result<u64, ChainError>;

	/// Returns the next nonce for an address, pending transactions
	/// included.
	async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError>;

	/// Estimates the gas limit for a call.
	async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, ChainError>;

	/// Suggests a total fee cap per gas unit in wei.
	async fn suggest_fee_cap(&self) -> Result<u128, ChainError>;

	/// Suggests a priority fee cap per gas unit in wei.
	async fn suggest_tip_cap(&self) -> Result<u128, ChainError>;

	/// Executes a read-only call and returns the raw return data.
	async fn call(&self, tx: &TransactionRequest) -> Result<Bytes, ChainError>;

	/// Submits an EIP-2718 encoded signed transaction.
	async fn send_raw_transaction(&self, encoded: &[u8]) -> Result<B256, ChainError>;

	/// Fetches logs matching a filter.
	async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, ChainError>;

	/// Returns the latest block number.
	async fn block_number(&self) -> Result<u64, ChainError>;
}

/// Alloy HTTP implementation of [`ChainClient`].
pub struct AlloyChain {
	provider: RootProvider,
}

impl AlloyChain {
	/// Connects to an HTTP RPC endpoint.
	pub fn connect(url: &str) -> Result<Self, ChainError> {
		let url = url
			.parse()
			.map_err(|e| ChainError::Endpoint(format!("{url}: {e}")))?;
		Ok(Self {
			provider: RootProvider::new_http(url),
		})
	}
}

#[async_trait]
impl ChainClient for AlloyChain {
	async fn chain_id(&self) -> Result<u64, ChainError> {
		self.provider
			.get_chain_id()
			.await
			.map_err(|e| ChainError::Rpc(e.to_string()))
	}

	async fn pending_nonce(&self, address: Address) -> Result<u64, ChainError> {
		self.provider
			.get_transaction_count(address)
			.pending()
			.await
			.map_err(|e| ChainError::Rpc(e.to_string()))
	}

	async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, ChainError> {
		self.provider
			.estimate_gas(tx.clone())
			.await
			.map_err(|e| ChainError::Rpc(e.to_string()))
	}

	async fn suggest_fee_cap(&self) -> Result<u128, ChainError> {
		self.provider
			.get_gas_price()
			.await
			.map_err(|e| ChainError::Rpc(e.to_string()))
	}

	async fn suggest_tip_cap(&self) -> Result<u128, ChainError> {
		self.provider
			.get_max_priority_fee_per_gas()
			.await
			.map_err(|e| ChainError::Rpc(e.to_string()))
	}

	async fn call(&self, tx: &TransactionRequest) -> Result<Bytes, ChainError> {
		self.provider
			.call(tx.clone())
			.await
			.map_err(|e| ChainError::Rpc(e.to_string()))
	}

	async fn send_raw_transaction(&self, encoded: &[u8]) -> Result<B256, ChainError> {
		let pending = self
			.provider
			.send_raw_transaction(encoded)
			.await
			.map_err(|e| ChainError::Rpc(e.to_string()))?;
		Ok(*pending.tx_hash())
	}

	async fn logs(&self, filter: &Filter) -> Result<Vec<Log>, ChainError> {
		self.provider
			.get_logs(filter)
			.await
			.map_err(|e| ChainError::Rpc(e.to_string()))
	}

	async fn block_number(&self) -> Result<u64, ChainError> {
		self.provider
			.get_block_number()
			.await
			.map_err(|e| ChainError::Rpc(e.to_string()))
	}
}

/// Idempotent cancellation handle for background subscription tasks.
///
/// The stop sender sits behind a mutex and is taken on first use, so
/// calling [`CancelHandle::cancel`] any number of times, from any thread,
/// sends at most one stop signal.
pub struct CancelHandle {
	stop: Mutex<Option<mpsc::Sender<()>>>,
}

impl CancelHandle {
	pub fn new(stop: mpsc::Sender<()>) -> Self {
		Self {
			stop: Mutex::new(Some(stop)),
		}
	}

	/// Requests termination of the background task.
	pub fn cancel(&self) {
		let mut guard = self.stop.lock().unwrap_or_else(|e| e.into_inner());
		if let Some(stop) = guard.take() {
			// the task holds the receiver until it exits; a full or closed
			// channel means it is already stopping
			let _ = stop.try_send(());
		}
	}
}
