//! Shared fixtures for monitor tests: a scripted chain and order records.

use alloy::primitives::{Address, Bytes, LogData, B256};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use async_trait::async_trait;
use checkout_chain::{ChainClient, ChainError};
use checkout_storage::implementations::memory::MemoryStorage;
use checkout_storage::{OrderStore, StorageInterface};
use checkout_types::{Order, OrderItem, OrderStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) const OWNER: &str = "0x1111111111111111111111111111111111111111";
pub(crate) const CONTRACT: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";

pub(crate) fn contract_address() -> Address {
	CONTRACT.parse().unwrap()
}

/// Chain stub that serves one fixed page of logs at block 100.
pub(crate) struct MockChain {
	logs: Mutex<Vec<Log>>,
	logs_fail: AtomicBool,
}

pub(crate) fn scripted_chain(logs: Vec<Log>) -> Arc<MockChain> {
	Arc::new(MockChain {
		logs: Mutex::new(logs),
		logs_fail: AtomicBool::new(false),
	})
}

impl MockChain {
	pub(crate) fn fail_logs(&self) {
		self.logs_fail.store(true, Ordering::SeqCst);
	}
}

#[async_trait]
impl ChainClient for MockChain {
	async fn chain_id(&self) -> Result<u64, ChainError> {
		Ok(31337)
	}

	async fn pending_nonce(&self, _address: Address) -> Result<u64, ChainError> {
		Ok(0)
	}

	async fn estimate_gas(&self, _tx: &TransactionRequest) -> Result<u64, ChainError> {
		Ok(0)
	}

	async fn suggest_fee_cap(&self) -> Result<u128, ChainError> {
		Ok(0)
	}

	async fn suggest_tip_cap(&self) -> Result<u128, ChainError> {
		Ok(0)
	}

	async fn call(&self, _tx: &TransactionRequest) -> Result<Bytes, ChainError> {
		Ok(Bytes::new())
	}

	async fn send_raw_transaction(&self, _encoded: &[u8]) -> Result<B256, ChainError> {
		Ok(B256::ZERO)
	}

	async fn logs(&self, _filter: &Filter) -> Result<Vec<Log>, ChainError> {
		if self.logs_fail.load(Ordering::SeqCst) {
			return Err(ChainError::Rpc("subscription lost".to_string()));
		}
		Ok(self.logs.lock().unwrap().clone())
	}

	async fn block_number(&self) -> Result<u64, ChainError> {
		Ok(100)
	}
}

/// Builds a log carrying the given transaction hash and topic count.
pub(crate) fn transfer_log(tx_hash: B256, topics: usize) -> Log {
	let topic_list: Vec<B256> = (0..topics).map(|i| B256::repeat_byte(i as u8)).collect();
	Log {
		inner: alloy::primitives::Log {
			address: contract_address(),
			data: LogData::new_unchecked(topic_list, Bytes::new()),
		},
		block_hash: None,
		block_number: Some(100),
		block_timestamp: None,
		transaction_hash: Some(tx_hash),
		transaction_index: None,
		log_index: None,
		removed: false,
	}
}

/// An order awaiting reconciliation, as settlement leaves it.
pub(crate) fn pending_order() -> Order {
	let mut order = Order::new(
		OWNER,
		vec![OrderItem {
			id: "prod-1".into(),
			price: 100.0,
			quantity: 1,
		}],
		"1 Main St",
	);
	order.status = OrderStatus::Pending;
	order
}

/// Stores the order in a fresh memory backend under the `checkout` table.
pub(crate) async fn with_order(order: Order) -> (Arc<MemoryStorage>, Order) {
	let storage = Arc::new(MemoryStorage::new());
	let orders = OrderStore::new(
		Arc::clone(&storage) as Arc<dyn StorageInterface>,
		"checkout",
	);
	orders.create(&order).await.unwrap();
	(storage, order)
}
