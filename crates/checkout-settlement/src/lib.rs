//! Payment settlement orchestration for the token-checkout system.
//!
//! [`PaymentService::pay_token`] is the settlement entry point: it loads
//! the order, validates the transfer intent against it, submits the
//! transfer through the token service, persists the new order state, and
//! enqueues a monitor request for asynchronous reconciliation.
//!
//! Once the transfer is submitted it is irrevocable. Failures after that
//! point are reported as a distinct partial-failure error carrying the
//! transaction hash — the books may lag the chain, but the transfer is
//! never rolled back or resubmitted, because a resubmission could double
//! spend.

use checkout_chain::ChainClient;
use checkout_queue::QueueService;
use checkout_storage::{OrderStore, OrderUpdate, StorageError};
use checkout_token::{TokenError, TokenService};
use checkout_types::{truncate_id, MonitorRequest, OrderStatus, TransferRequest};
use std::sync::Arc;
use thiserror::Error;

/// Errors that can occur during payment settlement.
#[derive(Debug, Error)]
pub enum SettlementError {
	/// No order exists under (owner, order id).
	#[error("order not found")]
	NotFound,
	/// The request amount does not equal the order amount.
	#[error("amount mismatch: order is {expected}, request is {actual}")]
	InvalidAmount { expected: f64, actual: f64 },
	/// The request nonce does not equal the chain's pending nonce as
	/// observed by the caller. Guards against stale or replayed
	/// submissions.
	#[error("nonce mismatch: expected {expected}, request is {actual}")]
	InvalidNonce { expected: u64, actual: u64 },
	/// The order is not in a payable status. A second settlement attempt
	/// against a pending or paid order is rejected, not retried.
	#[error("order is not payable, status is {0}")]
	AlreadyPaid(OrderStatus),
	/// The transfer itself was rejected or failed before submission.
	/// Nothing reached the chain; the whole attempt may be retried.
	#[error("transfer failed: {0}")]
	Transfer(#[from] TokenError),
	/// Loading the order failed.
	#[error("order load failed: {0}")]
	Storage(StorageError),
	/// Bookkeeping failed after the transaction was already submitted.
	/// The transfer exists on-chain; this state needs operator attention,
	/// not an automatic retry.
	#[error("bookkeeping failed after transaction {tx_hash} was submitted: {source}")]
	Postsubmit {
		tx_hash: String,
		#[source]
		source: Box<dyn std::error::Error + Send + Sync>,
	},
}

/// Service orchestrating order settlement.
pub struct PaymentService {
	token: Arc<TokenService>,
	chain: Arc<dyn ChainClient>,
	orders: Arc<OrderStore>,
	queue: Arc<QueueService>,
	/// Blocks subtracted from the current tip when the monitor starts
	/// scanning, to tolerate a chain-tip reorg between submission and
	/// monitoring.
	rollback_blocks: u64,
}

impl PaymentService {
	pub fn new(
		token: Arc<TokenService>,
		chain: Arc<dyn ChainClient>,
		orders: Arc<OrderStore>,
		queue: Arc<QueueService>,
		rollback_blocks: u64,
	) -> Self {
		Self {
			token,
			chain,
			orders,
			queue,
			rollback_blocks,
		}
	}

	/// Settles an order with a client-signed token transfer.
	///
	/// Returns the hex transaction hash of the submitted transfer.
	pub async fn pay_token(
		&self,
		owner: &str,
		order_id: &str,
		expected_nonce: u64,
		request: &TransferRequest,
	) -> Result<String, SettlementError> {
		let order = self.orders.get(owner, order_id).await.map_err(|e| match e {
			StorageError::NotFound => SettlementError::NotFound,
			other => SettlementError::Storage(other),
		})?;

		if order.amount != request.amount {
			return Err(SettlementError::InvalidAmount {
				expected: order.amount,
				actual: request.amount,
			});
		}
		if expected_nonce != request.nonce {
			return Err(SettlementError::InvalidNonce {
				expected: expected_nonce,
				actual: request.nonce,
			});
		}
		if !order.status.can_pay() {
			return Err(SettlementError::AlreadyPaid(order.status));
		}

		let tx_hash = self.token.transfer_with_signature(request).await?;
		let hash_hex = tx_hash.to_hex();
		tracing::info!(
			order_id = %truncate_id(order_id),
			tx_hash = %truncate_id(&hash_hex),
			"transfer submitted, marking order pending"
		);

		// The transfer is on the wire. Everything below is bookkeeping:
		// report failures, never roll back or resubmit.
		if let Err(e) = self
			.orders
			.update(
				owner,
				order_id,
				OrderUpdate::new()
					.status(OrderStatus::Pending)
					.payment_hash(hash_hex.clone()),
			)
			.await
		{
			return Err(SettlementError::Postsubmit {
				tx_hash: hash_hex,
				source: Box::new(e),
			});
		}

		let monitor = match self.monitor_request(owner, order_id, &hash_hex).await {
			Ok(monitor) => monitor,
			Err(source) => {
				return Err(SettlementError::Postsubmit {
					tx_hash: hash_hex,
					source,
				})
			}
		};
		if let Err(e) = self.queue.send(&monitor).await {
			return Err(SettlementError::Postsubmit {
				tx_hash: hash_hex,
				source: Box::new(e),
			});
		}

		Ok(hash_hex)
	}

	/// Builds the monitor request for one submitted settlement.
	///
	/// The starting block is the current tip minus the reorg safety
	/// margin, clamped at zero for young chains.
	async fn monitor_request(
		&self,
		owner: &str,
		order_id: &str,
		tx_hash: &str,
	) -> Result<MonitorRequest, Box<dyn std::error::Error + Send + Sync>> {
		let current_block = self.chain.block_number().await?;
		let topic = self.token.transfer_topic()?;

		Ok(MonitorRequest {
			order_id: order_id.to_string(),
			table: self.orders.table().to_string(),
			contract: self.token.contract_address().to_string(),
			topics: vec![topic.to_string()],
			from: owner.to_string(),
			from_block: current_block.saturating_sub(self.rollback_blocks),
			tx_hash: tx_hash.to_string(),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use alloy::consensus::{SignableTransaction, TxEip1559};
	use alloy::dyn_abi::DynSolValue;
	use alloy::primitives::{keccak256, Address, Bytes, TxKind, B256, U256};
	use alloy::rpc::types::{Filter, Log, TransactionRequest};
	use alloy::signers::local::PrivateKeySigner;
	use alloy::signers::SignerSync;
	use async_trait::async_trait;
	use checkout_chain::ChainError;
	use checkout_contract::Contract;
	use checkout_queue::implementations::memory::MemoryQueue;
	use checkout_queue::{QueueError, QueueInterface};
	use checkout_storage::implementations::memory::MemoryStorage;
	use checkout_storage::StorageInterface;
	use checkout_types::amount::to_base_units;
	use checkout_types::{Order, OrderItem};
	use std::sync::atomic::{AtomicU64, Ordering};
	use std::sync::Mutex;

	const TOKEN: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
	const RECIPIENT: &str = "0x2222222222222222222222222222222222222222";
	const CHAIN_ID: u64 = 31337;
	const DECIMALS: u8 = 6;

	const ERC20_ABI: &str = r#"[
		{"type":"function","name":"transfer","stateMutability":"nonpayable",
		 "inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],
		 "outputs":[{"name":"","type":"bool"}]},
		{"type":"event","name":"Transfer","anonymous":false,
		 "inputs":[{"name":"from","type":"address","indexed":true},
		           {"name":"to","type":"address","indexed":true},
		           {"name":"value","type":"uint256","indexed":false}]}
	]"#;

	struct MockChain {
		sent: Mutex<Vec<Vec<u8>>>,
		block: AtomicU64,
	}

	impl MockChain {
		fn new() -> Self {
			Self {
				sent: Mutex::new(Vec::new()),
				block: AtomicU64::new(100),
			}
		}

		fn set_block(&self, block: u64) {
			self.block.store(block, Ordering::SeqCst);
		}
	}

	#[async_trait]
	impl ChainClient for MockChain {
		async fn chain_id(&self) -> Result<u64, ChainError> {
			Ok(CHAIN_ID)
		}

		async fn pending_nonce(&self, _address: Address) -> Result<u64, ChainError> {
			Ok(7)
		}

		async fn estimate_gas(&self, _tx: &TransactionRequest) -> Result<u64, ChainError> {
			Ok(60_000)
		}

		async fn suggest_fee_cap(&self) -> Result<u128, ChainError> {
			Ok(30_000_000_000)
		}

		async fn suggest_tip_cap(&self) -> Result<u128, ChainError> {
			Ok(1_500_000_000)
		}

		async fn call(&self, _tx: &TransactionRequest) -> Result<Bytes, ChainError> {
			Ok(Bytes::new())
		}

		async fn send_raw_transaction(&self, encoded: &[u8]) -> Result<B256, ChainError> {
			self.sent.lock().unwrap().push(encoded.to_vec());
			Ok(keccak256(encoded))
		}

		async fn logs(&self, _filter: &Filter) -> Result<Vec<Log>, ChainError> {
			Ok(Vec::new())
		}

		async fn block_number(&self) -> Result<u64, ChainError> {
			Ok(self.block.load(Ordering::SeqCst))
		}
	}

	/// Queue backend whose enqueue always fails.
	struct BrokenQueue;

	#[async_trait]
	impl QueueInterface for BrokenQueue {
		async fn enqueue(&self, _body: Vec<u8>) -> Result<(), QueueError> {
			Err(QueueError::Backend("queue unavailable".to_string()))
		}

		async fn dequeue(&self) -> Result<Vec<u8>, QueueError> {
			Err(QueueError::Closed)
		}
	}

	struct Harness {
		service: PaymentService,
		chain: Arc<MockChain>,
		orders: Arc<OrderStore>,
		queue: Arc<QueueService>,
		signer: PrivateKeySigner,
		order: Order,
	}

	async fn harness_with_queue(queue_backend: Box<dyn QueueInterface>) -> Harness {
		let chain = Arc::new(MockChain::new());
		let storage = Arc::new(MemoryStorage::new());
		let orders = Arc::new(OrderStore::new(
			Arc::clone(&storage) as Arc<dyn StorageInterface>,
			"checkout",
		));
		let queue = Arc::new(QueueService::new(queue_backend));
		let token = Arc::new(TokenService::new(
			Arc::clone(&chain) as Arc<dyn ChainClient>,
			Contract::from_json(ERC20_ABI.as_bytes(), TOKEN).unwrap(),
			CHAIN_ID,
			DECIMALS,
		));

		let signer = PrivateKeySigner::random();
		let order = Order::new(
			&signer.address().to_string(),
			vec![OrderItem {
				id: "prod-1".into(),
				price: 100.0,
				quantity: 1,
			}],
			"1 Main St",
		);
		orders.create(&order).await.unwrap();

		let service = PaymentService::new(
			Arc::clone(&token),
			Arc::clone(&chain) as Arc<dyn ChainClient>,
			Arc::clone(&orders),
			Arc::clone(&queue),
			5,
		);

		Harness {
			service,
			chain,
			orders,
			queue,
			signer,
			order,
		}
	}

	async fn harness() -> Harness {
		harness_with_queue(Box::new(MemoryQueue::new())).await
	}

	/// A fully-priced transfer request signed by the order owner.
	fn signed_request(signer: &PrivateKeySigner, amount: f64, nonce: u64) -> TransferRequest {
		let contract = Contract::from_json(ERC20_ABI.as_bytes(), TOKEN).unwrap();
		let recipient: Address = RECIPIENT.parse().unwrap();
		let data = contract
			.encode_call(
				"transfer",
				&[
					DynSolValue::Address(recipient),
					DynSolValue::Uint(to_base_units(amount, DECIMALS).unwrap(), 256),
				],
			)
			.unwrap();
		let tx = TxEip1559 {
			chain_id: CHAIN_ID,
			nonce,
			gas_limit: 60_000,
			max_fee_per_gas: 30_000_000_000,
			max_priority_fee_per_gas: 1_500_000_000,
			to: TxKind::Call(contract.address()),
			value: U256::ZERO,
			access_list: Default::default(),
			input: data,
		};
		let signature = signer.sign_hash_sync(&tx.signature_hash()).unwrap();

		TransferRequest {
			from: signer.address().to_string(),
			to: RECIPIENT.to_string(),
			amount,
			nonce,
			signature: Some(hex::encode(signature.as_bytes())),
			gas_tip_cap: Some("1500000000".to_string()),
			gas_fee_cap: Some("30000000000".to_string()),
			gas: Some("60000".to_string()),
		}
	}

	#[tokio::test]
	async fn test_settlement_end_to_end() {
		let h = harness().await;
		let request = signed_request(&h.signer, 100.0, 7);

		let hash = h
			.service
			.pay_token(&h.order.owner, &h.order.id, 7, &request)
			.await
			.unwrap();

		// a 32-byte hex-encoded hash
		assert!(hash.starts_with("0x"));
		assert_eq!(hash.len(), 66);
		assert!(hash[2..].chars().all(|c| c.is_ascii_hexdigit()));

		let order = h.orders.get(&h.order.owner, &h.order.id).await.unwrap();
		assert_eq!(order.status, OrderStatus::Pending);
		assert_eq!(order.payment_hash.as_deref(), Some(hash.as_str()));

		let monitor: MonitorRequest = h.queue.receive().await.unwrap();
		assert_eq!(monitor.order_id, h.order.id);
		assert_eq!(monitor.tx_hash, hash);
		assert_eq!(monitor.table, "checkout");
		assert_eq!(monitor.from_block, 95);
		assert_eq!(monitor.topics.len(), 1);
	}

	#[tokio::test]
	async fn test_second_attempt_is_already_paid() {
		let h = harness().await;
		let request = signed_request(&h.signer, 100.0, 7);

		h.service
			.pay_token(&h.order.owner, &h.order.id, 7, &request)
			.await
			.unwrap();
		let second = h
			.service
			.pay_token(&h.order.owner, &h.order.id, 7, &request)
			.await;
		assert!(matches!(
			second,
			Err(SettlementError::AlreadyPaid(OrderStatus::Pending))
		));
		// only the first transfer reached the chain
		assert_eq!(h.chain.sent.lock().unwrap().len(), 1);
	}

	#[tokio::test]
	async fn test_amount_mismatch() {
		let h = harness().await;
		let request = signed_request(&h.signer, 50.0, 7);
		let result = h
			.service
			.pay_token(&h.order.owner, &h.order.id, 7, &request)
			.await;
		assert!(matches!(result, Err(SettlementError::InvalidAmount { .. })));
	}

	#[tokio::test]
	async fn test_nonce_mismatch() {
		let h = harness().await;
		let request = signed_request(&h.signer, 100.0, 7);
		let result = h
			.service
			.pay_token(&h.order.owner, &h.order.id, 8, &request)
			.await;
		assert!(matches!(result, Err(SettlementError::InvalidNonce {
			expected: 8,
			actual: 7
		})));
	}

	#[tokio::test]
	async fn test_unknown_order() {
		let h = harness().await;
		let request = signed_request(&h.signer, 100.0, 7);
		let result = h
			.service
			.pay_token(&h.order.owner, "no-such-order", 7, &request)
			.await;
		assert!(matches!(result, Err(SettlementError::NotFound)));
	}

	#[tokio::test]
	async fn test_monitor_start_block_clamps_at_genesis() {
		let h = harness().await;
		h.chain.set_block(2);
		let request = signed_request(&h.signer, 100.0, 7);

		h.service
			.pay_token(&h.order.owner, &h.order.id, 7, &request)
			.await
			.unwrap();

		let monitor: MonitorRequest = h.queue.receive().await.unwrap();
		assert_eq!(monitor.from_block, 0);
	}

	#[tokio::test]
	async fn test_enqueue_failure_is_postsubmit() {
		let h = harness_with_queue(Box::new(BrokenQueue)).await;
		let request = signed_request(&h.signer, 100.0, 7);

		let result = h
			.service
			.pay_token(&h.order.owner, &h.order.id, 7, &request)
			.await;
		let error = result.unwrap_err();
		let SettlementError::Postsubmit { tx_hash, .. } = &error else {
			panic!("expected Postsubmit, got {error}");
		};

		// the transfer was submitted and the order already reflects it
		assert_eq!(h.chain.sent.lock().unwrap().len(), 1);
		let order = h.orders.get(&h.order.owner, &h.order.id).await.unwrap();
		assert_eq!(order.status, OrderStatus::Pending);
		assert_eq!(order.payment_hash.as_deref(), Some(tx_hash.as_str()));
	}
}
