//! Application wiring for the token-checkout service.
//!
//! [`CheckoutEngine`] constructs every component once from configuration
//! and threads them into each other explicitly — there are no global
//! service instances. The engine owns the settlement entry point for
//! embedding callers and runs the reconciliation worker loop until
//! shutdown.

use checkout_chain::{AlloyChain, ChainClient};
use checkout_config::{Config, StoreBackend};
use checkout_contract::Contract;
use checkout_monitor::ReconcileWorker;
use checkout_queue::implementations::memory::MemoryQueue;
use checkout_queue::QueueService;
use checkout_settlement::PaymentService;
use checkout_storage::implementations::file::FileStorage;
use checkout_storage::implementations::memory::MemoryStorage;
use checkout_storage::{OrderStore, StorageInterface};
use checkout_token::TokenService;
use alloy::signers::local::PrivateKeySigner;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while building or running the engine.
#[derive(Debug, Error)]
pub enum EngineError {
	/// A component could not be constructed from the configuration.
	#[error("configuration error: {0}")]
	Config(String),
	/// A service failed while the engine was running.
	#[error("service error: {0}")]
	Service(String),
}

/// The assembled checkout application.
pub struct CheckoutEngine {
	payment: Arc<PaymentService>,
	worker: Arc<ReconcileWorker>,
	queue: Arc<QueueService>,
	operator_key: Option<PrivateKeySigner>,
}

impl CheckoutEngine {
	/// Builds every component from the configuration.
	///
	/// Construction is eager: all clients exist before any request is
	/// served, and a malformed operator key fails startup instead of the
	/// first signing attempt.
	pub async fn from_config(config: Config) -> Result<Self, EngineError> {
		let chain: Arc<dyn ChainClient> = Arc::new(
			AlloyChain::connect(&config.eth_url).map_err(|e| EngineError::Config(e.to_string()))?,
		);
		let chain_id = chain
			.chain_id()
			.await
			.map_err(|e| EngineError::Service(format!("failed to query chain id: {e}")))?;

		let contract = Contract::from_file(&config.token.abi_path, &config.token.address)
			.map_err(|e| EngineError::Config(e.to_string()))?;
		let token = Arc::new(TokenService::new(
			Arc::clone(&chain),
			contract,
			chain_id,
			config.token.decimals,
		));

		let storage: Arc<dyn StorageInterface> = match config.store.backend {
			StoreBackend::Memory => Arc::new(MemoryStorage::new()),
			StoreBackend::File => {
				let path = config
					.store
					.path
					.as_ref()
					.ok_or_else(|| EngineError::Config("store.path is required".to_string()))?;
				Arc::new(FileStorage::new(path).map_err(|e| EngineError::Config(e.to_string()))?)
			}
		};
		let orders = Arc::new(OrderStore::new(
			Arc::clone(&storage),
			config.store.table.clone(),
		));

		let queue = Arc::new(QueueService::new(Box::new(MemoryQueue::new())));

		let payment = Arc::new(PaymentService::new(
			token,
			Arc::clone(&chain),
			orders,
			Arc::clone(&queue),
			config.monitor.rollback_blocks,
		));
		let worker = Arc::new(ReconcileWorker::new(
			Arc::clone(&chain),
			storage,
			Duration::from_secs(config.monitor.timeout_secs),
		));

		let operator_key = match config.operator_key() {
			Some(key) => Some(
				key.with_exposed(|raw| raw.parse::<PrivateKeySigner>())
					.map_err(|_| EngineError::Config("malformed operator private key".to_string()))?,
			),
			None => None,
		};

		tracing::info!(chain_id, env = %config.env, "checkout engine assembled");
		Ok(Self {
			payment,
			worker,
			queue,
			operator_key,
		})
	}

	/// Settlement entry point for embedding callers.
	pub fn payment(&self) -> Arc<PaymentService> {
		Arc::clone(&self.payment)
	}

	/// Queue the settlement flow enqueues monitor requests onto.
	pub fn queue(&self) -> Arc<QueueService> {
		Arc::clone(&self.queue)
	}

	/// The operator's signer, when one was provided via the environment.
	pub fn operator_signer(&self) -> Option<&PrivateKeySigner> {
		self.operator_key.as_ref()
	}

	/// Runs the reconciliation worker until interrupted.
	pub async fn run(&self) -> Result<(), EngineError> {
		let worker = Arc::clone(&self.worker);
		let queue = Arc::clone(&self.queue);
		let consumer = tokio::spawn(async move {
			worker.run(queue).await;
		});

		tokio::signal::ctrl_c()
			.await
			.map_err(|e| EngineError::Service(e.to_string()))?;
		tracing::info!("shutdown requested, stopping worker");
		consumer.abort();
		Ok(())
	}
}
