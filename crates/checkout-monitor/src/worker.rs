//! Queue-triggered reconciliation worker.
//!
//! Each monitor request resolves through a three-way race: the log watch
//! finds the target transaction, the watch fails, or a bounded timeout
//! elapses. Whichever fires first wins and the others are abandoned (the
//! watch is cancelled, not awaited). Every branch except the
//! malformed-event case ends with an order-status write; the write is
//! conditioned on the order still being `pending`, which makes duplicate
//! queue deliveries converge instead of rewriting settled orders.

use crate::watch::{watch, WatchTarget};
use crate::TRANSFER_TOPICS;
use checkout_chain::{ChainClient, ChainError};
use checkout_queue::{QueueError, QueueService};
use checkout_storage::{OrderStore, OrderUpdate, StorageError, StorageInterface};
use checkout_types::{truncate_id, MonitorRequest, OrderStatus};
use alloy::primitives::B256;
use alloy::rpc::types::Log;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors that can terminate one reconciliation attempt.
#[derive(Debug, Error)]
pub enum ReconcileError {
	/// The queue message body is not a valid monitor request.
	#[error("monitor request decode failed: {0}")]
	Decode(String),
	/// The watch found nothing before the deadline.
	#[error("monitoring timed out after {0:?}")]
	Timeout(Duration),
	/// The log watch itself failed.
	#[error("log subscription failed: {0}")]
	Subscription(ChainError),
	/// The matching log does not look like an ERC-20 Transfer. The order
	/// status is left untouched for manual inspection.
	#[error("malformed transfer event: {0}")]
	InvalidEvent(String),
	/// The paid status write failed after a successful match.
	#[error("order update failed: {0}")]
	UpdateFailed(StorageError),
	/// Both the monitor outcome and the subsequent status write failed;
	/// the two causes are joined so neither is lost.
	#[error("order update failed: {update}; while handling: {trigger}")]
	UpdateFailedAfter {
		trigger: Box<ReconcileError>,
		update: StorageError,
	},
}

/// Worker that consumes monitor requests and reconciles order status.
pub struct ReconcileWorker {
	chain: Arc<dyn ChainClient>,
	storage: Arc<dyn StorageInterface>,
	timeout: Duration,
}

impl ReconcileWorker {
	pub fn new(
		chain: Arc<dyn ChainClient>,
		storage: Arc<dyn StorageInterface>,
		timeout: Duration,
	) -> Self {
		Self {
			chain,
			storage,
			timeout,
		}
	}

	/// Consumes monitor requests from the queue until it closes.
	///
	/// A failed attempt is logged and the message is left to the queue's
	/// redelivery policy; the loop itself keeps running.
	pub async fn run(&self, queue: Arc<QueueService>) {
		loop {
			let body = match queue.receive_raw().await {
				Ok(body) => body,
				Err(QueueError::Closed) => {
					tracing::info!("monitor queue closed, stopping worker");
					return;
				}
				Err(e) => {
					tracing::error!(error = %e, "failed to receive monitor request");
					continue;
				}
			};
			if let Err(e) = self.handle_body(&body).await {
				tracing::error!(error = %e, "reconciliation attempt failed");
			}
		}
	}

	/// Decodes one queue message body and reconciles it.
	pub async fn handle_body(&self, body: &[u8]) -> Result<(), ReconcileError> {
		let request: MonitorRequest =
			serde_json::from_slice(body).map_err(|e| ReconcileError::Decode(e.to_string()))?;
		self.handle(&request).await
	}

	/// Runs the watch-or-timeout race for one monitor request.
	pub async fn handle(&self, request: &MonitorRequest) -> Result<(), ReconcileError> {
		let target = watch_target(request)?;
		let mut watch = watch(Arc::clone(&self.chain), target);

		tracing::info!(
			order_id = %truncate_id(&request.order_id),
			tx_hash = %truncate_id(&request.tx_hash),
			from_block = request.from_block,
			"monitoring settlement transaction"
		);

		tokio::select! {
			_ = tokio::time::sleep(self.timeout) => {
				watch.cancel();
				self.resolve_failed(request, ReconcileError::Timeout(self.timeout)).await
			}
			failed = &mut watch.failed => {
				watch.cancel();
				match failed {
					Ok(error) => {
						self.resolve_failed(request, ReconcileError::Subscription(error)).await
					}
					// the watch exited the other way; the match is waiting
					Err(_) => match watch.matched.try_recv() {
						Ok(log) => self.resolve_matched(request, log).await,
						Err(_) => {
							self.resolve_failed(
								request,
								ReconcileError::Subscription(ChainError::Rpc(
									"monitor ended without a result".to_string(),
								)),
							)
							.await
						}
					},
				}
			}
			matched = &mut watch.matched => {
				watch.cancel();
				match matched {
					Ok(log) => self.resolve_matched(request, log).await,
					Err(_) => match watch.failed.try_recv() {
						Ok(error) => {
							self.resolve_failed(request, ReconcileError::Subscription(error)).await
						}
						Err(_) => {
							self.resolve_failed(
								request,
								ReconcileError::Subscription(ChainError::Rpc(
									"monitor ended without a result".to_string(),
								)),
							)
							.await
						}
					},
				}
			}
		}
	}

	/// Match branch: validate the event shape, then mark the order paid.
	async fn resolve_matched(
		&self,
		request: &MonitorRequest,
		log: Log,
	) -> Result<(), ReconcileError> {
		let topics = log.topics().len();
		if topics != TRANSFER_TOPICS {
			// not a Transfer-shaped event; leave the order alone
			return Err(ReconcileError::InvalidEvent(format!(
				"expected {TRANSFER_TOPICS} topics, got {topics}"
			)));
		}

		match self.write_status(request, OrderStatus::Paid).await {
			Ok(()) => {
				tracing::info!(
					order_id = %truncate_id(&request.order_id),
					tx_hash = %truncate_id(&request.tx_hash),
					"settlement confirmed, order paid"
				);
				Ok(())
			}
			Err(StorageError::Precondition(detail)) => {
				tracing::warn!(
					order_id = %truncate_id(&request.order_id),
					detail,
					"order already reconciled, skipping duplicate delivery"
				);
				Ok(())
			}
			Err(update) => Err(ReconcileError::UpdateFailed(update)),
		}
	}

	/// Timeout and subscription-error branches: mark the order
	/// monitor_failed and report the trigger.
	async fn resolve_failed(
		&self,
		request: &MonitorRequest,
		trigger: ReconcileError,
	) -> Result<(), ReconcileError> {
		match self.write_status(request, OrderStatus::MonitorFailed).await {
			Ok(()) => Err(trigger),
			Err(StorageError::Precondition(detail)) => {
				tracing::warn!(
					order_id = %truncate_id(&request.order_id),
					detail,
					"order already reconciled, skipping duplicate delivery"
				);
				Ok(())
			}
			Err(update) => Err(ReconcileError::UpdateFailedAfter {
				trigger: Box::new(trigger),
				update,
			}),
		}
	}

	async fn write_status(
		&self,
		request: &MonitorRequest,
		status: OrderStatus,
	) -> Result<(), StorageError> {
		let orders = OrderStore::new(Arc::clone(&self.storage), request.table.clone());
		orders
			.update(
				&request.from,
				&request.order_id,
				OrderUpdate::new()
					.status(status)
					.payment_hash(request.tx_hash.clone())
					.require_status(OrderStatus::Pending),
			)
			.await
			.map(|_| ())
	}
}

fn watch_target(request: &MonitorRequest) -> Result<WatchTarget, ReconcileError> {
	let contract = request
		.contract
		.parse()
		.map_err(|_| ReconcileError::Decode(format!("bad contract address {}", request.contract)))?;
	let tx_hash: B256 = request
		.tx_hash
		.parse()
		.map_err(|_| ReconcileError::Decode(format!("bad transaction hash {}", request.tx_hash)))?;
	let topics = request
		.topics
		.iter()
		.map(|topic| {
			topic
				.parse::<B256>()
				.map_err(|_| ReconcileError::Decode(format!("bad topic {topic}")))
		})
		.collect::<Result<Vec<_>, _>>()?;

	Ok(WatchTarget {
		tx_hash,
		contract,
		topics,
		from_block: request.from_block,
	})
}
