//! Filtered log watch for one target transaction.
//!
//! The watch scans logs matching a contract and topic filter, forward
//! from a starting block, for the single log whose transaction hash
//! equals the target. It delivers exactly one terminal signal: the
//! matching log, or the error that ended the scan. After cancellation
//! nothing is ever delivered. Consumers multiplex the two channels with
//! their own deadline and must not double-handle a result.

use checkout_chain::{CancelHandle, ChainClient, ChainError};
use alloy::primitives::{Address, B256};
use alloy::rpc::types::{Filter, Log};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// What the watch is looking for.
#[derive(Debug, Clone)]
pub struct WatchTarget {
	/// Transaction hash that ends the watch on first sight.
	pub tx_hash: B256,
	/// Contract address the logs must come from.
	pub contract: Address,
	/// Topic0 alternatives to filter on; empty means any.
	pub topics: Vec<B256>,
	/// Block to start scanning from.
	pub from_block: u64,
}

/// Handle to a running log watch.
///
/// At most one of `matched` and `failed` ever yields a value; the other
/// channel closes when the background task exits.
pub struct LogWatch {
	/// Resolves with the matching log.
	pub matched: oneshot::Receiver<Log>,
	/// Resolves with the error that terminated the watch.
	pub failed: oneshot::Receiver<ChainError>,
	cancel: CancelHandle,
}

impl LogWatch {
	/// Requests early termination. Safe to call any number of times.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}
}

/// Spawns a log watch for the given target.
pub fn watch(chain: Arc<dyn ChainClient>, target: WatchTarget) -> LogWatch {
	let (matched_tx, matched_rx) = oneshot::channel();
	let (failed_tx, failed_rx) = oneshot::channel();
	let (stop_tx, stop_rx) = mpsc::channel(1);

	tokio::spawn(run(chain, target, matched_tx, failed_tx, stop_rx));

	LogWatch {
		matched: matched_rx,
		failed: failed_rx,
		cancel: CancelHandle::new(stop_tx),
	}
}

async fn run(
	chain: Arc<dyn ChainClient>,
	target: WatchTarget,
	matched: oneshot::Sender<Log>,
	failed: oneshot::Sender<ChainError>,
	mut stop: mpsc::Receiver<()>,
) {
	let mut matched = Some(matched);
	let mut failed = Some(failed);
	let mut interval = tokio::time::interval(POLL_INTERVAL);
	interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
	let mut next_block = target.from_block;

	loop {
		tokio::select! {
			_ = interval.tick() => {
				let current = match chain.block_number().await {
					Ok(block) => block,
					Err(e) => {
						if let Some(failed) = failed.take() {
							let _ = failed.send(e);
						}
						return;
					}
				};
				if current < next_block {
					continue;
				}

				let mut filter = Filter::new()
					.address(target.contract)
					.from_block(next_block)
					.to_block(current);
				if !target.topics.is_empty() {
					filter = filter.event_signature(target.topics.clone());
				}

				let logs = match chain.logs(&filter).await {
					Ok(logs) => logs,
					Err(e) => {
						if let Some(failed) = failed.take() {
							let _ = failed.send(e);
						}
						return;
					}
				};

				for log in logs {
					if log.transaction_hash == Some(target.tx_hash) {
						if let Some(matched) = matched.take() {
							let _ = matched.send(log);
						}
						return;
					}
				}
				next_block = current + 1;
			}
			_ = stop.recv() => {
				return;
			}
		}
	}
}
