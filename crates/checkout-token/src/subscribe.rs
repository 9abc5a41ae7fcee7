//! Background Transfer-event subscription.
//!
//! The subscription is a spawned task scanning filtered logs forward from
//! a starting block. It communicates exclusively through channels: logs go
//! to the caller's callback, at most one terminal error goes to the error
//! channel, and cancellation comes in through a stop signal. The short
//! poll tick keeps the loop responsive to cancellation even when the
//! chain is quiet.

use crate::TokenError;
use checkout_chain::{CancelHandle, ChainClient};
use alloy::primitives::{Address, B256};
use alloy::rpc::types::{Filter, Log};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Handle to a running Transfer-event subscription.
pub struct TransferSubscription {
	cancel: CancelHandle,
	errors: mpsc::Receiver<TokenError>,
}

impl TransferSubscription {
	/// Stops the subscription. Safe to call any number of times.
	pub fn cancel(&self) {
		self.cancel.cancel();
	}

	/// Waits for the subscription to fail.
	///
	/// Yields at most one error; returns `None` once the subscription has
	/// ended without one (cancelled).
	pub async fn next_error(&mut self) -> Option<TokenError> {
		self.errors.recv().await
	}
}

/// Spawns the subscription task and returns its handle.
pub(crate) fn spawn<F>(
	chain: Arc<dyn ChainClient>,
	address: Address,
	topic: B256,
	from_block: u64,
	process: F,
) -> TransferSubscription
where
	F: Fn(Log) + Send + 'static,
{
	let (stop_tx, stop_rx) = mpsc::channel(1);
	let (error_tx, error_rx) = mpsc::channel(1);
	tokio::spawn(run(
		chain, address, topic, from_block, process, stop_rx, error_tx,
	));
	TransferSubscription {
		cancel: CancelHandle::new(stop_tx),
		errors: error_rx,
	}
}

async fn run<F>(
	chain: Arc<dyn ChainClient>,
	address: Address,
	topic: B256,
	from_block: u64,
	process: F,
	mut stop: mpsc::Receiver<()>,
	errors: mpsc::Sender<TokenError>,
) where
	F: Fn(Log) + Send + 'static,
{
	let mut interval = tokio::time::interval(POLL_INTERVAL);
	interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
	let mut next_block = from_block;

	loop {
		tokio::select! {
			_ = interval.tick() => {
				let current = match chain.block_number().await {
					Ok(block) => block,
					Err(e) => {
						let _ = errors.send(e.into()).await;
						return;
					}
				};
				if current < next_block {
					continue;
				}

				let filter = Filter::new()
					.address(address)
					.event_signature(topic)
					.from_block(next_block)
					.to_block(current);
				let logs = match chain.logs(&filter).await {
					Ok(logs) => logs,
					Err(e) => {
						let _ = errors.send(e.into()).await;
						return;
					}
				};

				for log in logs {
					process(log);
				}
				next_block = current + 1;
			}
			_ = stop.recv() => {
				return;
			}
		}
	}
}
