//! Message queue module for the token-checkout system.
//!
//! Settlement hands reconciliation work to an asynchronous worker through
//! a queue with at-least-once delivery and JSON message bodies. This
//! module defines the queue abstraction, the in-process backend, and a
//! typed wrapper for JSON payloads. Duplicate delivery is the consumer's
//! problem: reconciliation writes are conditioned so replays are no-ops.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

/// Re-export implementations
pub mod implementations {
	pub mod memory;
}

/// Errors that can occur during queue operations.
#[derive(Debug, Error)]
pub enum QueueError {
	/// The queue rejected or lost the message.
	#[error("queue backend error: {0}")]
	Backend(String),
	/// The queue is closed and no further messages will arrive.
	#[error("queue closed")]
	Closed,
	/// A message body could not be encoded or decoded.
	#[error("serialization error: {0}")]
	Serialization(String),
}

/// Trait defining the interface for queue backends.
///
/// Delivery is at-least-once: a body handed to `enqueue` is delivered to
/// some consumer one or more times, in roughly FIFO order.
#[async_trait]
pub trait QueueInterface: Send + Sync {
	/// Enqueues one raw message body.
	async fn enqueue(&self, body: Vec<u8>) -> Result<(), QueueError>;

	/// Waits for and returns the next message body.
	///
	/// Returns [`QueueError::Closed`] once the queue has shut down and
	/// drained.
	async fn dequeue(&self) -> Result<Vec<u8>, QueueError>;
}

/// Typed queue wrapper that serializes messages as JSON.
pub struct QueueService {
	backend: Box<dyn QueueInterface>,
}

impl QueueService {
	pub fn new(backend: Box<dyn QueueInterface>) -> Self {
		Self { backend }
	}

	/// Serializes and enqueues one message.
	pub async fn send<T: Serialize>(&self, message: &T) -> Result<(), QueueError> {
		let body =
			serde_json::to_vec(message).map_err(|e| QueueError::Serialization(e.to_string()))?;
		self.backend.enqueue(body).await
	}

	/// Waits for the next message and deserializes it.
	pub async fn receive<T: DeserializeOwned>(&self) -> Result<T, QueueError> {
		let body = self.backend.dequeue().await?;
		serde_json::from_slice(&body).map_err(|e| QueueError::Serialization(e.to_string()))
	}

	/// Waits for the next raw message body.
	pub async fn receive_raw(&self) -> Result<Vec<u8>, QueueError> {
		self.backend.dequeue().await
	}
}
