//! In-process queue backend over an unbounded channel.
//!
//! Single-process stand-in for a managed queue service. Order is FIFO and
//! delivery is exactly-once here, which satisfies the at-least-once
//! contract consumers are written against.

use crate::{QueueError, QueueInterface};
use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

/// In-memory queue implementation.
pub struct MemoryQueue {
	sender: mpsc::UnboundedSender<Vec<u8>>,
	receiver: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

impl MemoryQueue {
	pub fn new() -> Self {
		let (sender, receiver) = mpsc::unbounded_channel();
		Self {
			sender,
			receiver: Mutex::new(receiver),
		}
	}
}

impl Default for MemoryQueue {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl QueueInterface for MemoryQueue {
	async fn enqueue(&self, body: Vec<u8>) -> Result<(), QueueError> {
		self.sender
			.send(body)
			.map_err(|e| QueueError::Backend(e.to_string()))
	}

	async fn dequeue(&self) -> Result<Vec<u8>, QueueError> {
		let mut receiver = self.receiver.lock().await;
		receiver.recv().await.ok_or(QueueError::Closed)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_fifo_delivery() {
		let queue = MemoryQueue::new();
		queue.enqueue(b"first".to_vec()).await.unwrap();
		queue.enqueue(b"second".to_vec()).await.unwrap();

		assert_eq!(queue.dequeue().await.unwrap(), b"first".to_vec());
		assert_eq!(queue.dequeue().await.unwrap(), b"second".to_vec());
	}
}
