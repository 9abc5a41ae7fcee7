//! Transaction hash representation.

use crate::utils::with_0x_prefix;
use alloy::primitives::B256;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Blockchain transaction hash stored as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHash(pub Vec<u8>);

impl TransactionHash {
	/// 0x-prefixed lowercase hex form, the shape persisted on orders.
	pub fn to_hex(&self) -> String {
		with_0x_prefix(&hex::encode(&self.0))
	}
}

impl From<B256> for TransactionHash {
	fn from(hash: B256) -> Self {
		Self(hash.0.to_vec())
	}
}

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_hex())
	}
}
