//! Transfer and monitor request payloads.
//!
//! [`TransferRequest`] is the per-request transfer intent a client submits
//! when paying an order. [`MonitorRequest`] is the queue message that asks
//! the reconciliation worker to watch the chain for one specific
//! transaction.

use serde::{Deserialize, Serialize};

/// A token transfer (or approval) intent.
///
/// Gas parameters are base-10 integer strings. When `signature` is set the
/// transfer was signed client-side and all three gas fields are mandatory,
/// since the server must rebuild exactly the payload the client signed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransferRequest {
	/// Sender address.
	pub from: String,
	/// Recipient address.
	pub to: String,
	/// Amount in human decimal token units.
	pub amount: f64,
	/// Sender account nonce the transaction must use.
	pub nonce: u64,
	/// Detached 65-byte hex signature, when signed client-side.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub signature: Option<String>,
	/// EIP-1559 priority fee cap in wei.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub gas_tip_cap: Option<String>,
	/// EIP-1559 total fee cap in wei.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub gas_fee_cap: Option<String>,
	/// Gas limit.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub gas: Option<String>,
}

/// An allowance query: how much may `to` spend on behalf of `from`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowanceRequest {
	pub from: String,
	pub to: String,
}

/// Queue message asking the worker to reconcile one settlement attempt.
///
/// Created once per attempt and consumed until it produces a single
/// reconciliation outcome. Queue delivery is at-least-once, so consumers
/// must tolerate duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorRequest {
	/// Order being settled.
	pub order_id: String,
	/// Backing store table holding the order record.
	pub table: String,
	/// Token contract address emitting the expected event.
	pub contract: String,
	/// Topic filter for the log subscription, hex encoded.
	pub topics: Vec<String>,
	/// Address that submitted the transfer.
	pub from: String,
	/// Block to start scanning from.
	pub from_block: u64,
	/// Transaction hash the monitor is waiting for.
	pub tx_hash: String,
}
