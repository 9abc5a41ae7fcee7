//! Contract binding for the token-checkout system.
//!
//! Pairs a JSON interface description (ABI) with a fixed on-chain address
//! and exposes call encoding, result decoding, and event topic lookups.
//! Pack and unpack failures indicate a binary-format mismatch between this
//! binding and the deployed contract, which is a programming error and is
//! never retried.

use alloy::dyn_abi::{DynSolValue, FunctionExt, JsonAbiExt};
use alloy::json_abi::JsonAbi;
use alloy::primitives::{Address, Bytes, B256};
use std::path::Path;
use thiserror::Error;

/// Errors that can occur while loading or using a contract binding.
#[derive(Debug, Error)]
pub enum ContractError {
	/// The contract address is not a well-formed 20-byte hex address.
	#[error("invalid contract address: {0}")]
	InvalidAddress(String),
	/// The interface description could not be read or parsed.
	#[error("failed to load interface description: {0}")]
	Abi(String),
	/// Encoding a call failed (unknown method or mismatched arguments).
	#[error("contract pack error: {0}")]
	Pack(String),
	/// Decoding a call result or event failed.
	#[error("contract unpack error: {0}")]
	Unpack(String),
}

/// A typed ABI plus the address of the deployed contract it describes.
pub struct Contract {
	abi: JsonAbi,
	address: Address,
}

impl Contract {
	/// Parses a JSON interface description and pairs it with the contract
	/// address.
	pub fn from_json(bytes: &[u8], address: &str) -> Result<Self, ContractError> {
		let abi: JsonAbi = serde_json::from_slice(bytes)
			.map_err(|e| ContractError::Abi(e.to_string()))?;
		let address = address
			.parse()
			.map_err(|_| ContractError::InvalidAddress(address.to_string()))?;
		Ok(Self { abi, address })
	}

	/// Reads the interface description from a file.
	pub fn from_file(path: impl AsRef<Path>, address: &str) -> Result<Self, ContractError> {
		let bytes = std::fs::read(path.as_ref()).map_err(|e| {
			ContractError::Abi(format!("{}: {}", path.as_ref().display(), e))
		})?;
		Self::from_json(&bytes, address)
	}

	/// The on-chain address of the bound contract.
	pub fn address(&self) -> Address {
		self.address
	}

	/// Encodes a call to `method` with the given arguments, selector
	/// included.
	pub fn encode_call(
		&self,
		method: &str,
		args: &[DynSolValue],
	) -> Result<Bytes, ContractError> {
		let function = self
			.abi
			.function(method)
			.and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == args.len()))
			.ok_or_else(|| {
				ContractError::Pack(format!("no method {} taking {} arguments", method, args.len()))
			})?;
		let encoded = function
			.abi_encode_input(args)
			.map_err(|e| ContractError::Pack(e.to_string()))?;
		Ok(encoded.into())
	}

	/// Decodes the return data of a call to `method`.
	pub fn decode_output(
		&self,
		method: &str,
		data: &[u8],
	) -> Result<Vec<DynSolValue>, ContractError> {
		let function = self
			.abi
			.function(method)
			.and_then(|overloads| overloads.first())
			.ok_or_else(|| ContractError::Unpack(format!("no method {method}")))?;
		function
			.abi_decode_output(data)
			.map_err(|e| ContractError::Unpack(e.to_string()))
	}

	/// Returns topic0 of the named event.
	pub fn event_topic(&self, event: &str) -> Result<B256, ContractError> {
		self.abi
			.event(event)
			.and_then(|overloads| overloads.first())
			.map(|e| e.selector())
			.ok_or_else(|| ContractError::Unpack(format!("no event {event}")))
	}
}
