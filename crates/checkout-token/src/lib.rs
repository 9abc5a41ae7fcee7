//! Token transfer service for the token-checkout system.
//!
//! Builds, signs, and submits ERC-20 `transfer` and `approve` transactions
//! against the bound token contract, answers balance and allowance
//! queries, and exposes a long-lived subscription over the contract's
//! Transfer event.
//!
//! Two submission paths exist. With a server-held key the service quotes
//! gas from the network where the request leaves it unset and signs
//! locally. With a client-supplied detached signature the gas fields are
//! mandatory, because the client signed a payload with those exact values
//! baked in; the service rebuilds that payload, attaches the signature,
//! and recovers the signer address from it. The recovered address must
//! equal the claimed `from` address — that comparison is what lets the
//! server accept a signature without ever holding the client's key.
//! Either way both paths produce byte-identical unsigned EIP-1559
//! payloads.

use alloy::consensus::{SignableTransaction, Signed, TxEip1559, TxEnvelope};
use alloy::dyn_abi::DynSolValue;
use alloy::eips::eip2718::Encodable2718;
use alloy::primitives::{Address, Bytes, Signature, TxKind, U256};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use checkout_chain::{ChainClient, ChainError};
use checkout_contract::{Contract, ContractError};
use checkout_types::amount::{to_base_units, AmountError};
use checkout_types::{without_0x_prefix, AllowanceRequest, TransactionHash, TransferRequest};
use std::sync::Arc;
use thiserror::Error;

mod subscribe;

pub use subscribe::TransferSubscription;

pub const TRANSFER: &str = "transfer";
pub const BALANCE_OF: &str = "balanceOf";
pub const APPROVE: &str = "approve";
pub const ALLOWANCE: &str = "allowance";

pub const EVENT_TRANSFER: &str = "Transfer";

/// Errors that can occur during token operations.
#[derive(Debug, Error)]
pub enum TokenError {
	/// A from/to address is missing or not a 20-byte hex address.
	#[error("invalid address: {0}")]
	InvalidAddress(String),
	/// The transfer amount is zero, negative, or unrepresentable.
	#[error("invalid amount: {0}")]
	InvalidAmount(String),
	/// The gas limit field is missing or not a base-10 integer.
	#[error("invalid gas limit")]
	InvalidGasLimit,
	/// The gas fee cap field is missing or not a base-10 integer.
	#[error("invalid gas fee cap")]
	InvalidGasFeeCap,
	/// The gas tip cap field is missing or not a base-10 integer.
	#[error("invalid gas tip cap")]
	InvalidGasTipCap,
	/// The signature is missing, malformed, or recovers to the wrong
	/// address.
	#[error("invalid signature: {0}")]
	InvalidSignature(String),
	/// Local signing failed.
	#[error("signing failed: {0}")]
	Sign(String),
	/// Call encoding or result decoding failed. Never retried.
	#[error(transparent)]
	Contract(#[from] ContractError),
	/// Chain RPC failure. The caller may retry the whole attempt as long
	/// as nothing was submitted.
	#[error(transparent)]
	Chain(#[from] ChainError),
}

impl From<AmountError> for TokenError {
	fn from(err: AmountError) -> Self {
		TokenError::InvalidAmount(err.to_string())
	}
}

/// Resolved EIP-1559 fee parameters for one transaction.
struct GasParams {
	limit: u64,
	fee_cap: u128,
	tip_cap: u128,
}

/// A validated, encoded token call ready for fee resolution.
struct PreparedCall {
	from: Address,
	amount: U256,
	data: Bytes,
}

/// Returns a request field treating empty strings as unset.
fn field(value: &Option<String>) -> Option<&str> {
	value.as_deref().filter(|s| !s.is_empty())
}

fn parse_address(value: &str) -> Result<Address, TokenError> {
	if value.is_empty() {
		return Err(TokenError::InvalidAddress("empty address".to_string()));
	}
	value
		.parse()
		.map_err(|_| TokenError::InvalidAddress(value.to_string()))
}

/// Service executing token operations against one bound contract.
pub struct TokenService {
	chain: Arc<dyn ChainClient>,
	contract: Contract,
	chain_id: u64,
	decimals: u8,
}

impl TokenService {
	pub fn new(chain: Arc<dyn ChainClient>, contract: Contract, chain_id: u64, decimals: u8) -> Self {
		Self {
			chain,
			contract,
			chain_id,
			decimals,
		}
	}

	/// Address of the bound token contract.
	pub fn contract_address(&self) -> Address {
		self.contract.address()
	}

	/// Topic0 of the contract's Transfer event.
	pub fn transfer_topic(&self) -> Result<alloy::primitives::B256, TokenError> {
		Ok(self.contract.event_topic(EVENT_TRANSFER)?)
	}

	/// Submits a `transfer` signed with a server-held key.
	pub async fn transfer_with_key(
		&self,
		request: &TransferRequest,
		key: &PrivateKeySigner,
	) -> Result<TransactionHash, TokenError> {
		let call = self.prepare_call(request, TRANSFER)?;
		if call.amount.is_zero() {
			return Err(TokenError::InvalidAmount("transfer amount is zero".to_string()));
		}
		self.submit_with_key(request, call, key).await
	}

	/// Submits a `transfer` carrying a client-produced signature.
	pub async fn transfer_with_signature(
		&self,
		request: &TransferRequest,
	) -> Result<TransactionHash, TokenError> {
		let call = self.prepare_call(request, TRANSFER)?;
		if call.amount.is_zero() {
			return Err(TokenError::InvalidAmount("transfer amount is zero".to_string()));
		}
		self.submit_with_signature(request, call).await
	}

	/// Submits an `approve` signed with a server-held key.
	pub async fn approve_with_key(
		&self,
		request: &TransferRequest,
		key: &PrivateKeySigner,
	) -> Result<TransactionHash, TokenError> {
		let call = self.prepare_call(request, APPROVE)?;
		self.submit_with_key(request, call, key).await
	}

	/// Submits an `approve` carrying a client-produced signature.
	pub async fn approve_with_signature(
		&self,
		request: &TransferRequest,
	) -> Result<TransactionHash, TokenError> {
		let call = self.prepare_call(request, APPROVE)?;
		self.submit_with_signature(request, call).await
	}

	/// Queries the token balance of an address.
	pub async fn balance_of(&self, address: &str) -> Result<U256, TokenError> {
		let account = parse_address(address)?;
		let data = self
			.contract
			.encode_call(BALANCE_OF, &[DynSolValue::Address(account)])?;
		let output = self.read_call(account, data).await?;
		let fields = self.contract.decode_output(BALANCE_OF, &output)?;
		fields
			.first()
			.and_then(|value| value.as_uint())
			.map(|(balance, _)| balance)
			.ok_or_else(|| {
				TokenError::Contract(ContractError::Unpack("balance field not found".to_string()))
			})
	}

	/// Queries how much `request.to` may spend on behalf of
	/// `request.from`.
	pub async fn check_allowance(&self, request: &AllowanceRequest) -> Result<U256, TokenError> {
		let owner = parse_address(&request.from)?;
		let spender = parse_address(&request.to)?;
		let data = self.contract.encode_call(
			ALLOWANCE,
			&[DynSolValue::Address(owner), DynSolValue::Address(spender)],
		)?;
		let output = self.read_call(owner, data).await?;
		let fields = self.contract.decode_output(ALLOWANCE, &output)?;
		fields
			.first()
			.and_then(|value| value.as_uint())
			.map(|(allowance, _)| allowance)
			.ok_or_else(|| {
				TokenError::Contract(ContractError::Unpack(
					"allowance field not found".to_string(),
				))
			})
	}

	/// Opens a Transfer event subscription starting at `from_block`.
	///
	/// The callback runs once per matching log until the subscription is
	/// cancelled or the underlying log fetch fails; a failure is reported
	/// once through the returned handle and ends the subscription.
	pub fn subscribe_transfer<F>(
		&self,
		from_block: u64,
		process: F,
	) -> Result<TransferSubscription, TokenError>
	where
		F: Fn(alloy::rpc::types::Log) + Send + 'static,
	{
		let topic = self.contract.event_topic(EVENT_TRANSFER)?;
		Ok(subscribe::spawn(
			Arc::clone(&self.chain),
			self.contract.address(),
			topic,
			from_block,
			process,
		))
	}

	/// Validates the request addresses and encodes the token call.
	fn prepare_call(
		&self,
		request: &TransferRequest,
		method: &str,
	) -> Result<PreparedCall, TokenError> {
		let from = parse_address(&request.from)?;
		let to = parse_address(&request.to)?;
		let amount = to_base_units(request.amount, self.decimals)?;
		let data = self.contract.encode_call(
			method,
			&[DynSolValue::Address(to), DynSolValue::Uint(amount, 256)],
		)?;
		Ok(PreparedCall { from, amount, data })
	}

	/// Resolves gas parameters, querying the network for any the request
	/// leaves unset.
	async fn resolve_gas_with_network(
		&self,
		request: &TransferRequest,
		call: &PreparedCall,
	) -> Result<GasParams, TokenError> {
		let limit = match field(&request.gas) {
			Some(value) => value.parse().map_err(|_| TokenError::InvalidGasLimit)?,
			None => {
				let mut estimate = TransactionRequest::default()
					.to(self.contract.address())
					.input(call.data.clone().into());
				estimate.from = Some(call.from);
				self.chain.estimate_gas(&estimate).await?
			}
		};
		let fee_cap = match field(&request.gas_fee_cap) {
			Some(value) => value.parse().map_err(|_| TokenError::InvalidGasFeeCap)?,
			None => self.chain.suggest_fee_cap().await?,
		};
		let tip_cap = match field(&request.gas_tip_cap) {
			Some(value) => value.parse().map_err(|_| TokenError::InvalidGasTipCap)?,
			None => self.chain.suggest_tip_cap().await?,
		};
		Ok(GasParams {
			limit,
			fee_cap,
			tip_cap,
		})
	}

	/// Resolves gas parameters from the request alone.
	///
	/// Externally-signed transactions cannot be re-priced by the server,
	/// so every field is mandatory here.
	fn resolve_gas_from_request(&self, request: &TransferRequest) -> Result<GasParams, TokenError> {
		let limit = field(&request.gas)
			.ok_or(TokenError::InvalidGasLimit)?
			.parse()
			.map_err(|_| TokenError::InvalidGasLimit)?;
		let fee_cap = field(&request.gas_fee_cap)
			.ok_or(TokenError::InvalidGasFeeCap)?
			.parse()
			.map_err(|_| TokenError::InvalidGasFeeCap)?;
		let tip_cap = field(&request.gas_tip_cap)
			.ok_or(TokenError::InvalidGasTipCap)?
			.parse()
			.map_err(|_| TokenError::InvalidGasTipCap)?;
		Ok(GasParams {
			limit,
			fee_cap,
			tip_cap,
		})
	}

	fn build_transaction(&self, nonce: u64, gas: GasParams, data: Bytes) -> TxEip1559 {
		TxEip1559 {
			chain_id: self.chain_id,
			nonce,
			gas_limit: gas.limit,
			max_fee_per_gas: gas.fee_cap,
			max_priority_fee_per_gas: gas.tip_cap,
			to: TxKind::Call(self.contract.address()),
			value: U256::ZERO,
			access_list: Default::default(),
			input: data,
		}
	}

	async fn submit_with_key(
		&self,
		request: &TransferRequest,
		call: PreparedCall,
		key: &PrivateKeySigner,
	) -> Result<TransactionHash, TokenError> {
		let gas = self.resolve_gas_with_network(request, &call).await?;
		let tx = self.build_transaction(request.nonce, gas, call.data);
		let signature = key
			.sign_hash_sync(&tx.signature_hash())
			.map_err(|e| TokenError::Sign(e.to_string()))?;
		self.submit(tx.into_signed(signature)).await
	}

	async fn submit_with_signature(
		&self,
		request: &TransferRequest,
		call: PreparedCall,
	) -> Result<TransactionHash, TokenError> {
		let signature_hex = field(&request.signature)
			.ok_or_else(|| TokenError::InvalidSignature("signature field is empty".to_string()))?;
		let gas = self.resolve_gas_from_request(request)?;
		let tx = self.build_transaction(request.nonce, gas, call.data);

		let raw = hex::decode(without_0x_prefix(signature_hex))
			.map_err(|e| TokenError::InvalidSignature(e.to_string()))?;
		let signature = Signature::from_raw(&raw)
			.map_err(|e| TokenError::InvalidSignature(e.to_string()))?;

		// The trust boundary: the signature must recover to the claimed
		// sender over exactly the payload we are about to submit.
		let recovered = signature
			.recover_address_from_prehash(&tx.signature_hash())
			.map_err(|e| TokenError::InvalidSignature(e.to_string()))?;
		if recovered != call.from {
			return Err(TokenError::InvalidSignature(format!(
				"signature recovers to {recovered}, request is from {}",
				call.from
			)));
		}

		self.submit(tx.into_signed(signature)).await
	}

	async fn submit(&self, signed: Signed<TxEip1559>) -> Result<TransactionHash, TokenError> {
		let hash = *signed.hash();
		let envelope = TxEnvelope::Eip1559(signed);
		self.chain
			.send_raw_transaction(&envelope.encoded_2718())
			.await?;
		tracing::info!(tx_hash = %TransactionHash::from(hash), "submitted token transaction");
		Ok(TransactionHash::from(hash))
	}

	async fn read_call(&self, from: Address, data: Bytes) -> Result<Bytes, TokenError> {
		let mut call = TransactionRequest::default()
			.to(self.contract.address())
			.input(data.into());
		call.from = Some(from);
		Ok(self.chain.call(&call).await?)
	}
}

#[cfg(test)]
pub(crate) mod test_support;
