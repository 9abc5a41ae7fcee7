//! Shared fixtures for token service tests: a canned ERC-20 binding and a
//! mock chain that records submissions.

use crate::{TokenService, TRANSFER};
use alloy::consensus::{SignableTransaction, TxEip1559};
use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{keccak256, Address, Bytes, LogData, TxKind, B256, U256};
use alloy::rpc::types::{Filter, Log, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use async_trait::async_trait;
use checkout_chain::{ChainClient, ChainError};
use checkout_contract::Contract;
use checkout_types::{to_base_units, TransferRequest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

pub(crate) const OWNER: &str = "0x1111111111111111111111111111111111111111";
pub(crate) const RECIPIENT: &str = "0x2222222222222222222222222222222222222222";
pub(crate) const TOKEN: &str = "0x5fbdb2315678afecb367f032d93f642f64180aa3";
pub(crate) const CHAIN_ID: u64 = 31337;
pub(crate) const DECIMALS: u8 = 6;

pub(crate) const ERC20_ABI: &str = r#"[
	{"type":"function","name":"transfer","stateMutability":"nonpayable",
	 "inputs":[{"name":"to","type":"address"},{"name":"amount","type":"uint256"}],
	 "outputs":[{"name":"","type":"bool"}]},
	{"type":"function","name":"approve","stateMutability":"nonpayable",
	 "inputs":[{"name":"spender","type":"address"},{"name":"amount","type":"uint256"}],
	 "outputs":[{"name":"","type":"bool"}]},
	{"type":"function","name":"balanceOf","stateMutability":"view",
	 "inputs":[{"name":"account","type":"address"}],
	 "outputs":[{"name":"balance","type":"uint256"}]},
	{"type":"function","name":"allowance","stateMutability":"view",
	 "inputs":[{"name":"owner","type":"address"},{"name":"spender","type":"address"}],
	 "outputs":[{"name":"remaining","type":"uint256"}]},
	{"type":"event","name":"Transfer","anonymous":false,
	 "inputs":[{"name":"from","type":"address","indexed":true},
	           {"name":"to","type":"address","indexed":true},
	           {"name":"value","type":"uint256","indexed":false}]}
]"#;

pub(crate) fn test_contract() -> Contract {
	Contract::from_json(ERC20_ABI.as_bytes(), TOKEN).unwrap()
}

/// Mock chain recording raw submissions and serving canned responses.
pub(crate) struct MockChain {
	call_output: Mutex<Vec<u8>>,
	sent: Mutex<Vec<Vec<u8>>>,
	logs: Mutex<Vec<Log>>,
	logs_fail: AtomicBool,
	block: u64,
}

impl MockChain {
	pub(crate) fn new() -> Self {
		Self {
			call_output: Mutex::new(Vec::new()),
			sent: Mutex::new(Vec::new()),
			logs: Mutex::new(Vec::new()),
			logs_fail: AtomicBool::new(false),
			block: 100,
		}
	}

	pub(crate) fn set_call_output(&self, bytes: Vec<u8>) {
		*self.call_output.lock().unwrap() = bytes;
	}

	pub(crate) fn sent(&self) -> Vec<Vec<u8>> {
		self.sent.lock().unwrap().clone()
	}

	pub(crate) fn push_log(&self, log: Log) {
		self.logs.lock().unwrap().push(log);
	}

	pub(crate) fn fail_logs(&self) {
		self.logs_fail.store(true, Ordering::SeqCst);
	}
}

#[async_trait]
impl ChainClient for MockChain {
	async fn chain_id(&self) -> Result<u64, ChainError> {
		Ok(CHAIN_ID)
	}

	async fn pending_nonce(&self, _address: Address) -> Result<u64, ChainError> {
		Ok(3)
	}

	async fn estimate_gas(&self, _tx: &TransactionRequest) -> Result<u64, ChainError> {
		Ok(60_000)
	}

	async fn suggest_fee_cap(&self) -> Result<u128, ChainError> {
		Ok(30_000_000_000)
	}

	async fn suggest_tip_cap(&self) -> Result<u128, ChainError> {
		Ok(1_500_000_000)
	}

	async fn call(&self, _tx: &TransactionRequest) -> Result<Bytes, ChainError> {
		Ok(Bytes::from(self.call_output.lock().unwrap().clone()))
	}

	async fn send_raw_transaction(&self, encoded: &[u8]) -> Result<B256, ChainError> {
		self.sent.lock().unwrap().push(encoded.to_vec());
		Ok(keccak256(encoded))
	}

	async fn logs(&self, _filter: &Filter) -> Result<Vec<Log>, ChainError> {
		if self.logs_fail.load(Ordering::SeqCst) {
			return Err(ChainError::Rpc("subscription lost".to_string()));
		}
		Ok(self.logs.lock().unwrap().clone())
	}

	async fn block_number(&self) -> Result<u64, ChainError> {
		Ok(self.block)
	}
}

pub(crate) fn test_service() -> (TokenService, Arc<MockChain>) {
	let chain = Arc::new(MockChain::new());
	let service = TokenService::new(
		Arc::clone(&chain) as Arc<dyn ChainClient>,
		test_contract(),
		CHAIN_ID,
		DECIMALS,
	);
	(service, chain)
}

/// Builds a Transfer log carrying the given transaction hash and number
/// of indexed topics.
pub(crate) fn transfer_log(tx_hash: B256, topics: usize) -> Log {
	let topic_list: Vec<B256> = (0..topics).map(|i| B256::repeat_byte(i as u8)).collect();
	Log {
		inner: alloy::primitives::Log {
			address: TOKEN.parse().unwrap(),
			data: LogData::new_unchecked(topic_list, Bytes::new()),
		},
		block_hash: None,
		block_number: Some(100),
		block_timestamp: None,
		transaction_hash: Some(tx_hash),
		transaction_index: None,
		log_index: None,
		removed: false,
	}
}

/// Builds a fully-priced transfer request whose detached signature is
/// produced by `signing` while the claimed sender is `claimed`.
pub(crate) fn signed_request(
	service: &TokenService,
	claimed: &PrivateKeySigner,
	signing: &PrivateKeySigner,
) -> TransferRequest {
	let amount = to_base_units(100.0, DECIMALS).unwrap();
	let recipient: Address = RECIPIENT.parse().unwrap();
	let data = test_contract()
		.encode_call(
			TRANSFER,
			&[
				DynSolValue::Address(recipient),
				DynSolValue::Uint(amount, 256),
			],
		)
		.unwrap();

	// the exact unsigned payload the service will rebuild server-side
	let tx = TxEip1559 {
		chain_id: CHAIN_ID,
		nonce: 7,
		gas_limit: 60_000,
		max_fee_per_gas: 30_000_000_000,
		max_priority_fee_per_gas: 1_500_000_000,
		to: TxKind::Call(service.contract_address()),
		value: U256::ZERO,
		access_list: Default::default(),
		input: data,
	};
	let signature = signing.sign_hash_sync(&tx.signature_hash()).unwrap();

	TransferRequest {
		from: claimed.address().to_string(),
		to: RECIPIENT.to_string(),
		amount: 100.0,
		nonce: 7,
		signature: Some(hex::encode(signature.as_bytes())),
		gas_tip_cap: Some("1500000000".to_string()),
		gas_fee_cap: Some("30000000000".to_string()),
		gas: Some("60000".to_string()),
	}
}
