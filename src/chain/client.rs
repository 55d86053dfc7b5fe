//!
//! Ethereum JSON-RPC adapter for the `Chain` collaborator.
//!
//! Requests go over HTTP with `reqwest`. Transport failures are retried with exponential backoff;
//! JSON-RPC error responses are returned to the caller as they are. Commits are sent with
//! `eth_sendTransaction` from an account the node manages, then the receipt is polled.

use super::abi::{
	ADMIN_FEE_CALL, BLOCK_FREEZE_SECONDS_CALL, OWNER_CALL, TOKEN_CALL, address_word,
	encode_commit, selector, u256_word,
};
use super::types::*;

use backoff::{ExponentialBackoff, future::retry};
use ethereum_types::{Address, H256, U256};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

const RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const RECEIPT_TIMEOUT: Duration = Duration::from_secs(300);
const MAX_RETRY_ELAPSED: Duration = Duration::from_secs(60);

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
	address: Address,
	topics: Vec<H256>,
	data: String,
	block_number: String,
	transaction_index: String,
	log_index: String,
}

/// JSON-RPC chain client
pub struct JsonRpcChainClient {
	/// The underlying HTTP client.
	http_client: Client,
	rpc_url: String,
	/// Account that signs commit transactions.
	sender: Option<Address>,
	request_id: AtomicU64,
}

impl JsonRpcChainClient {
	/// # Arguments
	/// * `rpc_url` - The node's HTTP JSON-RPC endpoint.
	/// * `sender` - Node-managed account used for `eth_sendTransaction`, if this client commits.
	pub fn new(rpc_url: String, sender: Option<Address>) -> Result<Self, ChainError> {
		let http_client = Client::builder().timeout(Duration::from_secs(30)).build()?;
		Ok(Self {
			http_client,
			rpc_url,
			sender,
			request_id: AtomicU64::new(1),
		})
	}

	/// Execute a JSON-RPC request and return its `result`.
	pub async fn execute_request(&self, method: &str, params: Value) -> Result<Value, ChainError> {
		let backoff = ExponentialBackoff {
			max_elapsed_time: Some(MAX_RETRY_ELAPSED),
			..ExponentialBackoff::default()
		};

		let response_json = retry(backoff, || async {
			let request_body = json!({
				"jsonrpc": "2.0",
				"id": self.request_id.fetch_add(1, Ordering::Relaxed),
				"method": method,
				"params": params.clone(),
			});

			let response = self
				.http_client
				.post(&self.rpc_url)
				.header("Content-Type", "application/json")
				.json(&request_body)
				.send()
				.await
				.map_err(|e| {
					warn!("RPC {} send error: {}", method, e);
					backoff::Error::transient(ChainError::HttpError(e))
				})?;

			let response = response.error_for_status().map_err(|e| {
				warn!("RPC {} HTTP error: {}", method, e);
				backoff::Error::transient(ChainError::HttpError(e))
			})?;

			let response_json: Value = response
				.json()
				.await
				.map_err(|e| backoff::Error::permanent(ChainError::HttpError(e)))?;
			Ok::<Value, backoff::Error<ChainError>>(response_json)
		})
		.await?;

		if let Some(error) = response_json.get("error") {
			return Err(ChainError::RpcError {
				code: error.get("code").and_then(|c| c.as_i64()).unwrap_or(0),
				message: error
					.get("message")
					.and_then(|m| m.as_str())
					.unwrap_or("unknown error")
					.to_string(),
			});
		}

		response_json
			.get("result")
			.cloned()
			.ok_or_else(|| ChainError::InvalidResponse(format!("{} returned no result", method)))
	}

	async fn call(&self, contract: Address, signature: &str) -> Result<Vec<u8>, ChainError> {
		let params = json!([
			{ "to": format!("{:#x}", contract), "data": to_hex(&selector(signature)) },
			"latest"
		]);
		let result = self.execute_request("eth_call", params).await?;
		parse_bytes(&result)
	}

	async fn wait_for_receipt(&self, transaction_hash: H256) -> Result<CommitReceipt, ChainError> {
		let deadline = tokio::time::Instant::now() + RECEIPT_TIMEOUT;
		loop {
			let receipt = self
				.execute_request(
					"eth_getTransactionReceipt",
					json!([format!("{:#x}", transaction_hash)]),
				)
				.await?;

			if !receipt.is_null() {
				let block_number = parse_quantity(&receipt["blockNumber"])?;
				if parse_quantity(&receipt["status"])? != 1 {
					return Err(ChainError::TransactionFailed(transaction_hash));
				}
				return Ok(CommitReceipt {
					transaction_hash,
					block_number,
				});
			}

			if tokio::time::Instant::now() >= deadline {
				return Err(ChainError::ReceiptTimeout(transaction_hash));
			}
			debug!("Waiting for receipt of {:?}", transaction_hash);
			tokio::time::sleep(RECEIPT_POLL_INTERVAL).await;
		}
	}
}

#[async_trait::async_trait]
impl Chain for JsonRpcChainClient {
	async fn get_code(&self, address: Address) -> Result<Vec<u8>, ChainError> {
		let result = self
			.execute_request("eth_getCode", json!([format!("{:#x}", address), "latest"]))
			.await?;
		parse_bytes(&result)
	}

	async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<RawLog>, ChainError> {
		let topics: Vec<Value> = filter
			.topics
			.iter()
			.map(|t| match t {
				Some(topic) => json!(format!("{:#x}", topic)),
				None => Value::Null,
			})
			.collect();
		let params = json!([{
			"address": format!("{:#x}", filter.address),
			"fromBlock": format!("{:#x}", filter.from_block),
			"toBlock": format!("{:#x}", filter.to_block),
			"topics": topics,
		}]);

		let result = self.execute_request("eth_getLogs", params).await?;
		let logs: Vec<RpcLog> = serde_json::from_value(result)?;
		debug!(
			"eth_getLogs {}..{} returned {} logs",
			filter.from_block,
			filter.to_block,
			logs.len()
		);

		logs.into_iter()
			.map(|log| {
				Ok(RawLog {
					address: log.address,
					topics: log.topics,
					data: decode_hex(&log.data)?,
					block_number: parse_quantity_str(&log.block_number)?,
					transaction_index: parse_quantity_str(&log.transaction_index)?,
					log_index: parse_quantity_str(&log.log_index)?,
				})
			})
			.collect()
	}

	async fn get_block_timestamp(&self, block_number: u64) -> Result<u64, ChainError> {
		let block = self
			.execute_request(
				"eth_getBlockByNumber",
				json!([format!("{:#x}", block_number), false]),
			)
			.await?;
		if block.is_null() {
			return Err(ChainError::InvalidResponse(format!(
				"Block {} not found",
				block_number
			)));
		}
		parse_quantity(&block["timestamp"])
	}

	async fn block_number(&self) -> Result<u64, ChainError> {
		let result = self.execute_request("eth_blockNumber", json!([])).await?;
		parse_quantity(&result)
	}

	async fn contract_params(&self, contract: Address) -> Result<ContractParams, ChainError> {
		let missing = |call: &str| ChainError::InvalidResponse(format!("{} returned no data", call));

		let token_address =
			address_word(&self.call(contract, TOKEN_CALL).await?, 0).ok_or_else(|| missing(TOKEN_CALL))?;
		let admin_address =
			address_word(&self.call(contract, OWNER_CALL).await?, 0).ok_or_else(|| missing(OWNER_CALL))?;
		let block_freeze_seconds = u256_word(&self.call(contract, BLOCK_FREEZE_SECONDS_CALL).await?, 0)
			.ok_or_else(|| missing(BLOCK_FREEZE_SECONDS_CALL))?;
		let admin_fee_fraction = u256_word(&self.call(contract, ADMIN_FEE_CALL).await?, 0)
			.ok_or_else(|| missing(ADMIN_FEE_CALL))?;

		if block_freeze_seconds > U256::from(u64::MAX) {
			return Err(ChainError::InvalidResponse(format!(
				"blockFreezeSeconds out of range: {}",
				block_freeze_seconds
			)));
		}

		Ok(ContractParams {
			token_address,
			admin_address,
			block_freeze_seconds: block_freeze_seconds.as_u64(),
			admin_fee_fraction,
		})
	}

	async fn send_commit(
		&self,
		contract: Address,
		block_number: u64,
		root_hash: H256,
		aux: &str,
	) -> Result<CommitReceipt, ChainError> {
		let sender = self.sender.ok_or(ChainError::MissingSender)?;
		let data = encode_commit(block_number, root_hash, aux);
		let params = json!([{
			"from": format!("{:#x}", sender),
			"to": format!("{:#x}", contract),
			"data": to_hex(&data),
		}]);

		let result = self.execute_request("eth_sendTransaction", params).await?;
		let transaction_hash: H256 = serde_json::from_value(result)?;
		info!(
			"Commit of block {} sent in transaction {:?}",
			block_number, transaction_hash
		);
		self.wait_for_receipt(transaction_hash).await
	}
}

fn to_hex(bytes: &[u8]) -> String {
	format!("0x{}", hex::encode(bytes))
}

fn decode_hex(text: &str) -> Result<Vec<u8>, ChainError> {
	let digits = text.strip_prefix("0x").unwrap_or(text);
	hex::decode(digits).map_err(|e| ChainError::InvalidResponse(format!("Bad hex data: {}", e)))
}

fn parse_bytes(value: &Value) -> Result<Vec<u8>, ChainError> {
	let text = value
		.as_str()
		.ok_or_else(|| ChainError::InvalidResponse(format!("Expected hex string, got {}", value)))?;
	decode_hex(text)
}

fn parse_quantity_str(text: &str) -> Result<u64, ChainError> {
	let digits = text.strip_prefix("0x").unwrap_or(text);
	u64::from_str_radix(digits, 16)
		.map_err(|e| ChainError::InvalidResponse(format!("Bad quantity {}: {}", text, e)))
}

fn parse_quantity(value: &Value) -> Result<u64, ChainError> {
	let text = value
		.as_str()
		.ok_or_else(|| ChainError::InvalidResponse(format!("Expected quantity, got {}", value)))?;
	parse_quantity_str(text)
}
