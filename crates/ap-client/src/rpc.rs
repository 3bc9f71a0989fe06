//! json-rpc event source
//!
//! reads `DepositData`/`WithdrawalData` from the trees contract and
//! `NewAccount` from the miner with `eth_getLogs`, and the current rate table
//! with `eth_call`.

use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_sol_types::{sol, SolCall, SolEvent};
use ap_core::{AccountEvent, TreeEvent};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::controller::RateSource;
use crate::error::{ClientError, Result};
use crate::source::EventSource;

sol! {
    event DepositData(address instance, bytes32 indexed hash, uint256 block, uint256 index);
    event WithdrawalData(address instance, bytes32 indexed hash, uint256 block, uint256 index);
    event NewAccount(bytes32 commitment, bytes32 nullifier, bytes encryptedAccount, uint256 index);

    function rates(address instance) external view returns (uint256);
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcConfig {
    #[serde(default = "default_url")]
    pub url: String,
    pub miner_address: Address,
    pub trees_address: Address,
    /// first block to scan for events
    #[serde(default)]
    pub from_block: u64,
}

fn default_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

#[derive(Clone, Debug, Deserialize)]
pub struct RpcLog {
    pub topics: Vec<B256>,
    pub data: Bytes,
}

#[derive(Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Clone)]
pub struct RpcEventSource {
    config: RpcConfig,
    client: Client,
}

impl RpcEventSource {
    pub fn new(config: RpcConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    async fn call(&self, method: &str, params: Vec<Value>) -> Result<Value> {
        let payload = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.config.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?;

        let json: RpcResponse = response
            .json()
            .await
            .map_err(|e| ClientError::Rpc(e.to_string()))?;

        if let Some(error) = json.error {
            return Err(ClientError::Rpc(format!(
                "RPC error {}: {}",
                error.code, error.message
            )));
        }

        json.result
            .ok_or_else(|| ClientError::Rpc("no result in response".into()))
    }

    async fn get_logs(&self, address: Address, topic: B256) -> Result<Vec<RpcLog>> {
        let filter = json!({
            "address": address,
            "topics": [topic],
            "fromBlock": format!("{:#x}", self.config.from_block),
            "toBlock": "latest",
        });
        let result = self.call("eth_getLogs", vec![filter]).await?;
        let logs: Vec<RpcLog> = serde_json::from_value(result).map_err(|e| ClientError::Decode {
            what: "logs",
            reason: e.to_string(),
        })?;
        debug!(%address, %topic, count = logs.len(), "fetched logs");
        Ok(logs)
    }

    pub async fn block_number(&self) -> Result<u64> {
        let result = self.call("eth_blockNumber", vec![]).await?;
        let hex: String = serde_json::from_value(result).map_err(|e| ClientError::Decode {
            what: "block number",
            reason: e.to_string(),
        })?;
        u64::from_str_radix(hex.trim_start_matches("0x"), 16).map_err(|e| ClientError::Decode {
            what: "block number",
            reason: e.to_string(),
        })
    }

    pub async fn rate(&self, instance: Address) -> Result<U256> {
        let data = Bytes::from(ratesCall { instance }.abi_encode());
        let tx = json!({ "to": self.config.miner_address, "data": data });
        let result = self.call("eth_call", vec![tx, json!("latest")]).await?;
        let raw: Bytes = serde_json::from_value(result).map_err(|e| ClientError::Decode {
            what: "rates return",
            reason: e.to_string(),
        })?;
        let decoded = ratesCall::abi_decode_returns(&raw, true).map_err(|e| ClientError::Decode {
            what: "rates return",
            reason: e.to_string(),
        })?;
        Ok(decoded._0)
    }
}

fn small(value: U256, what: &'static str) -> Result<u64> {
    u64::try_from(value).map_err(|_| ClientError::Decode {
        what,
        reason: format!("{} does not fit in u64", value),
    })
}

fn decode_error(what: &'static str) -> impl Fn(alloy_sol_types::Error) -> ClientError {
    move |e| ClientError::Decode {
        what,
        reason: e.to_string(),
    }
}

pub fn decode_deposit(log: &RpcLog) -> Result<TreeEvent> {
    let e = DepositData::decode_raw_log(log.topics.iter().copied(), &log.data, true)
        .map_err(decode_error("DepositData"))?;
    Ok(TreeEvent {
        instance: e.instance,
        hash: e.hash,
        block: small(e.block, "DepositData block")?,
        index: small(e.index, "DepositData index")?,
    })
}

pub fn decode_withdrawal(log: &RpcLog) -> Result<TreeEvent> {
    let e = WithdrawalData::decode_raw_log(log.topics.iter().copied(), &log.data, true)
        .map_err(decode_error("WithdrawalData"))?;
    Ok(TreeEvent {
        instance: e.instance,
        hash: e.hash,
        block: small(e.block, "WithdrawalData block")?,
        index: small(e.index, "WithdrawalData index")?,
    })
}

pub fn decode_account(log: &RpcLog) -> Result<AccountEvent> {
    let e = NewAccount::decode_raw_log(log.topics.iter().copied(), &log.data, true)
        .map_err(decode_error("NewAccount"))?;
    Ok(AccountEvent {
        commitment: e.commitment,
        nullifier_hash: e.nullifier,
        encrypted_account: e.encryptedAccount,
        index: small(e.index, "NewAccount index")?,
    })
}

impl EventSource for RpcEventSource {
    async fn deposit_events(&self, since: u64) -> Result<Vec<TreeEvent>> {
        let logs = self
            .get_logs(self.config.trees_address, DepositData::SIGNATURE_HASH)
            .await?;
        let events = logs.iter().map(decode_deposit).collect::<Result<Vec<_>>>()?;
        Ok(events.into_iter().filter(|e| e.index >= since).collect())
    }

    async fn withdrawal_events(&self, since: u64) -> Result<Vec<TreeEvent>> {
        let logs = self
            .get_logs(self.config.trees_address, WithdrawalData::SIGNATURE_HASH)
            .await?;
        let events = logs
            .iter()
            .map(decode_withdrawal)
            .collect::<Result<Vec<_>>>()?;
        Ok(events.into_iter().filter(|e| e.index >= since).collect())
    }

    async fn account_events(&self, since: u64) -> Result<Vec<AccountEvent>> {
        let logs = self
            .get_logs(self.config.miner_address, NewAccount::SIGNATURE_HASH)
            .await?;
        let events = logs.iter().map(decode_account).collect::<Result<Vec<_>>>()?;
        Ok(events.into_iter().filter(|e| e.index >= since).collect())
    }
}

impl RateSource for RpcEventSource {
    async fn rate(&self, instance: Address) -> Result<U256> {
        RpcEventSource::rate(self, instance).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn to_rpc(data: alloy_primitives::LogData) -> RpcLog {
        RpcLog {
            topics: data.topics().to_vec(),
            data: data.data,
        }
    }

    #[test]
    fn test_decode_deposit_log() {
        let event = DepositData {
            instance: Address::repeat_byte(7),
            hash: B256::repeat_byte(8),
            block: U256::from(1234u64),
            index: U256::from(5u8),
        };
        let log = to_rpc(event.encode_log_data());
        assert_eq!(log.topics.len(), 2);
        let decoded = decode_deposit(&log).unwrap();
        assert_eq!(decoded.instance, Address::repeat_byte(7));
        assert_eq!(decoded.hash, B256::repeat_byte(8));
        assert_eq!((decoded.block, decoded.index), (1234, 5));
    }

    #[test]
    fn test_decode_account_log() {
        let event = NewAccount {
            commitment: B256::repeat_byte(1),
            nullifier: B256::repeat_byte(2),
            encryptedAccount: Bytes::from(vec![3u8; 196]),
            index: U256::from(9u8),
        };
        let decoded = decode_account(&to_rpc(event.encode_log_data())).unwrap();
        assert_eq!(decoded.nullifier_hash, B256::repeat_byte(2));
        assert_eq!(decoded.encrypted_account.len(), 196);
        assert_eq!(decoded.index, 9);
    }

    #[test]
    fn test_wrong_event_rejected() {
        let event = WithdrawalData {
            instance: Address::ZERO,
            hash: B256::ZERO,
            block: U256::from(1u8),
            index: U256::ZERO,
        };
        let log = to_rpc(event.encode_log_data());
        assert!(decode_deposit(&log).is_err());
        assert!(decode_withdrawal(&log).is_ok());
    }

    #[test]
    fn test_oversized_block_rejected() {
        let event = DepositData {
            instance: Address::ZERO,
            hash: B256::ZERO,
            block: U256::MAX,
            index: U256::ZERO,
        };
        let err = decode_deposit(&to_rpc(event.encode_log_data())).unwrap_err();
        assert!(matches!(err, ClientError::Decode { .. }));
    }

    #[test]
    fn test_config_defaults() {
        let config: RpcConfig = serde_json::from_value(json!({
            "miner_address": Address::repeat_byte(1),
            "trees_address": Address::repeat_byte(2),
        }))
        .unwrap();
        assert_eq!(config.url, "http://127.0.0.1:8545");
        assert_eq!(config.from_block, 0);
    }

    #[test]
    fn test_log_json_shape() {
        let log: RpcLog = serde_json::from_value(json!({
            "address": "0x0000000000000000000000000000000000000001",
            "topics": [format!("{}", B256::repeat_byte(0xaa))],
            "data": "0x00",
            "blockNumber": "0x10",
        }))
        .unwrap();
        assert_eq!(log.topics[0], B256::repeat_byte(0xaa));
        assert_eq!(log.data.len(), 1);
    }
}
