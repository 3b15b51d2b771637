//! Wallet message signature verification.
//!
//! Plain keys (EOAs) are checked locally by recovering the signer of the
//! EIP-191 personal-sign digest. Anything else is treated as a possible
//! contract wallet and checked with an ERC-1271 `isValidSignature` call
//! against a read-only JSON-RPC node.
//!
//! Signatures from wallets that are not deployed yet arrive wrapped per
//! EIP-6492. The wallet is first asked directly (it may have been deployed
//! since signing); failing that, the factory deployment and the
//! `isValidSignature` call are run together in one `eth_simulateV1` block.

use crate::error::AppError;
use alloy_primitives::{eip191_hash_message, Address, Bytes, Signature, B256};
use alloy_sol_types::{sol, SolCall, SolType};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

sol! {
    function isValidSignature(bytes32 hash, bytes signature) external view returns (bytes4 magicValue);

    struct Sig6492 {
        address factory;
        bytes factoryCalldata;
        bytes innerSig;
    }
}

/// ERC-1271 success value: `bytes4(keccak256("isValidSignature(bytes32,bytes)"))`.
pub const ERC1271_MAGIC_VALUE: [u8; 4] = [0x16, 0x26, 0xba, 0x7e];

/// Trailing marker of an EIP-6492 wrapped signature.
pub const EIP6492_MAGIC_SUFFIX: [u8; 32] =
    alloy_primitives::hex!("6492649264926492649264926492649264926492649264926492649264926492");

/// A decoded wallet signature.
#[derive(Debug, Clone, PartialEq)]
enum WalletSignature {
    /// EOA or deployed contract wallet signature.
    Plain(Bytes),
    /// EIP-6492: deploy `factory` with `factory_calldata`, then validate `inner`.
    Counterfactual {
        factory: Address,
        factory_calldata: Bytes,
        inner: Bytes,
    },
}

impl WalletSignature {
    /// `None` when the EIP-6492 wrapper is present but cannot be decoded.
    fn parse(bytes: Vec<u8>) -> Option<Self> {
        if !bytes.ends_with(&EIP6492_MAGIC_SUFFIX) {
            return Some(WalletSignature::Plain(Bytes::from(bytes)));
        }
        let body = &bytes[..bytes.len() - EIP6492_MAGIC_SUFFIX.len()];
        let wrapped = <Sig6492 as SolType>::abi_decode_params(body).ok()?;
        Some(WalletSignature::Counterfactual {
            factory: wrapped.factory,
            factory_calldata: wrapped.factoryCalldata,
            inner: wrapped.innerSig,
        })
    }
}

/// Verifies `(address, message, signature)` triples.
#[derive(Clone)]
pub struct SignatureVerifier {
    rpc: Option<ChainRpc>,
}

impl SignatureVerifier {
    /// Verifier with contract-wallet support through `rpc_url`.
    pub fn new(rpc_url: Option<&str>, timeout: Duration) -> Result<Self, AppError> {
        let rpc = rpc_url.map(|url| ChainRpc::new(url, timeout)).transpose()?;
        Ok(Self { rpc })
    }

    /// Verifier that only accepts plain-key signatures.
    pub fn offline() -> Self {
        Self { rpc: None }
    }

    pub fn supports_contract_wallets(&self) -> bool {
        self.rpc.is_some()
    }

    /// Check that `signature` over `message` was produced under control of
    /// `address`.
    ///
    /// Unparseable input is `Ok(false)`; only a failed RPC round trip is an
    /// error.
    pub async fn verify(
        &self,
        address: &str,
        message: &str,
        signature: &str,
    ) -> Result<bool, AppError> {
        let Ok(address) = address.trim().parse::<Address>() else {
            return Ok(false);
        };
        let Ok(signature) = hex::decode(signature.trim().trim_start_matches("0x")) else {
            return Ok(false);
        };
        let Some(signature) = WalletSignature::parse(signature) else {
            tracing::debug!("Undecodable EIP-6492 signature wrapper");
            return Ok(false);
        };
        let hash = eip191_hash_message(message);

        match signature {
            WalletSignature::Plain(signature) => {
                if recovers_to(&signature, message, address) {
                    return Ok(true);
                }
                match &self.rpc {
                    Some(rpc) => rpc.is_valid_signature(address, hash, signature).await,
                    None => Ok(false),
                }
            }
            WalletSignature::Counterfactual {
                factory,
                factory_calldata,
                inner,
            } => {
                let Some(rpc) = &self.rpc else {
                    return Ok(false);
                };
                if rpc.is_valid_signature(address, hash, inner.clone()).await? {
                    return Ok(true);
                }
                rpc.simulate_deployed_signature(factory, factory_calldata, address, hash, inner)
                    .await
            }
        }
    }
}

/// EOA check: does the 65-byte signature recover to `address`?
fn recovers_to(signature: &[u8], message: &str, address: Address) -> bool {
    if signature.len() != 65 {
        return false;
    }
    Signature::from_raw(signature)
        .ok()
        .and_then(|sig| sig.recover_address_from_msg(message).ok())
        .is_some_and(|recovered| recovered == address)
}

/// Minimal read-only JSON-RPC client.
#[derive(Clone)]
pub struct ChainRpc {
    url: String,
    http: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    result: Option<Value>,
    error: Option<RpcError>,
}

/// Nodes disagree on error shape; some omit `code`.
#[derive(Debug, Deserialize)]
struct RpcError {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SimulatedBlock {
    calls: Vec<SimulatedCall>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SimulatedCall {
    status: String,
    return_data: String,
}

impl ChainRpc {
    pub fn new(url: &str, timeout: Duration) -> Result<Self, AppError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.to_string(),
            http,
        })
    }

    /// One JSON-RPC round trip. `Ok(None)` when the node answers with an
    /// error object (revert, no contract code, unknown method).
    async fn request(&self, method: &str, params: Value) -> Result<Option<Value>, AppError> {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response: RpcResponse = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if let Some(err) = response.error {
            tracing::debug!(
                method,
                code = err.code,
                message = %err.message,
                "JSON-RPC call failed"
            );
            return Ok(None);
        }

        response
            .result
            .map(Some)
            .ok_or_else(|| AppError::Internal("RPC response missing result".to_string()))
    }

    /// ERC-1271 `isValidSignature(hash, signature)` on `wallet` at `latest`.
    ///
    /// A JSON-RPC error (revert, no contract code) means "not valid".
    pub async fn is_valid_signature(
        &self,
        wallet: Address,
        hash: B256,
        signature: Bytes,
    ) -> Result<bool, AppError> {
        let params = json!([
            { "to": wallet.to_string(), "data": is_valid_signature_calldata(hash, signature) },
            "latest"
        ]);

        let Some(result) = self.request("eth_call", params).await? else {
            return Ok(false);
        };
        let returned = result
            .as_str()
            .ok_or_else(|| AppError::Internal("RPC result is not a string".to_string()))?;

        Ok(is_magic_return(&decode_hex(returned)?))
    }

    /// EIP-6492 check for an undeployed wallet: run the factory call and
    /// `isValidSignature` in one simulated block, without touching state.
    ///
    /// Nodes without `eth_simulateV1` answer with an error, which means
    /// "not valid".
    pub async fn simulate_deployed_signature(
        &self,
        factory: Address,
        factory_calldata: Bytes,
        wallet: Address,
        hash: B256,
        signature: Bytes,
    ) -> Result<bool, AppError> {
        let params = json!([
            {
                "blockStateCalls": [{
                    "calls": [
                        {
                            "to": factory.to_string(),
                            "data": format!("0x{}", hex::encode(&factory_calldata)),
                        },
                        {
                            "to": wallet.to_string(),
                            "data": is_valid_signature_calldata(hash, signature),
                        },
                    ]
                }],
                "validation": false
            },
            "latest"
        ]);

        let Some(result) = self.request("eth_simulateV1", params).await? else {
            return Ok(false);
        };
        let blocks: Vec<SimulatedBlock> = serde_json::from_value(result)?;
        // Second call of the first block is the signature check
        let check = blocks
            .first()
            .and_then(|block| block.calls.get(1))
            .ok_or_else(|| AppError::Internal("Simulation result missing calls".to_string()))?;

        if check.status != "0x1" {
            return Ok(false);
        }
        Ok(is_magic_return(&decode_hex(&check.return_data)?))
    }
}

fn is_valid_signature_calldata(hash: B256, signature: Bytes) -> String {
    let calldata = isValidSignatureCall { hash, signature }.abi_encode();
    format!("0x{}", hex::encode(calldata))
}

fn decode_hex(value: &str) -> Result<Vec<u8>, AppError> {
    hex::decode(value.trim_start_matches("0x"))
        .map_err(|e| AppError::Internal(format!("RPC result is not hex: {}", e)))
}

/// `bytes4` returns are left-aligned in a 32-byte word.
fn is_magic_return(returned: &[u8]) -> bool {
    returned.len() >= 4 && returned[..4] == ERC1271_MAGIC_VALUE
}
