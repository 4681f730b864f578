use std::sync::Arc;
use std::time::{Duration, Instant};

use alloy::primitives::{b256, keccak256, Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider};
use alloy::rpc::types::Log;
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use alloy::sol_types::{SolCall, SolValue};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::contract::{claimed_topic, swap_id, Forwarder, SwapFactory};
use crate::error::RelayerError;

/// Gas limit granted to a relayed claim through the forwarder.
pub const RELAYED_CLAIM_GAS: u64 = 200_000;

/// EIP-712 domain values registered by the GSN forwarder deployment.
const DEFAULT_FORWARDER_NAME: &str = "GSN Relayed Transaction";
const DEFAULT_FORWARDER_VERSION: &str = "3";

const RECEIPT_CHECK_INTERVAL: Duration = Duration::from_secs(1);
const RECEIPT_MAX_WAIT: Duration = Duration::from_secs(60);
const RECEIPT_MAX_NOT_FOUND: u32 = 10;

/// Keccak digests of the audited deployment artifacts, with the forwarder
/// address immutable masked out of the factory code before hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodeDigests {
    pub swap_factory: B256,
    pub forwarder: B256,
}

impl Default for CodeDigests {
    fn default() -> Self {
        Self {
            swap_factory: b256!(
                "4e1f0d0e8a8ad3e6c4c30b53d9ab3fb06c8f05aa4add7c160d839afb6a0aaf29"
            ),
            forwarder: b256!(
                "b4dfc32c6ec24ae79c0a85b0b1fd14c29a4c0bd2e1cb7045c25b2d42a9b61ded"
            ),
        }
    }
}

/// A relayed-claim request as sent to a relayer over the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayClaimRequest {
    pub swap_factory_address: Address,
    pub swap: SwapFactory::Swap,
    #[serde(with = "hex::serde")]
    pub secret: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

impl RelayClaimRequest {
    pub fn secret_b256(&self) -> Result<B256, RelayerError> {
        if self.secret.len() != 32 {
            return Err(RelayerError::InvalidSecretLength(self.secret.len()));
        }
        Ok(B256::from_slice(&self.secret))
    }
}

/// The relayer's answer: the hash of the claim transaction it submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayClaimResponse {
    #[serde(rename = "transactionHash")]
    pub tx_hash: B256,
}

/// Transport used to hand a claim request to one candidate relayer. The p2p
/// plumbing behind it lives outside this crate.
#[async_trait]
pub trait RelayerClient: Send + Sync {
    fn name(&self) -> String;
    async fn submit_claim(
        &self,
        request: &RelayClaimRequest,
    ) -> anyhow::Result<RelayClaimResponse>;
}

/// Builds and signs a relayed-claim request for the given swap.
///
/// The request wraps a `claimRelayer` call in a GSN forward request signed
/// over its EIP-712 digest, so the relayer can submit it without being able
/// to alter the claim.
pub async fn create_relay_claim_request(
    token: &CancellationToken,
    signer: &PrivateKeySigner,
    provider: &DynProvider,
    swap_factory: Address,
    forwarder: Address,
    swap: &SwapFactory::Swap,
    secret: &B256,
    fee_wei: U256,
) -> Result<RelayClaimRequest, RelayerError> {
    if swap.claimer != signer.address() {
        return Err(RelayerError::ClaimerMismatch);
    }

    let chain_id = cancellable(token, provider.get_chain_id()).await??;
    let domain_separator = forwarder_domain_separator(U256::from(chain_id), forwarder);

    let forwarder_contract = Forwarder::new(forwarder, provider.clone());
    let nonce = cancellable(token, forwarder_contract.getNonce(swap.claimer).call()).await??;

    let request = build_forward_request(nonce, swap_factory, swap, secret, fee_wei);
    let digest = forward_request_digest(&request, &domain_separator);
    let signature = signer
        .sign_hash_sync(&digest)
        .map_err(|err| RelayerError::Signer(err.to_string()))?;

    Ok(RelayClaimRequest {
        swap_factory_address: swap_factory,
        swap: swap.clone(),
        secret: secret.to_vec(),
        signature: signature.as_bytes().to_vec(),
    })
}

/// Validates an inbound claim request before relaying it:
/// 1. a foreign swap-factory address must carry the known bytecode (and so
///    must its trusted forwarder);
/// 2. only the native ETH asset is relayed;
/// 3. the swap value must be strictly greater than our fee;
/// 4. the forwarder itself must accept the signature over the re-derived
///    forward request.
pub async fn validate_claim_request(
    token: &CancellationToken,
    provider: &DynProvider,
    request: &RelayClaimRequest,
    our_swap_factory: Address,
    fee_wei: U256,
    digests: &CodeDigests,
) -> Result<(), RelayerError> {
    if request.swap_factory_address != our_swap_factory {
        check_swap_factory_contract_code(token, provider, request.swap_factory_address, digests)
            .await?;
    }

    if request.swap.asset != Address::ZERO {
        return Err(RelayerError::UnsupportedAsset);
    }

    if request.swap.value <= fee_wei {
        return Err(RelayerError::SwapValueBelowFee);
    }

    validate_claim_signature(token, provider, request, fee_wei).await
}

async fn validate_claim_signature(
    token: &CancellationToken,
    provider: &DynProvider,
    request: &RelayClaimRequest,
    fee_wei: U256,
) -> Result<(), RelayerError> {
    let factory = SwapFactory::new(request.swap_factory_address, provider.clone());
    let forwarder_addr = cancellable(token, factory.trustedForwarder().call()).await??;

    let chain_id = cancellable(token, provider.get_chain_id()).await??;
    let domain_separator = forwarder_domain_separator(U256::from(chain_id), forwarder_addr);

    let forwarder = Forwarder::new(forwarder_addr, provider.clone());
    let nonce = cancellable(token, forwarder.getNonce(request.swap.claimer).call()).await??;

    let secret = request.secret_b256()?;
    let forward_request = build_forward_request(
        nonce,
        request.swap_factory_address,
        &request.swap,
        &secret,
        fee_wei,
    );

    // Any non-zero sender makes the forwarder validate all signatures.
    let caller = Address::repeat_byte(0xff);
    let verify = forwarder
        .verify(
            forward_request,
            domain_separator,
            forward_request_typehash(),
            Bytes::new(),
            Bytes::from(request.signature.clone()),
        )
        .from(caller);

    match cancellable(token, verify.call()).await? {
        Ok(_) => Ok(()),
        Err(err) => {
            debug!(%err, "Forwarder rejected claim signature");
            Err(RelayerError::BadSignature)
        }
    }
}

/// Polls for the relayer's transaction, then validates the mined receipt:
/// success status and a first log that is `Claimed(swapID, secret)` emitted
/// by the expected contract.
pub async fn wait_for_claim_receipt(
    token: &CancellationToken,
    provider: &DynProvider,
    tx_hash: B256,
    contract: Address,
    contract_swap_id: B256,
    secret: B256,
) -> Result<(), RelayerError> {
    let start = Instant::now();
    let mut not_found: u32 = 0;

    loop {
        // Give the transaction time to propagate before the first check.
        tokio::select! {
            _ = token.cancelled() => return Err(RelayerError::Canceled),
            _ = tokio::time::sleep(RECEIPT_CHECK_INTERVAL) => {}
        }

        if start.elapsed() > RECEIPT_MAX_WAIT {
            return Err(RelayerError::RelayedTransactionTimeout);
        }

        match cancellable(token, provider.get_transaction_by_hash(tx_hash)).await?? {
            None => {
                if not_found >= RECEIPT_MAX_NOT_FOUND {
                    return Err(RelayerError::TransactionNotFound(not_found));
                }
                not_found += 1;
            }
            Some(tx) => {
                if tx.block_number.is_some() {
                    break;
                }
            }
        }
    }

    let receipt = cancellable(token, provider.get_transaction_receipt(tx_hash))
        .await??
        .ok_or(RelayerError::ReceiptMissing(tx_hash))?;

    if !receipt.status() {
        warn!(%tx_hash, "Relayed claim transaction reverted");
        return Err(RelayerError::RelayedTransactionTimeout);
    }

    let logs = receipt.inner.logs();
    if logs.is_empty() {
        return Err(RelayerError::ClaimLogWrongTopicLength);
    }

    check_claimed_log(&logs[0], contract, contract_swap_id, secret)?;
    info!(%tx_hash, "Relayed claim receipt validated");
    Ok(())
}

/// Validates that a log is `Claimed(swapID, secret)` from the expected
/// contract with exactly three topics.
pub fn check_claimed_log(
    log: &Log,
    contract: Address,
    contract_swap_id: B256,
    secret: B256,
) -> Result<(), RelayerError> {
    if log.inner.address != contract {
        return Err(RelayerError::ClaimLogInvalidContractAddr);
    }

    let topics = log.inner.data.topics();
    if topics.len() != 3 {
        return Err(RelayerError::ClaimLogWrongTopicLength);
    }
    if topics[0] != claimed_topic() {
        return Err(RelayerError::ClaimLogWrongEvent);
    }
    if topics[1] != contract_swap_id {
        return Err(RelayerError::ClaimLogWrongSwapID);
    }
    if topics[2] != secret {
        return Err(RelayerError::ClaimLogWrongSecret);
    }
    Ok(())
}

/// Tries each candidate relayer in order until one produces a validated
/// claim receipt. Per-relayer failures are logged and skipped.
pub async fn submit_to_relayers(
    token: &CancellationToken,
    provider: &DynProvider,
    relayers: &[Arc<dyn RelayerClient>],
    request: &RelayClaimRequest,
    contract: Address,
    secret: B256,
) -> Result<B256, RelayerError> {
    let contract_swap_id = swap_id(&request.swap);

    for relayer in relayers {
        debug!(relayer = %relayer.name(), "Submitting claim to relayer");
        let response = match relayer.submit_claim(request).await {
            Ok(response) => response,
            Err(err) => {
                warn!(relayer = %relayer.name(), %err, "Relayer rejected claim submission");
                continue;
            }
        };

        match wait_for_claim_receipt(
            token,
            provider,
            response.tx_hash,
            contract,
            contract_swap_id,
            secret,
        )
        .await
        {
            Ok(()) => return Ok(response.tx_hash),
            Err(RelayerError::Canceled) => return Err(RelayerError::Canceled),
            Err(err) => {
                warn!(relayer = %relayer.name(), %err, "Relayed claim did not validate");
                continue;
            }
        }
    }

    Err(RelayerError::NoRelayerSucceeded)
}

/// Verifies the deployed bytecode of a swap factory and its trusted
/// forwarder against the known build digests, returning the forwarder
/// address on success.
pub async fn check_swap_factory_contract_code(
    token: &CancellationToken,
    provider: &DynProvider,
    swap_factory: Address,
    digests: &CodeDigests,
) -> Result<Address, RelayerError> {
    let code = cancellable(token, provider.get_code_at(swap_factory)).await??;
    if code.is_empty() {
        return Err(RelayerError::UnknownFactoryBytecode);
    }

    let factory = SwapFactory::new(swap_factory, provider.clone());
    let forwarder = cancellable(token, factory.trustedForwarder().call()).await??;

    // The forwarder address is an immutable baked into the factory code;
    // mask it before comparing digests.
    let masked = mask_address(&code, forwarder);
    if keccak256(&masked) != digests.swap_factory {
        return Err(RelayerError::UnknownFactoryBytecode);
    }

    let forwarder_code = cancellable(token, provider.get_code_at(forwarder)).await??;
    if keccak256(&forwarder_code) != digests.forwarder {
        return Err(RelayerError::UnknownFactoryBytecode);
    }

    Ok(forwarder)
}

fn mask_address(code: &[u8], addr: Address) -> Vec<u8> {
    let needle = addr.as_slice();
    let mut out = code.to_vec();
    if needle.is_empty() || code.len() < needle.len() {
        return out;
    }
    let mut i = 0;
    while i + needle.len() <= out.len() {
        if &out[i..i + needle.len()] == needle {
            out[i..i + needle.len()].fill(0);
            i += needle.len();
        } else {
            i += 1;
        }
    }
    out
}

/// EIP-712 domain separator of the forwarder deployment.
pub fn forwarder_domain_separator(chain_id: U256, forwarder: Address) -> B256 {
    let type_hash = keccak256(
        b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
    );
    let encoded = (
        type_hash,
        keccak256(DEFAULT_FORWARDER_NAME.as_bytes()),
        keccak256(DEFAULT_FORWARDER_VERSION.as_bytes()),
        chain_id,
        forwarder,
    )
        .abi_encode();
    keccak256(encoded)
}

/// Typehash of the GSN ForwardRequest struct.
pub fn forward_request_typehash() -> B256 {
    keccak256(
        b"ForwardRequest(address from,address to,uint256 value,uint256 gas,uint256 nonce,bytes data,uint256 validUntilTime)",
    )
}

fn build_forward_request(
    nonce: U256,
    swap_factory: Address,
    swap: &SwapFactory::Swap,
    secret: &B256,
    fee_wei: U256,
) -> Forwarder::ForwardRequest {
    let calldata = SwapFactory::claimRelayerCall {
        swap: swap.clone(),
        s: *secret,
        fee: fee_wei,
    }
    .abi_encode();

    Forwarder::ForwardRequest {
        from: swap.claimer,
        to: swap_factory,
        value: U256::ZERO,
        gas: U256::from(RELAYED_CLAIM_GAS),
        nonce,
        data: Bytes::from(calldata),
        validUntilTime: U256::ZERO,
    }
}

/// EIP-712 digest the claimer signs: 0x1901 || domainSeparator ||
/// keccak(typehash || abi.encode(fields with keccak(data))).
pub fn forward_request_digest(
    request: &Forwarder::ForwardRequest,
    domain_separator: &B256,
) -> B256 {
    let encoded = (
        forward_request_typehash(),
        request.from,
        request.to,
        request.value,
        request.gas,
        request.nonce,
        keccak256(&request.data),
        request.validUntilTime,
    )
        .abi_encode();
    let struct_hash = keccak256(encoded);

    let mut buf = Vec::with_capacity(2 + 32 + 32);
    buf.extend_from_slice(&[0x19, 0x01]);
    buf.extend_from_slice(domain_separator.as_slice());
    buf.extend_from_slice(struct_hash.as_slice());
    keccak256(buf)
}

async fn cancellable<T>(
    token: &CancellationToken,
    fut: impl std::future::IntoFuture<Output = T>,
) -> Result<T, RelayerError> {
    let fut = fut.into_future();
    tokio::select! {
        _ = token.cancelled() => Err(RelayerError::Canceled),
        value = fut => Ok(value),
    }
}
