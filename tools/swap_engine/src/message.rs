//! Peer message codec: one type byte followed by a UTF-8 JSON body.

use alloy::primitives::Address;
use bigdecimal::BigDecimal;
use dleq::Secp256k1PublicKey;
use eth_escrow::{RelayClaimRequest, RelayClaimResponse, SwapFactory};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use xmr_wallet::{PrivateViewKey, PublicKey};

use crate::offers::Offer;
use crate::types::{is_hash_zero, Hash};

pub const QUERY_RESPONSE_TYPE: u8 = 1;
pub const RELAY_CLAIM_REQUEST_TYPE: u8 = 2;
pub const RELAY_CLAIM_RESPONSE_TYPE: u8 = 3;
pub const SEND_KEYS_TYPE: u8 = 4;
pub const NOTIFY_ETH_LOCKED_TYPE: u8 = 5;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("invalid message bytes")]
    InvalidMessage,
    #[error("invalid message type={0}")]
    InvalidMessageType(u8),
    #[error("invalid {message_type} message: required field {field:?}")]
    Validation {
        message_type: &'static str,
        field: &'static str,
    },
    #[error("failed to decode {0} message: {1}")]
    Decode(&'static str, serde_json::Error),
    #[error("failed to encode {0} message: {1}")]
    Encode(&'static str, serde_json::Error),
}

/// Advertised offers, sent in reply to a query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResponse {
    pub offers: Vec<Offer>,
}

/// Sent by both parties to initiate the protocol: the sender's public spend
/// key and private view key for the joint account, plus the DLEq proof
/// binding its secret to the secp256k1 commitment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendKeysMessage {
    /// Set by the taker to select the offer; absent from the maker's reply.
    #[serde(rename = "offerID", default, skip_serializing_if = "Option::is_none")]
    pub offer_id: Option<Hash>,
    pub provided_amount: BigDecimal,
    pub public_spend_key: PublicKey,
    pub private_view_key: PrivateViewKey,
    #[serde(with = "hex::serde")]
    pub dleq_proof: Vec<u8>,
    pub secp256k1_public_key: Secp256k1PublicKey,
    /// Set by the maker so the taker knows the claimer address; absent from
    /// the taker's message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eth_address: Option<Address>,
}

/// Sent by the taker after locking the ETH-side asset in the escrow
/// contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifyEthLocked {
    pub address: Address,
    pub tx_hash: Hash,
    #[serde(rename = "contractSwapID")]
    pub contract_swap_id: Hash,
    pub contract_swap: SwapFactory::Swap,
}

/// A peer protocol message, tagged on the wire by its type byte.
#[derive(Debug, Clone)]
pub enum Message {
    QueryResponse(QueryResponse),
    RelayClaimRequest(RelayClaimRequest),
    RelayClaimResponse(RelayClaimResponse),
    SendKeys(SendKeysMessage),
    NotifyEthLocked(NotifyEthLocked),
}

impl Message {
    pub fn type_byte(&self) -> u8 {
        match self {
            Message::QueryResponse(_) => QUERY_RESPONSE_TYPE,
            Message::RelayClaimRequest(_) => RELAY_CLAIM_REQUEST_TYPE,
            Message::RelayClaimResponse(_) => RELAY_CLAIM_RESPONSE_TYPE,
            Message::SendKeys(_) => SEND_KEYS_TYPE,
            Message::NotifyEthLocked(_) => NOTIFY_ETH_LOCKED_TYPE,
        }
    }

    pub fn type_name(&self) -> &'static str {
        type_name_of(self.type_byte())
    }

    /// Encodes as `[type byte] || JSON(body)`.
    pub fn encode(&self) -> Result<Vec<u8>, MessageError> {
        let body = match self {
            Message::QueryResponse(m) => serde_json::to_vec(m),
            Message::RelayClaimRequest(m) => serde_json::to_vec(m),
            Message::RelayClaimResponse(m) => serde_json::to_vec(m),
            Message::SendKeys(m) => serde_json::to_vec(m),
            Message::NotifyEthLocked(m) => serde_json::to_vec(m),
        }
        .map_err(|err| MessageError::Encode(self.type_name(), err))?;

        let mut out = Vec::with_capacity(1 + body.len());
        out.push(self.type_byte());
        out.extend_from_slice(&body);
        Ok(out)
    }

    /// Decodes a framed message: one type byte plus at least `{}` of JSON.
    pub fn decode(bytes: &[u8]) -> Result<Message, MessageError> {
        if bytes.len() < 3 {
            return Err(MessageError::InvalidMessage);
        }

        let type_byte = bytes[0];
        let body = &bytes[1..];
        let message = match type_byte {
            QUERY_RESPONSE_TYPE => Message::QueryResponse(decode_body(type_byte, body)?),
            RELAY_CLAIM_REQUEST_TYPE => Message::RelayClaimRequest(decode_body(type_byte, body)?),
            RELAY_CLAIM_RESPONSE_TYPE => {
                Message::RelayClaimResponse(decode_body(type_byte, body)?)
            }
            SEND_KEYS_TYPE => Message::SendKeys(decode_body(type_byte, body)?),
            NOTIFY_ETH_LOCKED_TYPE => Message::NotifyEthLocked(decode_body(type_byte, body)?),
            other => return Err(MessageError::InvalidMessageType(other)),
        };

        message.validate()?;
        Ok(message)
    }

    fn validate(&self) -> Result<(), MessageError> {
        match self {
            Message::QueryResponse(_) => Ok(()),
            Message::RelayClaimRequest(m) => {
                if m.secret.len() != 32 {
                    return Err(validation("RelayClaimRequest", "secret"));
                }
                if m.signature.len() != 65 {
                    return Err(validation("RelayClaimRequest", "signature"));
                }
                Ok(())
            }
            Message::RelayClaimResponse(m) => {
                if is_hash_zero(&m.tx_hash) {
                    return Err(validation("RelayClaimResponse", "transactionHash"));
                }
                Ok(())
            }
            Message::SendKeys(m) => {
                use bigdecimal::Zero;
                if m.provided_amount <= bigdecimal::BigDecimal::zero() {
                    return Err(validation("SendKeysMessage", "providedAmount"));
                }
                if m.dleq_proof.is_empty() {
                    return Err(validation("SendKeysMessage", "dleqProof"));
                }
                Ok(())
            }
            Message::NotifyEthLocked(m) => {
                if m.address == Address::ZERO {
                    return Err(validation("NotifyETHLocked", "address"));
                }
                if is_hash_zero(&m.tx_hash) {
                    return Err(validation("NotifyETHLocked", "txHash"));
                }
                if is_hash_zero(&m.contract_swap_id) {
                    return Err(validation("NotifyETHLocked", "contractSwapID"));
                }
                Ok(())
            }
        }
    }
}

fn decode_body<T: serde::de::DeserializeOwned>(
    type_byte: u8,
    body: &[u8],
) -> Result<T, MessageError> {
    check_required_fields(type_byte, body)?;
    serde_json::from_slice(body).map_err(|err| MessageError::Decode(type_name_of(type_byte), err))
}

/// JSON keys that must be present (and non-null) per message type. Checked
/// before the typed decode so a missing field surfaces as a validation
/// error naming the field instead of an opaque decode error.
fn required_fields(type_byte: u8) -> &'static [&'static str] {
    match type_byte {
        QUERY_RESPONSE_TYPE => &["offers"],
        RELAY_CLAIM_REQUEST_TYPE => &["swapFactoryAddress", "swap", "secret", "signature"],
        RELAY_CLAIM_RESPONSE_TYPE => &["transactionHash"],
        SEND_KEYS_TYPE => &[
            "providedAmount",
            "publicSpendKey",
            "privateViewKey",
            "dleqProof",
            "secp256k1PublicKey",
        ],
        NOTIFY_ETH_LOCKED_TYPE => &["address", "txHash", "contractSwapID", "contractSwap"],
        _ => &[],
    }
}

fn check_required_fields(type_byte: u8, body: &[u8]) -> Result<(), MessageError> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|err| MessageError::Decode(type_name_of(type_byte), err))?;
    // Non-object bodies fall through to the typed decode, which reports the
    // shape mismatch.
    let Some(object) = value.as_object() else {
        return Ok(());
    };
    for &field in required_fields(type_byte) {
        if object.get(field).map_or(true, serde_json::Value::is_null) {
            return Err(validation(type_name_of(type_byte), field));
        }
    }
    Ok(())
}

fn type_name_of(type_byte: u8) -> &'static str {
    match type_byte {
        QUERY_RESPONSE_TYPE => "QueryResponse",
        RELAY_CLAIM_REQUEST_TYPE => "RelayClaimRequest",
        RELAY_CLAIM_RESPONSE_TYPE => "RelayClaimResponse",
        SEND_KEYS_TYPE => "SendKeysMessage",
        NOTIFY_ETH_LOCKED_TYPE => "NotifyETHLocked",
        _ => "Unknown",
    }
}

fn validation(message_type: &'static str, field: &'static str) -> MessageError {
    MessageError::Validation {
        message_type,
        field,
    }
}
