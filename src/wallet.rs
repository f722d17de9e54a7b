use crate::{
    keypair::PublicKey,
    parameters::{TxParameterId, TxParameters},
};
use rand::Rng;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

pub type Height = u64;
pub type Amount = u64;
pub type Timestamp = u64;

pub const MAX_HEIGHT: Height = u64::MAX;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxId(pub [u8; 16]);

impl TxId {
    pub fn new_random() -> Self {
        TxId(rand::thread_rng().gen())
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", hex::encode(&self.0))
    }
}

/// Public identity of a wallet endpoint: a compressed secp256k1 point.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WalletId(pub [u8; 33]);

impl WalletId {
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        WalletId(public_key.serialize_compressed())
    }

    pub fn to_public_key(&self) -> Option<PublicKey> {
        PublicKey::parse_compressed(&self.0).ok()
    }
}

impl fmt::Debug for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WalletId({})", self)
    }
}

impl fmt::Display for WalletId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(&self.0[..]))
    }
}

impl Serialize for WalletId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(&self.0)
    }
}

impl<'de> Deserialize<'de> for WalletId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct Visitor;

        impl<'de> de::Visitor<'de> for Visitor {
            type Value = WalletId;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "33 bytes of compressed public key")
            }

            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<WalletId, E> {
                if v.len() != 33 {
                    return Err(E::invalid_length(v.len(), &self));
                }
                let mut id = [0u8; 33];
                id.copy_from_slice(v);
                Ok(WalletId(id))
            }

            fn visit_seq<A: de::SeqAccess<'de>>(self, mut seq: A) -> Result<WalletId, A::Error> {
                let mut id = [0u8; 33];
                for (i, byte) in id.iter_mut().enumerate() {
                    *byte = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(i, &self))?;
                }
                Ok(WalletId(id))
            }
        }

        deserializer.deserialize_bytes(Visitor)
    }
}

/// Local address record as seen by the address store; `own_id` is the
/// broadcast-key derivation index the address was created from.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletAddress {
    pub wallet_id: WalletId,
    pub own_id: u64,
}

impl WalletAddress {
    pub fn is_own(&self) -> bool {
        self.own_id != 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxType {
    Simple,
    AtomicSwap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    Pending,
    InProgress,
    Canceled,
    Completed,
    Failed,
    Registering,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Added,
    Updated,
    Removed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum TxFailureReason {
    #[error("Unexpected reason, please send wallet logs to support")]
    Unknown,
    #[error("Transaction cancelled")]
    Canceled,
    #[error("Receiver signature is not valid")]
    InvalidPeerSignature,
    #[error("Failed to register transaction with the node")]
    FailedToRegister,
    #[error("Transaction is not valid")]
    InvalidTransaction,
    #[error("Invalid kernel proof provided")]
    InvalidKernelProof,
    #[error("Failed to send Transaction parameters")]
    FailedToSendParameters,
    #[error("Not enough inputs to process the transaction")]
    NoInputs,
    #[error("Failed to get transaction parameters")]
    FailedToGetParameter,
    #[error("Transaction has expired")]
    TransactionExpired,
    #[error("Kernel maximum height is too high")]
    MaxHeightIsUnacceptable,
    #[error("Transaction has invalid state")]
    InvalidState,
    #[error("Subtransaction has failed")]
    SubTxFailed,
    #[error("Contract's amount is not valid")]
    SwapInvalidAmount,
    #[error("Side chain has invalid contract")]
    SwapInvalidContract,
    #[error("Side chain bridge has internal error")]
    SwapSidechainRpcError,
    #[error("Side chain bridge has network error")]
    SwapNetworkBridgeError,
    #[error("Side chain bridge has response format error")]
    SwapFormatResponseError,
    #[error("Side chain bridge has internal error")]
    SwapSecondSideBridgeError,
    #[error("Invalid credentials of Side chain")]
    InvalidCredentialsOfSideChain,
    #[error("Not enough time to finish btc lock transaction")]
    NotEnoughTimeToFinishBtcTx,
    #[error("Failed to create multi-signature")]
    FailedToCreateMultiSig,
    #[error("Fee is too small")]
    FeeIsTooSmall,
    #[error("Kernel's min height is unacceptable")]
    MinHeightIsUnacceptable,
}

/// Snapshot of a wallet transaction as delivered by the transaction store's
/// change notifications.
#[derive(Debug, Clone, PartialEq)]
pub struct TxDescription {
    pub tx_id: TxId,
    pub tx_type: TxType,
    pub status: TxStatus,
    pub params: TxParameters,
}

impl TxDescription {
    pub fn from_params(params: &TxParameters) -> Option<Self> {
        Some(TxDescription {
            tx_id: params.tx_id()?,
            tx_type: params.get(TxParameterId::TransactionType)?,
            status: params
                .get(TxParameterId::Status)
                .unwrap_or(TxStatus::Pending),
            params: params.clone(),
        })
    }
}
