use crate::{
    coin::AtomicSwapCoin,
    wallet::{Amount, Height, Timestamp, TxFailureReason, TxId, TxStatus, TxType, WalletId},
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

pub const LIBRARY_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Slot of one of the sub-transactions a swap is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SubTxIndex {
    Default = 1,
    BeamLockTx = 2,
    BeamRefundTx = 3,
    BeamRedeemTx = 4,
    LockTx = 5,
    RefundTx = 6,
    RedeemTx = 7,
}

impl std::fmt::Display for SubTxIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", *self as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TxParameterId {
    TransactionType,
    Amount,
    Fee,
    MinHeight,
    MaxHeight,
    Lifetime,
    PeerResponseTime,
    PeerResponseHeight,
    CreateTime,
    MyId,
    PeerId,
    IsSender,
    IsInitiator,
    Status,
    State,
    FailureReason,
    InternalFailureReason,
    PeerProtoVersion,
    ClientVersion,
    LibraryVersion,

    PeerPublicExcess,
    PeerPublicNonce,
    PeerSignature,
    PeerOffset,
    PeerMaxHeight,

    KernelId,
    KernelProofHeight,
    KernelUnconfirmedHeight,
    TransactionRegistered,
    Confirmations,

    AtomicSwapCoin,
    AtomicSwapAmount,
    AtomicSwapIsBeamSide,
    AtomicSwapPublicKey,
    AtomicSwapPrivateKey,
    AtomicSwapPeerPublicKey,
    AtomicSwapPeerPrivateKey,
    AtomicSwapSecretPrivateKey,
    AtomicSwapSecretPublicKey,
    AtomicSwapExternalLockTime,
    AtomicSwapExternalTx,
    AtomicSwapExternalTxId,
    AtomicSwapExternalTxOutputIndex,
    AtomicSwapWithdrawAddress,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    Bool(bool),
    U8(u8),
    U32(u32),
    U64(u64),
    Bytes32([u8; 32]),
    Bytes(Vec<u8>),
    Str(String),
    WalletId(WalletId),
    Coin(AtomicSwapCoin),
    TxType(TxType),
    Status(TxStatus),
    FailureReason(TxFailureReason),
}

/// A Rust type that can be stored in a [`TxParameters`] bag.
pub trait Parameter: Sized {
    fn into_value(self) -> ParameterValue;
    fn from_value(value: &ParameterValue) -> Option<Self>;
}

macro_rules! impl_parameter {
    ($type:ty, $variant:ident) => {
        impl Parameter for $type {
            fn into_value(self) -> ParameterValue {
                ParameterValue::$variant(self)
            }

            fn from_value(value: &ParameterValue) -> Option<Self> {
                match value {
                    ParameterValue::$variant(inner) => Some(inner.clone()),
                    _ => None,
                }
            }
        }
    };
}

impl_parameter!(bool, Bool);
impl_parameter!(u8, U8);
impl_parameter!(u32, U32);
impl_parameter!(u64, U64);
impl_parameter!([u8; 32], Bytes32);
impl_parameter!(Vec<u8>, Bytes);
impl_parameter!(String, Str);
impl_parameter!(WalletId, WalletId);
impl_parameter!(AtomicSwapCoin, Coin);
impl_parameter!(TxType, TxType);
impl_parameter!(TxStatus, Status);
impl_parameter!(TxFailureReason, FailureReason);

/// Typed key/value bag carrying everything known about a transaction.
///
/// Keys are `(SubTxIndex, TxParameterId)` so every sub-transaction of a swap
/// gets its own namespace. The map is ordered, which keeps the serialized form
/// of a bag stable and therefore signable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TxParameters {
    tx_id: Option<TxId>,
    values: BTreeMap<(SubTxIndex, TxParameterId), ParameterValue>,
}

impl TxParameters {
    pub fn new(tx_id: Option<TxId>) -> Self {
        TxParameters {
            tx_id,
            values: BTreeMap::new(),
        }
    }

    pub fn tx_id(&self) -> Option<TxId> {
        self.tx_id
    }

    pub fn get<T: Parameter>(&self, id: TxParameterId) -> Option<T> {
        self.get_sub(id, SubTxIndex::Default)
    }

    pub fn get_sub<T: Parameter>(&self, id: TxParameterId, sub: SubTxIndex) -> Option<T> {
        self.values.get(&(sub, id)).and_then(T::from_value)
    }

    pub fn get_value(&self, id: TxParameterId, sub: SubTxIndex) -> Option<&ParameterValue> {
        self.values.get(&(sub, id))
    }

    pub fn contains(&self, id: TxParameterId, sub: SubTxIndex) -> bool {
        self.values.contains_key(&(sub, id))
    }

    /// Returns whether the stored value changed.
    pub fn set<T: Parameter>(&mut self, id: TxParameterId, value: T) -> bool {
        self.set_sub(id, value, SubTxIndex::Default)
    }

    pub fn set_sub<T: Parameter>(&mut self, id: TxParameterId, value: T, sub: SubTxIndex) -> bool {
        self.set_value(id, value.into_value(), sub)
    }

    pub fn set_value(&mut self, id: TxParameterId, value: ParameterValue, sub: SubTxIndex) -> bool {
        match self.values.insert((sub, id), value.clone()) {
            Some(previous) => previous != value,
            None => true,
        }
    }

    pub fn delete(&mut self, id: TxParameterId, sub: SubTxIndex) -> bool {
        self.values.remove(&(sub, id)).is_some()
    }

    pub fn with<T: Parameter>(mut self, id: TxParameterId, value: T) -> Self {
        self.set(id, value);
        self
    }

    pub fn with_sub<T: Parameter>(mut self, id: TxParameterId, value: T, sub: SubTxIndex) -> Self {
        self.set_sub(id, value, sub);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (SubTxIndex, TxParameterId, &ParameterValue)> {
        self.values.iter().map(|((sub, id), value)| (*sub, *id, value))
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn copy_from(&mut self, source: &TxParameters, id: TxParameterId) {
        if let Some(value) = source.get_value(id, SubTxIndex::Default) {
            self.set_value(id, value.clone(), SubTxIndex::Default);
        }
    }
}

/// Parameters pushed to the counterpart of a transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetTxParameter {
    pub from: Option<WalletId>,
    pub tx_id: TxId,
    pub tx_type: TxType,
    pub params: Vec<(SubTxIndex, TxParameterId, ParameterValue)>,
}

impl SetTxParameter {
    pub fn new(tx_id: TxId) -> Self {
        SetTxParameter {
            from: None,
            tx_id,
            tx_type: TxType::AtomicSwap,
            params: Vec::new(),
        }
    }

    pub fn add<T: Parameter>(self, id: TxParameterId, value: T) -> Self {
        self.add_sub(id, value, SubTxIndex::Default)
    }

    pub fn add_sub<T: Parameter>(mut self, id: TxParameterId, value: T, sub: SubTxIndex) -> Self {
        self.params.push((sub, id, value.into_value()));
        self
    }

    pub fn get<T: Parameter>(&self, id: TxParameterId, sub: SubTxIndex) -> Option<T> {
        self.params
            .iter()
            .find(|(s, i, _)| *s == sub && *i == id)
            .and_then(|(_, _, value)| T::from_value(value))
    }
}

pub fn timestamp_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn create_swap_parameters(tx_id: Option<TxId>) -> TxParameters {
    TxParameters::new(Some(tx_id.unwrap_or_else(TxId::new_random)))
        .with(TxParameterId::TransactionType, TxType::AtomicSwap)
        .with(TxParameterId::IsInitiator, false)
        .with(TxParameterId::CreateTime, timestamp_now())
}

/// Terms of a new swap as entered by its creator.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapTerms {
    pub my_id: WalletId,
    pub min_height: Height,
    pub amount: Amount,
    pub beam_fee: Amount,
    pub swap_coin: AtomicSwapCoin,
    pub swap_amount: Amount,
    pub swap_fee_rate: Amount,
    pub is_beam_side: bool,
    pub response_time: Height,
    pub lifetime: Height,
}

pub fn fill_swap_params(params: &mut TxParameters, terms: &SwapTerms) {
    params.set(TxParameterId::MyId, terms.my_id);
    params.set(TxParameterId::MinHeight, terms.min_height);
    params.set(TxParameterId::Amount, terms.amount);
    params.set(TxParameterId::AtomicSwapCoin, terms.swap_coin);
    params.set(TxParameterId::AtomicSwapAmount, terms.swap_amount);
    params.set(TxParameterId::AtomicSwapIsBeamSide, terms.is_beam_side);
    params.set(TxParameterId::IsSender, terms.is_beam_side);
    params.set(TxParameterId::IsInitiator, false);
    fill_swap_fee(params, terms.beam_fee, terms.swap_fee_rate, terms.is_beam_side);
    params.set(TxParameterId::Lifetime, terms.lifetime);
    params.set(TxParameterId::PeerResponseTime, terms.response_time);
    params.set(TxParameterId::LibraryVersion, LIBRARY_VERSION.to_string());
}

/// Each side pays the native fee of the kernels it owns and the foreign fee
/// rate of the foreign transactions it signs.
pub fn fill_swap_fee(params: &mut TxParameters, beam_fee: Amount, swap_fee_rate: Amount, is_beam_side: bool) {
    if is_beam_side {
        params.set_sub(TxParameterId::Fee, beam_fee, SubTxIndex::BeamLockTx);
        params.set_sub(TxParameterId::Fee, beam_fee, SubTxIndex::BeamRefundTx);
        params.set_sub(TxParameterId::Fee, swap_fee_rate, SubTxIndex::RedeemTx);
    } else {
        params.set_sub(TxParameterId::Fee, beam_fee, SubTxIndex::BeamRedeemTx);
        params.set_sub(TxParameterId::Fee, swap_fee_rate, SubTxIndex::LockTx);
        params.set_sub(TxParameterId::Fee, swap_fee_rate, SubTxIndex::RefundTx);
    }
}

const SHARED_TERMS: [TxParameterId; 9] = [
    TxParameterId::MinHeight,
    TxParameterId::PeerResponseTime,
    TxParameterId::CreateTime,
    TxParameterId::Lifetime,
    TxParameterId::Amount,
    TxParameterId::AtomicSwapAmount,
    TxParameterId::AtomicSwapCoin,
    TxParameterId::ClientVersion,
    TxParameterId::LibraryVersion,
];

/// Re-expresses `original` from the counterpart's point of view.
///
/// `is_own` tells whether `original` was written by the local wallet, in which
/// case our `MyId` becomes the counterpart's `PeerId`.
pub fn mirror_swap_params(original: &TxParameters, is_own: bool) -> TxParameters {
    let mut mirrored = create_swap_parameters(original.tx_id());
    for id in SHARED_TERMS.iter() {
        mirrored.copy_from(original, *id);
    }

    if is_own {
        if let Some(my_id) = original.get::<WalletId>(TxParameterId::MyId) {
            mirrored.set(TxParameterId::PeerId, my_id);
        }
    } else if let Some(peer_id) = original.get::<WalletId>(TxParameterId::PeerId) {
        mirrored.set(TxParameterId::MyId, peer_id);
    }

    let is_initiator = original
        .get::<bool>(TxParameterId::IsInitiator)
        .unwrap_or(false);
    mirrored.set(TxParameterId::IsInitiator, !is_initiator);

    let is_beam_side = original
        .get::<bool>(TxParameterId::AtomicSwapIsBeamSide)
        .unwrap_or(false);
    mirrored.set(TxParameterId::AtomicSwapIsBeamSide, !is_beam_side);
    mirrored.set(TxParameterId::IsSender, !is_beam_side);

    mirrored
}

/// Canonical subset of a swap's parameters that travels inside offers and
/// tokens.
pub fn prepare_for_tokenization(original: &TxParameters) -> TxParameters {
    let mut packed = create_swap_parameters(original.tx_id());
    for id in SHARED_TERMS.iter().chain(
        [
            TxParameterId::PeerId,
            TxParameterId::IsInitiator,
            TxParameterId::AtomicSwapIsBeamSide,
            TxParameterId::IsSender,
        ]
        .iter(),
    ) {
        packed.copy_from(original, *id);
    }

    packed
}
