use crate::{
    coin::AtomicSwapCoin,
    parameters::{TxParameterId, TxParameters},
    wallet::{Amount, Height, Timestamp, TxId, TxType, WalletId},
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SwapOfferStatus {
    Pending,
    InProgress,
    Completed,
    Canceled,
    Expired,
    Failed,
}

impl SwapOfferStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SwapOfferStatus::Pending | SwapOfferStatus::InProgress)
    }
}

impl fmt::Display for SwapOfferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SwapOfferStatus::Pending => "pending",
            SwapOfferStatus::InProgress => "in progress",
            SwapOfferStatus::Completed => "completed",
            SwapOfferStatus::Canceled => "canceled",
            SwapOfferStatus::Expired => "expired",
            SwapOfferStatus::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SwapOffer {
    pub tx_id: TxId,
    pub status: SwapOfferStatus,
    /// Broadcasting wallet; absent for offers exchanged as tokens.
    pub publisher_id: Option<WalletId>,
    pub coin: AtomicSwapCoin,
    /// Derived locally, never transmitted.
    pub is_own: bool,
    pub params: TxParameters,
}

impl SwapOffer {
    pub fn new(tx_id: TxId, params: TxParameters) -> Self {
        let coin = params
            .get(TxParameterId::AtomicSwapCoin)
            .unwrap_or(AtomicSwapCoin::Unknown);

        SwapOffer {
            tx_id,
            status: SwapOfferStatus::Pending,
            publisher_id: None,
            coin,
            is_own: false,
            params,
        }
    }

    /// Status-only form of an offer, used to broadcast status changes.
    pub fn truncated(
        tx_id: TxId,
        status: SwapOfferStatus,
        publisher_id: Option<WalletId>,
        coin: AtomicSwapCoin,
    ) -> Self {
        SwapOffer {
            tx_id,
            status,
            publisher_id,
            coin,
            is_own: false,
            params: TxParameters::new(Some(tx_id)),
        }
    }

    pub fn amount(&self) -> Option<Amount> {
        self.params.get(TxParameterId::Amount)
    }

    pub fn swap_amount(&self) -> Option<Amount> {
        self.params.get(TxParameterId::AtomicSwapAmount)
    }

    pub fn min_height(&self) -> Option<Height> {
        self.params.get(TxParameterId::MinHeight)
    }

    pub fn peer_response_time(&self) -> Option<Height> {
        self.params.get(TxParameterId::PeerResponseTime)
    }

    pub fn create_time(&self) -> Option<Timestamp> {
        self.params.get(TxParameterId::CreateTime)
    }

    pub fn is_beam_side(&self) -> Option<bool> {
        self.params.get(TxParameterId::AtomicSwapIsBeamSide)
    }

    /// Height at which the offer stops being acceptable.
    pub fn expiry_height(&self) -> Option<Height> {
        self.min_height()?.checked_add(self.peer_response_time()?)
    }

    /// Offers lacking either height are treated as expired.
    pub fn is_expired_at(&self, height: Height) -> bool {
        match self.expiry_height() {
            Some(expiry) => expiry <= height,
            None => true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.params.get(TxParameterId::TransactionType) == Some(TxType::AtomicSwap)
            && self.coin.is_known()
            && self.params.get::<AtomicSwapCoin>(TxParameterId::AtomicSwapCoin) == Some(self.coin)
            && self.amount().is_some()
            && self.swap_amount().is_some()
            && self.expiry_height().is_some()
    }

    /// Fills fields this offer is missing from `other`, keeping its own
    /// status.
    pub fn merge(&mut self, other: &SwapOffer) {
        for (sub, id, value) in other.params.iter() {
            if !self.params.contains(id, sub) {
                self.params.set_value(id, value.clone(), sub);
            }
        }
        if self.publisher_id.is_none() {
            self.publisher_id = other.publisher_id;
        }
        if !self.coin.is_known() {
            self.coin = other.coin;
        }
    }
}
