use crate::{
    parameters::{mirror_swap_params, prepare_for_tokenization, SubTxIndex, TxParameterId, TxParameters},
    swap::{state::State, BEAM_LOCK_TIME_IN_BLOCKS},
    token::SwapOfferToken,
    wallet::{Amount, Height, TxFailureReason, TxStatus, WalletId},
};

/// Read-only view of a swap for status reporting.
pub struct SwapTxDescription<'a> {
    params: &'a TxParameters,
}

impl<'a> SwapTxDescription<'a> {
    pub fn new(params: &'a TxParameters) -> Self {
        Self { params }
    }

    pub fn state(&self) -> State {
        self.params.get(TxParameterId::State).unwrap_or(State::Initial)
    }

    pub fn status(&self) -> TxStatus {
        self.params
            .get(TxParameterId::Status)
            .unwrap_or(TxStatus::Pending)
    }

    pub fn status_string(&self) -> &'static str {
        match self.status() {
            TxStatus::Pending => "pending",
            TxStatus::InProgress | TxStatus::Registering => {
                if self.params.contains(TxParameterId::Confirmations, SubTxIndex::RefundTx) {
                    "failing"
                } else {
                    "in progress"
                }
            }
            TxStatus::Completed => "completed",
            TxStatus::Canceled => "canceled",
            TxStatus::Failed if self.is_refunded() => "refunded",
            TxStatus::Failed if self.is_expired() => "expired",
            TxStatus::Failed => "failed",
        }
    }

    pub fn failure_reason(&self) -> Option<TxFailureReason> {
        self.params
            .get(TxParameterId::InternalFailureReason)
            .or_else(|| self.params.get(TxParameterId::FailureReason))
    }

    /// Height from which the native refund kernel is valid.
    pub fn min_refund_height(&self) -> Option<Height> {
        self.params
            .get_sub(TxParameterId::MinHeight, SubTxIndex::BeamRefundTx)
            .or_else(|| {
                self.params
                    .get_sub::<Height>(TxParameterId::MinHeight, SubTxIndex::BeamLockTx)
                    .map(|height| height + BEAM_LOCK_TIME_IN_BLOCKS)
            })
    }

    pub fn max_lock_height(&self) -> Option<Height> {
        self.params
            .get_sub(TxParameterId::MaxHeight, SubTxIndex::BeamLockTx)
            .or_else(|| self.params.get(TxParameterId::PeerResponseHeight))
    }

    /// Nothing can be lost while kernels are only being negotiated. Once the
    /// foreign lock is about to be handled only its sender may still back out,
    /// and only until it is broadcast.
    pub fn is_cancel_available(&self) -> bool {
        match self.state() {
            State::Initial
            | State::BuildingBeamLockTX
            | State::BuildingBeamRefundTX
            | State::BuildingBeamRedeemTX => true,
            State::HandlingContractTX => {
                let is_beam_side = self
                    .params
                    .get::<bool>(TxParameterId::AtomicSwapIsBeamSide)
                    .unwrap_or(false);
                !is_beam_side && !self.params.contains(TxParameterId::TransactionRegistered, SubTxIndex::LockTx)
            }
            _ => false,
        }
    }

    pub fn is_refunded(&self) -> bool {
        self.state() == State::Refunded
    }

    pub fn is_expired(&self) -> bool {
        self.failure_reason() == Some(TxFailureReason::TransactionExpired)
    }

    pub fn fee(&self, sub: SubTxIndex) -> Option<Amount> {
        self.params.get_sub(TxParameterId::Fee, sub)
    }

    /// Token describing the swap, always from its creator's point of view.
    pub fn token(&self) -> SwapOfferToken {
        let is_initiator = self
            .params
            .get::<bool>(TxParameterId::IsInitiator)
            .unwrap_or(false);
        // the creator of an offer waits for the acceptor to start the swap
        let packed = if !is_initiator {
            prepare_for_tokenization(self.params)
        } else {
            let mut mirrored = mirror_swap_params(self.params, false);
            if let Some(creator) = self.params.get::<WalletId>(TxParameterId::PeerId) {
                mirrored.set(TxParameterId::PeerId, creator);
            }
            prepare_for_tokenization(&mirrored)
        };

        SwapOfferToken::from_params(packed)
    }
}
