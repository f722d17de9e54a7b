use crate::{
    coin::AtomicSwapCoin,
    keypair::is_secret_of,
    parameters::{Parameter, ParameterValue, SetTxParameter, SubTxIndex, TxParameterId, TxParameters},
    settings::SwapSettings,
    swap::{
        bridge::Bridge,
        description::SwapTxDescription,
        gateway::{KernelLookup, KernelStatus, NativeGateway, NegotiationChannel, SubTxBuild},
        inbox::{track_native, Inbox, Request, SharedInbox, Update},
        second_side::{mandatory, ForeignSide},
        state::{State, SubTxState},
        BEAM_LOCK_TIME_IN_BLOCKS, BEAM_LOCK_TX_LIFETIME_MAX, MAX_SENT_TIME_OF_BEAM_REDEEM_IN_BLOCKS,
        SWAP_PROTO_VERSION,
    },
    wallet::{Amount, Height, TxDescription, TxFailureReason, TxId, TxStatus},
};
use std::rc::Rc;
use tracing::{debug, error, info, warn};

/// Bound on update rounds run back to back, in case two checks keep undoing
/// each other.
const MAX_UPDATE_ROUNDS: usize = 64;

type Outgoing = Vec<(SubTxIndex, TxParameterId, ParameterValue)>;

/// State machine settling one agreed swap.
///
/// The transaction is re-entered through [`AtomicSwapTransaction::update`]
/// whenever something it waits on may have changed: a new native tip, a peer
/// message or a completed bridge call. Everything it knows lives in its
/// parameter bag.
pub struct AtomicSwapTransaction {
    tx_id: TxId,
    params: TxParameters,
    gateway: Rc<dyn NativeGateway>,
    channel: Option<Box<dyn NegotiationChannel>>,
    foreign: ForeignSide,
    inbox: SharedInbox,
    cancel_requested: bool,
}

impl AtomicSwapTransaction {
    pub fn new(
        mut params: TxParameters,
        settings: &SwapSettings,
        gateway: Rc<dyn NativeGateway>,
        bridge: Rc<dyn Bridge>,
        channel: Box<dyn NegotiationChannel>,
    ) -> Result<Self, TxFailureReason> {
        let tx_id = params.tx_id().ok_or(TxFailureReason::FailedToGetParameter)?;
        let coin = mandatory::<AtomicSwapCoin>(&params, TxParameterId::AtomicSwapCoin, SubTxIndex::Default)?;
        if !coin.is_known() {
            error!("{} unsupported coin {}", tx_id, coin);
            return Err(TxFailureReason::InvalidTransaction);
        }
        let is_beam_side = mandatory::<bool>(&params, TxParameterId::AtomicSwapIsBeamSide, SubTxIndex::Default)?;

        if !params.contains(TxParameterId::State, SubTxIndex::Default) {
            params.set(TxParameterId::State, State::Initial);
        }

        let inbox = Inbox::shared();
        let foreign = ForeignSide::new(
            tx_id,
            bridge,
            settings.coin_params(coin),
            settings.quick_refund,
            !is_beam_side,
            inbox.clone(),
        );

        Ok(Self {
            tx_id,
            params,
            gateway,
            channel: Some(channel),
            foreign,
            inbox,
            cancel_requested: false,
        })
    }

    pub fn tx_id(&self) -> TxId {
        self.tx_id
    }

    pub fn state(&self) -> State {
        self.params.get(TxParameterId::State).unwrap_or(State::Initial)
    }

    pub fn params(&self) -> &TxParameters {
        &self.params
    }

    pub fn foreign_side(&self) -> &ForeignSide {
        &self.foreign
    }

    pub fn description(&self) -> Option<TxDescription> {
        TxDescription::from_params(&self.params)
    }

    pub fn swap_description(&self) -> SwapTxDescription<'_> {
        SwapTxDescription::new(&self.params)
    }

    pub fn is_finished(&self) -> bool {
        self.state().is_final() && self.channel.is_none()
    }

    pub fn can_cancel(&self) -> bool {
        self.swap_description().is_cancel_available()
            && !self
                .inbox
                .borrow()
                .is_in_flight(Request::SendRawTx(SubTxIndex::LockTx))
    }

    /// Asks the swap to wind down. Refused once funds may be at stake.
    pub fn cancel(&mut self) -> bool {
        // a broadcast may have completed since the last update
        self.apply_updates();
        if !self.can_cancel() {
            warn!("{} cannot be canceled in state '{}'", self.tx_id, self.state());
            return false;
        }

        self.cancel_requested = true;
        self.update();
        true
    }

    /// Accepts parameters from the counterpart, keeping only those it is
    /// allowed to set.
    pub fn on_peer_message(&mut self, message: SetTxParameter) -> bool {
        if message.tx_id != self.tx_id {
            return false;
        }

        for (sub, id, value) in message.params {
            if self.is_settable_by_peer(id, sub) {
                self.params.set_value(id, value, sub);
            } else {
                warn!("{}{} peer attempted to set {:?}", self.tx_id, sub, id);
            }
        }

        self.update();
        true
    }

    /// Reverts what a chain reorganization below `height` undid.
    pub fn rollback(&mut self, height: Height) -> bool {
        let mut changed = false;

        if self.is_beam_side() {
            if self.forget_proof_above(SubTxIndex::BeamRefundTx, height) {
                self.set_state(State::SendingBeamRefundTX);
                changed = true;
            }
            if self.forget_proof_above(SubTxIndex::BeamLockTx, height) {
                self.set_state(State::SendingBeamLockTX);
                changed = true;
            }
        } else if self.forget_proof_above(SubTxIndex::BeamRedeemTx, height) {
            self.set_state(State::SendingBeamRedeemTX);
            changed = true;
        }

        if changed {
            self.params.set(TxParameterId::Status, TxStatus::InProgress);
        }
        changed
    }

    fn forget_proof_above(&mut self, sub: SubTxIndex, height: Height) -> bool {
        match self.params.get_sub::<Height>(TxParameterId::KernelProofHeight, sub) {
            Some(proof_height) if proof_height > height => {
                self.params.delete(TxParameterId::KernelProofHeight, sub);
                self.params.delete(TxParameterId::KernelUnconfirmedHeight, sub);
                true
            }
            _ => false,
        }
    }

    pub fn update(&mut self) {
        self.foreign.request_block_count();

        for _ in 0..MAX_UPDATE_ROUNDS {
            let before = (self.params.clone(), self.foreign.block_count());

            self.apply_updates();
            if let Err(reason) = self.update_impl() {
                self.on_failed(reason, true);
            }

            let settled = before == (self.params.clone(), self.foreign.block_count());
            if settled && !self.inbox.borrow().has_updates() {
                return;
            }
        }

        warn!("{} still changing after {} rounds", self.tx_id, MAX_UPDATE_ROUNDS);
    }

    fn apply_updates(&mut self) {
        let updates = self.inbox.borrow_mut().take_updates();

        for update in updates {
            match update {
                Update::Param(sub, id, value) => {
                    self.params.set_value(id, value, sub);
                }
                Update::ForeignHeight(height) => self.foreign.set_block_count(height),
                Update::Failed(SubTxIndex::Default, reason) => self.on_failed(reason, true),
                Update::Failed(sub, reason) => {
                    warn!("{}{} failed: {}", self.tx_id, sub, reason);
                    self.params
                        .set_sub(TxParameterId::InternalFailureReason, reason, sub);
                }
            }
        }
    }

    fn update_impl(&mut self) -> Result<(), TxFailureReason> {
        if self.cancel_requested {
            self.cancel_requested = false;
            if self.can_cancel() {
                info!("{} canceling", self.tx_id);
                self.set_state(State::Canceled);
            } else {
                warn!("{} cancel dropped, state is now '{}'", self.tx_id, self.state());
            }
        }

        if self.check_external_failures() {
            return Ok(());
        }
        self.check_expired();
        self.check_sub_tx_failures();

        let is_beam_side = self.is_beam_side();
        match self.state() {
            State::Initial => self.initialize()?,
            State::BuildingBeamLockTX => {
                if self.build_beam_lock_tx()? == SubTxState::Constructed {
                    self.set_state(State::BuildingBeamRefundTX);
                }
            }
            State::BuildingBeamRefundTX => {
                if self.build_beam_withdraw_tx(SubTxIndex::BeamRefundTx)? == SubTxState::Constructed {
                    self.set_state(State::BuildingBeamRedeemTX);
                }
            }
            State::BuildingBeamRedeemTX => {
                if self.build_beam_withdraw_tx(SubTxIndex::BeamRedeemTx)? == SubTxState::Constructed {
                    self.set_state(State::HandlingContractTX);
                }
            }
            State::HandlingContractTX => self.handle_contract_tx()?,
            State::SendingBeamLockTX => {
                if is_beam_side && !self.send_sub_tx(SubTxIndex::BeamLockTx)? {
                    return Ok(());
                }
                if !is_beam_side && self.foreign.is_lock_time_expired(&self.params) {
                    info!("{} foreign lock time expired", self.tx_id);
                    self.set_state(State::SendingRefundTX);
                    return Ok(());
                }
                if self.complete_sub_tx(SubTxIndex::BeamLockTx)? {
                    info!("{}{} Beam LockTX completed", self.tx_id, SubTxIndex::BeamLockTx);
                    self.set_state(State::SendingBeamRedeemTX);
                }
            }
            State::SendingBeamRedeemTX => {
                if is_beam_side {
                    self.await_beam_redeem()?;
                } else {
                    self.send_beam_redeem()?;
                }
            }
            State::SendingRedeemTX => {
                let height = self.gateway.current_height();
                if self.foreign.send_redeem(&self.params, height)? && self.foreign.confirm_redeem_tx(&self.params) {
                    info!("{}{} RedeemTX completed", self.tx_id, SubTxIndex::RedeemTx);
                    self.set_state(State::CompleteSwap);
                }
            }
            State::SendingRefundTX => {
                let height = self.gateway.current_height();
                if !self.foreign.is_lock_time_expired(&self.params)
                    && !self.foreign.is_quick_refund_available(&self.params, height)
                {
                    return Ok(());
                }
                if self.foreign.send_refund(&self.params, height)? && self.foreign.confirm_refund_tx(&self.params) {
                    info!("{}{} RefundTX completed", self.tx_id, SubTxIndex::RefundTx);
                    self.set_state(State::Refunded);
                }
            }
            State::SendingBeamRefundTX => {
                if !self.is_beam_lock_time_expired()? {
                    return Ok(());
                }
                if self.complete_beam_withdraw_tx(SubTxIndex::BeamRefundTx)? {
                    info!("{}{} Beam RefundTX completed", self.tx_id, SubTxIndex::BeamRefundTx);
                    self.send_quick_refund_private_key();
                    self.set_state(State::Refunded);
                }
            }
            State::CompleteSwap => self.finish(TxStatus::Completed),
            State::Canceled => {
                if self.status() != Some(TxStatus::Canceled) {
                    self.notify_failure(TxFailureReason::Canceled);
                    self.gateway.rollback_tx(self.tx_id);
                }
                self.finish(TxStatus::Canceled);
            }
            State::Failed => {
                if self.status() != Some(TxStatus::Failed) {
                    if let Some(reason) = self.params.get::<TxFailureReason>(TxParameterId::FailureReason) {
                        error!("{} swap failed, peer reported: {}", self.tx_id, reason);
                    }
                }
                self.finish(TxStatus::Failed);
            }
            State::Refunded => self.finish(TxStatus::Failed),
        }

        Ok(())
    }

    fn initialize(&mut self) -> Result<(), TxFailureReason> {
        let amount = mandatory::<Amount>(&self.params, TxParameterId::Amount, SubTxIndex::Default)?;
        let swap_amount = mandatory::<Amount>(&self.params, TxParameterId::AtomicSwapAmount, SubTxIndex::Default)?;
        if amount == 0 || swap_amount == 0 {
            return Err(TxFailureReason::SwapInvalidAmount);
        }

        if !self.params.contains(TxParameterId::PeerResponseHeight, SubTxIndex::Default) {
            let min_height = mandatory::<Height>(&self.params, TxParameterId::MinHeight, SubTxIndex::Default)?;
            let response_time = mandatory::<Height>(&self.params, TxParameterId::PeerResponseTime, SubTxIndex::Default)?;
            self.params
                .set(TxParameterId::PeerResponseHeight, min_height + response_time);
        }

        let lifetime = mandatory::<Height>(&self.params, TxParameterId::Lifetime, SubTxIndex::Default)?;
        if lifetime > BEAM_LOCK_TX_LIFETIME_MAX {
            error!("{} lifetime {} exceeds {}", self.tx_id, lifetime, BEAM_LOCK_TX_LIFETIME_MAX);
            self.on_sub_tx_failed(TxFailureReason::InvalidTransaction, SubTxIndex::BeamLockTx);
            return Ok(());
        }

        if self.is_initiator() {
            if !self.foreign.initialize(&mut self.params)? {
                return Ok(());
            }
            self.foreign.init_lock_time(&mut self.params);
            self.params.set_sub(
                TxParameterId::MinHeight,
                self.gateway.current_height(),
                SubTxIndex::BeamLockTx,
            );
            self.send_invitation()?;
        } else {
            if !self.params.contains(TxParameterId::AtomicSwapExternalLockTime, SubTxIndex::Default) {
                return Ok(());
            }
            if !self.foreign.initialize(&mut self.params)? {
                return Ok(());
            }
            if !self.foreign.validate_lock_time(&self.params, self.gateway.current_height())? {
                warn!("{}{} peer lock time is unacceptable", self.tx_id, SubTxIndex::LockTx);
                self.on_sub_tx_failed(TxFailureReason::InvalidTransaction, SubTxIndex::LockTx);
                return Ok(());
            }

            let min_height = mandatory::<Height>(&self.params, TxParameterId::MinHeight, SubTxIndex::Default)?;
            let lock_min_height = mandatory::<Height>(&self.params, TxParameterId::MinHeight, SubTxIndex::BeamLockTx)?;
            let response_height = mandatory::<Height>(&self.params, TxParameterId::PeerResponseHeight, SubTxIndex::Default)?;
            if lock_min_height < min_height || lock_min_height >= response_height {
                warn!(
                    "{}{} lock min height {} is outside [{}, {})",
                    self.tx_id,
                    SubTxIndex::BeamLockTx,
                    lock_min_height,
                    min_height,
                    response_height
                );
                self.on_failed(TxFailureReason::MinHeightIsUnacceptable, true);
                return Ok(());
            }
        }

        let lock_min_height = mandatory::<Height>(&self.params, TxParameterId::MinHeight, SubTxIndex::BeamLockTx)?;
        self.params
            .set_sub(TxParameterId::Lifetime, lifetime, SubTxIndex::BeamLockTx);
        self.params.set_sub(
            TxParameterId::MaxHeight,
            lock_min_height + lifetime,
            SubTxIndex::BeamLockTx,
        );
        self.set_state(State::BuildingBeamLockTX);

        Ok(())
    }

    fn send_invitation(&mut self) -> Result<(), TxFailureReason> {
        let public_key = mandatory::<String>(&self.params, TxParameterId::AtomicSwapPublicKey, SubTxIndex::Default)?;
        let lock_time = mandatory::<u64>(&self.params, TxParameterId::AtomicSwapExternalLockTime, SubTxIndex::Default)?;
        let lock_min_height = mandatory::<Height>(&self.params, TxParameterId::MinHeight, SubTxIndex::BeamLockTx)?;

        let message = SetTxParameter::new(self.tx_id)
            .add(TxParameterId::PeerProtoVersion, SWAP_PROTO_VERSION)
            .add(TxParameterId::AtomicSwapPeerPublicKey, public_key)
            .add(TxParameterId::AtomicSwapExternalLockTime, lock_time)
            .add_sub(TxParameterId::MinHeight, lock_min_height, SubTxIndex::BeamLockTx);

        self.send_to_peer(message)
    }

    fn build_beam_lock_tx(&mut self) -> Result<SubTxState, TxFailureReason> {
        let sub = SubTxIndex::BeamLockTx;
        let is_owner = self.is_beam_side();
        if !self.params.contains(TxParameterId::Fee, sub) {
            if is_owner {
                return Err(TxFailureReason::FailedToGetParameter);
            }
            return Ok(SubTxState::Initial);
        }

        let public_key = mandatory::<String>(&self.params, TxParameterId::AtomicSwapPublicKey, SubTxIndex::Default)?;
        let mut extra = vec![(
            SubTxIndex::Default,
            TxParameterId::AtomicSwapPeerPublicKey,
            public_key.into_value(),
        )];
        if is_owner {
            extra.push(self.outgoing(TxParameterId::Fee, sub)?);
        }

        self.build_native_sub_tx(sub, is_owner, extra)
    }

    fn build_beam_withdraw_tx(&mut self, sub: SubTxIndex) -> Result<SubTxState, TxFailureReason> {
        let is_owner = self.is_withdraw_owner(sub);
        let fee = match self.params.get_sub::<Amount>(TxParameterId::Fee, sub) {
            Some(fee) => fee,
            None if is_owner => return Err(TxFailureReason::FailedToGetParameter),
            None => return Ok(SubTxState::Initial),
        };

        if !self.params.contains(TxParameterId::Amount, sub) {
            let amount = mandatory::<Amount>(&self.params, TxParameterId::Amount, SubTxIndex::Default)?;
            if amount <= fee {
                return Err(TxFailureReason::FeeIsTooSmall);
            }
            self.params.set_sub(TxParameterId::Amount, amount - fee, sub);
        }
        if !self.params.contains(TxParameterId::MinHeight, sub) {
            let lock_min_height = mandatory::<Height>(&self.params, TxParameterId::MinHeight, SubTxIndex::BeamLockTx)?;
            let min_height = if sub == SubTxIndex::BeamRefundTx {
                lock_min_height + BEAM_LOCK_TIME_IN_BLOCKS
            } else {
                lock_min_height
            };
            self.params.set_sub(TxParameterId::MinHeight, min_height, sub);
        }

        let mut extra = Vec::new();
        if is_owner {
            extra.push(self.outgoing(TxParameterId::Amount, sub)?);
            extra.push(self.outgoing(TxParameterId::Fee, sub)?);
            extra.push(self.outgoing(TxParameterId::MinHeight, sub)?);
            if sub == SubTxIndex::BeamRedeemTx {
                extra.push(self.outgoing(TxParameterId::AtomicSwapSecretPublicKey, sub)?);
            }
        }

        self.build_native_sub_tx(sub, is_owner, extra)
    }

    fn build_native_sub_tx(&mut self, sub: SubTxIndex, is_owner: bool, extra: Outgoing) -> Result<SubTxState, TxFailureReason> {
        let state = self
            .params
            .get_sub(TxParameterId::State, sub)
            .unwrap_or(SubTxState::Initial);
        if state == SubTxState::Constructed {
            return Ok(state);
        }

        match self.gateway.build_sub_tx(&self.params, sub, is_owner)? {
            SubTxBuild::Invitation(payload) if is_owner && state == SubTxState::Initial => {
                debug!("{}{} sending invitation", self.tx_id, sub);
                self.send_sub_tx_params(sub, payload, extra)?;
                self.params.set_sub(TxParameterId::State, SubTxState::Invitation, sub);
                self.params.set(TxParameterId::Status, TxStatus::InProgress);
                Ok(SubTxState::Invitation)
            }
            SubTxBuild::Confirmation { reply, kernel_id } if !is_owner => {
                debug!("{}{} sending confirmation", self.tx_id, sub);
                self.send_sub_tx_params(sub, reply, extra)?;
                self.params.set_sub(TxParameterId::KernelId, kernel_id, sub);
                self.params.set_sub(TxParameterId::State, SubTxState::Constructed, sub);
                self.params.set(TxParameterId::Status, TxStatus::InProgress);
                Ok(SubTxState::Constructed)
            }
            SubTxBuild::Constructed { kernel_id } => {
                self.params.set_sub(TxParameterId::KernelId, kernel_id, sub);
                self.params.set_sub(TxParameterId::State, SubTxState::Constructed, sub);
                Ok(SubTxState::Constructed)
            }
            _ => Ok(state),
        }
    }

    fn send_sub_tx_params(
        &mut self,
        sub: SubTxIndex,
        payload: Vec<(TxParameterId, ParameterValue)>,
        extra: Outgoing,
    ) -> Result<(), TxFailureReason> {
        let mut message = SetTxParameter::new(self.tx_id);
        message
            .params
            .extend(payload.into_iter().map(|(id, value)| (sub, id, value)));
        message.params.extend(extra);

        self.send_to_peer(message)
    }

    fn outgoing(&self, id: TxParameterId, sub: SubTxIndex) -> Result<(SubTxIndex, TxParameterId, ParameterValue), TxFailureReason> {
        let value = self
            .params
            .get_value(id, sub)
            .cloned()
            .ok_or(TxFailureReason::FailedToGetParameter)?;

        Ok((sub, id, value))
    }

    fn handle_contract_tx(&mut self) -> Result<(), TxFailureReason> {
        if self.is_beam_side() {
            if !self.foreign.confirm_lock_tx(&self.params)? {
                return Ok(());
            }
            info!("{}{} LockTX confirmed", self.tx_id, SubTxIndex::LockTx);
        } else {
            if !self
                .foreign
                .has_enough_time_to_process_lock_tx(&self.params, self.gateway.current_height())?
            {
                self.on_failed(TxFailureReason::NotEnoughTimeToFinishBtcTx, true);
                return Ok(());
            }
            if !self.foreign.send_lock_tx(&self.params)? {
                return Ok(());
            }
            self.send_external_tx_details()?;
            // the peer registers the native lock, we only wait for its proof
            self.params
                .set_sub(TxParameterId::TransactionRegistered, true, SubTxIndex::BeamLockTx);
        }

        self.set_state(State::SendingBeamLockTX);
        Ok(())
    }

    fn send_external_tx_details(&mut self) -> Result<(), TxFailureReason> {
        let sub = SubTxIndex::LockTx;
        let public_key = mandatory::<String>(&self.params, TxParameterId::AtomicSwapPublicKey, SubTxIndex::Default)?;
        let lock_tx_id = mandatory::<String>(&self.params, TxParameterId::AtomicSwapExternalTxId, sub)?;
        let output_index = mandatory::<u32>(&self.params, TxParameterId::AtomicSwapExternalTxOutputIndex, sub)?;

        let message = SetTxParameter::new(self.tx_id)
            .add(TxParameterId::AtomicSwapPeerPublicKey, public_key)
            .add_sub(TxParameterId::AtomicSwapExternalTxId, lock_tx_id, sub)
            .add_sub(TxParameterId::AtomicSwapExternalTxOutputIndex, output_index, sub);

        self.send_to_peer(message)
    }

    /// Beam side: waits for the peer to take the native coins, learning the
    /// secret from its redeem kernel, or refunds once that can no longer
    /// happen in time.
    fn await_beam_redeem(&mut self) -> Result<(), TxFailureReason> {
        let sub = SubTxIndex::BeamRedeemTx;
        if self.is_beam_lock_time_expired()?
            && !self.params.contains(TxParameterId::AtomicSwapSecretPrivateKey, sub)
        {
            let refund_min_height = mandatory::<Height>(&self.params, TxParameterId::MinHeight, SubTxIndex::BeamRefundTx)?;
            let last_unconfirmed = self
                .params
                .get_sub::<Height>(TxParameterId::KernelUnconfirmedHeight, sub)
                .unwrap_or(0);
            if last_unconfirmed > refund_min_height {
                info!("{}{} peer never redeemed, refunding", self.tx_id, sub);
                self.set_state(State::SendingBeamRefundTX);
                return Ok(());
            }
        }

        if !self.get_kernel_from_chain(sub)? {
            return Ok(());
        }

        let secret = mandatory::<[u8; 32]>(&self.params, TxParameterId::AtomicSwapSecretPrivateKey, sub)?;
        let secret_public_key = mandatory::<String>(&self.params, TxParameterId::AtomicSwapSecretPublicKey, sub)?;
        if !is_secret_of(&secret, &secret_public_key) {
            error!("{}{} redeem kernel revealed a wrong secret", self.tx_id, sub);
            return Err(TxFailureReason::InvalidKernelProof);
        }

        info!("{}{} Beam RedeemTX completed, secret extracted", self.tx_id, sub);
        self.set_state(State::SendingRedeemTX);
        Ok(())
    }

    /// Foreign side: takes the native coins while it is still safe to, else
    /// falls back to refunding the foreign lock.
    fn send_beam_redeem(&mut self) -> Result<(), TxFailureReason> {
        let sub = SubTxIndex::BeamRedeemTx;
        if !self.params.contains(TxParameterId::TransactionRegistered, sub) && !self.is_safe_to_send_beam_redeem()? {
            info!("{}{} too late to redeem, refunding", self.tx_id, sub);
            self.set_state(State::SendingRefundTX);
            return Ok(());
        }

        if self.complete_beam_withdraw_tx(sub)? {
            info!("{}{} Beam RedeemTX completed", self.tx_id, sub);
            self.set_state(State::CompleteSwap);
        }
        Ok(())
    }

    fn is_safe_to_send_beam_redeem(&self) -> Result<bool, TxFailureReason> {
        let lock_min_height = mandatory::<Height>(&self.params, TxParameterId::MinHeight, SubTxIndex::BeamLockTx)?;

        Ok(self.gateway.current_height() < lock_min_height + MAX_SENT_TIME_OF_BEAM_REDEEM_IN_BLOCKS)
    }

    fn is_beam_lock_time_expired(&self) -> Result<bool, TxFailureReason> {
        let refund_min_height = mandatory::<Height>(&self.params, TxParameterId::MinHeight, SubTxIndex::BeamRefundTx)?;

        Ok(self.gateway.current_height() >= refund_min_height)
    }

    fn complete_beam_withdraw_tx(&mut self, sub: SubTxIndex) -> Result<bool, TxFailureReason> {
        Ok(self.send_sub_tx(sub)? && self.complete_sub_tx(sub)?)
    }

    /// Registers the kernel of `sub` once. Returns true when it is in the
    /// node's hands.
    fn send_sub_tx(&mut self, sub: SubTxIndex) -> Result<bool, TxFailureReason> {
        match self.params.get_sub::<bool>(TxParameterId::TransactionRegistered, sub) {
            None => {
                if let Some(done) = track_native(&self.inbox, Request::RegisterKernel(sub), move |registered: bool| {
                    vec![Update::param(sub, TxParameterId::TransactionRegistered, registered)]
                }) {
                    debug!("{}{} registering kernel", self.tx_id, sub);
                    self.gateway.register_tx(self.tx_id, sub, done);
                }
                Ok(false)
            }
            Some(true) => Ok(true),
            Some(false) => {
                let last_unconfirmed = self
                    .params
                    .get_sub::<Height>(TxParameterId::KernelUnconfirmedHeight, sub)
                    .unwrap_or(0);
                if last_unconfirmed > 0 {
                    self.on_sub_tx_failed(TxFailureReason::FailedToRegister, sub);
                    return Ok(false);
                }
                // someone else may have registered it already
                Ok(true)
            }
        }
    }

    fn complete_sub_tx(&mut self, sub: SubTxIndex) -> Result<bool, TxFailureReason> {
        if self.params.contains(TxParameterId::KernelProofHeight, sub) {
            return Ok(true);
        }

        let kernel_id = mandatory::<[u8; 32]>(&self.params, TxParameterId::KernelId, sub)?;
        if let Some(done) = track_native(&self.inbox, Request::ConfirmKernel(sub), move |status: KernelStatus| {
            vec![kernel_status_update(sub, status)]
        }) {
            self.gateway.confirm_kernel(self.tx_id, kernel_id, sub, done);
        }

        Ok(false)
    }

    fn get_kernel_from_chain(&mut self, sub: SubTxIndex) -> Result<bool, TxFailureReason> {
        if self.params.contains(TxParameterId::KernelProofHeight, sub) {
            return Ok(true);
        }

        let kernel_id = mandatory::<[u8; 32]>(&self.params, TxParameterId::KernelId, sub)?;
        if let Some(done) = track_native(&self.inbox, Request::GetKernel(sub), move |lookup: KernelLookup| {
            let mut updates = Vec::new();
            if let Some(secret) = lookup.secret {
                updates.push(Update::param(sub, TxParameterId::AtomicSwapSecretPrivateKey, secret));
            }
            updates.push(kernel_status_update(sub, lookup.status));
            updates
        }) {
            self.gateway.get_kernel(self.tx_id, kernel_id, sub, done);
        }

        Ok(false)
    }

    fn send_quick_refund_private_key(&mut self) {
        let private_key = match self.params.get::<[u8; 32]>(TxParameterId::AtomicSwapPrivateKey) {
            Some(key) => key,
            None => return,
        };

        let message =
            SetTxParameter::new(self.tx_id).add(TxParameterId::AtomicSwapPeerPrivateKey, private_key);
        if let Err(e) = self.send_to_peer(message) {
            warn!("{} could not disclose refund key: {}", self.tx_id, e);
        }
    }

    /// Reacts to a failure the peer reported. Returns true when the swap
    /// changed course because of it.
    fn check_external_failures(&mut self) -> bool {
        let reason = match self.params.get::<TxFailureReason>(TxParameterId::FailureReason) {
            Some(reason) => reason,
            None => return false,
        };

        let state = self.state();
        let rollback_and_fail = match state {
            State::Initial => {
                self.set_state(State::Failed);
                return true;
            }
            State::BuildingBeamLockTX | State::BuildingBeamRefundTX | State::BuildingBeamRedeemTX => true,
            // our foreign lock has not left yet
            State::HandlingContractTX => {
                self.is_beam_side()
                    || (!self.params.contains(TxParameterId::TransactionRegistered, SubTxIndex::LockTx)
                        && !self
                            .inbox
                            .borrow()
                            .is_in_flight(Request::SendRawTx(SubTxIndex::LockTx)))
            }
            State::SendingBeamLockTX => {
                let height = self.gateway.current_height();
                if !self.is_beam_side() && self.foreign.is_quick_refund_available(&self.params, height) {
                    info!("{} peer failed with '{}', quick refund", self.tx_id, reason);
                    self.set_state(State::SendingRefundTX);
                    return true;
                }
                false
            }
            _ => false,
        };

        if rollback_and_fail {
            info!("{} peer failed with '{}' in state '{}'", self.tx_id, reason, state);
            self.gateway.rollback_tx(self.tx_id);
            self.set_state(State::Failed);
        }
        rollback_and_fail
    }

    fn check_sub_tx_failures(&mut self) {
        if !matches!(self.state(), State::Initial | State::HandlingContractTX) {
            return;
        }
        if let Some(reason) = self
            .params
            .get_sub::<TxFailureReason>(TxParameterId::InternalFailureReason, SubTxIndex::LockTx)
        {
            self.on_failed(reason, true);
        }
    }

    /// Gives up on a swap whose native lock did not make it on chain before
    /// its max height.
    fn check_expired(&mut self) {
        if self.params.contains(TxParameterId::InternalFailureReason, SubTxIndex::Default)
            || self.state().is_final()
            || self.params.contains(TxParameterId::KernelProofHeight, SubTxIndex::BeamLockTx)
        {
            return;
        }

        let max_height = match self
            .params
            .get_sub::<Height>(TxParameterId::MaxHeight, SubTxIndex::BeamLockTx)
            .or_else(|| self.params.get(TxParameterId::PeerResponseHeight))
        {
            Some(height) => height,
            None => return,
        };

        let sub = SubTxIndex::BeamLockTx;
        let registered = self.params.get_sub(TxParameterId::TransactionRegistered, sub) == Some(true);
        let height = self.gateway.current_height();
        let expired = if !registered || !self.params.contains(TxParameterId::KernelId, sub) {
            height > max_height
        } else {
            self.params
                .get_sub::<Height>(TxParameterId::KernelUnconfirmedHeight, sub)
                .map_or(false, |last_unconfirmed| last_unconfirmed >= max_height)
        };

        if expired {
            info!(
                "{} expired, current height {}, max lock height {}",
                self.tx_id, height, max_height
            );
            self.on_failed(TxFailureReason::TransactionExpired, false);
        }
    }

    fn on_sub_tx_failed(&mut self, reason: TxFailureReason, sub: SubTxIndex) {
        if self.params.get_sub(TxParameterId::InternalFailureReason, sub) == Some(reason) {
            return;
        }

        error!("{}{} failed: {}", self.tx_id, sub, reason);
        self.params
            .set_sub(TxParameterId::InternalFailureReason, reason, sub);
        self.on_failed(TxFailureReason::SubTxFailed, true);
    }

    fn on_failed(&mut self, reason: TxFailureReason, notify: bool) {
        if self.params.get(TxParameterId::InternalFailureReason) == Some(reason) {
            return;
        }
        error!("{} failed in state '{}': {}", self.tx_id, self.state(), reason);

        if notify {
            let notified = if reason == TxFailureReason::NoInputs {
                TxFailureReason::Canceled
            } else {
                reason
            };
            self.notify_failure(notified);
        }
        self.params
            .set(TxParameterId::InternalFailureReason, reason);

        match self.state() {
            State::Initial => self.set_state(State::Failed),
            State::BuildingBeamLockTX
            | State::BuildingBeamRefundTX
            | State::BuildingBeamRedeemTX
            | State::HandlingContractTX => {
                self.gateway.rollback_tx(self.tx_id);
                self.set_state(State::Failed);
            }
            State::SendingBeamLockTX => {
                if self.is_beam_side() {
                    self.gateway.rollback_tx(self.tx_id);
                    self.set_state(State::Failed);
                } else {
                    self.set_state(State::SendingRefundTX);
                }
            }
            State::SendingBeamRedeemTX if !self.is_beam_side() => {
                self.set_state(State::SendingRefundTX);
            }
            _ => {}
        }
    }

    /// Tells the peer why we stopped. Before any native coins can be locked
    /// the beam side also hands over its foreign key, so the peer can take
    /// its coins back right away.
    fn notify_failure(&mut self, reason: TxFailureReason) {
        let mut message = SetTxParameter::new(self.tx_id).add(TxParameterId::FailureReason, reason);

        let discloses_key = matches!(
            self.state(),
            State::BuildingBeamLockTX
                | State::BuildingBeamRefundTX
                | State::BuildingBeamRedeemTX
                | State::HandlingContractTX
                | State::Canceled
        );
        if self.is_beam_side() && discloses_key {
            if let Some(private_key) = self.params.get::<[u8; 32]>(TxParameterId::AtomicSwapPrivateKey) {
                message = message.add(TxParameterId::AtomicSwapPeerPrivateKey, private_key);
            }
        }

        if let Err(e) = self.send_to_peer(message) {
            warn!("{} could not notify the peer: {}", self.tx_id, e);
        }
    }

    fn send_to_peer(&mut self, mut message: SetTxParameter) -> Result<(), TxFailureReason> {
        message.from = self.params.get(TxParameterId::MyId);

        match &self.channel {
            Some(channel) if channel.send(message) => Ok(()),
            _ => Err(TxFailureReason::FailedToSendParameters),
        }
    }

    fn finish(&mut self, status: TxStatus) {
        if self.status() != Some(status) {
            info!("{} swap {}", self.tx_id, self.state());
            self.params.set(TxParameterId::Status, status);
        }
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
    }

    fn is_settable_by_peer(&self, id: TxParameterId, sub: SubTxIndex) -> bool {
        use TxParameterId::*;

        let is_beam_side = self.is_beam_side();
        match sub {
            SubTxIndex::Default => match id {
                AtomicSwapExternalLockTime => !self.is_initiator(),
                PeerProtoVersion | AtomicSwapPeerPublicKey | FailureReason | AtomicSwapPeerPrivateKey => true,
                _ => false,
            },
            SubTxIndex::BeamLockTx => match id {
                MinHeight => !self.is_initiator(),
                Fee => !is_beam_side,
                PeerSignature | PeerOffset => is_beam_side,
                PeerMaxHeight | PeerPublicExcess | PeerPublicNonce => true,
                _ => false,
            },
            SubTxIndex::BeamRedeemTx | SubTxIndex::BeamRefundTx => {
                let is_owner = self.is_withdraw_owner(sub);
                match id {
                    Amount | Fee | MinHeight => !is_owner,
                    PeerOffset => is_owner,
                    PeerPublicExcess | PeerPublicNonce | PeerSignature => true,
                    AtomicSwapSecretPublicKey => sub == SubTxIndex::BeamRedeemTx && is_beam_side,
                    _ => false,
                }
            }
            SubTxIndex::LockTx => {
                is_beam_side && matches!(id, AtomicSwapExternalTxId | AtomicSwapExternalTxOutputIndex)
            }
            SubTxIndex::RefundTx | SubTxIndex::RedeemTx => false,
        }
    }

    /// The beam side owns its refund, the foreign side owns the redeem.
    fn is_withdraw_owner(&self, sub: SubTxIndex) -> bool {
        let is_beam_side = self.is_beam_side();
        (is_beam_side && sub == SubTxIndex::BeamRefundTx) || (!is_beam_side && sub == SubTxIndex::BeamRedeemTx)
    }

    fn is_beam_side(&self) -> bool {
        self.params
            .get(TxParameterId::AtomicSwapIsBeamSide)
            .unwrap_or(false)
    }

    fn is_initiator(&self) -> bool {
        self.params.get(TxParameterId::IsInitiator).unwrap_or(false)
    }

    fn status(&self) -> Option<TxStatus> {
        self.params.get(TxParameterId::Status)
    }

    fn set_state(&mut self, state: State) {
        if self.params.set(TxParameterId::State, state) {
            debug!("{} state '{}'", self.tx_id, state);
        }
    }
}

fn kernel_status_update(sub: SubTxIndex, status: KernelStatus) -> Update {
    match status {
        KernelStatus::Confirmed { proof_height } => {
            Update::param(sub, TxParameterId::KernelProofHeight, proof_height)
        }
        KernelStatus::Unconfirmed { last_seen_height } => {
            Update::param(sub, TxParameterId::KernelUnconfirmedHeight, last_seen_height)
        }
    }
}
