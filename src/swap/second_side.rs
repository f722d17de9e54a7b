use crate::{
    coin::CoinParams,
    keypair::{is_secret_of, random_secret_key, KeyPair},
    parameters::{SubTxIndex, TxParameterId, TxParameters},
    settings::QuickRefundPolicy,
    swap::{
        bridge::{Bridge, Contract, FundedTransaction, SignedTransaction, TxOut, WithdrawRequest},
        inbox::{track, Request, SharedInbox, Update},
        state::SwapTxState,
        BEAM_BLOCKS_PER_HOUR, EXTERNAL_HEIGHT_MAX_DIFFERENCE, LOCK_TX_ESTIMATED_TIME_IN_BEAM_BLOCKS,
    },
    wallet::{Amount, Height, TxFailureReason, TxId},
};
use std::{convert::TryFrom, rc::Rc};
use tracing::{debug, error, info, warn};

/// Foreign chain half of a swap, driven through a [`Bridge`].
///
/// Nothing here blocks: every bridge call is tracked in the swap's inbox and
/// its result lands in the parameter bag on a later update.
pub struct ForeignSide {
    tx_id: TxId,
    bridge: Rc<dyn Bridge>,
    coin_params: CoinParams,
    quick_refund: QuickRefundPolicy,
    /// Owns the foreign coins, i.e. sends the lock and gets the native coins.
    is_foreign_owner: bool,
    inbox: SharedInbox,
    block_count: u64,
}

impl ForeignSide {
    pub(crate) fn new(
        tx_id: TxId,
        bridge: Rc<dyn Bridge>,
        coin_params: CoinParams,
        quick_refund: QuickRefundPolicy,
        is_foreign_owner: bool,
        inbox: SharedInbox,
    ) -> Self {
        Self {
            tx_id,
            bridge,
            coin_params,
            quick_refund,
            is_foreign_owner,
            inbox,
            block_count: 0,
        }
    }

    pub fn coin_params(&self) -> &CoinParams {
        &self.coin_params
    }

    pub fn block_count(&self) -> u64 {
        self.block_count
    }

    pub(crate) fn set_block_count(&mut self, block_count: u64) {
        if block_count > self.block_count {
            self.block_count = block_count;
        }
    }

    pub(crate) fn request_block_count(&self) {
        if let Some(done) = track(&self.inbox, Request::BlockCount, |count: u64| {
            vec![Update::ForeignHeight(count)]
        }) {
            self.bridge.get_block_count(done);
        }
    }

    pub fn initialize(&self, params: &mut TxParameters) -> Result<bool, TxFailureReason> {
        if !self.load_swap_address(params) {
            return Ok(false);
        }
        if self.block_count == 0 {
            self.request_block_count();
            return Ok(false);
        }

        if self.is_foreign_owner && !params.contains(TxParameterId::AtomicSwapSecretPrivateKey, SubTxIndex::BeamRedeemTx) {
            let secret = KeyPair::new(random_secret_key());
            params.set_sub(
                TxParameterId::AtomicSwapSecretPrivateKey,
                secret.secret_key.serialize(),
                SubTxIndex::BeamRedeemTx,
            );
            params.set_sub(
                TxParameterId::AtomicSwapSecretPublicKey,
                secret.public_key_hex(),
                SubTxIndex::BeamRedeemTx,
            );
        }

        Ok(params.contains(TxParameterId::AtomicSwapPrivateKey, SubTxIndex::Default))
    }

    fn load_swap_address(&self, params: &TxParameters) -> bool {
        let address = match params.get::<String>(TxParameterId::AtomicSwapWithdrawAddress) {
            Some(address) => address,
            None => {
                if let Some(done) = track(&self.inbox, Request::SwapAddress, |address: String| {
                    vec![Update::param(
                        SubTxIndex::Default,
                        TxParameterId::AtomicSwapWithdrawAddress,
                        address,
                    )]
                }) {
                    self.bridge.get_raw_change_address(done);
                }
                return false;
            }
        };

        if params.contains(TxParameterId::AtomicSwapPrivateKey, SubTxIndex::Default) {
            return true;
        }

        if let Some(done) = track(&self.inbox, Request::PrivateKey, |raw_key: String| {
            let key = hex::decode(&raw_key)
                .ok()
                .and_then(|bytes| <[u8; 32]>::try_from(bytes.as_slice()).ok())
                .and_then(|bytes| KeyPair::from_slice(&bytes).ok());

            match key {
                Some(keypair) => vec![
                    Update::param(
                        SubTxIndex::Default,
                        TxParameterId::AtomicSwapPrivateKey,
                        keypair.secret_key.serialize(),
                    ),
                    Update::param(
                        SubTxIndex::Default,
                        TxParameterId::AtomicSwapPublicKey,
                        keypair.public_key_hex(),
                    ),
                ],
                None => vec![Update::Failed(
                    SubTxIndex::Default,
                    TxFailureReason::SwapFormatResponseError,
                )],
            }
        }) {
            self.bridge.dump_private_key(&address, done);
        }

        false
    }

    pub fn init_lock_time(&self, params: &mut TxParameters) {
        let lock_time = self.block_count + self.coin_params.lock_time_in_blocks;
        params.set(TxParameterId::AtomicSwapExternalLockTime, lock_time);
    }

    /// Checks the lock time the peer chose is in the future and was derived
    /// from a foreign height close to ours.
    pub fn validate_lock_time(&self, params: &TxParameters, native_height: Height) -> Result<bool, TxFailureReason> {
        let lock_time = mandatory::<u64>(params, TxParameterId::AtomicSwapExternalLockTime, SubTxIndex::Default)?;
        let lock_min_height = mandatory::<Height>(params, TxParameterId::MinHeight, SubTxIndex::BeamLockTx)?;
        if lock_time <= self.block_count {
            return Ok(false);
        }

        let blocks_per_beam_block = self.coin_params.blocks_per_hour / BEAM_BLOCKS_PER_HOUR;
        let beam_height_diff = native_height.saturating_sub(lock_min_height);
        let peer_min_height = lock_time.saturating_sub(self.coin_params.lock_time_in_blocks);
        let elapsed = (blocks_per_beam_block * beam_height_diff as f64).ceil() as u64;

        let peer_estimated_height = match peer_min_height.checked_add(elapsed) {
            Some(height) => height,
            None => return Ok(false),
        };
        let (upper, lower) = match (
            self.block_count.checked_add(EXTERNAL_HEIGHT_MAX_DIFFERENCE),
            peer_estimated_height.checked_add(EXTERNAL_HEIGHT_MAX_DIFFERENCE),
        ) {
            (Some(upper), Some(lower)) => (upper, lower),
            _ => return Ok(false),
        };

        Ok(peer_estimated_height < upper && self.block_count < lower)
    }

    pub fn has_enough_time_to_process_lock_tx(&self, params: &TxParameters, native_height: Height) -> Result<bool, TxFailureReason> {
        let lock_max_height = mandatory::<Height>(params, TxParameterId::MaxHeight, SubTxIndex::BeamLockTx)?;

        Ok(native_height + LOCK_TX_ESTIMATED_TIME_IN_BEAM_BLOCKS <= lock_max_height)
    }

    pub fn is_lock_time_expired(&self, params: &TxParameters) -> bool {
        match params.get::<u64>(TxParameterId::AtomicSwapExternalLockTime) {
            Some(lock_time) => self.block_count >= lock_time,
            None => false,
        }
    }

    pub fn is_quick_refund_available(&self, params: &TxParameters, native_height: Height) -> bool {
        let disclosed = || match (
            params.get::<[u8; 32]>(TxParameterId::AtomicSwapPeerPrivateKey),
            params.get::<String>(TxParameterId::AtomicSwapPeerPublicKey),
        ) {
            (Some(private_key), Some(public_key)) => is_secret_of(&private_key, &public_key),
            _ => false,
        };

        match self.quick_refund {
            QuickRefundPolicy::Disabled => false,
            QuickRefundPolicy::PeerKeyDisclosure => disclosed(),
            QuickRefundPolicy::ConfirmedAbsence { depth } => {
                let lock_max_height = params.get_sub::<Height>(TxParameterId::MaxHeight, SubTxIndex::BeamLockTx);
                let lock_proof = params.get_sub::<Height>(TxParameterId::KernelProofHeight, SubTxIndex::BeamLockTx);

                disclosed()
                    && lock_proof.is_none()
                    && lock_max_height.map_or(false, |max| native_height >= max.saturating_add(depth))
            }
        }
    }

    /// Builds, funds, signs and broadcasts the foreign lock. Returns true once
    /// it is registered.
    pub fn send_lock_tx(&self, params: &TxParameters) -> Result<bool, TxFailureReason> {
        if self.build_lock_tx(params)? != SwapTxState::Constructed {
            return Ok(false);
        }

        Ok(self.register_tx(params, SubTxIndex::LockTx))
    }

    fn build_lock_tx(&self, params: &TxParameters) -> Result<SwapTxState, TxFailureReason> {
        let state = params
            .get_sub(TxParameterId::State, SubTxIndex::LockTx)
            .unwrap_or(SwapTxState::Initial);
        let sub = SubTxIndex::LockTx;

        match state {
            SwapTxState::Initial => {
                let amount = mandatory::<Amount>(params, TxParameterId::AtomicSwapAmount, SubTxIndex::Default)?;
                let fee_rate = mandatory::<Amount>(params, TxParameterId::Fee, sub)?;
                if !self.coin_params.is_lock_amount_sufficient(amount, fee_rate) {
                    error!("{}{} the swap amount {} is too small", self.tx_id, sub, amount);
                    return Err(TxFailureReason::SwapInvalidAmount);
                }

                let contract = self.contract(params)?;
                if let Some(done) = track(&self.inbox, Request::CreateLockTx, move |raw_tx: String| {
                    vec![
                        Update::param(sub, TxParameterId::AtomicSwapExternalTx, raw_tx),
                        Update::param(sub, TxParameterId::State, SwapTxState::CreatingTx),
                    ]
                }) {
                    self.bridge.create_contract_transaction(&contract, amount, done);
                }
            }
            SwapTxState::CreatingTx => {
                let raw_tx = mandatory::<String>(params, TxParameterId::AtomicSwapExternalTx, sub)?;
                let fee_rate = mandatory::<Amount>(params, TxParameterId::Fee, sub)?;
                if let Some(done) = track(&self.inbox, Request::FundLockTx, move |funded: FundedTransaction| {
                    vec![
                        Update::param(sub, TxParameterId::AtomicSwapExternalTx, funded.raw_tx),
                        Update::param(
                            sub,
                            TxParameterId::AtomicSwapExternalTxOutputIndex,
                            funded.value_output_index,
                        ),
                        Update::param(sub, TxParameterId::State, SwapTxState::SigningTx),
                    ]
                }) {
                    self.bridge.fund_raw_transaction(&raw_tx, fee_rate, done);
                }
            }
            SwapTxState::SigningTx => {
                let raw_tx = mandatory::<String>(params, TxParameterId::AtomicSwapExternalTx, sub)?;
                if let Some(done) = track(&self.inbox, Request::SignLockTx, move |signed: SignedTransaction| {
                    if !signed.complete {
                        return vec![Update::Failed(sub, TxFailureReason::SwapSecondSideBridgeError)];
                    }
                    vec![
                        Update::param(sub, TxParameterId::AtomicSwapExternalTx, signed.raw_tx),
                        Update::param(sub, TxParameterId::State, SwapTxState::Constructed),
                    ]
                }) {
                    self.bridge.sign_raw_transaction(&raw_tx, done);
                }
            }
            SwapTxState::Constructed => {}
        }

        Ok(state)
    }

    /// Polls the peer's foreign lock until it is deep enough, checking it pays
    /// the agreed amount to the agreed contract.
    pub fn confirm_lock_tx(&self, params: &TxParameters) -> Result<bool, TxFailureReason> {
        let sub = SubTxIndex::LockTx;
        let tx_id = match params.get_sub::<String>(TxParameterId::AtomicSwapExternalTxId, sub) {
            Some(tx_id) => tx_id,
            None => return Ok(false),
        };

        let confirmations = params
            .get_sub::<u32>(TxParameterId::Confirmations, sub)
            .unwrap_or(0);
        if confirmations >= self.coin_params.lock_tx_min_confirmations {
            return Ok(true);
        }

        let output_index = mandatory::<u32>(params, TxParameterId::AtomicSwapExternalTxOutputIndex, sub)?;
        let swap_amount = mandatory::<Amount>(params, TxParameterId::AtomicSwapAmount, SubTxIndex::Default)?;
        let script = self.bridge.contract_script(&self.contract(params)?);
        let swap_tx_id = self.tx_id;

        if let Some(done) = track(&self.inbox, Request::TxOut(sub), move |out: TxOut| {
            if out.script_hex.is_empty() {
                return Vec::new();
            }
            if out.script_hex != script {
                error!("{}{} contract script does not match", swap_tx_id, sub);
                return vec![Update::Failed(sub, TxFailureReason::SwapInvalidContract)];
            }
            if out.amount < swap_amount {
                error!("{}{} locked {} instead of {}", swap_tx_id, sub, out.amount, swap_amount);
                return vec![Update::Failed(sub, TxFailureReason::SwapInvalidAmount)];
            }

            vec![Update::param(sub, TxParameterId::Confirmations, out.confirmations)]
        }) {
            self.bridge.get_tx_out(&tx_id, output_index, done);
        }

        Ok(false)
    }

    pub fn send_redeem(&self, params: &TxParameters, native_height: Height) -> Result<bool, TxFailureReason> {
        self.send_withdraw_tx(params, SubTxIndex::RedeemTx, native_height)
    }

    pub fn send_refund(&self, params: &TxParameters, native_height: Height) -> Result<bool, TxFailureReason> {
        self.send_withdraw_tx(params, SubTxIndex::RefundTx, native_height)
    }

    pub fn confirm_redeem_tx(&self, params: &TxParameters) -> bool {
        self.confirm_withdraw_tx(params, SubTxIndex::RedeemTx)
    }

    pub fn confirm_refund_tx(&self, params: &TxParameters) -> bool {
        self.confirm_withdraw_tx(params, SubTxIndex::RefundTx)
    }

    fn send_withdraw_tx(&self, params: &TxParameters, sub: SubTxIndex, native_height: Height) -> Result<bool, TxFailureReason> {
        let state = params
            .get_sub(TxParameterId::State, sub)
            .unwrap_or(SwapTxState::Initial);

        if state != SwapTxState::Constructed {
            let request = self.withdraw_request(params, sub, native_height)?;
            if let Some(done) = track(&self.inbox, Request::CreateWithdrawTx(sub), move |raw_tx: String| {
                vec![
                    Update::param(sub, TxParameterId::AtomicSwapExternalTx, raw_tx),
                    Update::param(sub, TxParameterId::State, SwapTxState::Constructed),
                ]
            }) {
                debug!("{}{} building withdraw transaction", self.tx_id, sub);
                self.bridge.create_withdraw_transaction(&request, done);
            }
            return Ok(false);
        }

        Ok(self.register_tx(params, sub))
    }

    fn withdraw_request(&self, params: &TxParameters, sub: SubTxIndex, native_height: Height) -> Result<WithdrawRequest, TxFailureReason> {
        let swap_amount = mandatory::<Amount>(params, TxParameterId::AtomicSwapAmount, SubTxIndex::Default)?;
        let fee = self
            .coin_params
            .withdraw_fee(mandatory::<Amount>(params, TxParameterId::Fee, sub)?);
        if swap_amount <= fee {
            return Err(TxFailureReason::SwapInvalidAmount);
        }

        let own_key = mandatory::<[u8; 32]>(params, TxParameterId::AtomicSwapPrivateKey, SubTxIndex::Default)?;
        let (signing_key, secret, lock_time) = if sub == SubTxIndex::RedeemTx {
            let secret = mandatory::<[u8; 32]>(params, TxParameterId::AtomicSwapSecretPrivateKey, SubTxIndex::BeamRedeemTx)?;
            (own_key, Some(secret), 0)
        } else if !self.is_lock_time_expired(params) && self.is_quick_refund_available(params, native_height) {
            // with the peer's key the redeem branch is ours too: we hold the secret
            let peer_key = mandatory::<[u8; 32]>(params, TxParameterId::AtomicSwapPeerPrivateKey, SubTxIndex::Default)?;
            let secret = mandatory::<[u8; 32]>(params, TxParameterId::AtomicSwapSecretPrivateKey, SubTxIndex::BeamRedeemTx)?;
            info!("{}{} quick refund", self.tx_id, sub);
            (peer_key, Some(secret), 0)
        } else {
            let lock_time = mandatory::<u64>(params, TxParameterId::AtomicSwapExternalLockTime, SubTxIndex::Default)?;
            (own_key, None, lock_time)
        };

        Ok(WithdrawRequest {
            withdraw_address: mandatory(params, TxParameterId::AtomicSwapWithdrawAddress, SubTxIndex::Default)?,
            contract_tx_id: mandatory(params, TxParameterId::AtomicSwapExternalTxId, SubTxIndex::LockTx)?,
            output_index: mandatory(params, TxParameterId::AtomicSwapExternalTxOutputIndex, SubTxIndex::LockTx)?,
            amount: swap_amount - fee,
            lock_time,
            contract: self.contract(params)?,
            signing_key,
            secret,
        })
    }

    fn confirm_withdraw_tx(&self, params: &TxParameters, sub: SubTxIndex) -> bool {
        let tx_id = match params.get_sub::<String>(TxParameterId::AtomicSwapExternalTxId, sub) {
            Some(tx_id) => tx_id,
            None => return false,
        };
        let confirmations = params
            .get_sub::<u32>(TxParameterId::Confirmations, sub)
            .unwrap_or(0);
        if confirmations >= self.coin_params.withdraw_tx_min_confirmations {
            return true;
        }

        if let Some(done) = track(&self.inbox, Request::TxOut(sub), move |out: TxOut| {
            vec![Update::param(sub, TxParameterId::Confirmations, out.confirmations)]
        }) {
            self.bridge.get_tx_out(&tx_id, 0, done);
        }

        false
    }

    /// Broadcasts the transaction built for `sub` once. Returns whether it
    /// was accepted by the foreign node.
    fn register_tx(&self, params: &TxParameters, sub: SubTxIndex) -> bool {
        if let Some(registered) = params.get_sub::<bool>(TxParameterId::TransactionRegistered, sub) {
            return registered;
        }
        let raw_tx = match params.get_sub::<String>(TxParameterId::AtomicSwapExternalTx, sub) {
            Some(raw_tx) => raw_tx,
            None => return false,
        };

        let swap_tx_id = self.tx_id;
        if let Some(done) = track(&self.inbox, Request::SendRawTx(sub), move |foreign_tx_id: String| {
            if foreign_tx_id.is_empty() {
                warn!("{}{} foreign node returned no transaction id", swap_tx_id, sub);
                return vec![Update::Failed(sub, TxFailureReason::SwapFormatResponseError)];
            }
            info!("{}{} sent as {}", swap_tx_id, sub, foreign_tx_id);
            vec![
                Update::param(sub, TxParameterId::TransactionRegistered, true),
                Update::param(sub, TxParameterId::Confirmations, 0u32),
                Update::param(sub, TxParameterId::AtomicSwapExternalTxId, foreign_tx_id),
            ]
        }) {
            self.bridge.send_raw_transaction(&raw_tx, done);
        }

        false
    }

    fn contract(&self, params: &TxParameters) -> Result<Contract, TxFailureReason> {
        let own_key = mandatory::<String>(params, TxParameterId::AtomicSwapPublicKey, SubTxIndex::Default)?;
        let peer_key = mandatory::<String>(params, TxParameterId::AtomicSwapPeerPublicKey, SubTxIndex::Default)?;
        let (sender_public_key, receiver_public_key) = if self.is_foreign_owner {
            (own_key, peer_key)
        } else {
            (peer_key, own_key)
        };

        Ok(Contract {
            sender_public_key,
            receiver_public_key,
            secret_public_key: mandatory(params, TxParameterId::AtomicSwapSecretPublicKey, SubTxIndex::BeamRedeemTx)?,
            lock_time: mandatory(params, TxParameterId::AtomicSwapExternalLockTime, SubTxIndex::Default)?,
        })
    }
}

pub(crate) fn mandatory<T: crate::parameters::Parameter>(
    params: &TxParameters,
    id: TxParameterId,
    sub: SubTxIndex,
) -> Result<T, TxFailureReason> {
    params.get_sub(id, sub).ok_or_else(|| {
        let tx_id = params.tx_id().map(|tx_id| tx_id.to_string()).unwrap_or_default();
        error!("{}{} parameter {:?} is missing", tx_id, sub, id);
        TxFailureReason::FailedToGetParameter
    })
}
