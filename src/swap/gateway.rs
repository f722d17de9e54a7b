use crate::{
    parameters::{ParameterValue, SetTxParameter, SubTxIndex, TxParameterId, TxParameters},
    wallet::{Height, TxFailureReason, TxId},
};

/// Outcome of one step of building a native sub-transaction.
#[derive(Debug, Clone, PartialEq)]
pub enum SubTxBuild {
    /// Our half is ready and the peer's is missing. The owner of the
    /// sub-transaction opens the negotiation with these parameters.
    Invitation(Vec<(TxParameterId, ParameterValue)>),
    /// The peer's half arrived and we signed ours. The side that does not own
    /// the sub-transaction answers with these parameters and is done.
    Confirmation {
        reply: Vec<(TxParameterId, ParameterValue)>,
        kernel_id: [u8; 32],
    },
    AwaitingSignature,
    Constructed { kernel_id: [u8; 32] },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelStatus {
    Confirmed { proof_height: Height },
    Unconfirmed { last_seen_height: Height },
}

#[derive(Debug, Clone, PartialEq)]
pub struct KernelLookup {
    pub status: KernelStatus,
    /// Secret revealed by a redeem kernel once it is on chain.
    pub secret: Option<[u8; 32]>,
}

/// Native ledger as seen by a swap: kernel construction, registration and
/// confirmation tracking.
pub trait NativeGateway {
    fn current_height(&self) -> Height;
    fn build_sub_tx(
        &self,
        params: &TxParameters,
        sub: SubTxIndex,
        is_tx_owner: bool,
    ) -> Result<SubTxBuild, TxFailureReason>;
    fn register_tx(&self, tx_id: TxId, sub: SubTxIndex, done: Box<dyn FnOnce(bool)>);
    fn confirm_kernel(&self, tx_id: TxId, kernel_id: [u8; 32], sub: SubTxIndex, done: Box<dyn FnOnce(KernelStatus)>);
    fn get_kernel(&self, tx_id: TxId, kernel_id: [u8; 32], sub: SubTxIndex, done: Box<dyn FnOnce(KernelLookup)>);
    /// Releases coins reserved by the transaction.
    fn rollback_tx(&self, tx_id: TxId);
}

/// Peer-to-peer link a swap negotiates over. The transaction owns it and
/// closes it once settled.
pub trait NegotiationChannel {
    fn send(&self, message: SetTxParameter) -> bool;
    fn close(&mut self);
}
