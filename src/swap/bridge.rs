use crate::wallet::{Amount, TxFailureReason};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeErrorKind {
    NotConnected,
    Connection,
    Rpc,
    InvalidResultFormat,
    Consensus,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct BridgeError {
    pub kind: BridgeErrorKind,
    pub message: String,
}

impl BridgeError {
    pub fn new(kind: BridgeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Fatal errors are not worth retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            BridgeErrorKind::InvalidResultFormat | BridgeErrorKind::Consensus
        )
    }

    pub fn failure_reason(&self) -> TxFailureReason {
        match self.kind {
            BridgeErrorKind::InvalidResultFormat => TxFailureReason::SwapFormatResponseError,
            BridgeErrorKind::Consensus => TxFailureReason::SwapSecondSideBridgeError,
            BridgeErrorKind::Connection | BridgeErrorKind::NotConnected => {
                TxFailureReason::SwapNetworkBridgeError
            }
            BridgeErrorKind::Rpc => TxFailureReason::SwapSidechainRpcError,
        }
    }
}

pub type Completion<T> = Box<dyn FnOnce(Result<T, BridgeError>)>;

/// Terms of the hash and time locked output funding the foreign side.
#[derive(Debug, Clone, PartialEq)]
pub struct Contract {
    /// Hex public key allowed to refund after `lock_time`.
    pub sender_public_key: String,
    /// Hex public key allowed to redeem with the secret.
    pub receiver_public_key: String,
    pub secret_public_key: String,
    pub lock_time: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FundedTransaction {
    pub raw_tx: String,
    /// Index of the contract output in the funded transaction.
    pub value_output_index: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignedTransaction {
    pub raw_tx: String,
    pub complete: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TxOut {
    pub script_hex: String,
    pub amount: Amount,
    pub confirmations: u32,
}

/// Spend of the contract output, either as redeem (with the secret) or as
/// refund.
#[derive(Debug, Clone, PartialEq)]
pub struct WithdrawRequest {
    pub withdraw_address: String,
    pub contract_tx_id: String,
    pub output_index: u32,
    pub amount: Amount,
    pub lock_time: u64,
    pub contract: Contract,
    pub signing_key: [u8; 32],
    pub secret: Option<[u8; 32]>,
}

/// Per-coin adapter to a foreign chain node or wallet.
///
/// Every call completes through its callback, possibly before returning.
pub trait Bridge {
    fn dump_private_key(&self, address: &str, done: Completion<String>);
    fn get_raw_change_address(&self, done: Completion<String>);
    fn create_contract_transaction(&self, contract: &Contract, amount: Amount, done: Completion<String>);
    fn fund_raw_transaction(&self, raw_tx: &str, fee_rate: Amount, done: Completion<FundedTransaction>);
    fn sign_raw_transaction(&self, raw_tx: &str, done: Completion<SignedTransaction>);
    /// Completes with the id of the broadcast transaction.
    fn send_raw_transaction(&self, raw_tx: &str, done: Completion<String>);
    fn get_tx_out(&self, tx_id: &str, output_index: u32, done: Completion<TxOut>);
    fn get_block_count(&self, done: Completion<u64>);
    fn create_withdraw_transaction(&self, request: &WithdrawRequest, done: Completion<String>);
    /// Hex of the locking script `contract` compiles to.
    fn contract_script(&self, contract: &Contract) -> String;
}
