//! Settlement of an agreed swap across the native chain and a foreign coin.

mod bridge;
mod description;
mod gateway;
mod inbox;
mod second_side;
mod state;
mod transaction;

pub use self::{
    bridge::{
        Bridge, BridgeError, BridgeErrorKind, Completion, Contract, FundedTransaction,
        SignedTransaction, TxOut, WithdrawRequest,
    },
    description::SwapTxDescription,
    gateway::{KernelLookup, KernelStatus, NativeGateway, NegotiationChannel, SubTxBuild},
    second_side::ForeignSide,
    state::{State, SubTxState, SwapTxState},
    transaction::AtomicSwapTransaction,
};

use crate::wallet::Height;

/// Blocks the native lock stays refundable-only after its min height.
pub const BEAM_LOCK_TIME_IN_BLOCKS: Height = 24 * 60;
/// Past this many blocks after the native lock, the foreign owner no longer
/// risks sending the native redeem and refunds instead.
pub const MAX_SENT_TIME_OF_BEAM_REDEEM_IN_BLOCKS: Height = BEAM_LOCK_TIME_IN_BLOCKS / 2;
pub const BEAM_LOCK_TX_LIFETIME_MAX: Height = 2 * 60;
pub const DEFAULT_TX_LIFETIME: Height = 2 * 60;
pub const DEFAULT_TX_RESPONSE_TIME: Height = 12 * 60;
pub const LOCK_TX_ESTIMATED_TIME_IN_BEAM_BLOCKS: Height = 70;
pub const EXTERNAL_HEIGHT_MAX_DIFFERENCE: u64 = 5;
pub const BEAM_BLOCKS_PER_HOUR: f64 = 60.0;
pub const SWAP_PROTO_VERSION: u32 = 1;
