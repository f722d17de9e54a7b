pub mod board;
pub mod coin;
pub mod keypair;
pub mod offer;
pub mod parameters;
pub mod protocol;
pub mod settings;
pub mod swap;
pub mod token;
pub mod transport;
pub mod wallet;

pub use self::{
    board::{BoardError, SwapOffersBoard, SwapOffersObserver},
    coin::{AtomicSwapCoin, CoinParams, NetworkProfile},
    offer::{SwapOffer, SwapOfferStatus},
    parameters::{SetTxParameter, SubTxIndex, TxParameterId, TxParameters},
    protocol::OfferBoardProtocolHandler,
    settings::{BoardConfig, QuickRefundPolicy, SwapSettings},
    swap::AtomicSwapTransaction,
    token::SwapOfferToken,
};
