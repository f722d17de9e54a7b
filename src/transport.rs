use crate::coin::AtomicSwapCoin;
use std::{cell::RefCell, collections::HashMap};

pub type BbsChannel = u32;

/// Channels below this value address individual wallets.
pub const MAX_WALLET_CHANNELS: BbsChannel = 1024;

lazy_static::lazy_static! {
    static ref OFFER_CHANNELS: HashMap<AtomicSwapCoin, BbsChannel> = {
        let mut channels = HashMap::new();
        channels.insert(AtomicSwapCoin::Bitcoin, MAX_WALLET_CHANNELS);
        channels.insert(AtomicSwapCoin::Litecoin, MAX_WALLET_CHANNELS + 1);
        channels.insert(AtomicSwapCoin::Qtum, MAX_WALLET_CHANNELS + 2);
        channels
    };
}

/// Board channel offers for `coin` are published on.
pub fn offer_channel(coin: AtomicSwapCoin) -> Option<BbsChannel> {
    OFFER_CHANNELS.get(&coin).copied()
}

pub fn offer_channels() -> impl Iterator<Item = (AtomicSwapCoin, BbsChannel)> {
    OFFER_CHANNELS.iter().map(|(coin, channel)| (*coin, *channel))
}

/// Outbound half of the broadcast message network.
pub trait BroadcastTransport {
    fn send_raw_message(&self, channel: BbsChannel, message: Vec<u8>);
}

/// Transport that keeps everything sent through it until drained, for
/// wiring boards together in-process.
#[derive(Default)]
pub struct Outbox {
    sent: RefCell<Vec<(BbsChannel, Vec<u8>)>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<(BbsChannel, Vec<u8>)> {
        self.sent.borrow_mut().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.sent.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.borrow().is_empty()
    }
}

impl BroadcastTransport for Outbox {
    fn send_raw_message(&self, channel: BbsChannel, message: Vec<u8>) {
        self.sent.borrow_mut().push((channel, message));
    }
}
