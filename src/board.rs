use crate::{
    keypair::KeyDerivation,
    offer::{SwapOffer, SwapOfferStatus},
    parameters::{mirror_swap_params, TxParameterId, TxParameters},
    protocol::OfferBoardProtocolHandler,
    settings::BoardConfig,
    transport::{offer_channel, BroadcastTransport},
    wallet::{
        ChangeAction, Height, TxDescription, TxFailureReason, TxId, TxStatus, TxType,
        WalletAddress, WalletId,
    },
};
use std::{collections::HashMap, rc::Rc};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoardError {
    #[error("offer {0} is not a valid swap offer")]
    InvalidOffer(TxId),
    #[error("offer {0} is already published")]
    AlreadyPublished(TxId),
    #[error("offer {0} is not signed by a local address")]
    ForeignOffer(TxId),
    #[error("offer {0} has expired")]
    ExpiredOffer(TxId),
    #[error("offer {tx_id} lifetime {lifetime} exceeds the maximum of {max}")]
    LifetimeExceeded {
        tx_id: TxId,
        lifetime: Height,
        max: Height,
    },
    #[error("offer {0} was published by this wallet")]
    OwnOffer(TxId),
}

pub trait SwapOffersObserver {
    fn on_swap_offers_changed(&self, action: ChangeAction, offers: &[SwapOffer]);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    offer: SwapOffer,
    /// Height the offer left the pending state at, if it did.
    settled_at: Option<Height>,
}

/// Public catalogue of swap offers, kept in sync with the broadcast network,
/// the local transactions and the chain tip.
pub struct SwapOffersBoard<K> {
    config: BoardConfig,
    protocol: OfferBoardProtocolHandler<K>,
    transport: Rc<dyn BroadcastTransport>,
    order: Vec<TxId>,
    cache: HashMap<TxId, CacheEntry>,
    /// Local broadcast addresses and the key index each one is derived from.
    local_keys: HashMap<WalletId, u64>,
    current_height: Height,
    observers: Vec<Rc<dyn SwapOffersObserver>>,
}

impl<K: KeyDerivation> SwapOffersBoard<K> {
    pub fn new(config: BoardConfig, kdf: K, transport: Rc<dyn BroadcastTransport>) -> Self {
        let protocol = OfferBoardProtocolHandler::new(kdf, config.protocol_version);

        Self {
            config,
            protocol,
            transport,
            order: Vec::new(),
            cache: HashMap::new(),
            local_keys: HashMap::new(),
            current_height: 0,
            observers: Vec::new(),
        }
    }

    pub fn current_height(&self) -> Height {
        self.current_height
    }

    /// Handles a raw broadcast message, returning whether it carried an offer.
    pub fn on_message(&mut self, message: &[u8]) -> bool {
        let mut offer = match self.protocol.parse_message(message) {
            Some(offer) => offer,
            None => return false,
        };

        if !offer.coin.is_known() {
            warn!("{} offer for an unknown coin dropped", offer.tx_id);
            return false;
        }
        if offer.status == SwapOfferStatus::Pending && !offer.is_valid() {
            warn!("{} incomplete pending offer dropped", offer.tx_id);
            return false;
        }
        offer.is_own = self.is_own(&offer);

        let (cached_status, merged) = match self.cache.get_mut(&offer.tx_id) {
            Some(entry) => {
                if entry.offer.publisher_id.is_some() && entry.offer.publisher_id != offer.publisher_id {
                    warn!("{} update signed by someone other than its publisher dropped", offer.tx_id);
                    return false;
                }
                entry.offer.merge(&offer);
                entry.offer.is_own = offer.is_own;
                (Some(entry.offer.status), entry.offer.clone())
            }
            None => (None, offer.clone()),
        };

        match cached_status {
            None => self.on_new_offer(offer),
            Some(SwapOfferStatus::Pending) if offer.status != SwapOfferStatus::Pending => {
                debug!("{} offer is now {}", offer.tx_id, offer.status);
                if let Some(removed) = self.settle(&offer.tx_id, offer.status) {
                    self.notify(ChangeAction::Removed, &[removed]);
                }
            }
            Some(SwapOfferStatus::Pending) => {}
            Some(status) if offer.status == SwapOfferStatus::Pending => {
                // the network is behind: a pending echo never resurrects an
                // offer the wallet already took off the board
                self.send_update_to_network(&merged, status);
            }
            Some(status) => {
                if !status.is_terminal() && offer.status.is_terminal() {
                    self.settle(&offer.tx_id, offer.status);
                }
            }
        }

        true
    }

    fn on_new_offer(&mut self, mut offer: SwapOffer) {
        if offer.status == SwapOfferStatus::Pending && offer.is_expired_at(self.current_height) {
            offer.status = SwapOfferStatus::Expired;
        }

        let is_pending = offer.status == SwapOfferStatus::Pending;
        self.insert(offer.clone());
        if is_pending {
            self.notify(ChangeAction::Added, &[offer]);
        }
    }

    /// Reflects local swap transactions on the board.
    pub fn on_transaction_changed(&mut self, action: ChangeAction, txs: &[TxDescription]) {
        if action == ChangeAction::Removed {
            return;
        }

        for tx in txs.iter().filter(|tx| tx.tx_type == TxType::AtomicSwap) {
            let status = match tx.status {
                TxStatus::InProgress => SwapOfferStatus::InProgress,
                TxStatus::Failed => {
                    let reason = tx
                        .params
                        .get::<TxFailureReason>(TxParameterId::InternalFailureReason);
                    if reason == Some(TxFailureReason::TransactionExpired) {
                        SwapOfferStatus::Expired
                    } else {
                        SwapOfferStatus::Failed
                    }
                }
                TxStatus::Canceled => SwapOfferStatus::Canceled,
                TxStatus::Completed => SwapOfferStatus::Completed,
                _ => continue,
            };

            self.update_offer(tx.tx_id, status);
        }
    }

    /// Applies a status reported by the local wallet. Wallet updates always
    /// win over what the network last said.
    pub fn update_offer(&mut self, tx_id: TxId, status: SwapOfferStatus) {
        let cached = self.cache.get(&tx_id).map(|entry| entry.offer.status);

        match cached {
            Some(SwapOfferStatus::Pending) if status != SwapOfferStatus::Pending => {
                if let Some(removed) = self.settle(&tx_id, status) {
                    self.notify(ChangeAction::Removed, &[removed.clone()]);
                    self.send_update_to_network(&removed, status);
                }
            }
            Some(SwapOfferStatus::InProgress) if status.is_terminal() => {
                if let Some(settled) = self.settle(&tx_id, status) {
                    self.send_update_to_network(&settled, status);
                }
            }
            Some(_) => {}
            None => {
                // remember the status so the offer is not resurrected when
                // it shows up later
                let mut incomplete = SwapOffer::new(tx_id, TxParameters::new(Some(tx_id)));
                incomplete.status = status;
                self.insert(incomplete);
            }
        }
    }

    /// Moves the board to a new chain tip, expiring offers whose acceptance
    /// window closed and forgetting long settled ones.
    pub fn on_system_state_changed(&mut self, height: Height) {
        self.current_height = height;

        let mut expired = Vec::new();
        for tx_id in &self.order {
            if let Some(entry) = self.cache.get_mut(tx_id) {
                if entry.offer.status == SwapOfferStatus::Pending && entry.offer.is_expired_at(height) {
                    entry.offer.status = SwapOfferStatus::Expired;
                    entry.settled_at = Some(height);
                    expired.push(entry.offer.clone());
                }
            }
        }
        if !expired.is_empty() {
            debug!("{} offers expired at height {}", expired.len(), height);
            self.notify(ChangeAction::Removed, &expired);
        }

        let grace = self.config.eviction_grace;
        let cache = &mut self.cache;
        self.order.retain(|tx_id| {
            let evict = match cache.get(tx_id).and_then(|entry| entry.settled_at) {
                Some(settled_at) => settled_at.saturating_add(grace) <= height,
                None => false,
            };
            if evict {
                cache.remove(tx_id);
            }
            !evict
        });
    }

    pub fn on_address_changed(&mut self, action: ChangeAction, addresses: &[WalletAddress]) {
        for address in addresses.iter().filter(|address| address.is_own()) {
            match action {
                ChangeAction::Added | ChangeAction::Updated => {
                    self.local_keys.insert(address.wallet_id, address.own_id);
                }
                ChangeAction::Removed => {
                    self.local_keys.remove(&address.wallet_id);
                }
            }
        }

        let own: Vec<(TxId, bool)> = self
            .cache
            .values()
            .map(|entry| (entry.offer.tx_id, self.is_own(&entry.offer)))
            .collect();
        for (tx_id, is_own) in own {
            if let Some(entry) = self.cache.get_mut(&tx_id) {
                entry.offer.is_own = is_own;
            }
        }
    }

    /// Pending offers in the order they were first seen.
    pub fn get_offers_list(&self) -> Vec<SwapOffer> {
        self.order
            .iter()
            .filter_map(|tx_id| self.cache.get(tx_id))
            .filter(|entry| entry.offer.status == SwapOfferStatus::Pending)
            .map(|entry| entry.offer.clone())
            .collect()
    }

    pub fn get_offer(&self, tx_id: &TxId) -> Option<&SwapOffer> {
        self.cache.get(tx_id).map(|entry| &entry.offer)
    }

    pub fn publish_offer(&mut self, mut offer: SwapOffer) -> Result<(), BoardError> {
        let tx_id = offer.tx_id;
        if !offer.is_valid() || offer.status != SwapOfferStatus::Pending {
            return Err(BoardError::InvalidOffer(tx_id));
        }

        let lifetime = offer.params.get(TxParameterId::Lifetime).unwrap_or_default();
        if lifetime > self.config.max_offer_lifetime {
            return Err(BoardError::LifetimeExceeded {
                tx_id,
                lifetime,
                max: self.config.max_offer_lifetime,
            });
        }
        if offer.is_expired_at(self.current_height) {
            return Err(BoardError::ExpiredOffer(tx_id));
        }

        let key_index = offer
            .publisher_id
            .and_then(|publisher| self.local_keys.get(&publisher).copied())
            .ok_or(BoardError::ForeignOffer(tx_id))?;
        if self.cache.contains_key(&tx_id) {
            return Err(BoardError::AlreadyPublished(tx_id));
        }

        let channel = offer_channel(offer.coin).ok_or(BoardError::InvalidOffer(tx_id))?;
        let message = self.protocol.create_message(&offer, key_index).map_err(|e| {
            warn!("{} cannot sign offer: {}", tx_id, e);
            BoardError::ForeignOffer(tx_id)
        })?;
        self.transport.send_raw_message(channel, message);
        info!("{} offer published on channel {}", tx_id, channel);

        offer.is_own = true;
        self.insert(offer.clone());
        self.notify(ChangeAction::Added, &[offer]);

        Ok(())
    }

    /// Checks `tx_id` can be taken by this wallet and returns the offer's
    /// terms seen from our side, ready for the swap transaction once our own
    /// fees are filled in.
    pub fn accept_offer(&self, tx_id: &TxId, my_id: WalletId) -> Result<TxParameters, BoardError> {
        let offer = &self
            .cache
            .get(tx_id)
            .ok_or(BoardError::InvalidOffer(*tx_id))?
            .offer;

        if offer.is_own {
            return Err(BoardError::OwnOffer(*tx_id));
        }
        if !offer.is_valid() {
            return Err(BoardError::InvalidOffer(*tx_id));
        }
        if offer.status != SwapOfferStatus::Pending || offer.is_expired_at(self.current_height) {
            return Err(BoardError::ExpiredOffer(*tx_id));
        }

        let mut params = mirror_swap_params(&offer.params, false);
        params.set(TxParameterId::MyId, my_id);
        if let Some(publisher) = offer.publisher_id {
            params.set(TxParameterId::PeerId, publisher);
        }

        Ok(params)
    }

    pub fn subscribe(&mut self, observer: Rc<dyn SwapOffersObserver>) {
        self.observers.push(observer);
    }

    pub fn unsubscribe(&mut self, observer: &Rc<dyn SwapOffersObserver>) {
        let target = Rc::as_ptr(observer) as *const ();
        self.observers
            .retain(|registered| Rc::as_ptr(registered) as *const () != target);
    }

    fn is_own(&self, offer: &SwapOffer) -> bool {
        match offer.publisher_id {
            Some(publisher) => self.local_keys.contains_key(&publisher),
            None => {
                offer.params.get(TxParameterId::IsInitiator) == Some(false)
                    && offer
                        .params
                        .get::<WalletId>(TxParameterId::PeerId)
                        .map_or(false, |peer| self.local_keys.contains_key(&peer))
            }
        }
    }

    fn insert(&mut self, offer: SwapOffer) {
        let tx_id = offer.tx_id;
        let settled_at = if offer.status == SwapOfferStatus::Pending {
            None
        } else {
            Some(self.current_height)
        };

        if self
            .cache
            .insert(tx_id, CacheEntry { offer, settled_at })
            .is_none()
        {
            self.order.push(tx_id);
        }
    }

    fn settle(&mut self, tx_id: &TxId, status: SwapOfferStatus) -> Option<SwapOffer> {
        let height = self.current_height;
        let entry = self.cache.get_mut(tx_id)?;
        entry.offer.status = status;
        entry.settled_at = Some(height);

        Some(entry.offer.clone())
    }

    /// Broadcasts a status-only form of `offer`. Only offers published from
    /// one of our own addresses can be updated.
    fn send_update_to_network(&self, offer: &SwapOffer, status: SwapOfferStatus) {
        let key_index = match offer
            .publisher_id
            .and_then(|publisher| self.local_keys.get(&publisher))
        {
            Some(index) => *index,
            None => {
                debug!("{} offer has a foreign publisher and will not be updated", offer.tx_id);
                return;
            }
        };
        let channel = match offer_channel(offer.coin) {
            Some(channel) => channel,
            None => return,
        };

        let update = SwapOffer::truncated(offer.tx_id, status, offer.publisher_id, offer.coin);
        match self.protocol.create_message(&update, key_index) {
            Ok(message) => {
                self.transport.send_raw_message(channel, message);
                debug!("{} offer status {} broadcast", offer.tx_id, status);
            }
            Err(e) => warn!("{} cannot sign offer update: {}", offer.tx_id, e),
        }
    }

    fn notify(&self, action: ChangeAction, offers: &[SwapOffer]) {
        for observer in &self.observers {
            observer.on_swap_offers_changed(action, offers);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        coin::AtomicSwapCoin,
        keypair::BroadcastKdf,
        parameters::create_swap_parameters,
        transport::Outbox,
    };
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<(ChangeAction, Vec<TxId>)>>,
    }

    impl SwapOffersObserver for Recorder {
        fn on_swap_offers_changed(&self, action: ChangeAction, offers: &[SwapOffer]) {
            self.events
                .borrow_mut()
                .push((action, offers.iter().map(|offer| offer.tx_id).collect()));
        }
    }

    fn board(seed: u8) -> (SwapOffersBoard<BroadcastKdf>, Rc<Outbox>, WalletId) {
        let outbox = Rc::new(Outbox::new());
        let kdf = BroadcastKdf::new([seed; 32]);
        let publisher = WalletId::from_public_key(&kdf.derive_key(1).unwrap().public_key);
        let mut board = SwapOffersBoard::new(BoardConfig::default(), kdf, outbox.clone());
        board.on_address_changed(
            ChangeAction::Added,
            &[WalletAddress {
                wallet_id: publisher,
                own_id: 1,
            }],
        );

        (board, outbox, publisher)
    }

    fn offer(publisher: WalletId) -> SwapOffer {
        let params = create_swap_parameters(None)
            .with(TxParameterId::AtomicSwapCoin, AtomicSwapCoin::Bitcoin)
            .with(TxParameterId::Amount, 500_000_000u64)
            .with(TxParameterId::AtomicSwapAmount, 2_000_000u64)
            .with(TxParameterId::AtomicSwapIsBeamSide, true)
            .with(TxParameterId::MinHeight, 1000u64)
            .with(TxParameterId::PeerResponseTime, 100u64);
        let mut offer = SwapOffer::new(params.tx_id().unwrap(), params);
        offer.publisher_id = Some(publisher);
        offer
    }

    #[test]
    fn own_offer_is_published_once() {
        let (mut board, outbox, publisher) = board(1);
        let offer = offer(publisher);

        board.publish_offer(offer.clone()).unwrap();
        assert_eq!(
            board.publish_offer(offer.clone()),
            Err(BoardError::AlreadyPublished(offer.tx_id))
        );

        assert_eq!(outbox.len(), 1);
        assert_eq!(board.get_offers_list().len(), 1);
        assert!(board.get_offers_list()[0].is_own);
    }

    #[test]
    fn pending_echo_of_settled_offer_is_answered_with_its_status() {
        let (mut publisher_board, outbox, publisher) = board(1);
        let (mut other_board, _, _) = board(2);
        let offer = offer(publisher);

        publisher_board.publish_offer(offer.clone()).unwrap();
        let (_, original) = outbox.drain().remove(0);
        publisher_board.update_offer(offer.tx_id, SwapOfferStatus::Canceled);
        outbox.drain();

        assert!(publisher_board.on_message(&original));
        let sent = outbox.drain();
        assert_eq!(sent.len(), 1);
        assert!(publisher_board.get_offers_list().is_empty());

        assert!(other_board.on_message(&original));
        assert_eq!(other_board.get_offers_list().len(), 1);
        assert!(other_board.on_message(&sent[0].1));
        assert!(other_board.get_offers_list().is_empty());
    }

    #[test]
    fn local_update_for_unseen_offer_blocks_its_resurrection() {
        let (mut publisher_board, outbox, publisher) = board(1);
        let (mut other_board, _, _) = board(2);
        let offer = offer(publisher);
        publisher_board.publish_offer(offer.clone()).unwrap();
        let (_, original) = outbox.drain().remove(0);

        other_board.update_offer(offer.tx_id, SwapOfferStatus::InProgress);

        assert!(other_board.on_message(&original));
        assert!(other_board.get_offers_list().is_empty());
        assert_eq!(
            other_board.get_offer(&offer.tx_id).map(|offer| offer.status),
            Some(SwapOfferStatus::InProgress)
        );
    }

    #[test]
    fn settled_offers_are_forgotten_after_grace() {
        let (mut board, _, publisher) = board(1);
        let offer = offer(publisher);
        board.on_system_state_changed(1000);
        board.publish_offer(offer.clone()).unwrap();

        board.on_system_state_changed(1100);
        assert!(board.get_offer(&offer.tx_id).is_some());

        board.on_system_state_changed(1100 + BoardConfig::default().eviction_grace);
        assert!(board.get_offer(&offer.tx_id).is_none());
    }

    #[test]
    fn status_update_from_another_key_is_ignored() {
        let (mut publisher_board, outbox, publisher) = board(1);
        let (mut other_board, _, _) = board(2);
        let offer = offer(publisher);
        publisher_board.publish_offer(offer.clone()).unwrap();
        let (_, original) = outbox.drain().remove(0);
        assert!(other_board.on_message(&original));

        let mallory_kdf = BroadcastKdf::new([3; 32]);
        let mallory = WalletId::from_public_key(&mallory_kdf.derive_key(1).unwrap().public_key);
        let forged = OfferBoardProtocolHandler::new(mallory_kdf, BoardConfig::default().protocol_version)
            .create_message(
                &SwapOffer::truncated(offer.tx_id, SwapOfferStatus::Canceled, Some(mallory), offer.coin),
                1,
            )
            .unwrap();

        assert!(!other_board.on_message(&forged));
        assert_eq!(other_board.get_offers_list().len(), 1);
        assert_eq!(
            other_board.get_offer(&offer.tx_id).map(|offer| offer.status),
            Some(SwapOfferStatus::Pending)
        );
    }

    #[test]
    fn own_offer_arriving_after_its_status_is_marked_own() {
        let (mut publisher_board, outbox, publisher) = board(1);
        let offer = offer(publisher);
        publisher_board.publish_offer(offer.clone()).unwrap();
        let (_, original) = outbox.drain().remove(0);

        // a restored wallet learns the status before the offer itself
        let (mut restored, _, _) = board(1);
        restored.update_offer(offer.tx_id, SwapOfferStatus::InProgress);
        assert!(!restored.get_offer(&offer.tx_id).unwrap().is_own);

        assert!(restored.on_message(&original));
        assert!(restored.get_offer(&offer.tx_id).unwrap().is_own);
    }

    #[test]
    fn unsubscribed_observer_hears_nothing() {
        let (mut board, _, publisher) = board(1);
        let recorder = Rc::new(Recorder::default());
        let observer: Rc<dyn SwapOffersObserver> = recorder.clone();

        board.subscribe(observer.clone());
        board.unsubscribe(&observer);
        board.publish_offer(offer(publisher)).unwrap();

        assert!(recorder.events.borrow().is_empty());
    }

    #[test]
    fn acceptance_rules() {
        let (mut publisher_board, outbox, publisher) = board(1);
        let (mut other_board, _, other_id) = board(2);
        let offer = offer(publisher);
        publisher_board.publish_offer(offer.clone()).unwrap();
        other_board.on_message(&outbox.drain()[0].1);

        assert_eq!(
            publisher_board.accept_offer(&offer.tx_id, publisher),
            Err(BoardError::OwnOffer(offer.tx_id))
        );

        let params = other_board.accept_offer(&offer.tx_id, other_id).unwrap();
        assert_eq!(params.get(TxParameterId::MyId), Some(other_id));
        assert_eq!(params.get(TxParameterId::PeerId), Some(publisher));
        assert_eq!(params.get(TxParameterId::IsInitiator), Some(true));
        assert_eq!(
            params.get::<bool>(TxParameterId::AtomicSwapIsBeamSide),
            offer.is_beam_side().map(|is_beam_side| !is_beam_side)
        );

        other_board.on_system_state_changed(1100);
        assert_eq!(
            other_board.accept_offer(&offer.tx_id, other_id),
            Err(BoardError::ExpiredOffer(offer.tx_id))
        );
    }
}
