use beam_swap_board::{
    keypair::{BroadcastKdf, KeyDerivation},
    parameters::{create_swap_parameters, fill_swap_params, SwapTerms},
    swap::{SwapTxDescription, DEFAULT_TX_LIFETIME},
    transport::Outbox,
    wallet::{ChangeAction, WalletAddress, WalletId},
    AtomicSwapCoin, BoardConfig, SwapOffer, SwapOffersBoard, SwapOffersObserver, SwapSettings,
};
use std::rc::Rc;
use tracing::info;
use tracing_subscriber::EnvFilter;

struct Printer(&'static str);

impl SwapOffersObserver for Printer {
    fn on_swap_offers_changed(&self, action: ChangeAction, offers: &[SwapOffer]) {
        for offer in offers {
            info!("{}: {:?} {} ({})", self.0, action, offer.tx_id, offer.status);
        }
    }
}

fn wallet(config: &BoardConfig, outbox: Rc<Outbox>) -> anyhow::Result<(SwapOffersBoard<BroadcastKdf>, WalletId)> {
    let kdf = BroadcastKdf::new_random();
    let wallet_id = WalletId::from_public_key(&kdf.derive_key(1)?.public_key);

    let mut board = SwapOffersBoard::new(config.clone(), kdf, outbox);
    board.on_address_changed(
        ChangeAction::Added,
        &[WalletAddress {
            wallet_id,
            own_id: 1,
        }],
    );

    Ok((board, wallet_id))
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let settings = SwapSettings::from_env();
    let config = BoardConfig::default();
    info!("swap settings: {:?}", settings);

    // both wallets share one in-memory broadcast medium
    let alice_outbox = Rc::new(Outbox::new());
    let bob_outbox = Rc::new(Outbox::new());
    let (mut alice, alice_id) = wallet(&config, alice_outbox.clone())?;
    let (mut bob, bob_id) = wallet(&config, bob_outbox.clone())?;
    alice.subscribe(Rc::new(Printer("alice")));
    bob.subscribe(Rc::new(Printer("bob")));

    alice.on_system_state_changed(1000);
    bob.on_system_state_changed(1000);

    let mut params = create_swap_parameters(None);
    fill_swap_params(
        &mut params,
        &SwapTerms {
            my_id: alice_id,
            min_height: 1000,
            amount: 500_000_000,
            beam_fee: 100,
            swap_coin: AtomicSwapCoin::Bitcoin,
            swap_amount: 2_000_000,
            swap_fee_rate: 10_000,
            is_beam_side: true,
            response_time: 150,
            lifetime: DEFAULT_TX_LIFETIME,
        },
    );
    let token = SwapTxDescription::new(&params).token();
    info!("offer token: {}", token.to_token_string()?);

    let tx_id = params
        .tx_id()
        .ok_or_else(|| anyhow::anyhow!("swap parameters without a transaction id"))?;
    let mut offer = SwapOffer::new(tx_id, params);
    offer.publisher_id = Some(alice_id);
    alice.publish_offer(offer)?;

    for (channel, message) in alice_outbox.drain() {
        info!("relaying {} bytes on channel {}", message.len(), channel);
        bob.on_message(&message);
    }
    info!("bob sees {} offer(s)", bob.get_offers_list().len());

    let accepted = bob.accept_offer(&tx_id, bob_id)?;
    info!(
        "bob would start {} as {} side",
        tx_id,
        if accepted.get::<bool>(beam_swap_board::TxParameterId::AtomicSwapIsBeamSide) == Some(true) {
            "beam"
        } else {
            "foreign"
        }
    );

    bob.on_system_state_changed(1151);
    info!("at height 1151 bob sees {} offer(s)", bob.get_offers_list().len());
    for (_, message) in bob_outbox.drain() {
        alice.on_message(&message);
    }

    Ok(())
}
