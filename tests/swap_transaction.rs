use beam_swap_board::{
    keypair::{is_secret_of, KeyPair},
    parameters::{create_swap_parameters, fill_swap_fee, fill_swap_params, mirror_swap_params, ParameterValue, SwapTerms},
    swap::{
        Bridge, Completion, Contract, FundedTransaction, KernelLookup, KernelStatus, NativeGateway,
        NegotiationChannel, SignedTransaction, State, SubTxBuild, SwapTxDescription, TxOut, WithdrawRequest,
    },
    wallet::{Amount, Height, TxFailureReason, TxId, TxStatus, WalletId},
    AtomicSwapCoin, AtomicSwapTransaction, NetworkProfile, QuickRefundPolicy, SetTxParameter, SubTxIndex,
    SwapSettings, TxParameterId, TxParameters,
};
use std::{
    cell::{Cell, RefCell},
    collections::{HashMap, VecDeque},
    rc::Rc,
};

const START_HEIGHT: Height = 1000;

fn kernel_id(tx_id: TxId, sub: SubTxIndex) -> [u8; 32] {
    let mut id = [0u8; 32];
    id[..16].copy_from_slice(&tx_id.0);
    id[16] = sub as u8;
    id
}

#[derive(Default)]
struct NativeChain {
    height: Height,
    mempool: Vec<[u8; 32]>,
    kernels: HashMap<[u8; 32], Height>,
    /// Secrets a kernel's signature reveals once it is mined.
    adaptor_secrets: HashMap<[u8; 32], [u8; 32]>,
}

impl NativeChain {
    fn mine(&mut self, blocks: Height) {
        self.height += blocks;
        for kernel in self.mempool.drain(..) {
            self.kernels.entry(kernel).or_insert(self.height);
        }
    }

    fn status(&self, kernel_id: &[u8; 32]) -> KernelStatus {
        match self.kernels.get(kernel_id) {
            Some(proof_height) => KernelStatus::Confirmed {
                proof_height: *proof_height,
            },
            None => KernelStatus::Unconfirmed {
                last_seen_height: self.height,
            },
        }
    }
}

struct TestGateway {
    chain: Rc<RefCell<NativeChain>>,
    excess: [u8; 32],
    rolled_back: Cell<bool>,
}

impl TestGateway {
    fn new(chain: Rc<RefCell<NativeChain>>, seed: u8) -> Rc<Self> {
        Rc::new(Self {
            chain,
            excess: [seed; 32],
            rolled_back: Cell::new(false),
        })
    }

    fn half(&self) -> Vec<(TxParameterId, ParameterValue)> {
        vec![
            (TxParameterId::PeerPublicExcess, ParameterValue::Bytes32(self.excess)),
            (TxParameterId::PeerPublicNonce, ParameterValue::Bytes32(self.excess)),
        ]
    }
}

impl NativeGateway for TestGateway {
    fn current_height(&self) -> Height {
        self.chain.borrow().height
    }

    fn build_sub_tx(&self, params: &TxParameters, sub: SubTxIndex, is_tx_owner: bool) -> Result<SubTxBuild, TxFailureReason> {
        let tx_id = params.tx_id().ok_or(TxFailureReason::FailedToGetParameter)?;
        let kernel_id = kernel_id(tx_id, sub);

        if !params.contains(TxParameterId::PeerPublicExcess, sub) {
            return Ok(SubTxBuild::Invitation(self.half()));
        }
        if !is_tx_owner {
            let mut reply = self.half();
            reply.push((TxParameterId::PeerSignature, ParameterValue::Bytes32(self.excess)));
            return Ok(SubTxBuild::Confirmation { reply, kernel_id });
        }
        if !params.contains(TxParameterId::PeerSignature, sub) {
            return Ok(SubTxBuild::AwaitingSignature);
        }

        if sub == SubTxIndex::BeamRedeemTx {
            if let Some(secret) = params.get_sub(TxParameterId::AtomicSwapSecretPrivateKey, sub) {
                self.chain.borrow_mut().adaptor_secrets.insert(kernel_id, secret);
            }
        }
        Ok(SubTxBuild::Constructed { kernel_id })
    }

    fn register_tx(&self, tx_id: TxId, sub: SubTxIndex, done: Box<dyn FnOnce(bool)>) {
        self.chain.borrow_mut().mempool.push(kernel_id(tx_id, sub));
        done(true);
    }

    fn confirm_kernel(&self, _: TxId, kernel_id: [u8; 32], _: SubTxIndex, done: Box<dyn FnOnce(KernelStatus)>) {
        let status = self.chain.borrow().status(&kernel_id);
        done(status);
    }

    fn get_kernel(&self, _: TxId, kernel_id: [u8; 32], _: SubTxIndex, done: Box<dyn FnOnce(KernelLookup)>) {
        let lookup = {
            let chain = self.chain.borrow();
            let status = chain.status(&kernel_id);
            let secret = match status {
                KernelStatus::Confirmed { .. } => chain.adaptor_secrets.get(&kernel_id).copied(),
                KernelStatus::Unconfirmed { .. } => None,
            };
            KernelLookup { status, secret }
        };
        done(lookup);
    }

    fn rollback_tx(&self, _: TxId) {
        self.rolled_back.set(true);
    }
}

struct ForeignTx {
    script_hex: String,
    amount: Amount,
    mined_at: Option<u64>,
}

#[derive(Default)]
struct ForeignChain {
    height: u64,
    txs: HashMap<String, ForeignTx>,
    withdrawals: Vec<WithdrawRequest>,
}

impl ForeignChain {
    fn mine(&mut self, blocks: u64) {
        self.height += blocks;
        let height = self.height;
        for tx in self.txs.values_mut().filter(|tx| tx.mined_at.is_none()) {
            tx.mined_at = Some(height);
        }
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Hold {
    Nothing,
    ContractCreation,
    Broadcast,
}

struct TestBridge {
    chain: Rc<RefCell<ForeignChain>>,
    key: KeyPair,
    address: String,
    hold: Cell<Hold>,
    parked: RefCell<Vec<Completion<String>>>,
}

impl TestBridge {
    fn new(chain: Rc<RefCell<ForeignChain>>, address: &str) -> Rc<Self> {
        Rc::new(Self {
            chain,
            key: KeyPair::new_random(),
            address: address.to_string(),
            hold: Cell::new(Hold::Nothing),
            parked: RefCell::new(Vec::new()),
        })
    }
}

impl Bridge for TestBridge {
    fn dump_private_key(&self, address: &str, done: Completion<String>) {
        assert_eq!(address, self.address);
        done(Ok(hex::encode(self.key.secret_key.serialize())));
    }

    fn get_raw_change_address(&self, done: Completion<String>) {
        done(Ok(self.address.clone()));
    }

    fn create_contract_transaction(&self, contract: &Contract, amount: Amount, done: Completion<String>) {
        if self.hold.get() == Hold::ContractCreation {
            self.parked.borrow_mut().push(done);
            return;
        }
        done(Ok(format!("lock|{}|{}", self.contract_script(contract), amount)));
    }

    fn fund_raw_transaction(&self, raw_tx: &str, _: Amount, done: Completion<FundedTransaction>) {
        done(Ok(FundedTransaction {
            raw_tx: raw_tx.to_string(),
            value_output_index: 0,
        }));
    }

    fn sign_raw_transaction(&self, raw_tx: &str, done: Completion<SignedTransaction>) {
        done(Ok(SignedTransaction {
            raw_tx: raw_tx.to_string(),
            complete: true,
        }));
    }

    fn send_raw_transaction(&self, raw_tx: &str, done: Completion<String>) {
        if self.hold.get() == Hold::Broadcast {
            self.parked.borrow_mut().push(done);
            return;
        }

        let parts: Vec<&str> = raw_tx.split('|').collect();
        let (script_hex, amount) = match parts.as_slice() {
            ["lock", script, amount] => (script.to_string(), amount.parse().unwrap()),
            ["withdraw", _, amount] => ("withdraw".to_string(), amount.parse().unwrap()),
            _ => panic!("unexpected raw transaction {}", raw_tx),
        };

        let mut chain = self.chain.borrow_mut();
        let tx_id = format!("ftx{}", chain.txs.len());
        chain.txs.insert(
            tx_id.clone(),
            ForeignTx {
                script_hex,
                amount,
                mined_at: None,
            },
        );
        done(Ok(tx_id));
    }

    fn get_tx_out(&self, tx_id: &str, _: u32, done: Completion<TxOut>) {
        let out = {
            let chain = self.chain.borrow();
            match chain.txs.get(tx_id) {
                Some(tx) => TxOut {
                    script_hex: tx.script_hex.clone(),
                    amount: tx.amount,
                    confirmations: tx.mined_at.map_or(0, |mined_at| (chain.height - mined_at + 1) as u32),
                },
                None => TxOut {
                    script_hex: String::new(),
                    amount: 0,
                    confirmations: 0,
                },
            }
        };
        done(Ok(out));
    }

    fn get_block_count(&self, done: Completion<u64>) {
        let height = self.chain.borrow().height;
        done(Ok(height));
    }

    fn create_withdraw_transaction(&self, request: &WithdrawRequest, done: Completion<String>) {
        self.chain.borrow_mut().withdrawals.push(request.clone());
        done(Ok(format!("withdraw|{}|{}", request.contract_tx_id, request.amount)));
    }

    fn contract_script(&self, contract: &Contract) -> String {
        format!(
            "{}:{}:{}:{}",
            contract.sender_public_key, contract.receiver_public_key, contract.secret_public_key, contract.lock_time
        )
    }
}

struct TestChannel {
    sent: Rc<RefCell<VecDeque<SetTxParameter>>>,
    closed: Rc<Cell<bool>>,
}

impl NegotiationChannel for TestChannel {
    fn send(&self, message: SetTxParameter) -> bool {
        if self.closed.get() {
            return false;
        }
        self.sent.borrow_mut().push_back(message);
        true
    }

    fn close(&mut self) {
        self.closed.set(true);
    }
}

struct Party {
    tx: AtomicSwapTransaction,
    gateway: Rc<TestGateway>,
    bridge: Rc<TestBridge>,
    sent: Rc<RefCell<VecDeque<SetTxParameter>>>,
    closed: Rc<Cell<bool>>,
}

impl Party {
    fn new(
        params: TxParameters,
        native: &Rc<RefCell<NativeChain>>,
        foreign: &Rc<RefCell<ForeignChain>>,
        seed: u8,
    ) -> anyhow::Result<Self> {
        let settings = SwapSettings {
            network: NetworkProfile::Testnet,
            lock_tx_min_confirmations: 1,
            withdraw_tx_min_confirmations: 1,
            lock_time_in_blocks: Some(12),
            quick_refund: QuickRefundPolicy::PeerKeyDisclosure,
        };
        let gateway = TestGateway::new(native.clone(), seed);
        let bridge = TestBridge::new(foreign.clone(), &format!("address{}", seed));
        let sent = Rc::new(RefCell::new(VecDeque::new()));
        let closed = Rc::new(Cell::new(false));
        let channel = Box::new(TestChannel {
            sent: sent.clone(),
            closed: closed.clone(),
        });

        let tx = AtomicSwapTransaction::new(params, &settings, gateway.clone(), bridge.clone(), channel)
            .map_err(|reason| anyhow::anyhow!("cannot start swap: {}", reason))?;

        Ok(Self {
            tx,
            gateway,
            bridge,
            sent,
            closed,
        })
    }

    fn state(&self) -> State {
        self.tx.state()
    }

    fn status(&self) -> Option<TxStatus> {
        self.tx.params().get(TxParameterId::Status)
    }
}

/// Alice publishes an offer selling native coins, Bob takes it.
struct Swap {
    native: Rc<RefCell<NativeChain>>,
    foreign: Rc<RefCell<ForeignChain>>,
    alice: Party,
    bob: Party,
    bob_online: bool,
}

impl Swap {
    fn new() -> anyhow::Result<Self> {
        let native = Rc::new(RefCell::new(NativeChain {
            height: START_HEIGHT,
            ..NativeChain::default()
        }));
        let foreign = Rc::new(RefCell::new(ForeignChain {
            height: 500,
            ..ForeignChain::default()
        }));

        let alice_id = WalletId::from_public_key(&KeyPair::new_random().public_key);
        let bob_id = WalletId::from_public_key(&KeyPair::new_random().public_key);

        let mut alice_params = create_swap_parameters(None);
        fill_swap_params(
            &mut alice_params,
            &SwapTerms {
                my_id: alice_id,
                min_height: START_HEIGHT,
                amount: 500_000_000,
                beam_fee: 100,
                swap_coin: AtomicSwapCoin::Bitcoin,
                swap_amount: 2_000_000,
                swap_fee_rate: 10_000,
                is_beam_side: true,
                response_time: 150,
                lifetime: 120,
            },
        );

        let mut bob_params = mirror_swap_params(&alice_params, true);
        bob_params.set(TxParameterId::MyId, bob_id);
        fill_swap_fee(&mut bob_params, 100, 10_000, false);
        alice_params.set(TxParameterId::PeerId, bob_id);

        let alice = Party::new(alice_params, &native, &foreign, 1)?;
        let bob = Party::new(bob_params, &native, &foreign, 2)?;

        Ok(Self {
            native,
            foreign,
            alice,
            bob,
            bob_online: true,
        })
    }

    /// Runs both parties and exchanges their messages until nothing moves.
    fn run(&mut self) {
        for _ in 0..100 {
            self.alice.tx.update();
            if self.bob_online {
                self.bob.tx.update();
            }

            let mut delivered = 0;
            if self.bob_online {
                loop {
                    let message = self.alice.sent.borrow_mut().pop_front();
                    match message {
                        Some(message) => self.bob.tx.on_peer_message(message),
                        None => break,
                    };
                    delivered += 1;
                }
            }
            loop {
                let message = self.bob.sent.borrow_mut().pop_front();
                match message {
                    Some(message) => self.alice.tx.on_peer_message(message),
                    None => break,
                };
                delivered += 1;
            }

            if delivered == 0 {
                return;
            }
        }
    }

    fn mine(&mut self, native_blocks: Height, foreign_blocks: u64) {
        self.native.borrow_mut().mine(native_blocks);
        self.foreign.borrow_mut().mine(foreign_blocks);
        self.run();
    }
}

#[test]
fn swap_completes_on_both_chains() -> anyhow::Result<()> {
    let mut swap = Swap::new()?;

    swap.run();
    assert_eq!(swap.alice.state(), State::HandlingContractTX);
    assert_eq!(swap.bob.state(), State::SendingBeamLockTX);
    assert_eq!(swap.alice.status(), Some(TxStatus::InProgress));

    // foreign lock confirms, alice registers the native lock
    swap.mine(0, 1);
    assert_eq!(swap.alice.state(), State::SendingBeamLockTX);

    // native lock confirms, bob takes the native coins
    swap.mine(1, 0);
    assert_eq!(swap.alice.state(), State::SendingBeamRedeemTX);
    assert_eq!(swap.bob.state(), State::SendingBeamRedeemTX);

    // native redeem confirms, alice learns the secret and claims the foreign coins
    swap.mine(1, 0);
    assert_eq!(swap.bob.state(), State::CompleteSwap);
    assert_eq!(swap.bob.status(), Some(TxStatus::Completed));
    assert!(swap.bob.closed.get());
    assert_eq!(swap.alice.state(), State::SendingRedeemTX);

    let secret = swap
        .alice
        .tx
        .params()
        .get_sub::<[u8; 32]>(TxParameterId::AtomicSwapSecretPrivateKey, SubTxIndex::BeamRedeemTx)
        .unwrap();
    let secret_public_key = swap
        .bob
        .tx
        .params()
        .get_sub::<String>(TxParameterId::AtomicSwapSecretPublicKey, SubTxIndex::BeamRedeemTx)
        .unwrap();
    assert!(is_secret_of(&secret, &secret_public_key));

    swap.mine(0, 1);
    assert_eq!(swap.alice.state(), State::CompleteSwap);
    assert_eq!(swap.alice.status(), Some(TxStatus::Completed));
    assert!(swap.alice.closed.get());

    let withdrawals = &swap.foreign.borrow().withdrawals;
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0].secret, Some(secret));
    assert_eq!(withdrawals[0].lock_time, 0);
    assert_eq!(withdrawals[0].signing_key, swap.alice.bridge.key.secret_key.serialize());
    assert_eq!(SwapTxDescription::new(swap.alice.tx.params()).status_string(), "completed");

    Ok(())
}

#[test]
fn native_side_refunds_when_the_peer_never_redeems() -> anyhow::Result<()> {
    let mut swap = Swap::new()?;
    swap.run();
    assert_eq!(swap.bob.state(), State::SendingBeamLockTX);

    // bob's foreign lock is on chain, then bob disappears
    swap.bob_online = false;
    swap.mine(0, 1);
    swap.mine(1, 0);
    assert_eq!(swap.alice.state(), State::SendingBeamRedeemTX);

    let refund_height = SwapTxDescription::new(swap.alice.tx.params())
        .min_refund_height()
        .unwrap();
    let height = swap.native.borrow().height;
    swap.mine(refund_height - height - 1, 0);
    assert_eq!(swap.alice.state(), State::SendingBeamRedeemTX);

    swap.mine(2, 0);
    assert_eq!(swap.alice.state(), State::SendingBeamRefundTX);

    swap.mine(1, 0);
    assert_eq!(swap.alice.state(), State::Refunded);
    assert_eq!(swap.alice.status(), Some(TxStatus::Failed));
    assert!(SwapTxDescription::new(swap.alice.tx.params()).is_refunded());
    assert_eq!(SwapTxDescription::new(swap.alice.tx.params()).status_string(), "refunded");

    // back online, bob finds it is too late to redeem and uses the key alice
    // disclosed to refund right away
    swap.bob_online = true;
    swap.run();
    assert_eq!(swap.bob.state(), State::SendingRefundTX);
    assert!(swap.bob.tx.params().contains(TxParameterId::AtomicSwapPeerPrivateKey, SubTxIndex::Default));

    swap.mine(0, 1);
    assert_eq!(swap.bob.state(), State::Refunded);

    let withdrawals = &swap.foreign.borrow().withdrawals;
    assert_eq!(withdrawals.len(), 1);
    assert_eq!(withdrawals[0].lock_time, 0);
    assert_eq!(withdrawals[0].signing_key, swap.alice.bridge.key.secret_key.serialize());
    assert!(withdrawals[0].secret.is_some());

    Ok(())
}

#[test]
fn reorg_below_refund_proof_resends_refund() -> anyhow::Result<()> {
    let mut swap = Swap::new()?;
    swap.run();
    swap.bob_online = false;
    swap.mine(0, 1);
    swap.mine(1, 0);
    let refund_height = SwapTxDescription::new(swap.alice.tx.params())
        .min_refund_height()
        .unwrap();
    let height = swap.native.borrow().height;
    swap.mine(refund_height - height + 1, 0);
    swap.mine(1, 0);
    assert_eq!(swap.alice.state(), State::Refunded);

    let proof_height = swap
        .alice
        .tx
        .params()
        .get_sub::<Height>(TxParameterId::KernelProofHeight, SubTxIndex::BeamRefundTx)
        .unwrap();
    assert!(!swap.alice.tx.rollback(proof_height));
    assert!(swap.alice.tx.rollback(proof_height - 1));
    assert_eq!(swap.alice.state(), State::SendingBeamRefundTX);

    swap.run();
    assert_eq!(swap.alice.state(), State::Refunded);

    Ok(())
}

#[test]
fn foreign_sender_may_cancel_before_locking() -> anyhow::Result<()> {
    let mut swap = Swap::new()?;
    swap.bob.bridge.hold.set(Hold::ContractCreation);

    swap.run();
    assert_eq!(swap.alice.state(), State::HandlingContractTX);
    assert_eq!(swap.bob.state(), State::HandlingContractTX);

    assert!(!swap.alice.tx.can_cancel());
    assert!(!swap.alice.tx.cancel());
    assert_eq!(swap.alice.state(), State::HandlingContractTX);

    assert!(swap.bob.tx.can_cancel());
    assert!(swap.bob.tx.cancel());
    assert_eq!(swap.bob.state(), State::Canceled);
    assert_eq!(swap.bob.status(), Some(TxStatus::Canceled));
    assert!(swap.bob.gateway.rolled_back.get());
    assert!(swap.bob.closed.get());

    swap.run();
    assert_eq!(swap.alice.state(), State::Failed);
    assert_eq!(swap.alice.status(), Some(TxStatus::Failed));
    assert!(swap.alice.gateway.rolled_back.get());
    assert_eq!(
        swap.alice.tx.params().get::<TxFailureReason>(TxParameterId::FailureReason),
        Some(TxFailureReason::Canceled)
    );

    Ok(())
}

#[test]
fn foreign_sender_cannot_cancel_once_lock_is_broadcast() -> anyhow::Result<()> {
    let mut swap = Swap::new()?;
    swap.bob.bridge.hold.set(Hold::Broadcast);

    swap.run();
    assert_eq!(swap.bob.state(), State::HandlingContractTX);
    assert_eq!(swap.bob.bridge.parked.borrow().len(), 1);

    assert!(!swap.bob.tx.can_cancel());
    assert!(!swap.bob.tx.cancel());
    assert_eq!(swap.bob.state(), State::HandlingContractTX);

    Ok(())
}

#[test]
fn cancel_is_refused_once_pending_broadcast_completes() -> anyhow::Result<()> {
    let mut swap = Swap::new()?;
    swap.bob.bridge.hold.set(Hold::Broadcast);
    swap.run();
    assert_eq!(swap.bob.state(), State::HandlingContractTX);

    // the node accepts the lock but bob has not updated since
    let done = swap.bob.bridge.parked.borrow_mut().pop().unwrap();
    done(Ok("ftx-lock".to_string()));

    assert!(!swap.bob.tx.cancel());
    assert_ne!(swap.bob.state(), State::Canceled);
    assert_eq!(
        swap.bob
            .tx
            .params()
            .get_sub::<bool>(TxParameterId::TransactionRegistered, SubTxIndex::LockTx),
        Some(true)
    );

    swap.bob.tx.update();
    assert_ne!(swap.bob.state(), State::Canceled);

    Ok(())
}

#[test]
fn cancel_while_negotiating_discloses_native_side_key() -> anyhow::Result<()> {
    let mut swap = Swap::new()?;
    // only bob's invitation and alice's lock invitation are exchanged
    swap.bob.tx.update();
    let invitation = swap.bob.sent.borrow_mut().pop_front().unwrap();
    swap.alice.tx.on_peer_message(invitation);
    assert_eq!(swap.alice.state(), State::BuildingBeamLockTX);

    assert!(swap.alice.tx.cancel());
    assert_eq!(swap.alice.state(), State::Canceled);

    let sent: Vec<SetTxParameter> = swap.alice.sent.borrow_mut().drain(..).collect();
    let notification = sent.last().unwrap();
    assert_eq!(
        notification.get::<TxFailureReason>(TxParameterId::FailureReason, SubTxIndex::Default),
        Some(TxFailureReason::Canceled)
    );
    assert_eq!(
        notification.get::<[u8; 32]>(TxParameterId::AtomicSwapPeerPrivateKey, SubTxIndex::Default),
        Some(swap.alice.bridge.key.secret_key.serialize())
    );

    Ok(())
}

#[test]
fn unanswered_invitation_expires() -> anyhow::Result<()> {
    let mut swap = Swap::new()?;
    swap.bob.tx.update();
    swap.bob.sent.borrow_mut().clear();
    assert_eq!(swap.bob.state(), State::BuildingBeamLockTX);

    let max_height = swap
        .bob
        .tx
        .params()
        .get_sub::<Height>(TxParameterId::MaxHeight, SubTxIndex::BeamLockTx)
        .unwrap();
    swap.native.borrow_mut().mine(max_height - START_HEIGHT);
    swap.bob.tx.update();
    assert_eq!(swap.bob.state(), State::BuildingBeamLockTX);

    swap.native.borrow_mut().mine(1);
    swap.bob.tx.update();
    assert_eq!(swap.bob.state(), State::Failed);
    assert!(swap.bob.gateway.rolled_back.get());

    let description = SwapTxDescription::new(swap.bob.tx.params());
    assert!(description.is_expired());
    assert_eq!(description.status_string(), "expired");
    assert_eq!(
        swap.bob.tx.description().map(|tx| tx.status),
        Some(TxStatus::Failed)
    );

    Ok(())
}

#[test]
fn peer_cannot_set_local_only_parameters() -> anyhow::Result<()> {
    let mut swap = Swap::new()?;
    let tx_id = swap.alice.tx.tx_id();

    let forged = SetTxParameter::new(tx_id)
        .add(TxParameterId::Amount, 1u64)
        .add_sub(TxParameterId::KernelProofHeight, 5u64, SubTxIndex::BeamLockTx)
        .add_sub(TxParameterId::AtomicSwapSecretPrivateKey, [9u8; 32], SubTxIndex::BeamRedeemTx);
    assert!(swap.alice.tx.on_peer_message(forged));

    let params = swap.alice.tx.params();
    assert_eq!(params.get::<u64>(TxParameterId::Amount), Some(500_000_000));
    assert!(!params.contains(TxParameterId::KernelProofHeight, SubTxIndex::BeamLockTx));
    assert!(!params.contains(TxParameterId::AtomicSwapSecretPrivateKey, SubTxIndex::BeamRedeemTx));

    assert!(!swap.alice.tx.on_peer_message(SetTxParameter::new(TxId::new_random())));

    Ok(())
}

#[test]
fn acceptor_rejects_lock_window_outside_response_time() -> anyhow::Result<()> {
    let mut swap = Swap::new()?;
    swap.bob.tx.update();
    let mut invitation = swap.bob.sent.borrow_mut().pop_front().unwrap();
    for (sub, id, value) in invitation.params.iter_mut() {
        if *sub == SubTxIndex::BeamLockTx && *id == TxParameterId::MinHeight {
            *value = ParameterValue::U64(START_HEIGHT + 150);
        }
    }

    swap.alice.tx.on_peer_message(invitation);

    assert_eq!(swap.alice.state(), State::Failed);
    assert_eq!(
        swap.alice.tx.params().get::<TxFailureReason>(TxParameterId::InternalFailureReason),
        Some(TxFailureReason::MinHeightIsUnacceptable)
    );
    let notification = swap.alice.sent.borrow_mut().pop_back().unwrap();
    assert_eq!(
        notification.get::<TxFailureReason>(TxParameterId::FailureReason, SubTxIndex::Default),
        Some(TxFailureReason::MinHeightIsUnacceptable)
    );

    Ok(())
}
