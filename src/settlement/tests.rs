use super::{CollaboratorError, LedgerClient, Settlement, SettlementError, SettlementSubmitter};
use crate::{
    channel::{
        accept_with, AdoptError, ChannelIdentity, ChannelLedger, ChannelState, MemoryStore,
        Negotiator, ProposeError, Role,
    },
    messages::{ChannelInfo, SettlementRequest, TxConfirmation, VoucherRecord},
    sig::{self, Signer},
    voucher::{Voucher, VoucherError},
    Hash, U256,
};
use core::future::{ready, Future};
use std::sync::Mutex;

const KEY_A: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const KEY_B: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
const KEY_C: &str = "0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";
const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
const CHAIN_ID: u64 = 1337;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    Honest,
    /// Confirms the transaction without closing the channel.
    IgnoreSubmit,
    /// Closes the channel with the submitted balances but keeps the old nonce.
    KeepNonce,
    Unavailable,
}

#[derive(Debug)]
struct ContractState {
    info: ChannelInfo,
    redeemed: Vec<VoucherRecord>,
    submissions: usize,
    blocks: u64,
}

/// In-memory stand-in for the channel contract. Checks settlement requests
/// the way `submitFinalState` does.
#[derive(Debug)]
struct SimulatedContract {
    identity: ChannelIdentity,
    behavior: Behavior,
    state: Mutex<ContractState>,
}

impl SimulatedContract {
    fn new(identity: ChannelIdentity, deposit: u64) -> Self {
        SimulatedContract {
            identity,
            behavior: Behavior::Honest,
            state: Mutex::new(ContractState {
                info: ChannelInfo {
                    nonce: 0,
                    deposit_a: deposit.into(),
                    deposit_b: deposit.into(),
                    balance_a: deposit.into(),
                    balance_b: deposit.into(),
                    is_closed: false,
                    expiry_time: identity.expiry,
                    party_a: identity.party(Role::A),
                    party_b: identity.party(Role::B),
                },
                redeemed: Vec::new(),
                submissions: 0,
                blocks: 0,
            }),
        }
    }

    fn with_behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    fn submissions(&self) -> usize {
        self.state.lock().unwrap().submissions
    }

    fn redeemed(&self) -> usize {
        self.state.lock().unwrap().redeemed.len()
    }

    fn close_with(&self, balance_a: u64, balance_b: u64, nonce: u64) {
        let mut state = self.state.lock().unwrap();
        state.info.balance_a = balance_a.into();
        state.info.balance_b = balance_b.into();
        state.info.nonce = nonce;
        state.info.is_closed = true;
    }

    fn mine(state: &mut ContractState) -> TxConfirmation {
        state.blocks += 1;
        TxConfirmation {
            tx_hash: Hash([state.blocks as u8; 32]),
            block_number: state.blocks,
        }
    }

    fn settle(&self, req: SettlementRequest) -> Result<TxConfirmation, CollaboratorError> {
        let mut state = self.state.lock().unwrap();
        state.submissions += 1;
        if state.info.is_closed {
            return Err(CollaboratorError::Rejected("Channel already closed".into()));
        }
        if req.final_nonce <= state.info.nonce {
            return Err(CollaboratorError::Rejected("Invalid nonce".into()));
        }
        let digest = ChannelState::new(req.final_balance_a, req.final_balance_b, req.final_nonce)
            .digest(&self.identity)
            .unwrap();
        for (role, sig) in [(Role::A, req.sig_a), (Role::B, req.sig_b)] {
            if !sig::verify(self.identity.party(role), digest, sig).unwrap_or(false) {
                return Err(CollaboratorError::Rejected(format!("Invalid signature {}", role)));
            }
        }
        if matches!(self.behavior, Behavior::Honest | Behavior::KeepNonce) {
            state.info.balance_a = req.final_balance_a;
            state.info.balance_b = req.final_balance_b;
            state.info.is_closed = true;
        }
        if self.behavior == Behavior::Honest {
            state.info.nonce = req.final_nonce;
        }
        Ok(Self::mine(&mut state))
    }

    fn unavailable<T>(&self) -> Option<Result<T, CollaboratorError>> {
        (self.behavior == Behavior::Unavailable)
            .then(|| Err(CollaboratorError::Unavailable("connection refused".into())))
    }
}

impl LedgerClient for SimulatedContract {
    fn submit_settlement(
        &self,
        request: SettlementRequest,
    ) -> impl Future<Output = Result<TxConfirmation, CollaboratorError>> + Send {
        ready(self.unavailable().unwrap_or_else(|| self.settle(request)))
    }

    fn channel_info(&self) -> impl Future<Output = Result<ChannelInfo, CollaboratorError>> + Send {
        ready(
            self.unavailable()
                .unwrap_or_else(|| Ok(self.state.lock().unwrap().info)),
        )
    }

    fn redeem_voucher(
        &self,
        voucher: VoucherRecord,
    ) -> impl Future<Output = Result<TxConfirmation, CollaboratorError>> + Send {
        ready(self.unavailable().unwrap_or_else(|| {
            let mut state = self.state.lock().unwrap();
            if state.redeemed.contains(&voucher) {
                return Err(CollaboratorError::Rejected("Voucher already redeemed".into()));
            }
            state.redeemed.push(voucher);
            Ok(Self::mine(&mut state))
        }))
    }
}

fn signers() -> (Signer, Signer) {
    (
        Signer::from_secret_hex(KEY_A).unwrap(),
        Signer::from_secret_hex(KEY_B).unwrap(),
    )
}

fn identity() -> ChannelIdentity {
    let (a, b) = signers();
    ChannelIdentity {
        contract: CONTRACT.parse().unwrap(),
        parties: [a.address(), b.address()],
        chain_id: CHAIN_ID,
        expiry: 1_700_086_400,
    }
}

fn funded_ledger() -> ChannelLedger<MemoryStore> {
    let _ = env_logger::builder().is_test(true).try_init();
    ChannelLedger::open(identity(), 1000.into(), 1000.into(), MemoryStore::new()).unwrap()
}

/// Runs the transfers of the A-pays-200, B-pays-500 session.
async fn run_session(ledger: &ChannelLedger<MemoryStore>) {
    let (a, b) = signers();
    let mut negotiator = Negotiator::new(ledger, &a, &b).unwrap();
    negotiator.establish().unwrap();
    let mut yes = accept_with(|_| true);
    negotiator
        .transfer(Role::A, 200.into(), &mut yes)
        .await
        .unwrap();
    negotiator
        .transfer(Role::B, 500.into(), &mut yes)
        .await
        .unwrap();
}

#[tokio::test]
async fn session_settles_on_chain() {
    let ledger = funded_ledger();
    run_session(&ledger).await;
    let checkpoint = ledger.snapshot().unwrap();
    assert_eq!(
        checkpoint.state(),
        ChannelState::new(1300.into(), 700.into(), 2)
    );

    let contract = SimulatedContract::new(identity(), 1000);
    let submitter = SettlementSubmitter::new(&contract, CHAIN_ID);
    let settlement = submitter.finalize_bidirectional(&ledger).await.unwrap();

    match &settlement {
        Settlement::Settled { confirmation, info } => {
            assert_eq!(confirmation.block_number, 1);
            assert!(info.is_closed);
            assert_eq!(info.balance_a, U256::from(1300));
            assert_eq!(info.balance_b, U256::from(700));
            assert_eq!(info.nonce, 2);
        }
        other => panic!("expected a new settlement, got {:?}", other),
    }
    assert!(ledger.is_closed());
    assert_eq!(contract.submissions(), 1);

    // Nothing moves after settlement.
    assert!(matches!(ledger.adopt(checkpoint), Err(AdoptError::ChannelClosed)));
    let (a, b) = signers();
    let mut negotiator = Negotiator::new(&ledger, &a, &b).unwrap();
    assert_eq!(
        negotiator.propose(Role::A, 1.into()).unwrap_err(),
        ProposeError::ChannelClosed
    );
}

#[tokio::test]
async fn retry_is_a_noop() {
    let ledger = funded_ledger();
    run_session(&ledger).await;
    let contract = SimulatedContract::new(identity(), 1000);
    let submitter = SettlementSubmitter::new(&contract, CHAIN_ID);

    submitter.finalize_bidirectional(&ledger).await.unwrap();
    let again = submitter.finalize_bidirectional(&ledger).await.unwrap();
    assert!(matches!(again, Settlement::AlreadySettled(_)));
    assert_eq!(again.info().balance_a, U256::from(1300));
    assert_eq!(contract.submissions(), 1);
}

#[tokio::test]
async fn settled_elsewhere_with_same_balances() {
    let ledger = funded_ledger();
    run_session(&ledger).await;
    let contract = SimulatedContract::new(identity(), 1000);
    contract.close_with(1300, 700, 2);

    let submitter = SettlementSubmitter::new(&contract, CHAIN_ID);
    let res = submitter.finalize_bidirectional(&ledger).await.unwrap();
    assert!(matches!(res, Settlement::AlreadySettled(_)));
    assert!(ledger.is_closed());
    assert_eq!(contract.submissions(), 0);
}

#[tokio::test]
async fn closed_with_other_balances_is_fatal() {
    let ledger = funded_ledger();
    run_session(&ledger).await;
    let contract = SimulatedContract::new(identity(), 1000);
    contract.close_with(800, 1200, 1);

    let submitter = SettlementSubmitter::new(&contract, CHAIN_ID);
    let err = submitter.finalize_bidirectional(&ledger).await.unwrap_err();
    assert!(matches!(err, SettlementError::SettlementInconsistency(_)));
    assert!(err.is_fatal());
    assert!(!ledger.is_closed());
}

#[tokio::test]
async fn closed_at_other_nonce_is_fatal() {
    let ledger = funded_ledger();
    run_session(&ledger).await;
    let contract = SimulatedContract::new(identity(), 1000);
    // Same balances, but not reached through our checkpoint.
    contract.close_with(1300, 700, 5);

    let submitter = SettlementSubmitter::new(&contract, CHAIN_ID);
    let err = submitter.finalize_bidirectional(&ledger).await.unwrap_err();
    assert!(matches!(err, SettlementError::SettlementInconsistency(_)));
    assert!(err.is_fatal());
    assert!(!ledger.is_closed());
    assert_eq!(contract.submissions(), 0);
}

#[tokio::test]
async fn settled_nonce_must_match() {
    let ledger = funded_ledger();
    run_session(&ledger).await;
    let contract = SimulatedContract::new(identity(), 1000).with_behavior(Behavior::KeepNonce);

    let submitter = SettlementSubmitter::new(&contract, CHAIN_ID);
    let err = submitter.finalize_bidirectional(&ledger).await.unwrap_err();
    assert!(err.is_fatal(), "{}", err);
    assert!(!ledger.is_closed());
    assert_eq!(contract.submissions(), 1);
}

#[tokio::test]
async fn channel_left_open_is_fatal() {
    let ledger = funded_ledger();
    run_session(&ledger).await;
    let contract = SimulatedContract::new(identity(), 1000).with_behavior(Behavior::IgnoreSubmit);

    let submitter = SettlementSubmitter::new(&contract, CHAIN_ID);
    let err = submitter.finalize_bidirectional(&ledger).await.unwrap_err();
    assert!(err.is_fatal(), "{}", err);
    assert!(!ledger.is_closed());
}

#[tokio::test]
async fn unavailable_ledger_can_be_retried() {
    let ledger = funded_ledger();
    run_session(&ledger).await;
    let down = SimulatedContract::new(identity(), 1000).with_behavior(Behavior::Unavailable);

    let err = SettlementSubmitter::new(&down, CHAIN_ID)
        .finalize_bidirectional(&ledger)
        .await
        .unwrap_err();
    assert!(matches!(
        &err,
        SettlementError::CollaboratorUnavailable(r) if r == "connection refused"
    ));
    assert!(!err.is_fatal());
    assert!(!ledger.is_closed());

    let up = SimulatedContract::new(identity(), 1000);
    let res = SettlementSubmitter::new(&up, CHAIN_ID)
        .finalize_bidirectional(&ledger)
        .await
        .unwrap();
    assert!(matches!(res, Settlement::Settled { .. }));
}

#[tokio::test]
async fn wrong_parties_on_chain() {
    let ledger = funded_ledger();
    run_session(&ledger).await;
    let mut other = identity();
    other.parties[1] = Signer::from_secret_hex(KEY_C).unwrap().address();
    let contract = SimulatedContract::new(other, 1000);

    let err = SettlementSubmitter::new(&contract, CHAIN_ID)
        .finalize_bidirectional(&ledger)
        .await
        .unwrap_err();
    assert!(matches!(err, SettlementError::SettlementInconsistency(_)));
    assert_eq!(contract.submissions(), 0);
}

#[tokio::test]
async fn funded_state_is_not_settled() {
    let contract = SimulatedContract::new(identity(), 1000);
    let submitter = SettlementSubmitter::new(&contract, CHAIN_ID);

    let ledger = funded_ledger();
    assert!(matches!(
        submitter.finalize_bidirectional(&ledger).await,
        Err(SettlementError::NoCheckpoint)
    ));

    let (a, b) = signers();
    let mut negotiator = Negotiator::new(&ledger, &a, &b).unwrap();
    negotiator.establish().unwrap();
    assert!(matches!(
        submitter.finalize_bidirectional(&ledger).await,
        Err(SettlementError::NothingToSettle)
    ));
    assert_eq!(contract.submissions(), 0);
}

#[tokio::test]
async fn voucher_redemption() {
    let payer = Signer::from_secret_hex(KEY_A).unwrap();
    let payee = Signer::from_secret_hex(KEY_C).unwrap().address();
    let voucher = Voucher::issue(&payer, payee, U256::exp10(18), CHAIN_ID).unwrap();

    let contract = SimulatedContract::new(identity(), 1000);
    let submitter = SettlementSubmitter::new(&contract, CHAIN_ID);
    let confirmation = submitter.redeem_voucher(&voucher).await.unwrap();
    assert_eq!(confirmation.block_number, 1);
    assert_eq!(contract.redeemed(), 1);

    // The ledger refuses the replay and its reason comes through as is.
    let err = submitter.redeem_voucher(&voucher).await.unwrap_err();
    assert!(matches!(
        &err,
        SettlementError::CollaboratorRejected(r) if r == "Voucher already redeemed"
    ));
    assert_eq!(contract.redeemed(), 1);
}

#[tokio::test]
async fn voucher_for_other_chain_is_not_forwarded() {
    let payer = Signer::from_secret_hex(KEY_A).unwrap();
    let payee = Signer::from_secret_hex(KEY_C).unwrap().address();
    let voucher = Voucher::issue_at(&payer, payee, 5.into(), 1_700_000_000, 1337).unwrap();

    let contract = SimulatedContract::new(identity(), 1000);
    let submitter = SettlementSubmitter::new(&contract, 42);
    let err = submitter.redeem_voucher(&voucher).await.unwrap_err();
    assert!(matches!(
        err,
        SettlementError::Voucher(VoucherError::WrongChain { expected: 42, actual: 1337 })
    ));
    assert_eq!(contract.redeemed(), 0);
}

#[tokio::test]
async fn forged_voucher_is_not_forwarded() {
    let payer = Signer::from_secret_hex(KEY_A).unwrap();
    let payee = Signer::from_secret_hex(KEY_C).unwrap().address();
    let mut voucher = Voucher::issue(&payer, payee, 5.into(), CHAIN_ID).unwrap();
    voucher.amount = 5000.into();

    let contract = SimulatedContract::new(identity(), 1000);
    let err = SettlementSubmitter::new(&contract, CHAIN_ID)
        .redeem_voucher(&voucher)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SettlementError::Voucher(VoucherError::SignatureMismatch { .. })
    ));
    assert_eq!(contract.redeemed(), 0);
}
