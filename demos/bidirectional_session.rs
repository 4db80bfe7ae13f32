//! Walkthrough: two parties open a session on a funded channel, pay each other
//! twice, settle, then a voucher is redeemed.
//!
//! The channel contract is simulated in memory. Run with `RUST_LOG=debug` to
//! see the library's log output.

use paychan::{
    channel::{
        AcceptanceSource, ChannelIdentity, ChannelLedger, ChannelState, MemoryStore, Negotiator,
        Proposal, Role,
    },
    messages::{ChannelInfo, CheckpointRecord, SettlementRequest, TxConfirmation, VoucherRecord},
    settlement::{CollaboratorError, LedgerClient, Settlement, SettlementSubmitter},
    sig::{self, Signer},
    voucher::Voucher,
    Hash, U256,
};
use std::{future::Future, sync::Mutex};
use tokio::sync::{mpsc, oneshot};

// Well-known development keys, never use them with real funds.
const ALICE_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const BOB_KEY: &str = "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";
const CAROL_KEY: &str = "0x5de4111afa1a4b94908f83103eb1f1706367c2e68ca870fc3fb9a804cdab365a";
const CONTRACT: &str = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
const CHAIN_ID: u64 = 1337;
const PARTICIPANTS: [&str; 2] = ["Alice", "Bob"];

/// Helper macro to print significant places in the protocol.
macro_rules! print_bold {
    ($($arg:tt)*) => {
        print!("\x1b[1m");
        print!($($arg)*);
        println!("\x1b[0m");
    };
}

/// Helper macro to print points where the user/application has to interact.
macro_rules! print_user_interaction {
    ($($arg:tt)*) => {
        print!("\x1b[1;34m");
        print!($($arg)*);
        println!("\x1b[0m");
    };
}

/// Stand-in for the deployed channel contract.
struct Contract {
    identity: ChannelIdentity,
    info: Mutex<ChannelInfo>,
    redeemed: Mutex<Vec<VoucherRecord>>,
    block: Mutex<u64>,
}

impl Contract {
    fn new(identity: ChannelIdentity, deposit_a: U256, deposit_b: U256) -> Self {
        Contract {
            identity,
            info: Mutex::new(ChannelInfo {
                nonce: 0,
                deposit_a,
                deposit_b,
                balance_a: deposit_a,
                balance_b: deposit_b,
                is_closed: false,
                expiry_time: identity.expiry,
                party_a: identity.party(Role::A),
                party_b: identity.party(Role::B),
            }),
            redeemed: Mutex::new(Vec::new()),
            block: Mutex::new(0),
        }
    }

    fn mine(&self) -> TxConfirmation {
        let mut block = self.block.lock().unwrap();
        *block += 1;
        TxConfirmation {
            tx_hash: Hash(rand::random()),
            block_number: *block,
        }
    }

    fn submit_final_state(
        &self,
        req: SettlementRequest,
    ) -> Result<TxConfirmation, CollaboratorError> {
        let mut info = self.info.lock().unwrap();
        if info.is_closed {
            return Err(CollaboratorError::Rejected("Channel already closed".into()));
        }
        let digest = ChannelState::new(req.final_balance_a, req.final_balance_b, req.final_nonce)
            .digest(&self.identity)
            .map_err(|e| CollaboratorError::Rejected(e.to_string()))?;
        for (role, signature) in [(Role::A, req.sig_a), (Role::B, req.sig_b)] {
            if !sig::verify(self.identity.party(role), digest, signature).unwrap_or(false) {
                let reason = format!("Invalid signature from party {}", role);
                return Err(CollaboratorError::Rejected(reason));
            }
        }
        info.balance_a = req.final_balance_a;
        info.balance_b = req.final_balance_b;
        info.nonce = req.final_nonce;
        info.is_closed = true;
        drop(info);
        Ok(self.mine())
    }

    fn redeem(&self, voucher: VoucherRecord) -> Result<TxConfirmation, CollaboratorError> {
        let mut redeemed = self.redeemed.lock().unwrap();
        if redeemed.contains(&voucher) {
            return Err(CollaboratorError::Rejected("Voucher already redeemed".into()));
        }
        redeemed.push(voucher);
        drop(redeemed);
        Ok(self.mine())
    }
}

impl LedgerClient for Contract {
    fn submit_settlement(
        &self,
        request: SettlementRequest,
    ) -> impl Future<Output = Result<TxConfirmation, CollaboratorError>> + Send {
        std::future::ready(self.submit_final_state(request))
    }

    fn channel_info(&self) -> impl Future<Output = Result<ChannelInfo, CollaboratorError>> + Send {
        std::future::ready(Ok(*self.info.lock().unwrap()))
    }

    fn redeem_voucher(
        &self,
        voucher: VoucherRecord,
    ) -> impl Future<Output = Result<TxConfirmation, CollaboratorError>> + Send {
        std::future::ready(self.redeem(voucher))
    }
}

/// Forwards each proposal to the receiving party's task and waits for its
/// answer, like a prompt on the counterparty's device would.
struct Counterparty {
    requests: mpsc::Sender<(Proposal, oneshot::Sender<bool>)>,
}

impl AcceptanceSource for Counterparty {
    fn decide(&mut self, proposal: &Proposal) -> impl Future<Output = bool> + Send {
        let requests = self.requests.clone();
        let proposal = *proposal;
        async move {
            let (tx, rx) = oneshot::channel();
            if requests.send((proposal, tx)).await.is_err() {
                return false;
            }
            rx.await.unwrap_or(false)
        }
    }
}

fn party_name(role: Role) -> &'static str {
    PARTICIPANTS[role.index()]
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let alice = Signer::from_secret_hex(ALICE_KEY).unwrap();
    let bob = Signer::from_secret_hex(BOB_KEY).unwrap();
    let identity = ChannelIdentity {
        contract: CONTRACT.parse().unwrap(),
        parties: [alice.address(), bob.address()],
        chain_id: CHAIN_ID,
        expiry: 1_700_086_400,
    };
    let deposit = U256::from(1000);

    print_bold!(
        "Opening channel {} with {} per party",
        identity.contract,
        deposit
    );
    let store = MemoryStore::new();
    let ledger = ChannelLedger::open(identity, deposit, deposit, store.clone()).unwrap();
    let mut negotiator = Negotiator::new(&ledger, &alice, &bob).unwrap();
    negotiator.establish().unwrap();

    // The counterparty accepts everything below 600.
    let (tx, mut rx) = mpsc::channel::<(Proposal, oneshot::Sender<bool>)>(1);
    let counterparty = tokio::spawn(async move {
        while let Some((proposal, answer)) = rx.recv().await {
            let accept = proposal.amount < U256::from(600);
            print_user_interaction!(
                "{}: {} wants to pay {} (nonce {}), {}",
                party_name(proposal.sender.counterparty()),
                party_name(proposal.sender),
                proposal.amount,
                proposal.state.nonce,
                if accept { "accepting" } else { "rejecting" }
            );
            let _ = answer.send(accept);
        }
    });
    let mut peer = Counterparty { requests: tx };

    for (sender, amount) in [(Role::A, 200u64), (Role::B, 700), (Role::B, 500)] {
        print_bold!("{} pays {}", party_name(sender), amount);
        match negotiator.transfer(sender, amount.into(), &mut peer).await {
            Ok(checkpoint) => {
                let state = checkpoint.state();
                println!(
                    "Checkpoint {}: Alice={} Bob={}",
                    state.nonce, state.balance_a, state.balance_b
                );
            }
            Err(e) => println!("Update failed: {}", e),
        }
    }
    drop(peer);
    counterparty.await.unwrap();

    let record = CheckpointRecord::from(&ledger.snapshot().unwrap());
    println!(
        "Stored checkpoint:\n{}",
        serde_json::to_string_pretty(&record).unwrap()
    );

    let contract = Contract::new(identity, deposit, deposit);
    let submitter = SettlementSubmitter::new(&contract, CHAIN_ID);

    print_bold!("Settling");
    match submitter.finalize_bidirectional(&ledger).await.unwrap() {
        Settlement::Settled { confirmation, info } => println!(
            "Closed in block {} (tx {}): Alice={} Bob={}",
            confirmation.block_number,
            confirmation.tx_hash,
            info.balance_a,
            info.balance_b
        ),
        Settlement::AlreadySettled(_) => println!("Channel was already closed"),
    }
    print_bold!("Settling again");
    let again = submitter.finalize_bidirectional(&ledger).await.unwrap();
    println!("Second attempt: {:?}", again);

    print_bold!("Alice gives Carol a voucher");
    let carol = Signer::from_secret_hex(CAROL_KEY).unwrap();
    let voucher = Voucher::issue(&alice, carol.address(), U256::exp10(18), CHAIN_ID).unwrap();
    println!(
        "{}",
        serde_json::to_string_pretty(&VoucherRecord::from(&voucher)).unwrap()
    );
    let confirmation = submitter.redeem_voucher(&voucher).await.unwrap();
    println!("Redeemed in block {}", confirmation.block_number);
    match submitter.redeem_voucher(&voucher).await {
        Ok(_) => println!("Voucher redeemed twice!"),
        Err(e) => println!("Second redemption refused: {}", e),
    }

    let other_chain = SettlementSubmitter::new(&contract, 42);
    if let Err(e) = other_chain.redeem_voucher(&voucher).await {
        println!("On chain 42: {}", e);
    }
}
