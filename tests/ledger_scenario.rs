use std::{sync::Arc, thread};

use burn_ledger::{
    contracts::ContractState, BurnContract, BurnLedger, CallContext, LedgerConfig, ManualClock,
};
use rand::{rngs::StdRng, Rng, SeedableRng};

const WINDOW: u64 = 5_000;

fn ledger() -> (Arc<BurnLedger<Arc<ManualClock>>>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(1_700_000_000_000));
    let config = LedgerConfig {
        maturation_window_ms: WINDOW,
        ..LedgerConfig::default()
    };
    (Arc::new(BurnLedger::new(config, Arc::clone(&clock))), clock)
}

#[test]
fn destroy_script_counts_four_rewards_after_waiting() {
    let clock = Arc::new(ManualClock::new(0));
    let contract = BurnContract::new(BurnLedger::new(
        LedgerConfig::default(),
        Arc::clone(&clock),
    ));
    let signer = CallContext::new("0xf39fd6e51aad88f6f4ce6ab8827279cfffb92266");

    let before = contract.t1();
    assert_eq!(before.events, 0);

    for amount in [500, 10, 20, 30] {
        contract.burn(&signer, amount).unwrap();
    }
    assert_eq!(contract.rewards_count(&signer.caller).unwrap(), 0);

    clock.advance(6_000);
    assert_eq!(contract.rewards_count(&signer.caller).unwrap(), 4);
    assert_eq!(contract.t1().total_burned, 560);
}

#[test]
fn random_burn_sequences_count_each_event_once() {
    let mut rng = StdRng::seed_from_u64(0x0b0b_5eed);
    for _ in 0..20 {
        let (ledger, clock) = ledger();
        let mut submitted = 0u64;
        let mut last_count = 0u64;
        for _ in 0..rng.gen_range(1..40) {
            let account = if rng.gen_bool(0.5) { "alice" } else { "bob" };
            if account == "alice" {
                submitted += 1;
            }
            ledger.burn(account, rng.gen_range(1..1_000)).unwrap();
            clock.advance(rng.gen_range(0..2 * WINDOW));

            let count = ledger.rewards_count("alice").unwrap();
            assert_eq!(count, ledger.rewards_count("alice").unwrap());
            assert!(count >= last_count);
            assert!(count <= submitted);
            last_count = count;
        }
        clock.advance(WINDOW);
        assert_eq!(ledger.rewards_count("alice").unwrap(), submitted);
    }
}

#[test]
fn event_at_t_matures_exactly_at_t_plus_window() {
    let (ledger, _clock) = ledger();
    let event = ledger.burn("alice", 1).unwrap();
    let t = event.timestamp;
    assert_eq!(ledger.rewards_count_at("alice", t + WINDOW - 1).unwrap(), 0);
    assert_eq!(ledger.rewards_count_at("alice", t + WINDOW).unwrap(), 1);
    assert_eq!(ledger.rewards_count_at("alice", t + 10 * WINDOW).unwrap(), 1);
}

#[test]
fn concurrent_burns_on_distinct_accounts_are_all_recorded() {
    let (ledger, clock) = ledger();
    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || {
                let account = format!("acct-{worker}");
                for amount in 1..=50 {
                    ledger.burn(&account, amount).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    clock.advance(WINDOW);
    let status = ledger.status();
    assert_eq!(status.accounts, 8);
    assert_eq!(status.events, 400);
    assert_eq!(status.next_seq, 401);
    for worker in 0..8 {
        let account = format!("acct-{worker}");
        assert_eq!(ledger.rewards_count(&account).unwrap(), 50);
        let history = ledger.history(&account).unwrap();
        let amounts: Vec<_> = history.events.iter().map(|e| e.amount).collect();
        assert_eq!(amounts, (1..=50).collect::<Vec<_>>());
        assert_eq!(history.total_burned, 1_275);
    }
}

#[test]
fn concurrent_burns_on_one_account_keep_time_order() {
    let (ledger, clock) = ledger();
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let ledger = Arc::clone(&ledger);
            let clock = Arc::clone(&clock);
            thread::spawn(move || {
                for _ in 0..100 {
                    ledger.burn("shared", 2).unwrap();
                    clock.advance(1);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let history = ledger.history("shared").unwrap();
    assert_eq!(history.events.len(), 400);
    assert_eq!(history.total_burned, 800);
    assert!(history
        .events
        .windows(2)
        .all(|pair| pair[0].timestamp <= pair[1].timestamp));
}

#[test]
fn contract_state_file_survives_a_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("burn-ledger.json");
    let clock = Arc::new(ManualClock::new(0));
    let signer = CallContext::new("alice");

    {
        let contract = BurnContract::new(BurnLedger::new(
            LedgerConfig::default(),
            Arc::clone(&clock),
        ));
        contract.initialize(&signer, "alice".into()).unwrap();
        for amount in [500, 10, 20, 30] {
            contract.burn(&signer, amount).unwrap();
        }
        contract.state().save(&path).unwrap();
    }

    clock.advance(6_000);
    let state = ContractState::load(&path).unwrap();
    let contract = BurnContract::restore(state, LedgerConfig::default(), clock).unwrap();
    assert_eq!(contract.owner().as_deref(), Some("alice"));
    assert_eq!(contract.rewards_count("alice").unwrap(), 4);
    assert_eq!(contract.claim_list("alice").unwrap().len(), 4);
}
