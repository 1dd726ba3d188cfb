use fairlaunch::{
    ledger::{CallContext, LedgerError, TokenLedger},
    policy::TokenConfig,
    run_scenario,
    scenario::StepOutcome,
    Address, Scenario,
};

const UNIT: u128 = 1_000_000_000_000_000_000;

fn addr(label: &str) -> Address {
    Address::from_label(label)
}

#[test]
fn reference_launch_splits_fees_exactly() {
    let owner = CallContext::new(addr("owner"), 1_700_000_000);
    let mut ledger = TokenLedger::deploy(
        &TokenConfig::default(),
        &owner,
        addr("contract"),
        addr("dev"),
        addr("liquidity"),
    )
    .unwrap();

    ledger
        .distribute_tokens(&owner, &[addr("alice")], &[1_000_000])
        .unwrap();
    ledger
        .lock_liquidity(&owner, 100_000, addr("locker"))
        .unwrap();
    ledger.enable_trading(&owner).unwrap();
    let contract_before = ledger.balance_of(addr("contract"));

    let alice = CallContext::new(addr("alice"), 1_700_000_060);
    ledger.transfer(&alice, addr("bob"), 1_000).unwrap();

    assert_eq!(ledger.balance_of(addr("bob")), 960);
    assert_eq!(ledger.balance_of(addr("liquidity")), 20);
    assert_eq!(ledger.balance_of(addr("dev")), 10);
    assert_eq!(ledger.balance_of(addr("contract")), contract_before + 10);
    assert_eq!(ledger.balance_of(addr("alice")), 999_000);
    assert_eq!(ledger.balance_of(addr("locker")), 100_000);
    assert_eq!(ledger.total_supply(), 1_000_000_000 * UNIT);
    ledger.verify_conservation().unwrap();
}

#[test]
fn demo_scenario_replays_with_expected_outcomes() {
    let scenario: Scenario = serde_json::from_str(include_str!("../demos/launch.json")).unwrap();
    let report = run_scenario(&scenario).unwrap();

    let accepted: Vec<bool> = report
        .outcomes
        .iter()
        .map(|step| step.outcome.is_accepted())
        .collect();
    assert_eq!(
        accepted,
        [true, false, false, true, true, true, false, true, true, false, true, false]
    );

    let reason = |index: usize| match &report.outcomes[index].outcome {
        StepOutcome::Rejected { reason } => reason.clone(),
        StepOutcome::Accepted { .. } => String::new(),
    };
    assert_eq!(reason(1), LedgerError::TradingDisabled.to_string());
    assert_eq!(reason(2), LedgerError::LiquidityNotLocked.to_string());
    assert!(reason(6).contains("max transaction"));
    assert!(reason(9).contains("cooldown"));
    assert_eq!(
        reason(11),
        LedgerError::Unauthorized {
            caller: addr("owner")
        }
        .to_string()
    );

    let snapshot = &report.snapshot;
    assert_eq!(snapshot.owner, None);
    assert!(snapshot.trading_enabled);
    assert!(!snapshot.paused);
    assert_eq!(
        snapshot.accounts[&addr("bob")].balance,
        500_000 * UNIT + 960 * UNIT
    );
    assert_eq!(snapshot.holder_fees_accrued, 10 * UNIT);
    assert_eq!(report.accepted(), 7);
    assert_eq!(report.rejected(), 5);
}
