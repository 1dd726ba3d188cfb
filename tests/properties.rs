use fairlaunch::{
    ledger::{Amount, CallContext, TokenLedger},
    policy::{FeeSplit, TokenConfig},
    scenario::{Host, LedgerCall, Step},
    Address,
};
use proptest::prelude::*;

const SUPPLY: Amount = 10_000_000;
const ACTORS: [&str; 6] = ["owner", "contract", "alice", "bob", "carol", "locker"];

fn addr(label: &str) -> Address {
    Address::from_label(label)
}

fn deploy() -> TokenLedger {
    let config = TokenConfig {
        decimals: 0,
        initial_supply: SUPPLY as u64,
        ..TokenConfig::default()
    };
    TokenLedger::deploy(
        &config,
        &CallContext::new(addr("owner"), 0),
        addr("contract"),
        addr("dev"),
        addr("liquidity"),
    )
    .unwrap()
}

fn actor() -> impl Strategy<Value = Address> {
    prop::sample::select(ACTORS.to_vec()).prop_map(addr)
}

fn amount() -> impl Strategy<Value = Amount> {
    prop_oneof![0u128..1_000, 1_000u128..300_000, Just(SUPPLY)]
}

fn call() -> impl Strategy<Value = LedgerCall> {
    prop_oneof![
        4 => (actor(), amount()).prop_map(|(to, amount)| LedgerCall::Transfer { to, amount }),
        1 => (actor(), actor(), amount())
            .prop_map(|(from, to, amount)| LedgerCall::TransferFrom { from, to, amount }),
        1 => (actor(), amount()).prop_map(|(spender, amount)| LedgerCall::Approve { spender, amount }),
        2 => prop::collection::vec((actor(), amount()), 0..4).prop_map(|pairs| {
            let (recipients, amounts) = pairs.into_iter().unzip();
            LedgerCall::DistributeTokens { recipients, amounts }
        }),
        1 => (amount(), actor()).prop_map(|(amount, target)| LedgerCall::LockLiquidity { amount, target }),
        1 => Just(LedgerCall::EnableTrading),
        1 => Just(LedgerCall::RemoveLimits),
        1 => any::<bool>().prop_map(|paused| LedgerCall::EmergencyPause { paused }),
        1 => (actor(), any::<bool>())
            .prop_map(|(account, blacklisted)| LedgerCall::SetBlacklist { account, blacklisted }),
        1 => Just(LedgerCall::RenounceOwnership),
    ]
}

fn scenario_steps() -> impl Strategy<Value = Vec<Step>> {
    prop::collection::vec((actor(), 0u64..100_000, call()), 1..80).prop_map(|raw| {
        let mut at = 0;
        raw.into_iter()
            .map(|(caller, gap, call)| {
                at += gap;
                Step { caller, at, call }
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn balances_always_sum_to_fixed_supply(steps in scenario_steps()) {
        let mut host = Host::new(deploy(), 0);
        for (index, step) in steps.iter().enumerate() {
            host.execute(index, step).unwrap();
            let ledger = host.ledger();
            prop_assert_eq!(ledger.total_supply(), SUPPLY);
            prop_assert!(ledger.verify_conservation().is_ok());
        }
    }

    #[test]
    fn gates_only_move_forward(steps in scenario_steps()) {
        let mut host = Host::new(deploy(), 0);
        let mut trading = false;
        let mut renounced = false;
        let mut lock_end = None;
        for (index, step) in steps.iter().enumerate() {
            host.execute(index, step).unwrap();
            let ledger = host.ledger();
            if trading {
                prop_assert!(ledger.trading_enabled());
            }
            if renounced {
                prop_assert_eq!(ledger.owner(), None);
            }
            if lock_end.is_some() {
                prop_assert_eq!(ledger.liquidity_lock_end_time(), lock_end);
            }
            trading = ledger.trading_enabled();
            renounced = ledger.owner().is_none();
            lock_end = ledger.liquidity_lock_end_time();
        }
    }

    #[test]
    fn rejected_calls_leave_state_untouched(steps in scenario_steps()) {
        let mut host = Host::new(deploy(), 0);
        for (index, step) in steps.iter().enumerate() {
            let before = host.ledger().snapshot();
            if !host.execute(index, step).unwrap().is_accepted() {
                prop_assert_eq!(host.ledger().snapshot(), before);
            }
        }
    }

    #[test]
    fn fee_split_parts_sum_to_amount(amount in 0u128..(u128::MAX / 400)) {
        let split = FeeSplit::compute(amount).unwrap();
        prop_assert_eq!(split.net + split.liquidity + split.dev + split.holders, amount);
        prop_assert_eq!(split.total, amount * 400 / 10_000);
        prop_assert!(split.holders >= split.dev);
    }

    #[test]
    fn taxed_transfer_credits_exact_shares(amount in 0u128..=100_000) {
        let mut ledger = deploy();
        let owner = CallContext::new(addr("owner"), 0);
        ledger.distribute_tokens(&owner, &[addr("alice")], &[100_000]).unwrap();
        ledger.lock_liquidity(&owner, 1, addr("locker")).unwrap();
        ledger.enable_trading(&owner).unwrap();

        let contract_before = ledger.balance_of(addr("contract"));
        let split = FeeSplit::compute(amount).unwrap();
        let receipt = ledger
            .transfer(&CallContext::new(addr("alice"), 1), addr("bob"), amount)
            .unwrap();

        prop_assert_eq!(receipt.net, split.net);
        prop_assert_eq!(ledger.balance_of(addr("bob")), split.net);
        prop_assert_eq!(ledger.balance_of(addr("liquidity")), split.liquidity);
        prop_assert_eq!(ledger.balance_of(addr("dev")), split.dev);
        prop_assert_eq!(ledger.balance_of(addr("contract")), contract_before + split.holders);
        prop_assert_eq!(ledger.balance_of(addr("alice")), 100_000 - amount);
    }
}
