//! Fair-launch token ledger: a fungible token whose every transfer runs a fixed
//! guardrail pipeline (pause, blacklist, trading gate, limits, fee split).

pub mod identity;
pub mod ledger;
pub mod policy;
pub mod scenario;

pub use identity::Address;
pub use ledger::{Amount, CallContext, LedgerError, LedgerEvent, Timestamp, TokenLedger};
pub use policy::TokenConfig;
pub use scenario::{run_scenario, Scenario, ScenarioReport};
