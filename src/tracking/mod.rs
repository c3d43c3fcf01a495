pub mod ledger;
pub mod price_history;

pub use ledger::{LedgerConfig, LedgerStats, LedgerStorage, WhaleLedger};
pub use price_history::{PriceHistory, PriceSample};
