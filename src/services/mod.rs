pub mod maintenance;
pub mod notifier;
pub mod settlement;

pub use notifier::Notifier;
pub use settlement::{SettlementLoop, SettlementSummary};
