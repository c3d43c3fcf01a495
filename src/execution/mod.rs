pub mod policy;
pub mod simulator;
pub mod slippage;

pub use policy::{CopyPolicy, SkipReason};
pub use simulator::{CopySimulator, SimulatorConfig};
pub use slippage::{SlippageModel, SlippageTier, TieredSlippage};
