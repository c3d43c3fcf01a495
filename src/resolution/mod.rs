pub mod gamma;
pub mod oracle;
pub mod overrides;
pub mod uma;

pub use oracle::ResolutionOracle;
pub use overrides::OverrideTable;
pub use uma::{OracleError, OracleReader, UmaOracleClient};
