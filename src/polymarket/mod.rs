pub mod gamma_client;
pub mod types;

pub use gamma_client::{GammaClient, GammaClientError, GammaMarket, MarketMetadataSource};
pub use types::{WsSubscribe, WsTrade};
