use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Trade (WebSocket)
// ---------------------------------------------------------------------------

/// A trade as pushed on the market channel. Every field is optional because
/// the feed mixes trade prints with book updates and acks.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct WsTrade {
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, alias = "conditionId", alias = "condition_id")]
    pub market: Option<String>,
    #[serde(default, alias = "assetId")]
    pub asset_id: Option<String>,
    #[serde(default)]
    pub side: Option<String>,
    #[serde(default)]
    pub size: Option<Value>,
    #[serde(default)]
    pub price: Option<Value>,
    #[serde(default, alias = "makerAddress")]
    pub maker_address: Option<String>,
    #[serde(default, alias = "takerAddress", alias = "proxyWallet")]
    pub taker_address: Option<String>,
    #[serde(default, alias = "outcomeIndex")]
    pub outcome_index: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub timestamp: Option<Value>,
    #[serde(default, alias = "transactionHash")]
    pub transaction_hash: Option<String>,
}

// ---------------------------------------------------------------------------
// WebSocket subscribe message
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct WsSubscribe {
    #[serde(rename = "type")]
    pub msg_type: String,
    pub assets_ids: Vec<String>,
}

impl WsSubscribe {
    /// `{"type": "market", "assets_ids": ["id1", "id2", ...]}`
    pub fn market(asset_ids: &[String]) -> Self {
        Self {
            msg_type: "market".into(),
            assets_ids: asset_ids.to_vec(),
        }
    }
}
