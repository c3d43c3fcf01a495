use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub const GAMMA_API_BASE: &str = "https://gamma-api.polymarket.com";

#[derive(Debug, Error)]
pub enum GammaClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("unexpected response: {0}")]
    Unexpected(String),
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GammaToken {
    #[serde(default)]
    pub token_id: Option<String>,
    #[serde(default)]
    pub outcome: Option<String>,
    #[serde(default)]
    pub winner: Option<bool>,
}

/// Market metadata as returned by `/markets`. Gamma is loose about shapes
/// (`outcomes` and `outcomePrices` arrive either as arrays or as JSON text),
/// so those fields stay as raw values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GammaMarket {
    #[serde(default, alias = "conditionId")]
    pub condition_id: Option<String>,
    #[serde(default)]
    pub question: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "questionID", alias = "questionId")]
    pub question_id: Option<String>,
    #[serde(default, alias = "endDateIso")]
    pub end_date_iso: Option<String>,
    #[serde(default, alias = "endDate")]
    pub end_date: Option<String>,
    #[serde(default)]
    pub active: Option<bool>,
    #[serde(default)]
    pub closed: Option<bool>,
    #[serde(default)]
    pub resolved: Option<bool>,
    #[serde(default)]
    pub resolution: Option<Value>,
    #[serde(default, alias = "resolvedOutcomeIndex")]
    pub resolved_outcome_index: Option<Value>,
    #[serde(default)]
    pub outcomes: Option<Value>,
    #[serde(default, alias = "outcomePrices")]
    pub outcome_prices: Option<Value>,
    /// Stringified JSON array of token IDs, e.g. "[\"token1\", \"token2\"]"
    #[serde(default, alias = "clobTokenIds")]
    pub clob_token_ids: Option<String>,
    #[serde(default)]
    pub tokens: Vec<GammaToken>,
}

/// Gamma sometimes encodes arrays as JSON text; accept both.
pub(crate) fn value_as_array(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) => Some(items.clone()),
        Value::String(s) => serde_json::from_str::<Vec<Value>>(s).ok(),
        _ => None,
    }
}

impl GammaMarket {
    /// Parse the stringified clobTokenIds into a Vec of token ID strings.
    pub fn parse_token_ids(&self) -> Vec<String> {
        self.clob_token_ids
            .as_deref()
            .and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
            .unwrap_or_default()
    }

    /// Position of `asset_id` among the market's outcome tokens.
    pub fn outcome_index_of(&self, asset_id: &str) -> Option<i64> {
        let from_ids = self.parse_token_ids().iter().position(|t| t == asset_id);
        let from_tokens = || {
            self.tokens
                .iter()
                .position(|t| t.token_id.as_deref() == Some(asset_id))
        };
        from_ids.or_else(from_tokens).map(|i| i as i64)
    }

    pub fn display_title(&self) -> Option<&str> {
        self.question.as_deref().or(self.title.as_deref())
    }

    pub fn end_date_str(&self) -> Option<&str> {
        self.end_date_iso.as_deref().or(self.end_date.as_deref())
    }

    /// Number of outcomes, when the payload says.
    pub fn outcome_count(&self) -> Option<usize> {
        self.outcomes
            .as_ref()
            .and_then(value_as_array)
            .map(|o| o.len())
            .filter(|n| *n > 0)
            .or_else(|| (!self.tokens.is_empty()).then_some(self.tokens.len()))
    }
}

/// Read access to market metadata by condition id.
#[async_trait]
pub trait MarketMetadataSource: Send + Sync {
    async fn fetch_market(&self, condition_id: &str) -> Result<Option<GammaMarket>, GammaClientError>;
}

#[derive(Debug, Clone)]
pub struct GammaClient {
    http: Client,
    base_url: String,
}

impl Default for GammaClient {
    fn default() -> Self {
        Self::new(GAMMA_API_BASE)
    }
}

impl GammaClient {
    pub fn new(base_url: &str) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Fetch a market by condition id. Returns `None` if Gamma has no match.
    pub async fn get_market_by_condition(
        &self,
        condition_id: &str,
    ) -> Result<Option<GammaMarket>, GammaClientError> {
        let url = format!("{}/markets", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[("conditionId", condition_id)])
            .send()
            .await?
            .error_for_status()?;

        let body: Value = resp.json().await?;
        let markets = extract_markets(body)?;
        Ok(markets.into_iter().next())
    }
}

/// Pull the market list out of the handful of envelopes Gamma uses.
fn extract_markets(body: Value) -> Result<Vec<GammaMarket>, GammaClientError> {
    let list = match body {
        Value::Array(items) => items,
        Value::Object(mut map) => {
            let nested = ["markets", "value", "data", "result", "items"]
                .iter()
                .find_map(|k| match map.remove(*k) {
                    Some(Value::Array(items)) => Some(items),
                    _ => None,
                });
            match nested {
                Some(items) => items,
                None if map.contains_key("id") || map.contains_key("conditionId") => {
                    vec![Value::Object(map)]
                }
                None => return Err(GammaClientError::Unexpected("no market list in response".into())),
            }
        }
        other => {
            return Err(GammaClientError::Unexpected(format!(
                "expected array or object, got {other}"
            )))
        }
    };

    list.into_iter()
        .map(|v| serde_json::from_value::<GammaMarket>(v).map_err(|e| GammaClientError::Unexpected(e.to_string())))
        .collect()
}

#[async_trait]
impl MarketMetadataSource for GammaClient {
    async fn fetch_market(&self, condition_id: &str) -> Result<Option<GammaMarket>, GammaClientError> {
        self.get_market_by_condition(condition_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_markets_from_plain_array_and_envelope() {
        let plain = json!([{ "conditionId": "0xabc", "question": "Q?" }]);
        let markets = extract_markets(plain).unwrap();
        assert_eq!(markets[0].condition_id.as_deref(), Some("0xabc"));

        let wrapped = json!({ "data": [{ "conditionId": "0xdef" }] });
        assert_eq!(extract_markets(wrapped).unwrap()[0].condition_id.as_deref(), Some("0xdef"));
    }

    #[test]
    fn outcome_index_from_stringified_token_ids() {
        let market: GammaMarket = serde_json::from_value(json!({
            "conditionId": "0xabc",
            "clobTokenIds": "[\"111\", \"222\"]",
            "outcomes": "[\"Yes\", \"No\"]"
        }))
        .unwrap();

        assert_eq!(market.outcome_index_of("222"), Some(1));
        assert_eq!(market.outcome_index_of("333"), None);
        assert_eq!(market.outcome_count(), Some(2));
    }
}
