//! Read-only access to UMA's OptimisticOracleV2 on Polygon, which settles
//! Polymarket binary markets on behalf of the UmaCtfAdapter.
//!
//! A price request is identified by `(requester, identifier, timestamp,
//! ancillaryData)`. Markets have been created with two ancillary layouts,
//! so callers build every candidate key and try them in order.

use std::str::FromStr;

use alloy::primitives::{Address, Bytes, B256, I256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::sol;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use crate::models::{Resolution, ResolutionSource};

pub const YES_OR_NO_IDENTIFIER: &str = "YES_OR_NO_QUERY";

sol! {
    struct RequestSettings {
        bool eventBased;
        bool refundOnDispute;
        bool callbackOnPriceProposed;
        bool callbackOnPriceDisputed;
        bool callbackOnPriceSettled;
        uint256 bond;
        uint256 customLiveness;
    }

    struct Request {
        address proposer;
        address disputer;
        address currency;
        bool settled;
        RequestSettings requestSettings;
        int256 proposedPrice;
        int256 resolvedPrice;
        uint256 expirationTime;
        uint256 reward;
        uint256 finalFee;
    }

    #[sol(rpc)]
    contract OptimisticOracleV2 {
        function hasPrice(
            address requester,
            bytes32 identifier,
            uint256 timestamp,
            bytes memory ancillaryData
        ) external view returns (bool);

        function getRequest(
            address requester,
            bytes32 identifier,
            uint256 timestamp,
            bytes memory ancillaryData
        ) external view returns (Request memory);
    }
}

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle RPC call failed: {0}")]
    Rpc(String),

    #[error("invalid oracle configuration: {0}")]
    Config(String),
}

/// How the ancillary data of a request key was built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AncillaryEncoding {
    /// Sorted-key JSON object carrying the question text.
    JsonQuestion,
    /// Question id left-padded to 32 bytes.
    QuestionId,
    /// Condition id left-padded to 32 bytes.
    ConditionId,
}

impl std::fmt::Display for AncillaryEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AncillaryEncoding::JsonQuestion => f.write_str("json_question"),
            AncillaryEncoding::QuestionId => f.write_str("question_id"),
            AncillaryEncoding::ConditionId => f.write_str("condition_id"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestKey {
    pub identifier: B256,
    pub timestamp: u64,
    pub ancillary_data: Vec<u8>,
    pub encoding: AncillaryEncoding,
}

/// The fields of an OOv2 request this crate cares about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleRequest {
    pub settled: bool,
    pub resolved_price: I256,
    pub expiration_time: u64,
}

#[async_trait]
pub trait OracleReader: Send + Sync {
    async fn has_price(&self, key: &RequestKey) -> Result<bool, OracleError>;
    async fn get_request(&self, key: &RequestKey) -> Result<OracleRequest, OracleError>;
}

// ---------------------------------------------------------------------------
// Request key construction
// ---------------------------------------------------------------------------

/// `YES_OR_NO_QUERY` as a right-padded bytes32.
pub fn yes_or_no_identifier() -> B256 {
    let mut bytes = [0u8; 32];
    let name = YES_OR_NO_IDENTIFIER.as_bytes();
    bytes[..name.len()].copy_from_slice(name);
    B256::from(bytes)
}

/// Escape a string the way a sorted, ASCII-only JSON encoder does:
/// `\uXXXX` (lowercase hex, surrogate pairs) for anything outside ASCII.
fn json_escape_ascii(s: &str, out: &mut String) {
    for ch in s.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{08}' => out.push_str("\\b"),
            '\u{0c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 || !c.is_ascii() => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    out.push_str(&format!("\\u{:04x}", unit));
                }
            }
            c => out.push(c),
        }
    }
}

/// `{"p1": 0, "p2": 1000000000000000000, "p3": 2, "q": <question>, "rebate": 0}`
pub fn json_ancillary_data(question: &str) -> Vec<u8> {
    let mut out = String::from("{\"p1\": 0, \"p2\": 1000000000000000000, \"p3\": 2, \"q\": \"");
    json_escape_ascii(question, &mut out);
    out.push_str("\", \"rebate\": 0}");
    out.into_bytes()
}

/// Hex id (with or without 0x) left-padded to 32 bytes.
pub fn padded_id_ancillary_data(hex_id: &str) -> Option<Vec<u8>> {
    let raw = alloy::hex::decode(hex_id.trim()).ok()?;
    if raw.is_empty() || raw.len() > 32 {
        return None;
    }
    let mut bytes = vec![0u8; 32 - raw.len()];
    bytes.extend_from_slice(&raw);
    Some(bytes)
}

/// Unix seconds of a market end date (RFC 3339 or plain date); 0 when unknown.
pub fn request_timestamp(end_date: Option<&str>) -> u64 {
    let Some(raw) = end_date.map(str::trim).filter(|s| !s.is_empty()) else {
        return 0;
    };
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp())
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
                .map(|dt| dt.and_utc().timestamp())
        });
    parsed.and_then(|t| u64::try_from(t).ok()).unwrap_or(0)
}

/// Candidate request keys in lookup order: JSON question form, then the
/// question-id form, then the condition-id form.
pub fn candidate_keys(
    question: Option<&str>,
    question_id: Option<&str>,
    condition_id: &str,
    end_date: Option<&str>,
) -> Vec<RequestKey> {
    let identifier = yes_or_no_identifier();
    let timestamp = request_timestamp(end_date);
    let key = |ancillary_data: Vec<u8>, encoding| RequestKey {
        identifier,
        timestamp,
        ancillary_data,
        encoding,
    };

    let mut keys = Vec::new();
    if let Some(q) = question.map(str::trim).filter(|q| !q.is_empty()) {
        keys.push(key(json_ancillary_data(q), AncillaryEncoding::JsonQuestion));
    }
    if let Some(data) = question_id.and_then(padded_id_ancillary_data) {
        keys.push(key(data, AncillaryEncoding::QuestionId));
    }
    if let Some(data) = padded_id_ancillary_data(condition_id) {
        keys.push(key(data, AncillaryEncoding::ConditionId));
    }
    keys
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Why a settled request could not be turned into an outcome.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("resolved price {0} outside 0..=1e18")]
pub struct OutOfRangePrice(pub String);

/// Turn a settled OOv2 request into a binary outcome. `Ok(None)` means the
/// request exists but has not settled yet.
pub fn decode_request(request: &OracleRequest) -> Result<Option<Resolution>, OutOfRangePrice> {
    if !request.settled {
        return Ok(None);
    }

    let raw = request.resolved_price.to_string();
    let full_scale = Decimal::from(1_000_000_000_000_000_000u64);
    let value = Decimal::from_str(&raw)
        .ok()
        .filter(|v| *v >= Decimal::ZERO && *v <= full_scale)
        .ok_or_else(|| OutOfRangePrice(raw.clone()))?;

    let yes_price = value / full_scale;
    let half = Decimal::new(5, 1);
    let (winning_outcome_index, resolved_price) = if yes_price >= half {
        (0, yes_price)
    } else {
        (1, Decimal::ONE - yes_price)
    };

    let resolution_time = (request.expiration_time > 0)
        .then(|| DateTime::<Utc>::from_timestamp(request.expiration_time as i64, 0))
        .flatten();

    Ok(Some(Resolution {
        winning_outcome_index,
        resolved_price,
        resolution_time,
        source: ResolutionSource::UmaOracle,
    }))
}

// ---------------------------------------------------------------------------
// RPC client
// ---------------------------------------------------------------------------

pub struct UmaOracleClient {
    contract: OptimisticOracleV2::OptimisticOracleV2Instance<DynProvider>,
    requester: Address,
}

impl UmaOracleClient {
    pub fn new(rpc_url: &str, oracle_address: &str, requester_address: &str) -> Result<Self, OracleError> {
        let url = rpc_url
            .parse()
            .map_err(|e| OracleError::Config(format!("rpc url {rpc_url}: {e}")))?;
        let oracle = Address::from_str(oracle_address)
            .map_err(|e| OracleError::Config(format!("oracle address: {e}")))?;
        let requester = Address::from_str(requester_address)
            .map_err(|e| OracleError::Config(format!("requester address: {e}")))?;

        let provider = ProviderBuilder::new().connect_http(url).erased();

        Ok(Self {
            contract: OptimisticOracleV2::new(oracle, provider),
            requester,
        })
    }
}

#[async_trait]
impl OracleReader for UmaOracleClient {
    async fn has_price(&self, key: &RequestKey) -> Result<bool, OracleError> {
        self.contract
            .hasPrice(
                self.requester,
                key.identifier,
                U256::from(key.timestamp),
                Bytes::from(key.ancillary_data.clone()),
            )
            .call()
            .await
            .map_err(|e| OracleError::Rpc(e.to_string()))
    }

    async fn get_request(&self, key: &RequestKey) -> Result<OracleRequest, OracleError> {
        let request = self
            .contract
            .getRequest(
                self.requester,
                key.identifier,
                U256::from(key.timestamp),
                Bytes::from(key.ancillary_data.clone()),
            )
            .call()
            .await
            .map_err(|e| OracleError::Rpc(e.to_string()))?;

        Ok(OracleRequest {
            settled: request.settled,
            resolved_price: request.resolvedPrice,
            expiration_time: u64::try_from(request.expirationTime).unwrap_or(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn price(raw: &str) -> I256 {
        raw.parse::<I256>().unwrap()
    }

    #[test]
    fn identifier_is_right_padded() {
        let id = yes_or_no_identifier();
        assert_eq!(&id[..15], b"YES_OR_NO_QUERY");
        assert!(id[15..].iter().all(|b| *b == 0));
    }

    #[test]
    fn json_form_uses_sorted_keys_and_spaced_separators() {
        let data = json_ancillary_data("Will it rain?");
        assert_eq!(
            String::from_utf8(data).unwrap(),
            r#"{"p1": 0, "p2": 1000000000000000000, "p3": 2, "q": "Will it rain?", "rebate": 0}"#
        );
    }

    #[test]
    fn json_form_escapes_quotes_and_non_ascii() {
        let data = String::from_utf8(json_ancillary_data("Pel\u{e9} \"10\"?")).unwrap();
        assert!(data.contains(r#""q": "Pel\u00e9 \"10\"?""#));

        let emoji = String::from_utf8(json_ancillary_data("\u{1F680}")).unwrap();
        assert!(emoji.contains(r#""q": "\ud83d\ude80""#));
    }

    #[test]
    fn ids_are_left_padded_to_32_bytes() {
        let data = padded_id_ancillary_data("0xabcd").unwrap();
        assert_eq!(data.len(), 32);
        assert_eq!(&data[30..], &[0xab, 0xcd]);
        assert!(padded_id_ancillary_data("not hex").is_none());
    }

    #[test]
    fn timestamp_from_end_date() {
        assert_eq!(request_timestamp(Some("2024-11-05T12:00:00Z")), 1_730_808_000);
        assert_eq!(request_timestamp(Some("2024-11-05")), 1_730_764_800);
        assert_eq!(request_timestamp(None), 0);
        assert_eq!(request_timestamp(Some("soon")), 0);
    }

    #[test]
    fn candidate_keys_follow_lookup_order() {
        let keys = candidate_keys(Some("Q?"), Some("0x01"), "0x02", None);
        let order: Vec<_> = keys.iter().map(|k| k.encoding).collect();
        assert_eq!(
            order,
            vec![
                AncillaryEncoding::JsonQuestion,
                AncillaryEncoding::QuestionId,
                AncillaryEncoding::ConditionId
            ]
        );

        let keys = candidate_keys(None, None, "0x02", None);
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn full_scale_is_outcome_zero() {
        let req = OracleRequest {
            settled: true,
            resolved_price: price("1000000000000000000"),
            expiration_time: 1_700_000_000,
        };
        let res = decode_request(&req).unwrap().unwrap();
        assert_eq!(res.winning_outcome_index, 0);
        assert_eq!(res.resolved_price, Decimal::ONE);
        assert!(res.resolution_time.is_some());
    }

    #[test]
    fn zero_is_outcome_one() {
        let req = OracleRequest {
            settled: true,
            resolved_price: price("0"),
            expiration_time: 0,
        };
        let res = decode_request(&req).unwrap().unwrap();
        assert_eq!(res.winning_outcome_index, 1);
        assert_eq!(res.resolved_price, Decimal::ONE);
        assert!(res.resolution_time.is_none());
    }

    #[test]
    fn half_scale_goes_to_outcome_zero() {
        let req = OracleRequest {
            settled: true,
            resolved_price: price("500000000000000000"),
            expiration_time: 0,
        };
        let res = decode_request(&req).unwrap().unwrap();
        assert_eq!(res.winning_outcome_index, 0);
        assert_eq!(res.resolved_price, Decimal::new(5, 1));
    }

    #[test]
    fn unsettled_request_is_not_resolved() {
        let req = OracleRequest {
            settled: false,
            resolved_price: price("0"),
            expiration_time: 0,
        };
        assert_eq!(decode_request(&req), Ok(None));
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        for raw in ["-1", "1000000000000000001"] {
            let req = OracleRequest {
                settled: true,
                resolved_price: price(raw),
                expiration_time: 0,
            };
            assert!(decode_request(&req).is_err());
        }
    }
}
