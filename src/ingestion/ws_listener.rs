use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval, sleep};
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::models::{DetectionEvent, Side};
use crate::polymarket::types::{WsSubscribe, WsTrade};

const PING_INTERVAL: Duration = Duration::from_secs(25);
const BASE_RECONNECT_DELAY: Duration = Duration::from_secs(2);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);

/// Delay before reconnect attempt `attempt` (0-based): 2s doubling, capped at 60s.
pub fn reconnect_delay(attempt: u32) -> Duration {
    BASE_RECONNECT_DELAY
        .saturating_mul(2u32.saturating_pow(attempt))
        .min(MAX_RECONNECT_DELAY)
}

/// Subscribe to the market channel for `token_ids` and forward every trade
/// print as a `DetectionEvent`. Runs until the receiving side is dropped.
pub async fn run_ws_listener(ws_url: String, token_ids: Vec<String>, tx: mpsc::Sender<DetectionEvent>) {
    let mut attempt: u32 = 0;
    let subscribe = match serde_json::to_string(&WsSubscribe::market(&token_ids)) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::error!(error = %e, "Failed to encode subscribe message");
            return;
        }
    };

    loop {
        tracing::info!(url = %ws_url, tokens = token_ids.len(), "Connecting to trade feed...");

        match connect_async(&ws_url).await {
            Ok((ws_stream, _response)) => {
                tracing::info!("Trade feed connected");
                attempt = 0;

                let (mut write, mut read) = ws_stream.split();

                if let Err(e) = write.send(Message::Text(subscribe.clone().into())).await {
                    tracing::error!(error = %e, "Failed to send subscribe message");
                } else {
                    let mut ping_timer = interval(PING_INTERVAL);
                    ping_timer.tick().await;

                    loop {
                        tokio::select! {
                            msg = read.next() => {
                                match msg {
                                    Some(Ok(Message::Text(text))) => {
                                        if !forward_trades(text.as_ref(), &tx).await {
                                            tracing::info!("Detection channel closed, stopping listener");
                                            return;
                                        }
                                    }
                                    Some(Ok(Message::Ping(data))) => {
                                        if let Err(e) = write.send(Message::Pong(data)).await {
                                            tracing::warn!(error = %e, "Failed to send pong");
                                            break;
                                        }
                                    }
                                    Some(Ok(Message::Close(_))) => {
                                        tracing::warn!("Trade feed sent close frame");
                                        break;
                                    }
                                    Some(Ok(_)) => {}
                                    Some(Err(e)) => {
                                        tracing::error!(error = %e, "Trade feed read error");
                                        break;
                                    }
                                    None => {
                                        tracing::warn!("Trade feed stream ended");
                                        break;
                                    }
                                }
                            }
                            _ = ping_timer.tick() => {
                                if let Err(e) = write.send(Message::Ping(vec![].into())).await {
                                    tracing::warn!(error = %e, "Failed to send ping");
                                    break;
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Trade feed connection failed");
            }
        }

        let delay = reconnect_delay(attempt);
        attempt = attempt.saturating_add(1);
        tracing::info!(delay_secs = delay.as_secs(), attempt, "Reconnecting...");
        sleep(delay).await;
    }
}

/// Returns false once the receiver is gone.
async fn forward_trades(text: &str, tx: &mpsc::Sender<DetectionEvent>) -> bool {
    for ws_trade in parse_trades(text) {
        match convert_ws_trade(&ws_trade) {
            Some(event) => {
                tracing::debug!(
                    wallet = %event.wallet,
                    market = %event.market_id,
                    side = %event.side,
                    notional = %event.notional,
                    "Trade received"
                );
                if tx.send(event).await.is_err() {
                    return false;
                }
            }
            None => {
                tracing::trace!(raw = %text, "Skipping non-trade or incomplete message");
            }
        }
    }
    true
}

/// Accepts a bare array, a single object, or `{"data": [...]}`.
pub fn parse_trades(text: &str) -> Vec<WsTrade> {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Vec::new();
    };
    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("data") {
            Some(Value::Array(items)) => items,
            _ => vec![Value::Object(map)],
        },
        _ => return Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|v| serde_json::from_value::<WsTrade>(v).ok())
        .collect()
}

fn value_as_decimal(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok(),
        _ => None,
    }
}

fn parse_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let raw = match value? {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => match s.trim().parse::<i64>() {
            Ok(n) => n,
            Err(_) => {
                return DateTime::parse_from_rfc3339(s.trim())
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            }
        },
        _ => return None,
    };
    // Millisecond epochs show up on some channels.
    if raw > 10_000_000_000 {
        DateTime::from_timestamp_millis(raw)
    } else {
        DateTime::from_timestamp(raw, 0)
    }
}

/// A print without a wallet, market, side, or positive price/size is dropped.
pub fn convert_ws_trade(ws: &WsTrade) -> Option<DetectionEvent> {
    if let Some(kind) = ws.event_type.as_deref() {
        if kind != "trade" && kind != "last_trade_price" {
            return None;
        }
    }

    let wallet = ws
        .taker_address
        .as_deref()
        .or(ws.maker_address.as_deref())
        .filter(|w| !w.is_empty())?;
    let market_id = ws.market.as_deref().filter(|m| !m.is_empty())?;
    let side = Side::from_api_str(ws.side.as_deref()?)?;

    let size = value_as_decimal(ws.size.as_ref()).filter(|s| *s > Decimal::ZERO)?;
    let price = value_as_decimal(ws.price.as_ref()).filter(|p| *p > Decimal::ZERO)?;

    Some(DetectionEvent {
        wallet: wallet.to_string(),
        market_id: market_id.to_string(),
        asset_id: ws.asset_id.clone().unwrap_or_default(),
        side,
        outcome_index: ws.outcome_index,
        size,
        price,
        notional: size * price,
        timestamp: parse_timestamp(ws.timestamp.as_ref()).unwrap_or_else(Utc::now),
        tx_ref: ws.transaction_hash.clone(),
        market_question: ws.title.clone(),
    })
}
