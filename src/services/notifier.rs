use rust_decimal::Decimal;
use serde_json::json;

use crate::models::{DetectionEvent, PaperTrade, Resolution, Signal};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Telegram message sink. Failures are logged and never reach the caller.
#[derive(Debug, Clone)]
pub struct Notifier {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    chat_id: String,
}

impl Notifier {
    pub fn new(bot_token: String, chat_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_base: TELEGRAM_API.into(),
            bot_token,
            chat_id,
        }
    }

    pub async fn send(&self, message: &str) {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);

        let body = json!({
            "chat_id": self.chat_id,
            "text": message,
            "parse_mode": "Markdown",
        });

        match self.http.post(&url).json(&body).send().await {
            Ok(resp) => {
                if !resp.status().is_success() {
                    tracing::warn!(status = %resp.status(), "Telegram sendMessage returned non-2xx");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to send Telegram notification");
            }
        }
    }
}

fn short(id: &str, keep: usize) -> &str {
    id.get(..keep).unwrap_or(id)
}

fn short_wallet(wallet: &str) -> String {
    match (wallet.get(..6), wallet.len().checked_sub(4).and_then(|i| wallet.get(i..))) {
        (Some(head), Some(tail)) if wallet.len() > 10 => format!("{head}...{tail}"),
        _ => wallet.to_string(),
    }
}

pub fn format_paper_trade_opened(event: &DetectionEvent, confidence: f64, stake: Decimal) -> String {
    format!(
        "*Paper Trade Opened*\nWallet: `{}` (confidence {:.2})\nSide: {}\nWhale notional: ${} USDC\nEntry: {}\nStake: ${}\nMarket: `{}`",
        short_wallet(&event.wallet),
        confidence,
        event.side,
        event.notional.round_dp(2),
        event.price,
        stake.round_dp(2),
        short(&event.market_id, 16),
    )
}

pub fn format_settlement(
    trade: &PaperTrade,
    whale: Option<&Signal>,
    resolution: &Resolution,
    won: bool,
    pnl: Decimal,
) -> String {
    let question = trade
        .market_question
        .as_deref()
        .unwrap_or_else(|| short(&trade.market_ref, 16));
    let mut message = format!(
        "*Paper Trade Settled*\nMarket: {}\nResult: {}\nWinning outcome: {} (via {})\nStake: ${} @ {}\nPnL: ${}",
        question,
        if won { "WON" } else { "LOST" },
        resolution.winning_outcome_index,
        resolution.source,
        trade.stake.round_dp(2),
        trade.entry_price,
        pnl.round_dp(2),
    );
    if let Some(signal) = whale {
        message.push_str(&format!(
            "\nCopied: `{}` (confidence {:.2}, ${} USDC)",
            short_wallet(&signal.wallet),
            signal.whale_confidence,
            signal.notional.round_dp(2),
        ));
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ResolutionSource, Side, TradeStatus};
    use chrono::Utc;

    fn settled_trade() -> PaperTrade {
        PaperTrade {
            id: 7,
            signal_id: 3,
            opened_at: Utc::now(),
            status: TradeStatus::Resolved,
            stake: Decimal::from(50),
            entry_price: Decimal::new(40, 2),
            outcome_index: 0,
            side: Side::Buy,
            market_ref: "0xmarket_settled_notice".into(),
            asset_id: None,
            market_question: Some("Will it rain?".into()),
            resolved_at: None,
            resolved_outcome_index: Some(0),
            resolved_price: Some(Decimal::ONE),
            won: Some(true),
            pnl: Some(Decimal::from(75)),
            error_reason: None,
        }
    }

    #[test]
    fn settlement_message_names_the_copied_whale() {
        let trade = settled_trade();
        let resolution = Resolution {
            winning_outcome_index: 0,
            resolved_price: Decimal::ONE,
            resolution_time: None,
            source: ResolutionSource::UmaOracle,
        };
        let signal = Signal {
            id: 3,
            created_at: Utc::now(),
            wallet: "0x1234567890abcdef".into(),
            wallet_prefix: "0x1234567890".into(),
            market_id: trade.market_ref.clone(),
            asset_id: None,
            outcome_index: 0,
            side: Side::Buy,
            price: Decimal::new(40, 2),
            notional: Decimal::from(5_000),
            whale_confidence: 0.65,
            tx_ref: None,
            market_question: None,
        };

        let plain = format_settlement(&trade, None, &resolution, true, Decimal::from(75));
        assert!(plain.contains("Result: WON"));
        assert!(plain.contains("PnL: $75"));
        assert!(!plain.contains("Copied"));

        let with_whale = format_settlement(&trade, Some(&signal), &resolution, true, Decimal::from(75));
        assert!(with_whale.starts_with(&plain));
        assert!(with_whale.contains("Copied: `0x1234...cdef` (confidence 0.65, $5000 USDC)"));
    }

    #[test]
    fn wallets_are_shortened_safely() {
        assert_eq!(short_wallet("0x1234567890abcdef"), "0x1234...cdef");
        assert_eq!(short_wallet("0xabc"), "0xabc");
        assert_eq!(short("0xab", 16), "0xab");
    }
}
