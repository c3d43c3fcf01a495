use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::Mutex;

use crate::errors::{AppError, AppResult};
use crate::models::{WhaleRecord, WhaleSource};

pub const INITIAL_CONFIDENCE: f64 = 0.5;
pub const HIGH_CONFIDENCE: f64 = 0.7;

/// Where the ledger keeps its state between restarts.
#[derive(Debug, Clone)]
pub enum LedgerStorage {
    File(PathBuf),
    Memory,
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Idle time after which a wallet is considered inactive.
    pub activity_threshold: Duration,
    pub confidence_step: f64,
    pub decay_per_day: f64,
    /// Idle days that cost nothing once a wallet has gone inactive.
    pub grace_days: f64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            activity_threshold: Duration::hours(72),
            confidence_step: 0.05,
            decay_per_day: 0.01,
            grace_days: 3.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LedgerStats {
    pub total: usize,
    pub active: usize,
    pub inactive: usize,
    pub high_confidence: usize,
    pub avg_confidence: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub deactivated: usize,
    pub reactivated: usize,
    pub changed: usize,
}

/// Decaying-confidence record of every wallet that has placed a whale-sized trade.
///
/// All mutations go through one async mutex so updates for a wallet apply in
/// arrival order, and every mutation is written back to storage before the
/// call returns.
#[derive(Clone)]
pub struct WhaleLedger {
    inner: Arc<Mutex<LedgerInner>>,
    config: LedgerConfig,
}

struct LedgerInner {
    records: BTreeMap<String, WhaleRecord>,
    storage: LedgerStorage,
}

fn wallet_key(wallet: &str) -> String {
    wallet.trim().to_lowercase()
}

impl WhaleLedger {
    /// Load the ledger from `storage`. A file that cannot be parsed is moved
    /// aside and the ledger starts empty.
    pub async fn open(storage: LedgerStorage, config: LedgerConfig) -> AppResult<Self> {
        let records = match &storage {
            LedgerStorage::File(path) => load_file(path).await?,
            LedgerStorage::Memory => BTreeMap::new(),
        };

        tracing::info!(whales = records.len(), "Whale ledger loaded");

        Ok(Self {
            inner: Arc::new(Mutex::new(LedgerInner { records, storage })),
            config,
        })
    }

    pub fn in_memory(config: LedgerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(LedgerInner {
                records: BTreeMap::new(),
                storage: LedgerStorage::Memory,
            })),
            config,
        }
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Confidence `record` would have at `now` given only elapsed idle time.
    fn decayed_confidence(&self, record: &WhaleRecord, now: DateTime<Utc>) -> f64 {
        let idle = now - record.last_activity;
        if idle <= self.config.activity_threshold {
            return record.anchor_confidence.clamp(0.0, 1.0);
        }
        let idle_days = idle.num_seconds() as f64 / 86_400.0;
        let decay = self.config.decay_per_day * (idle_days - self.config.grace_days).max(0.0);
        (record.anchor_confidence - decay).clamp(0.0, 1.0)
    }

    /// Apply one observed trade. Unseen wallets start at the initial confidence;
    /// known wallets gain one confidence step, capped at 1.0.
    pub async fn record_activity(
        &self,
        wallet: &str,
        market_id: &str,
        value: Decimal,
        source: WhaleSource,
        at: DateTime<Utc>,
    ) -> AppResult<WhaleRecord> {
        let key = wallet_key(wallet);
        let mut inner = self.inner.lock().await;

        let snapshot = match inner.records.get(&key) {
            Some(existing) => {
                let current = self.decayed_confidence(existing, at);
                let confidence = (current + self.config.confidence_step).min(1.0);
                let mut record = existing.clone();
                record.markets_traded.insert(market_id.to_string());
                record.trade_count += 1;
                record.total_value += value;
                record.last_activity = record.last_activity.max(at);
                record.first_seen = record.first_seen.min(at);
                record.confidence = confidence;
                record.anchor_confidence = confidence;
                record.active = true;
                record
            }
            None => {
                tracing::info!(wallet = %key, source = %source, "New whale added to ledger");
                WhaleRecord {
                    address: key.clone(),
                    first_seen: at,
                    last_activity: at,
                    markets_traded: BTreeSet::from([market_id.to_string()]),
                    trade_count: 1,
                    total_value: value,
                    confidence: INITIAL_CONFIDENCE,
                    anchor_confidence: INITIAL_CONFIDENCE,
                    active: true,
                    source,
                    win_rate: None,
                    tags: Vec::new(),
                }
            }
        };

        let previous = inner.records.insert(key.clone(), snapshot.clone());
        inner.persist_or_restore(&key, previous).await?;
        Ok(snapshot)
    }

    /// Add a wallet without a trade (elite list, manual additions).
    /// Returns false if the wallet was already known.
    pub async fn register(
        &self,
        wallet: &str,
        source: WhaleSource,
        win_rate: Option<f64>,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let key = wallet_key(wallet);
        let mut inner = self.inner.lock().await;
        if inner.records.contains_key(&key) {
            return Ok(false);
        }

        let previous = inner.records.insert(
            key.clone(),
            WhaleRecord {
                address: key.clone(),
                first_seen: at,
                last_activity: at,
                markets_traded: BTreeSet::new(),
                trade_count: 0,
                total_value: Decimal::ZERO,
                confidence: INITIAL_CONFIDENCE,
                anchor_confidence: INITIAL_CONFIDENCE,
                active: true,
                source,
                win_rate,
                tags: vec![source.to_string()],
            },
        );
        inner.persist_or_restore(&key, previous).await?;

        tracing::info!(wallet = %key, source = %source, "Whale registered");
        Ok(true)
    }

    /// Recompute activity and decayed confidence for every wallet as of `now`.
    /// The result depends only on elapsed time, so repeating a sweep without
    /// new activity changes nothing.
    pub async fn sweep(&self, now: DateTime<Utc>) -> AppResult<SweepReport> {
        let mut inner = self.inner.lock().await;
        let before = inner.records.clone();
        let report = self.sweep_locked(&mut inner, now);
        if report.changed > 0 {
            if let Err(e) = inner.persist().await {
                inner.records = before;
                return Err(e);
            }
            tracing::debug!(
                deactivated = report.deactivated,
                reactivated = report.reactivated,
                changed = report.changed,
                "Ledger sweep applied"
            );
        }
        Ok(report)
    }

    fn sweep_locked(&self, inner: &mut LedgerInner, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::default();
        for record in inner.records.values_mut() {
            let active = now - record.last_activity <= self.config.activity_threshold;
            let confidence = self.decayed_confidence(record, now);

            if active != record.active {
                if active {
                    report.reactivated += 1;
                } else {
                    report.deactivated += 1;
                }
            }
            if active != record.active || confidence != record.confidence {
                report.changed += 1;
            }
            record.active = active;
            record.confidence = confidence;
        }
        report
    }

    /// Sweep, then list active wallets at or above `min_confidence`,
    /// most confident first.
    pub async fn query_active(&self, min_confidence: f64, now: DateTime<Utc>) -> AppResult<Vec<String>> {
        self.sweep(now).await?;
        let inner = self.inner.lock().await;

        let mut active: Vec<(&String, f64)> = inner
            .records
            .iter()
            .filter(|(_, r)| r.active && r.confidence >= min_confidence)
            .map(|(k, r)| (k, r.confidence))
            .collect();
        active.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));

        Ok(active.into_iter().map(|(k, _)| k.clone()).collect())
    }

    /// Remove wallets below `min_confidence`. Returns how many were dropped.
    pub async fn prune(&self, min_confidence: f64) -> AppResult<usize> {
        let mut inner = self.inner.lock().await;
        let before = inner.records.clone();
        inner.records.retain(|_, r| r.confidence >= min_confidence);
        let removed = before.len() - inner.records.len();
        if removed > 0 {
            if let Err(e) = inner.persist().await {
                inner.records = before;
                return Err(e);
            }
            tracing::info!(removed, min_confidence, "Pruned low-confidence whales");
        }
        Ok(removed)
    }

    pub async fn get(&self, wallet: &str) -> Option<WhaleRecord> {
        self.inner.lock().await.records.get(&wallet_key(wallet)).cloned()
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> AppResult<LedgerStats> {
        self.sweep(now).await?;
        let inner = self.inner.lock().await;

        let total = inner.records.len();
        let active = inner.records.values().filter(|r| r.active).count();
        let high_confidence = inner
            .records
            .values()
            .filter(|r| r.confidence >= HIGH_CONFIDENCE)
            .count();
        let avg_confidence = if total == 0 {
            0.0
        } else {
            inner.records.values().map(|r| r.confidence).sum::<f64>() / total as f64
        };

        Ok(LedgerStats {
            total,
            active,
            inactive: total - active,
            high_confidence,
            avg_confidence,
        })
    }
}

impl LedgerInner {
    /// Persist after a single-key change; on failure put `previous` back so
    /// memory matches what is on disk.
    async fn persist_or_restore(&mut self, key: &str, previous: Option<WhaleRecord>) -> AppResult<()> {
        if let Err(e) = self.persist().await {
            match previous {
                Some(record) => self.records.insert(key.to_string(), record),
                None => self.records.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn persist(&self) -> AppResult<()> {
        let LedgerStorage::File(path) = &self.storage else {
            return Ok(());
        };

        let body = serde_json::to_vec_pretty(&self.records)
            .map_err(|e| AppError::Internal(e.into()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = tmp_path(path);
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, path).await?;
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn quarantine_path(path: &Path, now: DateTime<Utc>) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(format!(".corrupt-{}", now.timestamp()));
    path.with_file_name(name)
}

async fn quarantine(path: &Path, reason: &str) -> AppResult<()> {
    let backup = quarantine_path(path, Utc::now());
    tracing::warn!(
        path = %path.display(),
        backup = %backup.display(),
        error = %reason,
        "Whale ledger unreadable, quarantined and starting empty"
    );
    tokio::fs::rename(path, &backup).await?;
    Ok(())
}

async fn load_file(path: &Path) -> AppResult<BTreeMap<String, WhaleRecord>> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };

    let raw = match String::from_utf8(bytes) {
        Ok(raw) => raw,
        Err(e) => {
            quarantine(path, &e.to_string()).await?;
            return Ok(BTreeMap::new());
        }
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(BTreeMap::new());
    }

    match serde_json::from_str::<BTreeMap<String, WhaleRecord>>(trimmed) {
        Ok(records) => Ok(records
            .into_iter()
            .map(|(k, mut r)| {
                r.confidence = r.confidence.clamp(0.0, 1.0);
                if r.anchor_confidence <= 0.0 {
                    r.anchor_confidence = r.confidence;
                }
                (wallet_key(&k), r)
            })
            .collect()),
        Err(e) => {
            quarantine(path, &e.to_string()).await?;
            Ok(BTreeMap::new())
        }
    }
}
