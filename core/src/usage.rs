//! C10 — Usage Ledger. An append-only, line-delimited JSON log of every LLM
//! call's token counts and cost, plus read-side aggregation. Mutex-guarded
//! like the teacher's `Application` DI struct guards its shared state, and
//! persisted the plain-file way `logging` persists its rotated log files
//! rather than routed through `store`'s SQLite, since the ledger must keep
//! appending even if the capture database is unavailable (spec §4.10 P2).

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub provider: String,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
}

/// One provider's rollup within an `Aggregate`'s `per_provider` map (data
/// model §3 `UsageRecord` leaf shape).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderUsage {
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub request_count: u64,
}

/// One aggregate leaf (session / day / ISO week / month), matching the
/// `UsageRecord` (persistent JSON) shape in spec §3: `aggregates equal the
/// sum of their constituents` (P2).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Aggregate {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost_usd: f64,
    pub request_count: u64,
    pub per_provider: BTreeMap<String, ProviderUsage>,
}

fn build_aggregate<'a>(records: impl Iterator<Item = &'a UsageRecord>) -> Aggregate {
    let mut aggregate = Aggregate::default();
    for record in records {
        aggregate.input_tokens += record.input_tokens as u64;
        aggregate.output_tokens += record.output_tokens as u64;
        aggregate.total_tokens += (record.input_tokens + record.output_tokens) as u64;
        aggregate.cost_usd += record.cost_usd;
        aggregate.request_count += 1;

        let provider = aggregate.per_provider.entry(record.provider.clone()).or_default();
        provider.model = record.model.clone();
        provider.input_tokens += record.input_tokens as u64;
        provider.output_tokens += record.output_tokens as u64;
        provider.total_tokens += (record.input_tokens + record.output_tokens) as u64;
        provider.cost_usd += record.cost_usd;
        provider.request_count += 1;
    }
    aggregate
}

pub struct UsageLedger {
    path: PathBuf,
    records: Mutex<Vec<UsageRecord>>,
}

impl UsageLedger {
    /// Loads every record already on disk at `path`, tolerating a missing
    /// file (first run) but not a corrupt one.
    pub fn load(path: PathBuf) -> Result<Self, CoreError> {
        let records = if path.exists() {
            let file = File::open(&path)?;
            let reader = BufReader::new(file);
            let mut records = Vec::new();
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() {
                    continue;
                }
                records.push(serde_json::from_str(&line)?);
            }
            records
        } else {
            Vec::new()
        };

        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    /// Appends one record to memory and to disk. Invariant P2: once this
    /// returns `Ok`, the record is durable and will be counted by every
    /// aggregation below, including across process restarts.
    pub fn record(&self, record: UsageRecord) -> Result<(), CoreError> {
        let line = serde_json::to_string(&record)?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        writeln!(file, "{line}")?;
        file.flush()?;

        self.records.lock().expect("usage ledger mutex poisoned").push(record);
        Ok(())
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.aggregate_total().cost_usd
    }

    pub fn cost_by_session(&self, session_id: &str) -> f64 {
        self.aggregate_by_session(session_id).cost_usd
    }

    pub fn cost_by_provider(&self, provider: &str) -> f64 {
        self.records
            .lock()
            .expect("usage ledger mutex poisoned")
            .iter()
            .filter(|r| r.provider == provider)
            .map(|r| r.cost_usd)
            .sum()
    }

    pub fn cost_by_day(&self, day: NaiveDate) -> f64 {
        self.aggregate_by_day(day).cost_usd
    }

    pub fn cost_by_iso_week(&self, year: i32, week: u32) -> f64 {
        self.aggregate_by_iso_week(year, week).cost_usd
    }

    pub fn cost_by_month(&self, year: i32, month: u32) -> f64 {
        self.aggregate_by_month(year, month).cost_usd
    }

    /// Full `{input_tokens, output_tokens, total_tokens, cost_usd,
    /// request_count, per_provider}` rollup over every record ever appended.
    pub fn aggregate_total(&self) -> Aggregate {
        build_aggregate(self.records.lock().expect("usage ledger mutex poisoned").iter())
    }

    pub fn aggregate_by_session(&self, session_id: &str) -> Aggregate {
        let records = self.records.lock().expect("usage ledger mutex poisoned");
        build_aggregate(records.iter().filter(|r| r.session_id == session_id))
    }

    pub fn aggregate_by_day(&self, day: NaiveDate) -> Aggregate {
        let records = self.records.lock().expect("usage ledger mutex poisoned");
        build_aggregate(records.iter().filter(|r| r.timestamp.date_naive() == day))
    }

    pub fn aggregate_by_iso_week(&self, year: i32, week: u32) -> Aggregate {
        let records = self.records.lock().expect("usage ledger mutex poisoned");
        build_aggregate(records.iter().filter(|r| {
            let iso = r.timestamp.date_naive().iso_week();
            iso.year() == year && iso.week() == week
        }))
    }

    pub fn aggregate_by_month(&self, year: i32, month: u32) -> Aggregate {
        let records = self.records.lock().expect("usage ledger mutex poisoned");
        build_aggregate(records.iter().filter(|r| r.timestamp.year() == year && r.timestamp.month() == month))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
