//! Append-only change journal.
//!
//! One JSON line per reconcile outcome. With the hash chain enabled each
//! entry carries `hash_prev` (the previous entry's `hash_self`) and
//! `hash_self` (SHA-256 of the entry's canonical JSON without `hash_self`),
//! so any edit, deletion or reordering is detectable by [`verify_journal`].
//!
//! Entry ids are UUID v5 derived from `(seq, hash_prev, record)`; no RNG.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sepol_reconcile::{Outcome, OutcomeRecord, ReconcileContext};
use sha2::{Digest, Sha256};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub entry_id: Uuid,
    pub seq: u64,
    pub run_id: Uuid,
    pub ts_utc: DateTime<Utc>,
    pub kind: String,
    pub simulate: bool,
    pub record: OutcomeRecord,
    pub hash_prev: Option<String>,
    pub hash_self: Option<String>,
}

pub struct ChangeJournal {
    path: PathBuf,
    hash_chain: bool,
    last_hash: Option<String>,
    /// Number of entries already in the file; the next entry's `seq`.
    seq: u64,
}

impl ChangeJournal {
    /// Open (or create) a journal. An existing file is scanned so appends
    /// continue its sequence and hash chain.
    ///
    /// `hash_chain` only decides whether a chain is started. A file whose
    /// last entry is chained keeps being chained even when it is `false`.
    pub fn open(path: impl AsRef<Path>, hash_chain: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("create_dir_all {:?}", parent))?;
        }

        let mut journal = Self {
            path,
            hash_chain,
            last_hash: None,
            seq: 0,
        };

        if journal.path.exists() {
            let content = fs::read_to_string(&journal.path)
                .with_context(|| format!("read journal {:?}", journal.path))?;
            if let Some(last) = parse_entries(&content)?.pop() {
                journal.seq = last.seq + 1;
                journal.last_hash = last.hash_self;
            }
        }

        Ok(journal)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }

    pub fn last_hash(&self) -> Option<&str> {
        self.last_hash.as_deref()
    }

    /// Append the record of one outcome under the context's run id.
    pub fn record_outcome(&mut self, ctx: &ReconcileContext, outcome: &Outcome) -> Result<JournalEntry> {
        self.append(
            ctx.run_id(),
            outcome.kind.as_str(),
            ctx.simulate_only(),
            outcome.record(),
        )
    }

    pub fn append(
        &mut self,
        run_id: Uuid,
        kind: &str,
        simulate: bool,
        record: OutcomeRecord,
    ) -> Result<JournalEntry> {
        // once the file carries a chain it stays chained
        let chained = self.hash_chain || self.last_hash.is_some();
        let hash_prev = if chained { self.last_hash.clone() } else { None };
        let entry_id = derive_entry_id(self.seq, hash_prev.as_deref(), &record)?;

        let mut entry = JournalEntry {
            entry_id,
            seq: self.seq,
            run_id,
            ts_utc: Utc::now(),
            kind: kind.to_string(),
            simulate,
            record,
            hash_prev,
            hash_self: None,
        };

        if chained {
            let self_hash = entry_hash(&entry)?;
            entry.hash_self = Some(self_hash.clone());
            self.last_hash = Some(self_hash);
        }

        let line = serde_json::to_string(&entry).context("serialize journal entry failed")?;
        let mut f = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("open journal {:?}", self.path))?;
        writeln!(f, "{line}").context("write journal line failed")?;

        self.seq += 1;
        Ok(entry)
    }
}

fn parse_entries(content: &str) -> Result<Vec<JournalEntry>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, l)| {
            serde_json::from_str(l.trim())
                .with_context(|| format!("parse journal entry at line {}", i + 1))
        })
        .collect()
}

/// Canonical JSON: serde_json's default map keeps keys sorted.
fn canonical<T: Serialize>(v: &T) -> Result<String> {
    let value = serde_json::to_value(v).context("serialize for hashing failed")?;
    serde_json::to_string(&value).context("json stringify failed")
}

fn derive_entry_id(seq: u64, hash_prev: Option<&str>, record: &OutcomeRecord) -> Result<Uuid> {
    let material = format!(
        "sepol-journal:{seq}:{}:{}",
        hash_prev.unwrap_or("genesis"),
        canonical(record)?
    );
    Ok(Uuid::new_v5(&Uuid::NAMESPACE_OID, material.as_bytes()))
}

/// SHA-256 over the canonical entry with `hash_self` cleared.
pub fn entry_hash(entry: &JournalEntry) -> Result<String> {
    let mut clone = entry.clone();
    clone.hash_self = None;
    let mut hasher = Sha256::new();
    hasher.update(canonical(&clone)?.as_bytes());
    Ok(hex::encode(hasher.finalize()))
}

/// Outcome of a journal check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalCheck {
    Intact { entries: usize },
    Broken { line: usize, reason: String },
}

pub fn verify_journal(path: impl AsRef<Path>) -> Result<JournalCheck> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("read journal {:?}", path.as_ref()))?;
    verify_journal_str(&content)
}

/// Check sequence continuity and, where present, the hash chain.
///
/// A line that is not a journal entry at all is reported as `Broken` rather
/// than an error, so a truncated write shows up with its line number.
pub fn verify_journal_str(content: &str) -> Result<JournalCheck> {
    let mut prev_hash: Option<String> = None;
    let mut expected_seq = 0u64;
    let mut entries = 0usize;

    for (i, line) in content.lines().enumerate() {
        let line_no = i + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let entry: JournalEntry = match serde_json::from_str(trimmed) {
            Ok(e) => e,
            Err(err) => {
                return Ok(JournalCheck::Broken {
                    line: line_no,
                    reason: format!("unparseable entry: {err}"),
                })
            }
        };

        if entry.seq != expected_seq {
            return Ok(JournalCheck::Broken {
                line: line_no,
                reason: format!("seq gap: expected {expected_seq}, got {}", entry.seq),
            });
        }

        if entry.hash_prev != prev_hash {
            return Ok(JournalCheck::Broken {
                line: line_no,
                reason: format!(
                    "hash_prev mismatch: expected {:?}, got {:?}",
                    prev_hash, entry.hash_prev
                ),
            });
        }

        if let Some(claimed) = entry.hash_self.as_deref() {
            let recomputed = entry_hash(&entry)?;
            if claimed != recomputed {
                return Ok(JournalCheck::Broken {
                    line: line_no,
                    reason: format!("hash_self mismatch: claimed {claimed}, recomputed {recomputed}"),
                });
            }
        }

        prev_hash = entry.hash_self;
        expected_seq += 1;
        entries += 1;
    }

    Ok(JournalCheck::Intact { entries })
}
