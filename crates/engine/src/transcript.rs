//! The shared session transcript: ordered, append-only, token-accounted,
//! with bounded windowing and range compression.
//!
//! The in-memory log is the working copy; every append is mirrored to
//! the store under the same turn index so crash-resume rebuilds an
//! identical sequence.

use std::sync::Arc;

use parking_lot::RwLock;

use axe_domain::config::TranscriptConfig;
use axe_domain::error::Result;
use axe_domain::operation::{EntryKind, TranscriptEntry};
use axe_domain::trace::TraceEvent;
use axe_providers::Summarizer;
use axe_store::Store;

pub struct Transcript {
    store: Arc<Store>,
    session_id: String,
    config: TranscriptConfig,
    entries: RwLock<Vec<TranscriptEntry>>,
}

impl Transcript {
    pub fn new(store: Arc<Store>, session_id: impl Into<String>, config: TranscriptConfig) -> Self {
        Self {
            store,
            session_id: session_id.into(),
            config,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Rebuild the in-memory log from the store (resume path).
    pub fn resume(
        store: Arc<Store>,
        session_id: impl Into<String>,
        config: TranscriptConfig,
    ) -> Result<Self> {
        let session_id = session_id.into();
        let entries = store.load_transcript(&session_id, None)?;
        Ok(Self {
            store,
            session_id,
            config,
            entries: RwLock::new(entries),
        })
    }

    /// Append one entry; the store assigns the turn index, which is
    /// mirrored into the in-memory copy.  Returns the index.
    pub fn append(&self, mut entry: TranscriptEntry) -> Result<u64> {
        let index = self.store.append_transcript(&self.session_id, &entry)?;
        entry.turn_index = index;
        self.entries.write().push(entry);
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn last_turn_index(&self) -> Option<u64> {
        self.entries.read().last().map(|e| e.turn_index)
    }

    pub fn entries(&self) -> Vec<TranscriptEntry> {
        self.entries.read().clone()
    }

    pub fn total_tokens(&self) -> u64 {
        self.entries.read().iter().map(|e| e.token_count).sum()
    }

    /// Bounded prompt view: pinned system entries from the head of the
    /// log, then the most recent suffix whose estimated tokens fit the
    /// budget.
    pub fn window(&self, token_budget: u64) -> Vec<TranscriptEntry> {
        let entries = self.entries.read();

        let pinned: Vec<&TranscriptEntry> = entries
            .iter()
            .take_while(|e| e.kind == EntryKind::SystemNote)
            .collect();
        let pinned_tokens: u64 = pinned.iter().map(|e| e.token_count).sum();
        let pinned_len = pinned.len();

        let mut budget = token_budget.saturating_sub(pinned_tokens);
        let mut suffix: Vec<&TranscriptEntry> = Vec::new();
        for entry in entries.iter().skip(pinned_len).rev() {
            if entry.token_count > budget {
                break;
            }
            budget -= entry.token_count;
            suffix.push(entry);
        }
        suffix.reverse();

        pinned
            .into_iter()
            .chain(suffix)
            .cloned()
            .collect()
    }

    /// Compress the oldest contiguous run of message / operation-result
    /// entries into one summary when the log exceeds the high-water
    /// mark.  Returns whether compression ran.
    pub async fn maybe_compress(&self, summarizer: &dyn Summarizer) -> Result<bool> {
        let high_water = self.config.compression_high_water_tokens;
        let total_before = self.total_tokens();
        if total_before <= high_water {
            return Ok(false);
        }

        // Shrink to half the high-water mark, but never into the live
        // prompt window.
        let target_removal = total_before - high_water / 2;

        let (range_start_pos, range) = {
            let entries = self.entries.read();
            let start_pos = entries
                .iter()
                .position(|e| {
                    matches!(e.kind, EntryKind::Message | EntryKind::OperationResult)
                })
                .unwrap_or(entries.len());

            let mut removed_tokens = 0u64;
            let mut range: Vec<TranscriptEntry> = Vec::new();
            for entry in entries.iter().skip(start_pos) {
                if !matches!(entry.kind, EntryKind::Message | EntryKind::OperationResult) {
                    break; // contiguity ends at the first other kind
                }
                if removed_tokens >= target_removal {
                    break;
                }
                removed_tokens += entry.token_count;
                range.push(entry.clone());
            }
            (start_pos, range)
        };

        // Always keep at least one recent entry out of the summary.
        if range.is_empty() || range.len() == self.len() {
            return Ok(false);
        }

        let start_turn = range.first().expect("non-empty").turn_index;
        let end_turn = range.last().expect("non-empty").turn_index;
        let body = summarizer
            .summarize(&range, self.config.effective_window_tokens() / 4)
            .await?;

        let mut summary = TranscriptEntry::new("system", EntryKind::CompressedSummary, body);
        summary.turn_index = start_turn;
        summary.logical_turn = range.last().expect("non-empty").logical_turn;
        summary.covered_range = Some((start_turn, end_turn));

        self.store
            .replace_transcript_range(&self.session_id, &summary)?;

        {
            let mut entries = self.entries.write();
            entries.splice(
                range_start_pos..range_start_pos + range.len(),
                std::iter::once(summary),
            );
        }

        TraceEvent::TranscriptCompacted {
            session_id: self.session_id.clone(),
            start_turn,
            end_turn,
            tokens_before: total_before,
            tokens_after: self.total_tokens(),
        }
        .emit();
        Ok(true)
    }
}
