use crate::{dedup::DedupStats, error::ReconstructError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Corrected,
    /// Correction failed after retries; cleaned text emitted instead.
    Degraded,
    /// Never submitted (unsplittable page); cleaned text emitted instead.
    Failed,
    /// Not dispatched because the run was cancelled.
    Skipped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithDegradation,
    Cancelled,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub corrected: usize,
    pub degraded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub from_checkpoint: usize,
    pub service_calls: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerStats {
    pub total: usize,
    /// Headings the correction moved or dropped, re-inserted by position.
    pub relocated: usize,
    /// Paragraph breaks that could not be found in the corrected text.
    pub unplaced: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    pub source_id: String,
    pub page_count: u32,
    pub chunk_count: usize,
    pub status: RunStatus,
    pub counts: StatusCounts,
    pub chunk_reports: Vec<ChunkReport>,
    pub dedup: DedupStats,
    pub paratext_removed: usize,
    pub markers: MarkerStats,
    /// Lost capabilities (e.g. resume) that did not fail the run.
    pub capability_warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkReport {
    pub chunk_index: usize,
    pub start_page: u32,
    pub end_page: u32,
    pub hash: String,
    pub status: ChunkStatus,
    pub attempts: u32,
    pub from_checkpoint: bool,
    pub split_page: bool,
    pub warnings: Vec<String>,
    pub error: Option<ReconstructError>,
}

impl JobReport {
    /// Chunks a human should look at again: everything not cleanly corrected.
    pub fn needs_attention(&self) -> impl Iterator<Item = &ChunkReport> {
        self.chunk_reports
            .iter()
            .filter(|c| c.status != ChunkStatus::Corrected)
    }
}

pub fn run_status(counts: &StatusCounts) -> RunStatus {
    if counts.skipped > 0 {
        RunStatus::Cancelled
    } else if counts.degraded > 0 || counts.failed > 0 {
        RunStatus::CompletedWithDegradation
    } else {
        RunStatus::Completed
    }
}
