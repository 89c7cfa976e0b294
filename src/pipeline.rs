use crate::{
    cancel::CancelToken,
    checkpoint::{CheckpointStore, CorrectionResult},
    chunk_plan::{Chunk, ChunkPlan, break_long_lines},
    config::Config,
    correction::CorrectionClient,
    dedup::{DedupStats, collapse_repeats},
    document::Document,
    error::ReconstructError,
    policy::{RetryDecision, RetryPolicy},
    postprocess::{self, ChunkText},
    report::{ChunkReport, ChunkStatus, JobReport, StatusCounts, run_status},
    service::CorrectionService,
    structure::{CleanPage, RemovedLine, StructureMarker, StructureTagger},
};
use anyhow::{Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Output of the synchronous pre-pass: cleaned pages, their markers and the
/// chunk partition over them.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub pages: Vec<CleanPage>,
    pub markers: Vec<StructureMarker>,
    pub removed: Vec<RemovedLine>,
    pub plan: ChunkPlan,
    pub dedup: DedupStats,
}

/// Line breaking, per-page dedup, document-wide tagging, then chunking.
pub fn prepare(cfg: &Config, doc: &Document) -> Result<Prepared> {
    let tagger = StructureTagger::new(cfg).with_context(|| "building structure tagger")?;

    let mut dedup = DedupStats::default();
    let mut pages = Vec::with_capacity(doc.pages().len());
    for page in doc.pages() {
        let lines = break_long_lines(page.lines(), cfg.chunking.chunk_budget);
        let (lines, stats) = collapse_repeats(&lines, cfg.dedup.dedup_threshold);
        if stats.runs_collapsed > 0 {
            debug!(
                page = page.index,
                runs = stats.runs_collapsed,
                removed = stats.lines_removed,
                "collapsed repeated lines"
            );
        }
        dedup.absorb(stats);

        let mut clean = CleanPage::new(page.index, lines);
        clean.paratext_hints = page
            .header_candidates
            .iter()
            .chain(&page.footer_candidates)
            .cloned()
            .collect();
        pages.push(clean);
    }

    let tagged = tagger.tag(pages);
    let plan = ChunkPlan::build(
        &tagged.pages,
        cfg.chunking.chunk_budget,
        cfg.chunking.overlap_size,
    );

    info!(
        "prepared pages={} chunks={} markers={} paratext_removed={} dedup_removed={}",
        tagged.pages.len(),
        plan.chunks.len(),
        tagged.markers.len(),
        tagged.removed.len(),
        dedup.lines_removed
    );

    Ok(Prepared {
        pages: tagged.pages,
        markers: tagged.markers,
        removed: tagged.removed,
        plan,
        dedup,
    })
}

/// What happened to one chunk during a run.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkOutcome {
    pub chunk_index: usize,
    pub status: ChunkStatus,
    /// Corrected text, or the chunk's cleaned primary text when not corrected.
    pub text: String,
    /// `text` is the cleaned primary text unchanged.
    pub verbatim: bool,
    pub attempts: u32,
    /// Service calls made for this chunk in this run.
    pub calls: u32,
    pub from_checkpoint: bool,
    pub warnings: Vec<String>,
    pub error: Option<ReconstructError>,
}

impl ChunkOutcome {
    fn uncorrected(chunk: &Chunk, status: ChunkStatus) -> Self {
        Self {
            chunk_index: chunk.index,
            status,
            text: chunk.primary.clone(),
            verbatim: true,
            attempts: 0,
            calls: 0,
            from_checkpoint: false,
            warnings: Vec::new(),
            error: None,
        }
    }
}

pub struct JobOutput {
    pub markdown: String,
    pub text: String,
    pub markers: Vec<StructureMarker>,
    pub removed: Vec<RemovedLine>,
    pub plan: ChunkPlan,
    pub outcomes: Vec<ChunkOutcome>,
    pub report: JobReport,
}

pub struct Pipeline<S: CorrectionService> {
    cfg: Config,
    client: CorrectionClient<S>,
    retry: RetryPolicy,
}

impl<S: CorrectionService> Pipeline<S> {
    pub fn new(cfg: &Config, service: S) -> Self {
        Self::with_client(cfg, CorrectionClient::new(cfg, service))
    }

    pub fn with_client(cfg: &Config, client: CorrectionClient<S>) -> Self {
        Self {
            cfg: cfg.clone(),
            client,
            retry: RetryPolicy::from_config(cfg),
        }
    }

    pub fn client(&self) -> &CorrectionClient<S> {
        &self.client
    }

    /// Reconstructs `doc`: every chunk is resolved (from the checkpoint store,
    /// the correction service, or its own cleaned text) and the results are
    /// reassembled in page order.
    pub fn run_job(
        &self,
        doc: &Document,
        store: &dyn CheckpointStore,
        cancel: &CancelToken,
    ) -> Result<JobOutput> {
        let started = Instant::now();
        let prepared = prepare(&self.cfg, doc)?;
        let chunks = &prepared.plan.chunks;

        let workers = self.cfg.correction.concurrency.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("ocr-mend-worker-{i}"))
            .build()
            .with_context(|| "building worker pool")?;

        info!("correcting {} chunks with {} workers", chunks.len(), workers);
        let outcomes: Vec<ChunkOutcome> = pool.install(|| {
            chunks
                .par_iter()
                .map(|chunk| self.resolve_chunk(chunk, store, cancel))
                .collect()
        });

        let texts: Vec<ChunkText> = outcomes
            .iter()
            .map(|o| ChunkText {
                text: o.text.clone(),
                verbatim: o.verbatim,
            })
            .collect();
        let (markdown, marker_stats) =
            postprocess::assemble(&self.cfg, chunks, &texts, &prepared.markers);
        let text = postprocess::markdown_to_text(&markdown);

        let mut counts = StatusCounts::default();
        for o in &outcomes {
            match o.status {
                ChunkStatus::Corrected => counts.corrected += 1,
                ChunkStatus::Degraded => counts.degraded += 1,
                ChunkStatus::Failed => counts.failed += 1,
                ChunkStatus::Skipped => counts.skipped += 1,
            }
            if o.from_checkpoint {
                counts.from_checkpoint += 1;
            }
            counts.service_calls += o.calls;
        }

        let chunk_reports = chunks
            .iter()
            .zip(&outcomes)
            .map(|(c, o)| ChunkReport {
                chunk_index: c.index,
                start_page: c.start_page,
                end_page: c.end_page,
                hash: c.hash.clone(),
                status: o.status,
                attempts: o.attempts,
                from_checkpoint: o.from_checkpoint,
                split_page: c.split_page,
                warnings: o.warnings.clone(),
                error: o.error.clone(),
            })
            .collect();

        let mut capability_warnings = Vec::new();
        if !store.is_durable() {
            capability_warnings
                .push("checkpoint store is not durable; this run cannot be resumed".to_string());
        }

        let status = run_status(&counts);
        info!(
            "job finished status={:?} corrected={} degraded={} failed={} skipped={} from_checkpoint={} calls={} elapsed_ms={}",
            status,
            counts.corrected,
            counts.degraded,
            counts.failed,
            counts.skipped,
            counts.from_checkpoint,
            counts.service_calls,
            started.elapsed().as_millis()
        );

        let report = JobReport {
            source_id: doc.source_id.clone(),
            page_count: prepared.plan.page_count,
            chunk_count: chunks.len(),
            status,
            counts,
            chunk_reports,
            dedup: prepared.dedup,
            paratext_removed: prepared.removed.len(),
            markers: marker_stats,
            capability_warnings,
        };

        Ok(JobOutput {
            markdown,
            text,
            markers: prepared.markers,
            removed: prepared.removed,
            plan: prepared.plan,
            outcomes,
            report,
        })
    }

    fn resolve_chunk(
        &self,
        chunk: &Chunk,
        store: &dyn CheckpointStore,
        cancel: &CancelToken,
    ) -> ChunkOutcome {
        if let Some(err) = &chunk.split_error {
            warn!("chunk {} emitted uncorrected: {err}", chunk.index);
            let mut out = ChunkOutcome::uncorrected(chunk, ChunkStatus::Failed);
            out.error = Some(err.clone());
            return out;
        }

        if chunk.primary.trim().is_empty() {
            return ChunkOutcome::uncorrected(chunk, ChunkStatus::Corrected);
        }

        let mut warnings = Vec::new();
        match store.get(&chunk.hash) {
            Ok(Some(hit)) if hit.is_corrected() => {
                debug!("chunk {} answered from checkpoint", chunk.index);
                return ChunkOutcome {
                    chunk_index: chunk.index,
                    status: ChunkStatus::Corrected,
                    text: hit.text,
                    verbatim: false,
                    attempts: hit.attempts,
                    calls: 0,
                    from_checkpoint: true,
                    warnings,
                    error: None,
                };
            }
            Ok(_) => {}
            Err(e) => {
                warn!("chunk {}: checkpoint read failed: {e}", chunk.index);
                warnings.push(format!("checkpoint read failed: {e}"));
            }
        }

        if cancel.is_cancelled() {
            let mut out = ChunkOutcome::uncorrected(chunk, ChunkStatus::Skipped);
            out.warnings = warnings;
            return out;
        }

        info!(
            "chunk {} pages {}-{} chars={}",
            chunk.index,
            chunk.start_page,
            chunk.end_page,
            chunk.primary_chars()
        );
        let (result, attempts) = self.correct_with_retry(chunk, cancel, &mut warnings);

        let record = match &result {
            Ok(text) => CorrectionResult::corrected(&chunk.hash, text.clone(), attempts),
            Err(e) => CorrectionResult::failed(&chunk.hash, e.clone(), attempts),
        };
        if let Err(e) = store.put(&record) {
            warn!("chunk {}: checkpoint write failed: {e}", chunk.index);
            warnings.push(format!("checkpoint write failed: {e}"));
        }

        match result {
            Ok(text) => ChunkOutcome {
                chunk_index: chunk.index,
                status: ChunkStatus::Corrected,
                text,
                verbatim: false,
                attempts,
                calls: attempts,
                from_checkpoint: false,
                warnings,
                error: None,
            },
            Err(err) => {
                warn!(
                    "chunk {} degraded after {} attempts: {err}",
                    chunk.index, attempts
                );
                let mut out = ChunkOutcome::uncorrected(chunk, ChunkStatus::Degraded);
                out.attempts = attempts;
                out.calls = attempts;
                out.warnings = warnings;
                out.error = Some(err);
                out
            }
        }
    }

    fn correct_with_retry(
        &self,
        chunk: &Chunk,
        cancel: &CancelToken,
        warnings: &mut Vec<String>,
    ) -> (Result<String, ReconstructError>, u32) {
        let mut attempts = 0u32;
        let mut invalid = 0u32;
        loop {
            attempts += 1;
            let err = match self.client.correct(&chunk.primary, &chunk.overlap) {
                Ok(text) => return (Ok(text), attempts),
                Err(err) => err,
            };
            if err.is_invalid_response() {
                invalid += 1;
            }

            match self.retry.decide(attempts, invalid, &err) {
                RetryDecision::GiveUp => return (Err(err), attempts),
                RetryDecision::Retry(delay) => {
                    debug!(
                        "chunk {} attempt {} failed ({err}); retrying in {:?}",
                        chunk.index, attempts, delay
                    );
                    if !cancel.sleep(delay) {
                        warnings.push("cancelled while waiting to retry".to_string());
                        return (Err(err), attempts);
                    }
                }
            }
        }
    }
}
