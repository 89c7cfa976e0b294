use crate::{
    cancel::CancelToken,
    checkpoint::open_or_fallback,
    config::Config,
    document::Document,
    pipeline::{self, Pipeline},
    service::gemini::GeminiService,
    util::{ensure_dir, now_rfc3339, sha256_hex},
};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ocr-mend")]
#[command(about = "Structured text reconstruction for OCR transcripts (dedup + structure + LLM correction)")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./ocr-mend.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Check that the correction service is reachable with the configured key.
    Doctor {},
    /// Run the pre-pass only and print the chunk partition.
    Plan {
        #[arg(long)]
        input: PathBuf,
    },
    Run {
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let cfg_path = resolve_config_path(args.config.as_deref());
    let cfg = Config::load(&cfg_path)?;

    match &args.cmd {
        Command::Doctor {} => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            doctor(&cfg)
        }
        Command::Plan { input } => {
            let log_path = resolve_log_path(&cfg, None);
            let _guard = init_logging(&args, &cfg, log_path.as_deref())?;
            plan(&cfg, input)
        }
        Command::Run { input, out_dir } => run(&args, &cfg, input, out_dir.as_deref()),
    }
}

fn resolve_config_path(user: Option<&Path>) -> PathBuf {
    if let Some(p) = user {
        return p.to_path_buf();
    }
    let default = PathBuf::from("ocr-mend.toml");
    if default.exists() {
        default
    } else {
        PathBuf::from("ocr-mend.example.toml")
    }
}

fn init_logging(args: &Args, cfg: &Config, file_path: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let (file_layer, guard) = if let Some(path) = file_path {
        let parent = path.parent().unwrap_or_else(|| Path::new("."));
        ensure_dir(parent)?;
        let file = std::fs::File::create(path)
            .with_context(|| format!("create log file: {}", path.display()))?;
        let (non_blocking, guard) = tracing_appender::non_blocking(file);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(guard)
}

fn doctor(cfg: &Config) -> Result<()> {
    let service = GeminiService::new(cfg)?;
    let diag = service.doctor();
    println!("{}", serde_json::to_string_pretty(&diag)?);
    if !diag.ok {
        return Err(anyhow!("correction service is not reachable"));
    }
    Ok(())
}

fn plan(cfg: &Config, input: &Path) -> Result<()> {
    validate_input(cfg, input)?;
    let doc = Document::load(cfg, input)?;
    let prepared = pipeline::prepare(cfg, &doc)?;
    let chunks: Vec<_> = prepared
        .plan
        .chunks
        .iter()
        .map(|c| {
            serde_json::json!({
                "index": c.index,
                "start_page": c.start_page,
                "end_page": c.end_page,
                "hash": c.hash,
                "primary_chars": c.primary_chars(),
                "overlap_lines": c.overlap.lines().count(),
                "split_page": c.split_page,
                "split_error": c.split_error,
            })
        })
        .collect();
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "input": input,
            "page_count": prepared.plan.page_count,
            "chunk_budget": prepared.plan.chunk_budget,
            "overlap_size": prepared.plan.overlap_size,
            "markers": prepared.markers.len(),
            "paratext_removed": prepared.removed.len(),
            "dedup": prepared.dedup,
            "chunks": chunks,
        }))?
    );
    Ok(())
}

fn run(args: &Args, cfg: &Config, input: &Path, out_override: Option<&Path>) -> Result<()> {
    validate_input(cfg, input)?;
    let doc = Document::load(cfg, input)?;

    let cfg_norm = cfg.normalized_for_hash();
    let cfg_hash = sha256_hex(cfg_norm.as_bytes());
    let job_id = sha256_hex(format!("{}:{}", cfg_hash, doc.content_hash()).as_bytes());

    let out_root = out_override
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(&cfg.paths.out_dir));
    let job_dir = out_root.join(&job_id);

    if job_dir.exists() && !cfg.global.resume {
        return Err(anyhow!(
            "job_dir already exists and resume=false: {}",
            job_dir.display()
        ));
    }

    ensure_dir(&job_dir)?;
    ensure_dir(&job_dir.join("final"))?;
    ensure_dir(&job_dir.join("logs"))?;
    ensure_dir(&job_dir.join("chunks"))?;

    let log_path = resolve_log_path(cfg, Some(&job_dir));
    let _guard = init_logging(args, cfg, log_path.as_deref())?;

    info!("job_id={job_id} out={} pages={}", job_dir.display(), doc.pages().len());

    if cfg.debug.dump_effective_config {
        let raw = toml::to_string(cfg).unwrap_or_default();
        std::fs::write(job_dir.join("effective-config.toml"), raw)?;
    }

    let checkpoint_dir = if cfg.paths.checkpoint_dir.is_empty() {
        job_dir.join("checkpoints")
    } else {
        PathBuf::from(&cfg.paths.checkpoint_dir)
    };
    let (store, store_err) = open_or_fallback(&checkpoint_dir);

    let cancel = match cfg.limits.job_timeout_seconds {
        0 => CancelToken::new(),
        secs => CancelToken::with_timeout(Duration::from_secs(secs)),
    };

    let service = GeminiService::new(cfg)?;
    let pipeline = Pipeline::new(cfg, service);

    let started = now_rfc3339();
    let mut result = pipeline.run_job(&doc, store.as_ref(), &cancel)?;
    if let Some(err) = store_err {
        result.report.capability_warnings.push(err.to_string());
    }

    let final_dir = job_dir.join("final");
    if cfg.output.write_markdown {
        std::fs::write(final_dir.join(&cfg.output.markdown_filename), &result.markdown)?;
    }

    if cfg.output.write_text {
        std::fs::write(final_dir.join(&cfg.output.text_filename), &result.text)?;
    }

    if cfg.output.write_report_json {
        std::fs::write(
            final_dir.join(&cfg.output.report_filename),
            serde_json::to_string_pretty(&result.report)?,
        )?;
    }

    if cfg.output.write_markers_json {
        std::fs::write(
            final_dir.join(&cfg.output.markers_filename),
            serde_json::to_string_pretty(&result.markers)?,
        )?;
    }

    if cfg.output.write_chunk_json {
        let chunks_dir = job_dir.join("chunks");
        for (chunk, outcome) in result.plan.chunks.iter().zip(&result.outcomes) {
            let path = chunks_dir.join(format!("chunk_{:05}.json", chunk.index));
            let body = serde_json::json!({
                "chunk": chunk,
                "outcome": outcome,
            });
            std::fs::write(&path, serde_json::to_string_pretty(&body)?)?;
        }
    }

    if cfg.output.write_index_json {
        let index = serde_json::json!({
            "job_id": job_id,
            "job_name": cfg.global.job_name,
            "source_id": doc.source_id,
            "started": started,
            "finished": now_rfc3339(),
            "status": result.report.status,
            "final_markdown": format!("final/{}", cfg.output.markdown_filename),
            "final_text": format!("final/{}", cfg.output.text_filename),
            "report": format!("final/{}", cfg.output.report_filename),
            "markers": format!("final/{}", cfg.output.markers_filename),
        });
        std::fs::write(job_dir.join("index.json"), serde_json::to_string_pretty(&index)?)?;
    }

    for c in result.report.needs_attention() {
        warn!(
            "chunk {} pages {}-{} status={:?}",
            c.chunk_index, c.start_page, c.end_page, c.status
        );
    }

    if cfg.global.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "job_id": job_id,
                "job_dir": job_dir,
                "status": result.report.status,
                "counts": result.report.counts,
            }))?
        );
    }

    Ok(())
}

fn validate_input(cfg: &Config, input: &Path) -> Result<()> {
    let input_str = input.display().to_string();

    if cfg.security.reject_url_inputs && looks_like_url(&input_str) {
        return Err(anyhow!("URL inputs are disabled: {input_str}"));
    }

    if !input.exists() {
        return Err(anyhow!("input does not exist: {}", input.display()));
    }

    Ok(())
}

fn looks_like_url(s: &str) -> bool {
    let s = s.to_ascii_lowercase();
    s.starts_with("http://") || s.starts_with("https://") || s.starts_with("file://")
}

fn resolve_log_path(cfg: &Config, job_dir: Option<&Path>) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    if let Some(job_dir) = job_dir {
        return Some(job_dir.join("logs").join("ocr-mend.log"));
    }

    Some(PathBuf::from(&cfg.paths.out_dir).join("ocr-mend.log"))
}
