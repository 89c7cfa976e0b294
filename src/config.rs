use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub global: Global,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub limits: Limits,
    #[serde(default)]
    pub chunking: Chunking,
    #[serde(default)]
    pub dedup: Dedup,
    #[serde(default)]
    pub structure: Structure,
    #[serde(default)]
    pub correction: Correction,
    #[serde(default)]
    pub service: Service,
    #[serde(default)]
    pub postprocess: Postprocess,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
    #[serde(default)]
    pub debug: Debug,
    #[serde(default)]
    pub security: Security,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }

    /// A stable string over the sections that change the reconstructed text.
    /// Worker counts, paths and logging are left out so tuning them keeps the job id.
    pub fn normalized_for_hash(&self) -> String {
        #[derive(Serialize)]
        struct Hashed<'a> {
            chunking: &'a Chunking,
            dedup: &'a Dedup,
            structure: &'a Structure,
            postprocess: &'a Postprocess,
            model: &'a str,
        }

        toml::to_string(&Hashed {
            chunking: &self.chunking,
            dedup: &self.dedup,
            structure: &self.structure,
            postprocess: &self.postprocess,
            model: &self.service.model,
        })
        .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Global {
    pub job_name: String,
    pub resume: bool,
    pub print_summary: bool,
}
impl Default for Global {
    fn default() -> Self {
        Self {
            job_name: "default".into(),
            resume: true,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Paths {
    pub out_dir: String,
    /// Shared checkpoint directory. Empty means `<job_dir>/checkpoints`.
    pub checkpoint_dir: String,
}
impl Default for Paths {
    fn default() -> Self {
        Self {
            out_dir: "out".into(),
            checkpoint_dir: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Limits {
    pub max_input_bytes: u64,
    pub max_input_pages: u32,
    pub job_timeout_seconds: u64,
}
impl Default for Limits {
    fn default() -> Self {
        Self {
            max_input_bytes: 512 * 1024 * 1024,
            max_input_pages: 20000,
            job_timeout_seconds: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunking {
    /// Maximum primary text per chunk, in chars.
    pub chunk_budget: usize,
    /// Lines of the previous chunk carried forward as read-only context.
    pub overlap_size: usize,
}
impl Default for Chunking {
    fn default() -> Self {
        Self {
            chunk_budget: 12_000,
            overlap_size: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dedup {
    /// Minimum run of consecutive near-identical lines that collapses to one.
    pub dedup_threshold: usize,
}
impl Default for Dedup {
    fn default() -> Self {
        Self { dedup_threshold: 3 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Structure {
    pub edge_lines: usize,
    pub edge_line_max_chars: usize,
    pub header_min_repeats: usize,
    pub header_window: usize,
    pub heading_max_chars: usize,
    pub detect_paragraph_breaks: bool,
    pub short_line_ratio: f32,
    pub chapter_patterns: Vec<String>,
    pub section_patterns: Vec<String>,
    pub page_number_patterns: Vec<String>,
}
impl Default for Structure {
    fn default() -> Self {
        Self {
            edge_lines: 2,
            edge_line_max_chars: 120,
            header_min_repeats: 3,
            header_window: 2,
            heading_max_chars: 80,
            detect_paragraph_breaks: true,
            short_line_ratio: 0.6,
            chapter_patterns: vec![
                "(?i)^(chapter|part|book)\\s+([0-9]+|[ivxlc]+|one|two|three|four|five|six|seven|eight|nine|ten|eleven|twelve)\\.?\\s*([:.\\-–—]\\s*\\S.*)?$".into(),
                "(?i)^(prologue|epilogue)\\.?\\s*([:.\\-–—]\\s*\\S.*)?$".into(),
                "^제\\s*[0-9]+\\s*(장|부)(\\s+\\S.*)?$".into(),
                "^第\\s*[0-9一二三四五六七八九十百]+\\s*[章部](\\s+\\S.*)?$".into(),
            ],
            section_patterns: vec![
                "^[0-9]+(\\.[0-9]+)+\\.?\\s+\\S".into(),
                "(?i)^(section|§)\\s*[0-9]+".into(),
                "^제\\s*[0-9]+\\s*절".into(),
            ],
            page_number_patterns: vec![
                "(?i)^[-–—]?\\s*(page|p\\.)?\\s*[0-9]{1,4}\\s*[-–—]?$".into(),
                "^[0-9]{1,4}\\s*/\\s*[0-9]{1,4}$".into(),
                "^(x{0,3}(ix|iv|v?i{0,3})|X{0,3}(IX|IV|V?I{0,3}))$".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RatioBounds {
    pub min: f32,
    pub max: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Correction {
    /// Total correction attempts per chunk.
    pub max_retries: u32,
    pub concurrency: usize,
    pub length_ratio_bounds: RatioBounds,
    /// Attempts allowed once the service has answered with an unusable response.
    pub invalid_response_attempts: u32,
    pub overlap_match_ratio: f32,
    pub initial_retry_delay_ms: u64,
    pub max_retry_delay_ms: u64,
    pub retry_multiplier: f64,
}
impl Default for Correction {
    fn default() -> Self {
        Self {
            max_retries: 5,
            concurrency: 4,
            length_ratio_bounds: RatioBounds { min: 0.5, max: 2.0 },
            invalid_response_attempts: 2,
            overlap_match_ratio: 0.85,
            initial_retry_delay_ms: 5_000,
            max_retry_delay_ms: 60_000,
            retry_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    pub provider: String,
    pub endpoint: String,
    pub model: String,
    pub api_key_env: String,
    pub connect_timeout_seconds: u64,
    pub request_timeout_seconds: u64,
    pub requests_per_minute: u32,
    pub min_interval_ms: u64,
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
}
impl Default for Service {
    fn default() -> Self {
        Self {
            provider: "gemini".into(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".into(),
            model: "gemini-2.5-flash".into(),
            api_key_env: "GOOGLE_API_KEY".into(),
            connect_timeout_seconds: 45,
            request_timeout_seconds: 600,
            requests_per_minute: 30,
            min_interval_ms: 2_000,
            temperature: 0.2,
            top_p: 0.9,
            top_k: 40,
            max_output_tokens: 65_535,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Postprocess {
    pub normalize_unicode: bool,
    pub normalize_newlines: bool,
    pub trim_trailing_whitespace: bool,
    #[serde(default)]
    pub control_chars_to_sanitize: Vec<u8>,
}
impl Default for Postprocess {
    fn default() -> Self {
        Self {
            normalize_unicode: false,
            normalize_newlines: true,
            trim_trailing_whitespace: true,
            control_chars_to_sanitize: (0u8..32).chain(std::iter::once(127)).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub write_markdown: bool,
    pub write_text: bool,
    pub write_report_json: bool,
    pub write_markers_json: bool,
    pub write_chunk_json: bool,
    pub markdown_filename: String,
    pub text_filename: String,
    pub report_filename: String,
    pub markers_filename: String,
    pub write_index_json: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            write_markdown: true,
            write_text: true,
            write_report_json: true,
            write_markers_json: true,
            write_chunk_json: true,
            markdown_filename: "transcript.md".into(),
            text_filename: "transcript.txt".into(),
            report_filename: "report.json".into(),
            markers_filename: "markers.json".into(),
            write_index_json: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Debug {
    pub dump_effective_config: bool,
}
impl Default for Debug {
    fn default() -> Self {
        Self {
            dump_effective_config: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Security {
    pub reject_url_inputs: bool,
}
impl Default for Security {
    fn default() -> Self {
        Self {
            reject_url_inputs: true,
        }
    }
}
