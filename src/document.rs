//! Source document model and input loading.
//!
//! Pages arrive from the capture/OCR stage as a directory of per-page `.txt`
//! files, a single transcript with form-feed page separators (what Tesseract
//! writes), or a JSON list of `{index, text}` objects.

use crate::{config::Config, util::sha256_hex};
use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::path::Path;
use tracing::{debug, warn};

const PAGE_SEPARATOR: char = '\u{c}';

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based position in the source book.
    pub index: u32,
    pub text: String,
    #[serde(default)]
    pub header_candidates: Vec<String>,
    #[serde(default)]
    pub footer_candidates: Vec<String>,
}

impl Page {
    pub fn new(index: u32, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
            header_candidates: Vec::new(),
            footer_candidates: Vec::new(),
        }
    }

    /// Lines with `\r\n` folded to `\n`.
    pub fn lines(&self) -> Vec<String> {
        self.text
            .replace("\r\n", "\n")
            .split('\n')
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub source_id: String,
    pages: Vec<Page>,
}

impl Document {
    pub fn new(source_id: impl Into<String>, pages: Vec<Page>) -> Result<Self> {
        let mut prev = 0u32;
        for page in &pages {
            if page.index == 0 {
                bail!("page indices are 1-based; got 0");
            }
            if page.index <= prev {
                bail!(
                    "page indices must strictly increase: {} follows {}",
                    page.index,
                    prev
                );
            }
            prev = page.index;
        }
        Ok(Self {
            source_id: source_id.into(),
            pages,
        })
    }

    /// Pages numbered 1..=n in the given order.
    pub fn from_texts<I, S>(source_id: impl Into<String>, texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let pages = texts
            .into_iter()
            .enumerate()
            .map(|(i, t)| Page::new(i as u32 + 1, t))
            .collect();
        Self {
            source_id: source_id.into(),
            pages,
        }
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn content_hash(&self) -> String {
        let mut buf = String::new();
        for page in &self.pages {
            buf.push_str(&page.index.to_string());
            buf.push('\u{0}');
            buf.push_str(&page.text);
            buf.push(PAGE_SEPARATOR);
        }
        sha256_hex(buf.as_bytes())
    }

    pub fn load(cfg: &Config, path: &Path) -> Result<Self> {
        let source_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string();

        let doc = if path.is_dir() {
            Self::from_page_dir(source_id, path, cfg.limits.max_input_bytes)?
        } else {
            let meta = std::fs::metadata(path).with_context(|| "stat input")?;
            if meta.len() > cfg.limits.max_input_bytes {
                bail!("input exceeds max_input_bytes: {}", meta.len());
            }
            let is_json = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("json"));
            if is_json {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("reading {}", path.display()))?;
                let pages: Vec<Page> = serde_json::from_str(&raw)
                    .with_context(|| format!("parsing page list: {}", path.display()))?;
                Self::new(source_id, pages)?
            } else {
                let raw = read_text_lossy(path)?;
                Self::from_transcript(source_id, &raw)
            }
        };

        if doc.pages.len() > cfg.limits.max_input_pages as usize {
            bail!("input exceeds max_input_pages: {}", doc.pages.len());
        }
        debug!(pages = doc.pages.len(), source = %doc.source_id, "document loaded");
        Ok(doc)
    }

    /// Splits a transcript on form feeds. A trailing separator does not add a page.
    pub fn from_transcript(source_id: impl Into<String>, raw: &str) -> Self {
        let mut parts: Vec<&str> = raw.split(PAGE_SEPARATOR).collect();
        if parts.len() > 1 && parts.last().is_some_and(|p| p.trim().is_empty()) {
            parts.pop();
        }
        if parts.len() == 1 && parts[0].trim().is_empty() {
            parts.clear();
        }
        Self::from_texts(source_id, parts)
    }

    fn from_page_dir(source_id: String, dir: &Path, max_bytes: u64) -> Result<Self> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(dir).with_context(|| format!("read_dir {}", dir.display()))? {
            let path = entry?.path();
            let is_txt = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case("txt"));
            if path.is_file() && is_txt {
                files.push(path);
            }
        }
        files.sort_by(|a, b| natural_cmp(&a.to_string_lossy(), &b.to_string_lossy()));

        let mut total = 0u64;
        let mut texts = Vec::with_capacity(files.len());
        for f in &files {
            total += std::fs::metadata(f)?.len();
            if total > max_bytes {
                return Err(anyhow!("input exceeds max_input_bytes: {}", total));
            }
            texts.push(read_text_lossy(f)?);
        }
        Ok(Self::from_texts(source_id, texts))
    }
}

/// Name order with digit runs compared by value, so `page2` sorts before
/// `page10`.
fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (mut a, mut b) = (a, b);
    loop {
        match (a.chars().next(), b.chars().next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let (na, ra) = split_digits(a);
                let (nb, rb) = split_digits(b);
                let (ta, tb) = (na.trim_start_matches('0'), nb.trim_start_matches('0'));
                let ord = ta
                    .len()
                    .cmp(&tb.len())
                    .then_with(|| ta.cmp(tb))
                    .then_with(|| na.len().cmp(&nb.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
                (a, b) = (ra, rb);
            }
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                (a, b) = (&a[x.len_utf8()..], &b[y.len_utf8()..]);
            }
        }
    }
}

fn split_digits(s: &str) -> (&str, &str) {
    let end = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    s.split_at(end)
}

fn read_text_lossy(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(err) => {
            warn!("{} is not valid UTF-8; replacing invalid bytes", path.display());
            Ok(String::from_utf8_lossy(err.as_bytes()).into_owned())
        }
    }
}
