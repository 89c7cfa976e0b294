#![allow(dead_code)]

use ocr_mend::{
    config::Config, document::Document, error::ReconstructError, service::CorrectionService,
};
use std::sync::atomic::{AtomicU32, Ordering};

/// In-process correction service driven by a closure, counting its calls.
pub struct FnService<F> {
    f: F,
    calls: AtomicU32,
}

impl<F> FnService<F>
where
    F: Fn(&str, &str) -> Result<String, ReconstructError> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self {
            f,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<F> CorrectionService for FnService<F>
where
    F: Fn(&str, &str) -> Result<String, ReconstructError> + Send + Sync,
{
    fn submit(&self, text: &str, overlap_context: &str) -> Result<String, ReconstructError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.f)(text, overlap_context)
    }
}

pub const WORDS: [&str; 6] = ["alpha", "bravo", "charlie", "delta", "echo", "foxtrot"];

const LINES: [(&str, &str); 6] = [
    (
        "The alpha harbor woke under a pale grey sky.",
        "Gulls circled the masts while nets dried.",
    ),
    (
        "By noon the bravo crew had loaded barrels.",
        "Rope creaked and someone sang off key.",
    ),
    (
        "Old charlie kept the ledger in a tin box.",
        "Every coin was counted twice before supper.",
    ),
    (
        "Storm clouds gathered over the delta shoals.",
        "Lanterns swung from hooks in the galley.",
    ),
    (
        "An echo rolled back from the cliffs at dusk.",
        "Nobody slept much on the second night.",
    ),
    (
        "The foxtrot was painted in red on the stern.",
        "Its letters had faded to a dull rust.",
    ),
];

fn lines_for(word: &str) -> (&'static str, &'static str) {
    let i = WORDS.iter().position(|w| *w == word).expect("known page word");
    LINES[i]
}

/// Two body lines for `word`'s page; one page fits a chunk, two do not.
pub fn page_text(word: &str) -> String {
    format!("{}\n{}", first_line(word), second_line(word))
}

pub fn first_line(word: &str) -> String {
    lines_for(word).0.to_string()
}

pub fn second_line(word: &str) -> String {
    lines_for(word).1.to_string()
}

pub fn document(n: usize) -> Document {
    Document::from_texts("test-book", WORDS[..n].iter().map(|w| page_text(w)))
}

/// One page per chunk, no pacing and no backoff delays.
pub fn fast_config() -> Config {
    let mut cfg = Config::default();
    cfg.chunking.chunk_budget = 120;
    cfg.chunking.overlap_size = 2;
    cfg.correction.concurrency = 4;
    cfg.correction.max_retries = 3;
    cfg.correction.initial_retry_delay_ms = 0;
    cfg.correction.max_retry_delay_ms = 0;
    cfg.service.requests_per_minute = 0;
    cfg.service.min_interval_ms = 0;
    cfg
}
