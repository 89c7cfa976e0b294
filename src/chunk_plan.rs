use crate::{
    error::ReconstructError,
    structure::CleanPage,
    util::{char_len, ends_sentence, sha256_hex},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPlan {
    pub page_count: u32,
    pub chunk_budget: usize,
    pub overlap_size: usize,
    pub chunks: Vec<Chunk>,
}

/// A run of lines from one cleaned page; `start_line..end_line` indexes `CleanPage::lines`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSpan {
    pub page: u32,
    pub start_line: usize,
    pub end_line: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub index: usize,
    pub start_page: u32, // inclusive
    pub end_page: u32,   // inclusive
    pub spans: Vec<PageSpan>,
    pub primary: String,
    /// Read-only context: trailing lines of the previous chunk's primary text.
    pub overlap: String,
    pub hash: String,
    /// One part of a page that alone exceeded the budget.
    pub split_page: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split_error: Option<ReconstructError>,
}

impl Chunk {
    pub fn primary_line_count(&self) -> usize {
        self.spans.iter().map(|s| s.end_line - s.start_line).sum()
    }

    pub fn primary_chars(&self) -> usize {
        char_len(&self.primary)
    }
}

impl ChunkPlan {
    /// Packs pages greedily into chunks of at most `chunk_budget` chars of
    /// primary text. Pages are never shared between chunks; a page that is
    /// too large on its own is cut at line boundaries, preferring lines that
    /// end a sentence.
    pub fn build(pages: &[CleanPage], chunk_budget: usize, overlap_size: usize) -> ChunkPlan {
        let budget = chunk_budget.max(1);
        let mut groups: Vec<Group> = Vec::new();
        let mut cur: Vec<PageSpan> = Vec::new();
        let mut cur_chars = 0usize;
        let mut cur_lines = 0usize;

        for page in pages {
            let page_chars: usize = page.lines.iter().map(|l| char_len(l)).sum();
            let page_lines = page.lines.len();

            if joined_len(page_chars, page_lines) > budget {
                flush(&mut groups, &mut cur, &mut cur_chars, &mut cur_lines);
                match split_page(page, budget) {
                    Ok(parts) => {
                        let split = parts.len() > 1;
                        for span in parts {
                            groups.push(Group {
                                spans: vec![span],
                                split_page: split,
                                split_error: None,
                            });
                        }
                    }
                    Err(err) => {
                        warn!("{err}");
                        groups.push(Group {
                            spans: vec![PageSpan {
                                page: page.index,
                                start_line: 0,
                                end_line: page_lines,
                            }],
                            split_page: false,
                            split_error: Some(err),
                        });
                    }
                }
                continue;
            }

            if !cur.is_empty()
                && joined_len(cur_chars + page_chars, cur_lines + page_lines) > budget
            {
                flush(&mut groups, &mut cur, &mut cur_chars, &mut cur_lines);
            }
            cur.push(PageSpan {
                page: page.index,
                start_line: 0,
                end_line: page_lines,
            });
            cur_chars += page_chars;
            cur_lines += page_lines;
        }
        flush(&mut groups, &mut cur, &mut cur_chars, &mut cur_lines);

        let mut chunks: Vec<Chunk> = Vec::with_capacity(groups.len());
        for (index, g) in groups.into_iter().enumerate() {
            let primary = span_text(pages, &g.spans);
            let overlap = chunks
                .last()
                .map(|prev| tail_lines(&prev.primary, overlap_size))
                .unwrap_or_default();
            let hash = chunk_hash(&primary, &overlap);
            let start_page = g.spans.first().map(|s| s.page).unwrap_or(0);
            let end_page = g.spans.last().map(|s| s.page).unwrap_or(0);
            chunks.push(Chunk {
                index,
                start_page,
                end_page,
                spans: g.spans,
                primary,
                overlap,
                hash,
                split_page: g.split_page,
                split_error: g.split_error,
            });
        }

        ChunkPlan {
            page_count: pages.len() as u32,
            chunk_budget: budget,
            overlap_size,
            chunks,
        }
    }

    pub fn split_failures(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.iter().filter(|c| c.split_error.is_some())
    }
}

struct Group {
    spans: Vec<PageSpan>,
    split_page: bool,
    split_error: Option<ReconstructError>,
}

fn flush(groups: &mut Vec<Group>, cur: &mut Vec<PageSpan>, chars: &mut usize, lines: &mut usize) {
    if cur.is_empty() {
        return;
    }
    groups.push(Group {
        spans: std::mem::take(cur),
        split_page: false,
        split_error: None,
    });
    *chars = 0;
    *lines = 0;
}

/// Length of `lines` lines holding `chars` chars once joined with `\n`.
fn joined_len(chars: usize, lines: usize) -> usize {
    chars + lines.saturating_sub(1)
}

fn split_page(page: &CleanPage, budget: usize) -> Result<Vec<PageSpan>, ReconstructError> {
    let lines = &page.lines;
    let mut parts = Vec::new();
    let mut start = 0usize;

    while start < lines.len() {
        let mut chars = 0usize;
        let mut end = start;
        while end < lines.len() && joined_len(chars + char_len(&lines[end]), end - start + 1) <= budget {
            chars += char_len(&lines[end]);
            end += 1;
        }
        if end == start {
            return Err(ReconstructError::Split {
                page: page.index,
                line_chars: char_len(&lines[start]),
                budget,
            });
        }
        if end < lines.len() {
            if let Some(cut) = (start + 1..=end).rev().find(|&e| ends_sentence(&lines[e - 1])) {
                end = cut;
            }
        }
        parts.push(PageSpan {
            page: page.index,
            start_line: start,
            end_line: end,
        });
        start = end;
    }
    Ok(parts)
}

/// Primary text of a set of spans, lines joined with `\n` across page boundaries.
pub fn span_text(pages: &[CleanPage], spans: &[PageSpan]) -> String {
    let mut out: Vec<&str> = Vec::new();
    for span in spans {
        if let Ok(pos) = pages.binary_search_by_key(&span.page, |p| p.index) {
            let page = &pages[pos];
            out.extend(page.lines[span.start_line..span.end_line].iter().map(String::as_str));
        }
    }
    out.join("\n")
}

fn tail_lines(text: &str, n: usize) -> String {
    if n == 0 || text.is_empty() {
        return String::new();
    }
    let lines: Vec<&str> = text.split('\n').collect();
    lines[lines.len().saturating_sub(n)..].join("\n")
}

/// Processing key of a chunk. Identical context and primary text always
/// hash the same, which is what makes resumed runs skip finished work.
pub fn chunk_hash(primary: &str, overlap: &str) -> String {
    let mut buf = String::with_capacity(primary.len() + overlap.len() + 1);
    buf.push_str(overlap);
    buf.push('\u{0}');
    buf.push_str(primary);
    sha256_hex(buf.as_bytes())
}

/// Breaks lines longer than `budget` chars at the last sentence boundary that
/// fits, so that oversized pages can later be cut between lines. A line with
/// no usable boundary is left whole.
pub fn break_long_lines(lines: Vec<String>, budget: usize) -> Vec<String> {
    let budget = budget.max(1);
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let mut rest = line;
        while char_len(&rest) > budget {
            match sentence_cut(&rest, budget) {
                Some(at) => {
                    let tail = rest[at..].trim_start().to_string();
                    rest.truncate(at);
                    out.push(std::mem::replace(&mut rest, tail));
                }
                None => break,
            }
        }
        out.push(rest);
    }
    out
}

/// Byte offset of the whitespace after the last sentence end that keeps the
/// leading piece within `budget` chars.
fn sentence_cut(s: &str, budget: usize) -> Option<usize> {
    let chars: Vec<(usize, char)> = s.char_indices().collect();
    let mut best = None;
    for n in 0..chars.len().min(budget) {
        if !matches!(chars[n].1, '.' | '!' | '?' | '。' | '！' | '？' | '…') {
            continue;
        }
        let mut j = n + 1;
        while j < chars.len() && matches!(chars[j].1, '"' | '\'' | '”' | '’' | ')' | '」' | '』') {
            j += 1;
        }
        if j <= budget && j < chars.len() && chars[j].1.is_whitespace() {
            best = Some(chars[j].0);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tail_takes_last_lines() {
        assert_eq!(tail_lines("a\nb\nc", 2), "b\nc");
        assert_eq!(tail_lines("a", 5), "a");
        assert_eq!(tail_lines("a\nb", 0), "");
    }

    #[test]
    fn breaks_at_sentence_end() {
        let lines = vec!["One two. Three four. Five six seven eight".to_string()];
        let out = break_long_lines(lines, 22);
        assert_eq!(out[0], "One two. Three four.");
        assert_eq!(out[1], "Five six seven eight");
    }

    #[test]
    fn unbreakable_line_is_left_whole() {
        let lines = vec!["x".repeat(50)];
        let out = break_long_lines(lines, 10);
        assert_eq!(out.len(), 1);
    }
}
