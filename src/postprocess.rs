//! Final assembly: structural markers go back into each chunk's text, the
//! chunks are joined in page order, and the result is normalised.

use crate::{
    chunk_plan::Chunk,
    config::Config,
    report::MarkerStats,
    structure::{MarkerKind, StructureMarker},
    util::{ends_sentence, squash},
};
use regex::Regex;
use std::collections::HashMap;
use unicode_normalization::UnicodeNormalization;

/// Text produced for one chunk.
#[derive(Debug, Clone)]
pub struct ChunkText {
    pub text: String,
    /// True when `text` is the chunk's own cleaned lines, so markers can be
    /// placed by line index instead of searched for.
    pub verbatim: bool,
}

/// Markers falling inside `chunk`, with their line offset inside its primary text.
pub fn markers_in_chunk<'m>(
    chunk: &Chunk,
    by_page: &HashMap<u32, Vec<&'m StructureMarker>>,
) -> Vec<(usize, &'m StructureMarker)> {
    let mut out = Vec::new();
    let mut base = 0usize;
    for span in &chunk.spans {
        if let Some(marks) = by_page.get(&span.page) {
            for m in marks {
                if m.line >= span.start_line && m.line < span.end_line {
                    out.push((base + m.line - span.start_line, *m));
                }
            }
        }
        base += span.end_line - span.start_line;
    }
    out.sort_by_key(|(local, _)| *local);
    out
}

/// Re-inserts markers into every chunk and joins the chunks in order.
pub fn assemble(
    cfg: &Config,
    chunks: &[Chunk],
    texts: &[ChunkText],
    markers: &[StructureMarker],
) -> (String, MarkerStats) {
    let mut by_page: HashMap<u32, Vec<&StructureMarker>> = HashMap::new();
    for m in markers {
        by_page.entry(m.page).or_default().push(m);
    }

    let mut stats = MarkerStats {
        total: markers.len(),
        ..Default::default()
    };
    let mut parts = Vec::with_capacity(chunks.len());
    for (chunk, text) in chunks.iter().zip(texts) {
        let marks = markers_in_chunk(chunk, &by_page);
        let placed = if text.verbatim {
            apply_by_line(&text.text, &marks)
        } else {
            apply_by_search(&text.text, &marks, chunk.primary_line_count(), &mut stats)
        };
        parts.push(placed);
    }

    (merge_chunks(cfg, parts), stats)
}

pub fn heading_line(m: &StructureMarker) -> String {
    match m.kind {
        MarkerKind::Chapter => format!("# {}", m.text.trim()),
        MarkerKind::Section => format!("## {}", m.text.trim()),
        MarkerKind::ParagraphBreak => m.text.trim().to_string(),
    }
}

fn apply_by_line(text: &str, marks: &[(usize, &StructureMarker)]) -> String {
    let mut lines: Vec<String> = text.split('\n').map(str::to_string).collect();
    for (local, m) in marks.iter().rev() {
        let i = *local;
        if i >= lines.len() {
            continue;
        }
        if m.kind.is_heading() {
            lines[i] = heading_line(m);
            if i + 1 < lines.len() && !lines[i + 1].trim().is_empty() {
                lines.insert(i + 1, String::new());
            }
        }
        if i > 0 && !lines[i - 1].trim().is_empty() {
            lines.insert(i, String::new());
        }
    }
    lines.join("\n")
}

fn apply_by_search(
    text: &str,
    marks: &[(usize, &StructureMarker)],
    primary_lines: usize,
    stats: &mut MarkerStats,
) -> String {
    let mut out = text.to_string();
    let mut cursor = 0usize;

    for (local, m) in marks {
        let words = if m.kind.is_heading() { 8 } else { 4 };
        let found = word_pattern(&m.text, words)
            .and_then(|re| re.find_at(&out, cursor).map(|f| (f.start(), f.end())));

        if m.kind.is_heading() {
            if let Some((s, e)) = found {
                let ls = line_start(&out, s);
                let le = line_end(&out, e);
                let content = out[ls..le].trim().trim_start_matches('#').trim();
                if squash(content) == squash(&m.text) {
                    let line = heading_line(m);
                    out.replace_range(ls..le, &line);
                    cursor = ensure_blank_around(&mut out, ls, ls + line.len());
                    continue;
                }
            }
            let mut at = proportional_offset(&out, *local, primary_lines, cursor);
            if at == out.len() && !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
                at = out.len();
            }
            let line = heading_line(m);
            if at < out.len() {
                out.insert_str(at, &format!("{line}\n"));
            } else {
                out.push_str(&line);
            }
            cursor = ensure_blank_around(&mut out, at, at + line.len());
            stats.relocated += 1;
            continue;
        }

        let Some((s, _)) = found else {
            stats.unplaced += 1;
            continue;
        };
        let ls = line_start(&out, s);
        if out[ls..s].trim().is_empty() {
            if ls > 0 && !out[..ls].ends_with("\n\n") {
                out.insert(ls, '\n');
                cursor = s + 1;
            } else {
                cursor = s;
            }
        } else {
            let before = out[ls..s].trim_end();
            if ends_sentence(before) {
                let ws = ls + before.len();
                out.replace_range(ws..s, "\n\n");
                cursor = ws + 2;
            } else {
                stats.unplaced += 1;
                cursor = s;
            }
        }
    }
    out
}

/// Case-insensitive, whitespace-tolerant pattern over the first `n` words.
fn word_pattern(text: &str, n: usize) -> Option<Regex> {
    let words: Vec<String> = text.split_whitespace().take(n).map(regex::escape).collect();
    if words.is_empty() {
        return None;
    }
    Regex::new(&format!("(?i){}", words.join(r"\s+"))).ok()
}

fn line_start(s: &str, at: usize) -> usize {
    s[..at].rfind('\n').map_or(0, |i| i + 1)
}

fn line_end(s: &str, at: usize) -> usize {
    s[at..].find('\n').map_or(s.len(), |i| at + i)
}

/// Puts a blank line on both sides of `s[start..end]`; returns the offset
/// just past the trailing blank line.
fn ensure_blank_around(s: &mut String, start: usize, end: usize) -> usize {
    let mut end = end;
    if end < s.len() {
        let rest = &s[end..];
        if !rest.starts_with("\n\n") {
            s.insert(end, '\n');
        }
        end += 2;
    }
    if start > 0 && !s[..start].ends_with("\n\n") {
        s.insert(start, '\n');
        end += 1;
    }
    end.min(s.len())
}

/// Start of the line at the same relative position as `local` was in the
/// primary text, never before `cursor`.
fn proportional_offset(s: &str, local: usize, primary_lines: usize, cursor: usize) -> usize {
    let total = s.split('\n').count();
    let target = local * total / primary_lines.max(1);
    let mut line_no = 0usize;
    let mut start = 0usize;
    loop {
        if line_no >= target && start >= cursor {
            return start;
        }
        match s[start..].find('\n') {
            Some(i) => {
                start += i + 1;
                line_no += 1;
            }
            None => return s.len(),
        }
    }
}

/// Joins chunk texts in order and applies the final text normalisation.
pub fn merge_chunks(cfg: &Config, parts: Vec<String>) -> String {
    let mut merged = String::new();
    for part in parts {
        let part = part.trim_matches('\n');
        if part.is_empty() {
            continue;
        }
        if !merged.is_empty() {
            merged.push_str(if part.starts_with('#') { "\n\n" } else { "\n" });
        }
        merged.push_str(part);
    }

    if cfg.postprocess.normalize_newlines {
        merged = merged.replace("\r\n", "\n");
    }

    if cfg.postprocess.normalize_unicode {
        merged = merged.nfkc().collect::<String>();
    }

    merged = sanitize_control_chars(&merged, &cfg.postprocess.control_chars_to_sanitize);

    if cfg.postprocess.trim_trailing_whitespace {
        merged = merged
            .lines()
            .map(|l| l.trim_end().to_string())
            .collect::<Vec<_>>()
            .join("\n");
    }

    merged = collapse_blank_runs(&merged);
    if !merged.is_empty() {
        merged.push('\n');
    }
    merged
}

fn sanitize_control_chars(s: &str, codes: &[u8]) -> String {
    if codes.is_empty() {
        return s.to_string();
    }

    let mut mask = [false; 128];
    for &code in codes {
        if (code as usize) < mask.len() {
            mask[code as usize] = true;
        }
    }

    s.chars()
        .filter(|&ch| {
            if ch == '\n' || ch == '\r' || ch == '\t' {
                return true;
            }
            let cp = ch as u32;
            if cp < 128 { !mask[cp as usize] } else { true }
        })
        .collect()
}

fn collapse_blank_runs(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut newlines = 0usize;
    for ch in s.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines > 2 {
                continue;
            }
        } else {
            newlines = 0;
        }
        out.push(ch);
    }
    out.trim_matches('\n').to_string()
}

fn strip_heading_mark(line: &str) -> &str {
    let hashes = line.len() - line.trim_start_matches('#').len();
    if !(1..=6).contains(&hashes) {
        return line;
    }
    let rest = &line[hashes..];
    let body = rest.trim_start();
    if body.len() == rest.len() { line } else { body }
}

/// Plain-text rendition: heading markers dropped, everything else unchanged.
pub fn markdown_to_text(md: &str) -> String {
    let mut out = md
        .lines()
        .map(strip_heading_mark)
        .collect::<Vec<_>>()
        .join("\n");
    if md.ends_with('\n') {
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_runs_collapse_to_one_blank_line() {
        assert_eq!(collapse_blank_runs("a\n\n\n\nb\n"), "a\n\nb");
    }

    #[test]
    fn proportional_offset_respects_cursor() {
        let s = "l0\nl1\nl2\nl3";
        assert_eq!(proportional_offset(s, 2, 4, 0), 6);
        assert_eq!(proportional_offset(s, 0, 4, 4), 6);
        assert_eq!(proportional_offset(s, 9, 4, 0), s.len());
    }

    #[test]
    fn word_pattern_tolerates_reflow() {
        let re = word_pattern("It was  late", 4).unwrap();
        assert!(re.is_match("and so\nit was\nlate"));
    }
}
