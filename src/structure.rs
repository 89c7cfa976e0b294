//! Paratext stripping and structural boundary detection.
//!
//! Running headers, footers and page numbers are removed from the edges of
//! each page; chapter, section and paragraph boundaries are recorded as
//! markers against the cleaned lines. Body text is never removed.

use crate::{config::Config, util::ends_sentence};
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    Chapter,
    Section,
    ParagraphBreak,
}

impl MarkerKind {
    pub fn is_heading(self) -> bool {
        matches!(self, MarkerKind::Chapter | MarkerKind::Section)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureMarker {
    pub page: u32,
    /// Offset into the page's cleaned lines.
    pub line: usize,
    pub kind: MarkerKind,
    /// Heading text, or the first line of the new paragraph.
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParatextKind {
    Header,
    Footer,
    PageNumber,
    Supplied,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovedLine {
    pub page: u32,
    /// Offset into the page's lines before removal.
    pub line: usize,
    pub kind: ParatextKind,
    pub text: String,
}

/// A page after dedup and paratext removal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanPage {
    pub index: u32,
    pub lines: Vec<String>,
    /// Header/footer lines the capture stage already identified.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paratext_hints: Vec<String>,
}

impl CleanPage {
    pub fn new(index: u32, lines: Vec<String>) -> Self {
        Self {
            index,
            lines,
            paratext_hints: Vec::new(),
        }
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Tagged {
    pub pages: Vec<CleanPage>,
    pub markers: Vec<StructureMarker>,
    pub removed: Vec<RemovedLine>,
}

pub struct StructureTagger {
    edge_lines: usize,
    edge_line_max_chars: usize,
    header_min_repeats: usize,
    header_window: usize,
    heading_max_chars: usize,
    detect_paragraph_breaks: bool,
    short_line_ratio: f32,
    chapter: Vec<Regex>,
    section: Vec<Regex>,
    page_number: Vec<Regex>,
    roman_heading: Regex,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Edge {
    Top,
    Bottom,
}

impl StructureTagger {
    pub fn new(cfg: &Config) -> Result<Self> {
        let s = &cfg.structure;
        Ok(Self {
            edge_lines: s.edge_lines,
            edge_line_max_chars: s.edge_line_max_chars,
            header_min_repeats: s.header_min_repeats.max(2),
            header_window: s.header_window,
            heading_max_chars: s.heading_max_chars,
            detect_paragraph_breaks: s.detect_paragraph_breaks,
            short_line_ratio: s.short_line_ratio,
            chapter: compile(&s.chapter_patterns).with_context(|| "structure.chapter_patterns")?,
            section: compile(&s.section_patterns).with_context(|| "structure.section_patterns")?,
            page_number: compile(&s.page_number_patterns)
                .with_context(|| "structure.page_number_patterns")?,
            roman_heading: Regex::new(r"^C{0,3}(XC|XL|L?X{0,3})(IX|IV|V?I{0,3})\.?$")?,
        })
    }

    pub fn tag(&self, pages: Vec<CleanPage>) -> Tagged {
        let top_keys: Vec<HashSet<String>> = pages
            .iter()
            .map(|p| self.edge_keys(&p.lines, Edge::Top))
            .collect();
        let bottom_keys: Vec<HashSet<String>> = pages
            .iter()
            .map(|p| self.edge_keys(&p.lines, Edge::Bottom))
            .collect();
        let top_literal: Vec<HashSet<String>> = pages
            .iter()
            .map(|p| self.literal_edge_keys(&p.lines, Edge::Top))
            .collect();
        let bottom_literal: Vec<HashSet<String>> = pages
            .iter()
            .map(|p| self.literal_edge_keys(&p.lines, Edge::Bottom))
            .collect();

        let mut out = Tagged::default();
        for (pos, page) in pages.into_iter().enumerate() {
            let mut drop: Vec<(usize, ParatextKind)> = Vec::new();
            let hints: HashSet<String> = page.paratext_hints.iter().map(|h| edge_key(h)).collect();

            for edge in [Edge::Top, Edge::Bottom] {
                let (keys, literal) = match edge {
                    Edge::Top => (&top_keys, &top_literal),
                    Edge::Bottom => (&bottom_keys, &bottom_literal),
                };
                for i in edge_indices(&page.lines, self.edge_lines, edge) {
                    let line = page.lines[i].trim();
                    let key = edge_key(line);
                    let (prev_blank, next_blank) = blank_neighbours(&page.lines, i);
                    // Headings differing only by their number are not running heads.
                    let heading = self.heading_kind(line, prev_blank, next_blank).is_some();
                    let numbered = self.page_number.iter().any(|r| r.is_match(line))
                        && !(edge == Edge::Top && is_roman_numeral(line));
                    let kind = if numbered {
                        Some(ParatextKind::PageNumber)
                    } else if hints.contains(&key) {
                        Some(ParatextKind::Supplied)
                    } else if self.recurs(keys, pos, &key)
                        && (!heading || self.recurs(literal, pos, &literal_key(line)))
                    {
                        Some(if edge == Edge::Top {
                            ParatextKind::Header
                        } else {
                            ParatextKind::Footer
                        })
                    } else {
                        None
                    };
                    if let Some(kind) = kind {
                        if !drop.iter().any(|(j, _)| *j == i) {
                            drop.push((i, kind));
                        }
                    }
                }
            }
            drop.sort_by_key(|(i, _)| *i);

            let mut lines = Vec::with_capacity(page.lines.len());
            for (i, line) in page.lines.into_iter().enumerate() {
                match drop.iter().find(|(j, _)| *j == i) {
                    Some((_, kind)) => out.removed.push(RemovedLine {
                        page: page.index,
                        line: i,
                        kind: *kind,
                        text: line,
                    }),
                    None => lines.push(line),
                }
            }
            trim_blank_edges(&mut lines);

            out.markers.extend(self.markers_for(page.index, &lines));
            out.pages.push(CleanPage {
                index: page.index,
                lines,
                paratext_hints: page.paratext_hints,
            });
        }
        out
    }

    /// Chapter/section cue for a line. Pattern cues need a blank line (or page
    /// edge) on one side; bare roman numerals and all-caps headings need one on
    /// both.
    fn heading_kind(&self, line: &str, prev_blank: bool, next_blank: bool) -> Option<MarkerKind> {
        if line.is_empty()
            || line.chars().count() > self.heading_max_chars
            || line.ends_with([',', ';', ':'])
            || !(prev_blank || next_blank)
        {
            return None;
        }
        if self.chapter.iter().any(|r| r.is_match(line)) {
            return Some(MarkerKind::Chapter);
        }
        if self.section.iter().any(|r| r.is_match(line)) {
            return Some(MarkerKind::Section);
        }
        if !(prev_blank && next_blank) {
            return None;
        }
        if self.roman_heading.is_match(line) {
            return Some(MarkerKind::Chapter);
        }
        if is_caps_heading(line) {
            return Some(MarkerKind::Section);
        }
        None
    }

    fn markers_for(&self, page: u32, lines: &[String]) -> Vec<StructureMarker> {
        let median = median_len(lines);
        let mut markers = Vec::new();
        let mut seen_body = false;

        for (i, raw) in lines.iter().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            let (prev_blank, next_blank) = blank_neighbours(lines, i);

            if let Some(kind) = self.heading_kind(line, prev_blank, next_blank) {
                markers.push(StructureMarker {
                    page,
                    line: i,
                    kind,
                    text: line.to_string(),
                });
                seen_body = false;
                continue;
            }

            if self.detect_paragraph_breaks && seen_body && i > 0 {
                let prev = lines[i - 1].trim();
                let after_blank = prev.is_empty();
                let after_short_sentence = !prev.is_empty()
                    && ends_sentence(prev)
                    && (prev.chars().count() as f32) < self.short_line_ratio * median as f32;
                if after_blank || after_short_sentence {
                    markers.push(StructureMarker {
                        page,
                        line: i,
                        kind: MarkerKind::ParagraphBreak,
                        text: line.to_string(),
                    });
                }
            }
            seen_body = true;
        }
        markers
    }

    fn edge_keys(&self, lines: &[String], edge: Edge) -> HashSet<String> {
        edge_indices(lines, self.edge_lines, edge)
            .into_iter()
            .map(|i| edge_key(&lines[i]))
            .filter(|k| !k.is_empty() && k.chars().count() <= self.edge_line_max_chars)
            .collect()
    }

    fn literal_edge_keys(&self, lines: &[String], edge: Edge) -> HashSet<String> {
        edge_indices(lines, self.edge_lines, edge)
            .into_iter()
            .map(|i| literal_key(&lines[i]))
            .filter(|k| !k.is_empty() && k.chars().count() <= self.edge_line_max_chars)
            .collect()
    }

    fn recurs(&self, keys: &[HashSet<String>], pos: usize, key: &str) -> bool {
        if key.is_empty() || key.chars().count() > self.edge_line_max_chars {
            return false;
        }
        let lo = pos.saturating_sub(self.header_window);
        let hi = (pos + self.header_window).min(keys.len().saturating_sub(1));
        let hits = (lo..=hi).filter(|&j| keys[j].contains(key)).count();
        hits >= self.header_min_repeats
    }
}

fn blank_neighbours(lines: &[String], i: usize) -> (bool, bool) {
    let prev = i == 0 || lines[i - 1].trim().is_empty();
    let next = i + 1 >= lines.len() || lines[i + 1].trim().is_empty();
    (prev, next)
}

/// A line made only of roman-numeral letters, optionally dot-terminated.
fn is_roman_numeral(line: &str) -> bool {
    let body = line.trim().trim_end_matches('.');
    !body.is_empty() && body.chars().all(|c| "ivxlcIVXLC".contains(c))
}

fn is_caps_heading(line: &str) -> bool {
    if ends_sentence(line) {
        return false;
    }
    let upper = line.chars().filter(|c| c.is_uppercase()).count();
    let lower = line.chars().filter(|c| c.is_lowercase()).count();
    upper >= 3 && lower == 0
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).with_context(|| format!("invalid regex: {p}")))
        .collect()
}

/// Comparison key for edge lines: running heads differ only by page number.
pub fn edge_key(line: &str) -> String {
    line.nfkc()
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_ascii_digit() { '#' } else { c })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Like [`edge_key`] but numbers are kept.
fn literal_key(line: &str) -> String {
    line.nfkc()
        .flat_map(char::to_lowercase)
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn edge_indices(lines: &[String], n: usize, edge: Edge) -> Vec<usize> {
    let non_empty = lines
        .iter()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(i, _)| i);
    match edge {
        Edge::Top => non_empty.take(n).collect(),
        Edge::Bottom => {
            let mut v: Vec<usize> = non_empty.rev().take(n).collect();
            v.reverse();
            v
        }
    }
}

fn trim_blank_edges(lines: &mut Vec<String>) {
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }
    let lead = lines.iter().take_while(|l| l.trim().is_empty()).count();
    lines.drain(..lead);
}

fn median_len(lines: &[String]) -> usize {
    let mut lens: Vec<usize> = lines
        .iter()
        .map(|l| l.trim().chars().count())
        .filter(|&n| n > 0)
        .collect();
    if lens.is_empty() {
        return 0;
    }
    lens.sort_unstable();
    lens[lens.len() / 2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edge_key_masks_digits() {
        assert_eq!(edge_key("The  Long Road — 12"), edge_key("the long road — 13"));
    }

    #[test]
    fn roman_numerals_are_recognised() {
        assert!(is_roman_numeral("XIV"));
        assert!(is_roman_numeral("iv."));
        assert!(!is_roman_numeral("Vixen"));
        assert!(!is_roman_numeral(""));
    }

    #[test]
    fn edge_indices_skip_blank_lines() {
        let lines: Vec<String> = ["", "a", "", "b", "c", ""].iter().map(|s| s.to_string()).collect();
        assert_eq!(edge_indices(&lines, 2, Edge::Top), vec![1, 3]);
        assert_eq!(edge_indices(&lines, 2, Edge::Bottom), vec![3, 4]);
    }
}
