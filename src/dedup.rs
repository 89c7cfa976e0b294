use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DedupStats {
    pub runs_collapsed: usize,
    pub lines_removed: usize,
}

impl DedupStats {
    pub fn absorb(&mut self, other: DedupStats) {
        self.runs_collapsed += other.runs_collapsed;
        self.lines_removed += other.lines_removed;
    }
}

/// Collapses runs of `threshold` or more consecutive near-identical lines to
/// their first occurrence. Shorter runs are kept verbatim: a line said twice
/// may be real dialogue, a line printed three times is a scanner double-fire.
///
/// Blank lines never collapse and always end a run.
pub fn collapse_repeats(lines: &[String], threshold: usize) -> (Vec<String>, DedupStats) {
    let threshold = threshold.max(2);
    let keys: Vec<String> = lines.iter().map(|l| dedup_key(l)).collect();

    let mut out = Vec::with_capacity(lines.len());
    let mut stats = DedupStats::default();
    let mut i = 0;
    while i < lines.len() {
        let mut end = i + 1;
        if !keys[i].is_empty() {
            while end < lines.len() && keys[end] == keys[i] {
                end += 1;
            }
        }

        let run = end - i;
        if run >= threshold {
            out.push(lines[i].clone());
            stats.runs_collapsed += 1;
            stats.lines_removed += run - 1;
        } else {
            out.extend_from_slice(&lines[i..end]);
        }
        i = end;
    }
    (out, stats)
}

/// Whitespace- and punctuation-insensitive form of a line. Case is kept.
/// Lines made only of punctuation (rules, ellipses) keep their marks.
pub fn dedup_key(line: &str) -> String {
    let key = squash_spaces(
        line.nfkc()
            .filter(|c| !c.is_ascii_punctuation() && !is_unicode_punctuation(*c)),
    );
    if key.is_empty() {
        squash_spaces(line.nfkc())
    } else {
        key
    }
}

fn squash_spaces(chars: impl Iterator<Item = char>) -> String {
    chars
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn is_unicode_punctuation(c: char) -> bool {
    matches!(
        c,
        '“' | '”' | '‘' | '’' | '…' | '–' | '—' | '·' | '。' | '、' | '「' | '」' | '『' | '』'
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &[&str]) -> Vec<String> {
        s.iter().map(|x| x.to_string()).collect()
    }

    #[test]
    fn key_ignores_spacing_and_punctuation() {
        assert_eq!(dedup_key("  ERROR ,  now. "), dedup_key("ERROR now"));
        assert_ne!(dedup_key("Error"), dedup_key("ERROR"));
    }

    #[test]
    fn punctuation_only_lines_collapse() {
        let lines = v(&["....", ". . . .", "....", "— —", "— —", "— —", ""]);
        let (out, stats) = collapse_repeats(&lines, 3);
        assert_eq!(out, v(&["....", ". . . .", "....", "— —", ""]));
        assert_eq!(stats.lines_removed, 2);
        assert_ne!(dedup_key("...."), dedup_key("— —"));
        assert!(dedup_key("   ").is_empty());
    }

    #[test]
    fn threshold_below_two_is_clamped() {
        let (out, stats) = collapse_repeats(&v(&["a", "a"]), 1);
        assert_eq!(out, v(&["a"]));
        assert_eq!(stats.lines_removed, 1);
    }
}
