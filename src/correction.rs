//! Client-side half of the correction boundary: pacing requests, removing
//! echoed context from answers, and refusing answers that are clearly not a
//! faithful correction of the input.

use crate::{
    config::{Config, RatioBounds},
    error::ReconstructError,
    service::CorrectionService,
    util::{char_len, similarity, squash},
};
use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

/// Spaces request starts at least `min_interval` apart across all workers.
pub struct RateLimiter {
    min_interval: Duration,
    next_slot: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            next_slot: Mutex::new(None),
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        let per_minute = match cfg.service.requests_per_minute {
            0 => Duration::ZERO,
            rpm => Duration::from_millis(60_000 / rpm as u64),
        };
        Self::new(per_minute.max(Duration::from_millis(cfg.service.min_interval_ms)))
    }

    pub fn acquire(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let wait = {
            let mut next = self
                .next_slot
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let now = Instant::now();
            let slot = next.map_or(now, |n| n.max(now));
            *next = Some(slot + self.min_interval);
            slot - now
        };
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }
}

pub struct CorrectionClient<S> {
    service: S,
    bounds: RatioBounds,
    overlap_match_ratio: f32,
    limiter: RateLimiter,
}

impl<S: CorrectionService> CorrectionClient<S> {
    pub fn new(cfg: &Config, service: S) -> Self {
        Self::with_limiter(cfg, service, RateLimiter::from_config(cfg))
    }

    pub fn with_limiter(cfg: &Config, service: S, limiter: RateLimiter) -> Self {
        Self {
            service,
            bounds: cfg.correction.length_ratio_bounds,
            overlap_match_ratio: cfg.correction.overlap_match_ratio,
            limiter,
        }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Corrects one chunk's primary text. The result never contains the
    /// overlap context, even if the service echoes it.
    pub fn correct(&self, primary: &str, overlap: &str) -> Result<String, ReconstructError> {
        self.limiter.acquire();
        let raw = self.service.submit(primary, overlap)?;
        let raw = raw.replace("\r\n", "\n");
        let body = strip_overlap(raw.trim_end(), overlap, primary, self.overlap_match_ratio);

        if body.trim().is_empty() {
            return Err(ReconstructError::ServiceInvalidResponse(
                "correction is empty once context is removed".into(),
            ));
        }
        let ratio = check_length_ratio(primary, &body, self.bounds)?;
        debug!(ratio, chars = char_len(&body), "correction accepted");
        Ok(body)
    }
}

/// Output/input size ratio, rejected when outside `bounds`. A result far
/// shorter than its input was truncated; one far longer was invented.
pub fn check_length_ratio(
    input: &str,
    output: &str,
    bounds: RatioBounds,
) -> Result<f32, ReconstructError> {
    let input_len = char_len(input.trim()).max(1) as f32;
    let ratio = char_len(output.trim()) as f32 / input_len;
    if ratio < bounds.min || ratio > bounds.max {
        return Err(ReconstructError::ServiceInvalidResponse(format!(
            "length ratio {ratio:.2} outside [{}, {}]",
            bounds.min, bounds.max
        )));
    }
    Ok(ratio)
}

/// Removes a leading echo of `overlap` from `output`, exact first and then
/// by fuzzy line-prefix match against the whole overlap or its tail. A prefix
/// that reads at least as much like the opening of `primary` is kept.
pub fn strip_overlap(output: &str, overlap: &str, primary: &str, min_similarity: f32) -> String {
    let overlap = overlap.trim();
    if overlap.is_empty() {
        return output.to_string();
    }

    let target = squash(overlap);
    let target_chars: Vec<char> = target.chars().collect();
    if target_chars.is_empty() {
        return output.to_string();
    }
    let opening: Vec<char> = squash(primary).chars().collect();

    let trimmed = output.trim_start();
    if let Some(rest) = trimmed.strip_prefix(overlap) {
        let echoed = !opening.starts_with(&target_chars) || squash(rest).starts_with(&target);
        if echoed && (rest.is_empty() || rest.starts_with(char::is_whitespace)) {
            return rest.trim_start_matches(['\n', '\r', ' ', '\t']).to_string();
        }
    }

    let lines: Vec<&str> = output.split('\n').collect();
    let mut acc = String::new();
    let mut best: Option<(f32, usize)> = None;
    for (k, line) in lines.iter().enumerate() {
        acc.push_str(&squash(line));
        let acc_len = acc.chars().count();
        if acc_len == 0 {
            continue;
        }
        if acc_len > target_chars.len() + target_chars.len() / 2 {
            break;
        }

        let mut score = similarity(&acc, &target);
        if acc_len >= 16 && acc_len < target_chars.len() {
            let tail: String = target_chars[target_chars.len() - acc_len..].iter().collect();
            score = score.max(similarity(&acc, &tail));
        }
        let head: String = opening[..acc_len.min(opening.len())].iter().collect();
        if similarity(&acc, &head) >= score {
            continue;
        }
        if score >= min_similarity && best.is_none_or(|(s, _)| score > s) {
            best = Some((score, k + 1));
        }
    }

    match best {
        Some((_, k)) => lines[k..]
            .join("\n")
            .trim_start_matches(['\n', '\r', ' ', '\t'])
            .to_string(),
        None => output.to_string(),
    }
}
