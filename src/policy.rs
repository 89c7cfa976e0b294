use crate::{config::Config, error::ReconstructError};
use std::time::Duration;

/// System instruction sent with every correction request. Fixed by the
/// engine; configuration cannot override it.
pub const SYSTEM_POLICY: &str = "\
You repair OCR transcriptions of scanned book pages.
Rules:
1. Do not summarize, paraphrase, shorten or expand the text.
2. Fix only OCR artifacts: misrecognized characters, broken words, stray symbols, wrong spacing and broken hyphenation.
3. Do not add content and do not remove content, except characters that are clearly OCR noise.
4. Keep repeated sentences or lines unless they are an obvious scanner duplicate; repetition can be intentional.
5. Keep the original language and script. Never translate.
6. Keep headings, numbering and paragraph breaks where they are.
7. Text under CONTEXT is already corrected and is given only for continuity. Do not output it.
8. Output only the corrected text under TEXT, with no commentary, labels or code fences.";

/// User message for one chunk: optional read-only context, then the text to repair.
pub fn compose_prompt(text: &str, overlap_context: &str) -> String {
    if overlap_context.trim().is_empty() {
        format!("TEXT:\n{text}")
    } else {
        format!("CONTEXT (do not output):\n{overlap_context}\n\nTEXT:\n{text}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryDecision {
    Retry(Duration),
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub invalid_response_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn from_config(cfg: &Config) -> Self {
        let c = &cfg.correction;
        Self {
            max_attempts: c.max_retries.max(1),
            invalid_response_attempts: c.invalid_response_attempts.max(1),
            initial_delay: Duration::from_millis(c.initial_retry_delay_ms),
            max_delay: Duration::from_millis(c.max_retry_delay_ms),
            multiplier: c.retry_multiplier.max(1.0),
        }
    }

    /// Delay before the attempt that follows `failed` failures.
    pub fn delay_after(&self, failed: u32) -> Duration {
        let exp = failed.saturating_sub(1).min(32) as i32;
        let ms = self.initial_delay.as_millis() as f64 * self.multiplier.powi(exp);
        Duration::from_millis(ms.min(self.max_delay.as_millis() as f64) as u64)
    }

    /// `attempts` counts every call made so far, `invalid` those that came back unusable.
    pub fn decide(&self, attempts: u32, invalid: u32, err: &ReconstructError) -> RetryDecision {
        if attempts >= self.max_attempts {
            return RetryDecision::GiveUp;
        }
        match err {
            ReconstructError::ServiceTransient(_) => RetryDecision::Retry(self.delay_after(attempts)),
            ReconstructError::ServiceInvalidResponse(_) if invalid < self.invalid_response_attempts => {
                RetryDecision::Retry(self.delay_after(attempts))
            }
            _ => RetryDecision::GiveUp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            invalid_response_attempts: 2,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            multiplier: 2.0,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let p = policy();
        assert_eq!(p.delay_after(1), Duration::from_millis(100));
        assert_eq!(p.delay_after(2), Duration::from_millis(200));
        assert_eq!(p.delay_after(3), Duration::from_millis(350));
    }

    #[test]
    fn transient_retries_until_cap() {
        let p = policy();
        let e = ReconstructError::ServiceTransient("timeout".into());
        assert!(matches!(p.decide(4, 0, &e), RetryDecision::Retry(_)));
        assert_eq!(p.decide(5, 0, &e), RetryDecision::GiveUp);
    }

    #[test]
    fn invalid_response_retried_once() {
        let p = policy();
        let e = ReconstructError::ServiceInvalidResponse("empty".into());
        assert!(matches!(p.decide(1, 1, &e), RetryDecision::Retry(_)));
        assert_eq!(p.decide(2, 2, &e), RetryDecision::GiveUp);
    }

    #[test]
    fn prompt_marks_context() {
        let p = compose_prompt("body", "ctx");
        assert!(p.starts_with("CONTEXT"));
        assert!(p.ends_with("TEXT:\nbody"));
        assert_eq!(compose_prompt("body", "  "), "TEXT:\nbody");
    }
}
