use super::{CorrectionService, types::*};
use crate::{
    config::{Config, Service},
    error::ReconstructError,
    policy::{SYSTEM_POLICY, compose_prompt},
};
use anyhow::{Context, Result, anyhow};
use reqwest::StatusCode;
use reqwest::blocking::Client;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

const API_KEY_HEADER: &str = "x-goog-api-key";

pub struct GeminiService {
    cfg: Service,
    api_key: String,
    client: Client,
}

impl GeminiService {
    pub fn new(cfg: &Config) -> Result<Self> {
        let svc = &cfg.service;
        if svc.provider != "gemini" {
            return Err(anyhow!("unsupported service.provider: {}", svc.provider));
        }
        let api_key = std::env::var(&svc.api_key_env)
            .map_err(|_| anyhow!("{} is not set", svc.api_key_env))?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(svc.connect_timeout_seconds))
            .timeout(Duration::from_secs(svc.request_timeout_seconds))
            .build()
            .with_context(|| "building HTTP client")?;
        Ok(Self {
            cfg: svc.clone(),
            api_key,
            client,
        })
    }

    fn model_url(&self) -> String {
        format!(
            "{}/models/{}",
            self.cfg.endpoint.trim_end_matches('/'),
            self.cfg.model
        )
    }

    fn request(&self, text: &str, overlap_context: &str) -> GenerateRequest {
        GenerateRequest {
            system_instruction: Content::text(None, SYSTEM_POLICY),
            contents: vec![Content::text(Some("user"), compose_prompt(text, overlap_context))],
            generation_config: GenerationConfig {
                temperature: self.cfg.temperature,
                top_p: self.cfg.top_p,
                top_k: self.cfg.top_k,
                max_output_tokens: self.cfg.max_output_tokens,
                response_mime_type: "text/plain".into(),
            },
        }
    }

    /// Checks that the configured model answers with the configured key.
    pub fn doctor(&self) -> ServiceDiag {
        let mut diag = ServiceDiag {
            provider: self.cfg.provider.clone(),
            endpoint: self.cfg.endpoint.clone(),
            model: self.cfg.model.clone(),
            api_key_env: self.cfg.api_key_env.clone(),
            ok: false,
            error: None,
        };
        match self
            .client
            .get(self.model_url())
            .header(API_KEY_HEADER, &self.api_key)
            .send()
        {
            Ok(resp) if resp.status().is_success() => diag.ok = true,
            Ok(resp) => diag.error = Some(format!("HTTP {}", resp.status())),
            Err(err) => diag.error = Some(err.to_string()),
        }
        diag
    }
}

impl CorrectionService for GeminiService {
    fn submit(&self, text: &str, overlap_context: &str) -> Result<String, ReconstructError> {
        let url = format!("{}:generateContent", self.model_url());
        let started = Instant::now();
        let resp = self
            .client
            .post(&url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(&self.request(text, overlap_context))
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    ReconstructError::ServiceTransient(format!("request timed out: {e}"))
                } else {
                    ReconstructError::ServiceTransient(format!("request failed: {e}"))
                }
            })?;

        let status = resp.status();
        debug!(status = %status, elapsed_ms = started.elapsed().as_millis() as u64, "gemini response");

        if is_transient_status(status) {
            let body = resp.text().unwrap_or_default();
            return Err(ReconstructError::ServiceTransient(format!(
                "HTTP {status}: {}",
                snippet(&body)
            )));
        }
        if !status.is_success() {
            let body = resp.text().unwrap_or_default();
            return Err(ReconstructError::ServiceInvalidResponse(format!(
                "HTTP {status}: {}",
                snippet(&body)
            )));
        }

        let parsed: GenerateResponse = resp.json().map_err(|e| {
            if e.is_timeout() {
                ReconstructError::ServiceTransient(format!("reading body timed out: {e}"))
            } else {
                ReconstructError::ServiceInvalidResponse(format!("malformed body: {e}"))
            }
        })?;
        extract_text(&parsed)
    }
}

fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

/// Text of a successful response, or why it cannot be used.
pub fn extract_text(resp: &GenerateResponse) -> Result<String, ReconstructError> {
    if let Some(reason) = resp
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        return Err(ReconstructError::ServiceInvalidResponse(format!(
            "prompt blocked: {reason}"
        )));
    }
    let candidate = resp
        .candidates
        .first()
        .ok_or_else(|| ReconstructError::ServiceInvalidResponse("no candidates".into()))?;
    if let Some(reason) = candidate.finish_reason.as_deref() {
        if reason != "STOP" {
            warn!("gemini finished with {reason}");
            return Err(ReconstructError::ServiceInvalidResponse(format!(
                "finish reason {reason}"
            )));
        }
    }
    match resp.first_text() {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ReconstructError::ServiceInvalidResponse("empty text".into())),
    }
}

fn snippet(body: &str) -> String {
    let s: String = body.chars().take(300).collect();
    s.trim().to_string()
}
