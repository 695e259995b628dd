use std::time::Duration;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use atelier_contracts::config::clamped_duration;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

#[derive(Debug, Clone)]
pub(crate) struct ImageBytes {
    pub bytes: Vec<u8>,
    pub mime_type: Option<String>,
}

pub(crate) fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

/// Reads a successful binary body. The bytes must look like an image.
pub(crate) fn response_image_or_error(provider: &str, response: HttpResponse) -> Result<ImageBytes> {
    let status = response.status();
    let code = status.as_u16();
    if !status.is_success() {
        let body = response.text().unwrap_or_default();
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let mime_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    let bytes = response
        .bytes()
        .with_context(|| format!("{provider} image bytes read failed"))?
        .to_vec();
    if bytes.is_empty() {
        bail!("{provider} returned an empty body");
    }
    image::guess_format(&bytes).with_context(|| {
        format!(
            "{provider} returned a non-image body: {}",
            truncate_text(&String::from_utf8_lossy(&bytes), 200)
        )
    })?;
    Ok(ImageBytes { bytes, mime_type })
}

const FALLBACK_TIMEOUT: Duration = Duration::from_secs(60);

/// Request timeout for configured seconds. Values out of range fall back to
/// one minute.
pub(crate) fn request_timeout(seconds: f64) -> Duration {
    clamped_duration(seconds).unwrap_or(FALLBACK_TIMEOUT)
}

pub(crate) fn download_image(
    http: &HttpClient,
    provider: &str,
    url: &str,
    timeout_s: f64,
) -> Result<ImageBytes> {
    let response = http
        .get(url)
        .timeout(request_timeout(timeout_s))
        .send()
        .with_context(|| format!("{provider} image download failed ({url})"))?;
    response_image_or_error(provider, response)
}

pub(crate) fn decode_data_url(value: &str) -> Result<ImageBytes> {
    let (meta, payload) = value
        .split_once(',')
        .ok_or_else(|| anyhow::anyhow!("invalid data URL image payload"))?;
    let mime = meta
        .trim()
        .strip_prefix("data:")
        .and_then(|rest| rest.split(';').next())
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .unwrap_or("image/png")
        .to_string();
    let bytes = BASE64
        .decode(payload.trim().as_bytes())
        .context("image data URL base64 decode failed")?;
    Ok(ImageBytes {
        bytes,
        mime_type: Some(mime),
    })
}

/// Pulls a human-readable message out of a JSON error body.
pub(crate) fn structured_error_message(body: &Value) -> Option<String> {
    let error = body.get("error")?;
    error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

pub(crate) fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}
