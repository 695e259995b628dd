use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use atelier_contracts::config::OpenRouterConfig;
use atelier_contracts::providers::ProviderId;
use atelier_contracts::reference;
use atelier_contracts::styles::{StyleConfig, StyleRegistry};
use regex::Regex;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use super::{ImageProvider, ProviderRequest, ProviderResult};
use crate::artifact::{ArtifactStore, GeneratedArtifact};
use crate::http::{
    decode_data_url, download_image, request_timeout, response_json_or_error, ImageBytes,
};

const ARTIFACT_PREFIX: &str = "openrouter";
const CARTOON_TRANSFORM_STYLE: &str = "reference_3d";
const DOWNLOAD_TIMEOUT_S: f64 = 30.0;
const TEXT_URL_PATTERN: &str = r#"https?://[^\s<>"'()\[\]{}]+"#;

pub struct OpenRouterProvider {
    config: OpenRouterConfig,
    styles: Arc<StyleRegistry>,
    store: ArtifactStore,
    http: HttpClient,
}

impl OpenRouterProvider {
    pub fn new(config: OpenRouterConfig, styles: Arc<StyleRegistry>, store: ArtifactStore) -> Self {
        Self {
            config,
            styles,
            store,
            http: HttpClient::new(),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.config.base_url)
    }

    pub(crate) fn build_full_prompt(prompt: &str, style: &StyleConfig) -> String {
        let mut full_prompt = if style.id == CARTOON_TRANSFORM_STYLE {
            format!(
                "REALISTIC TO CARTOON TRANSFORMATION: Transform this realistic object/robot into \
                 cute cartoon version. {prompt}{}. SPECIFIC CONVERSION RULES: 1) Round all sharp \
                 edges and corners, 2) Make proportions more chunky and toy-like, 3) Convert \
                 metallic/hard surfaces to soft plastic toy material, 4) Enlarge head/main \
                 features proportionally, 5) Add warmth and friendliness to the design, 6) Keep \
                 basic structure but make it adorable and approachable, 7) Apply C4D cartoon \
                 rendering with soft lighting.",
                style.prompt_suffix
            )
        } else {
            format!("{prompt}{}", style.prompt_suffix)
        };
        if style.negative_prompt.trim().is_empty() {
            full_prompt.push_str(". High quality, detailed, professional artwork.");
        } else {
            full_prompt.push_str(&format!(
                ". High quality, detailed, professional. Avoid: {}",
                style.negative_prompt
            ));
        }
        full_prompt
    }

    /// Image-capable chat models get a structured content list. Other models
    /// get a plain instruction unless a reference image has to ride along.
    pub(crate) fn build_request_body(
        model: &str,
        full_prompt: &str,
        reference_b64: Option<&str>,
    ) -> Value {
        let lowered = model.to_ascii_lowercase();
        let image_model = lowered.contains("gemini") && lowered.contains("image");
        let content = if image_model || reference_b64.is_some() {
            let mut parts = vec![json!({
                "type": "text",
                "text": full_prompt,
            })];
            if let Some(encoded) = reference_b64 {
                parts.push(json!({
                    "type": "image_url",
                    "image_url": { "url": format!("data:image/jpeg;base64,{encoded}") },
                }));
            }
            Value::Array(parts)
        } else {
            Value::String(format!("Generate an image: {full_prompt}"))
        };
        json!({
            "model": model,
            "messages": [{ "role": "user", "content": content }],
            "modalities": ["image", "text"],
            "max_tokens": 1000,
            "temperature": 0.7,
        })
    }

    fn try_generate(&self, request: &ProviderRequest) -> Result<GeneratedArtifact> {
        let api_key = self.config.api_key.trim();
        if api_key.is_empty() {
            bail!("OpenRouter API key is not configured");
        }
        let style = self.styles.get_style(&request.style_id);
        let model = self.styles.resolve_multi_model(&request.style_id);
        let full_prompt = Self::build_full_prompt(&request.prompt, style);
        let reference_b64 = match request.reference_image.as_deref() {
            Some(path) if reference::validate(path) => reference::encode_base64(path),
            Some(path) => {
                tracing::warn!(path = %path.display(), "OpenRouter dropped invalid reference image");
                None
            }
            None => None,
        };
        let body = Self::build_request_body(model, &full_prompt, reference_b64.as_deref());
        tracing::debug!(
            model,
            with_reference = reference_b64.is_some(),
            prompt_chars = full_prompt.chars().count(),
            "OpenRouter request"
        );

        let endpoint = self.endpoint();
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(api_key)
            .header(CONTENT_TYPE, "application/json")
            .header("HTTP-Referer", &self.config.http_referer)
            .header("X-Title", &self.config.x_title)
            .json(&body)
            .timeout(request_timeout(self.config.timeout_s))
            .send()
            .with_context(|| format!("OpenRouter request failed ({endpoint})"))?;
        let payload = response_json_or_error("OpenRouter", response)?;
        let image = self.extract_image(&payload)?;
        self.store
            .write_as_png(ARTIFACT_PREFIX, &request.prompt, &image.bytes)
    }

    /// Tries inline base64 images, then remote image URLs, then any URL in
    /// the free-text answer.
    fn extract_image(&self, payload: &Value) -> Result<ImageBytes> {
        let message = payload
            .pointer("/choices/0/message")
            .ok_or_else(|| anyhow!("OpenRouter response has no choices"))?;
        let candidates = message_image_urls(message);
        let mut last_error: Option<anyhow::Error> = None;

        for candidate in candidates.iter().filter(|url| url.starts_with("data:image/")) {
            match decode_data_url(candidate) {
                Ok(image) => return Ok(image),
                Err(err) => last_error = Some(err),
            }
        }
        for candidate in candidates
            .iter()
            .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
        {
            match download_image(&self.http, "OpenRouter", candidate, DOWNLOAD_TIMEOUT_S) {
                Ok(image) => return Ok(image),
                Err(err) => last_error = Some(err),
            }
        }
        if let Some(url) = message_text(message).as_deref().and_then(first_url_in_text) {
            return download_image(&self.http, "OpenRouter", &url, DOWNLOAD_TIMEOUT_S);
        }
        match last_error {
            Some(err) => Err(err.context("OpenRouter image candidates were unusable")),
            None => bail!("OpenRouter response contained no image"),
        }
    }
}

impl ImageProvider for OpenRouterProvider {
    fn id(&self) -> ProviderId {
        ProviderId::OpenRouter
    }

    fn generate(&self, request: &ProviderRequest) -> ProviderResult {
        tracing::info!(
            provider = %self.id(),
            style = %request.style_id,
            "multi-model generation"
        );
        ProviderResult::from_attempt(self.id(), self.try_generate(request))
    }
}

fn image_url_of(part: &Value) -> Option<String> {
    let image_url = part.get("image_url")?;
    image_url
        .get("url")
        .and_then(Value::as_str)
        .or_else(|| image_url.as_str())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn message_image_urls(message: &Value) -> Vec<String> {
    let mut out = Vec::new();
    let images = message.get("images").and_then(Value::as_array);
    let content_parts = message.get("content").and_then(Value::as_array);
    for part in images.into_iter().chain(content_parts).flatten() {
        if let Some(url) = image_url_of(part) {
            if !out.contains(&url) {
                out.push(url);
            }
        }
    }
    out
}

fn message_text(message: &Value) -> Option<String> {
    match message.get("content")? {
        Value::String(text) => Some(text.clone()),
        Value::Array(parts) => {
            let joined = parts
                .iter()
                .filter(|part| part.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect::<Vec<&str>>()
                .join("\n");
            Some(joined)
        }
        _ => None,
    }
}

pub(crate) fn first_url_in_text(text: &str) -> Option<String> {
    let pattern = Regex::new(TEXT_URL_PATTERN).ok()?;
    pattern
        .find(text)
        .map(|found| {
            found
                .as_str()
                .trim_end_matches(['.', ',', ';', ':', '!', '?'])
                .to_string()
        })
        .filter(|url| url.len() > "https://".len())
}
