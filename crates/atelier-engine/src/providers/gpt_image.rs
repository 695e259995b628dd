use std::sync::Arc;

use anyhow::{bail, Context, Result};
use atelier_contracts::config::GptImageConfig;
use atelier_contracts::providers::ProviderId;
use atelier_contracts::reference;
use atelier_contracts::styles::StyleRegistry;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Map, Value};

use super::{ImageProvider, ProviderRequest, ProviderResult};
use crate::artifact::{ArtifactStore, GeneratedArtifact};
use crate::http::{request_timeout, response_image_or_error};

const ARTIFACT_PREFIX: &str = "gpt_image1";

pub struct GptImageProvider {
    config: GptImageConfig,
    styles: Arc<StyleRegistry>,
    store: ArtifactStore,
    http: HttpClient,
}

impl GptImageProvider {
    pub fn new(config: GptImageConfig, styles: Arc<StyleRegistry>, store: ArtifactStore) -> Self {
        Self {
            config,
            styles,
            store,
            http: HttpClient::new(),
        }
    }

    pub(crate) fn build_request_body(prompt: &str, reference_b64: Option<String>) -> Value {
        let mut body = Map::new();
        body.insert("prompt".to_string(), json!(prompt));
        body.insert("size".to_string(), json!("auto"));
        body.insert("quality".to_string(), json!("auto"));
        body.insert("moderation".to_string(), json!("auto"));
        body.insert("background".to_string(), json!("opaque"));
        body.insert("output_compression".to_string(), json!(100));
        body.insert("output_format".to_string(), json!("png"));
        if let Some(encoded) = reference_b64 {
            body.insert("reference_images".to_string(), json!([encoded]));
        }
        Value::Object(body)
    }

    fn try_generate(&self, request: &ProviderRequest) -> Result<GeneratedArtifact> {
        let api_key = self.config.api_key.trim();
        if api_key.is_empty() {
            bail!("GPT Image 1 API key is not configured");
        }
        let style = self.styles.get_style(&request.style_id);
        let prompt = format!("{}{}", request.prompt, style.prompt_suffix);
        let reference_b64 = request
            .reference_image
            .as_deref()
            .filter(|path| reference::validate(path))
            .and_then(reference::encode_base64);
        let body = Self::build_request_body(&prompt, reference_b64);

        let response = self
            .http
            .post(&self.config.endpoint)
            .header("x-api-key", api_key)
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .timeout(request_timeout(self.config.timeout_s))
            .send()
            .with_context(|| format!("GPT Image 1 request failed ({})", self.config.endpoint))?;
        let image = response_image_or_error("GPT Image 1", response)?;
        self.store
            .write_bytes(ARTIFACT_PREFIX, &request.prompt, &image.bytes)
    }
}

impl ImageProvider for GptImageProvider {
    fn id(&self) -> ProviderId {
        ProviderId::GptImage1
    }

    fn generate(&self, request: &ProviderRequest) -> ProviderResult {
        ProviderResult::from_attempt(self.id(), self.try_generate(request))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use atelier_contracts::config::GptImageConfig;
    use atelier_contracts::styles::StyleRegistry;
    use serde_json::json;
    use wiremock::matchers::{header, method};
    use wiremock::{Mock, ResponseTemplate};

    use super::GptImageProvider;
    use crate::artifact::ArtifactStore;
    use crate::providers::{ImageProvider, ProviderRequest};
    use crate::test_support::{png_bytes, MockHttp};

    fn provider(endpoint: String, store: ArtifactStore) -> GptImageProvider {
        GptImageProvider::new(
            GptImageConfig {
                api_key: "gpt-key".to_string(),
                endpoint,
                timeout_s: 5.0,
            },
            Arc::new(StyleRegistry::bundled()),
            store,
        )
    }

    #[test]
    fn body_carries_fixed_rendering_options() {
        let body = GptImageProvider::build_request_body("a fox", None);
        assert_eq!(
            body,
            json!({
                "prompt": "a fox",
                "size": "auto",
                "quality": "auto",
                "moderation": "auto",
                "background": "opaque",
                "output_compression": 100,
                "output_format": "png",
            })
        );
        let referenced = GptImageProvider::build_request_body("a fox", Some("QUJD".to_string()));
        assert_eq!(referenced["reference_images"], json!(["QUJD"]));
    }

    #[test]
    fn styled_prompt_and_reference_are_sent() -> anyhow::Result<()> {
        let mock = MockHttp::start();
        let temp = tempfile::tempdir()?;
        let reference = temp.path().join("ref.webp");
        fs::write(&reference, b"RIFFxxxxWEBP")?;
        mock.mount(
            Mock::given(method("POST"))
                .and(header("x-api-key", "gpt-key"))
                .respond_with(ResponseTemplate::new(200).set_body_bytes(png_bytes())),
        );

        let provider = provider(mock.uri(), ArtifactStore::new(temp.path().join("out")));
        let artifact = provider
            .generate(&ProviderRequest {
                prompt: "a fox".to_string(),
                style_id: "pixel".to_string(),
                reference_image: Some(reference),
            })
            .into_option()
            .expect("gpt image artifact");
        assert!(artifact.filename.starts_with("gpt_image1_"));

        let sent = mock.received_json();
        assert_eq!(
            sent[0]["prompt"],
            json!("a fox, pixel art, 8-bit, retro game style, blocky pixels, limited color palette, nostalgic")
        );
        assert_eq!(sent[0]["reference_images"].as_array().map(Vec::len), Some(1));
        Ok(())
    }

    #[test]
    fn error_status_is_a_failure() -> anyhow::Result<()> {
        let mock = MockHttp::start();
        let temp = tempfile::tempdir()?;
        mock.mount(
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(401).set_body_string("invalid key")),
        );
        let provider = provider(mock.uri(), ArtifactStore::new(temp.path()));
        let result = provider.generate(&ProviderRequest {
            prompt: "a fox".to_string(),
            style_id: "disney".to_string(),
            reference_image: None,
        });
        assert!(!result.is_success());
        assert_eq!(fs::read_dir(temp.path())?.count(), 0);
        Ok(())
    }
}
