use std::fs;

use anyhow::{anyhow, Context, Result};
use atelier_contracts::config::SegmindConfig;
use atelier_contracts::providers::ProviderId;
use atelier_contracts::reference::ReferenceImage;
use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::Client as HttpClient;

use super::{ImageProvider, ProviderRequest, ProviderResult};
use crate::artifact::{ArtifactStore, GeneratedArtifact};
use crate::http::{request_timeout, response_image_or_error};

const ARTIFACT_PREFIX: &str = "segmind";

/// Image-to-image realism transform. Only meaningful with a reference image.
pub struct SegmindProvider {
    config: SegmindConfig,
    store: ArtifactStore,
    http: HttpClient,
}

impl SegmindProvider {
    pub fn new(config: SegmindConfig, store: ArtifactStore) -> Self {
        Self {
            config,
            store,
            http: HttpClient::new(),
        }
    }

    pub(crate) fn transform_prompt(prompt: &str, style_id: &str) -> String {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return "make this a real photograph".to_string();
        }
        match style_id {
            "photography" => format!(
                "transform this into a professional high-quality photograph, {prompt}, DSLR \
                 camera quality, realistic lighting, sharp details"
            ),
            "disney" => format!(
                "transform this into a real-life version maintaining Disney charm, {prompt}, \
                 photorealistic but magical"
            ),
            "anime" => format!(
                "transform this anime/cartoon into a real photograph of actual person, {prompt}, \
                 realistic human features"
            ),
            "cyberpunk" => format!(
                "transform this into a realistic cyberpunk photograph, {prompt}, real neon \
                 lighting, urban photography"
            ),
            _ => format!("make this a realistic photograph, {prompt}, photorealistic, real world"),
        }
    }

    fn try_generate(&self, request: &ProviderRequest) -> Result<GeneratedArtifact> {
        let reference_path = request
            .reference_image
            .as_deref()
            .ok_or_else(|| anyhow!("Segmind requires a reference image"))?;
        let reference = ReferenceImage::inspect(reference_path)?;
        let bytes = fs::read(&reference.path)
            .with_context(|| format!("failed to read {}", reference.path.display()))?;
        let prompt = Self::transform_prompt(&request.prompt, &request.style_id);
        tracing::debug!(
            reference = %reference.path.display(),
            bytes = reference.byte_size,
            prompt = %prompt,
            "Segmind request"
        );

        let image_part = Part::bytes(bytes)
            .file_name(reference.file_name())
            .mime_str(reference.mime_type())
            .context("Segmind input image mime type is invalid")?;
        let form = Form::new()
            .text("prompt", prompt)
            .text("aspect_ratio", "match_input_image")
            .text("output_format", "png")
            .text("safety_tolerance", "2")
            .part("input_image", image_part);

        let response = self
            .http
            .post(&self.config.endpoint)
            .header("x-api-key", self.config.api_key.trim())
            .multipart(form)
            .timeout(request_timeout(self.config.timeout_s))
            .send()
            .with_context(|| format!("Segmind request failed ({})", self.config.endpoint))?;
        let image = response_image_or_error("Segmind", response)?;
        self.store
            .write_bytes(ARTIFACT_PREFIX, &request.prompt, &image.bytes)
    }
}

impl ImageProvider for SegmindProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Segmind
    }

    fn generate(&self, request: &ProviderRequest) -> ProviderResult {
        ProviderResult::from_attempt(self.id(), self.try_generate(request))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use atelier_contracts::config::SegmindConfig;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, ResponseTemplate};

    use super::SegmindProvider;
    use crate::artifact::ArtifactStore;
    use crate::providers::{ImageProvider, ProviderRequest, ProviderResult};
    use crate::test_support::{png_bytes, MockHttp};

    fn provider(endpoint: String, store: ArtifactStore) -> SegmindProvider {
        SegmindProvider::new(
            SegmindConfig {
                api_key: "seg-key".to_string(),
                endpoint,
                timeout_s: 5.0,
            },
            store,
        )
    }

    #[test]
    fn prompts_are_rewritten_per_style() {
        assert_eq!(
            SegmindProvider::transform_prompt("a knight", "anime"),
            "transform this anime/cartoon into a real photograph of actual person, a knight, \
             realistic human features"
        );
        assert_eq!(
            SegmindProvider::transform_prompt("a knight", "pixel"),
            "make this a realistic photograph, a knight, photorealistic, real world"
        );
        assert_eq!(
            SegmindProvider::transform_prompt("   ", "disney"),
            "make this a real photograph"
        );
    }

    #[test]
    fn missing_reference_fails_without_request() -> anyhow::Result<()> {
        let mock = MockHttp::start();
        let temp = tempfile::tempdir()?;
        let provider = provider(format!("{}/v1/kontext", mock.uri()), ArtifactStore::new(temp.path()));
        let result = provider.generate(&ProviderRequest {
            prompt: "portrait".to_string(),
            style_id: "realistic_transform".to_string(),
            reference_image: None,
        });
        assert!(matches!(result, ProviderResult::Failure(ref reason) if reason.contains("reference")));
        assert!(mock.received_requests().is_empty());
        Ok(())
    }

    #[test]
    fn binary_image_response_is_written() -> anyhow::Result<()> {
        let mock = MockHttp::start();
        let temp = tempfile::tempdir()?;
        let reference = temp.path().join("toy.png");
        fs::write(&reference, png_bytes())?;
        mock.mount(
            Mock::given(method("POST"))
                .and(path("/v1/kontext"))
                .and(header("x-api-key", "seg-key"))
                .respond_with(
                    ResponseTemplate::new(200)
                        .insert_header("content-type", "image/png")
                        .set_body_bytes(png_bytes()),
                ),
        );

        let store = ArtifactStore::new(temp.path().join("generated"));
        let provider = provider(format!("{}/v1/kontext", mock.uri()), store);
        let artifact = provider
            .generate(&ProviderRequest {
                prompt: "toy robot".to_string(),
                style_id: "realistic_transform".to_string(),
                reference_image: Some(reference),
            })
            .into_option()
            .expect("segmind artifact");
        assert!(artifact.filename.starts_with("segmind_"));
        assert_eq!(fs::read(&artifact.path)?, png_bytes());

        let requests = mock.received_requests();
        assert_eq!(requests.len(), 1);
        let body = String::from_utf8_lossy(&requests[0].body);
        assert!(body.contains("name=\"input_image\""));
        assert!(body.contains("match_input_image"));
        assert!(body.contains("make this a realistic photograph, toy robot"));
        Ok(())
    }

    #[test]
    fn non_image_body_is_a_failure() -> anyhow::Result<()> {
        let mock = MockHttp::start();
        let temp = tempfile::tempdir()?;
        let reference = temp.path().join("toy.jpg");
        fs::write(&reference, png_bytes())?;
        mock.mount(
            Mock::given(method("POST"))
                .respond_with(ResponseTemplate::new(200).set_body_string("{\"status\":\"queued\"}")),
        );

        let store = ArtifactStore::new(temp.path().join("generated"));
        let provider = provider(format!("{}/v1/kontext", mock.uri()), store);
        let result = provider.generate(&ProviderRequest {
            prompt: "toy robot".to_string(),
            style_id: "photography".to_string(),
            reference_image: Some(reference),
        });
        assert!(matches!(result, ProviderResult::Failure(ref reason) if reason.contains("non-image")));
        assert!(!temp.path().join("generated").exists());
        Ok(())
    }
}
