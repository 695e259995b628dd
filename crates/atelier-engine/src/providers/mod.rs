use std::collections::BTreeMap;
use std::path::PathBuf;

use atelier_contracts::providers::ProviderId;

use crate::artifact::GeneratedArtifact;
use crate::http::error_chain_text;

mod gemini;
mod gpt_image;
mod local;
mod openrouter;
mod segmind;

pub use gemini::{SimulatedGeminiProvider, GEMINI_PROMPT_MARKER};
pub use gpt_image::GptImageProvider;
pub use local::{render_placeholder, LocalRenderer, PLACEHOLDER_SIZE};
pub use openrouter::OpenRouterProvider;
pub use segmind::SegmindProvider;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderRequest {
    pub prompt: String,
    pub style_id: String,
    pub reference_image: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResult {
    Success(GeneratedArtifact),
    Failure(String),
}

impl ProviderResult {
    /// Converts an adapter's internal result, logging the failure reason.
    pub fn from_attempt(provider: ProviderId, attempt: anyhow::Result<GeneratedArtifact>) -> Self {
        match attempt {
            Ok(artifact) => {
                tracing::info!(
                    provider = %provider,
                    artifact = %artifact.path.display(),
                    "provider produced artifact"
                );
                ProviderResult::Success(artifact)
            }
            Err(err) => {
                let reason = error_chain_text(&err, 480);
                tracing::warn!(provider = %provider, error = %reason, "provider attempt failed");
                ProviderResult::Failure(reason)
            }
        }
    }

    pub fn artifact(&self) -> Option<&GeneratedArtifact> {
        match self {
            ProviderResult::Success(artifact) => Some(artifact),
            ProviderResult::Failure(_) => None,
        }
    }

    pub fn into_option(self) -> Option<GeneratedArtifact> {
        match self {
            ProviderResult::Success(artifact) => Some(artifact),
            ProviderResult::Failure(_) => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProviderResult::Success(_))
    }
}

pub trait ImageProvider: Send + Sync {
    fn id(&self) -> ProviderId;
    fn generate(&self, request: &ProviderRequest) -> ProviderResult;
}

#[derive(Default)]
pub struct ImageProviderRegistry {
    providers: BTreeMap<ProviderId, Box<dyn ImageProvider>>,
}

impl ImageProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<P: ImageProvider + 'static>(&mut self, provider: P) {
        self.providers.insert(provider.id(), Box::new(provider));
    }

    pub fn get(&self, id: ProviderId) -> Option<&dyn ImageProvider> {
        self.providers.get(&id).map(|provider| provider.as_ref())
    }

    pub fn ids(&self) -> Vec<ProviderId> {
        self.providers.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use atelier_contracts::providers::ProviderId;

    use crate::artifact::GeneratedArtifact;

    use super::{ImageProvider, ImageProviderRegistry, ProviderRequest, ProviderResult};

    struct Fixed(ProviderId);

    impl ImageProvider for Fixed {
        fn id(&self) -> ProviderId {
            self.0
        }

        fn generate(&self, _request: &ProviderRequest) -> ProviderResult {
            ProviderResult::Failure("offline".to_string())
        }
    }

    #[test]
    fn registry_keys_adapters_by_id() {
        let mut registry = ImageProviderRegistry::new();
        registry.register(Fixed(ProviderId::Segmind));
        registry.register(Fixed(ProviderId::OpenRouter));
        assert_eq!(
            registry.ids(),
            vec![ProviderId::OpenRouter, ProviderId::Segmind]
        );
        assert!(registry.get(ProviderId::Gemini).is_none());
        assert_eq!(
            registry.get(ProviderId::Segmind).map(|provider| provider.id()),
            Some(ProviderId::Segmind)
        );
    }

    #[test]
    fn failed_attempt_keeps_error_chain() {
        let result = ProviderResult::from_attempt(
            ProviderId::GptImage1,
            Err(anyhow::anyhow!("status 503")),
        );
        assert_eq!(result, ProviderResult::Failure("status 503".to_string()));
        assert!(result.into_option().is_none());

        let artifact = GeneratedArtifact {
            path: PathBuf::from("generated/demo.png"),
            filename: "demo.png".to_string(),
        };
        let ok = ProviderResult::from_attempt(ProviderId::Local, Ok(artifact.clone()));
        assert!(ok.is_success());
        assert_eq!(ok.artifact(), Some(&artifact));
    }
}
