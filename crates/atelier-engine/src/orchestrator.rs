use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;

use atelier_contracts::config::AppConfig;
use atelier_contracts::error::{GenerationError, InputError};
use atelier_contracts::providers::{ModelSelector, ProviderId};
use atelier_contracts::styles::StyleRegistry;

use crate::artifact::{ArtifactStore, GeneratedArtifact};
use crate::http::truncate_text;
use crate::providers::{
    GptImageProvider, ImageProvider, ImageProviderRegistry, LocalRenderer, OpenRouterProvider,
    ProviderRequest, ProviderResult, SegmindProvider, SimulatedGeminiProvider,
};

const REALISM_STYLE: &str = "realistic_transform";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub prompt: String,
    pub style_id: String,
    pub selector: ModelSelector,
    pub reference_image: Option<PathBuf>,
}

impl GenerationRequest {
    fn has_reference(&self) -> bool {
        self.reference_image.is_some()
    }

    fn provider_request(&self) -> ProviderRequest {
        ProviderRequest {
            prompt: self.prompt.clone(),
            style_id: self.style_id.clone(),
            reference_image: self.reference_image.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderAttempt {
    pub provider: ProviderId,
    pub succeeded: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationOutcome {
    pub artifact: GeneratedArtifact,
    pub provider: ProviderId,
    pub attempts: Vec<ProviderAttempt>,
    pub fallback_reason: Option<String>,
}

/// Routes a generation request through an ordered provider chain that always
/// ends with the local renderer.
pub struct Orchestrator {
    registry: ImageProviderRegistry,
}

impl Orchestrator {
    pub fn new(registry: ImageProviderRegistry) -> Self {
        Self { registry }
    }

    pub fn from_config(config: &AppConfig, styles: Arc<StyleRegistry>) -> Self {
        Self::new(default_provider_registry(config, styles))
    }

    pub fn plan(&self, request: &GenerationRequest) -> Vec<ProviderId> {
        let mut chain = match request.selector {
            ModelSelector::Auto if request.style_id == REALISM_STYLE && request.has_reference() => {
                vec![ProviderId::Segmind, ProviderId::OpenRouter]
            }
            ModelSelector::Auto => vec![ProviderId::OpenRouter],
            ModelSelector::Provider(id) if id.requires_reference() && !request.has_reference() => {
                vec![ProviderId::Gemini]
            }
            ModelSelector::Provider(id) => vec![id],
        };
        if chain.last() != Some(&ProviderId::Local) {
            chain.push(ProviderId::Local);
        }
        chain
    }

    pub fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome, GenerationError> {
        if request.prompt.trim().is_empty() {
            return Err(InputError::MissingPrompt.into());
        }
        if request.style_id.trim().is_empty() {
            return Err(InputError::MissingStyle.into());
        }

        let chain = self.plan(request);
        tracing::info!(
            selector = %request.selector,
            style = %request.style_id,
            chain = ?chain,
            "generation planned"
        );
        let provider_request = request.provider_request();
        let mut attempts = Vec::with_capacity(chain.len());
        let mut fallback_reason: Option<String> = None;

        for provider_id in chain {
            let result = match self.registry.get(provider_id) {
                Some(provider) => run_guarded(provider, &provider_request),
                None => ProviderResult::Failure(format!("{provider_id} is not configured")),
            };
            match result {
                ProviderResult::Success(artifact) => {
                    attempts.push(ProviderAttempt {
                        provider: provider_id,
                        succeeded: true,
                        reason: None,
                    });
                    return Ok(GenerationOutcome {
                        artifact,
                        provider: provider_id,
                        attempts,
                        fallback_reason,
                    });
                }
                ProviderResult::Failure(reason) => {
                    if provider_id == ProviderId::Local {
                        tracing::error!(error = %reason, "local renderer failed");
                        return Err(GenerationError::Render(reason));
                    }
                    fallback_reason = append_fallback_reason(
                        fallback_reason,
                        format!("{provider_id} failed: {reason}."),
                    );
                    attempts.push(ProviderAttempt {
                        provider: provider_id,
                        succeeded: false,
                        reason: Some(reason),
                    });
                }
            }
        }
        Err(GenerationError::Render(
            "provider chain ended without the local renderer".to_string(),
        ))
    }
}

pub fn default_provider_registry(
    config: &AppConfig,
    styles: Arc<StyleRegistry>,
) -> ImageProviderRegistry {
    let store = ArtifactStore::new(config.generated_dir.clone());
    let renderer = LocalRenderer::new(store.clone(), styles.clone());
    let mut registry = ImageProviderRegistry::new();
    registry.register(OpenRouterProvider::new(
        config.openrouter.clone(),
        styles.clone(),
        store.clone(),
    ));
    registry.register(SegmindProvider::new(config.segmind.clone(), store.clone()));
    registry.register(GptImageProvider::new(
        config.gpt_image.clone(),
        styles,
        store,
    ));
    registry.register(SimulatedGeminiProvider::new(renderer.clone()));
    registry.register(renderer);
    registry
}

fn run_guarded(provider: &dyn ImageProvider, request: &ProviderRequest) -> ProviderResult {
    match catch_unwind(AssertUnwindSafe(|| provider.generate(request))) {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(provider = %provider.id(), panic = %message, "provider panicked");
            ProviderResult::Failure(format!("provider panicked: {message}"))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        return truncate_text(text, 240);
    }
    if let Some(text) = payload.downcast_ref::<String>() {
        return truncate_text(text, 240);
    }
    "unknown panic".to_string()
}

fn append_fallback_reason(existing: Option<String>, reason: String) -> Option<String> {
    if reason.trim().is_empty() {
        return existing;
    }
    match existing {
        Some(previous) if !previous.trim().is_empty() => Some(format!("{previous} {reason}")),
        _ => Some(reason),
    }
}
