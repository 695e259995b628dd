use atelier_contracts::providers::ProviderId;

use super::{ImageProvider, LocalRenderer, ProviderRequest, ProviderResult};

pub const GEMINI_PROMPT_MARKER: &str = "[Gemini simulated] ";

/// Stand-in for a direct Gemini integration. Draws locally and never touches
/// the network.
#[derive(Clone)]
pub struct SimulatedGeminiProvider {
    renderer: LocalRenderer,
}

impl SimulatedGeminiProvider {
    pub fn new(renderer: LocalRenderer) -> Self {
        Self { renderer }
    }
}

impl ImageProvider for SimulatedGeminiProvider {
    fn id(&self) -> ProviderId {
        ProviderId::Gemini
    }

    fn generate(&self, request: &ProviderRequest) -> ProviderResult {
        let marked = format!("{GEMINI_PROMPT_MARKER}{}", request.prompt);
        ProviderResult::from_attempt(
            self.id(),
            self.renderer.render(&marked, &request.style_id),
        )
    }
}
