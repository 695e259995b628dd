pub mod analysis;
pub mod artifact;
pub mod orchestrator;
pub mod providers;
pub mod studio;
pub mod video;

mod http;

pub use analysis::{AnalysisReport, AnalysisSource, DocumentAnalyzer};
pub use artifact::{ArtifactStore, GeneratedArtifact};
pub use orchestrator::{GenerationOutcome, GenerationRequest, Orchestrator, ProviderAttempt};
pub use studio::Studio;
pub use video::VideoClient;
