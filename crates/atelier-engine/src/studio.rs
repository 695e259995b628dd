use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use atelier_contracts::config::{clamped_duration, AppConfig};
use atelier_contracts::error::InputError;
use atelier_contracts::payloads::{
    AnalysisResponse, GenerateForm, GenerateResponse, StyleListing, VideoStatusResponse,
    VideoStyleListing, VideoSubmitForm, VideoSubmitResponse,
};
use atelier_contracts::providers::ModelSelector;
use atelier_contracts::reference::ReferenceImage;
use atelier_contracts::styles::StyleRegistry;
use atelier_contracts::video::{
    TaskStatus, VideoOptions, VideoTask, WaitOutcome, MAX_VIDEO_DURATION_S,
};

use crate::analysis::DocumentAnalyzer;
use crate::orchestrator::{GenerationRequest, Orchestrator};
use crate::video::VideoClient;

const DEFAULT_VIDEO_PROMPT: &str = "Generate a dynamic video";
const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(300);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Request boundary shared by the CLI and any embedding host. Every handler
/// returns a response payload; failures land in its `error` field.
pub struct Studio {
    styles: Arc<StyleRegistry>,
    orchestrator: Orchestrator,
    video: VideoClient,
    analyzer: DocumentAnalyzer,
    public_base_url: String,
}

impl Studio {
    pub fn from_config(config: AppConfig) -> Result<Self> {
        config.ensure_dirs()?;
        let styles = Arc::new(StyleRegistry::load(config.style_registry_path.as_deref())?);
        tracing::info!(
            styles = styles.styles().count(),
            version = styles.version(),
            generated_dir = %config.generated_dir.display(),
            "studio configured"
        );
        let orchestrator = Orchestrator::from_config(&config, styles.clone());
        Ok(Self::from_parts(
            styles,
            orchestrator,
            VideoClient::new(config.video),
            DocumentAnalyzer::new(config.analysis),
            config.public_base_url,
        ))
    }

    pub fn from_parts(
        styles: Arc<StyleRegistry>,
        orchestrator: Orchestrator,
        video: VideoClient,
        analyzer: DocumentAnalyzer,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            styles,
            orchestrator,
            video,
            analyzer,
            public_base_url: public_base_url.into(),
        }
    }

    pub fn generate(&self, form: &GenerateForm) -> GenerateResponse {
        let request = match self.generation_request(form) {
            Ok(request) => request,
            Err(err) => {
                tracing::warn!(error = %err, "generate rejected");
                return GenerateResponse::failure(err.to_string());
            }
        };
        match self.orchestrator.generate(&request) {
            Ok(outcome) => GenerateResponse {
                success: true,
                task_id: Some(uuid::Uuid::new_v4().to_string()),
                image_url: Some(outcome.artifact.public_url()),
                provider: Some(outcome.provider),
                fallback_reason: outcome.fallback_reason,
                error: None,
            },
            Err(err) => {
                tracing::error!(error = %err, "generation failed");
                GenerateResponse::failure(err.to_string())
            }
        }
    }

    fn generation_request(&self, form: &GenerateForm) -> Result<GenerationRequest, InputError> {
        let prompt = form.prompt.trim();
        if prompt.is_empty() {
            return Err(InputError::MissingPrompt);
        }
        let style_id = form.style.trim();
        if style_id.is_empty() {
            return Err(InputError::MissingStyle);
        }
        let selector = form
            .model
            .as_deref()
            .map(str::parse::<ModelSelector>)
            .transpose()?
            .unwrap_or_default();
        if let Some(path) = form.reference_image.as_deref() {
            ReferenceImage::inspect(path)
                .map_err(|err| InputError::InvalidReference(err.to_string()))?;
        }
        Ok(GenerationRequest {
            prompt: prompt.to_string(),
            style_id: style_id.to_string(),
            selector,
            reference_image: form.reference_image.clone(),
        })
    }

    pub fn submit_video(&self, form: &VideoSubmitForm) -> VideoSubmitResponse {
        let image_url = form.image_url.trim();
        if image_url.is_empty() {
            return VideoSubmitResponse::failure(InputError::MissingImageUrl.to_string());
        }
        if let Some(requested) = form.duration.filter(|value| *value > MAX_VIDEO_DURATION_S) {
            return VideoSubmitResponse::failure(
                InputError::InvalidDuration {
                    requested,
                    max: MAX_VIDEO_DURATION_S,
                }
                .to_string(),
            );
        }
        let image_url = self.absolute_url(image_url);
        let base_prompt = form
            .prompt
            .as_deref()
            .map(str::trim)
            .filter(|prompt| !prompt.is_empty())
            .unwrap_or(DEFAULT_VIDEO_PROMPT);
        let video_style = match form.video_style.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => self.styles.get_video_style(id),
            _ => self.styles.default_video_style(),
        };
        let prompt = format!("{base_prompt}{}", video_style.prompt_suffix);
        let options = self.video_options(form);

        match self.video.submit(&image_url, &prompt, &options) {
            Ok(task_id) => VideoSubmitResponse {
                success: true,
                task_id: Some(task_id),
                message: Some("Video generation task submitted".to_string()),
                estimated_time: Some(estimated_time(options.duration)),
                error: None,
            },
            Err(err) => VideoSubmitResponse::failure(err.to_string()),
        }
    }

    fn video_options(&self, form: &VideoSubmitForm) -> VideoOptions {
        let defaults = &self.video.config().defaults;
        VideoOptions {
            resolution: form
                .resolution
                .as_deref()
                .map(str::trim)
                .filter(|value| !value.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| defaults.resolution.clone()),
            duration: form
                .duration
                .filter(|value| *value > 0)
                .unwrap_or(defaults.duration),
            camera_fixed: form.camera_fixed.unwrap_or(defaults.camera_fixed),
            watermark: form.watermark.unwrap_or(defaults.watermark),
        }
    }

    fn absolute_url(&self, url: &str) -> String {
        if url.starts_with('/') {
            format!("{}{url}", self.public_base_url.trim_end_matches('/'))
        } else {
            url.to_string()
        }
    }

    pub fn video_status(&self, task_id: &str) -> VideoStatusResponse {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return VideoStatusResponse::failure(InputError::MissingTaskId.to_string());
        }
        match self.video.poll(task_id) {
            Ok(task) => status_response(task),
            Err(err) => VideoStatusResponse {
                task_id: Some(task_id.to_string()),
                ..VideoStatusResponse::failure(err.to_string())
            },
        }
    }

    /// Blocks until the task settles. `None` waits use the configured limits.
    pub fn await_video(
        &self,
        task_id: &str,
        max_wait: Option<Duration>,
        interval: Option<Duration>,
    ) -> VideoStatusResponse {
        let task_id = task_id.trim();
        if task_id.is_empty() {
            return VideoStatusResponse::failure(InputError::MissingTaskId.to_string());
        }
        let config = self.video.config();
        let max_wait = max_wait
            .or_else(|| clamped_duration(config.max_wait_s))
            .unwrap_or(DEFAULT_MAX_WAIT);
        let interval = interval
            .or_else(|| clamped_duration(config.poll_interval_s))
            .unwrap_or(DEFAULT_POLL_INTERVAL);
        match self.video.await_completion(task_id, max_wait, interval) {
            Ok(WaitOutcome::Completed(task)) => status_response(task),
            Ok(WaitOutcome::Failed { task_id, message }) => VideoStatusResponse {
                success: false,
                task_id: Some(task_id),
                status: Some(TaskStatus::Failed.to_string()),
                message: Some("Video generation failed".to_string()),
                error: Some(message),
                ..VideoStatusResponse::default()
            },
            Ok(WaitOutcome::TimedOut { task_id, waited }) => VideoStatusResponse {
                success: true,
                message: Some(format!(
                    "Still processing after {}s; query task {task_id} again to resume waiting",
                    waited.as_secs()
                )),
                task_id: Some(task_id),
                status: Some("timeout".to_string()),
                ..VideoStatusResponse::default()
            },
            Err(err) => VideoStatusResponse {
                task_id: Some(task_id.to_string()),
                ..VideoStatusResponse::failure(err.to_string())
            },
        }
    }

    pub fn analyze(&self, path: &Path) -> AnalysisResponse {
        match self.analyzer.analyze(path) {
            Ok(report) => AnalysisResponse {
                success: true,
                message: Some(if report.truncated {
                    "Analysis complete; the document was truncated".to_string()
                } else {
                    "Analysis complete".to_string()
                }),
                analysis: Some(report.text),
                source: Some(report.source.label()),
                error: None,
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "analysis rejected");
                AnalysisResponse::failure(err.to_string())
            }
        }
    }

    pub fn styles(&self) -> StyleListing {
        StyleListing {
            version: self.styles.version(),
            default_style: self.styles.default_style().id.clone(),
            styles: self.styles.styles().cloned().collect(),
        }
    }

    pub fn video_styles(&self) -> VideoStyleListing {
        VideoStyleListing {
            default_style: self.styles.default_video_style().id.clone(),
            styles: self.styles.video_styles().cloned().collect(),
        }
    }
}

fn estimated_time(duration_s: u32) -> String {
    let duration_s = u64::from(duration_s);
    format!("{}-{} minutes", duration_s * 2, duration_s * 3)
}

fn status_response(task: VideoTask) -> VideoStatusResponse {
    let message = match &task.status {
        TaskStatus::Completed if task.result_url.is_some() => "Video generation completed".to_string(),
        TaskStatus::Completed => "Video generation completed without a video URL".to_string(),
        TaskStatus::Failed => "Video generation failed".to_string(),
        TaskStatus::Pending => "Video task is queued".to_string(),
        other => format!("Video task is {other}"),
    };
    VideoStatusResponse {
        success: true,
        task_id: Some(task.task_id),
        status: Some(task.status.to_string()),
        video_url: task.result_url,
        message: Some(message),
        error: task.error_message,
        created_at: task.created_at,
        updated_at: task.updated_at,
    }
}
