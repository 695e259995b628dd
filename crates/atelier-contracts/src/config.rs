use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

use crate::video::{VideoOptions, MAX_VIDEO_DURATION_S};

const DEV_OPENROUTER_KEY: &str = "dev-openrouter-key";
const DEV_SEGMIND_KEY: &str = "dev-segmind-key";
const DEV_ARK_KEY: &str = "dev-ark-key";

/// Longest timeout or wait accepted from the environment or the command line.
pub const MAX_WAIT_SECONDS: f64 = 86_400.0;

/// Converts seconds to a `Duration`, clamped to [`MAX_WAIT_SECONDS`].
/// Non-finite and non-positive values give `None`.
pub fn clamped_duration(seconds: f64) -> Option<Duration> {
    (seconds.is_finite() && seconds > 0.0)
        .then(|| Duration::from_secs_f64(seconds.min(MAX_WAIT_SECONDS)))
}

#[derive(Debug, Clone, PartialEq)]
pub struct OpenRouterConfig {
    pub api_key: String,
    pub base_url: String,
    pub http_referer: String,
    pub x_title: String,
    pub timeout_s: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmindConfig {
    pub api_key: String,
    pub endpoint: String,
    pub timeout_s: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GptImageConfig {
    pub api_key: String,
    pub endpoint: String,
    pub timeout_s: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub defaults: VideoOptions,
    pub request_timeout_s: f64,
    pub max_wait_s: f64,
    pub poll_interval_s: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisConfig {
    pub api_key: String,
    pub endpoint: String,
    pub text_models: Vec<String>,
    pub vision_models: Vec<String>,
    pub timeout_s: f64,
    pub max_document_chars: usize,
}

/// Process-wide settings, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub upload_dir: PathBuf,
    pub generated_dir: PathBuf,
    pub public_base_url: String,
    pub style_registry_path: Option<PathBuf>,
    pub openrouter: OpenRouterConfig,
    pub segmind: SegmindConfig,
    pub gpt_image: GptImageConfig,
    pub video: VideoConfig,
    pub analysis: AnalysisConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |keys: &[&str]| {
            keys.iter().find_map(|key| {
                lookup(key)
                    .map(|value| value.trim().to_string())
                    .filter(|value| !value.is_empty())
            })
        };
        let url = |keys: &[&str], default: &str| {
            get(keys)
                .map(|value| value.trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let seconds = |keys: &[&str], default: f64| {
            get(keys)
                .and_then(|value| value.parse::<f64>().ok())
                .filter(|value| value.is_finite() && *value > 0.0)
                .map(|value| value.min(MAX_WAIT_SECONDS))
                .unwrap_or(default)
        };
        let models = |keys: &[&str], default: &[&str]| {
            let parsed = get(keys)
                .map(|value| {
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|item| !item.is_empty())
                        .map(str::to_string)
                        .collect::<Vec<String>>()
                })
                .unwrap_or_default();
            if parsed.is_empty() {
                default
                    .iter()
                    .map(|item| (*item).to_string())
                    .collect::<Vec<String>>()
            } else {
                parsed
            }
        };
        let flag = |keys: &[&str], default: bool| {
            get(keys)
                .map(|value| {
                    matches!(
                        value.to_ascii_lowercase().as_str(),
                        "1" | "true" | "yes" | "on"
                    )
                })
                .unwrap_or(default)
        };

        let segmind_key =
            get(&["SEGMIND_API_KEY"]).unwrap_or_else(|| DEV_SEGMIND_KEY.to_string());
        let ark_key = get(&["ARK_API_KEY"]).unwrap_or_else(|| DEV_ARK_KEY.to_string());
        let video_defaults = VideoOptions {
            resolution: get(&["VIDEO_DEFAULT_RESOLUTION"]).unwrap_or_else(|| "1080p".to_string()),
            duration: get(&["VIDEO_DEFAULT_DURATION"])
                .and_then(|value| value.parse::<u32>().ok())
                .filter(|value| (1..=MAX_VIDEO_DURATION_S).contains(value))
                .unwrap_or(5),
            camera_fixed: flag(&["VIDEO_CAMERA_FIXED"], false),
            watermark: flag(&["VIDEO_WATERMARK"], true),
        };

        Self {
            upload_dir: PathBuf::from(
                get(&["ATELIER_UPLOAD_DIR"]).unwrap_or_else(|| "uploads".to_string()),
            ),
            generated_dir: PathBuf::from(
                get(&["ATELIER_GENERATED_DIR"]).unwrap_or_else(|| "generated".to_string()),
            ),
            public_base_url: url(&["ATELIER_PUBLIC_BASE_URL"], "http://localhost:4000"),
            style_registry_path: get(&["ATELIER_STYLE_REGISTRY"]).map(PathBuf::from),
            openrouter: OpenRouterConfig {
                api_key: get(&["OPENROUTER_API_KEY"])
                    .unwrap_or_else(|| DEV_OPENROUTER_KEY.to_string()),
                base_url: url(
                    &["OPENROUTER_API_BASE", "OPENROUTER_BASE_URL"],
                    "https://openrouter.ai/api/v1",
                ),
                http_referer: get(&["OPENROUTER_HTTP_REFERER"])
                    .unwrap_or_else(|| "http://localhost:4000".to_string()),
                x_title: get(&["OPENROUTER_X_TITLE"])
                    .unwrap_or_else(|| "AI Image Generation Website".to_string()),
                timeout_s: seconds(&["OPENROUTER_TIMEOUT"], 60.0),
            },
            segmind: SegmindConfig {
                api_key: segmind_key.clone(),
                endpoint: url(
                    &["SEGMIND_API_URL"],
                    "https://api.segmind.com/v1/flux-kontext-pro",
                ),
                timeout_s: seconds(&["SEGMIND_TIMEOUT"], 120.0),
            },
            gpt_image: GptImageConfig {
                api_key: get(&["GPT_IMAGE1_API_KEY"]).unwrap_or(segmind_key),
                endpoint: url(&["GPT_IMAGE1_API_URL"], "https://api.segmind.com/v1/gpt-image-1"),
                timeout_s: seconds(&["GPT_IMAGE1_TIMEOUT"], 120.0),
            },
            video: VideoConfig {
                api_key: ark_key.clone(),
                base_url: url(
                    &["ARK_VIDEO_BASE_URL"],
                    "https://ark.cn-beijing.volces.com/api/v3/contents/generations/tasks",
                ),
                model: get(&["ARK_VIDEO_MODEL"])
                    .unwrap_or_else(|| "doubao-seedance-1-0-lite-i2v-250428".to_string()),
                defaults: video_defaults,
                request_timeout_s: seconds(&["ARK_VIDEO_TIMEOUT"], 30.0),
                max_wait_s: seconds(&["VIDEO_MAX_WAIT"], 300.0),
                poll_interval_s: seconds(&["VIDEO_POLL_INTERVAL"], 10.0),
            },
            analysis: AnalysisConfig {
                api_key: get(&["DOUBAO_API_KEY"]).unwrap_or(ark_key),
                endpoint: url(
                    &["DOUBAO_API_URL"],
                    "https://ark.cn-beijing.volces.com/api/v3/chat/completions",
                ),
                text_models: models(
                    &["DOUBAO_TEXT_MODELS"],
                    &["deepseek-v3-1-250821", "doubao-1-5-pro-32k-250115"],
                ),
                vision_models: models(
                    &["DOUBAO_VISION_MODELS"],
                    &["doubao-1-5-vision-pro-32k-250115"],
                ),
                timeout_s: seconds(&["DOUBAO_TIMEOUT"], 60.0),
                max_document_chars: 8000,
            },
        }
    }

    /// Creates the upload and generated-output directories.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [&self.upload_dir, &self.generated_dir] {
            fs::create_dir_all(dir)
                .with_context(|| format!("failed to create {}", dir.display()))?;
        }
        Ok(())
    }
}
