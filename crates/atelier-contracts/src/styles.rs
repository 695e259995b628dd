use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

const BUNDLED_STYLES_JSON: &str = include_str!("../resources/styles.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleTheme {
    pub background: String,
    pub text: String,
    pub accent: String,
}

impl StyleTheme {
    pub fn background_rgb(&self) -> [u8; 3] {
        parse_hex_color(&self.background).unwrap_or([200, 200, 200])
    }

    pub fn text_rgb(&self) -> [u8; 3] {
        parse_hex_color(&self.text).unwrap_or([40, 40, 40])
    }

    pub fn accent_rgb(&self) -> [u8; 3] {
        parse_hex_color(&self.accent).unwrap_or([120, 120, 120])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleConfig {
    #[serde(default)]
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub prompt_suffix: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default)]
    pub ai_description: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<StyleTheme>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoStyle {
    #[serde(default)]
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub description: String,
    pub prompt_suffix: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MultiModelTable {
    default_model: String,
    models: IndexMap<String, String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RegistryDocument {
    version: u32,
    default_style: String,
    default_video_style: String,
    multi_model: MultiModelTable,
    styles: IndexMap<String, StyleConfig>,
    video_styles: IndexMap<String, VideoStyle>,
}

/// Versioned style data shared by every adapter.
///
/// Lookups never fail: an unknown style id resolves to the registry's default
/// style, and an unknown video style resolves to the default video style.
/// Whether a request carried a style at all is checked at the request
/// boundary, not here.
#[derive(Debug, Clone)]
pub struct StyleRegistry {
    version: u32,
    default_style: usize,
    default_video_style: usize,
    styles: IndexMap<String, StyleConfig>,
    video_styles: IndexMap<String, VideoStyle>,
    multi_model: MultiModelTable,
}

impl StyleRegistry {
    pub fn bundled() -> Self {
        Self::from_json(BUNDLED_STYLES_JSON).expect("bundled style registry is valid")
    }

    /// Loads the registry from `path` when given, otherwise the bundled copy.
    pub fn load(override_path: Option<&Path>) -> Result<Self> {
        match override_path {
            Some(path) => Self::from_path(path),
            None => Ok(Self::bundled()),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading style registry {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("invalid style registry {}", path.display()))
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let document: RegistryDocument =
            serde_json::from_str(raw).context("style registry is not valid JSON")?;
        let RegistryDocument {
            version,
            default_style,
            default_video_style,
            multi_model,
            mut styles,
            mut video_styles,
        } = document;

        for (id, style) in styles.iter_mut() {
            style.id = id.clone();
        }
        for (id, style) in video_styles.iter_mut() {
            style.id = id.clone();
        }
        let Some(default_style) = styles.get_index_of(&default_style) else {
            bail!("default style '{default_style}' is not defined");
        };
        let Some(default_video_style) = video_styles.get_index_of(&default_video_style) else {
            bail!("default video style '{default_video_style}' is not defined");
        };
        if !multi_model.models.contains_key(&multi_model.default_model) {
            bail!(
                "default multi-model key '{}' is not defined",
                multi_model.default_model
            );
        }

        Ok(Self {
            version,
            default_style,
            default_video_style,
            styles,
            video_styles,
            multi_model,
        })
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    pub fn get_style(&self, id: &str) -> &StyleConfig {
        self.styles
            .get(id.trim())
            .unwrap_or_else(|| self.default_style())
    }

    pub fn default_style(&self) -> &StyleConfig {
        &self.styles[self.default_style]
    }

    pub fn contains(&self, id: &str) -> bool {
        self.styles.contains_key(id.trim())
    }

    pub fn styles(&self) -> impl Iterator<Item = &StyleConfig> {
        self.styles.values()
    }

    pub fn get_video_style(&self, id: &str) -> &VideoStyle {
        self.video_styles
            .get(id.trim())
            .unwrap_or_else(|| self.default_video_style())
    }

    pub fn default_video_style(&self) -> &VideoStyle {
        &self.video_styles[self.default_video_style]
    }

    pub fn video_styles(&self) -> impl Iterator<Item = &VideoStyle> {
        self.video_styles.values()
    }

    /// Model id for the multi-model adapter. A style's preferred key that is
    /// missing from the model table resolves to the default model.
    pub fn resolve_multi_model(&self, style_id: &str) -> &str {
        self.styles
            .get(style_id.trim())
            .and_then(|style| style.preferred_model.as_deref())
            .and_then(|key| self.multi_model.models.get(key))
            .map(String::as_str)
            .unwrap_or_else(|| self.default_multi_model())
    }

    pub fn default_multi_model(&self) -> &str {
        self.multi_model
            .models
            .get(&self.multi_model.default_model)
            .map(String::as_str)
            .unwrap_or_default()
    }
}

impl Default for StyleRegistry {
    fn default() -> Self {
        Self::bundled()
    }
}

pub fn parse_hex_color(raw: &str) -> Option<[u8; 3]> {
    let hex = raw.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return None;
    }
    let channel = |idx: usize| u8::from_str_radix(&hex[idx..idx + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}
