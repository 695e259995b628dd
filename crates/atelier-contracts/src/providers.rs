use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::InputError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    #[serde(rename = "openrouter")]
    OpenRouter,
    Segmind,
    #[serde(rename = "gpt_image1")]
    GptImage1,
    Gemini,
    #[serde(rename = "fallback")]
    Local,
}

impl ProviderId {
    pub const ALL: [ProviderId; 5] = [
        ProviderId::OpenRouter,
        ProviderId::Segmind,
        ProviderId::GptImage1,
        ProviderId::Gemini,
        ProviderId::Local,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderId::OpenRouter => "openrouter",
            ProviderId::Segmind => "segmind",
            ProviderId::GptImage1 => "gpt_image1",
            ProviderId::Gemini => "gemini",
            ProviderId::Local => "fallback",
        }
    }

    /// Whether the adapter cannot run at all without a reference image.
    pub fn requires_reference(self) -> bool {
        matches!(self, ProviderId::Segmind)
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderId {
    type Err = InputError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        ProviderId::ALL
            .into_iter()
            .find(|id| id.as_str() == normalized)
            .ok_or_else(|| InputError::UnknownModel(raw.trim().to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelSelector {
    #[default]
    Auto,
    Provider(ProviderId),
}

impl fmt::Display for ModelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSelector::Auto => f.write_str("auto"),
            ModelSelector::Provider(id) => id.fmt(f),
        }
    }
}

impl FromStr for ModelSelector {
    type Err = InputError;

    /// An empty selector means `auto`.
    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
            return Ok(ModelSelector::Auto);
        }
        trimmed.parse().map(ModelSelector::Provider)
    }
}

#[cfg(test)]
mod tests {
    use crate::error::InputError;

    use super::{ModelSelector, ProviderId};

    #[test]
    fn selectors_parse_from_wire_names() {
        assert_eq!("auto".parse::<ModelSelector>(), Ok(ModelSelector::Auto));
        assert_eq!("".parse::<ModelSelector>(), Ok(ModelSelector::Auto));
        assert_eq!(
            " Segmind ".parse::<ModelSelector>(),
            Ok(ModelSelector::Provider(ProviderId::Segmind))
        );
        assert_eq!(
            "gpt_image1".parse::<ModelSelector>(),
            Ok(ModelSelector::Provider(ProviderId::GptImage1))
        );
        assert_eq!(
            "fallback".parse::<ModelSelector>(),
            Ok(ModelSelector::Provider(ProviderId::Local))
        );
    }

    #[test]
    fn unknown_selector_is_an_input_error() {
        assert_eq!(
            "midjourney".parse::<ModelSelector>(),
            Err(InputError::UnknownModel("midjourney".to_string()))
        );
    }

    #[test]
    fn provider_ids_round_trip_through_display() {
        for id in ProviderId::ALL {
            assert_eq!(id.to_string().parse::<ProviderId>(), Ok(id));
        }
        for (id, wire) in [
            (ProviderId::GptImage1, "\"gpt_image1\""),
            (ProviderId::OpenRouter, "\"openrouter\""),
            (ProviderId::Local, "\"fallback\""),
        ] {
            assert_eq!(serde_json::to_string(&id).ok().as_deref(), Some(wire));
        }
    }
}
