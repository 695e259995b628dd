use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use image::{DynamicImage, ImageFormat};

const PROMPT_FRAGMENT_CHARS: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedArtifact {
    pub path: PathBuf,
    pub filename: String,
}

impl GeneratedArtifact {
    pub fn public_url(&self) -> String {
        format!("/generated/{}", self.filename)
    }
}

/// Append-only home for generated images. Names never collide thanks to the
/// random suffix, so concurrent writers need no locking.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn allocate(&self, prefix: &str, prompt: &str) -> Result<GeneratedArtifact> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed to create {}", self.dir.display()))?;
        let filename = artifact_filename(prefix, prompt, Local::now());
        Ok(GeneratedArtifact {
            path: self.dir.join(&filename),
            filename,
        })
    }

    pub fn write_bytes(
        &self,
        prefix: &str,
        prompt: &str,
        bytes: &[u8],
    ) -> Result<GeneratedArtifact> {
        let artifact = self.allocate(prefix, prompt)?;
        fs::write(&artifact.path, bytes)
            .with_context(|| format!("failed to write {}", artifact.path.display()))?;
        Ok(artifact)
    }

    /// Decodes arbitrary image bytes and stores them re-encoded as PNG.
    pub fn write_as_png(
        &self,
        prefix: &str,
        prompt: &str,
        bytes: &[u8],
    ) -> Result<GeneratedArtifact> {
        let decoded =
            image::load_from_memory(bytes).context("response bytes are not a decodable image")?;
        self.write_image(prefix, prompt, &decoded)
    }

    pub fn write_image(
        &self,
        prefix: &str,
        prompt: &str,
        image: &DynamicImage,
    ) -> Result<GeneratedArtifact> {
        let artifact = self.allocate(prefix, prompt)?;
        image
            .save_with_format(&artifact.path, ImageFormat::Png)
            .with_context(|| format!("failed to save {}", artifact.path.display()))?;
        Ok(artifact)
    }
}

pub fn artifact_filename(prefix: &str, prompt: &str, now: DateTime<Local>) -> String {
    let stamp = now.format("%Y%m%d_%H%M%S");
    let unique: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(8)
        .collect();
    let fragment = safe_prompt_fragment(prompt);
    if fragment.is_empty() {
        format!("{prefix}_{stamp}_{unique}.png")
    } else {
        format!("{prefix}_{stamp}_{unique}_{fragment}.png")
    }
}

pub fn safe_prompt_fragment(prompt: &str) -> String {
    let kept: String = prompt
        .chars()
        .take(PROMPT_FRAGMENT_CHARS)
        .filter(|ch| ch.is_alphanumeric() || *ch == ' ')
        .collect();
    kept.trim().replace(' ', "_")
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use chrono::{Local, TimeZone};
    use image::{ImageFormat, Rgb, RgbImage};

    use super::{artifact_filename, safe_prompt_fragment, ArtifactStore};

    #[test]
    fn filename_encodes_time_suffix_and_prompt() {
        let now = Local
            .with_ymd_and_hms(2025, 9, 4, 15, 28, 26)
            .single()
            .expect("unambiguous local time");
        let name = artifact_filename("openrouter", "a cat in a hat", now);
        assert!(name.starts_with("openrouter_20250904_152826_"));
        assert!(name.ends_with("_a_cat_in_a_hat.png"));
        let unique = &name["openrouter_20250904_152826_".len()..][..8];
        assert!(unique.chars().all(|ch| ch.is_ascii_hexdigit()));
    }

    #[test]
    fn prompt_fragment_is_sanitized_and_bounded() {
        assert_eq!(
            safe_prompt_fragment("Hello, world! 123 and more text"),
            "Hello_world_123_an"
        );
        assert_eq!(safe_prompt_fragment("?!/\\"), "");
        assert_eq!(safe_prompt_fragment("水墨 山水"), "水墨_山水");
    }

    #[test]
    fn empty_fragment_is_omitted_from_filename() {
        let name = artifact_filename("demo", "***", Local::now());
        assert_eq!(name.matches('_').count(), 3);
        assert!(name.ends_with(".png"));
    }

    #[test]
    fn store_writes_png_under_its_directory() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = ArtifactStore::new(temp.path().join("generated"));
        let mut encoded = Cursor::new(Vec::new());
        RgbImage::from_pixel(4, 4, Rgb([10, 20, 30]))
            .write_to(&mut encoded, ImageFormat::Jpeg)?;

        let artifact = store.write_as_png("segmind", "tiny", encoded.get_ref())?;
        assert!(artifact.path.starts_with(store.dir()));
        assert_eq!(
            artifact.public_url(),
            format!("/generated/{}", artifact.filename)
        );
        let written = std::fs::read(&artifact.path)?;
        assert_eq!(image::guess_format(&written)?, ImageFormat::Png);

        assert!(store.write_as_png("segmind", "tiny", b"not an image").is_err());
        Ok(())
    }
}
