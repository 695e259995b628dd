use std::sync::Arc;

use anyhow::Result;
use atelier_contracts::providers::ProviderId;
use atelier_contracts::styles::{StyleConfig, StyleRegistry, StyleTheme};
use image::{DynamicImage, Rgb, RgbImage};
use sha2::{Digest, Sha256};

use super::{ImageProvider, ProviderRequest, ProviderResult};
use crate::artifact::{ArtifactStore, GeneratedArtifact};

pub const PLACEHOLDER_SIZE: u32 = 512;
const ARTIFACT_PREFIX: &str = "demo";

/// Last link of every fallback chain. Needs no network; the only way it can
/// fail is a filesystem error while saving.
#[derive(Debug, Clone)]
pub struct LocalRenderer {
    store: ArtifactStore,
    styles: Arc<StyleRegistry>,
}

impl LocalRenderer {
    pub fn new(store: ArtifactStore, styles: Arc<StyleRegistry>) -> Self {
        Self { store, styles }
    }

    pub fn render(&self, prompt: &str, style_id: &str) -> Result<GeneratedArtifact> {
        let style = self.styles.get_style(style_id);
        let theme = style
            .theme
            .clone()
            .or_else(|| self.styles.default_style().theme.clone())
            .unwrap_or_else(default_theme);
        let canvas = render_placeholder(prompt, style, &theme, PLACEHOLDER_SIZE);
        self.store
            .write_image(ARTIFACT_PREFIX, prompt, &DynamicImage::ImageRgb8(canvas))
    }
}

impl ImageProvider for LocalRenderer {
    fn id(&self) -> ProviderId {
        ProviderId::Local
    }

    fn generate(&self, request: &ProviderRequest) -> ProviderResult {
        ProviderResult::from_attempt(self.id(), self.render(&request.prompt, &request.style_id))
    }
}

fn default_theme() -> StyleTheme {
    StyleTheme {
        background: "#FFB6C1".to_string(),
        text: "#8B4513".to_string(),
        accent: "#FF69B4".to_string(),
    }
}

/// Draws the placeholder. Pixels depend only on prompt, style, and size.
pub fn render_placeholder(
    prompt: &str,
    style: &StyleConfig,
    theme: &StyleTheme,
    size: u32,
) -> RgbImage {
    let background = theme.background_rgb();
    let text = theme.text_rgb();
    let accent = theme.accent_rgb();
    let digest = prompt_digest(prompt);
    let size = size.max(64);

    let mut canvas = RgbImage::from_fn(size, size, |_, y| {
        let t = y as f32 / size as f32;
        Rgb(blend(background, accent, t * 0.25))
    });

    match style.id.as_str() {
        "pixel" => draw_pixel_grid(&mut canvas, accent, text, &digest),
        "cyberpunk" => draw_scanlines(&mut canvas, accent),
        "minimalist" | "flat" => draw_thirds_frame(&mut canvas, text),
        "photography" | "realistic_transform" => {
            draw_vignette(&mut canvas);
            draw_thirds_frame(&mut canvas, text);
        }
        "traditional_chinese" => draw_ink_mountains(&mut canvas, text, &digest),
        "watercolor" | "oilpainting" => draw_soft_blobs(&mut canvas, accent, &digest),
        _ => draw_sparkles(&mut canvas, accent, &digest),
    }

    if matches!(style.id.as_str(), "disney" | "anime") {
        darken_bottom_third(&mut canvas);
    }
    draw_prompt_band(&mut canvas, color_from_digest(&digest), text);
    canvas
}

fn prompt_digest(prompt: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let mut digest = [0u8; 32];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

fn color_from_digest(digest: &[u8; 32]) -> [u8; 3] {
    [digest[0], digest[1], digest[2]]
}

fn blend(from: [u8; 3], to: [u8; 3], t: f32) -> [u8; 3] {
    let t = t.clamp(0.0, 1.0);
    let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
    [mix(from[0], to[0]), mix(from[1], to[1]), mix(from[2], to[2])]
}

fn blend_pixel(canvas: &mut RgbImage, x: u32, y: u32, color: [u8; 3], alpha: f32) {
    if x >= canvas.width() || y >= canvas.height() {
        return;
    }
    let pixel = canvas.get_pixel_mut(x, y);
    pixel.0 = blend(pixel.0, color, alpha);
}

fn fill_rect(
    canvas: &mut RgbImage,
    x0: u32,
    y0: u32,
    w: u32,
    h: u32,
    color: [u8; 3],
    alpha: f32,
) {
    for y in y0..y0.saturating_add(h).min(canvas.height()) {
        for x in x0..x0.saturating_add(w).min(canvas.width()) {
            blend_pixel(canvas, x, y, color, alpha);
        }
    }
}

fn scaled(byte: u8, size: u32) -> u32 {
    byte as u32 * size / 256
}

fn draw_sparkles(canvas: &mut RgbImage, accent: [u8; 3], digest: &[u8; 32]) {
    let size = canvas.width();
    for idx in 0..12 {
        let cx = scaled(digest[idx], size);
        let cy = scaled(digest[idx + 12], size);
        let arm = 4 + (digest[(idx + 24) % 32] % 6) as u32;
        for offset in 0..=arm {
            let alpha = 0.8 - offset as f32 / (arm as f32 * 1.6);
            blend_pixel(canvas, cx + offset, cy, accent, alpha);
            blend_pixel(canvas, cx.saturating_sub(offset), cy, accent, alpha);
            blend_pixel(canvas, cx, cy + offset, accent, alpha);
            blend_pixel(canvas, cx, cy.saturating_sub(offset), accent, alpha);
        }
    }
}

fn draw_pixel_grid(canvas: &mut RgbImage, accent: [u8; 3], text: [u8; 3], digest: &[u8; 32]) {
    let size = canvas.width();
    let cell = (size / 16).max(4);
    for row in 0..16u32 {
        for col in 0..16u32 {
            let byte = digest[((row * 16 + col) % 32) as usize];
            if byte % 3 == 0 {
                let color = if byte % 2 == 0 { accent } else { text };
                fill_rect(canvas, col * cell, row * cell, cell, cell, color, 0.55);
            }
        }
    }
    for line in (0..size).step_by(cell as usize) {
        fill_rect(canvas, line, 0, 1, size, text, 0.2);
        fill_rect(canvas, 0, line, size, 1, text, 0.2);
    }
}

fn draw_scanlines(canvas: &mut RgbImage, accent: [u8; 3]) {
    let size = canvas.width();
    for y in (0..size).step_by(4) {
        fill_rect(canvas, 0, y, size, 1, [0, 0, 0], 0.45);
    }
    for band in 1..4 {
        fill_rect(canvas, 0, size * band / 4, size, 2, accent, 0.85);
    }
}

fn draw_thirds_frame(canvas: &mut RgbImage, text: [u8; 3]) {
    let size = canvas.width();
    let margin = size / 16;
    let inner = size - margin * 2;
    fill_rect(canvas, margin, margin, inner, 2, text, 0.8);
    fill_rect(canvas, margin, size - margin - 2, inner, 2, text, 0.8);
    fill_rect(canvas, margin, margin, 2, inner, text, 0.8);
    fill_rect(canvas, size - margin - 2, margin, 2, inner, text, 0.8);
    for third in 1..3 {
        let offset = margin + inner * third / 3;
        fill_rect(canvas, offset, margin, 1, inner, text, 0.25);
        fill_rect(canvas, margin, offset, inner, 1, text, 0.25);
    }
}

fn draw_vignette(canvas: &mut RgbImage) {
    let size = canvas.width() as f32;
    let center = size / 2.0;
    for (x, y, pixel) in canvas.enumerate_pixels_mut() {
        let dx = (x as f32 - center) / center;
        let dy = (y as f32 - center) / center;
        let distance = (dx * dx + dy * dy).sqrt();
        let alpha = ((distance - 0.7) * 0.6).clamp(0.0, 0.35);
        pixel.0 = blend(pixel.0, [0, 0, 0], alpha);
    }
}

fn draw_ink_mountains(canvas: &mut RgbImage, ink: [u8; 3], digest: &[u8; 32]) {
    let size = canvas.width();
    for ridge in 0..3usize {
        let peak_x = scaled(digest[ridge * 3], size);
        let peak_y = size / 3 + scaled(digest[ridge * 3 + 1], size / 3);
        let spread = size / 3 + scaled(digest[ridge * 3 + 2], size / 4);
        let alpha = 0.25 + ridge as f32 * 0.15;
        for x in 0..size {
            let distance = x.abs_diff(peak_x);
            if distance > spread {
                continue;
            }
            let top = peak_y + (size - peak_y) * distance / spread.max(1) / 2;
            fill_rect(canvas, x, top, 1, size - top, ink, alpha);
        }
    }
}

fn draw_soft_blobs(canvas: &mut RgbImage, accent: [u8; 3], digest: &[u8; 32]) {
    let size = canvas.width();
    for blob in 0..5usize {
        let cx = scaled(digest[blob * 2], size) as i64;
        let cy = scaled(digest[blob * 2 + 1], size) as i64;
        let radius = (size / 10 + scaled(digest[blob + 20], size / 8)) as i64;
        for y in (cy - radius).max(0)..(cy + radius).min(size as i64) {
            for x in (cx - radius).max(0)..(cx + radius).min(size as i64) {
                let distance = (((x - cx).pow(2) + (y - cy).pow(2)) as f32).sqrt();
                if distance <= radius as f32 {
                    let alpha = 0.35 * (1.0 - distance / radius as f32);
                    blend_pixel(canvas, x as u32, y as u32, accent, alpha);
                }
            }
        }
    }
}

fn darken_bottom_third(canvas: &mut RgbImage) {
    let size = canvas.height();
    let start = size * 2 / 3;
    for y in start..size {
        let alpha = 0.2 * (y - start) as f32 / (size - start).max(1) as f32;
        for x in 0..canvas.width() {
            blend_pixel(canvas, x, y, [0, 0, 0], alpha);
        }
    }
}

fn draw_prompt_band(canvas: &mut RgbImage, color: [u8; 3], border: [u8; 3]) {
    let size = canvas.width();
    let height = size / 10;
    let top = size / 2 - height / 2;
    let left = size / 8;
    let width = size - left * 2;
    fill_rect(canvas, left, top, width, height, color, 0.7);
    fill_rect(canvas, left, top, width, 2, border, 0.9);
    fill_rect(canvas, left, top + height - 2, width, 2, border, 0.9);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use atelier_contracts::providers::ProviderId;
    use atelier_contracts::styles::StyleRegistry;
    use image::ImageFormat;

    use super::{render_placeholder, LocalRenderer, PLACEHOLDER_SIZE};
    use crate::artifact::ArtifactStore;
    use crate::providers::{ImageProvider, ProviderRequest, ProviderResult};

    #[test]
    fn placeholder_is_deterministic_per_prompt_and_style() {
        let registry = StyleRegistry::bundled();
        let style = registry.get_style("pixel");
        let theme = style.theme.clone().expect("pixel has a theme");
        let first = render_placeholder("castle", style, &theme, 128);
        let second = render_placeholder("castle", style, &theme, 128);
        let other = render_placeholder("ocean", style, &theme, 128);
        assert_eq!(first, second);
        assert_ne!(first, other);
    }

    #[test]
    fn every_bundled_style_renders() {
        let registry = StyleRegistry::bundled();
        for style in registry.styles() {
            let theme = style.theme.clone().expect("bundled styles carry themes");
            let canvas = render_placeholder("a cat in a hat", style, &theme, 96);
            assert_eq!(canvas.dimensions(), (96, 96));
        }
    }

    #[test]
    fn renderer_writes_png_named_after_prompt() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let renderer = LocalRenderer::new(
            ArtifactStore::new(temp.path()),
            Arc::new(StyleRegistry::bundled()),
        );
        let result = renderer.generate(&ProviderRequest {
            prompt: "a cat in a hat".to_string(),
            style_id: "not-a-style".to_string(),
            reference_image: None,
        });
        let artifact = match result {
            ProviderResult::Success(artifact) => artifact,
            other => panic!("local renderer failed: {other:?}"),
        };
        assert_eq!(renderer.id(), ProviderId::Local);
        assert!(artifact.filename.starts_with("demo_"));
        assert!(artifact.filename.ends_with("_a_cat_in_a_hat.png"));
        let decoded = image::open(&artifact.path)?;
        assert_eq!(decoded.width(), PLACEHOLDER_SIZE);
        assert_eq!(
            image::guess_format(&std::fs::read(&artifact.path)?)?,
            ImageFormat::Png
        );
        Ok(())
    }

    #[test]
    fn unwritable_output_directory_is_a_failure() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let blocker = temp.path().join("file");
        std::fs::write(&blocker, b"occupied")?;
        let renderer = LocalRenderer::new(
            ArtifactStore::new(blocker.join("generated")),
            Arc::new(StyleRegistry::bundled()),
        );
        assert!(renderer.render("anything", "disney").is_err());
        Ok(())
    }
}
