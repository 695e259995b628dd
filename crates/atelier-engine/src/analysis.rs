use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{bail, Context, Result};
use atelier_contracts::config::AnalysisConfig;
use atelier_contracts::error::InputError;
use atelier_contracts::reference::{ReferenceImage, ALLOWED_REFERENCE_EXTENSIONS};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use encoding_rs::{GBK, WINDOWS_1252};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use quick_xml::events::Event;
use reqwest::blocking::Client as HttpClient;
use reqwest::header::CONTENT_TYPE;
use serde_json::{json, Value};

use crate::http::{error_chain_text, request_timeout, response_json_or_error};

const DOCX_BODY: &str = "word/document.xml";
const VISION_MAX_DIM: u32 = 1024;
const TOP_WORDS: usize = 5;

const KEYWORD_CATEGORIES: [(&str, &[&str]); 7] = [
    (
        "animals",
        &[
            "cat", "dog", "bird", "fish", "rabbit", "bear", "tiger", "lion", "elephant", "horse",
            "cow", "sheep", "pig", "猫", "狗", "鸟", "鱼", "兔子", "熊", "老虎", "狮子", "大象",
            "马", "牛", "羊", "猪",
        ],
    ),
    (
        "nature",
        &[
            "flower", "tree", "grass", "mountain", "water", "sea", "ocean", "sky", "cloud", "sun",
            "moon", "star", "forest", "garden", "花", "树", "草", "山", "水", "海", "天空", "云",
            "太阳", "月亮", "星星", "森林", "花园",
        ],
    ),
    (
        "buildings",
        &[
            "house", "building", "castle", "tower", "bridge", "door", "window", "roof", "wall",
            "房子", "建筑", "城堡", "塔", "桥", "门", "窗", "屋顶", "墙",
        ],
    ),
    (
        "people",
        &[
            "person", "people", "child", "girl", "boy", "woman", "man", "friend", "family", "人",
            "孩子", "女孩", "男孩", "女人", "男人", "老人", "朋友", "家人",
        ],
    ),
    (
        "objects",
        &[
            "book", "pen", "table", "chair", "car", "plane", "ship", "boat", "toy", "food",
            "clothes", "书", "笔", "桌子", "椅子", "车", "飞机", "船", "玩具", "食物", "衣服",
        ],
    ),
    (
        "colours",
        &[
            "red", "blue", "green", "yellow", "purple", "orange", "pink", "black", "white", "gray",
            "grey", "brown", "红", "蓝", "绿", "黄", "紫", "橙", "粉", "黑", "白", "灰", "棕",
        ],
    ),
    (
        "emotions",
        &[
            "happy", "sad", "angry", "surprised", "afraid", "love", "hope", "dream", "warm",
            "cute", "快乐", "悲伤", "愤怒", "惊讶", "害怕", "爱", "希望", "梦想", "温暖", "可爱",
        ],
    ),
];

const STOP_WORDS: [&str; 24] = [
    "the", "and", "for", "with", "that", "this", "are", "was", "were", "from", "into", "have",
    "has", "had", "its", "his", "her", "their", "our", "you", "your", "not", "but", "all",
];

const NAMED_COLOURS: [(&str, [u8; 3]); 11] = [
    ("black", [20, 20, 20]),
    ("white", [240, 240, 240]),
    ("gray", [128, 128, 128]),
    ("red", [200, 40, 40]),
    ("orange", [230, 140, 40]),
    ("yellow", [230, 210, 60]),
    ("green", [60, 160, 70]),
    ("teal", [40, 150, 150]),
    ("blue", [50, 90, 200]),
    ("purple", [130, 70, 170]),
    ("brown", [120, 80, 50]),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisSource {
    Remote { model: String },
    Local,
}

impl AnalysisSource {
    pub fn label(&self) -> String {
        match self {
            AnalysisSource::Remote { model } => format!("remote:{model}"),
            AnalysisSource::Local => "local".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisReport {
    pub text: String,
    pub source: AnalysisSource,
    pub truncated: bool,
}

enum AnalysisInput {
    Document { text: String, truncated: bool },
    Image { reference: ReferenceImage },
}

/// Turns an uploaded document or image into a four-point description suited
/// to image generation. Remote models are tried in order; the local
/// heuristic report always answers last.
pub struct DocumentAnalyzer {
    config: AnalysisConfig,
    http: HttpClient,
}

impl DocumentAnalyzer {
    pub fn new(config: AnalysisConfig) -> Self {
        Self {
            config,
            http: HttpClient::new(),
        }
    }

    pub fn analyze(&self, path: &Path) -> Result<AnalysisReport, InputError> {
        match self.load_input(path)? {
            AnalysisInput::Document { text, truncated } => {
                let content = Value::String(document_prompt(&text));
                if let Some((model, answer)) = self.ask_models(&self.config.text_models, &content)
                {
                    return Ok(AnalysisReport {
                        text: answer,
                        source: AnalysisSource::Remote { model },
                        truncated,
                    });
                }
                Ok(AnalysisReport {
                    text: local_document_report(&text),
                    source: AnalysisSource::Local,
                    truncated,
                })
            }
            AnalysisInput::Image { reference } => {
                if let Some(data_url) = vision_data_url(&reference.path, reference.mime_type()) {
                    let content = json!([
                        { "type": "text", "text": IMAGE_PROMPT },
                        { "type": "image_url", "image_url": { "url": data_url } },
                    ]);
                    if let Some((model, answer)) =
                        self.ask_models(&self.config.vision_models, &content)
                    {
                        return Ok(AnalysisReport {
                            text: answer,
                            source: AnalysisSource::Remote { model },
                            truncated: false,
                        });
                    }
                }
                Ok(AnalysisReport {
                    text: local_image_report(&reference.path),
                    source: AnalysisSource::Local,
                    truncated: false,
                })
            }
        }
    }

    fn load_input(&self, path: &Path) -> Result<AnalysisInput, InputError> {
        let extension = path
            .extension()
            .and_then(OsStr::to_str)
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if ALLOWED_REFERENCE_EXTENSIONS.contains(&extension.as_str()) {
            let reference = ReferenceImage::inspect(path)
                .map_err(|err| InputError::InvalidReference(err.to_string()))?;
            return Ok(AnalysisInput::Image { reference });
        }

        let unreadable =
            |err: anyhow::Error| InputError::UnreadableDocument(format!("{}: {err:#}", path.display()));
        let raw = match extension.as_str() {
            "txt" | "md" => {
                let bytes = fs::read(path).map_err(|err| unreadable(err.into()))?;
                decode_text(bytes, path)
            }
            "pdf" => pdf_text(path).map_err(unreadable)?,
            "docx" => docx_text(path).map_err(unreadable)?,
            "" => return Err(InputError::UnsupportedDocument("(none)".to_string())),
            other => return Err(InputError::UnsupportedDocument(other.to_string())),
        };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InputError::UnreadableDocument(format!(
                "{} contains no text",
                path.display()
            )));
        }
        let (text, truncated) = truncate_document(trimmed, self.config.max_document_chars);
        tracing::info!(
            path = %path.display(),
            chars = text.chars().count(),
            truncated,
            "document loaded for analysis"
        );
        Ok(AnalysisInput::Document { text, truncated })
    }

    fn ask_models(&self, models: &[String], content: &Value) -> Option<(String, String)> {
        if self.config.api_key.trim().is_empty() {
            tracing::info!("analysis API key missing; using local report");
            return None;
        }
        for model in models {
            match self.ask_model(model, content) {
                Ok(answer) => {
                    tracing::info!(model = %model, "analysis model answered");
                    return Some((model.clone(), answer));
                }
                Err(err) => {
                    tracing::warn!(model = %model, error = %error_chain_text(&err, 320), "analysis model failed");
                }
            }
        }
        None
    }

    fn ask_model(&self, model: &str, content: &Value) -> Result<String> {
        let body = json!({
            "model": model,
            "messages": [{ "role": "user", "content": content }],
            "temperature": 0.7,
            "max_tokens": 1000,
        });
        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(self.config.api_key.trim())
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .timeout(request_timeout(self.config.timeout_s))
            .send()
            .with_context(|| format!("analysis request failed ({})", self.config.endpoint))?;
        let payload = response_json_or_error("Analysis", response)?;
        let answer = payload
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::trim)
            .unwrap_or_default();
        if answer.is_empty() {
            bail!("analysis model {model} returned an empty answer");
        }
        Ok(answer.to_string())
    }
}

const IMAGE_PROMPT: &str = "Describe this image for AI image generation. Answer in this format:\n\
1. Topic:\n\
2. Key elements:\n\
3. Suggested visual style:\n\
4. Generation prompt:\n\
Keep the prompt concise and vivid.";

fn document_prompt(text: &str) -> String {
    format!(
        "Analyze the following document, extract its key information, and write a description \
         suited to AI image generation.\n\nDocument:\n{text}\n\nAnswer in this format:\n\
         1. Topic / document type:\n2. Key concepts / elements:\n3. Suggested visual style:\n\
         4. Generation prompt:\n\nFocus on the most important visual elements and keep the \
         prompt concise but creative."
    )
}

/// Plain text is tried as UTF-8, then GBK, then Windows-1252, which accepts
/// every byte.
fn decode_text(bytes: Vec<u8>, path: &Path) -> String {
    let bytes = match String::from_utf8(bytes) {
        Ok(text) => return text,
        Err(err) => err.into_bytes(),
    };
    if let Some(text) = GBK.decode_without_bom_handling_and_without_replacement(&bytes) {
        tracing::info!(path = %path.display(), "document decoded as GBK");
        return text.into_owned();
    }
    tracing::warn!(path = %path.display(), "document is neither UTF-8 nor GBK; decoding as Windows-1252");
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(&bytes);
    text.into_owned()
}

fn pdf_text(path: &Path) -> Result<String> {
    let document = lopdf::Document::load(path).context("failed to parse PDF")?;
    let mut text = String::new();
    for page in document.get_pages().into_keys() {
        match document.extract_text(&[page]) {
            Ok(page_text) => {
                text.push_str(page_text.trim_end());
                text.push('\n');
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), page, error = %err, "PDF page has no extractable text");
            }
        }
    }
    Ok(text)
}

/// Paragraph text from a Word (OOXML) document. Paragraphs end in newlines.
fn docx_text(path: &Path) -> Result<String> {
    let file = fs::File::open(path).context("failed to open DOCX")?;
    let mut archive = zip::ZipArchive::new(file).context("DOCX is not a zip archive")?;
    let mut xml = String::new();
    archive
        .by_name(DOCX_BODY)
        .with_context(|| format!("DOCX has no {DOCX_BODY}"))?
        .read_to_string(&mut xml)
        .context("failed to read DOCX body")?;

    let mut reader = quick_xml::Reader::from_str(&xml);
    let mut text = String::new();
    let mut in_text_run = false;
    loop {
        match reader.read_event().context("malformed DOCX body")? {
            Event::Start(tag) if tag.name().as_ref() == b"w:t" => in_text_run = true,
            Event::End(tag) => match tag.name().as_ref() {
                b"w:t" => in_text_run = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Event::Empty(tag) => match tag.name().as_ref() {
                b"w:tab" => text.push('\t'),
                b"w:br" => text.push('\n'),
                _ => {}
            },
            Event::Text(chunk) if in_text_run => {
                text.push_str(&chunk.unescape().context("bad DOCX text escape")?);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(text)
}

pub(crate) fn truncate_document(text: &str, max_chars: usize) -> (String, bool) {
    if text.chars().count() <= max_chars {
        return (text.to_string(), false);
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    (out, true)
}

fn vision_data_url(path: &Path, fallback_mime: &str) -> Option<String> {
    if let Ok(image) = image::open(path) {
        let resized = image
            .resize(VISION_MAX_DIM, VISION_MAX_DIM, FilterType::Triangle)
            .to_rgb8();
        let mut bytes = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, 90);
        if encoder
            .encode_image(&DynamicImage::ImageRgb8(resized))
            .is_ok()
        {
            return Some(format!("data:image/jpeg;base64,{}", BASE64.encode(bytes)));
        }
    }
    let bytes = fs::read(path).ok()?;
    Some(format!("data:{fallback_mime};base64,{}", BASE64.encode(bytes)))
}

/// Keyword hits per category, in category order.
pub(crate) fn keyword_hits(text: &str) -> Vec<(&'static str, Vec<&'static str>)> {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();
    KEYWORD_CATEGORIES
        .iter()
        .filter_map(|(category, keywords)| {
            let hits: Vec<&'static str> = keywords
                .iter()
                .copied()
                .filter(|keyword| {
                    if keyword.is_ascii() {
                        words.iter().any(|word| {
                            *word == *keyword
                                || word
                                    .strip_suffix('s')
                                    .map(|stem| stem == *keyword)
                                    .unwrap_or(false)
                        })
                    } else {
                        lowered.contains(keyword)
                    }
                })
                .collect();
            (!hits.is_empty()).then_some((*category, hits))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TextStatistics {
    pub chars: usize,
    pub words: usize,
    pub lines: usize,
    pub top_words: Vec<(String, usize)>,
}

pub(crate) fn text_statistics(text: &str) -> TextStatistics {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    let mut words = 0;
    for word in text.split_whitespace() {
        words += 1;
        let cleaned: String = word
            .chars()
            .filter(|ch| ch.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        let long_enough = if cleaned.is_ascii() {
            cleaned.len() >= 3
        } else {
            cleaned.chars().count() >= 2
        };
        if long_enough && !STOP_WORDS.contains(&cleaned.as_str()) {
            *counts.entry(cleaned).or_default() += 1;
        }
    }
    let mut top_words: Vec<(String, usize)> = counts.into_iter().collect();
    top_words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    top_words.truncate(TOP_WORDS);
    TextStatistics {
        chars: text.chars().count(),
        words,
        lines: text.lines().count(),
        top_words,
    }
}

fn suggested_style(categories: &[&str]) -> &'static str {
    let has = |name: &str| categories.contains(&name);
    if has("nature") && !has("buildings") {
        "soft watercolor illustration with natural light"
    } else if has("buildings") {
        "clean architectural illustration with strong perspective"
    } else if has("people") {
        "expressive character illustration"
    } else if has("animals") {
        "cute storybook illustration"
    } else {
        "warm, friendly illustration style"
    }
}

pub(crate) fn local_document_report(text: &str) -> String {
    let hits = keyword_hits(text);
    let stats = text_statistics(text);
    let categories: Vec<&str> = hits.iter().map(|(category, _)| *category).collect();
    let topic = if categories.is_empty() {
        "creative description".to_string()
    } else {
        format!("creative description featuring {}", categories.join(", "))
    };
    let mut elements: Vec<&str> = hits.iter().flat_map(|(_, words)| words.iter().copied()).collect();
    elements.dedup();
    let elements = if elements.is_empty() {
        "no specific visual elements recognised".to_string()
    } else {
        elements.join(", ")
    };
    let top_words = if stats.top_words.is_empty() {
        "none".to_string()
    } else {
        stats
            .top_words
            .iter()
            .map(|(word, count)| format!("{word} ({count})"))
            .collect::<Vec<String>>()
            .join(", ")
    };
    format!(
        "Document analysis:\n\n\
         1. Topic: {topic}\n\
         2. Key elements: {elements}\n\
         3. Suggested visual style: {style}\n\
         4. Generation prompt: {text}\n\n\
         Statistics: {chars} characters, {words} words, {lines} lines. Frequent words: {top_words}.",
        style = suggested_style(&categories),
        chars = stats.chars,
        words = stats.words,
        lines = stats.lines,
    )
}

fn readable_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("image")
        .replace(['_', '-'], " ");
    let collapsed = stem.split_whitespace().collect::<Vec<&str>>().join(" ");
    if collapsed.is_empty() {
        "image".to_string()
    } else {
        collapsed
    }
}

fn nearest_colour_name(rgb: [u8; 3]) -> &'static str {
    let distance = |other: [u8; 3]| {
        rgb.iter()
            .zip(other.iter())
            .map(|(a, b)| {
                let delta = i32::from(*a) - i32::from(*b);
                delta * delta
            })
            .sum::<i32>()
    };
    NAMED_COLOURS
        .iter()
        .min_by_key(|(_, reference)| distance(*reference))
        .map(|(name, _)| *name)
        .unwrap_or("neutral")
}

pub(crate) fn average_colour(image: &DynamicImage) -> [u8; 3] {
    let sample = image.thumbnail(64, 64).to_rgb8();
    let pixels = u64::from(sample.width()) * u64::from(sample.height());
    if pixels == 0 {
        return [0, 0, 0];
    }
    let mut sums = [0u64; 3];
    for pixel in sample.pixels() {
        for (sum, channel) in sums.iter_mut().zip(pixel.0.iter()) {
            *sum += u64::from(*channel);
        }
    }
    [
        (sums[0] / pixels) as u8,
        (sums[1] / pixels) as u8,
        (sums[2] / pixels) as u8,
    ]
}

pub(crate) fn local_image_report(path: &Path) -> String {
    let subject = readable_stem(path);
    let (topic, colour_line, style, tone) = match image::open(path) {
        Ok(image) => {
            let (width, height) = image.dimensions();
            let [r, g, b] = average_colour(&image);
            let colour = nearest_colour_name([r, g, b]);
            let orientation = match width.cmp(&height) {
                std::cmp::Ordering::Greater => "landscape",
                std::cmp::Ordering::Less => "portrait",
                std::cmp::Ordering::Equal => "square",
            };
            let brightness = (u32::from(r) + u32::from(g) + u32::from(b)) / 3;
            let style = if brightness < 80 {
                "moody, low-key lighting"
            } else if brightness > 180 {
                "bright, airy high-key illustration"
            } else {
                "balanced, naturally lit illustration"
            };
            (
                format!("{orientation} image, {width}x{height} pixels"),
                format!("dominant {colour} tones (average #{r:02x}{g:02x}{b:02x})"),
                style,
                format!(", {colour} tones"),
            )
        }
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "image could not be decoded");
            (
                "image of unknown dimensions".to_string(),
                "colours unavailable".to_string(),
                "warm, friendly illustration style",
                String::new(),
            )
        }
    };
    format!(
        "Image analysis:\n\n\
         1. Topic: {topic}\n\
         2. Key elements: {subject}; {colour_line}\n\
         3. Suggested visual style: {style}\n\
         4. Generation prompt: {subject}{tone}, {style}"
    )
}
