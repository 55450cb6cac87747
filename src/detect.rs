use anyhow::{Context, Result, anyhow};
use image::DynamicImage;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::Command;
use tracing::debug;

use crate::languages::is_cjk_char;
use crate::region::Region;

/// Finds text in an image. Regions come back in reading order.
pub trait Detector: Send + Sync {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Region>>;
}

/// Regions supplied up front, e.g. hand-corrected boxes from a client.
#[derive(Debug, Clone, Default)]
pub struct StaticDetector {
    regions: Vec<Region>,
}

impl StaticDetector {
    pub fn new(regions: Vec<Region>) -> Self {
        Self { regions }
    }

    /// `[{"bbox": [[x, y], ...], "text": "...", "confidence": 0.9}, ...]`
    pub fn from_json_str(json: &str) -> Result<Self> {
        let regions: Vec<Region> =
            serde_json::from_str(json).with_context(|| "failed to parse regions JSON")?;
        Ok(Self::new(regions))
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read regions: {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("invalid regions file: {}", path.display()))
    }
}

impl Detector for StaticDetector {
    fn detect(&self, _image: &DynamicImage) -> Result<Vec<Region>> {
        Ok(self.regions.clone())
    }
}

/// Sparse text: signage and captions rather than paragraphs.
const SPARSE_TEXT_PSM: u32 = 11;

/// Line-level detection by running the `tesseract` binary in TSV mode.
#[derive(Debug, Clone)]
pub struct TesseractDetector {
    languages: String,
}

impl Default for TesseractDetector {
    fn default() -> Self {
        Self::new("eng")
    }
}

impl TesseractDetector {
    pub fn new(languages: impl Into<String>) -> Self {
        Self {
            languages: languages.into(),
        }
    }
}

impl Detector for TesseractDetector {
    fn detect(&self, image: &DynamicImage) -> Result<Vec<Region>> {
        let languages = self.languages.trim();
        if languages.is_empty() {
            return Err(anyhow!("ocr languages is empty"));
        }
        let mut tmp = tempfile::Builder::new()
            .suffix(".png")
            .tempfile()
            .with_context(|| "failed to create temp file for OCR")?;
        image
            .write_to(&mut tmp, image::ImageFormat::Png)
            .with_context(|| "failed to write temp image for OCR")?;
        tmp.flush().ok();

        let tsv = run_tesseract_tsv(tmp.path(), languages, SPARSE_TEXT_PSM)?;
        let regions = parse_tsv_regions(&tsv)?;
        debug!("tesseract found {} text lines", regions.len());
        Ok(regions)
    }
}

fn run_tesseract_tsv(path: &Path, languages: &str, psm: u32) -> Result<String> {
    let output = Command::new("tesseract")
        .arg(path)
        .arg("stdout")
        .arg("-l")
        .arg(languages)
        .arg("--psm")
        .arg(psm.to_string())
        .arg("tsv")
        .output()
        .with_context(|| "failed to run tesseract (is it installed?)")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("tesseract failed: {}", stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

struct Word {
    text: String,
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
    conf: f32,
}

/// Groups word rows (level 5) into lines keyed by page/block/paragraph/line.
pub(crate) fn parse_tsv_regions(tsv: &str) -> Result<Vec<Region>> {
    let mut lines: BTreeMap<(i32, i32, i32, i32), Vec<Word>> = BTreeMap::new();

    for (idx, row) in tsv.lines().enumerate() {
        if idx == 0 {
            continue;
        }
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let key = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        let left: u32 = cols[6].parse().unwrap_or(0);
        let top: u32 = cols[7].parse().unwrap_or(0);
        let width: u32 = cols[8].parse().unwrap_or(0);
        let height: u32 = cols[9].parse().unwrap_or(0);
        let conf: f32 = cols[10].trim().parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 || width == 0 || height == 0 {
            continue;
        }
        lines.entry(key).or_default().push(Word {
            text: text.to_string(),
            left,
            top,
            right: left + width,
            bottom: top + height,
            conf,
        });
    }

    let mut regions = Vec::new();
    for (_, mut words) in lines {
        words.sort_by_key(|word| word.left);
        let mut text = String::new();
        let mut conf_sum = 0.0f32;
        let mut weight_sum = 0.0f32;
        for word in &words {
            if !text.is_empty() && needs_space(&text, &word.text) {
                text.push(' ');
            }
            text.push_str(&word.text);
            let weight = word.text.chars().count().max(1) as f32;
            conf_sum += word.conf * weight;
            weight_sum += weight;
        }
        let left = words.iter().map(|word| word.left).min().unwrap_or(0);
        let top = words.iter().map(|word| word.top).min().unwrap_or(0);
        let right = words.iter().map(|word| word.right).max().unwrap_or(0);
        let bottom = words.iter().map(|word| word.bottom).max().unwrap_or(0);
        let confidence = if weight_sum > 0.0 {
            conf_sum / weight_sum / 100.0
        } else {
            0.0
        };
        regions.push(Region::rect(
            left as f32,
            top as f32,
            (right - left) as f32,
            (bottom - top) as f32,
            text,
            confidence,
        )?);
    }
    Ok(regions)
}

fn needs_space(left: &str, right: &str) -> bool {
    let last = left.chars().rev().find(|ch| !ch.is_whitespace());
    let first = right.chars().find(|ch| !ch.is_whitespace());
    match (last, first) {
        (Some(a), Some(b)) if is_cjk_char(a) || is_cjk_char(b) => false,
        (Some(a), Some(b)) => !a.is_whitespace() && !b.is_whitespace(),
        _ => false,
    }
}
