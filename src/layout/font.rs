use anyhow::{Context, Result, anyhow};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};
use ttf_parser::Face;
use ttf_parser::name_id;
use usvg::fontdb;

use crate::languages::{base_code, is_cjk_char};
use crate::settings::FontSettings;

const ESTIMATE_ASCENT: f32 = 0.8;
const ESTIMATE_DESCENT: f32 = 0.2;
const ESTIMATE_LINE_GAP: f32 = 0.1;

/// A parsed font plus the metrics layout needs. Cloning shares the data.
#[derive(Clone)]
pub struct FontFace {
    data: Arc<Vec<u8>>,
    face_index: u32,
    units_per_em: u16,
    ascender: i16,
    descender: i16,
    line_gap: i16,
    space_advance: u16,
    family: Option<String>,
}

impl std::fmt::Debug for FontFace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontFace")
            .field("family", &self.family)
            .field("face_index", &self.face_index)
            .field("units_per_em", &self.units_per_em)
            .finish()
    }
}

impl FontFace {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }

    /// Parses `data`, preferring the face named `preferred_family` when the
    /// data is a collection.
    pub fn from_data(data: Vec<u8>, preferred_family: Option<&str>) -> Result<Self> {
        let data = Arc::new(data);
        let mut fallback = None;
        let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
        for index in 0..count {
            let Ok(font) = Self::parse_at(Arc::clone(&data), index) else {
                continue;
            };
            if let (Some(preferred), Some(found)) = (preferred_family, font.family()) {
                if found.eq_ignore_ascii_case(preferred) {
                    return Ok(font);
                }
            }
            if fallback.is_none() {
                fallback = Some(font);
            }
        }
        fallback.ok_or_else(|| anyhow!("failed to parse font data"))
    }

    fn parse_at(data: Arc<Vec<u8>>, face_index: u32) -> Result<Self> {
        let face = Face::parse(&data, face_index)
            .map_err(|err| anyhow!("failed to parse face {}: {}", face_index, err))?;
        let units_per_em = face.units_per_em().max(1);
        let space_advance = face
            .glyph_index(' ')
            .and_then(|id| face.glyph_hor_advance(id))
            .unwrap_or(units_per_em / 2);
        let (ascender, descender, line_gap) = (face.ascender(), face.descender(), face.line_gap());
        let family = extract_family_name(&face);
        Ok(FontFace {
            data,
            face_index,
            units_per_em,
            ascender,
            descender,
            line_gap,
            space_advance,
            family,
        })
    }

    fn em(&self, units: i32) -> f32 {
        units as f32 / self.units_per_em.max(1) as f32
    }

    fn vertical_metrics(&self) -> (f32, f32, f32) {
        let ascent = self.em(self.ascender as i32);
        let descent = self.em(-(self.descender as i32));
        let gap = self.em(self.line_gap as i32);
        if ascent + descent <= 0.0 {
            return (ESTIMATE_ASCENT, ESTIMATE_DESCENT, ESTIMATE_LINE_GAP);
        }
        (ascent, descent, gap.max(0.0))
    }

    fn line_width_em(&self, face: &Face<'_>, line: &str) -> f32 {
        let mut advance = 0u32;
        for ch in line.chars() {
            let glyph_advance = if ch == ' ' {
                self.space_advance
            } else {
                face.glyph_index(ch)
                    .and_then(|glyph| face.glyph_hor_advance(glyph))
                    .unwrap_or(self.space_advance)
            };
            advance = advance.saturating_add(glyph_advance as u32);
        }
        advance as f32 / self.units_per_em.max(1) as f32
    }
}

pub fn load_font_file(path: &Path) -> Result<FontFace> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    FontFace::from_data(data, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

pub fn load_font_family(db: &fontdb::Database, family: &str) -> Result<FontFace> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let (data, face_index) = db
        .with_face_data(id, |data, index| (data.to_vec(), index))
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    FontFace::parse_at(Arc::new(data), face_index)
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

/// Maps a language code to the font used for text in that language.
pub trait FontResolver: Send + Sync {
    fn resolve(&self, lang: &str) -> Option<&FontFace>;
}

/// Fonts resolved once at startup and only read afterwards.
#[derive(Debug, Default)]
pub struct FontCatalog {
    by_language: HashMap<String, FontFace>,
    default: Option<FontFace>,
    system_fonts: bool,
}

impl FontCatalog {
    /// No fonts at all; measurement uses the built-in estimates.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_language(mut self, lang: &str, font: FontFace) -> Self {
        self.by_language.insert(base_code(lang), font);
        self
    }

    pub fn with_default(mut self, font: FontFace) -> Self {
        self.default = Some(font);
        self
    }

    /// Per-language files, then per-language families, then the default
    /// file or family, then the first loadable fallback family. Fonts that
    /// fail to load are logged and skipped.
    pub fn load(settings: &FontSettings) -> Self {
        let mut db = fontdb::Database::new();
        if settings.load_system_fonts {
            db.load_system_fonts();
        }
        let mut catalog = FontCatalog {
            system_fonts: settings.load_system_fonts,
            ..FontCatalog::default()
        };

        for (lang, path) in &settings.paths {
            match load_font_file(Path::new(path)) {
                Ok(font) => {
                    catalog.by_language.insert(base_code(lang), font);
                }
                Err(err) => warn!("font for '{}' not loaded: {:#}", lang, err),
            }
        }
        for (lang, family) in &settings.families {
            let lang = base_code(lang);
            if catalog.by_language.contains_key(&lang) {
                continue;
            }
            match load_font_family(&db, family) {
                Ok(font) => {
                    catalog.by_language.insert(lang, font);
                }
                Err(err) => debug!("font family for '{}' not available: {:#}", lang, err),
            }
        }

        if let Some(path) = settings.default_path.as_deref() {
            match load_font_file(Path::new(path)) {
                Ok(font) => catalog.default = Some(font),
                Err(err) => warn!("default font not loaded: {:#}", err),
            }
        }
        let families = settings
            .default_family
            .iter()
            .chain(settings.fallback_families.iter());
        for family in families {
            if catalog.default.is_some() {
                break;
            }
            match load_font_family(&db, family) {
                Ok(font) => catalog.default = Some(font),
                Err(err) => debug!("fallback font '{}' not available: {:#}", family, err),
            }
        }
        if catalog.default.is_none() {
            warn!("no usable font found; text size will be estimated");
        }
        catalog
    }

    /// Font database for rendering: every catalog face, plus the system fonts
    /// when they were enabled at load time.
    pub fn font_database(&self) -> fontdb::Database {
        let mut db = fontdb::Database::new();
        if self.system_fonts {
            db.load_system_fonts();
        }
        let mut seen = Vec::<*const Vec<u8>>::new();
        for font in self.by_language.values().chain(self.default.iter()) {
            let key = Arc::as_ptr(&font.data);
            if seen.contains(&key) {
                continue;
            }
            seen.push(key);
            db.load_font_data(font.data().to_vec());
        }
        db
    }
}

impl FontResolver for FontCatalog {
    fn resolve(&self, lang: &str) -> Option<&FontFace> {
        self.by_language
            .get(&base_code(lang))
            .or(self.default.as_ref())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextExtent {
    pub width: f32,
    pub height: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMetrics {
    pub ascent: f32,
    pub descent: f32,
    pub line_gap: f32,
}

impl LineMetrics {
    pub fn line_height(&self) -> f32 {
        self.ascent + self.descent
    }

    pub fn line_advance(&self) -> f32 {
        self.line_height() + self.line_gap
    }
}

pub fn line_metrics(font_size: f32, font: Option<&FontFace>) -> LineMetrics {
    let (ascent, descent, line_gap) = match font {
        Some(font) => font.vertical_metrics(),
        None => (ESTIMATE_ASCENT, ESTIMATE_DESCENT, ESTIMATE_LINE_GAP),
    };
    LineMetrics {
        ascent: ascent * font_size,
        descent: descent * font_size,
        line_gap: line_gap * font_size,
    }
}

/// Width of the widest line and height of the whole block, in pixels.
pub fn measure(text: &str, font_size: f32, font: Option<&FontFace>) -> TextExtent {
    let lines = text.split('\n').collect::<Vec<_>>();
    let width = lines
        .iter()
        .map(|line| measure_line_width(line, font_size, font))
        .fold(0.0f32, f32::max);
    let metrics = line_metrics(font_size, font);
    let height = metrics.line_height() + (lines.len() - 1) as f32 * metrics.line_advance();
    TextExtent { width, height }
}

pub fn measure_line_width(line: &str, font_size: f32, font: Option<&FontFace>) -> f32 {
    if let Some(font) = font {
        if let Ok(face) = Face::parse(font.data(), font.face_index) {
            return font.line_width_em(&face, line) * font_size;
        }
    }
    line.chars().map(estimate_char_width).sum::<f32>() * font_size
}

fn estimate_char_width(ch: char) -> f32 {
    if ch.is_whitespace() {
        0.25
    } else if ch.is_ascii_alphanumeric() {
        0.55
    } else if ch.is_ascii() {
        0.35
    } else if is_cjk_char(ch) {
        1.0
    } else {
        0.9
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TUFFY: &[u8] = include_bytes!("../../tests/fixtures/fonts/Tuffy.ttf");

    fn tuffy() -> FontFace {
        FontFace::from_data(TUFFY.to_vec(), None).expect("tuffy")
    }

    fn tuffy_path() -> String {
        concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/fonts/Tuffy.ttf").to_string()
    }

    fn approx(actual: f32, expected: f32) {
        assert!(
            (actual - expected).abs() < 1e-3,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn estimates_are_per_script() {
        approx(measure_line_width("ab", 10.0, None), 11.0);
        approx(measure_line_width("你好", 10.0, None), 20.0);
        approx(measure_line_width(" ", 20.0, None), 5.0);
    }

    #[test]
    fn multi_line_height_adds_gap_per_extra_line() {
        let one = measure("Hello", 10.0, None);
        let two = measure("Hello\nWorld!", 10.0, None);
        approx(one.height, 10.0);
        approx(two.height, 21.0);
        assert!(two.width > one.width);
    }

    #[test]
    fn empty_catalog_resolves_nothing() {
        let catalog = FontCatalog::empty();
        assert!(catalog.resolve("ja").is_none());
        assert_eq!(catalog.font_database().len(), 0);
    }

    #[test]
    fn broken_font_data_is_rejected() {
        assert!(FontFace::from_data(b"not a font".to_vec(), None).is_err());
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(load_font_file(&dir.path().join("missing.ttf")).is_err());
    }

    #[test]
    fn real_face_metrics_come_from_the_font() {
        let font = tuffy();
        assert_eq!(font.family(), Some("Tuffy"));
        // 2048 units per em; typographic ascender 1597, descender -505, gap 0.
        let metrics = line_metrics(2048.0, Some(&font));
        approx(metrics.ascent, 1597.0);
        approx(metrics.descent, 505.0);
        approx(metrics.line_gap, 0.0);
        // H e l l o = 1198 + 1013 + 430 + 430 + 1054
        approx(measure_line_width("Hello", 2048.0, Some(&font)), 4125.0);
        approx(measure_line_width(" ", 2048.0, Some(&font)), 616.0);
        assert!(
            measure_line_width("WW", 20.0, Some(&font))
                > measure_line_width("ii", 20.0, Some(&font))
        );
    }

    #[test]
    fn language_font_wins_over_default() {
        let language = tuffy();
        let default = tuffy();
        let catalog = FontCatalog::empty()
            .with_language("ja-JP", language.clone())
            .with_default(default.clone());
        let ja = catalog.resolve("ja").expect("ja");
        assert!(Arc::ptr_eq(&ja.data, &language.data));
        let fr = catalog.resolve("fr").expect("fr");
        assert!(Arc::ptr_eq(&fr.data, &default.data));
        assert_eq!(catalog.font_database().len(), 2);

        let shared = FontCatalog::empty()
            .with_language("ko", language.clone())
            .with_default(language);
        assert_eq!(shared.font_database().len(), 1);
    }

    #[test]
    fn load_uses_language_paths_then_default() {
        let settings = FontSettings {
            default_path: Some(tuffy_path()),
            paths: HashMap::from([
                ("zh-CN".to_string(), tuffy_path()),
                ("ru".to_string(), "/nonexistent/font.ttf".to_string()),
            ]),
            families: HashMap::from([("ko".to_string(), "No Such Family".to_string())]),
            ..FontSettings::default()
        };
        let catalog = FontCatalog::load(&settings);
        let zh = catalog.resolve("zh-TW").expect("zh");
        let default = catalog.resolve("en").expect("default");
        assert_eq!(zh.family(), Some("Tuffy"));
        assert!(!Arc::ptr_eq(&zh.data, &default.data));
        assert!(Arc::ptr_eq(&catalog.resolve("ru").expect("ru").data, &default.data));
        assert!(Arc::ptr_eq(&catalog.resolve("ko").expect("ko").data, &default.data));
    }
}
