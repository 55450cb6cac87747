//! Font-size search that fits translated text into a region.

pub mod font;

use serde::Serialize;
use tracing::debug;

use crate::languages::is_cjk_char;
use crate::settings::ImageSettings;
use font::{FontFace, measure};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutPlan {
    pub font_size: u32,
    pub wrapped_text: String,
    /// False when no probed size fit and the floor size was used anyway.
    pub fits: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct TextLayoutEngine {
    min_font_size: u32,
    step: u32,
}

impl Default for TextLayoutEngine {
    fn default() -> Self {
        Self::new(10, 2)
    }
}

impl TextLayoutEngine {
    pub fn new(min_font_size: u32, step: u32) -> Self {
        Self {
            min_font_size: min_font_size.max(1),
            step: step.max(1),
        }
    }

    pub fn from_settings(settings: &ImageSettings) -> Self {
        Self::new(settings.min_font_size, settings.font_size_step)
    }

    /// Largest size from `max_font_size` downward whose measured block fits
    /// `region_width` x `region_height`. Tries the text as given, then split
    /// into two lines; otherwise returns the floor size with `fits = false`.
    pub fn fit(
        &self,
        text: &str,
        region_width: f32,
        region_height: f32,
        font: Option<&FontFace>,
        max_font_size: u32,
    ) -> LayoutPlan {
        let max_font_size = max_font_size.max(1);
        let floor = self.min_font_size.min(max_font_size);

        if let Some(font_size) = self.search(text, region_width, region_height, font, max_font_size)
        {
            return LayoutPlan {
                font_size,
                wrapped_text: text.to_string(),
                fits: true,
            };
        }

        let two_lines = split_in_two(text);
        if let Some(wrapped) = two_lines.as_deref() {
            if let Some(font_size) =
                self.search(wrapped, region_width, region_height, font, max_font_size)
            {
                return LayoutPlan {
                    font_size,
                    wrapped_text: wrapped.to_string(),
                    fits: true,
                };
            }
        }

        debug!(
            "'{}' does not fit {:.0}x{:.0}; using {}px",
            text, region_width, region_height, floor
        );
        LayoutPlan {
            font_size: floor,
            wrapped_text: two_lines.unwrap_or_else(|| text.to_string()),
            fits: false,
        }
    }

    fn search(
        &self,
        text: &str,
        region_width: f32,
        region_height: f32,
        font: Option<&FontFace>,
        max_font_size: u32,
    ) -> Option<u32> {
        let floor = self.min_font_size.min(max_font_size);
        (floor..=max_font_size)
            .rev()
            .step_by(self.step as usize)
            .find(|size| {
                let extent = measure(text, *size as f32, font);
                extent.width <= region_width && extent.height <= region_height
            })
    }
}

/// Halves the text by word count; a single CJK run is halved by characters.
fn split_in_two(text: &str) -> Option<String> {
    let words = text.split_whitespace().collect::<Vec<_>>();
    if words.len() >= 2 {
        let mid = words.len() / 2;
        return Some(format!("{}\n{}", words[..mid].join(" "), words[mid..].join(" ")));
    }
    let word = words.first()?;
    if !word.chars().any(is_cjk_char) {
        return None;
    }
    let chars = word.chars().collect::<Vec<_>>();
    if chars.len() < 2 {
        return None;
    }
    let mid = chars.len() / 2;
    Some(format!(
        "{}\n{}",
        chars[..mid].iter().collect::<String>(),
        chars[mid..].iter().collect::<String>()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> TextLayoutEngine {
        TextLayoutEngine::default()
    }

    #[test]
    fn short_word_fits_on_one_line() {
        let plan = engine().fit("Hello", 100.0, 20.0, None, 50);
        assert!(plan.fits);
        assert!(plan.font_size <= 50 && plan.font_size >= 10);
        assert_eq!(plan.wrapped_text, "Hello");
        let extent = measure(&plan.wrapped_text, plan.font_size as f32, None);
        assert!(extent.width <= 100.0 && extent.height <= 20.0);
    }

    #[test]
    fn largest_fitting_size_wins() {
        let plan = engine().fit("Hi", 400.0, 400.0, None, 50);
        assert_eq!(plan.font_size, 50);
        assert!(plan.fits);
    }

    #[test]
    fn long_text_is_wrapped_once_when_that_fits() {
        // One line is 87.5px wide at 10px; two lines are 57.5 x 21.
        let plan = engine().fit("aaaaa aaaaaaa bbb", 80.0, 24.0, None, 50);
        assert!(plan.fits);
        assert_eq!(plan.wrapped_text, "aaaaa\naaaaaaa bbb");
        let extent = measure(&plan.wrapped_text, plan.font_size as f32, None);
        assert!(extent.width <= 80.0 && extent.height <= 24.0);
    }

    #[test]
    fn impossible_fit_returns_floor_without_error() {
        let plan = engine().fit("far too long for this box", 5.0, 5.0, None, 50);
        assert!(!plan.fits);
        assert_eq!(plan.font_size, 10);
        assert_eq!(plan.wrapped_text, "far too long\nfor this box");

        let single = engine().fit("word", 1.0, 1.0, None, 50);
        assert_eq!(single.wrapped_text, "word");
        assert!(!single.fits);
    }

    #[test]
    fn floor_never_exceeds_max() {
        let plan = engine().fit("overflow", 1.0, 1.0, None, 6);
        assert_eq!(plan.font_size, 6);
        assert!(!plan.fits);
        let zero = engine().fit("x", 1.0, 1.0, None, 0);
        assert!(zero.font_size > 0);
    }

    #[test]
    fn cjk_run_splits_by_characters() {
        assert_eq!(split_in_two("翻訳テキスト").as_deref(), Some("翻訳テ\nキスト"));
        assert_eq!(split_in_two("alone"), None);
    }

    #[test]
    fn fit_is_deterministic() {
        let a = engine().fit("Same input twice", 60.0, 30.0, None, 40);
        let b = engine().fit("Same input twice", 60.0, 30.0, None, 40);
        assert_eq!(a, b);
    }

    #[test]
    fn fit_with_a_real_face_stays_inside_the_region() {
        let font = FontFace::from_data(
            include_bytes!("../../tests/fixtures/fonts/Tuffy.ttf").to_vec(),
            None,
        )
        .expect("font");
        let cases = [
            ("Hello world", 120.0, 40.0),
            ("Grand opening sale today", 90.0, 50.0),
            ("WWWW", 60.0, 30.0),
        ];
        for (text, width, height) in cases {
            let plan = engine().fit(text, width, height, Some(&font), 50);
            assert!(plan.fits, "{text} should fit {width}x{height}");
            let extent = measure(&plan.wrapped_text, plan.font_size as f32, Some(&font));
            assert!(extent.width <= width, "{text}: {} > {width}", extent.width);
            assert!(extent.height <= height, "{text}: {} > {height}", extent.height);
        }
    }
}
