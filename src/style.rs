use anyhow::{Result, anyhow};
use image::RgbImage;
use serde::Serialize;

use crate::region::BBox;
use crate::settings::ImageSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StylePlan {
    pub text_color: [u8; 3],
    pub needs_background: bool,
}

/// Picks a text color from the mean luminance under a box, and asks for a
/// backing panel when the pixels there are busy.
#[derive(Debug, Clone)]
pub struct StyleSelector {
    luminance_threshold: f32,
    busyness_threshold: f32,
    light: [u8; 3],
    dark: [u8; 3],
}

impl Default for StyleSelector {
    fn default() -> Self {
        Self {
            luminance_threshold: 128.0,
            busyness_threshold: 30.0,
            light: [255, 255, 255],
            dark: [0, 0, 0],
        }
    }
}

impl StyleSelector {
    pub fn new(luminance_threshold: f32, busyness_threshold: f32) -> Self {
        Self {
            luminance_threshold,
            busyness_threshold,
            ..Self::default()
        }
    }

    pub fn from_settings(settings: &ImageSettings) -> Result<Self> {
        Ok(Self {
            luminance_threshold: settings.luminance_threshold,
            busyness_threshold: settings.busyness_threshold,
            light: parse_hex_color(&settings.light_text_color)?,
            dark: parse_hex_color(&settings.dark_text_color)?,
        })
    }

    pub fn select(&self, image: &RgbImage, bbox: BBox) -> StylePlan {
        let (width, height) = image.dimensions();
        let Some(rect) = bbox.to_pixel_rect(width, height) else {
            return StylePlan {
                text_color: self.dark,
                needs_background: false,
            };
        };

        let mut luma_sum = 0.0f64;
        let mut sum = 0.0f64;
        let mut sum_sq = 0.0f64;
        for y in rect.y..rect.y + rect.h {
            for x in rect.x..rect.x + rect.w {
                let [r, g, b] = image.get_pixel(x, y).0;
                luma_sum += 0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64;
                for value in [r, g, b] {
                    let value = value as f64;
                    sum += value;
                    sum_sq += value * value;
                }
            }
        }
        let pixels = rect.w as f64 * rect.h as f64;
        let samples = pixels * 3.0;
        let mean_luma = luma_sum / pixels;
        let mean = sum / samples;
        let std_dev = (sum_sq / samples - mean * mean).max(0.0).sqrt();

        StylePlan {
            text_color: if mean_luma < self.luminance_threshold as f64 {
                self.light
            } else {
                self.dark
            },
            needs_background: std_dev > self.busyness_threshold as f64,
        }
    }
}

/// `#rrggbb` or `#rgb`.
pub fn parse_hex_color(value: &str) -> Result<[u8; 3]> {
    let hex = value.trim().trim_start_matches('#');
    if !hex.is_ascii() {
        return Err(anyhow!("invalid color '{}': expected #rrggbb", value));
    }
    let expanded = match hex.len() {
        3 => hex.chars().flat_map(|ch| [ch, ch]).collect::<String>(),
        6 => hex.to_string(),
        _ => return Err(anyhow!("invalid color '{}': expected #rrggbb", value)),
    };
    let channel = |index: usize| {
        u8::from_str_radix(&expanded[index..index + 2], 16)
            .map_err(|_| anyhow!("invalid color '{}': expected #rrggbb", value))
    };
    Ok([channel(0)?, channel(2)?, channel(4)?])
}
