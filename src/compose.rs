use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, ImageFormat, RgbImage, RgbaImage};
use resvg::render;
use std::io::Cursor;
use std::sync::Arc;
use tiny_skia::{IntSize, Pixmap, Transform};
use tracing::{debug, warn};
use usvg::{Options, Tree, fontdb};

use crate::layout::font::{FontFace, line_metrics, measure};
use crate::pipeline::RegionResult;
use crate::settings::ImageSettings;
use crate::style::parse_hex_color;

/// Draws laid-out text onto the cleaned image.
///
/// Every result becomes an optional translucent panel plus one `<text>`
/// element in an SVG overlay; the overlay is rendered straight onto the
/// image pixels, so anything not covered by a panel or a glyph keeps its
/// original value.
pub struct Compositor {
    fontdb: Arc<fontdb::Database>,
    panel_padding: f32,
    panel_color: [u8; 3],
    panel_opacity: f32,
}

impl Compositor {
    pub fn new(fontdb: Arc<fontdb::Database>, settings: &ImageSettings) -> Result<Self> {
        Ok(Self {
            fontdb,
            panel_padding: settings.panel_padding,
            panel_color: parse_hex_color(&settings.panel_color)?,
            panel_opacity: settings.panel_opacity.clamp(0.0, 1.0),
        })
    }

    pub fn draw(
        &self,
        image: &RgbImage,
        results: &[RegionResult],
        font: Option<&FontFace>,
    ) -> Result<RgbImage> {
        if results.is_empty() {
            return Ok(image.clone());
        }
        let (width, height) = image.dimensions();
        let svg = self.overlay_svg(width, height, results, font);
        debug!("compositing {} regions ({} bytes of SVG)", results.len(), svg.len());

        let options = Options {
            fontdb: Arc::clone(&self.fontdb),
            ..Options::default()
        };
        let tree = Tree::from_str(&svg, &options).with_context(|| "failed to parse text overlay")?;
        let size = IntSize::from_wh(width, height).ok_or_else(|| anyhow!("empty image"))?;
        let rgba = DynamicImage::ImageRgb8(image.clone()).to_rgba8();
        // Opaque pixels are identical in premultiplied form.
        let mut pixmap = Pixmap::from_vec(rgba.into_raw(), size)
            .ok_or_else(|| anyhow!("failed to build pixmap"))?;
        render(&tree, Transform::identity(), &mut pixmap.as_mut());

        let rgba = RgbaImage::from_raw(width, height, pixmap.take())
            .ok_or_else(|| anyhow!("failed to read back rendered pixels"))?;
        Ok(DynamicImage::ImageRgba8(rgba).to_rgb8())
    }

    fn overlay_svg(
        &self,
        width: u32,
        height: u32,
        results: &[RegionResult],
        font: Option<&FontFace>,
    ) -> String {
        let family = font_family_attr(font);
        let mut svg = String::new();
        svg.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = width,
            h = height
        ));

        for result in results {
            let bbox = result.region.bbox();
            let font_size = result.layout.font_size as f32;
            let extent = measure(&result.layout.wrapped_text, font_size, font);
            let metrics = line_metrics(font_size, font);
            let center_x = (bbox.min_x + bbox.max_x) / 2.0;
            let top = (bbox.min_y + bbox.max_y) / 2.0 - extent.height / 2.0;
            let left = center_x - extent.width / 2.0;

            if result.style.needs_background {
                let pad = self.panel_padding;
                svg.push_str(&format!(
                    r#"<rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" fill="{fill}" fill-opacity="{opacity:.3}"/>"#,
                    x = left - pad,
                    y = top - pad,
                    w = extent.width + pad * 2.0,
                    h = extent.height + pad * 2.0,
                    fill = hex(self.panel_color),
                    opacity = self.panel_opacity
                ));
            }

            svg.push_str(&format!(
                r#"<text font-family="{family}" font-size="{size}" fill="{fill}" text-anchor="middle">"#,
                family = family,
                size = font_size,
                fill = hex(result.style.text_color)
            ));
            for (index, line) in result.layout.wrapped_text.split('\n').enumerate() {
                let baseline = top + metrics.ascent + index as f32 * metrics.line_advance();
                svg.push_str(&format!(
                    r#"<tspan x="{x:.2}" y="{y:.2}">{text}</tspan>"#,
                    x = center_x,
                    y = baseline,
                    text = escape_xml(line)
                ));
            }
            svg.push_str("</text>");
        }

        svg.push_str("</svg>");
        svg
    }
}

fn font_family_attr(font: Option<&FontFace>) -> String {
    match font.and_then(FontFace::family) {
        Some(family) => escape_xml(&format!("'{}', sans-serif", family.replace('\'', ""))),
        None => "sans-serif".to_string(),
    }
}

fn hex(color: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", color[0], color[1], color[2])
}

fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Encodes in the input's format when possible, PNG otherwise.
pub fn encode_image(image: &RgbImage, input_bytes: &[u8]) -> Result<(Vec<u8>, &'static str)> {
    let preferred = infer::get(input_bytes)
        .map(|kind| kind.mime_type())
        .and_then(|mime| image_format_from_mime(mime).map(|format| (format, mime)));
    if let Some((format, mime)) = preferred {
        match encode_as(image, format) {
            Ok(bytes) => return Ok((bytes, mime)),
            Err(err) => warn!("could not encode output as {}: {:#}; using PNG", mime, err),
        }
    }
    Ok((encode_as(image, ImageFormat::Png)?, "image/png"))
}

fn encode_as(image: &RgbImage, format: ImageFormat) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(image.clone())
        .write_to(&mut Cursor::new(&mut bytes), format)
        .with_context(|| format!("failed to encode image as {:?}", format))?;
    Ok(bytes)
}

fn image_format_from_mime(mime: &str) -> Option<ImageFormat> {
    match mime {
        "image/png" => Some(ImageFormat::Png),
        "image/jpeg" | "image/jpg" => Some(ImageFormat::Jpeg),
        "image/gif" => Some(ImageFormat::Gif),
        "image/webp" => Some(ImageFormat::WebP),
        "image/bmp" => Some(ImageFormat::Bmp),
        "image/tiff" => Some(ImageFormat::Tiff),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::LayoutPlan;
    use crate::layout::font::FontCatalog;
    use crate::region::Region;
    use crate::style::StylePlan;
    use image::Rgb;

    fn compositor() -> Compositor {
        Compositor::new(Arc::new(fontdb::Database::new()), &ImageSettings::default())
            .expect("compositor")
    }

    fn result(text: &str, needs_background: bool) -> RegionResult {
        RegionResult {
            index: 0,
            region: Region::rect(20.0, 10.0, 60.0, 20.0, "src", 0.9).expect("region"),
            translated_text: text.to_string(),
            translated: true,
            layout: LayoutPlan {
                font_size: 12,
                wrapped_text: text.to_string(),
                fits: true,
            },
            style: StylePlan {
                text_color: [255, 255, 255],
                needs_background,
            },
        }
    }

    #[test]
    fn panel_is_blended_and_far_pixels_are_untouched() {
        let image = RgbImage::from_pixel(100, 40, Rgb([0, 0, 0]));
        let out = compositor()
            .draw(&image, &[result("Hi", true)], None)
            .expect("draw");
        // Center of the region lies under the half-opaque white panel.
        let center = out.get_pixel(50, 20).0[0];
        assert!((100..=160).contains(&center), "panel value {center}");
        assert_eq!(out.get_pixel(2, 2), &Rgb([0, 0, 0]));
        assert_eq!(out.get_pixel(97, 37), &Rgb([0, 0, 0]));
    }

    #[test]
    fn nothing_to_draw_returns_the_input() {
        let image = RgbImage::from_pixel(8, 8, Rgb([9, 9, 9]));
        assert_eq!(compositor().draw(&image, &[], None).expect("draw"), image);
    }

    #[test]
    fn overlay_escapes_text_and_stacks_lines() {
        let mut two_lines = result("a < b\n& c", false);
        two_lines.layout.wrapped_text = "a < b\n& c".to_string();
        let svg = compositor().overlay_svg(100, 40, &[two_lines], None);
        assert!(svg.contains("a &lt; b"));
        assert!(svg.contains("&amp; c"));
        assert_eq!(svg.matches("<tspan").count(), 2);
        assert!(!svg.contains("<rect"));
        assert!(svg.contains(r##"fill="#ffffff""##));
    }

    #[test]
    fn output_keeps_input_format() {
        let image = RgbImage::from_pixel(4, 4, Rgb([1, 2, 3]));
        let png = encode_as(&image, ImageFormat::Png).expect("png");
        let jpeg = encode_as(&image, ImageFormat::Jpeg).expect("jpeg");
        assert_eq!(encode_image(&image, &jpeg).expect("encode").1, "image/jpeg");
        assert_eq!(encode_image(&image, &png).expect("encode").1, "image/png");
        assert_eq!(encode_image(&image, b"unknown").expect("encode").1, "image/png");
    }

    fn lit_pixels_in_region(image: &RgbImage) -> usize {
        (20..80)
            .flat_map(|x| (10..30).map(move |y| (x, y)))
            .filter(|(x, y)| image.get_pixel(*x, *y).0[0] > 128)
            .count()
    }

    #[test]
    fn glyphs_are_drawn_with_a_catalog_font() {
        let font = FontFace::from_data(
            include_bytes!("../tests/fixtures/fonts/Tuffy.ttf").to_vec(),
            None,
        )
        .expect("font");
        let catalog = FontCatalog::empty().with_default(font.clone());
        let compositor =
            Compositor::new(Arc::new(catalog.font_database()), &ImageSettings::default())
                .expect("compositor");
        let image = RgbImage::from_pixel(100, 40, Rgb([0, 0, 0]));
        let mut text = result("HH", false);
        text.layout.font_size = 16;

        let out = compositor
            .draw(&image, std::slice::from_ref(&text), Some(&font))
            .expect("draw");
        assert!(lit_pixels_in_region(&out) > 20);
        assert_eq!(out.get_pixel(2, 2), &Rgb([0, 0, 0]));

        let fontless = self::compositor().draw(&image, &[text], None).expect("draw");
        assert_eq!(lit_pixels_in_region(&fontless), 0);
    }
}
